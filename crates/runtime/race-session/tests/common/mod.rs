//! Shared fixtures for race-session integration tests

#![allow(dead_code)]

use std::sync::Arc;

use race_core::testing::{Command, FakeContext, FakeDebugger, RecordingDriver, SharedDebugger};
use race_core::{BreakpointHandle, Condition, Notification, RaceConfig, RaceResult, SignalKind, ThreadId};
use race_session::{Backend, EventDispatcher, Flow, Session, dispatch_and_flush};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// A session wired to in-memory collaborators
pub struct Harness {
    pub fake: SharedDebugger,
    pub context: Arc<FakeContext>,
    pub driver: Arc<RecordingDriver>,
    pub dispatcher: EventDispatcher,
}

impl Harness {
    pub fn new(config: RaceConfig, threads: &[u32]) -> Self {
        Self::with_conditions(config, threads, race_core::Always, race_core::Always)
    }

    pub fn with_conditions(
        config: RaceConfig,
        threads: &[u32],
        primary: impl Condition + 'static,
        secondary: impl Condition + 'static,
    ) -> Self {
        Self::with_driver(config, threads, primary, secondary, RecordingDriver::new())
    }

    pub fn with_driver(
        config: RaceConfig,
        threads: &[u32],
        primary: impl Condition + 'static,
        secondary: impl Condition + 'static,
        driver: RecordingDriver,
    ) -> Self {
        init_tracing();
        let fake = SharedDebugger::new(FakeDebugger::with_threads(threads.iter().copied()));
        let context = Arc::new(FakeContext::new());
        let driver = Arc::new(driver);
        let backend = Backend::new(fake.clone(), context.clone(), driver.clone());
        let session = Session::initialize(config, primary, secondary, backend).expect("session setup");
        Self {
            fake,
            context,
            driver,
            dispatcher: EventDispatcher::new(session),
        }
    }

    /// Oldest breakpoint at `location`
    pub fn handle_at(&self, location: &str) -> BreakpointHandle {
        *self
            .fake
            .lock()
            .handles_at(location)
            .first()
            .unwrap_or_else(|| panic!("no breakpoint at {location}"))
    }

    /// `thread` halts at `location` and the debugger reports it
    pub fn hit(&mut self, location: &str, thread: u32) -> RaceResult<Flow> {
        let handle = self.handle_at(location);
        self.fake.lock().halt(ThreadId(thread));
        self.send(Notification::BreakpointHit {
            handle,
            thread: ThreadId(thread),
        })
    }

    pub fn signal(&mut self, thread: u32, name: &str) -> RaceResult<Flow> {
        self.fake.lock().halt(ThreadId(thread));
        self.send(Notification::Signal {
            thread: ThreadId(thread),
            signal: SignalKind::from_name(name),
        })
    }

    /// `thread` reports a stop, e.g. in answer to halt-all
    pub fn stopped(&mut self, thread: u32) -> RaceResult<Flow> {
        self.fake.lock().halt(ThreadId(thread));
        self.send(Notification::Stopped {
            thread: ThreadId(thread),
        })
    }

    pub fn exit(&mut self, code: i32) -> RaceResult<Flow> {
        self.send(Notification::Exited { code: Some(code) })
    }

    pub fn send(&mut self, notification: Notification) -> RaceResult<Flow> {
        dispatch_and_flush(&mut self.dispatcher, notification)
    }

    pub fn resumed(&self) -> Vec<u32> {
        self.fake.lock().resumed().into_iter().map(|t| t.0).collect()
    }

    pub fn commands(&self) -> Vec<Command> {
        self.fake.lock().commands().to_vec()
    }

    pub fn clear_commands(&self) {
        self.fake.lock().clear_commands();
    }

    pub fn is_halted(&self, thread: u32) -> bool {
        self.fake.lock().is_halted(ThreadId(thread))
    }
}
