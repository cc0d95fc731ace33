//! In-memory collaborators for exercising the controller without a live target
//!
//! Everything here records what it was asked to do so tests can assert on the
//! exact command sequence.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::{Mutex, MutexGuard};

use crate::control::{ContextEvaluator, DebugControl, SafepointDriver};
use crate::error::{RaceError, RaceResult};
use crate::types::{BreakpointHandle, Location, ThreadId};

/// Command recorded by [`FakeDebugger`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    SetBreakpoint(Location, BreakpointHandle),
    Enable(BreakpointHandle),
    Disable(BreakpointHandle),
    Resume(ThreadId),
    HaltAll,
    DumpState,
    Terminate,
}

/// Debug-control fake with a simple thread table
#[derive(Debug, Default)]
pub struct FakeDebugger {
    next_handle: u64,
    commands: Vec<Command>,
    breakpoints: BTreeMap<BreakpointHandle, (Location, bool)>,
    /// thread -> halted
    threads: BTreeMap<ThreadId, bool>,
    current: Option<ThreadId>,
    terminated: bool,
    dead: HashSet<ThreadId>,
    stuck: HashSet<BreakpointHandle>,
}

impl FakeDebugger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fake with the given threads, all running
    pub fn with_threads(ids: impl IntoIterator<Item = u32>) -> Self {
        let mut fake = Self::default();
        for id in ids {
            fake.threads.insert(ThreadId(id), false);
        }
        fake
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    /// Resumes in the order they were issued
    pub fn resumed(&self) -> Vec<ThreadId> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                Command::Resume(t) => Some(*t),
                _ => None,
            })
            .collect()
    }

    /// Handles set at `location`, oldest first
    pub fn handles_at(&self, location: &str) -> Vec<BreakpointHandle> {
        self.breakpoints
            .iter()
            .filter(|(_, (loc, _))| loc.as_str() == location)
            .map(|(h, _)| *h)
            .collect()
    }

    pub fn is_enabled(&self, handle: BreakpointHandle) -> bool {
        self.breakpoints.get(&handle).is_some_and(|(_, on)| *on)
    }

    /// Mark a thread halted, as the debugger does before notifying
    pub fn halt(&mut self, thread: ThreadId) {
        self.threads.insert(thread, true);
        self.current = Some(thread);
    }

    pub fn is_halted(&self, thread: ThreadId) -> bool {
        self.threads.get(&thread).copied().unwrap_or(false)
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// The thread exits; resuming it fails from now on
    pub fn kill(&mut self, thread: ThreadId) {
        self.threads.remove(&thread);
        self.dead.insert(thread);
    }

    /// Enabling or disabling `handle` fails from now on
    pub fn jam(&mut self, handle: BreakpointHandle) {
        self.stuck.insert(handle);
    }

    fn known(&self, handle: BreakpointHandle) -> RaceResult<()> {
        if self.breakpoints.contains_key(&handle) {
            Ok(())
        } else {
            Err(RaceError::debugger(format!("No breakpoint number {handle}.")))
        }
    }
}

impl DebugControl for FakeDebugger {
    fn set_breakpoint(&mut self, location: &Location) -> RaceResult<BreakpointHandle> {
        self.next_handle += 1;
        let handle = BreakpointHandle(self.next_handle);
        self.breakpoints.insert(handle, (location.clone(), true));
        self.commands
            .push(Command::SetBreakpoint(location.clone(), handle));
        Ok(handle)
    }

    fn enable(&mut self, handle: BreakpointHandle) -> RaceResult<()> {
        self.known(handle)?;
        if self.stuck.contains(&handle) {
            return Err(RaceError::debugger(format!("Cannot enable breakpoint {handle}.")));
        }
        if let Some(bp) = self.breakpoints.get_mut(&handle) {
            bp.1 = true;
        }
        self.commands.push(Command::Enable(handle));
        Ok(())
    }

    fn disable(&mut self, handle: BreakpointHandle) -> RaceResult<()> {
        self.known(handle)?;
        if self.stuck.contains(&handle) {
            return Err(RaceError::debugger(format!("Cannot disable breakpoint {handle}.")));
        }
        if let Some(bp) = self.breakpoints.get_mut(&handle) {
            bp.1 = false;
        }
        self.commands.push(Command::Disable(handle));
        Ok(())
    }

    fn resume_thread(&mut self, thread: ThreadId) -> RaceResult<()> {
        if self.dead.contains(&thread) {
            return Err(RaceError::debugger(format!("Unknown thread {thread}.")));
        }
        match self.threads.get_mut(&thread) {
            Some(halted) => *halted = false,
            None => {
                self.threads.insert(thread, false);
            }
        }
        self.commands.push(Command::Resume(thread));
        Ok(())
    }

    fn halt_all_threads(&mut self) -> RaceResult<()> {
        self.commands.push(Command::HaltAll);
        Ok(())
    }

    fn all_threads_halted(&self) -> bool {
        self.threads.values().all(|halted| *halted)
    }

    fn current_thread_id(&self) -> Option<ThreadId> {
        self.current
    }

    fn dump_state(&mut self) -> RaceResult<()> {
        self.commands.push(Command::DumpState);
        Ok(())
    }

    fn terminate_controller(&mut self) {
        self.terminated = true;
        self.commands.push(Command::Terminate);
    }
}

/// [`FakeDebugger`] behind a shared handle, for handing ownership to a session
/// while the test keeps a way to look inside
#[derive(Debug, Clone, Default)]
pub struct SharedDebugger(Arc<Mutex<FakeDebugger>>);

impl SharedDebugger {
    pub fn new(fake: FakeDebugger) -> Self {
        Self(Arc::new(Mutex::new(fake)))
    }

    pub fn lock(&self) -> MutexGuard<'_, FakeDebugger> {
        self.0.lock()
    }
}

impl DebugControl for SharedDebugger {
    fn set_breakpoint(&mut self, location: &Location) -> RaceResult<BreakpointHandle> {
        self.0.lock().set_breakpoint(location)
    }

    fn enable(&mut self, handle: BreakpointHandle) -> RaceResult<()> {
        self.0.lock().enable(handle)
    }

    fn disable(&mut self, handle: BreakpointHandle) -> RaceResult<()> {
        self.0.lock().disable(handle)
    }

    fn resume_thread(&mut self, thread: ThreadId) -> RaceResult<()> {
        self.0.lock().resume_thread(thread)
    }

    fn halt_all_threads(&mut self) -> RaceResult<()> {
        self.0.lock().halt_all_threads()
    }

    fn all_threads_halted(&self) -> bool {
        self.0.lock().all_threads_halted()
    }

    fn current_thread_id(&self) -> Option<ThreadId> {
        self.0.lock().current_thread_id()
    }

    fn dump_state(&mut self) -> RaceResult<()> {
        self.0.lock().dump_state()
    }

    fn terminate_controller(&mut self) {
        self.0.lock().terminate_controller();
    }
}

/// Evaluator backed by a table of printed values
#[derive(Debug, Default)]
pub struct FakeContext {
    values: Mutex<HashMap<String, String>>,
    failing: Mutex<HashSet<String>>,
    selected_frame: Mutex<Option<usize>>,
    assignments: Mutex<Vec<(String, String)>>,
    evaluations: AtomicU32,
}

impl FakeContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, expression: &str, printed: &str) {
        self.values
            .lock()
            .insert(expression.to_string(), printed.to_string());
    }

    /// Make `expression` fail to evaluate, as with an undeclared symbol
    pub fn fail(&self, expression: &str) {
        self.failing.lock().insert(expression.to_string());
    }

    pub fn selected_frame(&self) -> Option<usize> {
        *self.selected_frame.lock()
    }

    pub fn assignments(&self) -> Vec<(String, String)> {
        self.assignments.lock().clone()
    }

    pub fn evaluations(&self) -> u32 {
        self.evaluations.load(Ordering::Relaxed)
    }
}

impl ContextEvaluator for FakeContext {
    fn evaluate_in_context(&self, expression: &str) -> RaceResult<String> {
        self.evaluations.fetch_add(1, Ordering::Relaxed);
        if self.failing.lock().contains(expression) {
            return Err(RaceError::evaluation(
                expression,
                "No symbol in current context.",
            ));
        }
        self.values
            .lock()
            .get(expression)
            .cloned()
            .ok_or_else(|| RaceError::evaluation(expression, "No symbol in current context."))
    }

    fn select_frame(&self, depth: usize) -> RaceResult<()> {
        *self.selected_frame.lock() = Some(depth);
        Ok(())
    }

    fn assign(&self, variable: &str, value: &str) -> RaceResult<()> {
        self.assignments
            .lock()
            .push((variable.to_string(), value.to_string()));
        Ok(())
    }
}

/// Driver that counts requests and can be told to fail the first N
#[derive(Debug, Default)]
pub struct RecordingDriver {
    requests: AtomicU32,
    failures_left: AtomicU32,
}

impl RecordingDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(times: u32) -> Self {
        Self {
            requests: AtomicU32::new(0),
            failures_left: AtomicU32::new(times),
        }
    }

    /// Requests attempted, including failed ones
    pub fn requests(&self) -> u32 {
        self.requests.load(Ordering::Relaxed)
    }
}

impl SafepointDriver for RecordingDriver {
    fn request_global_pause(&self) -> RaceResult<()> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        let left = self.failures_left.load(Ordering::Relaxed);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::Relaxed);
            return Err(RaceError::debugger("sh: jcmd: command not found"));
        }
        Ok(())
    }
}
