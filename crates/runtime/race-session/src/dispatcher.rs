//! Notification dispatch
//!
//! Single entry point for everything the debug layer reports. Each
//! notification is classified and routed:
//!
//! - abort signal -> halt all threads, drain, dump, terminate
//! - other signal -> resume the thread, coordinator untouched
//! - breakpoint hit -> coordinator and probes at that location; resume unless
//!   a watchpoint claimed the thread
//! - exit -> tear the session down
//!
//! Handlers only enqueue resumes. [`EventDispatcher::flush`] issues them and
//! must be called after [`EventDispatcher::on_event`] has returned.

use std::time::{Duration, Instant};

use race_core::{BreakpointHandle, Location, Notification, RaceError, RaceResult, SignalKind, ThreadId};
use tracing::{debug, error, info, warn};

use crate::session::{AbortReason, ControllerState, Mode, RunOutcome, Session};

/// Whether the controller keeps going after a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Terminated,
}

/// Routes notifications into a [`Session`]
pub struct EventDispatcher {
    session: Session,
}

impl EventDispatcher {
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    /// Handle one notification
    ///
    /// Fatal errors (safepoint request/timeout) do not escape: they switch the
    /// session onto the abort path. Other collaborator errors are returned and
    /// leave the session running.
    pub fn on_event(&mut self, notification: Notification) -> RaceResult<Flow> {
        match self.session.mode {
            Mode::Terminated(_) => return Err(RaceError::SessionTerminated),
            Mode::Draining(_) => return self.on_draining_event(notification),
            Mode::Running => {}
        }

        // A gone target cannot be halted, so exit wins over a lapsed deadline.
        if let Notification::Exited { code } = notification {
            let released = self.session.coordinator.is_released();
            info!(code = ?code, released, "target exited");
            return Ok(self.terminate(RunOutcome::Exited { code, released }));
        }

        if let Err(e) = self.session.coordinator.check_timeout(Instant::now()) {
            return self.begin_abort(AbortReason::Fatal(e.to_string()));
        }

        match notification {
            Notification::Signal { thread, signal } => self.on_signal(thread, signal),
            Notification::BreakpointHit { handle, thread } => self.on_breakpoint(handle, thread),
            Notification::Stopped { thread } => {
                debug!(thread = %thread, "thread stopped");
                Ok(Flow::Continue)
            }
            Notification::Exited { .. } => Ok(Flow::Continue),
        }
    }

    /// Issue queued resumes
    ///
    /// Call only after `on_event` has returned. Once the session is
    /// terminated, pending resumes are dropped instead.
    pub fn flush(&mut self) -> RaceResult<usize> {
        if matches!(self.session.mode, Mode::Terminated(_)) {
            self.session.queue.clear();
            return Ok(0);
        }
        let session = &mut self.session;
        session.queue.drain(session.backend.control.as_mut())
    }

    /// Enforce the safepoint timeout between notifications
    pub fn poll_timeout(&mut self, now: Instant) -> RaceResult<Flow> {
        if self.session.mode != Mode::Running {
            return Ok(self.flow());
        }
        match self.session.coordinator.check_timeout(now) {
            Ok(()) => Ok(Flow::Continue),
            Err(e) => self.begin_abort(AbortReason::Fatal(e.to_string())),
        }
    }

    /// Time left on a running safepoint wait, if it has a timeout
    pub fn safepoint_remaining(&self, now: Instant) -> Option<Duration> {
        if self.session.mode != Mode::Running {
            return None;
        }
        self.session.coordinator.safepoint_remaining(now)
    }

    pub fn state(&self) -> ControllerState {
        self.session.state()
    }

    pub fn outcome(&self) -> Option<&RunOutcome> {
        self.session.outcome()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn into_session(self) -> Session {
        self.session
    }

    fn on_signal(&mut self, thread: ThreadId, signal: SignalKind) -> RaceResult<Flow> {
        if signal.is_abort() {
            return self.begin_abort(AbortReason::Signal { thread });
        }
        debug!(thread = %thread, signal = %signal, "passing over signal");
        self.session.queue.enqueue(thread);
        Ok(Flow::Continue)
    }

    fn on_breakpoint(&mut self, handle: BreakpointHandle, thread: ThreadId) -> RaceResult<Flow> {
        let Some(location) = self.locate(handle) else {
            warn!(handle = %handle, thread = %thread, "hit on foreign breakpoint, resuming");
            self.session.queue.enqueue(thread);
            return Err(RaceError::UnknownBreakpoint(handle));
        };

        let parts = self.session.parts();
        let mut collab = parts.collab;
        let outcome = match parts
            .coordinator
            .on_breakpoint(&location, thread, &mut collab, parts.queue)
        {
            Ok(outcome) => outcome,
            Err(e) if e.is_fatal() => {
                error!(error = %e, "rendezvous cannot proceed");
                return self.begin_abort(AbortReason::Fatal(e.to_string()));
            }
            Err(e) => {
                if !parts.coordinator.holds(thread) {
                    parts.queue.enqueue(thread);
                }
                return Err(e);
            }
        };

        for probe in parts.probes.iter_mut().filter(|p| p.location() == &location) {
            if let Err(e) = probe.fire(thread, collab.context) {
                warn!(location = %location, error = %e, "probe action failed");
            }
        }

        if !outcome.keeps_thread_halted() {
            parts.queue.enqueue(thread);
        }
        Ok(Flow::Continue)
    }

    fn locate(&self, handle: BreakpointHandle) -> Option<Location> {
        self.session.coordinator.locate(handle).cloned().or_else(|| {
            self.session
                .probes
                .iter()
                .find(|p| p.owns(handle))
                .map(|p| p.location().clone())
        })
    }

    fn begin_abort(&mut self, reason: AbortReason) -> RaceResult<Flow> {
        // A pending release must never run once the abort path starts.
        self.session.queue.clear();
        warn!(reason = ?reason, "Stop all threads...");
        let control = self.session.backend.control.as_mut();
        if let Some(current) = control.current_thread_id() {
            debug!(thread = %current, "current thread at abort");
        }
        self.session.mode = Mode::Draining(reason);
        control.halt_all_threads()?;
        Ok(self.check_drained())
    }

    fn on_draining_event(&mut self, notification: Notification) -> RaceResult<Flow> {
        if let Notification::Exited { code } = notification {
            let Mode::Draining(reason) = self.session.mode.clone() else {
                return Ok(self.flow());
            };
            warn!(code = ?code, "target exited before every thread halted");
            return Ok(self.terminate(RunOutcome::Aborted {
                reason,
                dumped: false,
            }));
        }
        debug!(notification = ?notification, "draining");
        Ok(self.check_drained())
    }

    fn check_drained(&mut self) -> Flow {
        let Mode::Draining(reason) = self.session.mode.clone() else {
            return self.flow();
        };
        let control = self.session.backend.control.as_mut();
        if !control.all_threads_halted() {
            return Flow::Continue;
        }

        info!("Dumping core...");
        let dumped = match control.dump_state() {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "state dump failed");
                false
            }
        };
        self.terminate(RunOutcome::Aborted { reason, dumped })
    }

    fn terminate(&mut self, outcome: RunOutcome) -> Flow {
        self.session.queue.clear();
        self.session.backend.control.terminate_controller();
        info!(outcome = ?outcome, "controller terminated");
        self.session.mode = Mode::Terminated(outcome);
        Flow::Terminated
    }

    fn flow(&self) -> Flow {
        match self.session.mode {
            Mode::Terminated(_) => Flow::Terminated,
            _ => Flow::Continue,
        }
    }
}

/// Shorthand used by the pump and tests: dispatch, then flush
pub fn dispatch_and_flush(dispatcher: &mut EventDispatcher, notification: Notification) -> RaceResult<Flow> {
    let flow = dispatcher.on_event(notification);
    let flushed = dispatcher.flush();
    let flow = flow?;
    flushed?;
    Ok(flow)
}
