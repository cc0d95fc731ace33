//! Collaborator seams
//!
//! The controller never talks to a process directly. Everything it needs from
//! the outside world goes through three traits:
//!
//! - [`DebugControl`]: breakpoints, thread resume/halt, dumps, shutdown
//! - [`ContextEvaluator`]: reads (and, for probes, writes) target state in the
//!   context of the currently halted thread
//! - [`SafepointDriver`]: pushes the whole target toward a global pause
//!
//! Notifications flow the other way as [`Notification`] values, one at a time.

use serde::{Deserialize, Serialize};

use crate::error::RaceResult;
use crate::types::{BreakpointHandle, Location, SignalKind, ThreadId};

/// Process-control commands consumed from the debugger
pub trait DebugControl: Send {
    /// Set a breakpoint; it starts out enabled
    fn set_breakpoint(&mut self, location: &Location) -> RaceResult<BreakpointHandle>;

    fn enable(&mut self, handle: BreakpointHandle) -> RaceResult<()>;

    fn disable(&mut self, handle: BreakpointHandle) -> RaceResult<()>;

    /// Let a single halted thread continue
    ///
    /// Must not be called from inside the notification that halted `thread`.
    fn resume_thread(&mut self, thread: ThreadId) -> RaceResult<()>;

    /// Ask every thread in the target to stop
    fn halt_all_threads(&mut self) -> RaceResult<()>;

    /// True once every thread of the target reports halted
    fn all_threads_halted(&self) -> bool;

    fn current_thread_id(&self) -> Option<ThreadId>;

    /// Write a diagnostic dump (core file) of the target
    fn dump_state(&mut self) -> RaceResult<()>;

    /// Detach and stop the controller
    fn terminate_controller(&mut self);
}

/// Expression evaluation against the halted thread's context
pub trait ContextEvaluator: Send + Sync {
    /// Evaluate an expression and return its printed value
    fn evaluate_in_context(&self, expression: &str) -> RaceResult<String>;

    /// Select a frame of the current thread, 0 being the innermost
    fn select_frame(&self, depth: usize) -> RaceResult<()>;

    /// Store `value` into a target variable
    fn assign(&self, variable: &str, value: &str) -> RaceResult<()>;
}

/// External trigger for a global pause (e.g. a GC request)
pub trait SafepointDriver: Send + Sync {
    /// Start the request and return without waiting for it
    ///
    /// An error means the request could not be initiated at all.
    fn request_global_pause(&self) -> RaceResult<()>;
}

/// Borrowed collaborators for the duration of one notification
pub struct Collaborators<'a> {
    pub control: &'a mut dyn DebugControl,
    pub context: &'a dyn ContextEvaluator,
    pub driver: &'a dyn SafepointDriver,
}

/// Notification delivered by the debug-control layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Notification {
    /// A thread stopped because it received a signal
    Signal { thread: ThreadId, signal: SignalKind },
    /// A thread stopped at one of our breakpoints
    BreakpointHit {
        handle: BreakpointHandle,
        thread: ThreadId,
    },
    /// A thread stopped for any other reason (e.g. after halt-all)
    Stopped { thread: ThreadId },
    /// The target process exited
    Exited { code: Option<i32> },
}

impl Notification {
    /// Thread the notification is about, if any
    pub fn thread(&self) -> Option<ThreadId> {
        match self {
            Self::Signal { thread, .. }
            | Self::BreakpointHit { thread, .. }
            | Self::Stopped { thread } => Some(*thread),
            Self::Exited { .. } => None,
        }
    }
}

/// Driver that never drives anything, for passive safepoint scenarios
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDriver;

impl SafepointDriver for NoopDriver {
    fn request_global_pause(&self) -> RaceResult<()> {
        Ok(())
    }
}
