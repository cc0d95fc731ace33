//! Conditional breakpoints that catch one thread each
//!
//! A [`WatchPoint`] owns a debugger breakpoint plus a [`Condition`]. The first
//! thread that halts at the location while the watchpoint is armed and the
//! condition holds is recorded and kept halted; the watchpoint then disarms
//! itself and ignores every later hit until explicitly rearmed.

use std::fmt;

use tracing::{debug, info, warn};

use crate::condition::Condition;
use crate::control::{Collaborators, DebugControl};
use crate::error::RaceResult;
use crate::types::{BreakpointHandle, Location, ThreadId};

/// One race participant's breakpoint
pub struct WatchPoint {
    label: String,
    location: Location,
    condition: Box<dyn Condition>,
    handle: Option<BreakpointHandle>,
    armed: bool,
    triggered_thread: Option<ThreadId>,
    hits: u64,
}

impl WatchPoint {
    /// Create a watchpoint; nothing is set in the debugger until [`install`](Self::install)
    pub fn new(
        label: impl Into<String>,
        location: impl Into<Location>,
        condition: Box<dyn Condition>,
        armed: bool,
    ) -> Self {
        Self {
            label: label.into(),
            location: location.into(),
            condition,
            handle: None,
            armed,
            triggered_thread: None,
            hits: 0,
        }
    }

    /// Set the breakpoint, leaving it disabled when the watchpoint starts disarmed
    pub fn install(&mut self, control: &mut dyn DebugControl) -> RaceResult<BreakpointHandle> {
        if let Some(handle) = self.handle {
            return Ok(handle);
        }
        let handle = control.set_breakpoint(&self.location)?;
        if !self.armed {
            control.disable(handle)?;
        }
        self.handle = Some(handle);
        debug!(
            watchpoint = %self.label,
            location = %self.location,
            handle = %handle,
            armed = self.armed,
            "breakpoint installed"
        );
        Ok(handle)
    }

    /// Handle a halt at this watchpoint's location
    ///
    /// Returns `true` when the halting thread is the one being waited for and
    /// must stay halted. A disarmed watchpoint returns `false` without
    /// evaluating its condition, and so does a condition that fails to
    /// evaluate.
    pub fn on_hit(&mut self, thread: ThreadId, collab: &mut Collaborators<'_>) -> RaceResult<bool> {
        self.hits += 1;
        if !self.armed {
            return Ok(false);
        }

        let matched = match self.condition.evaluate(collab.context) {
            Ok(matched) => matched,
            Err(e) => {
                debug!(
                    watchpoint = %self.label,
                    thread = %thread,
                    error = %e,
                    "condition not evaluable, treating as false"
                );
                false
            }
        };
        if !matched {
            return Ok(false);
        }

        self.triggered_thread = Some(thread);
        self.armed = false;
        // Later hits on a disarmed watchpoint are ignored, so a stuck
        // breakpoint must not undo the capture.
        if let Some(handle) = self.handle
            && let Err(e) = collab.control.disable(handle)
        {
            warn!(watchpoint = %self.label, handle = %handle, error = %e, "breakpoint left enabled");
        }
        info!(watchpoint = %self.label, thread = %thread, "Suspend thread #{}", thread);
        Ok(true)
    }

    /// Enable the breakpoint again
    ///
    /// No-op once a thread has been recorded: a watchpoint catches one thread per run.
    pub fn arm(&mut self, control: &mut dyn DebugControl) -> RaceResult<()> {
        if self.armed || self.triggered_thread.is_some() {
            return Ok(());
        }
        if let Some(handle) = self.handle {
            control.enable(handle)?;
        }
        self.armed = true;
        debug!(watchpoint = %self.label, location = %self.location, "armed");
        Ok(())
    }

    pub fn disarm(&mut self, control: &mut dyn DebugControl) -> RaceResult<()> {
        if !self.armed {
            return Ok(());
        }
        if let Some(handle) = self.handle {
            control.disable(handle)?;
        }
        self.armed = false;
        Ok(())
    }

    pub fn owns(&self, handle: BreakpointHandle) -> bool {
        self.handle == Some(handle)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn handle(&self) -> Option<BreakpointHandle> {
        self.handle
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn triggered_thread(&self) -> Option<ThreadId> {
        self.triggered_thread
    }

    pub fn has_triggered(&self) -> bool {
        self.triggered_thread.is_some()
    }

    /// Halts seen at this location, including ignored ones
    pub fn hits(&self) -> u64 {
        self.hits
    }
}

impl fmt::Debug for WatchPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchPoint")
            .field("label", &self.label)
            .field("location", &self.location)
            .field("condition", &self.condition.describe())
            .field("handle", &self.handle)
            .field("armed", &self.armed)
            .field("triggered_thread", &self.triggered_thread)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::{Always, FlagMask, from_fn};
    use crate::control::NoopDriver;
    use crate::testing::{Command, FakeContext, FakeDebugger};

    fn collab<'a>(fake: &'a mut FakeDebugger, ctx: &'a FakeContext) -> Collaborators<'a> {
        Collaborators {
            control: fake,
            context: ctx,
            driver: &NoopDriver,
        }
    }

    #[test]
    fn test_install_disarmed_disables_breakpoint() {
        let mut fake = FakeDebugger::new();
        let mut wp = WatchPoint::new("secondary", "OnMonitorWait", Box::new(Always), false);
        let handle = wp.install(&mut fake).unwrap();

        assert!(!fake.is_enabled(handle));
        assert_eq!(
            fake.commands(),
            &[
                Command::SetBreakpoint(Location::new("OnMonitorWait"), handle),
                Command::Disable(handle),
            ]
        );
    }

    #[test]
    fn test_trigger_records_thread_and_disarms() {
        let mut fake = FakeDebugger::new();
        let ctx = FakeContext::new();
        let mut wp = WatchPoint::new("primary", "OnClassPrepare", Box::new(Always), true);
        let handle = wp.install(&mut fake).unwrap();

        assert!(wp.on_hit(ThreadId(7), &mut collab(&mut fake, &ctx)).unwrap());
        assert_eq!(wp.triggered_thread(), Some(ThreadId(7)));
        assert!(!wp.is_armed());
        assert!(!fake.is_enabled(handle));
    }

    #[test]
    fn test_capture_survives_stuck_breakpoint() {
        let mut fake = FakeDebugger::new();
        let ctx = FakeContext::new();
        let mut wp = WatchPoint::new("primary", "OnClassPrepare", Box::new(Always), true);
        let handle = wp.install(&mut fake).unwrap();
        fake.jam(handle);

        assert!(wp.on_hit(ThreadId(7), &mut collab(&mut fake, &ctx)).unwrap());
        assert_eq!(wp.triggered_thread(), Some(ThreadId(7)));
        assert!(!wp.is_armed());
        assert!(!wp.on_hit(ThreadId(8), &mut collab(&mut fake, &ctx)).unwrap());
    }

    #[test]
    fn test_second_hit_short_circuits() {
        let mut fake = FakeDebugger::new();
        let ctx = FakeContext::new();
        ctx.set("flags", "$1 = 4");
        let mut wp = WatchPoint::new("primary", "OnResourceExhausted", Box::new(FlagMask::new("flags", 4)), true);
        wp.install(&mut fake).unwrap();

        assert!(wp.on_hit(ThreadId(1), &mut collab(&mut fake, &ctx)).unwrap());
        let evaluated = ctx.evaluations();
        assert!(!wp.on_hit(ThreadId(2), &mut collab(&mut fake, &ctx)).unwrap());

        assert_eq!(ctx.evaluations(), evaluated);
        assert_eq!(wp.triggered_thread(), Some(ThreadId(1)));
        assert_eq!(wp.hits(), 2);
    }

    #[test]
    fn test_false_condition_leaves_state() {
        let mut fake = FakeDebugger::new();
        let ctx = FakeContext::new();
        let mut wp = WatchPoint::new("primary", "L1", Box::new(from_fn("never", |_| Ok(false))), true);
        wp.install(&mut fake).unwrap();

        assert!(!wp.on_hit(ThreadId(3), &mut collab(&mut fake, &ctx)).unwrap());
        assert!(wp.is_armed());
        assert!(!wp.has_triggered());
    }

    #[test]
    fn test_evaluation_error_is_false() {
        let mut fake = FakeDebugger::new();
        let ctx = FakeContext::new();
        ctx.fail("flags");
        let mut wp = WatchPoint::new("primary", "L1", Box::new(FlagMask::new("flags", 2)), true);
        wp.install(&mut fake).unwrap();

        assert!(!wp.on_hit(ThreadId(3), &mut collab(&mut fake, &ctx)).unwrap());
        assert!(wp.is_armed());
    }

    #[test]
    fn test_arm_after_trigger_is_noop() {
        let mut fake = FakeDebugger::new();
        let ctx = FakeContext::new();
        let mut wp = WatchPoint::new("secondary", "L2", Box::new(Always), true);
        wp.install(&mut fake).unwrap();
        wp.on_hit(ThreadId(9), &mut collab(&mut fake, &ctx)).unwrap();

        fake.clear_commands();
        wp.arm(&mut fake).unwrap();
        assert!(!wp.is_armed());
        assert!(fake.commands().is_empty());
    }
}
