//! Auxiliary probes
//!
//! Breakpoints that never hold a thread. On every hit they perform one action
//! against the target (typically flipping a flag so the race window opens) and
//! let the thread continue.

use race_core::{BreakpointHandle, ContextEvaluator, DebugControl, Location, RaceResult, ThreadId};
use serde::{Deserialize, Serialize};
use tracing::info;

/// What a probe does when hit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProbeAction {
    /// Store a value into a target variable
    Assign { variable: String, value: String },
    /// Print an expression
    Evaluate { expression: String },
}

/// Side-effect breakpoint
#[derive(Debug)]
pub struct AuxiliaryProbe {
    location: Location,
    action: ProbeAction,
    handle: Option<BreakpointHandle>,
    fired: u64,
}

impl AuxiliaryProbe {
    pub fn new(location: impl Into<Location>, action: ProbeAction) -> Self {
        Self {
            location: location.into(),
            action,
            handle: None,
            fired: 0,
        }
    }

    /// Probe that assigns `value` to `variable` on every hit
    pub fn assign(location: impl Into<Location>, variable: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(
            location,
            ProbeAction::Assign {
                variable: variable.into(),
                value: value.into(),
            },
        )
    }

    /// Probe that prints `expression` on every hit
    pub fn evaluate(location: impl Into<Location>, expression: impl Into<String>) -> Self {
        Self::new(
            location,
            ProbeAction::Evaluate {
                expression: expression.into(),
            },
        )
    }

    pub fn install(&mut self, control: &mut dyn DebugControl) -> RaceResult<BreakpointHandle> {
        if let Some(handle) = self.handle {
            return Ok(handle);
        }
        let handle = control.set_breakpoint(&self.location)?;
        self.handle = Some(handle);
        Ok(handle)
    }

    /// Run the action for a hit by `thread`
    pub fn fire(&mut self, thread: ThreadId, ctx: &dyn ContextEvaluator) -> RaceResult<()> {
        self.fired += 1;
        match &self.action {
            ProbeAction::Assign { variable, value } => {
                ctx.assign(variable, value)?;
                info!(thread = %thread, location = %self.location, "set {} to {}", value, variable);
            }
            ProbeAction::Evaluate { expression } => {
                let printed = ctx.evaluate_in_context(expression)?;
                info!(thread = %thread, location = %self.location, probe = %expression, "{}", printed);
            }
        }
        Ok(())
    }

    pub fn owns(&self, handle: BreakpointHandle) -> bool {
        self.handle == Some(handle)
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn action(&self) -> &ProbeAction {
        &self.action
    }

    pub fn fired(&self) -> u64 {
        self.fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use race_core::testing::{FakeContext, FakeDebugger};

    #[test]
    fn test_assign_probe() {
        let ctx = FakeContext::new();
        let mut probe = AuxiliaryProbe::assign("data_dump", "ReduceSignalUsage", "true");
        probe.fire(ThreadId(4), &ctx).unwrap();
        probe.fire(ThreadId(4), &ctx).unwrap();

        assert_eq!(probe.fired(), 2);
        assert_eq!(
            ctx.assignments(),
            vec![
                ("ReduceSignalUsage".to_string(), "true".to_string()),
                ("ReduceSignalUsage".to_string(), "true".to_string()),
            ]
        );
    }

    #[test]
    fn test_evaluate_probe_error() {
        let ctx = FakeContext::new();
        let mut probe = AuxiliaryProbe::evaluate("JvmtiExport::should_post_data_dump", "missing");
        assert!(probe.fire(ThreadId(1), &ctx).is_err());
    }

    #[test]
    fn test_install_once() {
        let mut fake = FakeDebugger::new();
        let mut probe = AuxiliaryProbe::assign("data_dump", "ReduceSignalUsage", "true");
        let first = probe.install(&mut fake).unwrap();
        let second = probe.install(&mut fake).unwrap();
        assert_eq!(first, second);
        assert_eq!(fake.handles_at("data_dump"), vec![first]);
        assert!(probe.owns(first));
    }
}
