//! Error types for race reproduction sessions

use std::time::Duration;

use crate::types::BreakpointHandle;

/// Race session result type
pub type RaceResult<T> = Result<T, RaceError>;

/// Errors raised while coordinating a race reproduction
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RaceError {
    /// A command sent to the debug-control layer failed
    #[error("Debugger command failed: {0}")]
    Debugger(String),

    /// An expression could not be evaluated in the target's current context
    #[error("Cannot evaluate `{expression}`: {message}")]
    Evaluation {
        /// Expression that was evaluated
        expression: String,
        /// Reason reported by the evaluator
        message: String,
    },

    /// The safepoint driver could not start the global pause
    #[error("Safepoint request could not be initiated after {attempts} attempt(s): {message}")]
    SafepointRequest {
        /// Attempts made before giving up
        attempts: u32,
        /// Last failure reported by the driver
        message: String,
    },

    /// The target did not reach a safepoint in time
    #[error("Safepoint not reached within {0:?}")]
    SafepointTimeout(Duration),

    /// A breakpoint notification referenced a handle this session never set
    #[error("Breakpoint {0} is not owned by this session")]
    UnknownBreakpoint(BreakpointHandle),

    /// Invalid configuration
    #[error("Invalid race configuration: {0}")]
    InvalidConfig(String),

    /// The session already reached a terminal state
    #[error("Session already terminated")]
    SessionTerminated,
}

impl RaceError {
    /// Create a debugger command error
    pub fn debugger(msg: impl Into<String>) -> Self {
        Self::Debugger(msg.into())
    }

    /// Create an evaluation error
    pub fn evaluation(expression: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Evaluation {
            expression: expression.into(),
            message: message.into(),
        }
    }

    /// Create an invalid config error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Whether this error ends the run through the evidence-preserving path
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::SafepointRequest { .. } | Self::SafepointTimeout(_)
        )
    }
}
