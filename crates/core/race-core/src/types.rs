//! Identifiers shared between the controller and the debug-control layer

use std::fmt;

use serde::{Deserialize, Serialize};

/// Debugger-assigned thread number in the target process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ThreadId(pub u32);

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque handle returned when a breakpoint is set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BreakpointHandle(pub u64);

impl fmt::Display for BreakpointHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Breakpoint location spec, e.g. `OnClassPrepare` or `file.cpp:LABEL`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Location(String);

impl Location {
    pub fn new(spec: impl Into<String>) -> Self {
        Self(spec.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Location {
    fn from(spec: &str) -> Self {
        Self::new(spec)
    }
}

impl From<String> for Location {
    fn from(spec: String) -> Self {
        Self(spec)
    }
}

/// Signal reported with a stop
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalKind {
    /// Process abort; starts the evidence-preserving shutdown
    Abort,
    /// Anything else, kept by name
    Other(String),
}

impl SignalKind {
    /// Classify a signal by the name the debugger reports
    pub fn from_name(name: &str) -> Self {
        match name.trim() {
            "SIGABRT" | "SIGIOT" | "ABRT" => Self::Abort,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn is_abort(&self) -> bool {
        matches!(self, Self::Abort)
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Abort => f.write_str("SIGABRT"),
            Self::Other(name) => f.write_str(name),
        }
    }
}
