//! Scenario configuration
//!
//! Conditions are code and are passed separately; everything else a scenario
//! needs is plain data here.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RaceError, RaceResult};
use crate::types::Location;

/// Default location whose hit marks the target reaching a safepoint
pub const DEFAULT_SAFEPOINT_LOCATION: &str = "Interpreter::notice_safepoints";

/// How the safepoint gate gets the target to a safepoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SafepointDrive {
    /// Issue an external pause request through the [`SafepointDriver`](crate::SafepointDriver)
    #[default]
    External,
    /// Wait for the target to reach a safepoint on its own
    Passive,
}

/// Safepoint gate settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafepointConfig {
    /// Breakpoint location hit when the target reaches a safepoint
    pub location: Location,
    pub drive: SafepointDrive,
    /// Attempts at initiating the external request before giving up
    pub request_attempts: u32,
    /// Give up waiting after this long; `None` waits until the target exits
    pub timeout_ms: Option<u64>,
}

impl Default for SafepointConfig {
    fn default() -> Self {
        Self {
            location: Location::new(DEFAULT_SAFEPOINT_LOCATION),
            drive: SafepointDrive::External,
            request_attempts: 3,
            timeout_ms: None,
        }
    }
}

impl SafepointConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// Configuration of one race reproduction run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaceConfig {
    pub primary_location: Location,
    pub secondary_location: Location,
    /// Watch the secondary location from the start instead of after the
    /// primary thread is caught
    pub secondary_initially_enabled: bool,
    /// Release the secondary thread first
    pub reverse_order: bool,
    /// Hold the release until the target reaches a safepoint
    pub require_safepoint: bool,
    pub safepoint: SafepointConfig,
    /// Expression printed when the threads are released
    pub release_probe: Option<String>,
}

impl Default for RaceConfig {
    fn default() -> Self {
        Self {
            primary_location: Location::new(""),
            secondary_location: Location::new(""),
            secondary_initially_enabled: true,
            reverse_order: false,
            require_safepoint: false,
            safepoint: SafepointConfig::default(),
            release_probe: None,
        }
    }
}

impl RaceConfig {
    pub fn new(primary: impl Into<Location>, secondary: impl Into<Location>) -> Self {
        Self {
            primary_location: primary.into(),
            secondary_location: secondary.into(),
            ..Default::default()
        }
    }

    pub fn with_secondary_enabled(mut self, enabled: bool) -> Self {
        self.secondary_initially_enabled = enabled;
        self
    }

    pub fn with_reverse_order(mut self, reverse: bool) -> Self {
        self.reverse_order = reverse;
        self
    }

    pub fn with_safepoint(mut self, required: bool) -> Self {
        self.require_safepoint = required;
        self
    }

    pub fn with_safepoint_config(mut self, safepoint: SafepointConfig) -> Self {
        self.safepoint = safepoint;
        self
    }

    pub fn with_release_probe(mut self, expression: impl Into<String>) -> Self {
        self.release_probe = Some(expression.into());
        self
    }

    pub fn validate(&self) -> RaceResult<()> {
        if self.primary_location.is_empty() {
            return Err(RaceError::invalid_config("primary location is empty"));
        }
        if self.secondary_location.is_empty() {
            return Err(RaceError::invalid_config("secondary location is empty"));
        }
        if self.require_safepoint {
            if self.safepoint.location.is_empty() {
                return Err(RaceError::invalid_config("safepoint location is empty"));
            }
            if self.safepoint.drive == SafepointDrive::External && self.safepoint.request_attempts == 0 {
                return Err(RaceError::invalid_config(
                    "safepoint request_attempts must be at least 1",
                ));
            }
        }
        Ok(())
    }
}
