//! Safepoint gate
//!
//! Optional second barrier in front of the release: once both race
//! participants are halted, the gate asks the target to come to a global pause
//! and holds the release until the target is seen arriving there.
//!
//! # States
//!
//! ```text
//! Inactive --trigger()--> Triggered --notify_reached()--> Reached
//! ```
//!
//! Transitions are monotonic. Arrival is observed through a breakpoint the gate
//! sets at [`SafepointConfig::location`] when triggered.

use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::config::{SafepointConfig, SafepointDrive};
use crate::control::{Collaborators, DebugControl, SafepointDriver};
use crate::error::{RaceError, RaceResult};
use crate::types::{BreakpointHandle, Location};

/// Safepoint gate state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// No safepoint requested yet
    Inactive,
    /// Requested, waiting for arrival
    Triggered,
    /// Target reached a safepoint
    Reached,
}

/// Gate holding the release until the target reaches a safepoint
#[derive(Debug)]
pub struct SafepointGate {
    config: SafepointConfig,
    state: GateState,
    handle: Option<BreakpointHandle>,
    triggered_at: Option<Instant>,
}

impl SafepointGate {
    pub fn new(config: SafepointConfig) -> Self {
        Self {
            config,
            state: GateState::Inactive,
            handle: None,
            triggered_at: None,
        }
    }

    /// Start waiting for a safepoint
    ///
    /// Sets the arrival breakpoint, then (for [`SafepointDrive::External`])
    /// issues the pause request, retrying initiation up to
    /// `request_attempts` times. Only the first call has any effect.
    pub fn trigger(&mut self, collab: &mut Collaborators<'_>) -> RaceResult<()> {
        if self.state != GateState::Inactive {
            return Ok(());
        }

        // Arrival breakpoint goes in before the request so an immediate
        // safepoint cannot slip past.
        let handle = collab.control.set_breakpoint(&self.config.location)?;
        self.handle = Some(handle);
        self.state = GateState::Triggered;
        self.triggered_at = Some(Instant::now());
        info!(location = %self.config.location, drive = ?self.config.drive, "waiting for safepoint");

        match self.config.drive {
            SafepointDrive::External => self.request(collab.driver),
            SafepointDrive::Passive => Ok(()),
        }
    }

    fn request(&self, driver: &dyn SafepointDriver) -> RaceResult<()> {
        let attempts = self.config.request_attempts.max(1);
        let mut last_error = None;
        for attempt in 1..=attempts {
            match driver.request_global_pause() {
                Ok(()) => {
                    info!(attempt, "safepoint requested");
                    return Ok(());
                }
                Err(e) => {
                    warn!(attempt, error = %e, "safepoint request failed");
                    last_error = Some(e);
                }
            }
        }
        Err(RaceError::SafepointRequest {
            attempts,
            message: last_error.map(|e| e.to_string()).unwrap_or_default(),
        })
    }

    /// Record arrival at the safepoint
    ///
    /// Returns `true` on the Triggered -> Reached transition, `false` if the
    /// gate was not waiting. A breakpoint that cannot be disabled only costs
    /// extra hits, which a reached gate ignores.
    pub fn notify_reached(&mut self, control: &mut dyn DebugControl) -> RaceResult<bool> {
        if self.state != GateState::Triggered {
            return Ok(false);
        }
        self.state = GateState::Reached;
        if let Some(handle) = self.handle
            && let Err(e) = control.disable(handle)
        {
            warn!(handle = %handle, error = %e, "safepoint breakpoint left enabled");
        }
        info!("safepoint reached");
        Ok(true)
    }

    /// Fail once the gate has waited longer than the configured timeout
    pub fn check_timeout(&self, now: Instant) -> RaceResult<()> {
        match (self.remaining(now), self.config.timeout()) {
            (Some(left), Some(timeout)) if left.is_zero() => Err(RaceError::SafepointTimeout(timeout)),
            _ => Ok(()),
        }
    }

    /// Time left before the timeout fires, while waiting with a timeout set
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        if self.state != GateState::Triggered {
            return None;
        }
        let timeout = self.config.timeout()?;
        let since = self.triggered_at?;
        Some(timeout.saturating_sub(now.saturating_duration_since(since)))
    }

    pub fn owns(&self, handle: BreakpointHandle) -> bool {
        self.handle == Some(handle)
    }

    pub fn location(&self) -> &Location {
        &self.config.location
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn is_reached(&self) -> bool {
        self.state == GateState::Reached
    }
}
