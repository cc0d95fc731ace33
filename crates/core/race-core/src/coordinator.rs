//! Two-slot rendezvous
//!
//! The coordinator owns the primary and secondary [`WatchPoint`]s and decides,
//! after every watchpoint transition, whether to start watching for the
//! secondary participant, whether to wait on a safepoint, and when to release
//! both halted threads. Releases are enqueued on a [`DeferredResumeQueue`] in
//! the configured order; issuing them is left to the notification loop.
//!
//! Ordering is a command-order guarantee only: the thread resumed first gets a
//! head start, but the OS scheduler still decides who actually runs first.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::condition::Condition;
use crate::config::{RaceConfig, SafepointConfig};
use crate::control::{Collaborators, DebugControl};
use crate::error::RaceResult;
use crate::queue::DeferredResumeQueue;
use crate::safepoint::{GateState, SafepointGate};
use crate::types::{BreakpointHandle, Location, ThreadId};
use crate::watchpoint::WatchPoint;

/// Progress of the rendezvous
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendezvousPhase {
    /// Watching, nothing caught
    Armed,
    PrimaryCaught,
    SecondaryCaught,
    /// Both threads halted, release not yet issued
    BothCaught,
    SafepointTriggered,
    SafepointReached,
    Released,
}

/// What a breakpoint hit meant to the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitOutcome {
    /// A watchpoint caught the thread; keep it halted
    Caught,
    /// The thread announced a safepoint; it may continue
    SafepointArrival,
    /// Not a halt of interest; the thread may continue
    Ignored,
}

impl HitOutcome {
    pub fn keeps_thread_halted(self) -> bool {
        matches!(self, Self::Caught)
    }
}

/// Primary/secondary rendezvous with optional safepoint gating
#[derive(Debug)]
pub struct RendezvousCoordinator {
    primary: WatchPoint,
    secondary: WatchPoint,
    secondary_initially_enabled: bool,
    reverse_order: bool,
    require_safepoint: bool,
    safepoint_config: SafepointConfig,
    gate: Option<SafepointGate>,
    release_probe: Option<String>,
    released: bool,
}

impl RendezvousCoordinator {
    pub fn new(
        config: &RaceConfig,
        primary_condition: Box<dyn Condition>,
        secondary_condition: Box<dyn Condition>,
    ) -> Self {
        Self {
            primary: WatchPoint::new("primary", config.primary_location.clone(), primary_condition, true),
            secondary: WatchPoint::new(
                "secondary",
                config.secondary_location.clone(),
                secondary_condition,
                config.secondary_initially_enabled,
            ),
            secondary_initially_enabled: config.secondary_initially_enabled,
            reverse_order: config.reverse_order,
            require_safepoint: config.require_safepoint,
            safepoint_config: config.safepoint.clone(),
            gate: None,
            release_probe: config.release_probe.clone(),
            released: false,
        }
    }

    /// Set both watchpoint breakpoints in the debugger
    pub fn install(&mut self, control: &mut dyn DebugControl) -> RaceResult<()> {
        self.primary.install(control)?;
        self.secondary.install(control)?;
        Ok(())
    }

    /// Location of a breakpoint this coordinator owns
    pub fn locate(&self, handle: BreakpointHandle) -> Option<&Location> {
        if self.primary.owns(handle) {
            Some(self.primary.location())
        } else if self.secondary.owns(handle) {
            Some(self.secondary.location())
        } else {
            self.gate
                .as_ref()
                .filter(|gate| gate.owns(handle))
                .map(SafepointGate::location)
        }
    }

    /// Handle a halt at `location`
    ///
    /// Watchpoints are offered the hit primary first; a thread is claimed by
    /// at most one of them. A hit on the safepoint location while the gate is
    /// waiting drives the gate to `Reached`.
    pub fn on_breakpoint(
        &mut self,
        location: &Location,
        thread: ThreadId,
        collab: &mut Collaborators<'_>,
        queue: &mut DeferredResumeQueue,
    ) -> RaceResult<HitOutcome> {
        let caught = (self.primary.location() == location && self.primary.on_hit(thread, collab)?)
            || (self.secondary.location() == location && self.secondary.on_hit(thread, collab)?);
        if caught {
            self.reconcile(collab, queue)?;
            return Ok(HitOutcome::Caught);
        }

        let at_safepoint = self
            .gate
            .as_ref()
            .is_some_and(|gate| gate.location() == location && gate.state() == GateState::Triggered);
        if at_safepoint {
            self.on_safepoint_reached(collab, queue)?;
            return Ok(HitOutcome::SafepointArrival);
        }

        Ok(HitOutcome::Ignored)
    }

    /// Re-evaluate the rendezvous after a watchpoint or gate transition
    ///
    /// Idempotent: with unchanged watchpoint state, repeated calls arm nothing
    /// new and never enqueue a second release.
    pub fn reconcile(
        &mut self,
        collab: &mut Collaborators<'_>,
        queue: &mut DeferredResumeQueue,
    ) -> RaceResult<()> {
        if !self.secondary_initially_enabled
            && !self.secondary.is_armed()
            && !self.secondary.has_triggered()
            && !self.primary.is_armed()
        {
            self.secondary.arm(collab.control)?;
            info!(location = %self.secondary.location(), "secondary watchpoint armed");
        }

        if self.released {
            return Ok(());
        }
        let (Some(primary), Some(secondary)) = (
            self.primary.triggered_thread(),
            self.secondary.triggered_thread(),
        ) else {
            return Ok(());
        };

        if self.require_safepoint {
            let gate = self
                .gate
                .get_or_insert_with(|| SafepointGate::new(self.safepoint_config.clone()));
            if gate.state() == GateState::Inactive {
                gate.trigger(collab)?;
            }
            if !gate.is_reached() {
                debug!("both threads halted, waiting for safepoint");
                return Ok(());
            }
        }

        self.release(primary, secondary, collab, queue);
        Ok(())
    }

    /// Gate arrival; releases if the rendezvous was only waiting on it
    pub fn on_safepoint_reached(
        &mut self,
        collab: &mut Collaborators<'_>,
        queue: &mut DeferredResumeQueue,
    ) -> RaceResult<()> {
        let Some(gate) = self.gate.as_mut() else {
            return Ok(());
        };
        if gate.notify_reached(collab.control)? {
            self.reconcile(collab, queue)?;
        }
        Ok(())
    }

    fn release(
        &mut self,
        primary: ThreadId,
        secondary: ThreadId,
        collab: &mut Collaborators<'_>,
        queue: &mut DeferredResumeQueue,
    ) {
        self.released = true;
        info!("Test start!");
        if let Some(expression) = &self.release_probe {
            match collab.context.evaluate_in_context(expression) {
                Ok(value) => info!(probe = %expression, "{}", value),
                Err(e) => warn!(probe = %expression, error = %e, "release probe failed"),
            }
        }

        let (first, second) = if self.reverse_order {
            (secondary, primary)
        } else {
            (primary, secondary)
        };
        queue.enqueue(first);
        queue.enqueue(second);
        info!(first = %first, second = %second, "release enqueued");
    }

    /// Fail if the safepoint wait has outlived its timeout
    pub fn check_timeout(&self, now: Instant) -> RaceResult<()> {
        match &self.gate {
            Some(gate) => gate.check_timeout(now),
            None => Ok(()),
        }
    }

    /// Time left on the safepoint wait, when one is running with a timeout
    pub fn safepoint_remaining(&self, now: Instant) -> Option<Duration> {
        self.gate.as_ref().and_then(|gate| gate.remaining(now))
    }

    pub fn phase(&self) -> RendezvousPhase {
        if self.released {
            return RendezvousPhase::Released;
        }
        if let Some(gate) = &self.gate {
            return match gate.state() {
                GateState::Inactive => RendezvousPhase::BothCaught,
                GateState::Triggered => RendezvousPhase::SafepointTriggered,
                GateState::Reached => RendezvousPhase::SafepointReached,
            };
        }
        match (self.primary.has_triggered(), self.secondary.has_triggered()) {
            (true, true) => RendezvousPhase::BothCaught,
            (true, false) => RendezvousPhase::PrimaryCaught,
            (false, true) => RendezvousPhase::SecondaryCaught,
            (false, false) => RendezvousPhase::Armed,
        }
    }

    /// Threads in the order they are (or will be) released
    pub fn release_order(&self) -> Option<(ThreadId, ThreadId)> {
        let primary = self.primary.triggered_thread()?;
        let secondary = self.secondary.triggered_thread()?;
        Some(if self.reverse_order {
            (secondary, primary)
        } else {
            (primary, secondary)
        })
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Whether `thread` is caught and still waiting for the release
    pub fn holds(&self, thread: ThreadId) -> bool {
        !self.released
            && (self.primary.triggered_thread() == Some(thread)
                || self.secondary.triggered_thread() == Some(thread))
    }

    pub fn primary(&self) -> &WatchPoint {
        &self.primary
    }

    pub fn secondary(&self) -> &WatchPoint {
        &self.secondary
    }

    pub fn gate(&self) -> Option<&SafepointGate> {
        self.gate.as_ref()
    }
}
