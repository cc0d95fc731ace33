//! Race reproduction session
//!
//! A [`Session`] is everything one run needs: the coordinator, the resume
//! queue, auxiliary probes and the collaborators. It is created by
//! [`Session::initialize`] and consumed by an
//! [`EventDispatcher`](crate::EventDispatcher); nothing about a run lives in
//! global state.

use std::sync::Arc;

use race_core::{
    Collaborators, Condition, ContextEvaluator, DebugControl, DeferredResumeQueue, RaceConfig,
    RaceError, RaceResult, RendezvousCoordinator, RendezvousPhase, SafepointDriver, ThreadId,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::probe::AuxiliaryProbe;

/// Collaborators handed to a session
pub struct Backend {
    pub control: Box<dyn DebugControl>,
    pub context: Arc<dyn ContextEvaluator>,
    pub driver: Arc<dyn SafepointDriver>,
}

impl Backend {
    pub fn new(
        control: impl DebugControl + 'static,
        context: Arc<dyn ContextEvaluator>,
        driver: Arc<dyn SafepointDriver>,
    ) -> Self {
        Self {
            control: Box::new(control),
            context,
            driver,
        }
    }
}

/// Controller state as seen from outside
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControllerState {
    /// Session prepared, breakpoints not installed
    Idle,
    /// Watching for the first participant
    Armed,
    PrimaryCaught,
    SecondaryCaught,
    BothCaught,
    SafepointTriggered,
    SafepointReached,
    /// Release issued; waiting for the target to finish
    Released,
    /// Abort in progress, waiting for every thread to halt
    Draining,
    Terminated,
}

/// Why a run ended on the evidence-preserving path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbortReason {
    /// The target raised an abort signal on `thread`
    Signal { thread: ThreadId },
    /// The controller hit an unrecoverable error
    Fatal(String),
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunOutcome {
    /// The target exited on its own
    Exited { code: Option<i32>, released: bool },
    /// Abort path: all threads halted, dump attempted, controller terminated
    Aborted { reason: AbortReason, dumped: bool },
    /// The notification stream closed before the target exited
    Disconnected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Mode {
    Running,
    Draining(AbortReason),
    Terminated(RunOutcome),
}

/// State of one race reproduction run
pub struct Session {
    pub(crate) coordinator: RendezvousCoordinator,
    pub(crate) queue: DeferredResumeQueue,
    pub(crate) probes: Vec<AuxiliaryProbe>,
    pub(crate) backend: Backend,
    pub(crate) installed: bool,
    pub(crate) mode: Mode,
}

/// Disjoint borrows of a session's parts for one handler pass
pub(crate) struct SessionParts<'a> {
    pub collab: Collaborators<'a>,
    pub coordinator: &'a mut RendezvousCoordinator,
    pub queue: &'a mut DeferredResumeQueue,
    pub probes: &'a mut [AuxiliaryProbe],
}

impl Session {
    /// Validate the configuration and build an uninstalled session
    pub fn prepare(
        config: RaceConfig,
        primary_condition: impl Condition + 'static,
        secondary_condition: impl Condition + 'static,
        backend: Backend,
    ) -> RaceResult<Self> {
        config.validate()?;
        Ok(Self {
            coordinator: RendezvousCoordinator::new(
                &config,
                Box::new(primary_condition),
                Box::new(secondary_condition),
            ),
            queue: DeferredResumeQueue::new(),
            probes: Vec::new(),
            backend,
            installed: false,
            mode: Mode::Running,
        })
    }

    /// Set every breakpoint in the target
    pub fn install(&mut self) -> RaceResult<()> {
        if self.installed {
            return Ok(());
        }
        self.coordinator.install(self.backend.control.as_mut())?;
        for probe in &mut self.probes {
            probe.install(self.backend.control.as_mut())?;
        }
        self.installed = true;
        info!(
            primary = %self.coordinator.primary().location(),
            secondary = %self.coordinator.secondary().location(),
            "race session armed"
        );
        Ok(())
    }

    /// Prepare and install in one step
    pub fn initialize(
        config: RaceConfig,
        primary_condition: impl Condition + 'static,
        secondary_condition: impl Condition + 'static,
        backend: Backend,
    ) -> RaceResult<Self> {
        let mut session = Self::prepare(config, primary_condition, secondary_condition, backend)?;
        session.install()?;
        Ok(session)
    }

    /// Register an auxiliary probe, installing it right away on a live session
    pub fn add_probe(&mut self, mut probe: AuxiliaryProbe) -> RaceResult<()> {
        if matches!(self.mode, Mode::Terminated(_)) {
            return Err(RaceError::SessionTerminated);
        }
        if self.installed {
            probe.install(self.backend.control.as_mut())?;
        }
        self.probes.push(probe);
        Ok(())
    }

    pub fn state(&self) -> ControllerState {
        match &self.mode {
            Mode::Terminated(_) => return ControllerState::Terminated,
            Mode::Draining(_) => return ControllerState::Draining,
            Mode::Running => {}
        }
        if !self.installed {
            return ControllerState::Idle;
        }
        match self.coordinator.phase() {
            RendezvousPhase::Armed => ControllerState::Armed,
            RendezvousPhase::PrimaryCaught => ControllerState::PrimaryCaught,
            RendezvousPhase::SecondaryCaught => ControllerState::SecondaryCaught,
            RendezvousPhase::BothCaught => ControllerState::BothCaught,
            RendezvousPhase::SafepointTriggered => ControllerState::SafepointTriggered,
            RendezvousPhase::SafepointReached => ControllerState::SafepointReached,
            RendezvousPhase::Released => ControllerState::Released,
        }
    }

    /// Set once an abort signal or fatal error was seen
    pub fn is_aborted(&self) -> bool {
        matches!(
            self.mode,
            Mode::Draining(_) | Mode::Terminated(RunOutcome::Aborted { .. })
        )
    }

    pub fn outcome(&self) -> Option<&RunOutcome> {
        match &self.mode {
            Mode::Terminated(outcome) => Some(outcome),
            _ => None,
        }
    }

    pub fn coordinator(&self) -> &RendezvousCoordinator {
        &self.coordinator
    }

    pub fn queue(&self) -> &DeferredResumeQueue {
        &self.queue
    }

    pub fn probes(&self) -> &[AuxiliaryProbe] {
        &self.probes
    }

    pub(crate) fn parts(&mut self) -> SessionParts<'_> {
        SessionParts {
            collab: Collaborators {
                control: self.backend.control.as_mut(),
                context: self.backend.context.as_ref(),
                driver: self.backend.driver.as_ref(),
            },
            coordinator: &mut self.coordinator,
            queue: &mut self.queue,
            probes: &mut self.probes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use race_core::testing::{FakeContext, FakeDebugger, RecordingDriver, SharedDebugger};
    use race_core::{Always, Location};

    fn backend(fake: &SharedDebugger) -> Backend {
        Backend::new(
            fake.clone(),
            Arc::new(FakeContext::new()),
            Arc::new(RecordingDriver::new()),
        )
    }

    #[test]
    fn test_prepare_is_idle_until_installed() {
        let fake = SharedDebugger::new(FakeDebugger::new());
        let mut session = Session::prepare(
            RaceConfig::new("OnClassPrepare", "OnDataDumpRequestForSnapShot"),
            Always,
            Always,
            backend(&fake),
        )
        .unwrap();
        assert_eq!(session.state(), ControllerState::Idle);
        assert!(fake.lock().commands().is_empty());

        session.install().unwrap();
        assert_eq!(session.state(), ControllerState::Armed);
        assert_eq!(fake.lock().handles_at("OnClassPrepare").len(), 1);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let fake = SharedDebugger::new(FakeDebugger::new());
        let result = Session::initialize(RaceConfig::new("", "L2"), Always, Always, backend(&fake));
        assert!(matches!(result, Err(RaceError::InvalidConfig(_))));
    }

    #[test]
    fn test_probe_added_before_install_is_installed_with_session() {
        let fake = SharedDebugger::new(FakeDebugger::new());
        let mut session =
            Session::prepare(RaceConfig::new("L1", "L2"), Always, Always, backend(&fake)).unwrap();
        session
            .add_probe(AuxiliaryProbe::assign("data_dump", "ReduceSignalUsage", "true"))
            .unwrap();
        assert!(fake.lock().handles_at("data_dump").is_empty());

        session.install().unwrap();
        let handles = fake.lock().handles_at("data_dump");
        assert_eq!(handles.len(), 1);
        assert_eq!(session.probes()[0].location(), &Location::new("data_dump"));
    }
}
