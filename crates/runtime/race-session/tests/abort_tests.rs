//! Abort and teardown paths

mod common;

use std::time::Instant;

use common::Harness;
use race_core::testing::{Command, RecordingDriver};
use race_core::{Always, DEFAULT_SAFEPOINT_LOCATION, RaceConfig, RaceError, SafepointConfig, ThreadId};
use race_session::{AbortReason, ControllerState, Flow, RunOutcome};

fn gated() -> RaceConfig {
    RaceConfig::new("L1", "L2").with_safepoint(true)
}

#[test]
fn test_abort_signal_while_awaiting_release() {
    let mut h = Harness::new(gated(), &[1, 2, 3]);
    h.hit("L1", 1).unwrap();
    h.hit("L2", 2).unwrap();
    assert_eq!(h.dispatcher.state(), ControllerState::SafepointTriggered);

    let flow = h.signal(3, "SIGABRT").unwrap();
    assert_eq!(flow, Flow::Terminated);
    assert!(h.resumed().is_empty());
    assert!(h.dispatcher.session().is_aborted());
    assert!(!h.dispatcher.session().coordinator().is_released());

    let commands = h.commands();
    let tail = &commands[commands.len() - 3..];
    assert_eq!(tail, &[Command::HaltAll, Command::DumpState, Command::Terminate]);
    assert_eq!(
        h.dispatcher.outcome(),
        Some(&RunOutcome::Aborted {
            reason: AbortReason::Signal { thread: ThreadId(3) },
            dumped: true,
        })
    );

    // Late safepoint arrival must not release anything.
    let late = h.hit(DEFAULT_SAFEPOINT_LOCATION, 3);
    assert_eq!(late, Err(RaceError::SessionTerminated));
    assert!(h.resumed().is_empty());
}

#[test]
fn test_dump_waits_for_every_thread() {
    let mut h = Harness::new(RaceConfig::new("L1", "L2"), &[1, 2, 3, 4]);
    h.hit("L1", 1).unwrap();

    assert_eq!(h.signal(3, "SIGABRT").unwrap(), Flow::Continue);
    assert_eq!(h.dispatcher.state(), ControllerState::Draining);
    assert!(h.commands().contains(&Command::HaltAll));
    assert!(!h.commands().contains(&Command::DumpState));

    // Hits while draining are not resumed.
    h.hit("L2", 2).unwrap();
    assert!(h.resumed().is_empty());
    assert!(!h.dispatcher.session().coordinator().is_released());

    assert_eq!(h.stopped(4).unwrap(), Flow::Terminated);
    assert!(h.commands().contains(&Command::DumpState));
    assert!(h.fake.lock().is_terminated());
}

#[test]
fn test_exit_while_draining_skips_dump() {
    let mut h = Harness::new(RaceConfig::new("L1", "L2"), &[1, 2]);
    assert!(!h.dispatcher.session().is_aborted());
    h.signal(1, "SIGABRT").unwrap();
    assert_eq!(h.dispatcher.state(), ControllerState::Draining);
    assert!(h.dispatcher.session().is_aborted());

    assert_eq!(h.exit(134).unwrap(), Flow::Terminated);
    assert!(!h.commands().contains(&Command::DumpState));
    assert!(h.dispatcher.session().is_aborted());
    assert_eq!(
        h.dispatcher.outcome(),
        Some(&RunOutcome::Aborted {
            reason: AbortReason::Signal { thread: ThreadId(1) },
            dumped: false,
        })
    );
}

#[test]
fn test_failed_safepoint_request_aborts() {
    let mut h = Harness::with_driver(gated(), &[1, 2], Always, Always, RecordingDriver::failing(3));
    h.hit("L1", 1).unwrap();

    let flow = h.hit("L2", 2).unwrap();
    assert_eq!(flow, Flow::Terminated);
    assert_eq!(h.driver.requests(), 3);
    assert!(h.resumed().is_empty());
    assert!(matches!(
        h.dispatcher.outcome(),
        Some(RunOutcome::Aborted {
            reason: AbortReason::Fatal(_),
            dumped: true,
        })
    ));
}

#[test]
fn test_safepoint_timeout_aborts_on_next_notification() {
    let config = gated().with_safepoint_config(SafepointConfig {
        timeout_ms: Some(0),
        ..Default::default()
    });
    let mut h = Harness::new(config, &[1, 2, 3]);
    h.hit("L1", 1).unwrap();
    h.hit("L2", 2).unwrap();
    assert_eq!(h.dispatcher.state(), ControllerState::SafepointTriggered);

    assert_eq!(h.stopped(3).unwrap(), Flow::Terminated);
    assert!(h.resumed().is_empty());
    match h.dispatcher.outcome() {
        Some(RunOutcome::Aborted {
            reason: AbortReason::Fatal(message),
            ..
        }) => assert!(message.contains("Safepoint not reached")),
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[test]
fn test_exit_after_deadline_is_a_plain_exit() {
    let config = gated().with_safepoint_config(SafepointConfig {
        timeout_ms: Some(0),
        ..Default::default()
    });
    let mut h = Harness::new(config, &[1, 2]);
    h.hit("L1", 1).unwrap();
    h.hit("L2", 2).unwrap();

    assert_eq!(h.exit(0).unwrap(), Flow::Terminated);
    assert!(!h.commands().contains(&Command::HaltAll));
    assert!(!h.dispatcher.session().is_aborted());
    assert_eq!(
        h.dispatcher.outcome(),
        Some(&RunOutcome::Exited {
            code: Some(0),
            released: false,
        })
    );
}

#[test]
fn test_poll_timeout_between_notifications() {
    let config = gated().with_safepoint_config(SafepointConfig {
        timeout_ms: Some(0),
        ..Default::default()
    });
    let mut h = Harness::new(config, &[1, 2]);
    h.hit("L1", 1).unwrap();
    h.hit("L2", 2).unwrap();

    let flow = h.dispatcher.poll_timeout(Instant::now()).unwrap();
    assert_eq!(flow, Flow::Terminated);
    assert!(h.dispatcher.session().is_aborted());
}

#[test]
fn test_no_timeout_without_limit() {
    let mut h = Harness::new(gated(), &[1, 2]);
    h.hit("L1", 1).unwrap();
    h.hit("L2", 2).unwrap();
    assert_eq!(h.dispatcher.safepoint_remaining(Instant::now()), None);
    assert_eq!(h.dispatcher.poll_timeout(Instant::now()).unwrap(), Flow::Continue);
}

#[test]
fn test_exit_during_rendezvous() {
    let mut h = Harness::new(RaceConfig::new("L1", "L2"), &[1, 2]);
    h.hit("L1", 1).unwrap();

    assert_eq!(h.exit(0).unwrap(), Flow::Terminated);
    assert_eq!(
        h.dispatcher.outcome(),
        Some(&RunOutcome::Exited {
            code: Some(0),
            released: false,
        })
    );
    assert!(h.fake.lock().is_terminated());
    assert!(!h.dispatcher.session().is_aborted());
}

#[test]
fn test_exit_after_release() {
    let mut h = Harness::new(RaceConfig::new("L1", "L2"), &[1, 2]);
    h.hit("L1", 1).unwrap();
    h.hit("L2", 2).unwrap();
    h.exit(0).unwrap();
    assert_eq!(
        h.dispatcher.outcome(),
        Some(&RunOutcome::Exited {
            code: Some(0),
            released: true,
        })
    );
    assert_eq!(h.dispatcher.state(), ControllerState::Terminated);
}
