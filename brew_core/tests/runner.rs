//! Control loop: command intake, metrics cadence and shutdown.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use brew_core::mocks::{FakeScale, RecordingRelay};
use brew_core::runner::run;
use brew_core::{
    BrewController, BrewMetrics, BrewPreferences, BrewRejection, BrewState, ControlCommand,
    ControlRequest, RunnerCfg, apply_command, control_channel,
};
use brew_traits::ManualClock;

fn controller(clock: &ManualClock, relay: &RecordingRelay) -> BrewController<FakeScale> {
    let mut ctrl = BrewController::builder()
        .with_scale(FakeScale::connected())
        .with_relay(relay.clone())
        .with_clock(Arc::new(clock.clone()))
        .build()
        .unwrap();
    ctrl.wake();
    ctrl
}

#[test]
fn commands_are_applied_and_answered() {
    let clock = ManualClock::new();
    let relay = RecordingRelay::default();
    let mut ctrl = controller(&clock, &relay);
    let (tx, rx) = control_channel();

    let (start, start_reply) = ControlRequest::with_reply(ControlCommand::StartBrew {
        target_g: Some(36.0),
    });
    let (again, again_reply) = ControlRequest::with_reply(ControlCommand::StartBrew {
        target_g: None,
    });
    tx.send(start).unwrap();
    tx.send(again).unwrap();

    let stop = AtomicBool::new(false);
    let mut seen: Vec<BrewMetrics> = Vec::new();
    let summary = run(&mut ctrl, &rx, &RunnerCfg::default(), &clock, &stop, |m| {
        seen.push(*m);
        if seen.len() == 4 {
            stop.store(true, Ordering::Relaxed);
        }
    })
    .unwrap();

    assert_eq!(start_reply.try_recv().unwrap(), Ok(()));
    assert_eq!(again_reply.try_recv().unwrap(), Err(BrewRejection::AlreadyBrewing));
    assert_eq!(summary.commands, 2);
    assert_eq!(summary.broadcasts, 4);
    assert!(seen.iter().all(|m| m.state == BrewState::Brewing));
    // 250 ms apart at 50 ms ticks while brewing
    assert_eq!(summary.ticks, 16);

    // loop exit aborts the brew and lets the stop click finish
    assert!(ctrl.state().is_idle());
    assert!(ctrl.machine().is_settled());
    assert!(!relay.is_high());
    assert_eq!(relay.rising_edges(), 2);
}

#[test]
fn idle_metrics_are_sparse() {
    let clock = ManualClock::new();
    let relay = RecordingRelay::default();
    let mut ctrl = controller(&clock, &relay);
    let (_tx, rx) = control_channel();

    let stop = AtomicBool::new(false);
    let mut broadcasts = 0;
    let summary = run(&mut ctrl, &rx, &RunnerCfg::default(), &clock, &stop, |m| {
        assert_eq!(m.state, BrewState::Idle);
        broadcasts += 1;
        if broadcasts == 3 {
            stop.store(true, Ordering::Relaxed);
        }
    })
    .unwrap();
    assert_eq!(summary.ticks, 41);
    assert!(relay.levels().is_empty());
}

#[test]
fn fire_and_forget_commands() {
    let clock = ManualClock::new();
    let relay = RecordingRelay::default();
    let mut ctrl = controller(&clock, &relay);

    assert_eq!(apply_command(&mut ctrl, ControlCommand::Tare), Ok(()));
    assert_eq!(apply_command(&mut ctrl, ControlCommand::Recompute), Ok(()));
    assert_eq!(apply_command(&mut ctrl, ControlCommand::ClearShots), Ok(()));
    assert_eq!(
        apply_command(&mut ctrl, ControlCommand::DeleteShot(7)),
        Err(BrewRejection::UnknownShot(7))
    );
    assert_eq!(apply_command(&mut ctrl, ControlCommand::Stop), Err(BrewRejection::NotBrewing));

    let prefs = BrewPreferences {
        regular_preset_g: 38.0,
        ..BrewPreferences::default()
    };
    assert_eq!(apply_command(&mut ctrl, ControlCommand::SetPrefs(prefs)), Ok(()));
    assert_eq!(
        apply_command(&mut ctrl, ControlCommand::StartBrew { target_g: None }),
        Ok(())
    );
    assert_eq!(ctrl.target_weight(), 38.0);

    ctrl.scale_mut().connected = false;
    ctrl.scale_mut().connect_on_request = false;
    assert_eq!(
        apply_command(&mut ctrl, ControlCommand::Tare),
        Err(BrewRejection::Disconnected)
    );
}
