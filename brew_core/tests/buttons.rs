//! Front-panel buttons, the preinfusion macro, decaf presets and sleep.

mod common;

use brew_core::mocks::ScriptedButtons;
use brew_core::{
    BrewPreferences, BrewState, MemoryStore, PreinfusionMode, Profile, ScaleCommand, Trigger,
};
use common::Rig;

#[test]
fn manual_button_tracks_without_driving_relay() {
    let mut rig = Rig::new();
    rig.press(ScriptedButtons::press_manual);
    assert_eq!(rig.ctrl.state(), BrewState::Brewing);
    assert_eq!(rig.ctrl.target_weight(), 40.0);
    assert!(rig.relay.levels().is_empty(), "the machine already reacted to the button");
    assert_eq!(rig.ctrl.scale().count(ScaleCommand::StartAndTare), 1);
}

#[test]
fn second_press_aborts_without_relay() {
    let mut rig = Rig::new();
    rig.press(ScriptedButtons::press_manual);
    rig.press(ScriptedButtons::press_two_cup);
    assert!(rig.ctrl.state().is_idle());
    assert!(rig.relay.levels().is_empty());
    assert_eq!(rig.ctrl.scale().count(ScaleCommand::StopTimer), 1);
}

#[test]
fn one_cup_in_simple_mode_brews_half_preset() {
    let mut rig = Rig::new();
    rig.press(ScriptedButtons::press_one_cup);
    assert_eq!(rig.ctrl.state(), BrewState::Brewing);
    assert_eq!(rig.ctrl.target_weight(), 20.0);
    assert_eq!(rig.ctrl.session().unwrap().profile, Profile::Split);
}

#[test]
fn one_cup_in_weight_mode_runs_macro_then_latches() {
    let mut rig = Rig::with_prefs(BrewPreferences {
        preinfusion_mode: PreinfusionMode::WeightTriggered,
        ..BrewPreferences::default()
    });
    rig.press(ScriptedButtons::press_one_cup);
    assert!(rig.ctrl.state().is_idle(), "waiting for the macro");

    rig.run_for(400, 20);
    assert_eq!(rig.ctrl.state(), BrewState::Preinfusion);
    assert_eq!(rig.ctrl.target_weight(), 20.0);
    assert!(rig.ctrl.machine().is_latched());
    assert_eq!(rig.relay.levels(), vec![true, false, true]);
}

fn weight_triggered() -> Rig {
    Rig::with_prefs(BrewPreferences {
        preinfusion_mode: PreinfusionMode::WeightTriggered,
        ..BrewPreferences::default()
    })
}

#[test]
fn remote_abort_before_macro_click_stops_the_machine() {
    let mut rig = weight_triggered();
    rig.press(ScriptedButtons::press_one_cup);
    assert_eq!(rig.ctrl.abort_brew(Trigger::Remote), Ok(()));

    rig.run_for(400, 20);
    assert!(rig.ctrl.state().is_idle());
    assert!(!rig.ctrl.machine().is_latched());
    assert!(rig.ctrl.machine().is_settled());
    assert_eq!(rig.relay.levels(), vec![true, false]);
}

#[test]
fn remote_abort_after_macro_click_never_latches() {
    let mut rig = weight_triggered();
    rig.press(ScriptedButtons::press_one_cup);
    rig.tick(140);
    assert_eq!(rig.relay.levels(), vec![true], "macro click fired");
    assert_eq!(rig.ctrl.abort_brew(Trigger::Remote), Ok(()));

    rig.run_for(400, 20);
    assert!(rig.ctrl.state().is_idle());
    assert!(!rig.ctrl.machine().is_latched());
    assert_eq!(rig.relay.levels(), vec![true, false]);
}

#[test]
fn button_press_cancels_running_macro() {
    let mut rig = weight_triggered();
    rig.press(ScriptedButtons::press_one_cup);
    rig.press(ScriptedButtons::press_two_cup);

    rig.run_for(400, 20);
    assert!(rig.ctrl.state().is_idle());
    assert!(!rig.ctrl.machine().is_latched());
    assert!(rig.relay.levels().is_empty(), "the press already stopped the machine");
    assert_eq!(rig.ctrl.abort_brew(Trigger::Remote), Err(brew_core::BrewRejection::NotBrewing));
}

#[test]
fn button_abort_of_manual_preinfusion_leaves_relay_alone() {
    let mut rig = weight_triggered();
    rig.press(ScriptedButtons::press_manual);
    assert_eq!(rig.ctrl.state(), BrewState::Preinfusion);
    assert!(!rig.ctrl.machine().is_latched());

    rig.press(ScriptedButtons::press_two_cup);
    rig.run_for(400, 20);
    assert!(rig.ctrl.state().is_idle());
    assert!(rig.relay.levels().is_empty());
    assert_eq!(rig.ctrl.scale().count(ScaleCommand::StopTimer), 1);
}

#[test]
fn macro_without_scale_falls_back_to_plain_tracking() {
    let mut rig = Rig::with_prefs(BrewPreferences {
        preinfusion_mode: PreinfusionMode::WeightTriggered,
        ..BrewPreferences::default()
    });
    rig.scale().connected = false;
    rig.scale().connect_on_request = false;
    rig.press(ScriptedButtons::press_one_cup);
    rig.run_for(600, 20);
    assert!(rig.ctrl.state().is_idle());
    assert!(rig.relay.levels().is_empty());
}

#[test]
fn two_cup_while_idle_only_wakes() {
    let mut rig = Rig::new();
    rig.press(ScriptedButtons::press_two_cup);
    assert!(rig.ctrl.state().is_idle());
    assert!(rig.ctrl.is_active());
}

#[test]
fn decaf_preset_applies_after_start_hour() {
    let prefs = BrewPreferences {
        regular_preset_g: 40.0,
        decaf_preset_g: 30.0,
        decaf_start_hour: Some(15),
        ..BrewPreferences::default()
    };
    let late = Rig::build(prefs.clone(), MemoryStore::default(), Some(16));
    assert_eq!(late.ctrl.base_target(), 30.0);
    let early = Rig::build(prefs.clone(), MemoryStore::default(), Some(9));
    assert_eq!(early.ctrl.base_target(), 40.0);
    let unknown = Rig::build(prefs, MemoryStore::default(), None);
    assert_eq!(unknown.ctrl.base_target(), 40.0);

    let mut rig = late;
    rig.press(ScriptedButtons::press_manual);
    assert_eq!(rig.ctrl.target_weight(), 30.0);
}

#[test]
fn idle_timeout_sleeps_and_button_wakes() {
    let mut rig = Rig::new();
    rig.run_for(10 * 60 * 1_000, 60_000);
    assert!(rig.ctrl.is_active(), "timeout is exclusive");
    rig.tick(1_000);
    assert!(!rig.ctrl.is_active());
    assert!(!rig.ctrl.scale().connected);
    assert_eq!(rig.ctrl.scale().disconnect_calls, 1);

    // first press only wakes
    rig.press(ScriptedButtons::press_manual);
    assert!(rig.ctrl.is_active());
    assert!(rig.ctrl.scale().connected);
    assert!(rig.ctrl.state().is_idle());
}

#[test]
fn brewing_counts_as_activity() {
    let mut rig = Rig::new();
    rig.run_for(9 * 60 * 1_000, 60_000);
    rig.ctrl.start_brew(36.0).unwrap();
    rig.run_for(30_000, 1_000);
    rig.ctrl.abort_brew(brew_core::Trigger::Remote).unwrap();
    rig.run_for(5 * 60 * 1_000, 60_000);
    assert!(rig.ctrl.is_active());
    assert!(rig.ctrl.scale().connected);
}
