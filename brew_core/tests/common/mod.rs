//! Shared fixture for controller-level tests: a controller wired to fakes and
//! a manual clock, advanced tick by tick.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use brew_core::mocks::{FakeScale, RecordingRelay, ScriptedButtons};
use brew_core::{
    BrewController, BrewPreferences, BrewState, MemoryStore, ShotRecord, ShotSink,
};
use brew_traits::{ManualClock, WallClock};

pub struct Rig {
    pub ctrl: BrewController<FakeScale>,
    pub clock: ManualClock,
    pub relay: RecordingRelay,
    pub buttons: ScriptedButtons,
    pub store: MemoryStore,
    pub shots: Arc<Mutex<Vec<ShotRecord>>>,
}

/// Wall clock pinned to one local hour.
#[derive(Debug, Clone)]
pub struct FixedHour(pub Option<u32>);

impl WallClock for FixedHour {
    fn local_hour(&self) -> Option<u32> {
        self.0
    }

    fn set_timezone(&mut self, _tz: &str) -> bool {
        true
    }
}

/// Shot sink that keeps every record in memory.
#[derive(Debug, Clone, Default)]
pub struct CollectingSink(pub Arc<Mutex<Vec<ShotRecord>>>);

impl ShotSink for CollectingSink {
    fn record(&mut self, record: &ShotRecord) -> brew_core::Result<()> {
        self.0.lock().unwrap().push(*record);
        Ok(())
    }
}

impl Rig {
    pub fn new() -> Self {
        Self::with_prefs(BrewPreferences::default())
    }

    pub fn with_prefs(prefs: BrewPreferences) -> Self {
        Self::build(prefs, MemoryStore::default(), None)
    }

    pub fn build(prefs: BrewPreferences, store: MemoryStore, hour: Option<u32>) -> Self {
        let clock = ManualClock::new();
        let relay = RecordingRelay::default();
        let buttons = ScriptedButtons::default();
        let sink = CollectingSink::default();
        let shots = sink.0.clone();
        let mut ctrl = BrewController::builder()
            .with_scale(FakeScale::connected())
            .with_relay(relay.clone())
            .with_buttons(buttons.clone())
            .with_default_prefs(prefs)
            .with_store(store.clone())
            .with_shot_log(sink)
            .with_wall_clock(FixedHour(hour))
            .with_clock(Arc::new(clock.clone()))
            .build()
            .expect("controller build");
        ctrl.wake();
        Self {
            ctrl,
            clock,
            relay,
            buttons,
            store,
            shots,
        }
    }

    pub fn scale(&mut self) -> &mut FakeScale {
        self.ctrl.scale_mut()
    }

    /// Advance time, then run one control tick.
    pub fn tick(&mut self, ms: u64) {
        self.clock.advance_ms(ms);
        self.ctrl.update();
    }

    /// Tick every `step_ms` until `total_ms` has elapsed.
    pub fn run_for(&mut self, total_ms: u64, step_ms: u64) {
        let mut elapsed = 0;
        while elapsed < total_ms {
            self.tick(step_ms);
            elapsed += step_ms;
        }
    }

    /// Hold a button long enough to debounce, then release it the same way.
    pub fn press(&mut self, hold: impl Fn(&ScriptedButtons)) {
        hold(&self.buttons);
        self.tick(10);
        self.tick(60);
        self.buttons.release_all();
        self.tick(10);
        self.tick(60);
    }

    /// Run a remote brew to completion: pour until the projection stops the
    /// relay at `stop_g` with `flow` g/s, then let the cup settle at `final_g`.
    pub fn pour(&mut self, target: f32, stop_g: f32, flow: f32, final_g: f32) {
        self.scale().weight_g = 0.0;
        self.scale().flow_gps = 0.0;
        self.ctrl.start_brew(target).expect("brew start");
        self.tick(100);
        self.scale().weight_g = stop_g;
        self.scale().flow_gps = flow;
        self.tick(50);
        assert_eq!(self.ctrl.state(), BrewState::Dripping, "projection should stop the brew");
        self.scale().weight_g = final_g;
        self.scale().flow_gps = 0.0;
        let settle = self.ctrl.prefs().drip_settle_ms;
        self.tick(settle);
        assert_eq!(self.ctrl.state(), BrewState::Idle);
        self.run_for(1_000, 200);
    }
}

/// Build a weight notification. Negative values get the minus sign byte.
pub fn packet(timestamp_ms: u32, weight_g: f32, flow_gps: f32, battery_pct: u8) -> Vec<u8> {
    let mut p = vec![0u8; 20];
    p[0] = 0x03;
    p[1] = 0x0B;
    p[2..5].copy_from_slice(&timestamp_ms.to_be_bytes()[1..4]);
    p[5] = 0x01;
    let w = (weight_g.abs() * 100.0).round() as u32;
    p[6] = if weight_g < 0.0 { 0x2D } else { 0x2B };
    p[7..10].copy_from_slice(&w.to_be_bytes()[1..4]);
    let f = (flow_gps.abs() * 100.0).round() as u16;
    p[10] = if flow_gps < 0.0 { 0x2D } else { 0x2B };
    p[11..13].copy_from_slice(&f.to_be_bytes());
    p[13] = battery_pct;
    p[14..16].copy_from_slice(&5u16.to_be_bytes());
    p
}
