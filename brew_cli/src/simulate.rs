//! `simulate`: complete brews against the simulated machine on a virtual
//! clock, so a run of shots finishes in well under a second. Learning starts
//! from defaults and is not saved.

use std::sync::{Arc, Mutex, PoisonError};

use brew_config::Config;
use brew_core::{
    BrewController, BrewError, ControlCommand, MemoryStore, Profile, ScalePort, ShotRecord, Telemetry,
    apply_command,
};
use brew_hardware::SimWorld;
use brew_traits::ManualClock;
use crossbeam_channel as xch;

use crate::assemble::{self, CliShotSink, Rig, SimScale};
use crate::cli::json_mode;

const TICK_MS: u64 = 10;
const CONNECT_TIMEOUT_MS: u64 = 5_000;
/// Longer than any shot can last: fail-safe plus drip settle plus margin.
const SHOT_TIMEOUT_MS: u64 = 180_000;
/// Idle time between shots so relay sequences and drips finish.
const REST_MS: u64 = 2_000;

/// Virtual bench: advances the clock, the machine physics and the controller
/// in lockstep.
struct Bench {
    clock: ManualClock,
    world: SimWorld,
    telemetry: Arc<Telemetry>,
    notifications: xch::Receiver<Vec<u8>>,
    now_ms: u64,
}

impl Bench {
    fn tick(&mut self, ctrl: &mut BrewController<SimScale>) {
        self.clock.advance_ms(TICK_MS);
        self.now_ms += TICK_MS;
        self.world.step(self.now_ms);
        for bytes in self.notifications.try_iter() {
            self.telemetry.ingest(&bytes);
        }
        ctrl.update();
    }

    /// Tick until `done` holds or `limit_ms` passes. Returns whether `done` held.
    fn run_until(
        &mut self,
        ctrl: &mut BrewController<SimScale>,
        limit_ms: u64,
        done: impl Fn(&BrewController<SimScale>) -> bool,
    ) -> bool {
        let deadline = self.now_ms + limit_ms;
        while self.now_ms < deadline {
            self.tick(ctrl);
            if done(ctrl) {
                return true;
            }
        }
        false
    }

    fn rest(&mut self, ctrl: &mut BrewController<SimScale>, ms: u64) {
        let _ = self.run_until(ctrl, ms, |_| false);
    }
}

fn print_shot(n: u32, r: &ShotRecord) {
    if json_mode() {
        match serde_json::to_string(r) {
            Ok(s) => println!("{s}"),
            Err(e) => tracing::warn!(error = %e, "shot not serializable"),
        }
        return;
    }
    let s = &r.shot;
    println!(
        "shot {n} (id {}): target {:.1} g  stop {:.1} g  final {:.1} g  error {:+.1} g  compensation {:.3}{}",
        s.id,
        s.target_weight_g,
        s.stop_weight_g,
        s.final_weight_g,
        s.final_weight_g - s.target_weight_g,
        r.compensation,
        if r.qualified { "" } else { " (not learned)" }
    );
}

pub fn simulate(cfg: &Config, grams: f32, shots: u32) -> eyre::Result<()> {
    let clock = ManualClock::new();
    let seen: Arc<Mutex<Vec<ShotRecord>>> = Arc::default();
    let sink = CliShotSink::from_config(cfg).collecting(seen.clone());
    let Rig {
        mut ctrl,
        world,
        telemetry,
        notifications,
    } = assemble::rig(cfg, Arc::new(clock.clone()), MemoryStore::default(), sink)?;
    let mut bench = Bench {
        clock,
        world,
        telemetry,
        notifications,
        now_ms: 0,
    };

    ctrl.wake();
    if !bench.run_until(&mut ctrl, CONNECT_TIMEOUT_MS, |c| c.scale().is_connected()) {
        eyre::bail!("simulated scale did not connect within {CONNECT_TIMEOUT_MS} ms");
    }
    tracing::info!(grams, shots, "simulating");

    for n in 1..=shots {
        bench.world.empty_cup();
        bench.rest(&mut ctrl, REST_MS);
        apply_command(&mut ctrl, ControlCommand::StartBrew { target_g: Some(grams) })
            .map_err(BrewError::from)?;
        if !bench.run_until(&mut ctrl, SHOT_TIMEOUT_MS, |c| c.state().is_idle()) {
            eyre::bail!("shot {n} did not finish within {SHOT_TIMEOUT_MS} ms of simulated time");
        }
        let record = seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .copied()
            .ok_or_else(|| eyre::eyre!("shot {n} ended without being recorded"))?;
        print_shot(n, &record);
    }
    bench.rest(&mut ctrl, REST_MS);

    if !json_mode() {
        for p in Profile::ALL {
            println!(
                "{:?}: compensation {:.3} over {} stored shots",
                p,
                ctrl.compensation_state(p),
                ctrl.recent_shots(p).len()
            );
        }
    }
    Ok(())
}
