//! Type-state builder for `BrewController`.
//!
//! `build()` only exists once a scale port and a relay have been provided;
//! `try_build()` is always available and reports what is missing.

use std::marker::PhantomData;
use std::sync::Arc;

use brew_traits::{ButtonPanel, Clock, MonotonicClock, RelayPin, WallClock};

use crate::brew::BrewController;
use crate::compensation::{Bounds, CompensationBank};
use crate::config::{BrewCfg, CompensationCfg, MachineCfg};
use crate::error::{BuildError, Result};
use crate::machine::MachineController;
use crate::port::ScalePort;
use crate::prefs::BrewPreferences;
use crate::shot_log::ShotSink;
use crate::store::{MemoryStore, SettingsStore};

// ── Type-state markers ───────────────────────────────────────────────────────

pub struct Missing;
pub struct Set;

pub struct BrewControllerBuilder<P, S, R> {
    scale: Option<P>,
    relay: Option<Box<dyn RelayPin>>,
    buttons: Option<Box<dyn ButtonPanel>>,
    machine: Option<MachineCfg>,
    brew: Option<BrewCfg>,
    compensation: Option<CompensationCfg>,
    prefs: Option<BrewPreferences>,
    store: Option<Box<dyn SettingsStore>>,
    shot_log: Option<Box<dyn ShotSink>>,
    wall: Option<Box<dyn WallClock>>,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
    _s: PhantomData<S>,
    _r: PhantomData<R>,
}

impl<P: ScalePort> BrewController<P> {
    /// Start building a controller.
    pub fn builder() -> BrewControllerBuilder<P, Missing, Missing> {
        BrewControllerBuilder {
            scale: None,
            relay: None,
            buttons: None,
            machine: None,
            brew: None,
            compensation: None,
            prefs: None,
            store: None,
            shot_log: None,
            wall: None,
            clock: None,
            _s: PhantomData,
            _r: PhantomData,
        }
    }
}

fn check_bounds(b: &Bounds, what: &'static str) -> Result<()> {
    let ok = [b.min, b.max, b.default].iter().all(|v| v.is_finite())
        && b.min <= b.default
        && b.default <= b.max;
    if ok {
        Ok(())
    } else {
        Err(eyre::Report::new(BuildError::InvalidConfig(what)))
    }
}

fn validate(brew: &BrewCfg, comp: &CompensationCfg) -> Result<()> {
    if brew.max_shot_ms == 0 {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "max_shot_ms must be > 0",
        )));
    }
    if !(brew.qualify_tolerance.is_finite() && brew.qualify_tolerance >= 0.0) {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "qualify_tolerance must be >= 0",
        )));
    }
    if !(brew.profile_threshold_g.is_finite() && brew.profile_threshold_g > 0.0) {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "profile_threshold_g must be > 0",
        )));
    }
    if !(brew.max_target_g.is_finite() && brew.max_target_g > 0.0) {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "max_target_g must be > 0",
        )));
    }
    check_bounds(&comp.factor, "factor bounds must satisfy min <= default <= max")?;
    check_bounds(&comp.bias, "bias bounds must satisfy min <= default <= max")
}

impl<P: ScalePort, S, R> BrewControllerBuilder<P, S, R> {
    /// Fallible build available in any type-state.
    pub fn try_build(self) -> Result<BrewController<P>> {
        let scale = self
            .scale
            .ok_or_else(|| eyre::Report::new(BuildError::MissingScale))?;
        let relay = self
            .relay
            .ok_or_else(|| eyre::Report::new(BuildError::MissingMachine))?;
        let brew = self.brew.unwrap_or_default();
        let comp = self.compensation.unwrap_or_default();
        validate(&brew, &comp)?;

        let clock: Arc<dyn Clock + Send + Sync> =
            self.clock.unwrap_or_else(|| Arc::new(MonotonicClock::new()));
        let epoch = clock.now();
        let mut ctrl = BrewController {
            scale,
            machine: MachineController::new(relay, self.buttons, self.machine.unwrap_or_default()),
            bank: CompensationBank::new(comp.build_model()),
            prefs: self.prefs.unwrap_or_default().normalized(),
            cfg: brew,
            store: self
                .store
                .unwrap_or_else(|| Box::new(MemoryStore::default())),
            shot_log: self.shot_log,
            wall: self.wall,
            clock,
            epoch,
            session: None,
            shot_counter: 0,
            active: false,
            last_active_ms: 0,
            waiting_for_macro: false,
            pending_beeps: 0,
            last_beep_ms: None,
            offline_since_ms: None,
        };

        match ctrl.store.load() {
            Ok(Some(saved)) => {
                tracing::info!(
                    shots = saved.shot_counter,
                    compensation = ?saved.compensation,
                    "settings loaded"
                );
                ctrl.restore(saved);
            }
            Ok(None) => {
                tracing::debug!("no saved settings; using defaults");
                let tz = ctrl.prefs.timezone.clone();
                ctrl.apply_timezone(&tz);
            }
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "settings load failed; using defaults");
                let tz = ctrl.prefs.timezone.clone();
                ctrl.apply_timezone(&tz);
            }
        }
        Ok(ctrl)
    }

    pub fn with_buttons(mut self, buttons: impl ButtonPanel + 'static) -> Self {
        self.buttons = Some(Box::new(buttons));
        self
    }
    pub fn with_machine_cfg(mut self, cfg: MachineCfg) -> Self {
        self.machine = Some(cfg);
        self
    }
    pub fn with_brew_cfg(mut self, cfg: BrewCfg) -> Self {
        self.brew = Some(cfg);
        self
    }
    pub fn with_compensation(mut self, cfg: CompensationCfg) -> Self {
        self.compensation = Some(cfg);
        self
    }
    /// Preferences used when the store has nothing saved.
    pub fn with_default_prefs(mut self, prefs: BrewPreferences) -> Self {
        self.prefs = Some(prefs);
        self
    }
    /// Settings store; an empty in-memory store when not provided.
    pub fn with_store(mut self, store: impl SettingsStore + 'static) -> Self {
        self.store = Some(Box::new(store));
        self
    }
    pub fn with_shot_log(mut self, sink: impl ShotSink + 'static) -> Self {
        self.shot_log = Some(Box::new(sink));
        self
    }
    pub fn with_wall_clock(mut self, wall: impl WallClock + 'static) -> Self {
        self.wall = Some(Box::new(wall));
        self
    }
    /// Custom monotonic clock; defaults to `MonotonicClock`.
    pub fn with_clock(mut self, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }
}

// Setters that advance type-state
impl<P: ScalePort, R> BrewControllerBuilder<P, Missing, R> {
    pub fn with_scale(self, scale: P) -> BrewControllerBuilder<P, Set, R> {
        BrewControllerBuilder {
            scale: Some(scale),
            relay: self.relay,
            buttons: self.buttons,
            machine: self.machine,
            brew: self.brew,
            compensation: self.compensation,
            prefs: self.prefs,
            store: self.store,
            shot_log: self.shot_log,
            wall: self.wall,
            clock: self.clock,
            _s: PhantomData,
            _r: PhantomData,
        }
    }
}

impl<P: ScalePort, S> BrewControllerBuilder<P, S, Missing> {
    pub fn with_relay(self, relay: impl RelayPin + 'static) -> BrewControllerBuilder<P, S, Set> {
        BrewControllerBuilder {
            scale: self.scale,
            relay: Some(Box::new(relay)),
            buttons: self.buttons,
            machine: self.machine,
            brew: self.brew,
            compensation: self.compensation,
            prefs: self.prefs,
            store: self.store,
            shot_log: self.shot_log,
            wall: self.wall,
            clock: self.clock,
            _s: PhantomData,
            _r: PhantomData,
        }
    }
}

impl<P: ScalePort> BrewControllerBuilder<P, Set, Set> {
    /// Validate and build. Only available once scale and relay are set.
    pub fn build(self) -> Result<BrewController<P>> {
        self.try_build()
    }
}
