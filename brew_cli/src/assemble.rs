//! Config mapping and controller assembly.

use std::sync::{Arc, Mutex, PoisonError};

use brew_config::Config;
use brew_core::{
    BrewController, JsonlShotLog, LinkCfg, ScaleLink, SettingsStore, ShotRecord, ShotSink,
    Telemetry, TomlFileStore, link_events, notification_channel,
};
use brew_hardware::{FixedOffsetWallClock, SimParams, SimRelay, SimTransport, SimWorld};
use brew_traits::{BoxError, Clock, RelayPin};
use crossbeam_channel as xch;

pub type SimScale = ScaleLink<SimTransport>;

/// Capacity of the raw notification channel between transport and telemetry.
const NOTIFICATION_QUEUE: usize = 64;

/// Simulation parameters from `[sim]`, advertising under the configured prefix.
pub fn sim_params(cfg: &Config) -> SimParams {
    SimParams {
        flow_gps: cfg.sim.flow_gps,
        onset_ms: cfg.sim.onset_ms,
        ramp_ms: cfg.sim.ramp_ms,
        drip_tau_ms: cfg.sim.drip_tau_ms,
        packet_interval_ms: cfg.sim.packet_interval_ms,
        name: format!("{}_SC sim", cfg.scale.name_prefix),
        ..SimParams::default()
    }
}

/// Relay the controller drives: the simulated machine, or a GPIO pin.
pub enum Relay {
    Sim(SimRelay),
    #[cfg(feature = "hardware")]
    Gpio(brew_hardware::GpioRelay),
}

impl RelayPin for Relay {
    fn set_high(&mut self) -> Result<(), BoxError> {
        match self {
            Relay::Sim(r) => r.set_high(),
            #[cfg(feature = "hardware")]
            Relay::Gpio(r) => r.set_high(),
        }
    }

    fn set_low(&mut self) -> Result<(), BoxError> {
        match self {
            Relay::Sim(r) => r.set_low(),
            #[cfg(feature = "hardware")]
            Relay::Gpio(r) => r.set_low(),
        }
    }
}

/// Shot sink for the CLI: the optional JSON-lines log plus an optional
/// in-process copy for reporting.
#[derive(Default)]
pub struct CliShotSink {
    file: Option<JsonlShotLog>,
    seen: Option<Arc<Mutex<Vec<ShotRecord>>>>,
}

impl CliShotSink {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            file: cfg.shot_log.path.as_deref().map(JsonlShotLog::new),
            seen: None,
        }
    }

    pub fn collecting(mut self, seen: Arc<Mutex<Vec<ShotRecord>>>) -> Self {
        self.seen = Some(seen);
        self
    }
}

impl ShotSink for CliShotSink {
    fn record(&mut self, record: &ShotRecord) -> brew_core::Result<()> {
        if let Some(seen) = &self.seen {
            seen.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(*record);
        }
        match self.file.as_mut() {
            Some(file) => file.record(record),
            None => Ok(()),
        }
    }
}

/// A controller wired to the simulated scale, plus the pieces that feed it.
pub struct Rig {
    pub ctrl: BrewController<SimScale>,
    pub world: SimWorld,
    pub telemetry: Arc<Telemetry>,
    pub notifications: xch::Receiver<Vec<u8>>,
}

/// Settings store at `[store] path`.
pub fn file_store(cfg: &Config) -> TomlFileStore {
    TomlFileStore::new(&cfg.store.path)
}

pub fn rig(
    cfg: &Config,
    clock: Arc<dyn Clock + Send + Sync>,
    store: impl SettingsStore + 'static,
    sink: CliShotSink,
) -> eyre::Result<Rig> {
    let world = SimWorld::new(sim_params(cfg));
    let (event_tx, event_rx) = link_events();
    let (notif_tx, notif_rx) = notification_channel(NOTIFICATION_QUEUE);
    let transport = world.transport(event_tx, notif_tx);
    let link = ScaleLink::new(transport, event_rx, LinkCfg::from(&cfg.scale), clock.clone());
    let telemetry = link.telemetry();

    let builder = BrewController::builder()
        .with_scale(link)
        .with_relay(relay(cfg, &world)?)
        .with_brew_cfg(cfg.into())
        .with_machine_cfg((&cfg.machine).into())
        .with_compensation((&cfg.compensation).into())
        .with_default_prefs((&cfg.brew).into())
        .with_store(store)
        .with_shot_log(sink)
        .with_clock(clock);
    let builder = match FixedOffsetWallClock::new(&cfg.brew.timezone) {
        Some(wall) => builder.with_wall_clock(wall),
        None => {
            tracing::warn!(timezone = %cfg.brew.timezone, "timezone not understood; decaf schedule off");
            builder
        }
    };
    let builder = with_buttons(cfg, builder)?;

    Ok(Rig {
        ctrl: builder.build()?,
        world,
        telemetry,
        notifications: notif_rx,
    })
}

/// Controller for history maintenance: never woken, so it never connects.
pub fn offline(cfg: &Config) -> eyre::Result<BrewController<SimScale>> {
    let clock = Arc::new(brew_traits::ManualClock::new());
    Ok(rig(cfg, clock, file_store(cfg), CliShotSink::default())?.ctrl)
}

#[cfg(feature = "hardware")]
fn relay(cfg: &Config, world: &SimWorld) -> eyre::Result<Relay> {
    match cfg.pins.relay {
        Some(pin) => {
            let r = brew_hardware::GpioRelay::new(pin)
                .map_err(|e| eyre::eyre!("open relay pin {pin}: {e}"))?;
            tracing::info!(pin, "relay on GPIO");
            Ok(Relay::Gpio(r))
        }
        None => {
            tracing::warn!("pins.relay not set; driving the simulated machine");
            Ok(Relay::Sim(world.relay()))
        }
    }
}

#[cfg(not(feature = "hardware"))]
fn relay(_cfg: &Config, world: &SimWorld) -> eyre::Result<Relay> {
    Ok(Relay::Sim(world.relay()))
}

#[cfg(feature = "hardware")]
fn with_buttons<S, R>(
    cfg: &Config,
    builder: brew_core::BrewControllerBuilder<SimScale, S, R>,
) -> eyre::Result<brew_core::BrewControllerBuilder<SimScale, S, R>> {
    let p = &cfg.pins;
    if p.manual_button.is_none() && p.one_cup_button.is_none() && p.two_cup_button.is_none() {
        return Ok(builder);
    }
    let buttons = brew_hardware::GpioButtons::new(p.manual_button, p.one_cup_button, p.two_cup_button)
        .map_err(|e| eyre::eyre!("open button pins: {e}"))?;
    Ok(builder.with_buttons(buttons))
}

#[cfg(not(feature = "hardware"))]
fn with_buttons<S, R>(
    _cfg: &Config,
    builder: brew_core::BrewControllerBuilder<SimScale, S, R>,
) -> eyre::Result<brew_core::BrewControllerBuilder<SimScale, S, R>> {
    Ok(builder)
}
