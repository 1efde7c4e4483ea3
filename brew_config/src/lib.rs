#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the brew controller.
//!
//! `Config` and its sections are deserialized from TOML and checked by
//! [`Config::validate`]. Only `[scale]` must be present; every other section
//! falls back to defaults matching the stock firmware constants.
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ScaleCfg {
    /// Advertised-name prefix of the scale to connect to.
    pub name_prefix: String,
    /// Force-disconnect after this long without a packet.
    pub watchdog_ms: u64,
    /// Stop ignoring readings after a tare once this much time has passed...
    pub tare_timeout_ms: u64,
    /// ...or once |weight| is within this band.
    pub tare_zero_band_g: f32,
    /// Flow regression window (samples).
    pub flow_window: usize,
    pub max_flow_gps: f32,
    /// Drop packets closer together than this.
    pub min_packet_interval_ms: u64,
}

impl Default for ScaleCfg {
    fn default() -> Self {
        Self {
            name_prefix: "BOOKOO".to_string(),
            watchdog_ms: 2_000,
            tare_timeout_ms: 1_500,
            tare_zero_band_g: 0.5,
            flow_window: 20,
            max_flow_gps: 10.0,
            min_packet_interval_ms: 20,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PreinfusionMode {
    #[default]
    Simple,
    WeightTriggered,
}

/// Default brew preferences, used until preferences have been saved.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BrewDefaults {
    pub enabled: bool,
    pub regular_preset_g: f32,
    pub decaf_preset_g: f32,
    pub preinfusion_mode: PreinfusionMode,
    pub learning_rate: f32,
    pub history_length: usize,
    pub system_lag_s: f32,
    pub drip_settle_ms: u64,
    pub decaf_start_hour: Option<u32>,
    /// Fixed UTC offset such as "+01:00".
    pub timezone: String,
}

impl Default for BrewDefaults {
    fn default() -> Self {
        Self {
            enabled: true,
            regular_preset_g: 40.0,
            decaf_preset_g: 40.0,
            preinfusion_mode: PreinfusionMode::Simple,
            learning_rate: 0.2,
            history_length: 12,
            system_lag_s: 0.5,
            drip_settle_ms: 10_000,
            decaf_start_hour: None,
            timezone: "+00:00".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Safety {
    /// Hard ceiling on preinfusion + brewing.
    pub max_shot_ms: u64,
    /// Abort an active brew after the scale has been gone this long.
    pub link_loss_abort_ms: u64,
    /// Disconnect the scale after this long without activity.
    pub activity_timeout_ms: u64,
    pub max_target_g: f32,
}

impl Default for Safety {
    fn default() -> Self {
        Self {
            max_shot_ms: 60_000,
            link_loss_abort_ms: 3_000,
            activity_timeout_ms: 600_000,
            max_target_g: 200.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PreinfusionCfg {
    /// Weight that counts as first drops.
    pub first_drops_g: f32,
    /// Ignore first drops before this much brew time (tare noise).
    pub grace_ms: u64,
}

impl Default for PreinfusionCfg {
    fn default() -> Self {
        Self {
            first_drops_g: 2.0,
            grace_ms: 2_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    #[default]
    Factor,
    Bias,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CompensationCfg {
    pub model: ModelKind,
    /// Targets below this use the split-shot profile.
    pub profile_threshold_g: f32,
    /// Relative miss above which a shot is not learned from.
    pub qualify_tolerance: f32,
    pub factor_min: f32,
    pub factor_max: f32,
    pub factor_default: f32,
    pub bias_min_g: f32,
    pub bias_max_g: f32,
    pub bias_default_g: f32,
}

impl Default for CompensationCfg {
    fn default() -> Self {
        Self {
            model: ModelKind::Factor,
            profile_threshold_g: 28.0,
            qualify_tolerance: 0.15,
            factor_min: 0.2,
            factor_max: 2.5,
            factor_default: 1.3,
            bias_min_g: -5.0,
            bias_max_g: 10.0,
            bias_default_g: 0.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MachineCfg {
    pub debounce_ms: u64,
    pub pulse_ms: u64,
    pub macro_click_delay_ms: u64,
    pub macro_hold_delay_ms: u64,
    pub stop_click_delay_ms: u64,
    pub beep_count: u8,
    pub beep_spacing_ms: u64,
}

impl Default for MachineCfg {
    fn default() -> Self {
        Self {
            debounce_ms: 50,
            pulse_ms: 100,
            macro_click_delay_ms: 200,
            macro_hold_delay_ms: 200,
            stop_click_delay_ms: 150,
            beep_count: 3,
            beep_spacing_ms: 150,
        }
    }
}

/// BCM pin numbers; only read by hardware builds.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Pins {
    pub relay: Option<u8>,
    pub manual_button: Option<u8>,
    pub one_cup_button: Option<u8>,
    pub two_cup_button: Option<u8>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RunnerCfg {
    pub tick_hz: u32,
    /// Telemetry broadcast interval while brewing.
    pub metrics_active_ms: u64,
    pub metrics_idle_ms: u64,
    pub shutdown_grace_ms: u64,
}

impl Default for RunnerCfg {
    fn default() -> Self {
        Self {
            tick_hz: 20,
            metrics_active_ms: 250,
            metrics_idle_ms: 1_000,
            shutdown_grace_ms: 1_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StoreCfg {
    /// Saved settings (TOML).
    pub path: String,
}

impl Default for StoreCfg {
    fn default() -> Self {
        Self {
            path: "brew_state.toml".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ShotLogCfg {
    /// JSON-lines file receiving every finalized shot.
    pub path: Option<String>,
}

/// Simulated machine used by `run` without hardware and by `simulate`.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SimCfg {
    /// Steady-state flow into the cup.
    pub flow_gps: f32,
    /// Time from pump start to first drops.
    pub onset_ms: u64,
    /// Flow ramp after first drops.
    pub ramp_ms: u64,
    /// Time constant of the post-stop drip decay.
    pub drip_tau_ms: u64,
    /// Notification period of the simulated scale.
    pub packet_interval_ms: u64,
}

impl Default for SimCfg {
    fn default() -> Self {
        Self {
            flow_gps: 2.0,
            onset_ms: 3_000,
            ramp_ms: 2_000,
            drip_tau_ms: 1_200,
            packet_interval_ms: 100,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub scale: ScaleCfg,
    #[serde(default)]
    pub brew: BrewDefaults,
    #[serde(default)]
    pub safety: Safety,
    #[serde(default)]
    pub preinfusion: PreinfusionCfg,
    #[serde(default)]
    pub compensation: CompensationCfg,
    #[serde(default)]
    pub machine: MachineCfg,
    #[serde(default)]
    pub pins: Pins,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub runner: RunnerCfg,
    #[serde(default)]
    pub store: StoreCfg,
    #[serde(default)]
    pub shot_log: ShotLogCfg,
    #[serde(default)]
    pub sim: SimCfg,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Read, parse and validate a config file.
pub fn load_path(path: &Path) -> eyre::Result<Config> {
    let s = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("read config {}: {}", path.display(), e))?;
    let cfg = load_toml(&s).map_err(|e| eyre::eyre!("parse config {}: {}", path.display(), e))?;
    cfg.validate()?;
    Ok(cfg)
}

fn check_range(name: &str, min: f32, default: f32, max: f32) -> eyre::Result<()> {
    if !(min.is_finite() && default.is_finite() && max.is_finite()) {
        eyre::bail!("compensation.{name} bounds must be finite");
    }
    if !(min <= default && default <= max) {
        eyre::bail!("compensation.{name} must satisfy min <= default <= max");
    }
    Ok(())
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Scale
        if self.scale.name_prefix.trim().is_empty() {
            eyre::bail!("scale.name_prefix must not be empty");
        }
        if self.scale.watchdog_ms == 0 {
            eyre::bail!("scale.watchdog_ms must be >= 1");
        }
        if self.scale.flow_window < 3 {
            eyre::bail!("scale.flow_window must be >= 3");
        }
        if !(self.scale.max_flow_gps > 0.0 && self.scale.max_flow_gps.is_finite()) {
            eyre::bail!("scale.max_flow_gps must be > 0");
        }
        if self.scale.tare_zero_band_g < 0.0 {
            eyre::bail!("scale.tare_zero_band_g must be >= 0");
        }
        if self.scale.min_packet_interval_ms >= self.scale.watchdog_ms {
            eyre::bail!("scale.min_packet_interval_ms must be < scale.watchdog_ms");
        }

        // Brew defaults
        let b = &self.brew;
        for (name, v) in [
            ("regular_preset_g", b.regular_preset_g),
            ("decaf_preset_g", b.decaf_preset_g),
        ] {
            if !(v > 0.0 && v <= self.safety.max_target_g) {
                eyre::bail!("brew.{name} must be in (0, safety.max_target_g]");
            }
        }
        if !(0.1..=1.0).contains(&b.learning_rate) {
            eyre::bail!("brew.learning_rate must be in [0.1, 1.0]");
        }
        if !(1..=12).contains(&b.history_length) {
            eyre::bail!("brew.history_length must be in [1, 12]");
        }
        if b.system_lag_s < 0.0 {
            eyre::bail!("brew.system_lag_s must be >= 0");
        }
        if let Some(h) = b.decaf_start_hour
            && h > 23
        {
            eyre::bail!("brew.decaf_start_hour must be in [0, 23]");
        }

        // Safety
        if self.safety.max_shot_ms == 0 {
            eyre::bail!("safety.max_shot_ms must be >= 1");
        }
        if self.safety.max_shot_ms > 5 * 60 * 1000 {
            eyre::bail!("safety.max_shot_ms is unreasonably large (>5min)");
        }
        if self.safety.link_loss_abort_ms == 0 {
            eyre::bail!("safety.link_loss_abort_ms must be >= 1");
        }
        if !(self.safety.max_target_g > 0.0 && self.safety.max_target_g.is_finite()) {
            eyre::bail!("safety.max_target_g must be > 0");
        }

        // Preinfusion
        if self.preinfusion.first_drops_g < 0.0 {
            eyre::bail!("preinfusion.first_drops_g must be >= 0");
        }

        // Compensation
        let c = &self.compensation;
        if !(c.profile_threshold_g > 0.0 && c.profile_threshold_g.is_finite()) {
            eyre::bail!("compensation.profile_threshold_g must be > 0");
        }
        if !(c.qualify_tolerance > 0.0 && c.qualify_tolerance <= 1.0) {
            eyre::bail!("compensation.qualify_tolerance must be in (0.0, 1.0]");
        }
        check_range("factor", c.factor_min, c.factor_default, c.factor_max)?;
        check_range("bias", c.bias_min_g, c.bias_default_g, c.bias_max_g)?;

        // Machine
        if self.machine.pulse_ms == 0 {
            eyre::bail!("machine.pulse_ms must be >= 1");
        }

        // Logging
        if let Some(r) = self.logging.rotation.as_deref()
            && !matches!(r, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly");
        }

        // Runner
        if self.runner.tick_hz == 0 {
            eyre::bail!("runner.tick_hz must be > 0");
        }
        if self.runner.metrics_active_ms == 0 || self.runner.metrics_idle_ms == 0 {
            eyre::bail!("runner.metrics_*_ms must be >= 1");
        }

        // Store
        if self.store.path.trim().is_empty() {
            eyre::bail!("store.path must not be empty");
        }

        // Sim
        if self.sim.packet_interval_ms == 0 {
            eyre::bail!("sim.packet_interval_ms must be >= 1");
        }

        Ok(())
    }
}
