//! `From` implementations bridging `brew_config` types to `brew_core` types.

use crate::compensation::{Bounds, ModelKind};
use crate::config::{BrewCfg, CompensationCfg, LinkCfg, MachineCfg, RunnerCfg, TelemetryCfg};
use crate::prefs::{BrewPreferences, PreinfusionMode};

// ── LinkCfg ──────────────────────────────────────────────────────────────────

impl From<&brew_config::ScaleCfg> for TelemetryCfg {
    fn from(c: &brew_config::ScaleCfg) -> Self {
        Self {
            flow_window: c.flow_window,
            max_flow_gps: c.max_flow_gps,
            min_packet_interval_ms: c.min_packet_interval_ms,
            tare_zero_band_g: c.tare_zero_band_g,
            tare_timeout_ms: c.tare_timeout_ms,
        }
    }
}

impl From<&brew_config::ScaleCfg> for LinkCfg {
    fn from(c: &brew_config::ScaleCfg) -> Self {
        Self {
            name_prefix: c.name_prefix.clone(),
            watchdog_ms: c.watchdog_ms,
            telemetry: TelemetryCfg::from(c),
        }
    }
}

// ── BrewCfg ──────────────────────────────────────────────────────────────────

/// Brew timing is spread over several config sections.
impl From<&brew_config::Config> for BrewCfg {
    fn from(c: &brew_config::Config) -> Self {
        Self {
            max_shot_ms: c.safety.max_shot_ms,
            link_loss_abort_ms: c.safety.link_loss_abort_ms,
            activity_timeout_ms: c.safety.activity_timeout_ms,
            first_drops_g: c.preinfusion.first_drops_g,
            preinfusion_grace_ms: c.preinfusion.grace_ms,
            profile_threshold_g: c.compensation.profile_threshold_g,
            qualify_tolerance: c.compensation.qualify_tolerance,
            max_target_g: c.safety.max_target_g,
            beep_count: c.machine.beep_count,
            beep_spacing_ms: c.machine.beep_spacing_ms,
        }
    }
}

// ── MachineCfg ───────────────────────────────────────────────────────────────

impl From<&brew_config::MachineCfg> for MachineCfg {
    fn from(c: &brew_config::MachineCfg) -> Self {
        Self {
            debounce_ms: c.debounce_ms,
            pulse_ms: c.pulse_ms,
            macro_click_delay_ms: c.macro_click_delay_ms,
            macro_hold_delay_ms: c.macro_hold_delay_ms,
            stop_click_delay_ms: c.stop_click_delay_ms,
        }
    }
}

// ── CompensationCfg ──────────────────────────────────────────────────────────

impl From<brew_config::ModelKind> for ModelKind {
    fn from(k: brew_config::ModelKind) -> Self {
        match k {
            brew_config::ModelKind::Factor => Self::Factor,
            brew_config::ModelKind::Bias => Self::Bias,
        }
    }
}

impl From<&brew_config::CompensationCfg> for CompensationCfg {
    fn from(c: &brew_config::CompensationCfg) -> Self {
        Self {
            kind: c.model.into(),
            factor: Bounds {
                min: c.factor_min,
                max: c.factor_max,
                default: c.factor_default,
            },
            bias: Bounds {
                min: c.bias_min_g,
                max: c.bias_max_g,
                default: c.bias_default_g,
            },
        }
    }
}

// ── RunnerCfg ────────────────────────────────────────────────────────────────

impl From<&brew_config::RunnerCfg> for RunnerCfg {
    fn from(c: &brew_config::RunnerCfg) -> Self {
        Self {
            tick_hz: c.tick_hz,
            metrics_active_ms: c.metrics_active_ms,
            metrics_idle_ms: c.metrics_idle_ms,
            shutdown_grace_ms: c.shutdown_grace_ms,
        }
    }
}

// ── BrewPreferences ──────────────────────────────────────────────────────────

impl From<brew_config::PreinfusionMode> for PreinfusionMode {
    fn from(m: brew_config::PreinfusionMode) -> Self {
        match m {
            brew_config::PreinfusionMode::Simple => Self::Simple,
            brew_config::PreinfusionMode::WeightTriggered => Self::WeightTriggered,
        }
    }
}

impl From<&brew_config::BrewDefaults> for BrewPreferences {
    fn from(c: &brew_config::BrewDefaults) -> Self {
        Self {
            enabled: c.enabled,
            regular_preset_g: c.regular_preset_g,
            decaf_preset_g: c.decaf_preset_g,
            preinfusion_mode: c.preinfusion_mode.into(),
            learning_rate: c.learning_rate,
            history_length: c.history_length,
            system_lag_s: c.system_lag_s,
            drip_settle_ms: c.drip_settle_ms,
            decaf_start_hour: c.decaf_start_hour,
            timezone: c.timezone.clone(),
        }
        .normalized()
    }
}
