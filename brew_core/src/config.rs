//! Runtime configuration types for the brew engine.
//!
//! These are the structs consumed by the controller, link and runner. They are
//! separate from the TOML-deserialized config in `brew_config`; see
//! `conversions` for the mapping.

use crate::compensation::{BiasModel, Bounds, CompensationModel, FactorModel, ModelKind};

/// Telemetry snapshot tuning: flow regression, tare suppression, throttle.
#[derive(Debug, Clone)]
pub struct TelemetryCfg {
    /// Ring buffer capacity of the flow estimator.
    pub flow_window: usize,
    /// Upper clamp on the regression slope (g/s).
    pub max_flow_gps: f32,
    /// Packets closer than this to the previously accepted one are dropped.
    pub min_packet_interval_ms: u64,
    /// After a tare, readings are ignored until |w| is within this band...
    pub tare_zero_band_g: f32,
    /// ...or this much time has passed.
    pub tare_timeout_ms: u64,
}

impl Default for TelemetryCfg {
    fn default() -> Self {
        Self {
            flow_window: crate::flow::DEFAULT_WINDOW,
            max_flow_gps: crate::flow::MAX_PLAUSIBLE_FLOW_GPS,
            min_packet_interval_ms: 20,
            tare_zero_band_g: 0.5,
            tare_timeout_ms: 1_500,
        }
    }
}

/// Scale link: discovery filter and watchdog.
#[derive(Debug, Clone)]
pub struct LinkCfg {
    /// Advertised names starting with this prefix are connection candidates.
    pub name_prefix: String,
    /// Force-disconnect when connected but silent for this long.
    pub watchdog_ms: u64,
    pub telemetry: TelemetryCfg,
}

impl Default for LinkCfg {
    fn default() -> Self {
        Self {
            name_prefix: "BOOKOO".to_string(),
            watchdog_ms: 2_000,
            telemetry: TelemetryCfg::default(),
        }
    }
}

/// Brew lifecycle timings and thresholds that are not user preferences.
#[derive(Debug, Clone)]
pub struct BrewCfg {
    /// Hard ceiling on preinfusion + brewing time.
    pub max_shot_ms: u64,
    /// Abort an active brew once the scale has been gone this long.
    pub link_loss_abort_ms: u64,
    /// Drop the scale link after this long without activity.
    pub activity_timeout_ms: u64,
    /// Weight that ends weight-triggered preinfusion...
    pub first_drops_g: f32,
    /// ...once at least this much brew time has elapsed.
    pub preinfusion_grace_ms: u64,
    /// Targets below this use the split profile.
    pub profile_threshold_g: f32,
    /// Relative miss above which a shot is not learned from.
    pub qualify_tolerance: f32,
    /// Largest accepted target.
    pub max_target_g: f32,
    pub beep_count: u8,
    pub beep_spacing_ms: u64,
}

impl Default for BrewCfg {
    fn default() -> Self {
        Self {
            max_shot_ms: 60_000,
            link_loss_abort_ms: 3_000,
            activity_timeout_ms: 10 * 60 * 1_000,
            first_drops_g: 2.0,
            preinfusion_grace_ms: 2_000,
            profile_threshold_g: 28.0,
            qualify_tolerance: 0.15,
            max_target_g: 200.0,
            beep_count: 3,
            beep_spacing_ms: 150,
        }
    }
}

/// Relay and button timings.
#[derive(Debug, Clone)]
pub struct MachineCfg {
    /// A raw level must be stable this long before it counts.
    pub debounce_ms: u64,
    /// Duration of a relay click.
    pub pulse_ms: u64,
    /// Preinfusion macro: delay before the click...
    pub macro_click_delay_ms: u64,
    /// ...then delay before latching.
    pub macro_hold_delay_ms: u64,
    /// Stop-from-preinfusion: delay between release and click.
    pub stop_click_delay_ms: u64,
}

impl Default for MachineCfg {
    fn default() -> Self {
        Self {
            debounce_ms: 50,
            pulse_ms: 100,
            macro_click_delay_ms: 200,
            macro_hold_delay_ms: 200,
            stop_click_delay_ms: 150,
        }
    }
}

/// Which compensation model runs, with the ranges for each.
#[derive(Debug, Clone)]
pub struct CompensationCfg {
    pub kind: ModelKind,
    pub factor: Bounds,
    pub bias: Bounds,
}

impl Default for CompensationCfg {
    fn default() -> Self {
        Self {
            kind: ModelKind::Factor,
            factor: Bounds::FACTOR,
            bias: Bounds::BIAS,
        }
    }
}

impl CompensationCfg {
    pub fn build_model(&self) -> Box<dyn CompensationModel> {
        match self.kind {
            ModelKind::Factor => Box::new(FactorModel {
                bounds: self.factor,
            }),
            ModelKind::Bias => Box::new(BiasModel { bounds: self.bias }),
        }
    }
}

/// Control loop pacing and telemetry broadcast intervals.
#[derive(Debug, Clone)]
pub struct RunnerCfg {
    pub tick_hz: u32,
    /// Broadcast interval while a brew is in progress.
    pub metrics_active_ms: u64,
    pub metrics_idle_ms: u64,
    /// Upper bound on ticks spent letting relay sequences finish at shutdown.
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
