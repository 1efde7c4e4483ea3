//! User-facing brew preferences.

use serde::{Deserialize, Serialize};

use crate::history::MAX_STORED_SHOTS;

pub const MIN_LEARNING_RATE: f32 = 0.1;
pub const MAX_LEARNING_RATE: f32 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreinfusionMode {
    /// The machine times preinfusion itself; a brew starts with a click.
    #[default]
    Simple,
    /// The relay is latched until first drops reach the scale.
    WeightTriggered,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrewPreferences {
    pub enabled: bool,
    pub regular_preset_g: f32,
    pub decaf_preset_g: f32,
    pub preinfusion_mode: PreinfusionMode,
    /// Blend weight of a new observation, in `[0.1, 1.0]`.
    pub learning_rate: f32,
    /// Newest shots considered by a full recompute, in `1..=12`.
    pub history_length: usize,
    /// Relay-to-pump delay used by the bias model.
    pub system_lag_s: f32,
    /// Wait after the stop command before reading the final weight.
    pub drip_settle_ms: u64,
    /// Local hour from which button brews use the decaf preset.
    pub decaf_start_hour: Option<u32>,
    /// Fixed UTC offset, e.g. `"+01:00"`.
    pub timezone: String,
}

impl Default for BrewPreferences {
    fn default() -> Self {
        Self {
            enabled: true,
            regular_preset_g: 40.0,
            decaf_preset_g: 40.0,
            preinfusion_mode: PreinfusionMode::Simple,
            learning_rate: 0.2,
            history_length: MAX_STORED_SHOTS,
            system_lag_s: 0.5,
            drip_settle_ms: 10_000,
            decaf_start_hour: None,
            timezone: "+00:00".to_string(),
        }
    }
}

impl BrewPreferences {
    /// Clamp numeric fields into their accepted ranges.
    pub fn normalized(mut self) -> Self {
        self.learning_rate = if self.learning_rate.is_nan() {
            Self::default().learning_rate
        } else {
            self.learning_rate.clamp(MIN_LEARNING_RATE, MAX_LEARNING_RATE)
        };
        self.history_length = self.history_length.clamp(1, MAX_STORED_SHOTS);
        self.system_lag_s = self.system_lag_s.max(0.0);
        self.decaf_start_hour = self.decaf_start_hour.filter(|h| *h < 24);
        self
    }
}
