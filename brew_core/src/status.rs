//! Brew lifecycle state and the telemetry snapshot broadcast to clients.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BrewState {
    #[default]
    Idle,
    Preinfusion,
    Brewing,
    /// Relay stopped; waiting for residual drips before reading final weight.
    Dripping,
}

impl BrewState {
    /// Preinfusion or brewing: the pump may be running.
    #[inline]
    pub fn is_pouring(self) -> bool {
        matches!(self, Self::Preinfusion | Self::Brewing)
    }

    #[inline]
    pub fn is_idle(self) -> bool {
        self == Self::Idle
    }
}

/// Compact telemetry snapshot for subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BrewMetrics {
    pub weight_g: f32,
    pub flow_gps: f32,
    pub target_g: f32,
    pub elapsed_ms: u64,
    pub state: BrewState,
    pub active: bool,
    pub connected: bool,
    pub enabled: bool,
}
