//! Flow-compensation models and per-profile learned state.
//!
//! A model turns live `(weight, flow)` into a projected final weight, and turns
//! a finalized shot's drip behaviour into an observed value that the learned
//! state is blended towards.

use serde::{Deserialize, Serialize};

use crate::history::{MAX_STORED_SHOTS, Profile, Shot, ShotHistory};

/// Shots stopped at a lower flow carry no usable drip signal.
pub const MIN_OBSERVABLE_FLOW_GPS: f32 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// Multiplier on flow rate: seconds of drip still to come.
    #[default]
    Factor,
    /// Additive grams of expected overshoot beyond `flow * system_lag`.
    Bias,
}

/// Allowed range and reset value of a model's state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: f32,
    pub max: f32,
    pub default: f32,
}

impl Bounds {
    pub const FACTOR: Bounds = Bounds {
        min: 0.2,
        max: 2.5,
        default: 1.3,
    };
    pub const BIAS: Bounds = Bounds {
        min: -5.0,
        max: 10.0,
        default: 0.0,
    };

    /// Clamp into range. NaN maps to the default.
    #[inline]
    pub fn clamp(&self, v: f32) -> f32 {
        if v.is_nan() {
            self.default
        } else {
            v.clamp(self.min, self.max)
        }
    }
}

pub trait CompensationModel: Send + Sync {
    fn kind(&self) -> ModelKind;

    fn bounds(&self) -> Bounds;

    /// Observed state value implied by one finalized shot, or `None` when the
    /// shot cannot be learned from.
    fn observe(&self, shot: &Shot, system_lag_s: f32) -> Option<f32>;

    /// Final weight expected if the relay were stopped now.
    fn project(&self, weight_g: f32, flow_gps: f32, state: f32, system_lag_s: f32) -> f32;

    /// `(1 - alpha) * state + alpha * observed`, clamped.
    fn blend(&self, state: f32, observed: f32, alpha: f32) -> f32 {
        let a = alpha.clamp(0.0, 1.0);
        self.bounds().clamp((1.0 - a) * state + a * observed)
    }

    /// Recency-weighted mean of observations over a newest-first slice.
    ///
    /// Entry at rank `r` weighs `1 / sqrt(r + 1)`; unusable entries keep their
    /// rank but contribute nothing. No usable entries yields the default.
    fn recompute(&self, newest_first: &[Shot], system_lag_s: f32) -> f32 {
        let (mut sum, mut weights) = (0.0f32, 0.0f32);
        for (rank, shot) in newest_first.iter().enumerate() {
            if let Some(p) = self.observe(shot, system_lag_s) {
                let w = 1.0 / ((rank + 1) as f32).sqrt();
                sum += p * w;
                weights += w;
            }
        }
        let bounds = self.bounds();
        if weights > 0.0 {
            bounds.clamp(sum / weights)
        } else {
            bounds.default
        }
    }
}

#[inline]
fn usable(shot: &Shot) -> bool {
    shot.last_flow_gps >= MIN_OBSERVABLE_FLOW_GPS && shot.drip_g() >= 0.0
}

#[derive(Debug, Clone, Copy)]
pub struct FactorModel {
    pub bounds: Bounds,
}

impl Default for FactorModel {
    fn default() -> Self {
        Self {
            bounds: Bounds::FACTOR,
        }
    }
}

impl CompensationModel for FactorModel {
    fn kind(&self) -> ModelKind {
        ModelKind::Factor
    }

    fn bounds(&self) -> Bounds {
        self.bounds
    }

    fn observe(&self, shot: &Shot, _system_lag_s: f32) -> Option<f32> {
        usable(shot).then(|| shot.drip_g() / shot.last_flow_gps)
    }

    fn project(&self, weight_g: f32, flow_gps: f32, state: f32, _system_lag_s: f32) -> f32 {
        weight_g + flow_gps * state
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BiasModel {
    pub bounds: Bounds,
}

impl Default for BiasModel {
    fn default() -> Self {
        Self {
            bounds: Bounds::BIAS,
        }
    }
}

impl CompensationModel for BiasModel {
    fn kind(&self) -> ModelKind {
        ModelKind::Bias
    }

    fn bounds(&self) -> Bounds {
        self.bounds
    }

    fn observe(&self, shot: &Shot, system_lag_s: f32) -> Option<f32> {
        usable(shot).then(|| shot.drip_g() - shot.last_flow_gps * system_lag_s)
    }

    fn project(&self, weight_g: f32, flow_gps: f32, state: f32, system_lag_s: f32) -> f32 {
        weight_g + flow_gps * system_lag_s + state
    }
}

/// Result of recording a finalized shot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Learned {
    pub observed: Option<f32>,
    pub previous: f32,
    pub state: f32,
}

/// Learned state and shot history for both profiles, behind one model.
pub struct CompensationBank {
    model: Box<dyn CompensationModel>,
    states: [f32; 2],
    histories: [ShotHistory; 2],
}

impl core::fmt::Debug for CompensationBank {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CompensationBank")
            .field("kind", &self.model.kind())
            .field("states", &self.states)
            .field("shots", &[self.histories[0].len(), self.histories[1].len()])
            .finish()
    }
}

impl CompensationBank {
    pub fn new(model: Box<dyn CompensationModel>) -> Self {
        let d = model.bounds().default;
        Self {
            model,
            states: [d, d],
            histories: [ShotHistory::new(), ShotHistory::new()],
        }
    }

    pub fn model(&self) -> &dyn CompensationModel {
        self.model.as_ref()
    }

    #[inline]
    pub fn state(&self, profile: Profile) -> f32 {
        self.states[profile.index()]
    }

    pub fn states(&self) -> [f32; 2] {
        self.states
    }

    #[inline]
    pub fn history(&self, profile: Profile) -> &ShotHistory {
        &self.histories[profile.index()]
    }

    pub fn project(&self, profile: Profile, weight_g: f32, flow_gps: f32, system_lag_s: f32) -> f32 {
        self.model
            .project(weight_g, flow_gps, self.state(profile), system_lag_s)
    }

    /// Append a qualifying shot and blend its observation into the state.
    pub fn record(&mut self, profile: Profile, shot: Shot, alpha: f32, system_lag_s: f32) -> Learned {
        let i = profile.index();
        self.histories[i].push(shot);
        let previous = self.states[i];
        let observed = self.model.observe(&shot, system_lag_s);
        if let Some(obs) = observed {
            self.states[i] = self.model.blend(previous, obs, alpha);
        }
        Learned {
            observed,
            previous,
            state: self.states[i],
        }
    }

    /// Replace a profile's state with a fresh weighted mean over at most
    /// `history_len` newest shots.
    pub fn recompute(&mut self, profile: Profile, history_len: usize, system_lag_s: f32) -> f32 {
        let i = profile.index();
        let shots = self.histories[i].as_slice();
        let n = history_len.clamp(1, MAX_STORED_SHOTS).min(shots.len());
        self.states[i] = self.model.recompute(&shots[..n], system_lag_s);
        self.states[i]
    }

    pub fn recompute_all(&mut self, history_len: usize, system_lag_s: f32) {
        for p in Profile::ALL {
            self.recompute(p, history_len, system_lag_s);
        }
    }

    /// Remove a shot from whichever profile holds it.
    pub fn remove(&mut self, id: u32) -> Option<Profile> {
        Profile::ALL
            .into_iter()
            .find(|p| self.histories[p.index()].remove(id).is_some())
    }

    /// Reset both states to the default and drop all shots.
    pub fn clear(&mut self) {
        let d = self.model.bounds().default;
        self.states = [d, d];
        for h in &mut self.histories {
            h.clear();
        }
    }

    /// Load persisted state; values are clamped into the model's range.
    pub fn restore(&mut self, states: [f32; 2], histories: [ShotHistory; 2]) {
        let b = self.model.bounds();
        self.states = states.map(|s| b.clamp(s));
        self.histories = histories;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shot(final_g: f32, stop_g: f32, flow: f32) -> Shot {
        Shot {
            id: 1,
            target_weight_g: 40.0,
            final_weight_g: final_g,
            last_flow_gps: flow,
            stop_weight_g: stop_g,
        }
    }

    #[test]
    fn factor_observation_is_drip_seconds() {
        let m = FactorModel::default();
        assert_eq!(m.observe(&shot(40.0, 37.0, 2.0), 0.5), Some(1.5));
        assert_eq!(m.observe(&shot(40.0, 37.0, 0.01), 0.5), None);
        assert_eq!(m.observe(&shot(36.0, 37.0, 2.0), 0.5), None);
    }

    #[test]
    fn bias_observation_subtracts_lag() {
        let m = BiasModel::default();
        let obs = m.observe(&shot(40.0, 37.0, 2.0), 0.5).unwrap();
        assert!((obs - 2.0).abs() < 1e-6);
        assert!((m.project(30.0, 2.0, 1.0, 0.5) - 32.0).abs() < 1e-6);
    }

    #[test]
    fn blend_weights_observation_by_alpha() {
        let m = FactorModel::default();
        let v = m.blend(1.3, 1.5, 0.2);
        assert!((v - 1.34).abs() < 1e-5);
        assert_eq!(m.blend(1.3, 100.0, 1.0), 2.5);
        assert_eq!(m.blend(1.3, -100.0, 1.0), 0.2);
    }

    #[test]
    fn recompute_weights_recent_shots_more() {
        let m = FactorModel::default();
        let shots = [shot(40.0, 38.0, 2.0), shot(40.0, 36.0, 2.0)];
        // observations 1.0 (rank 0) and 2.0 (rank 1)
        let w1 = 1.0 / 2f32.sqrt();
        let expected = (1.0 + 2.0 * w1) / (1.0 + w1);
        assert!((m.recompute(&shots, 0.0) - expected).abs() < 1e-5);
        assert_eq!(m.recompute(&[], 0.0), Bounds::FACTOR.default);
    }

    #[test]
    fn recompute_keeps_rank_of_invalid_entries() {
        let m = FactorModel::default();
        let shots = [shot(40.0, 41.0, 2.0), shot(40.0, 38.0, 2.0)];
        assert!((m.recompute(&shots, 0.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn bank_recompute_honours_history_length() {
        let mut bank = CompensationBank::new(Box::new(FactorModel::default()));
        bank.record(Profile::Full, shot(40.0, 36.0, 2.0), 0.2, 0.0);
        bank.record(Profile::Full, shot(40.0, 38.0, 2.0), 0.2, 0.0);
        let v = bank.recompute(Profile::Full, 1, 0.0);
        assert!((v - 1.0).abs() < 1e-6);
        assert_eq!(bank.state(Profile::Split), Bounds::FACTOR.default);
    }

    #[test]
    fn bank_remove_finds_profile() {
        let mut bank = CompensationBank::new(Box::new(FactorModel::default()));
        let mut s = shot(18.0, 17.0, 1.0);
        s.id = 7;
        bank.record(Profile::Split, s, 0.2, 0.0);
        assert_eq!(bank.remove(7), Some(Profile::Split));
        assert_eq!(bank.remove(7), None);
    }

    #[test]
    fn restore_clamps() {
        let mut bank = CompensationBank::new(Box::new(FactorModel::default()));
        bank.restore([9.0, f32::NAN], Default::default());
        assert_eq!(bank.states(), [2.5, 1.3]);
    }
}
