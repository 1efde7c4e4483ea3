//! Finalized shots and the bounded per-profile histories that feed the
//! compensation model.

use serde::{Deserialize, Serialize};

/// Retention capacity of each profile's history.
pub const MAX_STORED_SHOTS: usize = 12;

/// A completed brew, as recorded at the dripping -> idle transition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Shot {
    pub id: u32,
    pub target_weight_g: f32,
    pub final_weight_g: f32,
    /// Flow rate captured when the relay was commanded to stop.
    pub last_flow_gps: f32,
    /// Weight captured when the relay was commanded to stop.
    pub stop_weight_g: f32,
}

impl Shot {
    /// Grams that landed after the stop command.
    #[inline]
    pub fn drip_g(&self) -> f32 {
        self.final_weight_g - self.stop_weight_g
    }

    /// `|final - target| / target`; infinite for a non-positive target.
    pub fn relative_error(&self) -> f32 {
        if self.target_weight_g <= 0.0 {
            return f32::INFINITY;
        }
        (self.final_weight_g - self.target_weight_g).abs() / self.target_weight_g
    }

    /// Whether this shot is close enough to its target to be learned from.
    ///
    /// Larger misses are treated as interference (cup pulled, scale bumped).
    pub fn qualifies(&self, tolerance: f32) -> bool {
        self.relative_error() <= tolerance
    }
}

/// Weight-range bucket with its own learned state and history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    /// Small/split shots.
    Split,
    /// Full shots.
    Full,
}

impl Profile {
    pub const ALL: [Profile; 2] = [Profile::Split, Profile::Full];

    /// Targets strictly below `threshold_g` are split shots.
    pub fn for_target(target_g: f32, threshold_g: f32) -> Self {
        if target_g < threshold_g {
            Self::Split
        } else {
            Self::Full
        }
    }

    #[inline]
    pub const fn index(self) -> usize {
        match self {
            Self::Split => 0,
            Self::Full => 1,
        }
    }

    pub const fn from_index(i: usize) -> Option<Self> {
        match i {
            0 => Some(Self::Split),
            1 => Some(Self::Full),
            _ => None,
        }
    }
}

/// Newest-first bounded list of shots. The oldest entry is dropped silently
/// once [`MAX_STORED_SHOTS`] is exceeded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShotHistory {
    shots: Vec<Shot>,
}

impl ShotHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a newest-first list, keeping at most the capacity.
    pub fn from_newest_first(mut shots: Vec<Shot>) -> Self {
        shots.truncate(MAX_STORED_SHOTS);
        Self { shots }
    }

    /// Insert as newest; returns the evicted oldest shot, if any.
    pub fn push(&mut self, shot: Shot) -> Option<Shot> {
        self.shots.insert(0, shot);
        if self.shots.len() > MAX_STORED_SHOTS {
            self.shots.pop()
        } else {
            None
        }
    }

    pub fn remove(&mut self, id: u32) -> Option<Shot> {
        let pos = self.shots.iter().position(|s| s.id == id)?;
        Some(self.shots.remove(pos))
    }

    pub fn contains(&self, id: u32) -> bool {
        self.shots.iter().any(|s| s.id == id)
    }

    pub fn clear(&mut self) {
        self.shots.clear();
    }

    #[inline]
    pub fn as_slice(&self) -> &[Shot] {
        &self.shots
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.shots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.shots.is_empty()
    }

    pub fn newest(&self) -> Option<&Shot> {
        self.shots.first()
    }
}
