//! Persisted settings: preferences, learned compensation, shot histories and
//! the shot counter, saved as one snapshot.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use eyre::WrapErr;
use serde::{Deserialize, Serialize};

use crate::atomic::write_atomic;
use crate::error::Result;
use crate::history::ShotHistory;
use crate::prefs::BrewPreferences;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedState {
    /// Last shot id handed out; ids are never reused.
    pub shot_counter: u32,
    /// Learned state, indexed by profile.
    pub compensation: [f32; 2],
    #[serde(default)]
    pub split_shots: ShotHistory,
    #[serde(default)]
    pub full_shots: ShotHistory,
    #[serde(default)]
    pub prefs: BrewPreferences,
}

pub trait SettingsStore {
    /// `Ok(None)` when nothing has been saved yet.
    fn load(&self) -> Result<Option<SavedState>>;
    fn save(&mut self, state: &SavedState) -> Result<()>;
}

/// TOML file replaced atomically on every save.
#[derive(Debug, Clone)]
pub struct TomlFileStore {
    path: PathBuf,
}

impl TomlFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for TomlFileStore {
    fn load(&self) -> Result<Option<SavedState>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let s = std::fs::read_to_string(&self.path)
            .wrap_err_with(|| format!("read {}", self.path.display()))?;
        let state: SavedState =
            toml::from_str(&s).wrap_err_with(|| format!("parse {}", self.path.display()))?;
        Ok(Some(state))
    }

    fn save(&mut self, state: &SavedState) -> Result<()> {
        let s = toml::to_string(state).wrap_err("serialize saved state")?;
        write_atomic(&self.path, s.as_bytes())
            .wrap_err_with(|| format!("write {}", self.path.display()))
    }
}

/// In-process store. Clones share the same slot, so a test can keep a handle
/// after moving one into the controller.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    slot: Arc<Mutex<Option<SavedState>>>,
    saves: Arc<AtomicUsize>,
    fail_saves: bool,
}

impl MemoryStore {
    pub fn with_state(state: SavedState) -> Self {
        let s = Self::default();
        *s.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(state);
        s
    }

    /// A store whose saves always fail.
    pub fn failing() -> Self {
        Self {
            fail_saves: true,
            ..Self::default()
        }
    }

    pub fn snapshot(&self) -> Option<SavedState> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::Relaxed)
    }
}

impl SettingsStore for MemoryStore {
    fn load(&self) -> Result<Option<SavedState>> {
        Ok(self.snapshot())
    }

    fn save(&mut self, state: &SavedState) -> Result<()> {
        if self.fail_saves {
            eyre::bail!("memory store is read-only");
        }
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(state.clone());
        self.saves.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::Shot;

    fn state() -> SavedState {
        let mut full = ShotHistory::new();
        full.push(Shot {
            id: 3,
            target_weight_g: 40.0,
            final_weight_g: 41.5,
            last_flow_gps: 2.25,
            stop_weight_g: 38.75,
        });
        SavedState {
            shot_counter: 3,
            compensation: [1.3, 1.25],
            split_shots: ShotHistory::new(),
            full_shots: full,
            prefs: BrewPreferences {
                decaf_start_hour: Some(15),
                ..BrewPreferences::default()
            },
        }
    }

    #[test]
    fn toml_store_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = TomlFileStore::new(dir.path().join("state.toml"));
        assert!(store.load().unwrap().is_none());
        store.save(&state()).unwrap();
        let back = store.load().unwrap().unwrap();
        assert_eq!(back, state());
    }

    #[test]
    fn toml_store_reports_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.toml");
        std::fs::write(&path, "shot_counter = \"many\"").unwrap();
        let err = TomlFileStore::new(&path).load().unwrap_err();
        assert!(format!("{err:#}").contains("parse"));
    }

    #[test]
    fn memory_store_shares_slot() {
        let store = MemoryStore::default();
        let mut handle = store.clone();
        handle.save(&state()).unwrap();
        assert_eq!(store.snapshot().map(|s| s.shot_counter), Some(3));
        assert_eq!(store.save_count(), 1);
        assert!(MemoryStore::failing().save(&state()).is_err());
    }
}
