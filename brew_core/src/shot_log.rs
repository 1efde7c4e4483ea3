//! Optional sink that receives every finalized shot.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use eyre::WrapErr;
use serde::Serialize;

use crate::compensation::ModelKind;
use crate::error::Result;
use crate::history::{Profile, Shot};

/// One finalized shot, with what the model made of it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ShotRecord {
    #[serde(flatten)]
    pub shot: Shot,
    pub profile: Profile,
    pub model: ModelKind,
    /// Passed the qualifying filter and was learned from.
    pub qualified: bool,
    pub observed: Option<f32>,
    /// Profile state after this shot.
    pub compensation: f32,
    pub brew_ms: u64,
}

pub trait ShotSink {
    fn record(&mut self, record: &ShotRecord) -> Result<()>;
}

/// Appends one JSON object per line.
#[derive(Debug, Clone)]
pub struct JsonlShotLog {
    path: PathBuf,
}

impl JsonlShotLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ShotSink for JsonlShotLog {
    fn record(&mut self, record: &ShotRecord) -> Result<()> {
        let line = serde_json::to_string(record).wrap_err("encode shot record")?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .wrap_err_with(|| format!("open {}", self.path.display()))?;
        writeln!(file, "{line}").wrap_err("append shot record")?;
        Ok(())
    }
}
