#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Brew-by-weight control (hardware-agnostic).
//!
//! All hardware goes through the seams in `brew_traits`: the scale's wireless
//! transport, the brew relay, the front-panel buttons and the wall clock.
//!
//! ## Architecture
//!
//! - **Decoding**: raw notifications to typed readings (`packet`)
//! - **Flow**: rolling least-squares flow estimate (`flow`)
//! - **Telemetry**: thread-safe latest-value snapshot fed by a delivery
//!   thread (`telemetry`, `pump`)
//! - **Link**: scan/connect/subscribe/watchdog lifecycle (`link`)
//! - **Compensation**: per-profile learned drip model (`compensation`, `history`)
//! - **Control**: brew state machine and relay/button timing (`brew`, `machine`)
//! - **Persistence**: settings snapshot and shot log (`store`, `shot_log`)
//! - **Loop**: command intake, ticking and telemetry broadcast (`runner`)
//!
//! Only the control tick mutates brew state. The telemetry snapshot is the
//! one piece shared with the delivery context.

pub mod atomic;
pub mod brew;
pub mod builder;
pub mod compensation;
pub mod config;
pub mod conversions;
pub mod error;
pub mod flow;
pub mod history;
pub mod hw_error;
pub mod link;
pub mod machine;
pub mod mocks;
pub mod packet;
pub mod port;
pub mod prefs;
pub mod pump;
pub mod runner;
pub mod shot_log;
pub mod status;
pub mod store;
pub mod telemetry;
pub mod util;

pub use brew::{BrewController, BrewSession, Trigger};
pub use builder::{BrewControllerBuilder, Missing, Set};
pub use compensation::{BiasModel, Bounds, CompensationBank, CompensationModel, FactorModel, ModelKind};
pub use config::{BrewCfg, CompensationCfg, LinkCfg, MachineCfg, RunnerCfg, TelemetryCfg};
pub use error::{BrewError, BrewRejection, BuildError, DecodeError, Result};
pub use flow::{FlowEstimator, FlowSample};
pub use history::{Profile, Shot, ShotHistory};
pub use link::{LinkState, ScaleLink, link_events};
pub use machine::{ButtonEdges, DebouncedButton, MachineController};
pub use packet::{ScaleCommand, ScaleReading, decode};
pub use port::ScalePort;
pub use prefs::{BrewPreferences, PreinfusionMode};
pub use pump::{NotificationPump, notification_channel};
pub use runner::{ControlCommand, ControlRequest, RunSummary, apply_command, control_channel};
pub use shot_log::{JsonlShotLog, ShotRecord, ShotSink};
pub use status::{BrewMetrics, BrewState};
pub use store::{MemoryStore, SavedState, SettingsStore, TomlFileStore};
pub use telemetry::{Ingest, Telemetry};
