//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[inline]
pub fn json_mode() -> bool {
    JSON_MODE.get().copied().unwrap_or(false)
}

#[derive(Parser, Debug)]
#[command(name = "brew", version, about = "Brew-by-weight controller")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/brew_config.toml")]
    pub config: PathBuf,

    /// Log and print results as JSON lines instead of pretty text
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the control loop; commands are read line by line from stdin
    #[command(
        long_about = "Run the control loop until Ctrl-C or `quit`.\n\nWithout the `hardware` feature the scale and the machine are simulated in real time.\n\nStdin commands: start [GRAMS], stop, wake, tare, recompute, clear, delete ID, quit."
    )]
    Run {
        /// Print a telemetry snapshot on every broadcast
        #[arg(long, action = ArgAction::SetTrue)]
        metrics: bool,
    },
    /// Pour simulated shots on a virtual clock and report what was learned
    Simulate {
        /// Target weight of every shot
        #[arg(long)]
        grams: f32,
        /// Number of shots to pour
        #[arg(long, default_value_t = 5)]
        shots: u32,
    },
    /// Print stored shot histories and compensation states
    Shots {
        /// Only this profile (0 = split, 1 = full)
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=1))]
        profile: Option<u8>,
    },
    /// Recompute both profiles from their stored shots
    Recompute,
    /// Forget all stored shots and reset learned state
    Clear,
    /// Delete one stored shot and recompute its profile
    Delete {
        #[arg(long)]
        id: u32,
    },
    /// Print effective brew preferences
    Prefs,
    /// Validate the config and report what would be used
    SelfCheck,
}
