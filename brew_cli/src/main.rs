mod assemble;
mod cli;
mod error_fmt;
mod run;
mod simulate;
mod store_cmd;

use std::path::Path;

use brew_config::Logging;
use clap::Parser;
use eyre::Result;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, prelude::*};

use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE, json_mode};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);
    if let Err(e) = real_main(cli) {
        if json_mode() {
            eprintln!("{}", format_error_json(&e));
        } else {
            eprintln!("{}", humanize(&e));
        }
        std::process::exit(exit_code_for_error(&e));
    }
}

fn real_main(cli: Cli) -> Result<()> {
    let _ = color_eyre::install();
    let cfg = brew_config::load_path(&cli.config)?;
    init_tracing(cli.json, &cli.log_level, &cfg.logging);
    tracing::debug!(config = %cli.config.display(), command = ?cli.cmd, "starting");

    match cli.cmd {
        Commands::Run { metrics } => run::run(&cfg, metrics),
        Commands::Simulate { grams, shots } => simulate::simulate(&cfg, grams, shots),
        Commands::Shots { profile } => store_cmd::shots(&cfg, profile),
        Commands::Recompute => store_cmd::recompute(&cfg),
        Commands::Clear => store_cmd::clear(&cfg),
        Commands::Delete { id } => store_cmd::delete(&cfg, id),
        Commands::Prefs => store_cmd::prefs(&cfg),
        Commands::SelfCheck => store_cmd::self_check(&cfg),
    }
}

/// Console logs go to stderr so stdout stays machine-readable.
/// `RUST_LOG` overrides `--log-level`; the optional file sink logs JSON lines
/// at `logging.level` (default info).
fn init_tracing(json: bool, level: &str, logging: &Logging) {
    let console_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    if json {
        layers.push(
            fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_filter(console_filter)
                .boxed(),
        );
    } else {
        layers.push(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .with_filter(console_filter)
                .boxed(),
        );
    }

    if let Some(file) = logging.file.as_deref() {
        let path = Path::new(file);
        let dir = path
            .parent()
            .filter(|d| !d.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let name = path
            .file_name()
            .map_or_else(|| "brew.log".into(), |n| n.to_string_lossy().into_owned());
        let appender = match logging.rotation.as_deref() {
            Some("daily") => tracing_appender::rolling::daily(dir, name),
            Some("hourly") => tracing_appender::rolling::hourly(dir, name),
            _ => tracing_appender::rolling::never(dir, name),
        };
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        let file_filter = EnvFilter::new(logging.level.as_deref().unwrap_or("info"));
        layers.push(
            fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(file_filter)
                .boxed(),
        );
    }

    let _ = tracing_subscriber::registry().with(layers).try_init();
}
