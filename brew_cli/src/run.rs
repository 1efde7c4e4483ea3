//! `run`: live control loop with line commands on stdin.

use std::io::BufRead;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use brew_config::Config;
use brew_core::runner;
use brew_core::{
    BrewMetrics, ControlCommand, ControlRequest, NotificationPump, RunnerCfg, control_channel,
};
use brew_hardware::SimDriver;
use brew_traits::{Clock, MonotonicClock};
use crossbeam_channel as xch;
use eyre::WrapErr;

use crate::assemble::{self, CliShotSink, Rig};
use crate::cli::json_mode;

/// Physics step of the real-time simulation.
const SIM_STEP: Duration = Duration::from_millis(10);
/// How long a stdin command waits for the control loop to answer.
const REPLY_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq)]
pub enum Line {
    Command(ControlCommand),
    Quit,
}

/// Parse one stdin line. `Ok(None)` for blank lines.
pub fn parse_line(line: &str) -> Result<Option<Line>, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let arg = words.next();
    if words.next().is_some() {
        return Err(format!("too many arguments for `{verb}`"));
    }
    let cmd = match verb.to_ascii_lowercase().as_str() {
        "start" => {
            let target_g = arg
                .map(|g| g.parse::<f32>().map_err(|_| format!("not a weight: {g}")))
                .transpose()?;
            ControlCommand::StartBrew { target_g }
        }
        "stop" => ControlCommand::Stop,
        "wake" => ControlCommand::Wake,
        "tare" => ControlCommand::Tare,
        "recompute" => ControlCommand::Recompute,
        "clear" => ControlCommand::ClearShots,
        "delete" => {
            let id = arg.ok_or_else(|| format!("`{verb}` needs a shot id"))?;
            ControlCommand::DeleteShot(id.parse().map_err(|_| format!("not a shot id: {id}"))?)
        }
        "quit" | "exit" => return Ok(Some(Line::Quit)),
        other => return Err(format!("unknown command `{other}`")),
    };
    if arg.is_some() && !matches!(cmd, ControlCommand::StartBrew { .. } | ControlCommand::DeleteShot(_)) {
        return Err(format!("`{verb}` takes no arguments"));
    }
    Ok(Some(Line::Command(cmd)))
}

fn print_metrics(m: &BrewMetrics) {
    if json_mode() {
        match serde_json::to_string(m) {
            Ok(s) => println!("{s}"),
            Err(e) => tracing::warn!(error = %e, "metrics not serializable"),
        }
    } else {
        println!(
            "{:<11} {:>6.1} g / {:>5.1} g  {:>4.1} g/s  {:>5.1} s{}",
            format!("{:?}", m.state).to_lowercase(),
            m.weight_g,
            m.target_g,
            m.flow_gps,
            m.elapsed_ms as f64 / 1000.0,
            if m.connected { "" } else { "  (scale offline)" }
        );
    }
}

/// Read commands until `quit` or end of input. End of input only stops
/// reading; the loop keeps running until Ctrl-C.
fn spawn_stdin_reader(tx: xch::Sender<ControlRequest>, shutdown: Arc<AtomicBool>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            match parse_line(&line) {
                Ok(None) => {}
                Ok(Some(Line::Quit)) => {
                    shutdown.store(true, Ordering::Relaxed);
                    break;
                }
                Ok(Some(Line::Command(cmd))) => {
                    let (req, reply) = ControlRequest::with_reply(cmd);
                    if tx.send(req).is_err() {
                        break;
                    }
                    match reply.recv_timeout(REPLY_TIMEOUT) {
                        Ok(Ok(())) => println!("ok"),
                        Ok(Err(r)) => println!("refused: {r}"),
                        Err(_) => println!("no answer from control loop"),
                    }
                }
                Err(msg) => println!("error: {msg}"),
            }
        }
        tracing::debug!("stdin closed");
    });
}

pub fn run(cfg: &Config, show_metrics: bool) -> eyre::Result<()> {
    let clock: Arc<dyn Clock + Send + Sync> = Arc::new(MonotonicClock::new());
    let Rig {
        mut ctrl,
        world,
        telemetry,
        notifications,
    } = assemble::rig(
        cfg,
        clock.clone(),
        assemble::file_store(cfg),
        CliShotSink::from_config(cfg),
    )?;

    let _pump = NotificationPump::spawn(telemetry, notifications);
    let _driver = SimDriver::spawn(world, clock.clone(), SIM_STEP);

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || shutdown.store(true, Ordering::Relaxed))
            .wrap_err("install Ctrl-C handler")?;
    }

    let (tx, rx) = control_channel();
    spawn_stdin_reader(tx, shutdown.clone());

    ctrl.wake();
    let runner_cfg = RunnerCfg::from(&cfg.runner);
    tracing::info!(tick_hz = runner_cfg.tick_hz, "control loop running");
    let summary = runner::run(&mut ctrl, &rx, &runner_cfg, clock.as_ref(), &shutdown, |m| {
        if show_metrics {
            print_metrics(m);
        }
    })?;
    tracing::info!(
        ticks = summary.ticks,
        commands = summary.commands,
        broadcasts = summary.broadcasts,
        relay_settled = ctrl.machine().is_settled(),
        "control loop stopped"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("start", ControlCommand::StartBrew { target_g: None })]
    #[case("start 36.5", ControlCommand::StartBrew { target_g: Some(36.5) })]
    #[case("  STOP ", ControlCommand::Stop)]
    #[case("wake", ControlCommand::Wake)]
    #[case("tare", ControlCommand::Tare)]
    #[case("recompute", ControlCommand::Recompute)]
    #[case("clear", ControlCommand::ClearShots)]
    #[case("delete 12", ControlCommand::DeleteShot(12))]
    fn parses_commands(#[case] line: &str, #[case] expected: ControlCommand) {
        assert_eq!(parse_line(line), Ok(Some(Line::Command(expected))));
    }

    #[rstest]
    #[case("start lots")]
    #[case("delete")]
    #[case("delete x")]
    #[case("stop now")]
    #[case("start 1 2")]
    #[case("brew")]
    fn rejects_bad_lines(#[case] line: &str) {
        assert!(parse_line(line).is_err(), "{line}");
    }

    #[test]
    fn quit_and_blank() {
        assert_eq!(parse_line("quit"), Ok(Some(Line::Quit)));
        assert_eq!(parse_line("   "), Ok(None));
    }
}
