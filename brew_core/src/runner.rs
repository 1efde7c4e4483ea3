//! Control loop: drains control commands, ticks the controller and
//! broadcasts telemetry snapshots at a state-dependent interval.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use brew_traits::Clock;
use crossbeam_channel as xch;

use crate::brew::{BrewController, Trigger};
use crate::config::RunnerCfg;
use crate::error::{BrewRejection, Result};
use crate::port::ScalePort;
use crate::prefs::BrewPreferences;
use crate::status::BrewMetrics;

/// Requests the outside world (API, CLI) can make of the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlCommand {
    /// Start at `target_g`, or at the current preset when `None`.
    StartBrew { target_g: Option<f32> },
    Stop,
    Wake,
    Tare,
    ClearShots,
    DeleteShot(u32),
    Recompute,
    SetPrefs(BrewPreferences),
}

pub type Reply = std::result::Result<(), BrewRejection>;

#[derive(Debug)]
pub struct ControlRequest {
    pub command: ControlCommand,
    /// Where to send the outcome; `None` for fire-and-forget.
    pub reply: Option<xch::Sender<Reply>>,
}

impl ControlRequest {
    pub fn new(command: ControlCommand) -> Self {
        Self {
            command,
            reply: None,
        }
    }

    /// Request plus the receiver its outcome will arrive on.
    pub fn with_reply(command: ControlCommand) -> (Self, xch::Receiver<Reply>) {
        let (tx, rx) = xch::bounded(1);
        (
            Self {
                command,
                reply: Some(tx),
            },
            rx,
        )
    }
}

pub fn control_channel() -> (xch::Sender<ControlRequest>, xch::Receiver<ControlRequest>) {
    xch::unbounded()
}

/// Execute one command against the controller.
pub fn apply_command<P: ScalePort>(ctrl: &mut BrewController<P>, command: ControlCommand) -> Reply {
    match command {
        ControlCommand::StartBrew { target_g } => {
            let target = target_g.unwrap_or_else(|| ctrl.base_target());
            ctrl.start_brew(target)
        }
        ControlCommand::Stop => ctrl.abort_brew(Trigger::Remote),
        ControlCommand::Wake => {
            ctrl.wake();
            Ok(())
        }
        ControlCommand::Tare => {
            if ctrl.scale_mut().tare() {
                Ok(())
            } else {
                Err(BrewRejection::Disconnected)
            }
        }
        ControlCommand::ClearShots => {
            ctrl.clear_shot_data();
            Ok(())
        }
        ControlCommand::DeleteShot(id) => ctrl.delete_shot(id).map(|_| ()),
        ControlCommand::Recompute => {
            ctrl.recalculate();
            Ok(())
        }
        ControlCommand::SetPrefs(prefs) => {
            ctrl.set_prefs(prefs);
            Ok(())
        }
    }
}

/// Broadcast interval for the current state.
#[inline]
pub fn metrics_interval_ms(cfg: &RunnerCfg, brewing: bool) -> u64 {
    if brewing {
        cfg.metrics_active_ms
    } else {
        cfg.metrics_idle_ms
    }
}

#[inline]
fn broadcast_due(now_ms: u64, last_ms: Option<u64>, interval_ms: u64) -> bool {
    last_ms.is_none_or(|last| now_ms.saturating_sub(last) >= interval_ms)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub ticks: u64,
    pub commands: u64,
    pub broadcasts: u64,
}

/// Tick the controller until `shutdown` is set, then abort any brew and give
/// relay sequences up to `shutdown_grace_ms` to finish.
pub fn run<P, F>(
    ctrl: &mut BrewController<P>,
    requests: &xch::Receiver<ControlRequest>,
    cfg: &RunnerCfg,
    clock: &dyn Clock,
    shutdown: &AtomicBool,
    mut on_metrics: F,
) -> Result<RunSummary>
where
    P: ScalePort,
    F: FnMut(&BrewMetrics),
{
    let period = Duration::from_millis(crate::util::period_ms(cfg.tick_hz));
    let epoch: Instant = clock.now();
    let mut summary = RunSummary::default();
    let mut last_broadcast: Option<u64> = None;

    while !shutdown.load(Ordering::Relaxed) {
        for req in requests.try_iter() {
            tracing::debug!(command = ?req.command, "control command");
            let outcome = apply_command(ctrl, req.command);
            if let Err(e) = &outcome {
                tracing::info!(reason = %e, "command refused");
            }
            if let Some(tx) = req.reply {
                let _ = tx.send(outcome);
            }
            summary.commands += 1;
        }

        ctrl.update();
        summary.ticks += 1;

        let now = clock.ms_since(epoch);
        let interval = metrics_interval_ms(cfg, ctrl.is_brewing());
        if broadcast_due(now, last_broadcast, interval) {
            on_metrics(&ctrl.metrics());
            last_broadcast = Some(now);
            summary.broadcasts += 1;
        }

        clock.sleep(period);
    }

    tracing::info!(ticks = summary.ticks, "control loop stopping");
    ctrl.shutdown();
    let deadline = clock.ms_since(epoch) + cfg.shutdown_grace_ms;
    while !ctrl.machine().is_settled() && clock.ms_since(epoch) < deadline {
        clock.sleep(period);
        ctrl.service_outputs();
    }
    if !ctrl.machine().is_settled() {
        tracing::warn!("relay sequence still pending at exit");
    }
    Ok(summary)
}
