//! Scale connection lifecycle.
//!
//! `Disconnected -> Scanning -> Connecting -> Connected`, back to
//! `Disconnected` (and a rescan while a link is wanted) on explicit
//! disconnect, transport-reported loss, setup failure or a silent link.
//!
//! Transport callbacks arrive as [`LinkEvent`]s on a channel and are only
//! acted on from [`ScaleLink::update`], so the link state has a single owner.

use std::sync::Arc;
use std::time::Instant;

use brew_traits::{Clock, LinkEvent, ScaleTransport};
use crossbeam_channel as xch;

use crate::config::LinkCfg;
use crate::hw_error::map_hw_error;
use crate::packet::{COMMAND_CHAR, SERVICE_ID, ScaleCommand, WEIGHT_CHAR};
use crate::port::ScalePort;
use crate::telemetry::Telemetry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Scanning,
    Connecting,
    Connected,
}

/// Unbounded channel for transport events.
pub fn link_events() -> (xch::Sender<LinkEvent>, xch::Receiver<LinkEvent>) {
    xch::unbounded()
}

pub struct ScaleLink<T: ScaleTransport> {
    transport: T,
    events: xch::Receiver<LinkEvent>,
    telemetry: Arc<Telemetry>,
    cfg: LinkCfg,
    state: LinkState,
    wanted: bool,
    candidate: Option<String>,
    clock: Arc<dyn Clock + Send + Sync>,
    epoch: Instant,
    state_since_ms: u64,
}

impl<T: ScaleTransport> core::fmt::Debug for ScaleLink<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ScaleLink")
            .field("state", &self.state)
            .field("wanted", &self.wanted)
            .field("candidate", &self.candidate)
            .finish()
    }
}

impl<T: ScaleTransport> ScaleLink<T> {
    pub fn new(
        transport: T,
        events: xch::Receiver<LinkEvent>,
        cfg: LinkCfg,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        let telemetry = Arc::new(Telemetry::new(cfg.telemetry.clone(), clock.clone()));
        let epoch = clock.now();
        Self {
            transport,
            events,
            telemetry,
            cfg,
            state: LinkState::Disconnected,
            wanted: false,
            candidate: None,
            clock,
            epoch,
            state_since_ms: 0,
        }
    }

    /// Shared snapshot; hand a clone to the notification-delivery context.
    pub fn telemetry(&self) -> Arc<Telemetry> {
        self.telemetry.clone()
    }

    #[inline]
    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Time spent in the current state.
    pub fn state_age_ms(&self) -> u64 {
        self.clock.ms_since(self.epoch).saturating_sub(self.state_since_ms)
    }

    fn set_state(&mut self, next: LinkState) {
        if self.state != next {
            tracing::info!(from = ?self.state, to = ?next, "scale link");
            self.state = next;
            self.state_since_ms = self.clock.ms_since(self.epoch);
        }
    }

    /// Drain transport events, then advance setup or the watchdog.
    pub fn update(&mut self) {
        while let Ok(ev) = self.events.try_recv() {
            self.handle_event(ev);
        }
        match self.state {
            LinkState::Disconnected if self.wanted => self.begin_scan(),
            LinkState::Connecting => self.establish(),
            LinkState::Connected => self.check_watchdog(),
            _ => {}
        }
    }

    fn handle_event(&mut self, ev: LinkEvent) {
        match ev {
            LinkEvent::Discovered { name, address } => {
                if self.state != LinkState::Scanning || !name.starts_with(&self.cfg.name_prefix) {
                    return;
                }
                tracing::info!(%name, %address, "scale found");
                if let Err(e) = self.transport.stop_scan() {
                    tracing::debug!(error = %map_hw_error(&*e), "stop_scan failed");
                }
                self.candidate = Some(address);
                self.set_state(LinkState::Connecting);
            }
            LinkEvent::ScanEnded => {
                if self.state == LinkState::Scanning {
                    self.set_state(LinkState::Disconnected);
                }
            }
            LinkEvent::Connected => {
                tracing::debug!(state = ?self.state, "transport reports connected");
            }
            LinkEvent::ConnectFailed { reason } => {
                if matches!(self.state, LinkState::Connecting | LinkState::Connected) {
                    tracing::warn!(reason, "scale connect failed");
                    self.teardown();
                }
            }
            LinkEvent::Disconnected { reason } => {
                if matches!(self.state, LinkState::Connecting | LinkState::Connected) {
                    tracing::info!(reason, "scale disconnected");
                    self.teardown();
                }
            }
        }
    }

    fn begin_scan(&mut self) {
        match self.transport.start_scan() {
            Ok(()) => self.set_state(LinkState::Scanning),
            Err(e) => {
                tracing::warn!(error = %map_hw_error(&*e), "scan start failed; will retry");
                self.set_state(LinkState::Disconnected);
            }
        }
    }

    /// Connect, verify the service layout, subscribe. Any failure tears the
    /// session down; the next update rescans.
    fn establish(&mut self) {
        let Some(address) = self.candidate.take() else {
            self.teardown();
            return;
        };
        let step = |t: &mut T| -> Result<(), String> {
            t.connect(&address)
                .map_err(|e| format!("connect: {}", map_hw_error(&*e)))?;
            for ch in [COMMAND_CHAR, WEIGHT_CHAR] {
                match t.has_characteristic(SERVICE_ID, ch) {
                    Ok(true) => {}
                    Ok(false) => return Err(format!("missing characteristic {ch:#06x}")),
                    Err(e) => return Err(format!("discover: {}", map_hw_error(&*e))),
                }
            }
            t.subscribe(SERVICE_ID, WEIGHT_CHAR)
                .map_err(|e| format!("subscribe: {}", map_hw_error(&*e)))
        };
        match step(&mut self.transport) {
            Ok(()) => {
                self.telemetry.mark_connected();
                self.set_state(LinkState::Connected);
            }
            Err(reason) => {
                tracing::warn!(%address, %reason, "scale setup failed");
                self.teardown();
            }
        }
    }

    fn check_watchdog(&mut self) {
        if let Some(age) = self.telemetry.packet_age_ms()
            && age > self.cfg.watchdog_ms
        {
            tracing::warn!(
                age_ms = age,
                watchdog_ms = self.cfg.watchdog_ms,
                "no telemetry; forcing disconnect"
            );
            self.teardown();
        }
    }

    /// Close the session and fall back to `Disconnected`. A wanted link is
    /// rescanned on the next update.
    fn teardown(&mut self) {
        self.telemetry.mark_disconnected();
        if let Err(e) = self.transport.disconnect() {
            tracing::debug!(error = %map_hw_error(&*e), "transport disconnect failed");
        }
        self.candidate = None;
        self.set_state(LinkState::Disconnected);
    }

    fn write(&mut self, command: ScaleCommand) -> bool {
        if self.state != LinkState::Connected {
            return false;
        }
        match self
            .transport
            .write(SERVICE_ID, COMMAND_CHAR, &command.frame())
        {
            Ok(()) => {
                tracing::trace!(command = command.name(), "scale command");
                true
            }
            Err(e) => {
                tracing::warn!(
                    command = command.name(),
                    error = %map_hw_error(&*e),
                    "scale command failed"
                );
                false
            }
        }
    }
}

impl<T: ScaleTransport> ScalePort for ScaleLink<T> {
    fn poll(&mut self) {
        self.update();
    }

    fn is_connected(&self) -> bool {
        self.state == LinkState::Connected && self.telemetry.is_connected()
    }

    fn weight(&self) -> f32 {
        self.telemetry.weight()
    }

    fn flow_rate(&self) -> f32 {
        self.telemetry.flow_rate()
    }

    fn packet_age_ms(&self) -> Option<u64> {
        self.telemetry.packet_age_ms()
    }

    fn connect(&mut self) {
        self.wanted = true;
        if self.state == LinkState::Disconnected {
            self.begin_scan();
        }
    }

    fn disconnect(&mut self) {
        self.wanted = false;
        match self.state {
            LinkState::Scanning => {
                if let Err(e) = self.transport.stop_scan() {
                    tracing::debug!(error = %map_hw_error(&*e), "stop_scan failed");
                }
                self.set_state(LinkState::Disconnected);
            }
            LinkState::Connecting | LinkState::Connected => self.teardown(),
            LinkState::Disconnected => {}
        }
    }

    fn send(&mut self, command: ScaleCommand) -> bool {
        let ok = self.write(command);
        if ok {
            if command.zeroes_weight() {
                self.telemetry.begin_tare();
            } else if command.restarts_timer() {
                self.telemetry.reset_flow();
            }
        }
        ok
    }
}
