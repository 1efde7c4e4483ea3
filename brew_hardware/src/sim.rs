//! Simulated scale and espresso machine.
//!
//! One [`SimWorld`] holds the physics: the machine pumps while toggled on by
//! a rising relay edge, flow ramps up after an onset delay, and drips decay
//! exponentially after the pump stops. The scale side emits weight
//! notifications in the wire layout the controller decodes, and reacts to the
//! command frames it is sent. Time only moves through [`SimWorld::step`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use brew_traits::{BoxError, Clock, LinkEvent, RelayPin, ScaleTransport};
use crossbeam_channel::Sender;

use crate::error::HwError;

const SERVICE: u16 = 0x0FFE;
const COMMAND_CHAR: u16 = 0xFF12;
const WEIGHT_CHAR: u16 = 0xFF11;
const SIGN_PLUS: u8 = 0x2B;
const SIGN_MINUS: u8 = 0x2D;

/// Encode a weight notification.
///
/// Layout (big-endian): header `03 0B`, 24-bit milliseconds, unit byte,
/// weight sign + 24-bit centigrams, flow sign + 16-bit centigrams/s,
/// battery %, 16-bit standby minutes, padding to 20 bytes.
pub fn encode_packet(timestamp_ms: u32, weight_g: f32, flow_gps: f32, battery_pct: u8) -> [u8; 20] {
    let mut p = [0u8; 20];
    p[0] = 0x03;
    p[1] = 0x0B;
    let ms = (timestamp_ms & 0x00FF_FFFF).to_be_bytes();
    p[2..5].copy_from_slice(&ms[1..4]);
    p[5] = 0x01;
    let w = ((weight_g.abs() * 100.0).round() as u32).min(0x00FF_FFFF);
    p[6] = if weight_g < 0.0 { SIGN_MINUS } else { SIGN_PLUS };
    p[7..10].copy_from_slice(&w.to_be_bytes()[1..4]);
    let f = (flow_gps.abs() * 100.0).round().min(f32::from(u16::MAX)) as u16;
    p[10] = if flow_gps < 0.0 { SIGN_MINUS } else { SIGN_PLUS };
    p[11..13].copy_from_slice(&f.to_be_bytes());
    p[13] = battery_pct;
    p[14..16].copy_from_slice(&15u16.to_be_bytes());
    p
}

/// Machine and scale behaviour of the simulation.
#[derive(Debug, Clone)]
pub struct SimParams {
    /// Steady-state flow once the pump is fully ramped.
    pub flow_gps: f32,
    /// Pump start to first drops in the cup.
    pub onset_ms: u64,
    /// First drops to full flow.
    pub ramp_ms: u64,
    /// Time constant of the post-stop drip decay.
    pub drip_tau_ms: u64,
    pub packet_interval_ms: u64,
    pub battery_pct: u8,
    pub name: String,
    pub address: String,
}

impl Default for SimParams {
    fn default() -> Self {
        Self {
            flow_gps: 2.0,
            onset_ms: 3_000,
            ramp_ms: 2_000,
            drip_tau_ms: 1_200,
            packet_interval_ms: 100,
            battery_pct: 87,
            name: "BOOKOO_SC sim".to_string(),
            address: "5c:0b:00:00:00:01".to_string(),
        }
    }
}

#[derive(Debug)]
struct World {
    params: SimParams,
    now_ms: u64,
    // machine
    relay_high: bool,
    pumping: bool,
    pump_since_ms: u64,
    pump_starts: u32,
    flow_gps: f32,
    // scale
    cup_g: f32,
    tare_g: f32,
    timer_zero_ms: u64,
    in_range: bool,
    scanning: bool,
    connected: bool,
    subscribed: bool,
    last_emit_ms: Option<u64>,
    beeps: u32,
    events: Option<Sender<LinkEvent>>,
    notifications: Option<Sender<Vec<u8>>>,
}

impl World {
    fn emit_event(&self, ev: LinkEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(ev);
        }
    }

    fn displayed_g(&self) -> f32 {
        self.cup_g - self.tare_g
    }

    fn advance(&mut self, now_ms: u64) {
        let dt_ms = now_ms.saturating_sub(self.now_ms);
        self.now_ms = self.now_ms.max(now_ms);
        if dt_ms == 0 {
            return;
        }
        let p = &self.params;
        if self.pumping {
            let on_ms = self.now_ms.saturating_sub(self.pump_since_ms);
            self.flow_gps = if on_ms < p.onset_ms {
                0.0
            } else {
                let ramp = (on_ms - p.onset_ms) as f32 / p.ramp_ms.max(1) as f32;
                ramp.min(1.0) * p.flow_gps
            };
        } else if self.flow_gps > 0.0 {
            let tau = p.drip_tau_ms.max(1) as f32;
            self.flow_gps *= (-(dt_ms as f32) / tau).exp();
            if self.flow_gps < 0.005 {
                self.flow_gps = 0.0;
            }
        }
        self.cup_g += self.flow_gps * dt_ms as f32 / 1000.0;
    }

    fn maybe_notify(&mut self) {
        if !(self.connected && self.subscribed) {
            return;
        }
        let due = self
            .last_emit_ms
            .is_none_or(|t| self.now_ms.saturating_sub(t) >= self.params.packet_interval_ms);
        if !due {
            return;
        }
        self.last_emit_ms = Some(self.now_ms);
        let scale_ms = self.now_ms.saturating_sub(self.timer_zero_ms) as u32;
        let packet = encode_packet(
            scale_ms,
            self.displayed_g(),
            self.flow_gps,
            self.params.battery_pct,
        );
        if let Some(tx) = &self.notifications
            && tx.send(packet.to_vec()).is_err()
        {
            tracing::debug!("notification receiver gone");
        }
    }

    fn toggle_pump(&mut self) {
        self.pumping = !self.pumping;
        if self.pumping {
            self.pump_since_ms = self.now_ms;
            self.pump_starts += 1;
        }
        tracing::debug!(pumping = self.pumping, at_ms = self.now_ms, "sim machine");
    }

    fn drop_link(&mut self, reason: i32) {
        if self.connected {
            self.connected = false;
            self.subscribed = false;
            self.emit_event(LinkEvent::Disconnected { reason });
        }
    }
}

/// Shared simulation state. Clones observe the same world.
#[derive(Debug, Clone)]
pub struct SimWorld {
    inner: Arc<Mutex<World>>,
}

impl SimWorld {
    pub fn new(params: SimParams) -> Self {
        Self {
            inner: Arc::new(Mutex::new(World {
                params,
                now_ms: 0,
                relay_high: false,
                pumping: false,
                pump_since_ms: 0,
                pump_starts: 0,
                flow_gps: 0.0,
                cup_g: 0.0,
                tare_g: 0.0,
                timer_zero_ms: 0,
                in_range: true,
                scanning: false,
                connected: false,
                subscribed: false,
                last_emit_ms: None,
                beeps: 0,
                events: None,
                notifications: None,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, World> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Relay output wired to the simulated machine's brew switch.
    pub fn relay(&self) -> SimRelay {
        SimRelay {
            world: self.clone(),
        }
    }

    /// Scale transport. Link events and notifications go to the given senders.
    pub fn transport(&self, events: Sender<LinkEvent>, notifications: Sender<Vec<u8>>) -> SimTransport {
        {
            let mut w = self.lock();
            w.events = Some(events);
            w.notifications = Some(notifications);
        }
        SimTransport {
            world: self.clone(),
        }
    }

    /// Integrate up to `now_ms` and emit a notification if one is due.
    pub fn step(&self, now_ms: u64) {
        let mut w = self.lock();
        w.advance(now_ms);
        w.maybe_notify();
    }

    /// Weight shown by the scale (after tare).
    pub fn displayed_g(&self) -> f32 {
        self.lock().displayed_g()
    }

    pub fn flow_gps(&self) -> f32 {
        self.lock().flow_gps
    }

    pub fn is_pumping(&self) -> bool {
        self.lock().pumping
    }

    /// How many times the pump has been started.
    pub fn pump_starts(&self) -> u32 {
        self.lock().pump_starts
    }

    pub fn beeps(&self) -> u32 {
        self.lock().beeps
    }

    pub fn is_connected(&self) -> bool {
        self.lock().connected
    }

    /// Swap in an empty cup.
    pub fn empty_cup(&self) {
        let mut w = self.lock();
        w.cup_g = 0.0;
        w.tare_g = 0.0;
    }

    /// Move the scale in or out of radio range. Leaving range drops the link.
    pub fn set_in_range(&self, in_range: bool) {
        let mut w = self.lock();
        w.in_range = in_range;
        if !in_range {
            w.drop_link(0x08);
        } else if w.scanning {
            let (name, address) = (w.params.name.clone(), w.params.address.clone());
            w.emit_event(LinkEvent::Discovered { name, address });
        }
    }
}

/// Brew-switch relay of the simulated machine: each rising edge toggles the pump.
#[derive(Debug, Clone)]
pub struct SimRelay {
    world: SimWorld,
}

impl RelayPin for SimRelay {
    fn set_high(&mut self) -> Result<(), BoxError> {
        let mut w = self.world.lock();
        if !w.relay_high {
            w.relay_high = true;
            w.toggle_pump();
        }
        Ok(())
    }

    fn set_low(&mut self) -> Result<(), BoxError> {
        self.world.lock().relay_high = false;
        Ok(())
    }
}

/// Scale transport backed by the simulated world.
#[derive(Debug, Clone)]
pub struct SimTransport {
    world: SimWorld,
}

impl ScaleTransport for SimTransport {
    fn start_scan(&mut self) -> Result<(), BoxError> {
        let mut w = self.world.lock();
        w.scanning = true;
        if w.in_range {
            let (name, address) = (w.params.name.clone(), w.params.address.clone());
            w.emit_event(LinkEvent::Discovered { name, address });
        }
        Ok(())
    }

    fn stop_scan(&mut self) -> Result<(), BoxError> {
        self.world.lock().scanning = false;
        Ok(())
    }

    fn connect(&mut self, address: &str) -> Result<(), BoxError> {
        let mut w = self.world.lock();
        if !w.in_range {
            return Err(Box::new(HwError::LinkClosed));
        }
        if address != w.params.address {
            return Err(Box::new(HwError::Sim(format!("no device at {address}"))));
        }
        w.connected = true;
        w.emit_event(LinkEvent::Connected);
        Ok(())
    }

    fn has_characteristic(&mut self, service: u16, characteristic: u16) -> Result<bool, BoxError> {
        if !self.world.lock().connected {
            return Err(Box::new(HwError::NotConnected));
        }
        Ok(service == SERVICE && matches!(characteristic, COMMAND_CHAR | WEIGHT_CHAR))
    }

    fn subscribe(&mut self, service: u16, characteristic: u16) -> Result<(), BoxError> {
        let mut w = self.world.lock();
        if !w.connected {
            return Err(Box::new(HwError::NotConnected));
        }
        if service != SERVICE || characteristic != WEIGHT_CHAR {
            return Err(Box::new(HwError::Sim(format!(
                "characteristic {characteristic:#06x} does not notify"
            ))));
        }
        w.subscribed = true;
        w.last_emit_ms = None;
        Ok(())
    }

    fn write(&mut self, service: u16, characteristic: u16, frame: &[u8]) -> Result<(), BoxError> {
        let mut w = self.world.lock();
        if !w.connected {
            return Err(Box::new(HwError::NotConnected));
        }
        if service != SERVICE || characteristic != COMMAND_CHAR {
            return Err(Box::new(HwError::Sim(format!(
                "characteristic {characteristic:#06x} is not writable"
            ))));
        }
        match frame {
            [0x03, 0x0A, 0x01, ..] => w.tare_g = w.cup_g,
            [0x03, 0x0A, 0x02, ..] => w.beeps += 1,
            [0x03, 0x0A, 0x04 | 0x05, ..] => {}
            [0x03, 0x0A, 0x06, ..] => w.timer_zero_ms = w.now_ms,
            [0x03, 0x0A, 0x07, ..] => {
                w.tare_g = w.cup_g;
                w.timer_zero_ms = w.now_ms;
            }
            other => {
                return Err(Box::new(HwError::Sim(format!("unknown command frame {other:02x?}"))));
            }
        }
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), BoxError> {
        let mut w = self.world.lock();
        w.connected = false;
        w.subscribed = false;
        Ok(())
    }
}

/// Thread that steps a [`SimWorld`] in real time. Stopped and joined on drop.
pub struct SimDriver {
    shutdown: Arc<AtomicBool>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl SimDriver {
    pub fn spawn(world: SimWorld, clock: Arc<dyn Clock + Send + Sync>, period: Duration) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let join_handle = std::thread::spawn(move || {
            let epoch = clock.now();
            while !shutdown_clone.load(Ordering::Relaxed) {
                world.step(clock.ms_since(epoch));
                clock.sleep(period);
            }
            tracing::trace!("sim driver exiting");
        });
        Self {
            shutdown,
            join_handle: Some(join_handle),
        }
    }
}

impl Drop for SimDriver {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.join_handle.take()
            && handle.join().is_err()
        {
            tracing::warn!("sim driver panicked during shutdown");
        }
    }
}
