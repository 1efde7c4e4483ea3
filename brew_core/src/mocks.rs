//! Test and helper fakes for brew_core collaborators.

use std::sync::{Arc, Mutex, PoisonError};

use brew_traits::{BoxError, ButtonLevels, ButtonPanel, RelayPin, ScaleTransport};

use crate::packet::ScaleCommand;
use crate::port::ScalePort;

/// Relay that records every level written. Clones share the log.
#[derive(Debug, Clone, Default)]
pub struct RecordingRelay {
    log: Arc<Mutex<Vec<bool>>>,
}

impl RecordingRelay {
    /// Levels written so far, oldest first (`true` = high).
    pub fn levels(&self) -> Vec<bool> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Number of low-to-high transitions written so far.
    pub fn rising_edges(&self) -> usize {
        let log = self.levels();
        let mut prev = false;
        let mut n = 0;
        for high in log {
            if high && !prev {
                n += 1;
            }
            prev = high;
        }
        n
    }

    pub fn is_high(&self) -> bool {
        self.levels().last().copied().unwrap_or(false)
    }

    pub fn clear(&self) {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

impl RelayPin for RecordingRelay {
    fn set_high(&mut self) -> Result<(), BoxError> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).push(true);
        Ok(())
    }

    fn set_low(&mut self) -> Result<(), BoxError> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).push(false);
        Ok(())
    }
}

/// Button panel whose levels are set from the test. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct ScriptedButtons {
    levels: Arc<Mutex<ButtonLevels>>,
}

impl ScriptedButtons {
    pub fn set(&self, levels: ButtonLevels) {
        *self.levels.lock().unwrap_or_else(PoisonError::into_inner) = levels;
    }

    pub fn press_manual(&self) {
        self.set(ButtonLevels {
            manual: false,
            ..ButtonLevels::default()
        });
    }

    pub fn press_one_cup(&self) {
        self.set(ButtonLevels {
            one_cup: false,
            ..ButtonLevels::default()
        });
    }

    pub fn press_two_cup(&self) {
        self.set(ButtonLevels {
            two_cup: false,
            ..ButtonLevels::default()
        });
    }

    pub fn release_all(&self) {
        self.set(ButtonLevels::default());
    }
}

impl ButtonPanel for ScriptedButtons {
    fn read(&mut self) -> Result<ButtonLevels, BoxError> {
        Ok(*self.levels.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

/// Scale port with directly settable readings.
#[derive(Debug, Default)]
pub struct FakeScale {
    pub connected: bool,
    pub weight_g: f32,
    pub flow_gps: f32,
    pub packet_age_ms: Option<u64>,
    /// `connect()` succeeds immediately when set.
    pub connect_on_request: bool,
    pub sent: Vec<ScaleCommand>,
    pub connect_calls: u32,
    pub disconnect_calls: u32,
}

impl FakeScale {
    pub fn connected() -> Self {
        Self {
            connected: true,
            connect_on_request: true,
            packet_age_ms: Some(0),
            ..Self::default()
        }
    }

    pub fn count(&self, command: ScaleCommand) -> usize {
        self.sent.iter().filter(|c| **c == command).count()
    }
}

impl ScalePort for FakeScale {
    fn poll(&mut self) {}

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn weight(&self) -> f32 {
        self.weight_g
    }

    fn flow_rate(&self) -> f32 {
        self.flow_gps
    }

    fn packet_age_ms(&self) -> Option<u64> {
        self.packet_age_ms
    }

    fn connect(&mut self) {
        self.connect_calls += 1;
        if self.connect_on_request {
            self.connected = true;
        }
    }

    fn disconnect(&mut self) {
        self.disconnect_calls += 1;
        self.connected = false;
    }

    fn send(&mut self, command: ScaleCommand) -> bool {
        if !self.connected {
            return false;
        }
        self.sent.push(command);
        true
    }
}

/// Transport that records calls and can be told to fail specific steps.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    pub calls: Vec<String>,
    pub writes: Vec<Vec<u8>>,
    pub fail_scan: bool,
    pub fail_connect: bool,
    pub fail_subscribe: bool,
    pub missing_characteristic: Option<u16>,
}

impl RecordingTransport {
    pub fn count(&self, call: &str) -> usize {
        self.calls.iter().filter(|c| c.starts_with(call)).count()
    }
}

fn fail(what: &str) -> BoxError {
    Box::new(std::io::Error::other(format!("{what} refused")))
}

impl ScaleTransport for RecordingTransport {
    fn start_scan(&mut self) -> Result<(), BoxError> {
        self.calls.push("start_scan".into());
        if self.fail_scan {
            return Err(fail("scan"));
        }
        Ok(())
    }

    fn stop_scan(&mut self) -> Result<(), BoxError> {
        self.calls.push("stop_scan".into());
        Ok(())
    }

    fn connect(&mut self, address: &str) -> Result<(), BoxError> {
        self.calls.push(format!("connect {address}"));
        if self.fail_connect {
            return Err(fail("connect"));
        }
        Ok(())
    }

    fn has_characteristic(&mut self, _service: u16, characteristic: u16) -> Result<bool, BoxError> {
        Ok(self.missing_characteristic != Some(characteristic))
    }

    fn subscribe(&mut self, _service: u16, characteristic: u16) -> Result<(), BoxError> {
        self.calls.push(format!("subscribe {characteristic:#06x}"));
        if self.fail_subscribe {
            return Err(fail("subscribe"));
        }
        Ok(())
    }

    fn write(&mut self, _service: u16, _characteristic: u16, frame: &[u8]) -> Result<(), BoxError> {
        self.writes.push(frame.to_vec());
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), BoxError> {
        self.calls.push("disconnect".into());
        Ok(())
    }
}
