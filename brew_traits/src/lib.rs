//! Collaborator seams between the brew controller and the outside world.
//!
//! Everything here is implemented by adapters (`brew_hardware`) or by test
//! fakes. Fallible calls use `Box<dyn Error + Send + Sync>` so adapters can
//! surface whatever error type their backend produces.

pub mod clock;

pub use clock::{Clock, ManualClock, MonotonicClock};

/// Error type crossing the trait boundary.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Wireless transport to the scale.
///
/// Calls are synchronous and report success or failure immediately; anything
/// that happens later (discovery results, link drops) is reported through
/// [`LinkEvent`]s on the channel the transport was created with.
pub trait ScaleTransport {
    fn start_scan(&mut self) -> Result<(), BoxError>;
    fn stop_scan(&mut self) -> Result<(), BoxError>;
    /// Open a session to the device at `address`.
    fn connect(&mut self, address: &str) -> Result<(), BoxError>;
    /// Whether the connected peer exposes `characteristic` under `service`.
    fn has_characteristic(&mut self, service: u16, characteristic: u16) -> Result<bool, BoxError>;
    /// Enable notifications on `characteristic`.
    fn subscribe(&mut self, service: u16, characteristic: u16) -> Result<(), BoxError>;
    /// Write a command frame to `characteristic`.
    fn write(&mut self, service: u16, characteristic: u16, frame: &[u8]) -> Result<(), BoxError>;
    fn disconnect(&mut self) -> Result<(), BoxError>;
}

/// Asynchronous link events emitted by a [`ScaleTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// An advertisement was seen.
    Discovered { name: String, address: String },
    /// A scan window ended without the transport being told to stop.
    ScanEnded,
    Connected,
    ConnectFailed { reason: i32 },
    Disconnected { reason: i32 },
}

/// Brew-switch relay output.
pub trait RelayPin {
    fn set_high(&mut self) -> Result<(), BoxError>;
    fn set_low(&mut self) -> Result<(), BoxError>;
}

/// Raw levels of the machine's front-panel buttons.
///
/// Inputs are pulled up, so `true` means released and `false` means pressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonLevels {
    pub manual: bool,
    pub one_cup: bool,
    pub two_cup: bool,
}

impl Default for ButtonLevels {
    fn default() -> Self {
        Self {
            manual: true,
            one_cup: true,
            two_cup: true,
        }
    }
}

pub trait ButtonPanel {
    fn read(&mut self) -> Result<ButtonLevels, BoxError>;
}

/// Local wall-clock time, used for time-of-day scheduling.
pub trait WallClock {
    /// Current local hour (0..=23), or `None` when wall time is unknown.
    fn local_hour(&self) -> Option<u32>;
    /// Apply a new timezone description. Returns false if it was not understood.
    fn set_timezone(&mut self, tz: &str) -> bool;
}
