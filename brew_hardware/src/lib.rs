//! Adapters behind the `brew_traits` seams.
//!
//! The simulation is always available. Raspberry Pi GPIO for the relay and
//! the buttons is compiled in with the `hardware` feature.

pub mod error;
#[cfg(feature = "hardware")]
pub mod gpio;
pub mod sim;
pub mod wall;

pub use error::HwError;
#[cfg(feature = "hardware")]
pub use gpio::{GpioButtons, GpioRelay};
pub use sim::{SimDriver, SimParams, SimRelay, SimTransport, SimWorld, encode_packet};
pub use wall::{FixedOffsetWallClock, parse_offset};
