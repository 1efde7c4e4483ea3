use thiserror::Error;

/// Rejection reasons for a raw scale notification.
///
/// Both variants describe a malformed packet; no partial reading is ever
/// produced alongside one.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("malformed packet: {len} bytes, need at least 20")]
    TooShort { len: usize },
    #[error("malformed packet: header {b0:#04x} {b1:#04x}, expected 0x03 0x0b")]
    BadHeader { b0: u8, b1: u8 },
}

impl DecodeError {
    #[inline]
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::TooShort { .. } | Self::BadHeader { .. })
    }
}

/// Precondition failures returned by public brew operations.
#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum BrewRejection {
    #[error("auto-brew is disabled")]
    Disabled,
    #[error("a brew is already in progress")]
    AlreadyBrewing,
    #[error("scale is not connected")]
    Disconnected,
    #[error("invalid target weight: {0} g")]
    InvalidTarget(f32),
    #[error("no brew in progress")]
    NotBrewing,
    #[error("brew already stopped; waiting for drips to settle")]
    AlreadyStopping,
    #[error("no stored shot with id {0}")]
    UnknownShot(u32),
}

#[derive(Debug, Error, Clone)]
pub enum BrewError {
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("timeout talking to hardware")]
    Timeout,
    #[error("scale link error: {0}")]
    Link(String),
    #[error("settings store error: {0}")]
    Store(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("rejected: {0}")]
    Rejected(#[from] BrewRejection),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing scale")]
    MissingScale,
    #[error("missing machine")]
    MissingMachine,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
