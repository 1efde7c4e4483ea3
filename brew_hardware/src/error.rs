use thiserror::Error;

/// Errors raised by the adapters; surfaced to the controller as boxed errors.
#[derive(Debug, Error)]
pub enum HwError {
    #[error("gpio error: {0}")]
    Gpio(String),
    #[error("scale timeout")]
    Timeout,
    #[error("scale not connected")]
    NotConnected,
    #[error("scale link closed")]
    LinkClosed,
    #[error("simulation: {0}")]
    Sim(String),
}

pub type Result<T> = std::result::Result<T, HwError>;
