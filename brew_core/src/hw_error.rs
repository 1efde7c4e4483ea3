//! Maps `Box<dyn Error>` from trait boundaries to typed `BrewError`.
//!
//! Relay, button and transport traits in `brew_traits` return boxed errors so
//! adapters can use whatever backend they like; this module folds those back
//! into our enum, with a feature-gated path for `brew_hardware::HwError`.

use crate::error::BrewError;

/// Map a trait-boundary error to a typed `BrewError`.
///
/// Known hardware error types are downcast first, everything else falls back
/// to string heuristics.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> BrewError {
    #[cfg(feature = "hardware-errors")]
    {
        use brew_hardware::error::HwError;
        if let Some(hw) = e.downcast_ref::<HwError>() {
            return match hw {
                HwError::Timeout => BrewError::Timeout,
                HwError::NotConnected | HwError::LinkClosed => BrewError::Link(hw.to_string()),
                other => BrewError::Hardware(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    let lower = s.to_lowercase();
    if lower.contains("timeout") || lower.contains("timed out") {
        BrewError::Timeout
    } else if lower.contains("not connected") || lower.contains("link") {
        BrewError::Link(s)
    } else {
        BrewError::Hardware(s)
    }
}
