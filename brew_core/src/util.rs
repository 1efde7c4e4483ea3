//! Common time/period helpers for brew_core.

/// Number of milliseconds in one second.
pub const MILLIS_PER_SEC: u64 = 1_000;

/// Compute the period in milliseconds for a given tick rate in Hz.
/// - Clamps `hz` to at least 1 to avoid division by zero.
/// - Ensures result is at least 1 millisecond.
#[inline]
pub fn period_ms(hz: u32) -> u64 {
    (MILLIS_PER_SEC / u64::from(hz.max(1))).max(1)
}

/// Whether `deadline_ms` has been reached at `now_ms`.
#[inline]
pub fn reached(now_ms: u64, deadline_ms: u64) -> bool {
    now_ms >= deadline_ms
}

/// Convert a millisecond span to seconds as `f32`.
#[inline]
pub fn ms_to_secs(ms: u64) -> f32 {
    // Telemetry ages are small; precision loss above 2^24 ms is irrelevant.
    (ms as f64 / MILLIS_PER_SEC as f64) as f32
}
