//! Thread-safe latest-value snapshot of the scale's telemetry.
//!
//! Written from the notification-delivery context through [`Telemetry::ingest`],
//! read lock-free from the control tick. The flow estimator and throttle state
//! sit behind one mutex so concurrent ingests stay ordered.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use brew_traits::Clock;

use crate::atomic::AtomicF32;
use crate::config::TelemetryCfg;
use crate::flow::{FlowEstimator, FlowSample};
use crate::packet::decode;

/// What happened to one notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingest {
    Accepted,
    /// No link; the payload is stale by definition.
    Offline,
    Malformed,
    /// Arrived too soon after the previously accepted packet.
    Throttled,
    /// A tare is in flight and the scale has not reported near-zero yet.
    TareSettling,
}

struct FlowState {
    estimator: FlowEstimator,
    last_accept_ms: Option<u64>,
}

pub struct Telemetry {
    cfg: TelemetryCfg,
    clock: Arc<dyn Clock + Send + Sync>,
    epoch: Instant,
    connected: AtomicBool,
    weight: AtomicF32,
    flow: AtomicF32,
    reported_flow: AtomicF32,
    scale_ms: AtomicU32,
    battery: AtomicU32,
    has_packet: AtomicBool,
    last_packet_ms: AtomicU64,
    tare_pending: AtomicBool,
    tare_requested_ms: AtomicU64,
    accepted: AtomicU64,
    dropped: AtomicU64,
    state: Mutex<FlowState>,
}

impl core::fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Telemetry")
            .field("connected", &self.is_connected())
            .field("weight_g", &self.weight())
            .field("flow_gps", &self.flow_rate())
            .field("tare_pending", &self.is_tare_pending())
            .finish()
    }
}

impl Telemetry {
    pub fn new(cfg: TelemetryCfg, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        let epoch = clock.now();
        let estimator = FlowEstimator::new(cfg.flow_window, cfg.max_flow_gps);
        Self {
            cfg,
            clock,
            epoch,
            connected: AtomicBool::new(false),
            weight: AtomicF32::new(0.0),
            flow: AtomicF32::new(0.0),
            reported_flow: AtomicF32::new(0.0),
            scale_ms: AtomicU32::new(0),
            battery: AtomicU32::new(0),
            has_packet: AtomicBool::new(false),
            last_packet_ms: AtomicU64::new(0),
            tare_pending: AtomicBool::new(false),
            tare_requested_ms: AtomicU64::new(0),
            accepted: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            state: Mutex::new(FlowState {
                estimator,
                last_accept_ms: None,
            }),
        }
    }

    #[inline]
    fn now_ms(&self) -> u64 {
        self.clock.ms_since(self.epoch)
    }

    fn lock(&self) -> MutexGuard<'_, FlowState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Decode one raw notification and fold it into the snapshot.
    ///
    /// Malformed payloads are rejected before anything is touched.
    pub fn ingest(&self, bytes: &[u8]) -> Ingest {
        if !self.is_connected() {
            return Ingest::Offline;
        }
        let reading = match decode(bytes) {
            Ok(r) => r,
            Err(e) => {
                tracing::trace!(error = %e, "dropping notification");
                self.dropped.fetch_add(1, Ordering::Relaxed);
                return Ingest::Malformed;
            }
        };

        let now = self.now_ms();
        let mut st = self.lock();
        if let Some(last) = st.last_accept_ms
            && now.saturating_sub(last) < self.cfg.min_packet_interval_ms
        {
            return Ingest::Throttled;
        }

        if self.tare_pending.load(Ordering::Acquire) {
            let since = now.saturating_sub(self.tare_requested_ms.load(Ordering::Acquire));
            if reading.weight_g.abs() <= self.cfg.tare_zero_band_g {
                tracing::debug!(weight_g = reading.weight_g, since_ms = since, "tare settled");
            } else if since >= self.cfg.tare_timeout_ms {
                tracing::debug!(
                    weight_g = reading.weight_g,
                    since_ms = since,
                    "tare suppression timed out; accepting readings"
                );
            } else {
                return Ingest::TareSettling;
            }
            self.tare_pending.store(false, Ordering::Release);
            st.estimator.reset();
        }

        let sample = FlowSample {
            time_s: reading.timestamp_ms as f32 / 1000.0,
            weight_g: reading.weight_g,
        };
        if let Some(newest) = st.estimator.newest()
            && sample.time_s < newest.time_s
        {
            tracing::debug!(
                prev_s = newest.time_s,
                now_s = sample.time_s,
                "scale timer went backwards; restarting flow window"
            );
            st.estimator.reset();
        }
        st.estimator.push(sample);
        st.last_accept_ms = Some(now);

        self.weight.store(reading.weight_g);
        self.flow.store(st.estimator.current_flow_rate());
        self.reported_flow.store(reading.flow_gps);
        self.scale_ms.store(reading.timestamp_ms, Ordering::Relaxed);
        self.battery
            .store(u32::from(reading.battery_pct), Ordering::Relaxed);
        self.last_packet_ms.store(now, Ordering::Release);
        self.has_packet.store(true, Ordering::Release);
        self.accepted.fetch_add(1, Ordering::Relaxed);
        Ingest::Accepted
    }

    /// Link came up. Starts the watchdog grace period from now.
    pub(crate) fn mark_connected(&self) {
        let now = self.now_ms();
        {
            let mut st = self.lock();
            st.estimator.reset();
            st.last_accept_ms = None;
        }
        self.tare_pending.store(false, Ordering::Release);
        self.weight.store(0.0);
        self.flow.store(0.0);
        self.last_packet_ms.store(now, Ordering::Release);
        self.has_packet.store(true, Ordering::Release);
        self.connected.store(true, Ordering::Release);
    }

    pub(crate) fn mark_disconnected(&self) {
        self.connected.store(false, Ordering::Release);
        self.flow.store(0.0);
    }

    /// Ignore readings until the scale reports near-zero or the timeout passes.
    ///
    /// The snapshot reads as an empty, still scale in the meantime: the
    /// pre-tare weight must never reach the brew projection.
    pub(crate) fn begin_tare(&self) {
        tracing::debug!("tare requested; suppressing stale weight");
        self.tare_requested_ms
            .store(self.now_ms(), Ordering::Release);
        self.tare_pending.store(true, Ordering::Release);
        self.lock().estimator.reset();
        self.weight.store(0.0);
        self.flow.store(0.0);
    }

    /// Drop flow history, e.g. after the scale timer was reset.
    pub fn reset_flow(&self) {
        self.lock().estimator.reset();
        self.flow.store(0.0);
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    #[inline]
    pub fn weight(&self) -> f32 {
        self.weight.load()
    }

    /// Regression flow rate in g/s.
    #[inline]
    pub fn flow_rate(&self) -> f32 {
        self.flow.load()
    }

    /// Flow rate as computed by the scale firmware.
    pub fn reported_flow_rate(&self) -> f32 {
        self.reported_flow.load()
    }

    pub fn scale_time_ms(&self) -> u32 {
        self.scale_ms.load(Ordering::Relaxed)
    }

    pub fn battery_pct(&self) -> u8 {
        u8::try_from(self.battery.load(Ordering::Relaxed)).unwrap_or(u8::MAX)
    }

    /// Milliseconds since the last accepted packet (or since connect).
    pub fn packet_age_ms(&self) -> Option<u64> {
        if !self.has_packet.load(Ordering::Acquire) {
            return None;
        }
        Some(
            self.now_ms()
                .saturating_sub(self.last_packet_ms.load(Ordering::Acquire)),
        )
    }

    pub fn is_tare_pending(&self) -> bool {
        self.tare_pending.load(Ordering::Acquire)
    }

    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
