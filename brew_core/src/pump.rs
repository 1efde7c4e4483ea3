//! Background delivery of raw scale notifications.
//!
//! The transport pushes payloads onto a channel from whatever context it runs
//! in; `NotificationPump` owns one thread that drains that channel into the
//! shared [`Telemetry`] snapshot.
//!
//! Each pump spawns exactly one thread, shut down and joined on drop.

use crossbeam_channel as xch;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use crate::telemetry::{Ingest, Telemetry};

/// How often the pump thread re-checks its shutdown flag while idle.
const POLL: Duration = Duration::from_millis(20);

/// Bounded channel for raw notification payloads.
pub fn notification_channel(capacity: usize) -> (xch::Sender<Vec<u8>>, xch::Receiver<Vec<u8>>) {
    xch::bounded(capacity.max(1))
}

pub struct NotificationPump {
    delivered: Arc<AtomicU64>,
    shutdown: Arc<AtomicBool>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl NotificationPump {
    pub fn spawn(telemetry: Arc<Telemetry>, rx: xch::Receiver<Vec<u8>>) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let delivered = Arc::new(AtomicU64::new(0));
        let delivered_clone = delivered.clone();

        let join_handle = std::thread::spawn(move || {
            loop {
                if shutdown_clone.load(Ordering::Relaxed) {
                    tracing::debug!("notification pump received shutdown signal");
                    break;
                }
                match rx.recv_timeout(POLL) {
                    Ok(bytes) => {
                        if telemetry.ingest(&bytes) == Ingest::Accepted {
                            delivered_clone.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    Err(xch::RecvTimeoutError::Timeout) => {}
                    Err(xch::RecvTimeoutError::Disconnected) => {
                        tracing::debug!("notification source closed, exiting pump");
                        break;
                    }
                }
            }
            tracing::trace!("notification pump exiting cleanly");
        });

        Self {
            delivered,
            shutdown,
            join_handle: Some(join_handle),
        }
    }

    /// Payloads accepted into the snapshot so far.
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }
}

impl Drop for NotificationPump {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(()) => tracing::trace!("notification pump joined"),
                Err(e) => tracing::warn!(?e, "notification pump panicked during shutdown"),
            }
        }
    }
}
