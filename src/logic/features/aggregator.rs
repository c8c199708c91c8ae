//! Window Aggregator - Events in, snapshots out
//!
//! One active `Window` behind a short `parking_lot::Mutex`. Rollover swaps in
//! a fresh window under the lock and builds the snapshot outside it, so
//! ingestion is never blocked by feature computation.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use parking_lot::Mutex;

use super::event::{EventError, EventRecord};
use super::snapshot::FeatureSnapshot;
use super::window::{Window, WindowLimits};
use crate::constants::{DEFAULT_WINDOW_DURATION_MS, MAX_PACKET_SIZE, MIN_PACKET_SIZE};
use crate::logic::metrics;

// ============================================================================
// CONFIG
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct AggregatorConfig {
    pub window_duration: Duration,
    pub limits: WindowLimits,
    pub min_packet_size: u32,
    pub max_packet_size: u32,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            window_duration: Duration::from_millis(DEFAULT_WINDOW_DURATION_MS),
            limits: WindowLimits::default(),
            min_packet_size: MIN_PACKET_SIZE,
            max_packet_size: MAX_PACKET_SIZE,
        }
    }
}

// ============================================================================
// AGGREGATOR
// ============================================================================

/// Builds the snapshot of a closed window
type SnapshotBuilder = fn(&Window, Instant) -> FeatureSnapshot;

pub struct WindowAggregator {
    config: AggregatorConfig,
    build: SnapshotBuilder,
    active: Mutex<Box<Window>>,
    ingested: AtomicU64,
    discarded: AtomicU64,
    windows_closed: AtomicU64,
    rollover_failures: AtomicU64,
}

impl WindowAggregator {
    pub fn new(config: AggregatorConfig) -> Self {
        Self::starting_at(config, Instant::now())
    }

    /// Aggregator whose first window opens at `start`
    pub fn starting_at(config: AggregatorConfig, start: Instant) -> Self {
        Self {
            config,
            build: FeatureSnapshot::from_window,
            active: Mutex::new(Box::new(Window::new(start, config.limits))),
            ingested: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
            windows_closed: AtomicU64::new(0),
            rollover_failures: AtomicU64::new(0),
        }
    }

    #[cfg(test)]
    fn with_builder(mut self, build: SnapshotBuilder) -> Self {
        self.build = build;
        self
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Validate and account one event into the active window
    pub fn ingest(&self, event: &EventRecord) -> Result<(), EventError> {
        if let Err(e) = event.validate_with(self.config.min_packet_size, self.config.max_packet_size) {
            self.discarded.fetch_add(1, Ordering::Relaxed);
            metrics::record_parse_error();
            return Err(e);
        }

        self.active.lock().record(event);
        self.ingested.fetch_add(1, Ordering::Relaxed);
        metrics::record_event(event);
        Ok(())
    }

    /// Close the active window if its duration has elapsed
    pub fn rollover(&self, now: Instant) -> Option<FeatureSnapshot> {
        let closed = {
            let mut active = self.active.lock();
            if now.saturating_duration_since(active.started_at()) < self.config.window_duration {
                return None;
            }
            std::mem::replace(&mut *active, Box::new(Window::new(now, self.config.limits)))
        };
        self.close(closed, now)
    }

    /// Close the active window regardless of its age
    pub fn force_rollover(&self, now: Instant) -> Option<FeatureSnapshot> {
        let closed = {
            let mut active = self.active.lock();
            std::mem::replace(&mut *active, Box::new(Window::new(now, self.config.limits)))
        };
        self.close(closed, now)
    }

    fn close(&self, window: Box<Window>, now: Instant) -> Option<FeatureSnapshot> {
        let result = panic::catch_unwind(AssertUnwindSafe(|| (self.build)(&window, now)));
        match result {
            Ok(snapshot) => {
                self.windows_closed.fetch_add(1, Ordering::Relaxed);
                metrics::record_window(&snapshot);
                log::debug!(
                    "Window closed: {} packets, {:.1} pps, {} ports",
                    snapshot.packets,
                    snapshot.packets_per_second,
                    snapshot.unique_ports
                );
                Some(snapshot)
            }
            Err(_) => {
                // The window is dropped, never retried
                self.rollover_failures.fetch_add(1, Ordering::Relaxed);
                metrics::record_rollover_failure();
                log::error!("Snapshot construction panicked; discarding window ({} packets)", window.packets());
                None
            }
        }
    }

    /// Packets still sitting in the active window
    pub fn pending_packets(&self) -> u64 {
        self.active.lock().packets()
    }

    pub fn ingested(&self) -> u64 {
        self.ingested.load(Ordering::Relaxed)
    }

    pub fn discarded(&self) -> u64 {
        self.discarded.load(Ordering::Relaxed)
    }

    pub fn windows_closed(&self) -> u64 {
        self.windows_closed.load(Ordering::Relaxed)
    }

    pub fn rollover_failures(&self) -> u64 {
        self.rollover_failures.load(Ordering::Relaxed)
    }
}

impl Default for WindowAggregator {
    fn default() -> Self {
        Self::new(AggregatorConfig::default())
    }
}
