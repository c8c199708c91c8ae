//! Export Loop
//!
//! Background task draining a bounded queue of records into a sink.
//! Delivery retries with exponential backoff; after the last attempt the
//! record is dropped and counted. Nothing here can stall ingestion.

use std::time::Duration;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::time::sleep;

use super::client::{ExportError, SnapshotSink};
use super::record::ExportRecord;
use crate::constants::{
    DEFAULT_EXPORT_BACKOFF_MS, DEFAULT_EXPORT_INTERVAL_MS, DEFAULT_EXPORT_MAX_RETRIES, DEFAULT_EXPORT_TIMEOUT_MS,
};
use crate::logic::metrics;

/// Export configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Detector base URL; export is off when unset
    pub url: Option<String>,
    pub interval_ms: u64,
    pub timeout_ms: u64,
    /// Attempts after the first failure
    pub max_retries: u32,
    pub base_backoff_ms: u64,
    /// Records waiting for delivery before new ones are dropped
    pub queue_capacity: usize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            url: None,
            interval_ms: DEFAULT_EXPORT_INTERVAL_MS,
            timeout_ms: DEFAULT_EXPORT_TIMEOUT_MS,
            max_retries: DEFAULT_EXPORT_MAX_RETRIES,
            base_backoff_ms: DEFAULT_EXPORT_BACKOFF_MS,
            queue_capacity: 16,
        }
    }
}

impl ExportConfig {
    pub fn enabled(&self) -> bool {
        self.url.is_some()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Backoff before retry `attempt` (1-based): base * 2^(attempt - 1)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.base_backoff_ms.saturating_mul(factor))
    }
}

// ============================================================================
// SCHEDULE
// ============================================================================

/// Picks every k-th closed window, k = interval / window duration (at least 1)
#[derive(Debug, Clone)]
pub struct ExportSchedule {
    every: u64,
    seen: u64,
}

impl ExportSchedule {
    pub fn new(interval: Duration, window: Duration) -> Self {
        let window_ms = window.as_millis().max(1);
        let every = (interval.as_millis() / window_ms).max(1) as u64;
        Self { every, seen: 0 }
    }

    pub fn every(&self) -> u64 {
        self.every
    }

    /// Count one closed window; true when it should be exported
    pub fn tick(&mut self) -> bool {
        self.seen += 1;
        self.seen % self.every == 0
    }
}

// ============================================================================
// DELIVERY
// ============================================================================

/// Send one record, retrying retryable failures. Returns attempts used.
pub async fn deliver_with_retry<S: SnapshotSink>(
    sink: &S,
    record: &ExportRecord,
    config: &ExportConfig,
) -> Result<u32, ExportError> {
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match sink.send(record).await {
            Ok(()) => return Ok(attempt),
            Err(e) if e.is_retryable() && attempt <= config.max_retries => {
                let delay = config.backoff(attempt);
                log::debug!("Export attempt {} failed ({}), retrying in {:?}", attempt, e, delay);
                sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Drain `queue` into `sink` until the queue closes or shutdown is signalled
pub async fn run_export_loop<S: SnapshotSink>(
    sink: S,
    mut queue: mpsc::Receiver<ExportRecord>,
    config: ExportConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    log::info!("Export loop started (retries: {}, backoff: {}ms)", config.max_retries, config.base_backoff_ms);

    loop {
        let record = tokio::select! {
            r = queue.recv() => match r {
                Some(record) => record,
                None => break,
            },
            _ = shutdown.changed() => break,
        };

        match deliver_with_retry(&sink, &record, &config).await {
            Ok(_) => metrics::record_export_success(),
            Err(e) => {
                metrics::record_export_failure();
                metrics::record_export_dropped();
                log::warn!("Dropping export record from {}: {}", record.timestamp, e);
            }
        }
    }

    log::info!("Export loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use crate::logic::features::FeatureSnapshot;

    /// Fails the first `failures` sends with the given error
    struct FlakySink {
        failures: u32,
        error: fn() -> ExportError,
        calls: Arc<AtomicU32>,
    }

    impl SnapshotSink for FlakySink {
        async fn send(&self, _record: &ExportRecord) -> Result<(), ExportError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err((self.error)())
            } else {
                Ok(())
            }
        }
    }

    fn fast_config() -> ExportConfig {
        ExportConfig {
            base_backoff_ms: 1,
            ..Default::default()
        }
    }

    fn record() -> ExportRecord {
        FeatureSnapshot::empty().to_export_record()
    }

    fn flaky(failures: u32, error: fn() -> ExportError) -> (FlakySink, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        (FlakySink { failures, error, calls: calls.clone() }, calls)
    }

    #[test]
    fn test_backoff_doubles() {
        let config = ExportConfig::default();
        assert_eq!(config.backoff(1), Duration::from_millis(100));
        assert_eq!(config.backoff(2), Duration::from_millis(200));
        assert_eq!(config.backoff(3), Duration::from_millis(400));
    }

    #[test]
    fn test_schedule_every_kth_window() {
        let mut schedule = ExportSchedule::new(Duration::from_millis(2_000), Duration::from_millis(1_000));
        assert_eq!(schedule.every(), 2);
        let picks: Vec<bool> = (0..4).map(|_| schedule.tick()).collect();
        assert_eq!(picks, vec![false, true, false, true]);

        let mut fast = ExportSchedule::new(Duration::from_millis(100), Duration::from_millis(1_000));
        assert!(fast.tick());
    }

    #[tokio::test]
    async fn test_recovers_before_retries_run_out() {
        let (sink, calls) = flaky(2, || ExportError::Network("reset".into()));
        let attempts = deliver_with_retry(&sink, &record(), &fast_config()).await.unwrap();
        assert_eq!(attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let (sink, calls) = flaky(u32::MAX, || ExportError::Server(503));
        let result = deliver_with_retry(&sink, &record(), &fast_config()).await;
        assert!(matches!(result, Err(ExportError::Server(503))));
        // first attempt + 3 retries
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let (sink, calls) = flaky(u32::MAX, || ExportError::Server(422));
        assert!(deliver_with_retry(&sink, &record(), &fast_config()).await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_loop_drains_and_counts_drops() {
        let (sink, calls) = flaky(u32::MAX, || ExportError::Network("down".into()));
        let (tx, rx) = mpsc::channel(4);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let dropped_before = metrics::snapshot().exports_dropped;

        tx.send(record()).await.unwrap();
        drop(tx);
        run_export_loop(sink, rx, fast_config(), shutdown_rx).await;

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert!(metrics::snapshot().exports_dropped >= dropped_before + 1);
    }
}
