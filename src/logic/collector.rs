//! Collector - Bounded inbound event queue
//!
//! The capture layer pushes parsed Event Records through an `EventSender`.
//! Pushing never blocks: when the queue is full the event is dropped and
//! counted. A dedicated OS thread drains the queue into the aggregator.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::logic::features::{EventRecord, WindowAggregator};
use crate::logic::metrics;

// ============================================================================
// ERROR HANDLING
// ============================================================================

#[derive(Debug)]
pub enum CollectorError {
    /// Consumer side is gone (shutdown)
    QueueClosed,
    /// Ingestion thread could not be started
    Spawn(String),
}

impl std::fmt::Display for CollectorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectorError::QueueClosed => write!(f, "CollectorError: event queue closed"),
            CollectorError::Spawn(e) => write!(f, "CollectorError: failed to spawn ingestion thread: {}", e),
        }
    }
}

impl std::error::Error for CollectorError {}

impl From<std::io::Error> for CollectorError {
    fn from(e: std::io::Error) -> Self {
        CollectorError::Spawn(e.to_string())
    }
}

// ============================================================================
// QUEUE
// ============================================================================

#[derive(Debug, Default)]
struct QueueStats {
    accepted: AtomicU64,
    dropped: AtomicU64,
}

/// Producer handle, cheap to clone
#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::Sender<EventRecord>,
    stats: Arc<QueueStats>,
}

/// Consumer handle, owned by the ingestion lane
pub struct EventReceiver {
    rx: mpsc::Receiver<EventRecord>,
}

/// Create the bounded queue
pub fn event_queue(capacity: usize) -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let stats = Arc::new(QueueStats::default());
    (
        EventSender { tx, stats },
        EventReceiver { rx },
    )
}

impl EventSender {
    /// Enqueue without blocking. `Ok(false)` means the queue was full and
    /// the event was dropped.
    pub fn try_send(&self, event: EventRecord) -> Result<bool, CollectorError> {
        match self.tx.try_send(event) {
            Ok(()) => {
                self.stats.accepted.fetch_add(1, Ordering::Relaxed);
                Ok(true)
            }
            Err(TrySendError::Full(_)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                metrics::record_dropped_event();
                Ok(false)
            }
            Err(TrySendError::Closed(_)) => Err(CollectorError::QueueClosed),
        }
    }

    pub fn accepted(&self) -> u64 {
        self.stats.accepted.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.stats.dropped.load(Ordering::Relaxed)
    }
}

impl EventReceiver {
    /// Blocking receive for the ingestion thread. `None` once every sender
    /// is dropped and the queue is drained.
    pub fn blocking_recv(&mut self) -> Option<EventRecord> {
        self.rx.blocking_recv()
    }

    pub fn try_recv(&mut self) -> Option<EventRecord> {
        self.rx.try_recv().ok()
    }
}

// ============================================================================
// INGESTION LANE
// ============================================================================

/// Drain everything currently queued into the aggregator; returns how many
/// events were accepted by validation
pub fn drain_into(receiver: &mut EventReceiver, aggregator: &WindowAggregator) -> u64 {
    let mut accepted = 0;
    while let Some(event) = receiver.try_recv() {
        if aggregator.ingest(&event).is_ok() {
            accepted += 1;
        }
    }
    accepted
}

/// Start the ingestion thread. It exits when all senders are gone and
/// returns the number of events it handed to the aggregator.
pub fn spawn_ingestion(
    mut receiver: EventReceiver,
    aggregator: Arc<WindowAggregator>,
) -> Result<JoinHandle<u64>, CollectorError> {
    let handle = std::thread::Builder::new()
        .name("flowguard-ingest".to_string())
        .spawn(move || {
            log::info!("Ingestion lane started");
            let mut handled = 0u64;
            while let Some(event) = receiver.blocking_recv() {
                if let Err(e) = aggregator.ingest(&event) {
                    log::debug!("Discarded event: {}", e);
                }
                handled += 1;
            }
            log::info!("Ingestion lane stopped ({} events)", handled);
            handled
        })?;
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};
    use crate::logic::features::event::PROTO_TCP;
    use crate::logic::features::AggregatorConfig;

    fn ev(i: u64) -> EventRecord {
        EventRecord {
            src_ip: 1 + (i % 3) as u32,
            dst_ip: 99,
            src_port: 1000,
            dst_port: 443,
            protocol: PROTO_TCP,
            packet_size: 64,
            timestamp: 1 + i,
            tcp_flags: 0,
        }
    }

    #[test]
    fn test_overload_drops_exactly_the_overflow() {
        let capacity = 128;
        let (tx, mut rx) = event_queue(capacity);
        for i in 0..(2 * capacity as u64) {
            tx.try_send(ev(i)).unwrap();
        }
        assert_eq!(tx.accepted(), capacity as u64);
        assert_eq!(tx.dropped(), capacity as u64);

        let start = Instant::now();
        let agg = WindowAggregator::starting_at(AggregatorConfig::default(), start);
        assert_eq!(drain_into(&mut rx, &agg), capacity as u64);

        let snap = agg.rollover(start + Duration::from_secs(1)).unwrap();
        // nothing double counted
        assert_eq!(snap.packets, capacity as u64);
        assert_eq!(snap.packets + tx.dropped(), 2 * capacity as u64);
    }

    #[test]
    fn test_closed_queue_is_an_error() {
        let (tx, rx) = event_queue(4);
        drop(rx);
        assert!(matches!(tx.try_send(ev(0)), Err(CollectorError::QueueClosed)));
    }

    #[test]
    fn test_ingestion_thread_exits_when_senders_drop() {
        let (tx, rx) = event_queue(1024);
        let agg = Arc::new(WindowAggregator::default());
        let handle = spawn_ingestion(rx, agg.clone()).unwrap();

        for i in 0..500 {
            assert!(tx.try_send(ev(i)).unwrap());
        }
        drop(tx);

        assert_eq!(handle.join().unwrap(), 500);
        assert_eq!(agg.ingested(), 500);
    }
}
