//! Analysis Loop - Runs the pipeline lanes
//!
//! | Lane | Runs on | Period |
//! |---|---|---|
//! | ingestion | dedicated thread | per event |
//! | evaluation | tokio task, work in `spawn_blocking` | window duration |
//! | retraining | tokio task, work in `spawn_blocking` | retrain interval, first tick immediate |
//! | export | tokio task | every k-th window |
//!
//! Lanes only share the aggregator, the engine and channels. A slow or
//! failing evaluation, retrain or export never blocks ingestion.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, MissedTickBehavior};
use uuid::Uuid;

use crate::logic::collector::{self, CollectorError, EventSender};
use crate::logic::config::{ConfigError, EngineConfig};
use crate::logic::engine::ThreatEngine;
use crate::logic::export::{run_export_loop, ExportError, ExportRecord, ExportSchedule, HttpSink};
use crate::logic::features::{FeatureSnapshot, WindowAggregator};
use crate::logic::metrics;
use crate::logic::threat::ThreatVerdict;
use crate::logic::training::RetrainOutcome;

/// Verdicts buffered per subscriber before the slowest one starts lagging
const VERDICT_CHANNEL_CAPACITY: usize = 256;

// ============================================================================
// HANDLE
// ============================================================================

pub struct PipelineHandle {
    sender: EventSender,
    engine: Arc<ThreatEngine>,
    aggregator: Arc<WindowAggregator>,
    verdicts: broadcast::Sender<ThreatVerdict>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
    ingestion: std::thread::JoinHandle<u64>,
}

impl PipelineHandle {
    /// Producer side of the event queue
    pub fn sender(&self) -> EventSender {
        self.sender.clone()
    }

    pub fn engine(&self) -> Arc<ThreatEngine> {
        self.engine.clone()
    }

    pub fn aggregator(&self) -> Arc<WindowAggregator> {
        self.aggregator.clone()
    }

    /// Stream of verdicts, one per closed window
    pub fn subscribe(&self) -> broadcast::Receiver<ThreatVerdict> {
        self.verdicts.subscribe()
    }

    /// Stop the timed lanes and release the queue. The ingestion thread
    /// finishes once every other `EventSender` clone is dropped.
    pub async fn shutdown(self) {
        log::info!("Shutting down pipeline...");
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                log::error!("Pipeline task ended abnormally: {}", e);
            }
        }

        drop(self.sender);
        if self.ingestion.is_finished() {
            match self.ingestion.join() {
                Ok(handled) => log::info!("Ingestion lane joined after {} events", handled),
                Err(_) => log::error!("Ingestion lane panicked"),
            }
        } else {
            log::info!("Ingestion lane still has live producers, detaching");
        }
        log::info!("Pipeline stopped");
    }
}

// ============================================================================
// START
// ============================================================================

/// Validate the config and start every lane. Must run inside a tokio runtime.
pub fn start(config: EngineConfig) -> Result<PipelineHandle, PipelineError> {
    config.validate()?;

    let aggregator = Arc::new(WindowAggregator::new(config.aggregator_config()));
    let engine = Arc::new(ThreatEngine::new(config.engine_parts()));
    let (sender, receiver) = collector::event_queue(config.event_queue_capacity);
    let (verdicts, _) = broadcast::channel(VERDICT_CHANNEL_CAPACITY);
    let (shutdown, shutdown_rx) = watch::channel(false);

    let mut tasks = Vec::new();

    // export lane first so the evaluation lane can get its queue
    let export = match &config.export.url {
        Some(url) => {
            let sink = HttpSink::new(url, config.export.timeout())?;
            log::info!("Exporting every {}ms to {}", config.export.interval_ms, sink.endpoint());
            let (tx, rx) = mpsc::channel(config.export.queue_capacity.max(1));
            tasks.push(tokio::spawn(run_export_loop(sink, rx, config.export.clone(), shutdown_rx.clone())));
            let schedule = ExportSchedule::new(Duration::from_millis(config.export.interval_ms), config.window_duration());
            Some((tx, schedule))
        }
        None => {
            log::info!("Export disabled (no detector URL configured)");
            None
        }
    };

    tasks.push(tokio::spawn(evaluation_lane(
        aggregator.clone(),
        engine.clone(),
        verdicts.clone(),
        export,
        config.window_duration(),
        config.evaluation_timeout(),
        shutdown_rx.clone(),
    )));

    if config.training.enabled {
        tasks.push(tokio::spawn(retraining_lane(engine.clone(), config.retrain_interval(), shutdown_rx.clone())));
    } else {
        log::info!("Background retraining disabled");
    }

    let ingestion = collector::spawn_ingestion(receiver, aggregator.clone())?;

    log::info!(
        "Pipeline started (window {}ms, queue {}, evaluation timeout {}ms)",
        config.window_duration_ms,
        config.event_queue_capacity,
        config.evaluation_timeout_ms
    );

    Ok(PipelineHandle {
        sender,
        engine,
        aggregator,
        verdicts,
        shutdown,
        tasks,
        ingestion,
    })
}

// ============================================================================
// LANES
// ============================================================================

async fn evaluation_lane(
    aggregator: Arc<WindowAggregator>,
    engine: Arc<ThreatEngine>,
    verdicts: broadcast::Sender<ThreatVerdict>,
    mut export: Option<(mpsc::Sender<ExportRecord>, ExportSchedule)>,
    period: Duration,
    limit: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut evaluator = Evaluator::new(engine, limit);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => break,
        }

        let Some(snapshot) = aggregator.force_rollover(Instant::now()) else {
            continue;
        };
        let snapshot = Arc::new(snapshot);

        if let Some((tx, schedule)) = export.as_mut() {
            if schedule.tick() && tx.try_send(snapshot.to_export_record()).is_err() {
                metrics::record_export_dropped();
                log::debug!("Export queue full, window {} not exported", snapshot.id);
            }
        }

        let verdict = evaluator.evaluate(snapshot).await;
        // no subscribers is fine
        let _ = verdicts.send(verdict);
    }
    evaluator.settle().await;
    log::info!("Evaluation lane stopped");
}

/// Runs `process` off the async workers, bounded by a time limit.
///
/// A timeout or a panic yields an unknown verdict. A timed-out evaluation
/// keeps running and is awaited before the next one starts, so windows are
/// learned in the order they closed.
pub struct Evaluator {
    engine: Arc<ThreatEngine>,
    limit: Duration,
    straggler: Option<(Uuid, JoinHandle<ThreatVerdict>)>,
}

impl Evaluator {
    pub fn new(engine: Arc<ThreatEngine>, limit: Duration) -> Self {
        Self { engine, limit, straggler: None }
    }

    pub async fn evaluate(&mut self, snapshot: Arc<FeatureSnapshot>) -> ThreatVerdict {
        self.settle().await;

        let id = snapshot.id;
        let closed_at = snapshot.closed_at;
        let engine = self.engine.clone();
        let mut work = tokio::task::spawn_blocking(move || engine.process(snapshot));

        let outcome = tokio::time::timeout(self.limit, &mut work).await;
        let failed = match outcome {
            Ok(Ok(verdict)) => return verdict,
            Ok(Err(e)) => {
                log::error!("Evaluation of window {} failed: {}", id, e);
                ThreatVerdict::unknown(id, closed_at)
            }
            Err(_) => {
                log::warn!("Evaluation of window {} exceeded {:?}", id, self.limit);
                metrics::record_evaluation_timeout();
                self.straggler = Some((id, work));
                ThreatVerdict::unknown(id, closed_at)
            }
        };
        metrics::record_verdict(&failed);
        failed
    }

    /// Wait for a timed-out evaluation to finish; its late verdict is discarded
    pub async fn settle(&mut self) {
        if let Some((id, work)) = self.straggler.take() {
            match work.await {
                Ok(late) => log::debug!("Late verdict for window {} discarded (detected: {})", id, late.detected),
                Err(e) => log::error!("Timed-out evaluation of window {} failed: {}", id, e),
            }
        }
    }
}

/// One-shot evaluation; a timed-out run is left to finish in the background
pub async fn evaluate(engine: Arc<ThreatEngine>, snapshot: Arc<FeatureSnapshot>, limit: Duration) -> ThreatVerdict {
    Evaluator::new(engine, limit).evaluate(snapshot).await
}

async fn retraining_lane(engine: Arc<ThreatEngine>, period: Duration, mut shutdown: watch::Receiver<bool>) {
    // first tick completes immediately: cold start fits the warm-start corpus
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => break,
        }

        let engine = engine.clone();
        match tokio::task::spawn_blocking(move || engine.retrain_once()).await {
            Ok(RetrainOutcome::Trained { generation, spatial_refit, temporal_refit }) => {
                log::info!(
                    "Retrained generation {} (spatial refit: {}, temporal refit: {})",
                    generation,
                    spatial_refit,
                    temporal_refit
                );
            }
            Ok(RetrainOutcome::WarmStarted { generation }) => {
                log::info!("Warm-started generation {}", generation);
            }
            Ok(RetrainOutcome::Skipped { have, need }) => {
                log::debug!("Retrain skipped ({}/{} samples)", have, need);
            }
            Ok(RetrainOutcome::Failed(e)) => {
                log::warn!("Retrain cycle failed: {}", e);
            }
            Err(e) => {
                log::error!("Retrain task panicked: {}", e);
            }
        }
    }
    log::info!("Retraining lane stopped");
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug)]
pub enum PipelineError {
    Config(ConfigError),
    Collector(CollectorError),
    Export(ExportError),
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(e) => write!(f, "{}", e),
            Self::Collector(e) => write!(f, "Collector error: {}", e),
            Self::Export(e) => write!(f, "Export setup failed: {}", e),
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<ConfigError> for PipelineError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<CollectorError> for PipelineError {
    fn from(e: CollectorError) -> Self {
        Self::Collector(e)
    }
}

impl From<ExportError> for PipelineError {
    fn from(e: ExportError) -> Self {
        Self::Export(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::features::event::{EventRecord, FLAG_SYN, PROTO_TCP};
    use crate::logic::threat::{EnsembleOutcome, ThreatLabel};

    fn fast_config() -> EngineConfig {
        let mut config = EngineConfig {
            window_duration_ms: 100,
            evaluation_timeout_ms: 2_000,
            ..Default::default()
        };
        config.training.enabled = false;
        config
    }

    fn syn(port: u16, ts: u64) -> EventRecord {
        EventRecord {
            src_ip: 0x0a00_0063,
            dst_ip: 0x0a00_0001,
            src_port: 40_000,
            dst_port: port,
            protocol: PROTO_TCP,
            packet_size: 60,
            timestamp: ts,
            tcp_flags: FLAG_SYN,
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_pipeline_emits_verdicts() {
        let handle = start(fast_config()).unwrap();
        let mut verdicts = handle.subscribe();
        let sender = handle.sender();

        for port in 0..200u16 {
            assert!(sender.try_send(syn(1_000 + port, port as u64 + 1)).unwrap());
        }

        // the burst lands in one or two windows, each well past the port-scan cut
        let found = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match verdicts.recv().await {
                    Ok(v) if v.threat_types.contains(&ThreatLabel::PortScan) => return v,
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => panic!("verdict channel closed"),
                }
            }
        })
        .await
        .expect("no port-scan verdict within 5s");
        assert!(found.detected);
        assert_eq!(handle.aggregator().ingested(), 200);

        drop(sender);
        handle.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_timeout_yields_unknown_verdict() {
        let engine = Arc::new(ThreatEngine::default());
        let snapshot = Arc::new(FeatureSnapshot::empty());
        let id = snapshot.id;

        let verdict = evaluate(engine, snapshot, Duration::from_nanos(1)).await;
        // either finished in time or replaced by the unknown verdict
        assert_eq!(verdict.snapshot_id, id);
        if verdict.ensemble == EnsembleOutcome::Unknown {
            assert!(!verdict.detected);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_timed_out_window_is_learned_before_the_next() {
        let engine = Arc::new(ThreatEngine::default());
        let mut evaluator = Evaluator::new(engine.clone(), Duration::from_nanos(1));

        evaluator.evaluate(Arc::new(FeatureSnapshot::empty())).await;
        evaluator.evaluate(Arc::new(FeatureSnapshot::empty())).await;
        // the first window was fully processed before the second one started
        assert!(engine.curator_stats().total_samples >= 1);

        evaluator.settle().await;
        assert_eq!(engine.curator_stats().total_samples, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_retraining_lane_warm_starts_immediately() {
        let mut config = fast_config();
        config.training.enabled = true;
        config.training.interval_ms = 60_000;
        let handle = start(config).unwrap();
        let engine = handle.engine();

        let deadline = Instant::now() + Duration::from_secs(10);
        while engine.current_generation().id == 0 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(engine.current_generation().id, 1);
        assert!(engine.current_generation().warm_start);

        handle.shutdown().await;
    }

    #[test]
    fn test_invalid_config_is_rejected_before_start() {
        let config = EngineConfig { event_queue_capacity: 0, ..Default::default() };
        assert!(matches!(start(config), Err(PipelineError::Config(_))));
    }
}
