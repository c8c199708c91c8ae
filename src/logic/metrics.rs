//! Metrics - Process-wide counters and gauges
//!
//! Lock-free atomics in one lazily created registry. Gauges holding floats
//! store the `f64` bit pattern. `snapshot()` gives a serializable copy for
//! whatever exposition format the host wants.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::logic::features::{EventRecord, FeatureSnapshot, Protocol};
use crate::logic::model::scorer::ScorerKind;
use crate::logic::threat::{EnsembleOutcome, ScoreStatus, ScorerReading, ThreatLabel, ThreatVerdict};

// ============================================================================
// CONSTANTS
// ============================================================================

/// Upper bounds (ms) of the processing-latency histogram; last bucket is +Inf
pub const LATENCY_BUCKETS_MS: [f64; 10] = [1.0, 2.5, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0];

const LABELS: usize = ThreatLabel::ALL.len();
const SCORERS: usize = ScorerKind::ALL.len();

// ============================================================================
// REGISTRY
// ============================================================================

#[derive(Default)]
struct F64Gauge(AtomicU64);

impl F64Gauge {
    fn set(&self, v: f64) {
        self.0.store(v.to_bits(), Ordering::Relaxed);
    }

    fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }
}

#[derive(Default)]
struct ScorerCounters {
    evaluations: AtomicU64,
    high: AtomicU64,
    failures: AtomicU64,
    last_score: F64Gauge,
}

#[derive(Default)]
struct Registry {
    // ingestion
    events_processed: AtomicU64,
    bytes_processed: AtomicU64,
    tcp_packets: AtomicU64,
    udp_packets: AtomicU64,
    icmp_packets: AtomicU64,
    other_packets: AtomicU64,
    syn_packets: AtomicU64,
    dropped_events: AtomicU64,
    parse_errors: AtomicU64,

    // windows
    windows_closed: AtomicU64,
    rollover_failures: AtomicU64,
    unique_sources: AtomicU64,
    unique_destinations: AtomicU64,
    unique_ports: AtomicU64,
    packets_per_second: F64Gauge,
    bytes_per_second: F64Gauge,
    avg_latency_ms: F64Gauge,
    jitter_ms: F64Gauge,
    packet_loss_rate: F64Gauge,

    // detection
    rule_matches: [AtomicU64; LABELS],
    scorers: [ScorerCounters; SCORERS],
    verdicts: AtomicU64,
    threats_detected: AtomicU64,
    edge_cases: AtomicU64,
    unknown_verdicts: AtomicU64,
    evaluation_timeouts: AtomicU64,
    latency_buckets: [AtomicU64; LATENCY_BUCKETS_MS.len() + 1],
    latency_sum_us: AtomicU64,

    // training
    retrains: AtomicU64,
    retrains_skipped: AtomicU64,
    retrain_failures: AtomicU64,
    model_generation: AtomicU64,

    // export
    exports_sent: AtomicU64,
    export_failures: AtomicU64,
    exports_dropped: AtomicU64,
}

static METRICS: Lazy<Registry> = Lazy::new(Registry::default);

// ============================================================================
// RECORDING
// ============================================================================

pub fn record_event(event: &EventRecord) {
    let m = &*METRICS;
    m.events_processed.fetch_add(1, Ordering::Relaxed);
    m.bytes_processed.fetch_add(event.packet_size as u64, Ordering::Relaxed);
    let counter = match event.protocol_kind() {
        Protocol::Tcp => &m.tcp_packets,
        Protocol::Udp => &m.udp_packets,
        Protocol::Icmp => &m.icmp_packets,
        Protocol::Other => &m.other_packets,
    };
    counter.fetch_add(1, Ordering::Relaxed);
    if event.is_syn() {
        m.syn_packets.fetch_add(1, Ordering::Relaxed);
    }
}

pub fn record_parse_error() {
    METRICS.parse_errors.fetch_add(1, Ordering::Relaxed);
}

pub fn record_dropped_event() {
    METRICS.dropped_events.fetch_add(1, Ordering::Relaxed);
}

pub fn record_rollover_failure() {
    METRICS.rollover_failures.fetch_add(1, Ordering::Relaxed);
}

pub fn record_window(snapshot: &FeatureSnapshot) {
    let m = &*METRICS;
    m.windows_closed.fetch_add(1, Ordering::Relaxed);
    m.unique_sources.store(snapshot.unique_sources, Ordering::Relaxed);
    m.unique_destinations.store(snapshot.unique_destinations, Ordering::Relaxed);
    m.unique_ports.store(snapshot.unique_ports, Ordering::Relaxed);
    m.packets_per_second.set(snapshot.packets_per_second);
    m.bytes_per_second.set(snapshot.bytes_per_second);
    m.avg_latency_ms.set(snapshot.avg_latency_ms);
    m.jitter_ms.set(snapshot.jitter_ms);
    m.packet_loss_rate.set(snapshot.packet_loss_rate);
}

pub fn record_rule_match(label: ThreatLabel) {
    METRICS.rule_matches[label.index()].fetch_add(1, Ordering::Relaxed);
}

pub fn record_reading(reading: &ScorerReading, high_threshold: f64) {
    let c = &METRICS.scorers[reading.scorer.index()];
    match reading.status {
        ScoreStatus::Ok => {
            c.evaluations.fetch_add(1, Ordering::Relaxed);
            c.last_score.set(reading.score);
            if reading.score >= high_threshold {
                c.high.fetch_add(1, Ordering::Relaxed);
            }
        }
        ScoreStatus::Failed => {
            c.failures.fetch_add(1, Ordering::Relaxed);
        }
        ScoreStatus::NotReady | ScoreStatus::Disabled => {}
    }
}

pub fn record_verdict(verdict: &ThreatVerdict) {
    let m = &*METRICS;
    m.verdicts.fetch_add(1, Ordering::Relaxed);
    if verdict.detected {
        m.threats_detected.fetch_add(1, Ordering::Relaxed);
    }
    match verdict.ensemble {
        EnsembleOutcome::EdgeCase => {
            m.edge_cases.fetch_add(1, Ordering::Relaxed);
        }
        EnsembleOutcome::Unknown => {
            m.unknown_verdicts.fetch_add(1, Ordering::Relaxed);
        }
        EnsembleOutcome::Positive | EnsembleOutcome::Negative => {}
    }
}

pub fn record_evaluation_timeout() {
    METRICS.evaluation_timeouts.fetch_add(1, Ordering::Relaxed);
}

pub fn record_processing_latency(elapsed: Duration) {
    let ms = elapsed.as_secs_f64() * 1000.0;
    let bucket = LATENCY_BUCKETS_MS
        .iter()
        .position(|&upper| ms <= upper)
        .unwrap_or(LATENCY_BUCKETS_MS.len());
    METRICS.latency_buckets[bucket].fetch_add(1, Ordering::Relaxed);
    METRICS.latency_sum_us.fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
}

pub fn record_retrain_success(generation: u64) {
    METRICS.retrains.fetch_add(1, Ordering::Relaxed);
    METRICS.model_generation.store(generation, Ordering::Relaxed);
}

pub fn record_retrain_skipped() {
    METRICS.retrains_skipped.fetch_add(1, Ordering::Relaxed);
}

pub fn record_retrain_failure() {
    METRICS.retrain_failures.fetch_add(1, Ordering::Relaxed);
}

pub fn record_export_success() {
    METRICS.exports_sent.fetch_add(1, Ordering::Relaxed);
}

pub fn record_export_failure() {
    METRICS.export_failures.fetch_add(1, Ordering::Relaxed);
}

pub fn record_export_dropped() {
    METRICS.exports_dropped.fetch_add(1, Ordering::Relaxed);
}

// ============================================================================
// SNAPSHOT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScorerMetrics {
    pub scorer: ScorerKind,
    pub evaluations: u64,
    pub high: u64,
    pub failures: u64,
    pub last_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub events_processed: u64,
    pub bytes_processed: u64,
    pub tcp_packets: u64,
    pub udp_packets: u64,
    pub icmp_packets: u64,
    pub other_packets: u64,
    pub syn_packets: u64,
    pub dropped_events: u64,
    pub parse_errors: u64,

    pub windows_closed: u64,
    pub rollover_failures: u64,
    pub unique_sources: u64,
    pub unique_destinations: u64,
    pub unique_ports: u64,
    pub packets_per_second: f64,
    pub bytes_per_second: f64,
    pub avg_latency_ms: f64,
    pub jitter_ms: f64,
    pub packet_loss_rate: f64,

    /// (label, matches) for every rule label
    pub rule_matches: Vec<(ThreatLabel, u64)>,
    pub scorers: Vec<ScorerMetrics>,
    pub verdicts: u64,
    pub threats_detected: u64,
    pub edge_cases: u64,
    pub unknown_verdicts: u64,
    pub evaluation_timeouts: u64,
    /// Counts per `LATENCY_BUCKETS_MS` bound, then the +Inf bucket
    pub latency_histogram: Vec<u64>,
    pub latency_sum_ms: f64,

    pub retrains: u64,
    pub retrains_skipped: u64,
    pub retrain_failures: u64,
    pub model_generation: u64,

    pub exports_sent: u64,
    pub export_failures: u64,
    pub exports_dropped: u64,
}

pub fn snapshot() -> MetricsSnapshot {
    let m = &*METRICS;
    let load = |a: &AtomicU64| a.load(Ordering::Relaxed);

    MetricsSnapshot {
        events_processed: load(&m.events_processed),
        bytes_processed: load(&m.bytes_processed),
        tcp_packets: load(&m.tcp_packets),
        udp_packets: load(&m.udp_packets),
        icmp_packets: load(&m.icmp_packets),
        other_packets: load(&m.other_packets),
        syn_packets: load(&m.syn_packets),
        dropped_events: load(&m.dropped_events),
        parse_errors: load(&m.parse_errors),
        windows_closed: load(&m.windows_closed),
        rollover_failures: load(&m.rollover_failures),
        unique_sources: load(&m.unique_sources),
        unique_destinations: load(&m.unique_destinations),
        unique_ports: load(&m.unique_ports),
        packets_per_second: m.packets_per_second.get(),
        bytes_per_second: m.bytes_per_second.get(),
        avg_latency_ms: m.avg_latency_ms.get(),
        jitter_ms: m.jitter_ms.get(),
        packet_loss_rate: m.packet_loss_rate.get(),
        rule_matches: ThreatLabel::ALL
            .iter()
            .filter(|l| !l.is_ml())
            .map(|l| (*l, load(&m.rule_matches[l.index()])))
            .collect(),
        scorers: ScorerKind::ALL
            .iter()
            .map(|k| {
                let c = &m.scorers[k.index()];
                ScorerMetrics {
                    scorer: *k,
                    evaluations: load(&c.evaluations),
                    high: load(&c.high),
                    failures: load(&c.failures),
                    last_score: c.last_score.get(),
                }
            })
            .collect(),
        verdicts: load(&m.verdicts),
        threats_detected: load(&m.threats_detected),
        edge_cases: load(&m.edge_cases),
        unknown_verdicts: load(&m.unknown_verdicts),
        evaluation_timeouts: load(&m.evaluation_timeouts),
        latency_histogram: m.latency_buckets.iter().map(load).collect(),
        latency_sum_ms: load(&m.latency_sum_us) as f64 / 1000.0,
        retrains: load(&m.retrains),
        retrains_skipped: load(&m.retrains_skipped),
        retrain_failures: load(&m.retrain_failures),
        model_generation: load(&m.model_generation),
        exports_sent: load(&m.exports_sent),
        export_failures: load(&m.export_failures),
        exports_dropped: load(&m.exports_dropped),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The registry is process-wide and tests run in parallel, so only
    // monotonic deltas are asserted.

    #[test]
    fn test_latency_histogram_buckets() {
        let before = snapshot().latency_histogram;
        record_processing_latency(Duration::from_micros(800));
        record_processing_latency(Duration::from_secs(5));
        let after = snapshot().latency_histogram;

        assert_eq!(after.len(), LATENCY_BUCKETS_MS.len() + 1);
        assert!(after[0] >= before[0] + 1);
        assert!(after[LATENCY_BUCKETS_MS.len()] >= before[LATENCY_BUCKETS_MS.len()] + 1);
    }

    #[test]
    fn test_rule_match_counter() {
        let count = |s: &MetricsSnapshot| {
            s.rule_matches
                .iter()
                .find(|(l, _)| *l == ThreatLabel::DataExfiltration)
                .map(|(_, n)| *n)
                .unwrap_or(0)
        };
        let before = count(&snapshot());
        record_rule_match(ThreatLabel::DataExfiltration);
        assert!(count(&snapshot()) >= before + 1);
    }

    #[test]
    fn test_snapshot_serializes() {
        let json = serde_json::to_string(&snapshot()).unwrap();
        assert!(json.contains("events_processed"));
        assert!(json.contains("\"ddos\""));
    }
}
