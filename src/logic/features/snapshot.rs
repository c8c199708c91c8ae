//! Feature Snapshot - Immutable summary of one closed window
//!
//! Built once from a `Window` at rollover, then shared read-only
//! (`Arc<FeatureSnapshot>`) by the rule engine, the scorers, the curator
//! and the exporter.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::time::Instant;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::layout::FeatureVector;
use super::qos::QosSummary;
use super::window::Window;
use crate::logic::export::record::ExportRecord;

/// Rates never divide by less than this (seconds)
const MIN_ELAPSED_SECS: f64 = 0.001;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSnapshot {
    pub id: Uuid,
    pub window_start: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
    pub elapsed_secs: f64,

    // Volume
    pub packets: u64,
    pub bytes: u64,
    pub packets_per_second: f64,
    pub bytes_per_second: f64,

    // Diversity
    pub unique_sources: u64,
    pub unique_destinations: u64,
    pub unique_ports: u64,

    // Transport
    pub tcp_packets: u64,
    pub udp_packets: u64,
    pub icmp_packets: u64,
    pub other_packets: u64,
    pub syn_packets: u64,

    // QoS
    pub avg_latency_ms: f64,
    pub max_latency_ms: f64,
    pub min_latency_ms: f64,
    pub jitter_ms: f64,
    pub p95_latency_ms: f64,
    pub packet_loss_rate: f64,
    pub retransmit_rate: f64,

    pub top_sources: Vec<(Ipv4Addr, u64)>,
    pub sources_saturated: bool,
    pub destinations_saturated: bool,
}

impl FeatureSnapshot {
    /// Summarize a closed window. `closed_at` is the monotonic close instant.
    pub fn from_window(window: &Window, closed_at: Instant) -> Self {
        let elapsed = closed_at
            .saturating_duration_since(window.started_at())
            .as_secs_f64()
            .max(MIN_ELAPSED_SECS);
        let window_start = window.started_wall();
        let closed_wall = window_start
            + ChronoDuration::milliseconds((elapsed * 1000.0).round() as i64);

        let (tcp, udp, icmp, other) = window.protocol_counts();
        let qos = QosSummary::from_samples(&window.latency_samples());
        let retransmit_rate = if tcp > 0 {
            window.retransmits() as f64 / tcp as f64
        } else {
            0.0
        };

        Self {
            id: Uuid::new_v4(),
            window_start,
            closed_at: closed_wall,
            elapsed_secs: elapsed,
            packets: window.packets(),
            bytes: window.bytes(),
            packets_per_second: window.packets() as f64 / elapsed,
            bytes_per_second: window.bytes() as f64 / elapsed,
            unique_sources: window.unique_sources() as u64,
            unique_destinations: window.unique_destinations() as u64,
            unique_ports: window.unique_ports() as u64,
            tcp_packets: tcp,
            udp_packets: udp,
            icmp_packets: icmp,
            other_packets: other,
            syn_packets: window.syn_packets(),
            avg_latency_ms: qos.avg_latency_ms,
            max_latency_ms: qos.max_latency_ms,
            min_latency_ms: qos.min_latency_ms,
            jitter_ms: qos.jitter_ms,
            p95_latency_ms: qos.p95_latency_ms,
            packet_loss_rate: qos.packet_loss_rate,
            retransmit_rate,
            top_sources: window.top_sources(),
            sources_saturated: window.sources_saturated(),
            destinations_saturated: window.destinations_saturated(),
        }
    }

    /// Snapshot with every counter at zero (1 s window)
    pub fn empty() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            window_start: now - ChronoDuration::seconds(1),
            closed_at: now,
            elapsed_secs: 1.0,
            packets: 0,
            bytes: 0,
            packets_per_second: 0.0,
            bytes_per_second: 0.0,
            unique_sources: 0,
            unique_destinations: 0,
            unique_ports: 0,
            tcp_packets: 0,
            udp_packets: 0,
            icmp_packets: 0,
            other_packets: 0,
            syn_packets: 0,
            avg_latency_ms: 0.0,
            max_latency_ms: 0.0,
            min_latency_ms: 0.0,
            jitter_ms: 0.0,
            p95_latency_ms: 0.0,
            packet_loss_rate: 0.0,
            retransmit_rate: 0.0,
            top_sources: Vec::new(),
            sources_saturated: false,
            destinations_saturated: false,
        }
    }

    /// Build a snapshot from a flat feature map (the detection contract's
    /// "equivalent feature map"). Missing keys read as 0.
    ///
    /// `unique_ips` and `unique_sources` are accepted interchangeably. When
    /// only `tcp_ratio` is given, protocol counts are derived from it.
    pub fn from_feature_map(map: &HashMap<String, f64>) -> Self {
        let get = |key: &str| map.get(key).copied().filter(|v| v.is_finite()).unwrap_or(0.0);
        let count = |key: &str| get(key).max(0.0).round() as u64;

        let mut snap = Self::empty();
        snap.packets_per_second = get("packets_per_second").max(0.0);
        snap.bytes_per_second = get("bytes_per_second").max(0.0);
        snap.packets = map
            .get("packets")
            .map(|_| count("packets"))
            .unwrap_or(snap.packets_per_second.round() as u64);
        snap.bytes = map
            .get("bytes")
            .map(|_| count("bytes"))
            .unwrap_or(snap.bytes_per_second.round() as u64);

        snap.unique_sources = if map.contains_key("unique_sources") {
            count("unique_sources")
        } else {
            count("unique_ips")
        };
        snap.unique_destinations = count("unique_destinations");
        snap.unique_ports = count("unique_ports");

        snap.tcp_packets = count("tcp_packets");
        snap.udp_packets = count("udp_packets");
        snap.icmp_packets = count("icmp_packets");
        snap.other_packets = count("other_packets");
        if snap.tcp_packets + snap.udp_packets == 0 && map.contains_key("tcp_ratio") {
            let ratio = get("tcp_ratio").clamp(0.0, 1.0);
            snap.tcp_packets = (ratio * snap.packets as f64).round() as u64;
            snap.udp_packets = snap.packets.saturating_sub(snap.tcp_packets);
        }
        snap.syn_packets = count("syn_packets");

        snap.avg_latency_ms = get("avg_latency_ms");
        snap.max_latency_ms = get("max_latency_ms");
        snap.min_latency_ms = get("min_latency_ms");
        snap.jitter_ms = get("jitter_ms");
        snap.p95_latency_ms = get("p95_latency_ms");
        snap.packet_loss_rate = get("packet_loss_rate");
        snap.retransmit_rate = get("retransmit_rate");
        snap
    }

    // ------------------------------------------------------------------------
    // Derived values
    // ------------------------------------------------------------------------

    pub fn total_packets(&self) -> u64 {
        self.tcp_packets + self.udp_packets + self.icmp_packets + self.other_packets
    }

    /// tcp / (tcp + udp), 0 when neither was seen
    pub fn tcp_ratio(&self) -> f64 {
        let denom = self.tcp_packets + self.udp_packets;
        if denom == 0 {
            return 0.0;
        }
        self.tcp_packets as f64 / denom as f64
    }

    /// syn / tcp, 0 without TCP traffic
    pub fn syn_ratio(&self) -> f64 {
        if self.tcp_packets == 0 {
            return 0.0;
        }
        self.syn_packets as f64 / self.tcp_packets as f64
    }

    /// Numeric vector in `FEATURE_LAYOUT` order
    pub fn to_vector(&self) -> FeatureVector {
        [
            self.packets_per_second,
            self.bytes_per_second,
            self.unique_sources as f64,
            self.unique_ports as f64,
            self.tcp_ratio(),
            self.syn_packets as f64,
            self.avg_latency_ms,
            self.jitter_ms,
            self.packet_loss_rate,
        ]
    }

    pub fn to_export_record(&self) -> ExportRecord {
        ExportRecord::from_snapshot(self)
    }

    /// Top sources whose packet count exceeds `min_packets`
    pub fn heavy_sources(&self, min_packets: u64) -> Vec<Ipv4Addr> {
        self.top_sources
            .iter()
            .filter(|(_, n)| *n > min_packets)
            .map(|(ip, _)| *ip)
            .collect()
    }
}
