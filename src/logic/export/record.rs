//! Export Record - Flat wire form of a snapshot
//!
//! JSON shape posted to the downstream detector:
//!
//! ```json
//! { "packets_per_second": 12.0, "unique_ips": 3.0, ..., "top_ips": {"10.0.0.1": 9}, "timestamp": 1718000000 }
//! ```
//!
//! Keys match what `FeatureSnapshot::from_feature_map` reads back.

use std::collections::{BTreeMap, HashMap};
use serde::{Deserialize, Serialize};

use crate::logic::features::FeatureSnapshot;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRecord {
    #[serde(flatten)]
    pub features: BTreeMap<String, f64>,
    pub top_ips: BTreeMap<String, u64>,
    /// Window close time, unix seconds
    pub timestamp: i64,
}

impl ExportRecord {
    pub fn from_snapshot(s: &FeatureSnapshot) -> Self {
        let fields: [(&str, f64); 22] = [
            ("packets", s.packets as f64),
            ("bytes", s.bytes as f64),
            ("packets_per_second", s.packets_per_second),
            ("bytes_per_second", s.bytes_per_second),
            ("unique_ips", s.unique_sources as f64),
            ("unique_sources", s.unique_sources as f64),
            ("unique_destinations", s.unique_destinations as f64),
            ("unique_ports", s.unique_ports as f64),
            ("tcp_packets", s.tcp_packets as f64),
            ("udp_packets", s.udp_packets as f64),
            ("icmp_packets", s.icmp_packets as f64),
            ("other_packets", s.other_packets as f64),
            ("syn_packets", s.syn_packets as f64),
            ("tcp_ratio", s.tcp_ratio()),
            ("avg_latency_ms", s.avg_latency_ms),
            ("max_latency_ms", s.max_latency_ms),
            ("min_latency_ms", s.min_latency_ms),
            ("jitter_ms", s.jitter_ms),
            ("p95_latency_ms", s.p95_latency_ms),
            ("packet_loss_rate", s.packet_loss_rate),
            ("retransmit_rate", s.retransmit_rate),
            ("elapsed_secs", s.elapsed_secs),
        ];

        Self {
            features: fields.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            top_ips: s.top_sources.iter().map(|(ip, n)| (ip.to_string(), *n)).collect(),
            timestamp: s.closed_at.timestamp(),
        }
    }

    /// Feature map form, as accepted by `ThreatEngine::detect_features`
    pub fn feature_map(&self) -> HashMap<String, f64> {
        self.features.iter().map(|(k, v)| (k.clone(), *v)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn sample() -> FeatureSnapshot {
        let mut s = FeatureSnapshot::empty();
        s.packets = 300;
        s.packets_per_second = 300.0;
        s.unique_sources = 4;
        s.unique_ports = 7;
        s.tcp_packets = 240;
        s.udp_packets = 60;
        s.syn_packets = 12;
        s.jitter_ms = 2.5;
        s.top_sources = vec![(Ipv4Addr::new(10, 0, 0, 1), 200), (Ipv4Addr::new(10, 0, 0, 2), 50)];
        s
    }

    #[test]
    fn test_record_is_flat_json() {
        let record = sample().to_export_record();
        let json: serde_json::Value = serde_json::to_value(&record).unwrap();

        assert_eq!(json["packets_per_second"], 300.0);
        assert_eq!(json["unique_ips"], 4.0);
        assert_eq!(json["tcp_ratio"], 0.8);
        assert_eq!(json["top_ips"]["10.0.0.1"], 200);
        assert!(json["timestamp"].is_i64());
    }

    #[test]
    fn test_feature_map_rebuilds_vector() {
        let original = sample();
        let rebuilt = FeatureSnapshot::from_feature_map(&original.to_export_record().feature_map());
        assert_eq!(rebuilt.to_vector(), original.to_vector());
    }
}
