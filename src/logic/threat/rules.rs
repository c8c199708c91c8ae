//! Threat Rules & Thresholds
//!
//! Declarative rule table over the aggregated window features.
//! Each rule is an independent predicate; none depends on another's result.

use serde::{Deserialize, Serialize};

use super::types::ThreatLabel;
use crate::logic::features::FeatureSnapshot;

// ============================================================================
// RULE CONFIDENCE
// ============================================================================

pub const PORT_SCAN_CONFIDENCE: f64 = 0.90;
pub const DDOS_CONFIDENCE: f64 = 0.95;
pub const SYN_FLOOD_CONFIDENCE: f64 = 0.92;
pub const DATA_EXFILTRATION_CONFIDENCE: f64 = 0.85;
pub const LATENCY_ANOMALY_CONFIDENCE: f64 = 0.85;
pub const JITTER_ANOMALY_CONFIDENCE: f64 = 0.80;
pub const PACKET_LOSS_CONFIDENCE: f64 = 0.88;
pub const QOS_DEGRADATION_CONFIDENCE: f64 = 0.90;

// ============================================================================
// CONFIGURABLE THRESHOLDS (for runtime adjustment)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleThresholds {
    /// Distinct destination ports (strictly greater)
    pub port_scan_ports: u64,
    pub port_scan_pps: f64,

    pub ddos_pps: f64,
    pub ddos_bps: f64,

    pub syn_flood_packets: u64,
    /// SYN / TCP ratio
    pub syn_flood_ratio: f64,

    pub exfil_bps: f64,
    pub exfil_tcp_ratio: f64,
    /// At most this many distinct destinations
    pub exfil_max_destinations: u64,

    /// Both the max and the average latency must exceed their limits
    pub latency_max_ms: f64,
    pub latency_avg_ms: f64,
    pub jitter_anomaly_ms: f64,
    pub packet_loss_rate: f64,

    /// Any one of these flags general degradation
    pub qos_jitter_ms: f64,
    pub qos_loss_rate: f64,
    pub qos_latency_ms: f64,
}

impl Default for RuleThresholds {
    fn default() -> Self {
        Self {
            port_scan_ports: 20,
            port_scan_pps: 100.0,
            ddos_pps: 1_000.0,
            ddos_bps: 1_000_000.0,
            syn_flood_packets: 500,
            syn_flood_ratio: 0.8,
            exfil_bps: 5_000_000.0,
            exfil_tcp_ratio: 0.9,
            exfil_max_destinations: 3,
            latency_max_ms: 100.0,
            latency_avg_ms: 50.0,
            jitter_anomaly_ms: 10.0,
            packet_loss_rate: 0.05,
            qos_jitter_ms: 10.0,
            qos_loss_rate: 0.05,
            qos_latency_ms: 50.0,
        }
    }
}

impl RuleThresholds {
    /// Reject values no rule could sensibly use
    pub fn validate(&self) -> Result<(), String> {
        let rates = [
            ("port_scan_pps", self.port_scan_pps),
            ("ddos_pps", self.ddos_pps),
            ("ddos_bps", self.ddos_bps),
            ("exfil_bps", self.exfil_bps),
            ("latency_max_ms", self.latency_max_ms),
            ("latency_avg_ms", self.latency_avg_ms),
            ("jitter_anomaly_ms", self.jitter_anomaly_ms),
            ("qos_jitter_ms", self.qos_jitter_ms),
            ("qos_latency_ms", self.qos_latency_ms),
        ];
        for (name, v) in rates {
            if !v.is_finite() || v < 0.0 {
                return Err(format!("{} must be a non-negative number, got {}", name, v));
            }
        }
        let ratios = [
            ("syn_flood_ratio", self.syn_flood_ratio),
            ("exfil_tcp_ratio", self.exfil_tcp_ratio),
            ("packet_loss_rate", self.packet_loss_rate),
            ("qos_loss_rate", self.qos_loss_rate),
        ];
        for (name, v) in ratios {
            if !(0.0..=1.0).contains(&v) {
                return Err(format!("{} must be within [0, 1], got {}", name, v));
            }
        }
        Ok(())
    }
}

// ============================================================================
// RULE TABLE
// ============================================================================

/// One named predicate with its confidence
#[derive(Clone, Copy)]
pub struct Rule {
    pub label: ThreatLabel,
    pub confidence: f64,
    pub matches: fn(&FeatureSnapshot, &RuleThresholds) -> bool,
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("label", &self.label)
            .field("confidence", &self.confidence)
            .finish()
    }
}

fn port_scan(s: &FeatureSnapshot, t: &RuleThresholds) -> bool {
    s.unique_ports > t.port_scan_ports && s.packets_per_second > t.port_scan_pps
}

fn ddos(s: &FeatureSnapshot, t: &RuleThresholds) -> bool {
    s.packets_per_second > t.ddos_pps && s.bytes_per_second > t.ddos_bps
}

fn syn_flood(s: &FeatureSnapshot, t: &RuleThresholds) -> bool {
    s.syn_packets > t.syn_flood_packets && s.syn_ratio() > t.syn_flood_ratio
}

fn data_exfiltration(s: &FeatureSnapshot, t: &RuleThresholds) -> bool {
    s.bytes_per_second > t.exfil_bps
        && s.tcp_ratio() > t.exfil_tcp_ratio
        && s.unique_destinations <= t.exfil_max_destinations
}

fn latency_anomaly(s: &FeatureSnapshot, t: &RuleThresholds) -> bool {
    s.max_latency_ms > t.latency_max_ms && s.avg_latency_ms > t.latency_avg_ms
}

fn jitter_anomaly(s: &FeatureSnapshot, t: &RuleThresholds) -> bool {
    s.jitter_ms > t.jitter_anomaly_ms
}

fn packet_loss(s: &FeatureSnapshot, t: &RuleThresholds) -> bool {
    s.packet_loss_rate > t.packet_loss_rate
}

fn qos_degradation(s: &FeatureSnapshot, t: &RuleThresholds) -> bool {
    s.jitter_ms > t.qos_jitter_ms
        || s.packet_loss_rate > t.qos_loss_rate
        || s.avg_latency_ms > t.qos_latency_ms
}

pub const RULES: &[Rule] = &[
    Rule { label: ThreatLabel::PortScan, confidence: PORT_SCAN_CONFIDENCE, matches: port_scan },
    Rule { label: ThreatLabel::VolumetricDdos, confidence: DDOS_CONFIDENCE, matches: ddos },
    Rule { label: ThreatLabel::SynFlood, confidence: SYN_FLOOD_CONFIDENCE, matches: syn_flood },
    Rule { label: ThreatLabel::DataExfiltration, confidence: DATA_EXFILTRATION_CONFIDENCE, matches: data_exfiltration },
    Rule { label: ThreatLabel::LatencyAnomaly, confidence: LATENCY_ANOMALY_CONFIDENCE, matches: latency_anomaly },
    Rule { label: ThreatLabel::JitterAnomaly, confidence: JITTER_ANOMALY_CONFIDENCE, matches: jitter_anomaly },
    Rule { label: ThreatLabel::PacketLoss, confidence: PACKET_LOSS_CONFIDENCE, matches: packet_loss },
    Rule { label: ThreatLabel::QosDegradation, confidence: QOS_DEGRADATION_CONFIDENCE, matches: qos_degradation },
];

/// Confidence of a rule label, `None` for ensemble labels
pub fn rule_confidence(label: ThreatLabel) -> Option<f64> {
    RULES.iter().find(|r| r.label == label).map(|r| r.confidence)
}
