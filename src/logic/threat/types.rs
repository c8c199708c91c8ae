//! Threat Types
//!
//! Core types for threat verdicts.
//! No decision logic here - only data structures.

use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::logic::model::scorer::ScorerKind;

// ============================================================================
// THREAT LABEL
// ============================================================================

/// Closed set of threat kinds. Ordering is the declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatLabel {
    PortScan,
    #[serde(rename = "ddos")]
    VolumetricDdos,
    SynFlood,
    DataExfiltration,
    LatencyAnomaly,
    JitterAnomaly,
    PacketLoss,
    QosDegradation,
    MlHighRisk,
    MlCriticalRisk,
}

impl ThreatLabel {
    pub const ALL: [ThreatLabel; 10] = [
        ThreatLabel::PortScan,
        ThreatLabel::VolumetricDdos,
        ThreatLabel::SynFlood,
        ThreatLabel::DataExfiltration,
        ThreatLabel::LatencyAnomaly,
        ThreatLabel::JitterAnomaly,
        ThreatLabel::PacketLoss,
        ThreatLabel::QosDegradation,
        ThreatLabel::MlHighRisk,
        ThreatLabel::MlCriticalRisk,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatLabel::PortScan => "port_scan",
            ThreatLabel::VolumetricDdos => "ddos",
            ThreatLabel::SynFlood => "syn_flood",
            ThreatLabel::DataExfiltration => "data_exfiltration",
            ThreatLabel::LatencyAnomaly => "latency_anomaly",
            ThreatLabel::JitterAnomaly => "jitter_anomaly",
            ThreatLabel::PacketLoss => "packet_loss",
            ThreatLabel::QosDegradation => "qos_degradation",
            ThreatLabel::MlHighRisk => "ml_high_risk",
            ThreatLabel::MlCriticalRisk => "ml_critical_risk",
        }
    }

    /// Produced by the ensemble rather than a rule
    pub fn is_ml(&self) -> bool {
        matches!(self, ThreatLabel::MlHighRisk | ThreatLabel::MlCriticalRisk)
    }

    /// Stable index for per-label counters
    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl std::fmt::Display for ThreatLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// SCORER READINGS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreStatus {
    Ok,
    /// Untrained or not enough history yet
    NotReady,
    /// Numerical failure while scoring
    Failed,
    /// Turned off by configuration
    Disabled,
}

impl ScoreStatus {
    /// Only `Ok` readings take part in consensus
    pub fn is_available(&self) -> bool {
        *self == ScoreStatus::Ok
    }
}

/// One scorer's contribution to a verdict
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScorerReading {
    pub scorer: ScorerKind,
    pub score: f64,
    pub status: ScoreStatus,
}

impl ScorerReading {
    pub fn ok(scorer: ScorerKind, score: f64) -> Self {
        Self { scorer, score: score.clamp(0.0, 1.0), status: ScoreStatus::Ok }
    }

    /// Neutral reading (score 0) with a non-ok status
    pub fn neutral(scorer: ScorerKind, status: ScoreStatus) -> Self {
        Self { scorer, score: 0.0, status }
    }
}

// ============================================================================
// ENSEMBLE OUTCOME
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnsembleOutcome {
    /// Enough scorers agree: alert
    Positive,
    /// Exactly one scorer is high: review, no alert
    EdgeCase,
    Negative,
    /// No scorer could produce a reading
    Unknown,
}

impl EnsembleOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnsembleOutcome::Positive => "positive",
            EnsembleOutcome::EdgeCase => "edge_case",
            EnsembleOutcome::Negative => "negative",
            EnsembleOutcome::Unknown => "unknown",
        }
    }
}

// ============================================================================
// THREAT VERDICT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatVerdict {
    pub snapshot_id: Uuid,
    pub detected: bool,
    /// 0.0 - 1.0
    pub confidence: f64,
    pub threat_types: BTreeSet<ThreatLabel>,
    pub scores: Vec<ScorerReading>,
    pub ensemble: EnsembleOutcome,
    pub review_required: bool,
    pub attacking_ips: Vec<Ipv4Addr>,
    pub model_generation: u64,
    /// Close time of the evaluated window, so re-evaluation is reproducible
    pub window_closed_at: DateTime<Utc>,
}

impl ThreatVerdict {
    /// Fallback when evaluation could not finish in time
    pub fn unknown(snapshot_id: Uuid, window_closed_at: DateTime<Utc>) -> Self {
        Self {
            snapshot_id,
            detected: false,
            confidence: 0.0,
            threat_types: BTreeSet::new(),
            scores: Vec::new(),
            ensemble: EnsembleOutcome::Unknown,
            review_required: false,
            attacking_ips: Vec::new(),
            model_generation: 0,
            window_closed_at,
        }
    }

    pub fn score_of(&self, scorer: ScorerKind) -> Option<&ScorerReading> {
        self.scores.iter().find(|r| r.scorer == scorer)
    }

    /// Comma-joined label list for logs
    pub fn labels(&self) -> String {
        self.threat_types
            .iter()
            .map(|l| l.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }
}
