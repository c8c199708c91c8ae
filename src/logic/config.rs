//! Engine Configuration
//!
//! One serde tree for the whole pipeline. Resolution order:
//! built-in defaults, then the JSON file named by `FLOWGUARD_CONFIG`,
//! then individual environment overrides. The result is validated once
//! before anything starts.

use std::path::Path;
use std::time::Duration;
use serde::{Deserialize, Serialize};

use crate::constants::{
    self, DEFAULT_EVALUATION_TIMEOUT_MS, DEFAULT_EVENT_QUEUE_CAPACITY, DEFAULT_RETRAIN_INTERVAL_MS,
    DEFAULT_SUSPICIOUS_SOURCE_PACKETS, DEFAULT_WINDOW_DURATION_MS, MAX_PACKET_SIZE, MIN_PACKET_SIZE,
};
use crate::logic::engine::EngineParts;
use crate::logic::export::ExportConfig;
use crate::logic::features::{AggregatorConfig, WindowLimits};
use crate::logic::model::EnsembleConfig;
use crate::logic::threat::RuleThresholds;
use crate::logic::training::{ConfidenceConfig, CuratorConfig, RetrainerConfig};

// ============================================================================
// CONFIG TREE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub enabled: bool,
    pub interval_ms: u64,
    pub retrainer: RetrainerConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: DEFAULT_RETRAIN_INTERVAL_MS,
            retrainer: RetrainerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub window_duration_ms: u64,
    pub event_queue_capacity: usize,
    pub limits: WindowLimits,
    pub min_packet_size: u32,
    pub max_packet_size: u32,
    /// Hard bound on one window evaluation
    pub evaluation_timeout_ms: u64,
    /// Top sources above this many packets are reported as attacking
    pub suspicious_source_packets: u64,

    pub rules: RuleThresholds,
    pub ensemble: EnsembleConfig,
    pub curator: CuratorConfig,
    pub confidence: ConfidenceConfig,
    pub training: TrainingConfig,
    pub export: ExportConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            window_duration_ms: DEFAULT_WINDOW_DURATION_MS,
            event_queue_capacity: DEFAULT_EVENT_QUEUE_CAPACITY,
            limits: WindowLimits::default(),
            min_packet_size: MIN_PACKET_SIZE,
            max_packet_size: MAX_PACKET_SIZE,
            evaluation_timeout_ms: DEFAULT_EVALUATION_TIMEOUT_MS,
            suspicious_source_packets: DEFAULT_SUSPICIOUS_SOURCE_PACKETS,
            rules: RuleThresholds::default(),
            ensemble: EnsembleConfig::default(),
            curator: CuratorConfig::default(),
            confidence: ConfidenceConfig::default(),
            training: TrainingConfig::default(),
            export: ExportConfig::default(),
        }
    }
}

// ============================================================================
// LOADING
// ============================================================================

impl EngineConfig {
    /// Defaults, optional config file, env overrides, validation
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match constants::env_string(constants::ENV_CONFIG_PATH) {
            Some(path) => {
                log::info!("Loading configuration from {}", path);
                Self::from_file(&path)?
            }
            None => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Missing keys keep their defaults
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Apply environment overrides; unparsable values are ignored
    pub fn apply_env(&mut self) {
        use constants::*;

        self.window_duration_ms = env_or(ENV_WINDOW_DURATION_MS, self.window_duration_ms);
        self.event_queue_capacity = env_or(ENV_EVENT_QUEUE_CAPACITY, self.event_queue_capacity);
        self.evaluation_timeout_ms = env_or(ENV_EVALUATION_TIMEOUT_MS, self.evaluation_timeout_ms);
        self.export.interval_ms = env_or(ENV_EXPORT_INTERVAL_MS, self.export.interval_ms);
        if let Some(url) = env_string(ENV_EXPORT_URL) {
            self.export.url = Some(url);
        }
        self.training.interval_ms = env_or(ENV_RETRAIN_INTERVAL_MS, self.training.interval_ms);
        self.training.retrainer.min_samples = env_or(ENV_MIN_TRAINING_SAMPLES, self.training.retrainer.min_samples);
        self.training.enabled = env_flag(ENV_TRAINING_ENABLED, self.training.enabled);
        self.ensemble.consensus.high_threshold =
            env_or(ENV_CONSENSUS_THRESHOLD, self.ensemble.consensus.high_threshold);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.window_duration_ms == 0 {
            return invalid("window_duration_ms must be positive".into());
        }
        if self.event_queue_capacity == 0 {
            return invalid("event_queue_capacity must be positive".into());
        }
        if self.evaluation_timeout_ms == 0 {
            return invalid("evaluation_timeout_ms must be positive".into());
        }
        if self.min_packet_size > self.max_packet_size {
            return invalid(format!(
                "min_packet_size {} exceeds max_packet_size {}",
                self.min_packet_size, self.max_packet_size
            ));
        }
        if self.limits.max_tracked_sources == 0 || self.limits.max_tracked_destinations == 0 {
            return invalid("address caps must be positive".into());
        }
        self.rules.validate().map_err(ConfigError::Invalid)?;

        let consensus = &self.ensemble.consensus;
        if !(0.0..=1.0).contains(&consensus.high_threshold) || !(0.0..=1.0).contains(&consensus.critical_threshold) {
            return invalid("consensus thresholds must be within [0, 1]".into());
        }
        if consensus.min_agreement == 0 {
            return invalid("consensus min_agreement must be at least 1".into());
        }
        if !(0.0..=1.0).contains(&self.curator.high_confidence_min_weight) {
            return invalid("curator high_confidence_min_weight must be within [0, 1]".into());
        }
        if self.training.enabled && self.training.interval_ms == 0 {
            return invalid("training interval_ms must be positive".into());
        }
        if let Some(url) = &self.export.url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return invalid(format!("export url must be http(s), got {}", url));
            }
            if self.export.interval_ms == 0 {
                return invalid("export interval_ms must be positive".into());
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Views for the components
    // ------------------------------------------------------------------------

    pub fn window_duration(&self) -> Duration {
        Duration::from_millis(self.window_duration_ms)
    }

    pub fn evaluation_timeout(&self) -> Duration {
        Duration::from_millis(self.evaluation_timeout_ms)
    }

    pub fn retrain_interval(&self) -> Duration {
        Duration::from_millis(self.training.interval_ms)
    }

    pub fn aggregator_config(&self) -> AggregatorConfig {
        AggregatorConfig {
            window_duration: self.window_duration(),
            limits: self.limits,
            min_packet_size: self.min_packet_size,
            max_packet_size: self.max_packet_size,
        }
    }

    pub fn engine_parts(&self) -> EngineParts {
        EngineParts {
            rules: self.rules.clone(),
            ensemble: self.ensemble.clone(),
            curator: self.curator.clone(),
            confidence: self.confidence.clone(),
            retrainer: self.training.retrainer.clone(),
            suspicious_source_packets: Some(self.suspicious_source_packets),
        }
    }
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(String),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "Cannot read config: {}", e),
            Self::Parse(e) => write!(f, "Cannot parse config: {}", e),
            Self::Invalid(e) => write!(f, "Invalid config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(e.to_string())
    }
}
