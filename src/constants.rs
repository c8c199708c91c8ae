//! Central Configuration Constants
//!
//! Single source of truth for all configuration defaults.
//! Every value here can be overridden at runtime, either through the JSON
//! config file or through the environment variables listed below.

// ============================================
// Window / ingestion
// ============================================

/// Default window duration (milliseconds)
pub const DEFAULT_WINDOW_DURATION_MS: u64 = 1_000;

/// Default bounded event queue capacity
pub const DEFAULT_EVENT_QUEUE_CAPACITY: usize = 65_536;

/// Cap on distinct source / destination addresses tracked per window
pub const DEFAULT_MAX_TRACKED_ADDRESSES: usize = 16_384;

/// Cap on latency samples kept per window
pub const DEFAULT_MAX_LATENCY_SAMPLES: usize = 1_000;

/// Number of top talkers reported per snapshot
pub const DEFAULT_TOP_N: usize = 5;

/// Smallest acceptable packet (bare IPv4 header)
pub const MIN_PACKET_SIZE: u32 = 20;

/// Largest acceptable packet (max IPv4 total length)
pub const MAX_PACKET_SIZE: u32 = 65_535;

// ============================================
// Export
// ============================================

/// Default export interval (milliseconds)
pub const DEFAULT_EXPORT_INTERVAL_MS: u64 = 2_000;

/// Default HTTP client timeout for export (milliseconds)
pub const DEFAULT_EXPORT_TIMEOUT_MS: u64 = 2_000;

/// Delivery attempts after the first failure
pub const DEFAULT_EXPORT_MAX_RETRIES: u32 = 3;

/// First backoff step (doubles every retry)
pub const DEFAULT_EXPORT_BACKOFF_MS: u64 = 100;

// ============================================
// Evaluation / training
// ============================================

/// Hard bound on one window evaluation (milliseconds)
pub const DEFAULT_EVALUATION_TIMEOUT_MS: u64 = 500;

/// Background retraining interval (milliseconds)
pub const DEFAULT_RETRAIN_INTERVAL_MS: u64 = 30_000;

/// Minimum high-confidence samples before a real retrain
pub const DEFAULT_MIN_TRAINING_SAMPLES: usize = 100;

/// Score at or above which a scorer counts as "high"
pub const DEFAULT_CONSENSUS_THRESHOLD: f64 = 0.7;

/// Packets per window above which a top source is reported as attacking
pub const DEFAULT_SUSPICIOUS_SOURCE_PACKETS: u64 = 100;

/// App version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// App name
pub const APP_NAME: &str = "FlowGuard";

// ============================================
// Environment variable names
// ============================================

pub const ENV_CONFIG_PATH: &str = "FLOWGUARD_CONFIG";
pub const ENV_WINDOW_DURATION_MS: &str = "WINDOW_DURATION_MS";
pub const ENV_EXPORT_INTERVAL_MS: &str = "EXPORT_INTERVAL_MS";
pub const ENV_EXPORT_URL: &str = "ML_DETECTOR_URL";
pub const ENV_RETRAIN_INTERVAL_MS: &str = "RETRAIN_INTERVAL_MS";
pub const ENV_MIN_TRAINING_SAMPLES: &str = "MIN_TRAINING_SAMPLES";
pub const ENV_CONSENSUS_THRESHOLD: &str = "CONSENSUS_THRESHOLD";
pub const ENV_TRAINING_ENABLED: &str = "TRAINING_ENABLED";
pub const ENV_EVENT_QUEUE_CAPACITY: &str = "EVENT_QUEUE_CAPACITY";
pub const ENV_EVALUATION_TIMEOUT_MS: &str = "EVALUATION_TIMEOUT_MS";

// ============================================
// Helper functions to read from env with fallback
// ============================================

/// Parse an env var, falling back to `default` when unset or invalid
pub fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

/// Read a boolean flag ("false"/"0" disable, anything else enables)
pub fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|s| s.to_lowercase() != "false" && s != "0")
        .unwrap_or(default)
}

/// Read an optional string value (empty counts as unset)
pub fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.trim().is_empty())
}
