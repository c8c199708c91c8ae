//! Feature Layout - Centralized Feature Definition
//!
//! **This file controls the numeric feature schema used by every scorer**
//!
//! ## Rules:
//! 1. Add feature → increment FEATURE_VERSION
//! 2. Change order → increment FEATURE_VERSION
//! 3. Remove feature → increment FEATURE_VERSION
//!
//! Fitted model generations remember the layout hash they were trained
//! against, so a layout change can never silently feed a stale model.

use crc32fast::Hasher;
use serde::{Deserialize, Serialize};

// ============================================================================
// FEATURE VERSION
// ============================================================================

/// Current feature layout version
pub const FEATURE_VERSION: u8 = 1;

// ============================================================================
// FEATURE LAYOUT (Authoritative source)
// ============================================================================

/// Feature names in exact order they appear in the vector
pub const FEATURE_LAYOUT: &[&str] = &[
    // === Volume (0-1) ===
    "packets_per_second",    // 0
    "bytes_per_second",      // 1

    // === Diversity (2-3) ===
    "unique_ips",            // 2: distinct sources
    "unique_ports",          // 3: distinct destination ports

    // === Transport (4-5) ===
    "tcp_ratio",             // 4: tcp / (tcp + udp)
    "syn_packets",           // 5

    // === QoS (6-8) ===
    "avg_latency_ms",        // 6
    "jitter_ms",             // 7
    "packet_loss_rate",      // 8
];

/// Total number of features
pub const FEATURE_COUNT: usize = 9;

/// Fixed-size numeric feature vector
pub type FeatureVector = [f64; FEATURE_COUNT];

// ============================================================================
// LAYOUT HASH
// ============================================================================

/// Compute CRC32 hash of the feature layout
pub fn compute_layout_hash() -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(&[FEATURE_VERSION]);

    for name in FEATURE_LAYOUT {
        hasher.update(name.as_bytes());
        hasher.update(&[0]);
    }

    hasher.finalize()
}

/// Get layout hash
pub fn layout_hash() -> u32 {
    compute_layout_hash()
}

// ============================================================================
// LAYOUT INFO
// ============================================================================

/// Layout information attached to model generations and logs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutInfo {
    pub version: u8,
    pub hash: u32,
    pub feature_count: usize,
}

impl LayoutInfo {
    pub fn current() -> Self {
        Self {
            version: FEATURE_VERSION,
            hash: layout_hash(),
            feature_count: FEATURE_COUNT,
        }
    }

    pub fn is_current(&self) -> bool {
        *self == Self::current()
    }
}

impl Default for LayoutInfo {
    fn default() -> Self {
        Self::current()
    }
}

// ============================================================================
// FEATURE INDEX LOOKUP
// ============================================================================

/// Get feature index by name (O(n) but features are few)
pub fn feature_index(name: &str) -> Option<usize> {
    FEATURE_LAYOUT.iter().position(|&n| n == name)
}

/// Get feature name by index
pub fn feature_name(index: usize) -> Option<&'static str> {
    FEATURE_LAYOUT.get(index).copied()
}
