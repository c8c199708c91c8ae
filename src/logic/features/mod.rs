//! Features Module - Window aggregation and feature extraction
//!
//! Turns the per-packet event stream into fixed-interval Feature Snapshots.
//!
//! ## Structure
//! - `event`: inbound Event Record + validation
//! - `window`: mutable per-interval accumulator
//! - `qos`: latency statistics
//! - `snapshot`: immutable Feature Snapshot
//! - `layout`: versioned numeric feature layout
//! - `aggregator`: rollover and accounting

pub mod event;
pub mod qos;
pub mod layout;
pub mod window;
pub mod snapshot;
pub mod aggregator;

#[cfg(test)]
mod tests;

// Re-export common types
pub use event::{EventError, EventRecord, Protocol};
pub use layout::{FeatureVector, LayoutInfo, FEATURE_COUNT, FEATURE_LAYOUT};
pub use qos::QosSummary;
pub use snapshot::FeatureSnapshot;
pub use window::{Window, WindowLimits};
pub use aggregator::{AggregatorConfig, WindowAggregator};
