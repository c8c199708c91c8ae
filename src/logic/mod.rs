//! Logic Module - Pipeline components
//!
//! ## Architecture
//! - `collector` - bounded event queue and the ingestion thread
//! - `features/` - windows, QoS statistics, Feature Snapshots
//! - `threat/` - rule table, verdict types, decision combination
//! - `model/` - anomaly scorers, consensus, model generations
//! - `training/` - confidence weighting, sample windows, retraining
//! - `engine` - detection facade
//! - `export/` - outbound snapshot delivery
//! - `metrics` - process-wide counters
//! - `config` - configuration tree
//! - `analysis_loop` - the running lanes

// Ingestion
pub mod collector;
pub mod features;

// Detection
pub mod threat;
pub mod model;
pub mod engine;

// Learning
pub mod training;

// Plumbing
pub mod export;
pub mod metrics;
pub mod config;
pub mod analysis_loop;
