//! Export Module - Outbound snapshot delivery
//!
//! - `record` - flat wire form of a snapshot
//! - `client` - sink trait and the HTTP sink
//! - `sync` - bounded queue, retry loop and window schedule

pub mod client;
pub mod record;
pub mod sync;

pub use client::{ExportError, HttpSink, SnapshotSink};
pub use record::ExportRecord;
pub use sync::{deliver_with_retry, run_export_loop, ExportConfig, ExportSchedule};
