//! tokenwatch-metrics: the current gauge snapshot and its exposition.
//!
//! Holds the latest value of every published gauge and renders it in the
//! Prometheus text exposition format.
//!
//! # Architecture
//!
//! ```text
//! SnapshotStore
//!   ├── gauge_vec() → GaugeVec handle for one registered family
//!   ├── publish()   ← called by the collection cycle
//!   └── snapshot()  → Snapshot read by the /metrics handler
//!
//! Prometheus exposition
//!   └── render_prometheus() → text/plain for /metrics endpoint
//! ```

pub mod prometheus;
pub mod store;

pub use prometheus::{CONTENT_TYPE, render_prometheus};
pub use store::{GaugeDesc, GaugeVec, MetricKey, PublishError, Sample, Snapshot, SnapshotStore};
