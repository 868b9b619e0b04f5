//! tokenwatch-collector: turns eduMFA database state into gauge values.
//!
//! # Architecture
//!
//! ```text
//! Scheduler
//!   ├── start() → runs one cycle, then spawns the recurring loop
//!   └── Job::run() every tick until shutdown
//!
//! Collector (one cycle)
//!   ├── Store::open() → Session (one connection per cycle)
//!   ├── Session::fetch(query) → Vec<RawRow>        for each of QUERIES
//!   ├── derive() → Vec<Assignment>
//!   └── GaugeVec::set() → SnapshotStore
//! ```
//!
//! A failing cycle stops at the failing query. Everything published by the
//! earlier queries of that cycle stays visible; everything else keeps its
//! value from the previous cycle.

pub mod collector;
pub mod derive;
pub mod error;
pub mod query;
pub mod row;
pub mod scheduler;
pub mod sql;
pub mod store;

#[cfg(test)]
mod test_support;

pub use collector::{CycleReport, Collector, gauge_families};
pub use derive::{Assignment, Gauge};
pub use error::{CollectionError, DecodeError};
pub use query::{QUERIES, Query, QueryKind};
pub use row::{RawRow, RawValue};
pub use scheduler::{CadenceError, Job, Scheduler, parse_cadence};
pub use sql::SqlStore;
pub use store::{Session, Store};
