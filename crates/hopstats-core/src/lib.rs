//! Core aggregation engine for continuous (MTR-style) traceroute.
//!
//! This crate turns a stream of per-probe records into per-hop-path
//! statistics and hands them to a consumer at a bounded rate:
//!
//! - [`AggregateStore`] ingests [`ProbeRecord`]s and keeps one
//!   [`AggregateRow`] per grouping key
//! - [`merge_unknown_rows`] folds unresolved rows into the sole known path
//! - [`RenderScheduler`] coalesces change notifications into snapshots
//! - [`Session`] wires the store and the scheduler behind one lock
//! - [`group_attempts`] clusters a finished single trace by identity

pub mod config;
pub mod error;
pub mod grouper;
pub mod key;
pub mod merge;
pub mod row;
pub mod scheduler;
pub mod session;
pub mod store;
pub mod types;

pub use config::SchedulerConfig;
pub use error::{HopStatsError, HopStatsResult};
pub use grouper::{group_attempts, group_trace, AttemptGroup, AttemptIdentity, HopGroups};
pub use key::{resolve_key, HopKey};
pub use merge::merge_unknown_rows;
pub use row::AggregateRow;
pub use scheduler::{RenderScheduler, SnapshotSink, SnapshotSource};
pub use session::Session;
pub use store::AggregateStore;
pub use types::{FailureType, GeoInfo, HopStat, ProbeRecord, Snapshot};
