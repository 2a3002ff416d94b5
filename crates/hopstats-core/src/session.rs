//! A live aggregation session: one store, one scheduler, one lock.

use crate::scheduler::lock;
use crate::{
    AggregateStore, HopStatsResult, ProbeRecord, RenderScheduler, SchedulerConfig, Snapshot,
    SnapshotSink, SnapshotSource,
};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};
use uuid::Uuid;

type SharedStore = Arc<Mutex<AggregateStore>>;

/// Continuous-mode aggregation session.
///
/// Every store mutation runs under the scheduler lock and then the store
/// lock, in that order, so ingestion cannot interleave with a reset, stop or
/// completion. The scheduler takes the store lock only while holding its own.
pub struct Session<K: SnapshotSink> {
    store: SharedStore,
    scheduler: RenderScheduler<SharedStore, K>,
}

impl<K: SnapshotSink> Session<K> {
    /// Starts a session that emits snapshots into `sink`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(config: SchedulerConfig, sink: K) -> HopStatsResult<Self> {
        let store = Arc::new(Mutex::new(AggregateStore::new()));
        let scheduler = RenderScheduler::new(config, Arc::clone(&store), sink)?;
        let session = Self { store, scheduler };
        info!(
            session_id = %session.session_id(),
            min_interval_ms = config.min_interval_ms,
            "Started aggregation session"
        );
        Ok(session)
    }

    pub fn session_id(&self) -> Uuid {
        lock(&self.store).session_id()
    }

    /// True until the session completes or stops.
    pub fn is_active(&self) -> bool {
        !self.scheduler.is_closed()
    }

    /// Ingests one record and requests an emission.
    ///
    /// Returns false if the record was dropped, either because its hop
    /// distance is invalid or because the session is no longer active.
    pub fn ingest(&self, record: &ProbeRecord) -> bool {
        let Some(accepted) = self.scheduler.if_open(|| lock(&self.store).ingest(record)) else {
            debug!(hop = record.hop, "Session inactive, dropping record");
            return false;
        };
        if accepted {
            self.scheduler.notify();
        }
        accepted
    }

    /// Ingests a round of records under a single lock acquisition.
    pub fn ingest_batch(&self, records: &[ProbeRecord]) -> usize {
        let Some(accepted) = self
            .scheduler
            .if_open(|| lock(&self.store).ingest_batch(records))
        else {
            debug!(records = records.len(), "Session inactive, dropping batch");
            return 0;
        };
        if accepted > 0 {
            self.scheduler.notify();
        }
        accepted
    }

    /// Builds a snapshot now, bypassing the scheduler.
    pub fn snapshot(&self) -> Snapshot {
        self.store.build_snapshot()
    }

    /// Deep copy of the live store for previewing.
    pub fn preview(&self) -> AggregateStore {
        lock(&self.store).clone()
    }

    pub fn flush(&self, force: bool) {
        self.scheduler.flush(force);
    }

    pub fn cancel(&self) {
        self.scheduler.cancel();
    }

    pub fn scheduler(&self) -> &RenderScheduler<SharedStore, K> {
        &self.scheduler
    }

    /// Starts a new trace: clears every row and reopens the session.
    pub fn reset(&self) {
        let session_id = self.scheduler.reset_with(|| {
            let mut store = lock(&self.store);
            store.reset();
            store.session_id()
        });
        info!(session_id = %session_id, "Reset aggregation session");
    }

    /// Marks the trace complete: the final state is emitted at once and the
    /// session stops accepting records. Rows are kept.
    pub fn complete(&self) {
        if !self.scheduler.flush_and_close() {
            return;
        }
        info!(session_id = %self.session_id(), "Completed aggregation session");
    }

    /// Stops the session, discarding any pending emission and every row.
    pub fn stop(&self) {
        let session_id = self.scheduler.close_with(|| {
            let mut store = lock(&self.store);
            let id = store.session_id();
            store.reset();
            id
        });
        info!(session_id = %session_id, "Stopped aggregation session");
    }
}
