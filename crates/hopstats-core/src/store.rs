//! Live aggregate store: record ingestion and snapshot building.

use crate::key::resolve_key;
use crate::merge::merge_unknown_rows;
use crate::{AggregateRow, HopKey, HopStat, ProbeRecord, Snapshot};
use std::collections::HashMap;
use tracing::{debug, trace};
use uuid::Uuid;

/// Arena of aggregate rows for one session.
///
/// Rows are addressed by [`HopKey`]; two secondary indices map a bound
/// address and a bound (lowercased) host back to the owning key.
#[derive(Debug, Clone)]
pub struct AggregateStore {
    session_id: Uuid,
    rows: HashMap<HopKey, AggregateRow>,
    by_address: HashMap<(u32, String), HopKey>,
    by_host: HashMap<(u32, String), HopKey>,
    next_seq: u64,
    iteration: u64,
}

impl Default for AggregateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AggregateStore {
    pub fn new() -> Self {
        Self {
            session_id: Uuid::new_v4(),
            rows: HashMap::new(),
            by_address: HashMap::new(),
            by_host: HashMap::new(),
            next_seq: 0,
            iteration: 0,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Highest iteration counter seen in this session.
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, key: &HopKey) -> Option<&AggregateRow> {
        self.rows.get(key)
    }

    /// Finds the row bound to `address` at `hop`.
    ///
    /// The first row to bind an address keeps the entry.
    pub fn find_by_address(&self, hop: u32, address: &str) -> Option<&AggregateRow> {
        self.by_address
            .get(&(hop, address.trim().to_string()))
            .and_then(|key| self.rows.get(key))
    }

    /// Finds the row bound to `host` at `hop`, case-insensitively.
    ///
    /// The first row to bind a host keeps the entry. An address-keyed row
    /// that reported the host first therefore still answers after a
    /// host-only row for the same name is created.
    pub fn find_by_host(&self, hop: u32, host: &str) -> Option<&AggregateRow> {
        self.by_host
            .get(&(hop, host.trim().to_lowercase()))
            .and_then(|key| self.rows.get(key))
    }

    /// Ingests one observation. Returns false if the record was dropped.
    ///
    /// No deduplication is performed: each call is one more probe.
    pub fn ingest(&mut self, record: &ProbeRecord) -> bool {
        let Some(key) = resolve_key(record) else {
            debug!(hop = record.hop, "Dropping record with invalid hop distance");
            return false;
        };

        let next_seq = &mut self.next_seq;
        let row = self.rows.entry(key.clone()).or_insert_with(|| {
            let seq = *next_seq;
            *next_seq += 1;
            trace!(key = %key, seq, "Creating aggregate row");
            AggregateRow::new(key.hop(), seq)
        });
        row.observe(record);

        let hop = row.hop;
        if !row.address.is_empty() {
            self.by_address
                .entry((hop, row.address.clone()))
                .or_insert_with(|| key.clone());
        }
        if !row.host.is_empty() {
            self.by_host
                .entry((hop, row.host.to_lowercase()))
                .or_insert_with(|| key.clone());
        }

        self.iteration = self.iteration.max(record.iteration);
        trace!(
            key = %key,
            success = record.success,
            iteration = record.iteration,
            "Ingested record"
        );
        true
    }

    /// Ingests a batch of records, returning how many were accepted.
    pub fn ingest_batch<'a, I>(&mut self, records: I) -> usize
    where
        I: IntoIterator<Item = &'a ProbeRecord>,
    {
        records
            .into_iter()
            .filter(|record| self.ingest(record))
            .count()
    }

    /// Rows ordered by hop distance, then by first appearance, internals stripped.
    pub fn ordered_stats(&self) -> Vec<HopStat> {
        let mut rows: Vec<&AggregateRow> = self.rows.values().collect();
        rows.sort_by_key(|row| (row.hop, row.seq()));
        rows.into_iter().map(AggregateRow::to_stat).collect()
    }

    /// Builds the consumer-facing snapshot: ordered rows with unknown
    /// rows folded into the sole known path of their hop.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            session_id: self.session_id,
            iteration: self.iteration,
            stats: merge_unknown_rows(self.ordered_stats()),
        }
    }

    /// Clears every row and starts a new session identity.
    pub fn reset(&mut self) {
        debug!(session_id = %self.session_id, rows = self.rows.len(), "Resetting aggregate store");
        *self = Self::new();
    }
}
