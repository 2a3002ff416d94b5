//! Per-path aggregate rows and their derived statistics.

use crate::types::non_empty;
use crate::{FailureType, GeoInfo, HopStat, ProbeRecord};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Error kind recorded for a failed probe that did not report one.
pub const DEFAULT_ERROR_KIND: &str = "timeout";

/// Keys that would collide with structural property names on the consumer side.
pub const RESERVED_ERROR_KEYS: [&str; 3] = ["__proto__", "prototype", "constructor"];

/// Running statistics for one grouping key.
///
/// Every update is O(1); derived fields are recomputed from the counters
/// after each observation, never from history.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateRow {
    pub hop: u32,
    /// First non-empty address seen for this key.
    pub address: String,
    /// First non-empty host seen for this key.
    pub host: String,
    pub sent: u64,
    pub received: u64,
    pub loss_count: u64,
    pub loss_percent: f64,
    pub last_ms: f64,
    pub avg_ms: f64,
    pub best_ms: f64,
    pub worst_ms: f64,
    pub stdev_ms: f64,
    pub failure_type: FailureType,
    pub errors: BTreeMap<String, u64>,
    pub geo: Option<GeoInfo>,
    pub labels: BTreeSet<String>,

    // Internal accumulators, stripped from snapshots.
    sum_ms: f64,
    sum_sq_ms: f64,
    rtt_samples: u64,
    seq: u64,
}

impl AggregateRow {
    /// Creates an empty row; `seq` fixes its position among rows of the same hop.
    pub fn new(hop: u32, seq: u64) -> Self {
        Self {
            hop,
            seq,
            ..Default::default()
        }
    }

    /// Insertion-order sequence number.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Folds one observation into the counters and recomputes derived stats.
    pub fn observe(&mut self, record: &ProbeRecord) {
        self.sent += 1;

        if self.address.is_empty() {
            if let Some(address) = record.address() {
                self.address = address.to_string();
            }
        }
        if self.host.is_empty() {
            if let Some(host) = record.host() {
                self.host = host.to_string();
            }
        }

        if record.success {
            self.received += 1;
            let rtt = record.rtt();
            if rtt > 0.0 {
                self.last_ms = rtt;
                self.sum_ms += rtt;
                self.sum_sq_ms += rtt * rtt;
                self.rtt_samples += 1;
                if self.best_ms <= 0.0 || rtt < self.best_ms {
                    self.best_ms = rtt;
                }
                if rtt > self.worst_ms {
                    self.worst_ms = rtt;
                }
            }
        } else {
            let kind = non_empty(record.error.as_deref()).unwrap_or(DEFAULT_ERROR_KIND);
            match canonical_error_key(kind) {
                Some(key) => *self.errors.entry(key).or_insert(0) += 1,
                None => debug!(hop = self.hop, kind, "Rejected reserved error kind"),
            }
        }

        self.merge_geo(record);
        for label in &record.labels {
            let label = label.trim();
            if !label.is_empty() && !self.labels.contains(label) {
                self.labels.insert(label.to_string());
            }
        }

        self.recompute();
    }

    /// Recomputes loss, averages and failure classification from the counters.
    pub fn recompute(&mut self) {
        self.loss_count = self.sent.saturating_sub(self.received);
        self.loss_percent = loss_percent(self.sent, self.loss_count);
        self.avg_ms = if self.received > 0 && self.rtt_samples > 0 {
            self.sum_ms / self.rtt_samples as f64
        } else {
            0.0
        };
        self.stdev_ms = sample_stdev(self.sum_ms, self.sum_sq_ms, self.rtt_samples);
        self.failure_type = classify_failure(self.loss_count, self.received, &self.errors);
    }

    fn merge_geo(&mut self, record: &ProbeRecord) {
        let has_text = [
            &record.asn,
            &record.country,
            &record.province,
            &record.city,
            &record.district,
            &record.owner,
        ]
        .iter()
        .any(|field| non_empty(field.as_deref()).is_some());
        let has_coords = [record.lat, record.lng]
            .iter()
            .any(|c| matches!(c, Some(v) if v.is_finite() && *v != 0.0));
        if !has_text && !has_coords {
            return;
        }

        let geo = self.geo.get_or_insert_with(GeoInfo::default);
        overwrite(&mut geo.asn, &record.asn);
        overwrite(&mut geo.country, &record.country);
        overwrite(&mut geo.province, &record.province);
        overwrite(&mut geo.city, &record.city);
        overwrite(&mut geo.district, &record.district);
        overwrite(&mut geo.owner, &record.owner);
        if let Some(lat) = record.lat.filter(|v| v.is_finite()) {
            geo.lat = Some(lat);
        }
        if let Some(lng) = record.lng.filter(|v| v.is_finite()) {
            geo.lng = Some(lng);
        }
    }

    /// Consumer-facing copy with the internal accumulators stripped.
    pub fn to_stat(&self) -> HopStat {
        HopStat {
            hop: self.hop,
            address: self.address.clone(),
            host: self.host.clone(),
            sent: self.sent,
            received: self.received,
            loss_count: self.loss_count,
            loss_percent: self.loss_percent,
            last_ms: self.last_ms,
            avg_ms: self.avg_ms,
            best_ms: self.best_ms,
            worst_ms: self.worst_ms,
            stdev_ms: self.stdev_ms,
            geo: self.geo.clone(),
            failure_type: self.failure_type,
            errors: if self.errors.is_empty() {
                None
            } else {
                Some(self.errors.clone())
            },
            labels: self.labels.iter().cloned().collect(),
        }
    }
}

fn overwrite(slot: &mut Option<String>, value: &Option<String>) {
    if let Some(v) = non_empty(value.as_deref()) {
        *slot = Some(v.to_string());
    }
}

/// Canonicalizes a free-text error kind, rejecting blank and reserved keys.
pub fn canonical_error_key(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || RESERVED_ERROR_KEYS.contains(&trimmed) {
        return None;
    }
    Some(trimmed.to_string())
}

pub fn loss_percent(sent: u64, loss_count: u64) -> f64 {
    if sent == 0 {
        return 0.0;
    }
    loss_count as f64 / sent as f64 * 100.0
}

/// Classifies the losses of a row.
///
/// An empty error tally counts as timeout-only.
pub fn classify_failure(
    loss_count: u64,
    received: u64,
    errors: &BTreeMap<String, u64>,
) -> FailureType {
    if loss_count == 0 {
        return FailureType::None;
    }
    let only_timeouts = errors
        .keys()
        .all(|k| k.to_lowercase().contains(DEFAULT_ERROR_KIND));
    match (only_timeouts, received) {
        (true, 0) => FailureType::AllTimeout,
        (true, _) => FailureType::PartialTimeout,
        (false, _) => FailureType::Mixed,
    }
}

// Sample standard deviation: sqrt((Σx² - (Σx)²/n) / (n-1)).
fn sample_stdev(sum: f64, sum_sq: f64, n: u64) -> f64 {
    if n < 2 {
        return 0.0;
    }
    let n = n as f64;
    let variance = (sum_sq - (sum * sum) / n) / (n - 1.0);
    if variance > 0.0 {
        variance.sqrt()
    } else {
        0.0
    }
}
