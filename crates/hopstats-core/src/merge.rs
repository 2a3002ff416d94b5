//! Folding of unresolved rows into the sole known path of a hop.
//!
//! With exactly one known path at a hop, an anonymous loss is almost
//! certainly that path failing to answer, so it is charged to it. With two
//! or more known paths there is no safe attribution and the unknown rows
//! are left standing.

use crate::row::{canonical_error_key, classify_failure, loss_percent};
use crate::{FailureType, HopStat};
use std::collections::{BTreeMap, HashSet};
use tracing::trace;

#[derive(Default)]
struct HopGroup {
    known: Vec<usize>,
    unknown: Vec<usize>,
}

/// Merges unknown rows into the single known row of their hop.
///
/// The input order is preserved for every row that survives.
pub fn merge_unknown_rows(mut rows: Vec<HopStat>) -> Vec<HopStat> {
    let mut groups: BTreeMap<u32, HopGroup> = BTreeMap::new();
    for (idx, row) in rows.iter().enumerate() {
        let group = groups.entry(row.hop).or_default();
        if row.is_known() {
            group.known.push(idx);
        } else {
            group.unknown.push(idx);
        }
    }

    let mut merged = HashSet::new();
    for (hop, group) in &groups {
        if group.known.len() != 1 || group.unknown.is_empty() {
            continue;
        }

        let mut sent = 0;
        let mut loss = 0;
        let mut errors: BTreeMap<String, u64> = BTreeMap::new();
        let mut failure = FailureType::None;
        for &idx in &group.unknown {
            let unknown = &rows[idx];
            sent += unknown.sent;
            loss += unknown.loss_count;
            fold_errors(&mut errors, unknown.errors.as_ref());
            failure = failure.most_severe(unknown.failure_type);
        }

        let primary = &mut rows[group.known[0]];
        primary.sent += sent;
        primary.loss_count += loss;
        primary.received = primary.sent.saturating_sub(primary.loss_count);
        primary.loss_percent = loss_percent(primary.sent, primary.loss_count);

        let mut combined = BTreeMap::new();
        fold_errors(&mut combined, primary.errors.as_ref());
        fold_errors(&mut combined, Some(&errors));
        let recomputed = classify_failure(primary.loss_count, primary.received, &combined);
        primary.failure_type = primary
            .failure_type
            .most_severe(failure)
            .most_severe(recomputed);
        primary.errors = if combined.is_empty() {
            None
        } else {
            Some(combined)
        };

        trace!(
            hop,
            unknown_rows = group.unknown.len(),
            sent = primary.sent,
            loss = primary.loss_count,
            "Merged unknown rows into sole known path"
        );
        merged.extend(group.unknown.iter().copied());
    }

    rows.into_iter()
        .enumerate()
        .filter(|(idx, _)| !merged.contains(idx))
        .map(|(_, row)| row)
        .collect()
}

fn fold_errors(target: &mut BTreeMap<String, u64>, source: Option<&BTreeMap<String, u64>>) {
    let Some(source) = source else {
        return;
    };
    for (key, count) in source {
        if let Some(key) = canonical_error_key(key) {
            *target.entry(key).or_insert(0) += count;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stat(hop: u32, address: &str, sent: u64, loss: u64, failure: FailureType) -> HopStat {
        let mut errors = BTreeMap::new();
        if loss > 0 {
            errors.insert("timeout".to_string(), loss);
        }
        HopStat {
            hop,
            address: address.to_string(),
            sent,
            received: sent - loss,
            loss_count: loss,
            loss_percent: loss_percent(sent, loss),
            failure_type: failure,
            errors: if errors.is_empty() { None } else { Some(errors) },
            ..Default::default()
        }
    }

    #[test]
    fn test_single_known_absorbs_unknown() {
        let rows = vec![
            stat(1, "", 3, 3, FailureType::AllTimeout),
            stat(1, "1.1.1.1", 1, 0, FailureType::None),
        ];
        let out = merge_unknown_rows(rows);
        assert_eq!(out.len(), 1);
        let row = &out[0];
        assert_eq!(row.address, "1.1.1.1");
        assert_eq!(row.sent, 4);
        assert_eq!(row.loss_count, 3);
        assert_eq!(row.received, 1);
        assert!((row.loss_percent - 75.0).abs() < 1e-9);
        assert_eq!(row.failure_type, FailureType::AllTimeout);
        assert_eq!(row.errors.as_ref().unwrap().get("timeout"), Some(&3));
    }

    #[test]
    fn test_host_only_row_counts_as_known() {
        let mut known = stat(2, "", 2, 0, FailureType::None);
        known.host = "edge.example".into();
        let rows = vec![known, stat(2, "", 1, 1, FailureType::AllTimeout)];
        let out = merge_unknown_rows(rows);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].sent, 3);
    }

    #[test]
    fn test_multipath_leaves_unknown_standing() {
        let rows = vec![
            stat(2, "", 2, 2, FailureType::AllTimeout),
            stat(2, "2.2.2.2", 3, 0, FailureType::None),
            stat(2, "2.2.2.3", 4, 0, FailureType::None),
        ];
        let out = merge_unknown_rows(rows.clone());
        assert_eq!(out, rows);
    }

    #[test]
    fn test_unknown_only_hop_is_untouched() {
        let rows = vec![stat(5, "", 4, 4, FailureType::AllTimeout)];
        assert_eq!(merge_unknown_rows(rows.clone()), rows);
    }

    #[test]
    fn test_merge_is_scoped_per_hop() {
        let rows = vec![
            stat(1, "1.1.1.1", 2, 0, FailureType::None),
            stat(2, "", 1, 1, FailureType::AllTimeout),
            stat(3, "3.3.3.3", 2, 0, FailureType::None),
            stat(3, "", 2, 2, FailureType::AllTimeout),
        ];
        let out = merge_unknown_rows(rows);
        let hops: Vec<_> = out.iter().map(|r| (r.hop, r.sent)).collect();
        assert_eq!(hops, vec![(1, 2), (2, 1), (3, 4)]);
    }

    #[test]
    fn test_mixed_errors_are_summed_and_sanitized() {
        let mut known = stat(1, "1.1.1.1", 2, 1, FailureType::PartialTimeout);
        known
            .errors
            .as_mut()
            .unwrap()
            .insert("__proto__".to_string(), 9);
        let mut unknown = stat(1, "", 1, 1, FailureType::Mixed);
        unknown.errors = Some(BTreeMap::from([("unreachable".to_string(), 1)]));
        let out = merge_unknown_rows(vec![known, unknown]);
        let errors = out[0].errors.as_ref().unwrap();
        assert_eq!(errors.get("timeout"), Some(&1));
        assert_eq!(errors.get("unreachable"), Some(&1));
        assert!(!errors.contains_key("__proto__"));
        assert_eq!(out[0].failure_type, FailureType::PartialTimeout);
    }
}
