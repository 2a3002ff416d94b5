//! One-shot grouping of a finished trace.
//!
//! Unlike the live store, a single trace is a complete, ordered list, so
//! unidentified attempts are attributed by position: they join the group
//! of the attempt before them, or the first group created after them.

use crate::key::valid_hop;
use crate::types::non_empty;
use crate::{AggregateRow, HopStat, ProbeRecord};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Identity fields the grouper clusters on.
pub trait AttemptIdentity {
    fn address(&self) -> Option<&str>;
    fn host(&self) -> Option<&str>;
}

impl AttemptIdentity for ProbeRecord {
    fn address(&self) -> Option<&str> {
        ProbeRecord::address(self)
    }

    fn host(&self) -> Option<&str> {
        ProbeRecord::host(self)
    }
}

/// Attempts sharing an address or host.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptGroup<A> {
    /// First address seen in the group.
    pub address: String,
    /// First host seen in the group, blank when it merely repeats the address.
    pub host: String,
    pub attempts: Vec<A>,
}

impl<A> AttemptGroup<A> {
    fn empty() -> Self {
        Self {
            address: String::new(),
            host: String::new(),
            attempts: Vec::new(),
        }
    }

    /// True for the trailing group of attempts no identity could be found for.
    pub fn is_unknown(&self) -> bool {
        self.address.is_empty() && self.host.is_empty()
    }
}

impl AttemptGroup<ProbeRecord> {
    /// Aggregate statistics over the attempts of this group.
    pub fn stats(&self, hop: u32) -> HopStat {
        let mut row = AggregateRow::new(hop, 0);
        for attempt in &self.attempts {
            row.observe(attempt);
        }
        let mut stat = row.to_stat();
        stat.address = self.address.clone();
        stat.host = self.host.clone();
        stat
    }
}

/// Groups the attempts of one hop by address/host identity.
///
/// Groups are returned in order of first appearance, with a synthetic
/// unknown group last if unidentified attempts precede every identified one.
pub fn group_attempts<A, I>(attempts: I) -> Vec<AttemptGroup<A>>
where
    A: AttemptIdentity,
    I: IntoIterator<Item = A>,
{
    let mut groups: Vec<AttemptGroup<A>> = Vec::new();
    let mut by_address: HashMap<String, usize> = HashMap::new();
    let mut by_host: HashMap<String, usize> = HashMap::new();
    let mut pending: Vec<A> = Vec::new();
    let mut current: Option<usize> = None;

    for attempt in attempts {
        let address = non_empty(attempt.address()).map(String::from);
        let host = non_empty(attempt.host()).map(String::from);

        if address.is_none() && host.is_none() {
            match current {
                Some(idx) => groups[idx].attempts.push(attempt),
                None => pending.push(attempt),
            }
            continue;
        }

        let host_key = host.as_deref().map(str::to_lowercase);
        let existing = address
            .as_ref()
            .and_then(|a| by_address.get(a))
            .or_else(|| host_key.as_ref().and_then(|h| by_host.get(h)))
            .copied();
        let idx = existing.unwrap_or_else(|| {
            groups.push(AttemptGroup::empty());
            groups.len() - 1
        });

        let group = &mut groups[idx];
        group.attempts.append(&mut pending);
        group.attempts.push(attempt);
        if let Some(address) = address {
            if group.address.is_empty() {
                group.address = address.clone();
            }
            by_address.insert(address, idx);
        }
        if let (Some(host), Some(host_key)) = (host, host_key) {
            if group.host.is_empty() {
                group.host = host;
            }
            by_host.insert(host_key, idx);
        }
        current = Some(idx);
    }

    if !pending.is_empty() {
        let mut unknown = AttemptGroup::empty();
        unknown.attempts = pending;
        groups.push(unknown);
    }

    for group in &mut groups {
        if !group.host.is_empty() && group.host == group.address {
            group.host.clear();
        }
    }
    groups
}

/// Groups of one hop distance in a finished trace.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HopGroups {
    pub hop: u32,
    pub groups: Vec<AttemptGroup<ProbeRecord>>,
}

/// Splits a finished trace by hop distance and groups each hop.
///
/// Records with an invalid hop distance are dropped. Hops are returned in
/// ascending order; attempt order within a hop is preserved.
pub fn group_trace<I>(records: I) -> Vec<HopGroups>
where
    I: IntoIterator<Item = ProbeRecord>,
{
    let mut by_hop: BTreeMap<u32, Vec<ProbeRecord>> = BTreeMap::new();
    for record in records {
        match valid_hop(record.hop) {
            Some(hop) => by_hop.entry(hop).or_default().push(record),
            None => debug!(hop = record.hop, "Dropping attempt with invalid hop distance"),
        }
    }
    by_hop
        .into_iter()
        .map(|(hop, attempts)| HopGroups {
            hop,
            groups: group_attempts(attempts),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Attempt {
        id: u32,
        ip: &'static str,
        host: &'static str,
    }

    impl AttemptIdentity for Attempt {
        fn address(&self) -> Option<&str> {
            Some(self.ip)
        }

        fn host(&self) -> Option<&str> {
            Some(self.host)
        }
    }

    fn a(id: u32, ip: &'static str, host: &'static str) -> Attempt {
        Attempt { id, ip, host }
    }

    fn ids(group: &AttemptGroup<Attempt>) -> Vec<u32> {
        group.attempts.iter().map(|a| a.id).collect()
    }

    #[test]
    fn test_groups_by_address_in_first_seen_order() {
        let groups = group_attempts(vec![
            a(1, "10.0.0.2", ""),
            a(2, "10.0.0.1", ""),
            a(3, "10.0.0.2", ""),
        ]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].address, "10.0.0.2");
        assert_eq!(ids(&groups[0]), vec![1, 3]);
        assert_eq!(ids(&groups[1]), vec![2]);
    }

    #[test]
    fn test_host_links_different_addresses() {
        let groups = group_attempts(vec![
            a(1, "10.0.0.1", "Edge.Example"),
            a(2, "10.0.0.9", "edge.example"),
            a(3, "10.0.0.9", ""),
        ]);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].address, "10.0.0.1");
        assert_eq!(groups[0].host, "Edge.Example");
        assert_eq!(ids(&groups[0]), vec![1, 2, 3]);
    }

    #[test]
    fn test_host_only_group() {
        let groups = group_attempts(vec![a(1, "", "core"), a(2, "", "CORE")]);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].address, "");
        assert_eq!(groups[0].host, "core");
    }

    #[test]
    fn test_unidentified_attempts_carry() {
        let groups = group_attempts(vec![
            a(1, "", ""),
            a(2, "", ""),
            a(3, "10.0.0.1", ""),
            a(4, "", ""),
            a(5, "10.0.0.2", ""),
        ]);
        assert_eq!(groups.len(), 2);
        assert_eq!(ids(&groups[0]), vec![1, 2, 3, 4]);
        assert_eq!(ids(&groups[1]), vec![5]);
    }

    #[test]
    fn test_all_unidentified_forms_unknown_group() {
        let groups = group_attempts(vec![a(1, "", ""), a(2, " ", "")]);
        assert_eq!(groups.len(), 1);
        assert!(groups[0].is_unknown());
        assert_eq!(ids(&groups[0]), vec![1, 2]);
    }

    #[test]
    fn test_host_equal_to_address_is_blanked() {
        let groups = group_attempts(vec![a(1, "10.0.0.1", "10.0.0.1")]);
        assert_eq!(groups[0].host, "");
        assert!(!groups[0].is_unknown());
    }

    #[test]
    fn test_empty_input() {
        assert!(group_attempts(Vec::<Attempt>::new()).is_empty());
    }

    #[test]
    fn test_group_trace_splits_hops() {
        let rec = |hop: i64, ip: Option<&str>, success: bool| ProbeRecord {
            hop,
            address: ip.map(String::from),
            success,
            rtt_ms: success.then_some(10.0),
            ..Default::default()
        };
        let hops = group_trace(vec![
            rec(2, Some("10.0.2.1"), true),
            rec(1, None, false),
            rec(1, Some("10.0.1.1"), true),
            rec(0, Some("10.0.0.0"), true),
            rec(2, Some("10.0.2.1"), false),
        ]);
        assert_eq!(hops.len(), 2);
        assert_eq!(hops[0].hop, 1);
        assert_eq!(hops[0].groups.len(), 1);
        assert_eq!(hops[0].groups[0].attempts.len(), 2);

        let stats = hops[1].groups[0].stats(hops[1].hop);
        assert_eq!(stats.address, "10.0.2.1");
        assert_eq!(stats.sent, 2);
        assert_eq!(stats.received, 1);
        assert_eq!(stats.loss_percent, 50.0);
    }
}
