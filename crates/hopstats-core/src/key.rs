//! Grouping keys for probe records.

use crate::ProbeRecord;

/// Identity of one aggregate row within a session.
///
/// A record with an address is keyed by address, otherwise by lowercased
/// host, otherwise it falls into the per-hop unknown bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HopKey {
    Addr { hop: u32, address: String },
    Host { hop: u32, host: String },
    Unknown { hop: u32 },
}

impl HopKey {
    pub fn hop(&self) -> u32 {
        match self {
            HopKey::Addr { hop, .. } | HopKey::Host { hop, .. } | HopKey::Unknown { hop } => *hop,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, HopKey::Unknown { .. })
    }
}

impl std::fmt::Display for HopKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HopKey::Addr { hop, address } => write!(f, "{}|addr:{}", hop, address),
            HopKey::Host { hop, host } => write!(f, "{}|host:{}", hop, host),
            HopKey::Unknown { hop } => write!(f, "{}|unknown", hop),
        }
    }
}

/// Validates a raw hop distance, returning it if it is usable.
pub fn valid_hop(hop: i64) -> Option<u32> {
    u32::try_from(hop).ok().filter(|h| *h > 0)
}

/// Resolves the grouping key for a record.
///
/// Returns `None` for records whose hop distance is not a positive integer;
/// callers drop those silently.
pub fn resolve_key(record: &ProbeRecord) -> Option<HopKey> {
    let hop = valid_hop(record.hop)?;
    if let Some(address) = record.address() {
        return Some(HopKey::Addr {
            hop,
            address: address.to_string(),
        });
    }
    if let Some(host) = record.host() {
        return Some(HopKey::Host {
            hop,
            host: host.to_lowercase(),
        });
    }
    Some(HopKey::Unknown { hop })
}
