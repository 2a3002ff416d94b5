//! Core types for hop statistics aggregation.
//!
//! The wire shapes here accept the field names the prober emits (`ttl`, `ip`,
//! `prov`, `mpls`) as aliases of the canonical names.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// One probe attempt toward the destination at a fixed hop distance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbeRecord {
    /// Hop distance (TTL) the probe was sent with.
    #[serde(alias = "ttl")]
    pub hop: i64,
    /// Address that answered, if any.
    #[serde(default, alias = "ip", skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Reverse-resolved hostname, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Whether an answer was received.
    #[serde(default)]
    pub success: bool,
    /// Round-trip time in milliseconds; only meaningful on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rtt_ms: Option<f64>,
    /// Probe round this record belongs to.
    #[serde(default)]
    pub iteration: u64,
    /// Error kind reported for a failed probe.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(
        default,
        deserialize_with = "scalar_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub asn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, alias = "prov", skip_serializing_if = "Option::is_none")]
    pub province: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lng: Option<f64>,
    /// Path labels (e.g. MPLS label stack entries).
    #[serde(default, alias = "mpls", skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
}

impl ProbeRecord {
    /// Trimmed, non-empty responding address.
    pub fn address(&self) -> Option<&str> {
        non_empty(self.address.as_deref())
    }

    /// Trimmed, non-empty hostname.
    pub fn host(&self) -> Option<&str> {
        non_empty(self.host.as_deref())
    }

    /// Latency in ms if the record carries a usable one.
    pub fn rtt(&self) -> f64 {
        match self.rtt_ms {
            Some(rtt) if rtt.is_finite() && rtt > 0.0 => rtt,
            _ => 0.0,
        }
    }

    /// Decodes a single JSON record.
    pub fn from_json(line: &str) -> crate::HopStatsResult<Self> {
        Ok(serde_json::from_str(line)?)
    }
}

pub(crate) fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Accepts a string or a number (AS numbers arrive both ways).
fn scalar_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Geolocation attributes carried through from the prober.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub province: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lng: Option<f64>,
}

/// How the lost probes of a row failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailureType {
    /// Nothing was lost.
    #[default]
    None,
    /// Every probe was lost and every error was a timeout.
    AllTimeout,
    /// Some probes were lost, all to timeouts.
    PartialTimeout,
    /// At least one loss was caused by something other than a timeout.
    Mixed,
}

impl FailureType {
    /// Precedence used when folding rows together.
    pub fn priority(self) -> u8 {
        match self {
            FailureType::AllTimeout => 3,
            FailureType::PartialTimeout => 2,
            FailureType::Mixed => 1,
            FailureType::None => 0,
        }
    }

    /// Returns whichever of the two has the higher priority, preferring `self` on ties.
    pub fn most_severe(self, other: FailureType) -> FailureType {
        if other.priority() > self.priority() {
            other
        } else {
            self
        }
    }
}

impl std::fmt::Display for FailureType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureType::None => write!(f, "none"),
            FailureType::AllTimeout => write!(f, "all_timeout"),
            FailureType::PartialTimeout => write!(f, "partial_timeout"),
            FailureType::Mixed => write!(f, "mixed"),
        }
    }
}

/// Consumer-facing statistics for one hop path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HopStat {
    pub hop: u32,
    pub address: String,
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
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geo: Option<GeoInfo>,
    pub failure_type: FailureType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<BTreeMap<String, u64>>,
    #[serde(default)]
    pub labels: Vec<String>,
}

impl HopStat {
    /// True if the row is bound to an address or a host.
    pub fn is_known(&self) -> bool {
        !self.address.trim().is_empty() || !self.host.trim().is_empty()
    }
}

/// Point-in-time copy of every row in a session, ordered for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Session the rows belong to.
    pub session_id: Uuid,
    /// Highest probe round seen so far.
    pub iteration: u64,
    pub stats: Vec<HopStat>,
}

impl Snapshot {
    /// Serializes the snapshot to JSON with indentation.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Serializes the snapshot to compact JSON.
    pub fn to_json_compact(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
