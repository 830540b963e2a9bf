//! Probe settings.
//!
//! Every knob has a default, so a partial JSON file (or none at all) is valid.

use crate::dns::RecordType;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level settings file layout.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// DNS vantage comparison
    pub dns: DnsSettings,
    /// Path probing
    pub trace: TraceSettings,
    /// Geolocation of the last responsive hop
    pub geo: GeoSettings,
}

/// DNS comparison settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DnsSettings {
    /// Per-query timeout in milliseconds
    pub timeout_ms: u64,
    /// Whole-domain deadline in milliseconds; pending probes become `Timeout`
    pub deadline_ms: u64,
    /// Probes in flight across all domains
    pub concurrency: usize,
    /// Domains compared at the same time by batch runs
    pub domain_batch: usize,
    /// Record types queried on every resolver
    pub record_types: Vec<RecordType>,
}

impl DnsSettings {
    /// Per-query timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Per-domain deadline.
    #[must_use]
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }
}

impl Default for DnsSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            deadline_ms: 10_000,
            concurrency: 128,
            domain_batch: 16,
            record_types: RecordType::ALL.to_vec(),
        }
    }
}

/// Path probe settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TraceSettings {
    /// Maximum TTL probed
    pub max_hops: u8,
    /// Wait per hop in milliseconds
    pub per_hop_timeout_ms: u64,
    /// Hard limit on one trace in milliseconds
    pub overall_timeout_ms: u64,
    /// Traces running at the same time
    pub concurrency: usize,
    /// Trace over IPv6 when the domain has an AAAA record
    pub prefer_ipv6: bool,
    /// TCP port used for SYN probing of candidate hops
    pub syn_port: u16,
    /// Wait for a SYN reply in milliseconds
    pub syn_timeout_ms: u64,
}

impl TraceSettings {
    /// Per-hop wait.
    #[must_use]
    pub fn per_hop_timeout(&self) -> Duration {
        Duration::from_millis(self.per_hop_timeout_ms)
    }

    /// Whole-trace limit.
    #[must_use]
    pub fn overall_timeout(&self) -> Duration {
        Duration::from_millis(self.overall_timeout_ms)
    }

    /// SYN reply wait.
    #[must_use]
    pub fn syn_timeout(&self) -> Duration {
        Duration::from_millis(self.syn_timeout_ms)
    }
}

impl Default for TraceSettings {
    fn default() -> Self {
        Self {
            max_hops: 30,
            per_hop_timeout_ms: 5_000,
            overall_timeout_ms: 300_000,
            concurrency: 8,
            prefer_ipv6: true,
            syn_port: 80,
            syn_timeout_ms: 2_000,
        }
    }
}

/// Geolocation settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeoSettings {
    /// Online provider base URL; the address is appended
    pub online_url: String,
    /// Request timeout in milliseconds
    pub online_timeout_ms: u64,
    /// Attempts against the online provider
    pub attempts: u32,
    /// Fixed pause between attempts in milliseconds
    pub backoff_ms: u64,
    /// GeoLite2 City database path; `None` disables the offline fallback
    pub database: Option<PathBuf>,
    /// Skip the online provider entirely
    pub offline_only: bool,
}

impl GeoSettings {
    /// Request timeout.
    #[must_use]
    pub fn online_timeout(&self) -> Duration {
        Duration::from_millis(self.online_timeout_ms)
    }

    /// Pause between attempts.
    #[must_use]
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

impl Default for GeoSettings {
    fn default() -> Self {
        Self {
            online_url: "http://ip-api.com/json/".to_string(),
            online_timeout_ms: 5_000,
            attempts: 3,
            backoff_ms: 1_000,
            database: Some(super::ConfigLoader::config_dir().join("GeoLite2-City.mmdb")),
            offline_only: false,
        }
    }
}
