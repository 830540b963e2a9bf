//! DNS types and data structures.
//!
//! Core types for per-resolver query outcomes and per-domain poisoning records.

use super::directory::ResolverEndpoint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::net::IpAddr;

/// Address record type queried by a probe.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordType {
    /// IPv4 address record
    A,
    /// IPv6 address record
    #[serde(rename = "AAAA")]
    Aaaa,
}

impl RecordType {
    /// Both address record types, in query order.
    pub const ALL: [Self; 2] = [Self::A, Self::Aaaa];

    /// Equivalent resolver-library record type.
    #[must_use]
    pub fn to_wire(self) -> trust_dns_resolver::proto::rr::RecordType {
        match self {
            Self::A => trust_dns_resolver::proto::rr::RecordType::A,
            Self::Aaaa => trust_dns_resolver::proto::rr::RecordType::AAAA,
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A => write!(f, "A"),
            Self::Aaaa => write!(f, "AAAA"),
        }
    }
}

impl std::str::FromStr for RecordType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "A" => Ok(Self::A),
            "AAAA" => Ok(Self::Aaaa),
            _ => Err(format!("Unknown record type: {s}. Valid options are: A, AAAA")),
        }
    }
}

/// Classified reason a single DNS query produced no addresses.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DnsErrorKind {
    /// Name exists but has no record of the requested type
    NoAnswer,
    /// Name does not exist
    #[serde(rename = "NXDOMAIN")]
    NxDomain,
    /// No response within the allotted time
    Timeout,
    /// Server failure response
    ServFail,
    /// No usable nameserver could answer
    NoNameservers,
    /// Server refused the query
    Refused,
    /// Server rejected the query format
    FormErr,
    /// Name should not exist
    #[serde(rename = "YXDOMAIN")]
    YxDomain,
    /// Anything else; raw message kept in the outcome's detail
    Unknown,
}

impl fmt::Display for DnsErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NoAnswer => "NoAnswer",
            Self::NxDomain => "NXDOMAIN",
            Self::Timeout => "Timeout",
            Self::ServFail => "ServFail",
            Self::NoNameservers => "NoNameservers",
            Self::Refused => "Refused",
            Self::FormErr => "FormErr",
            Self::YxDomain => "YXDOMAIN",
            Self::Unknown => "Unknown",
        };
        f.pad(s)
    }
}

/// Result of one query against one resolver.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DnsQueryOutcome {
    /// Resolver that was asked
    pub resolver: ResolverEndpoint,
    /// Record type requested
    pub record_type: RecordType,
    /// Addresses in the order the resolver returned them
    pub addresses: Vec<IpAddr>,
    /// Failure classification, `None` on success
    pub error_kind: Option<DnsErrorKind>,
    /// Human-readable failure description, empty on success
    pub error_detail: String,
}

impl DnsQueryOutcome {
    /// Create a successful outcome.
    #[must_use]
    pub fn success(resolver: ResolverEndpoint, record_type: RecordType, addresses: Vec<IpAddr>) -> Self {
        Self {
            resolver,
            record_type,
            addresses,
            error_kind: None,
            error_detail: String::new(),
        }
    }

    /// Create a failed outcome.
    pub fn failure(
        resolver: ResolverEndpoint,
        record_type: RecordType,
        kind: DnsErrorKind,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            resolver,
            record_type,
            addresses: Vec::new(),
            error_kind: Some(kind),
            error_detail: detail.into(),
        }
    }

    /// Outcome for a probe that was still pending when its deadline expired.
    #[must_use]
    pub fn timed_out(resolver: ResolverEndpoint, record_type: RecordType, domain: &str) -> Self {
        let detail = format!(
            "Timeout occurred for domain: {domain} on server: {}",
            resolver.address
        );
        Self::failure(resolver, record_type, DnsErrorKind::Timeout, detail)
    }

    /// Check if the query returned an answer.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error_kind.is_none()
    }
}

/// Poisoning verdict for one domain, in decreasing priority.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PoisoningClass {
    /// Every group agrees on the same non-empty address set
    Clean,
    /// Name reported as non-existent and nobody returned an address
    #[serde(rename = "NXDOMAIN")]
    NxDomain,
    /// Some resolver returned a private, loopback or link-local address
    #[serde(rename = "BogusIP")]
    BogusIp,
    /// One group's answers are a strict subset of another's
    Subset,
    /// Groups answered with different, non-nested address sets
    Divergent,
    /// Not enough signal to decide
    Inconclusive,
}

impl PoisoningClass {
    /// Whether this verdict indicates tampering.
    #[must_use]
    pub fn is_suspicious(&self) -> bool {
        matches!(self, Self::BogusIp | Self::Subset | Self::Divergent)
    }
}

impl fmt::Display for PoisoningClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Clean => "Clean",
            Self::NxDomain => "NXDOMAIN",
            Self::BogusIp => "BogusIP",
            Self::Subset => "Subset",
            Self::Divergent => "Divergent",
            Self::Inconclusive => "Inconclusive",
        };
        f.pad(s)
    }
}

/// Per-domain DNS poisoning measurement.
///
/// Built once from the complete set of probe outcomes; the classification is derived
/// from the aggregated maps and never changes afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainPoisoningRecord {
    /// Domain that was compared
    pub domain: String,
    /// When the comparison finished
    pub timestamp: DateTime<Utc>,
    /// Union of successful addresses per vantage group
    pub per_group_addresses: BTreeMap<String, BTreeSet<IpAddr>>,
    /// Union of error kinds per vantage group
    pub per_group_errors: BTreeMap<String, BTreeSet<DnsErrorKind>>,
    /// Verdict
    pub classification: PoisoningClass,
    /// Raw per-resolver outcomes, for row-level persistence
    pub outcomes: Vec<DnsQueryOutcome>,
}

impl DomainPoisoningRecord {
    /// Aggregate outcomes per group and classify.
    ///
    /// Every name in `groups` gets an entry in both maps, even when none of its
    /// resolvers produced anything.
    #[must_use]
    pub fn from_outcomes<'a>(
        domain: impl Into<String>,
        timestamp: DateTime<Utc>,
        groups: impl IntoIterator<Item = &'a str>,
        outcomes: Vec<DnsQueryOutcome>,
    ) -> Self {
        let mut per_group_addresses: BTreeMap<String, BTreeSet<IpAddr>> = BTreeMap::new();
        let mut per_group_errors: BTreeMap<String, BTreeSet<DnsErrorKind>> = BTreeMap::new();
        for group in groups {
            per_group_addresses.entry(group.to_string()).or_default();
            per_group_errors.entry(group.to_string()).or_default();
        }

        for outcome in &outcomes {
            let group = &outcome.resolver.region;
            per_group_addresses
                .entry(group.clone())
                .or_default()
                .extend(outcome.addresses.iter().copied());
            let errors = per_group_errors.entry(group.clone()).or_default();
            if let Some(kind) = outcome.error_kind {
                errors.insert(kind);
            }
        }

        let classification = super::pollution::classify(&per_group_addresses, &per_group_errors);

        Self {
            domain: domain.into(),
            timestamp,
            per_group_addresses,
            per_group_errors,
            classification,
            outcomes,
        }
    }

    /// Number of probes that returned at least one address.
    #[must_use]
    pub fn answered(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.addresses.is_empty()).count()
    }
}
