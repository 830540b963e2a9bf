//! Single-resolver DNS probe.
//!
//! Sends one A or AAAA query to exactly one nameserver and folds every possible
//! failure into a [`DnsQueryOutcome`]. No retries, no fallback to system resolvers.

#![allow(clippy::missing_errors_doc)]

use super::directory::ResolverEndpoint;
use super::types::{DnsErrorKind, DnsQueryOutcome, RecordType};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::net::IpAddr;
use std::time::Duration;
use trust_dns_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use trust_dns_resolver::error::{ResolveError, ResolveErrorKind};
use trust_dns_resolver::proto::error::ProtoErrorKind;
use trust_dns_resolver::proto::op::ResponseCode;
use trust_dns_resolver::TokioAsyncResolver;

/// Standard DNS port.
const DNS_PORT: u16 = 53;

/// Maximum length of a full domain name in presentation form.
const MAX_DOMAIN_LEN: usize = 253;

/// Maximum length of one label.
const MAX_LABEL_LEN: usize = 63;

/// A single-query DNS probe.
///
/// Implementations must never fail: every error becomes a classified outcome.
#[async_trait]
pub trait DnsProbe: Send + Sync {
    /// Query `domain` for `record_type` using only `resolver`.
    async fn probe(
        &self,
        domain: &str,
        resolver: &ResolverEndpoint,
        record_type: RecordType,
        timeout: Duration,
    ) -> DnsQueryOutcome;
}

/// UDP/TCP probe backed by `trust-dns-resolver`.
///
/// A fresh resolver is built for every query so no cache or hosts file can leak
/// answers between vantage points.
#[derive(Debug, Clone)]
pub struct ResolverProbe {
    port: u16,
}

impl ResolverProbe {
    /// Create a probe targeting port 53.
    #[must_use]
    pub fn new() -> Self {
        Self { port: DNS_PORT }
    }

    /// Create a probe targeting a non-standard port.
    #[must_use]
    pub fn with_port(port: u16) -> Self {
        Self { port }
    }

    fn resolver_for(&self, address: IpAddr, timeout: Duration) -> Result<TokioAsyncResolver> {
        let config = ResolverConfig::from_parts(
            None,
            vec![],
            NameServerConfigGroup::from_ips_clear(&[address], self.port, true),
        );

        let mut opts = ResolverOpts::default();
        opts.timeout = timeout;
        opts.attempts = 1;
        opts.cache_size = 0;
        opts.use_hosts_file = false;

        TokioAsyncResolver::tokio(config, opts).map_err(Error::Resolver)
    }
}

impl Default for ResolverProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DnsProbe for ResolverProbe {
    async fn probe(
        &self,
        domain: &str,
        resolver: &ResolverEndpoint,
        record_type: RecordType,
        timeout: Duration,
    ) -> DnsQueryOutcome {
        tracing::debug!("Querying {domain} on {} for {record_type}", resolver.address);

        let client = match self.resolver_for(resolver.address, timeout) {
            Ok(client) => client,
            Err(e) => {
                return DnsQueryOutcome::failure(
                    resolver.clone(),
                    record_type,
                    DnsErrorKind::Unknown,
                    describe(DnsErrorKind::Unknown, domain, resolver.address, &e.to_string()),
                );
            }
        };

        let fqdn = to_fqdn(domain);
        let lookup = tokio::time::timeout(timeout, client.lookup(fqdn.as_str(), record_type.to_wire())).await;

        match lookup {
            Ok(Ok(response)) => {
                let addresses: Vec<IpAddr> = response
                    .iter()
                    .filter_map(|r| {
                        if let Some(ip) = r.as_a() {
                            Some(IpAddr::V4(*ip))
                        } else if let Some(ip) = r.as_aaaa() {
                            Some(IpAddr::V6(*ip))
                        } else {
                            None
                        }
                    })
                    .collect();

                if addresses.is_empty() {
                    // CNAME-only or otherwise address-less answer
                    DnsQueryOutcome::failure(
                        resolver.clone(),
                        record_type,
                        DnsErrorKind::NoAnswer,
                        describe(DnsErrorKind::NoAnswer, domain, resolver.address, ""),
                    )
                } else {
                    DnsQueryOutcome::success(resolver.clone(), record_type, addresses)
                }
            }
            Ok(Err(e)) => {
                let kind = classify_resolve_error(&e);
                tracing::debug!("{domain} on {} ({record_type}): {kind}: {e}", resolver.address);
                DnsQueryOutcome::failure(
                    resolver.clone(),
                    record_type,
                    kind,
                    describe(kind, domain, resolver.address, &e.to_string()),
                )
            }
            Err(_) => DnsQueryOutcome::timed_out(resolver.clone(), record_type, domain),
        }
    }
}

/// Map a resolver error onto the outcome taxonomy.
#[must_use]
pub fn classify_resolve_error(error: &ResolveError) -> DnsErrorKind {
    match error.kind() {
        ResolveErrorKind::Timeout => DnsErrorKind::Timeout,
        ResolveErrorKind::NoConnections => DnsErrorKind::NoNameservers,
        ResolveErrorKind::NoRecordsFound { response_code, .. } => kind_for_response_code(*response_code),
        ResolveErrorKind::Proto(proto) => match proto.kind() {
            ProtoErrorKind::Timeout => DnsErrorKind::Timeout,
            _ => classify_message(&proto.to_string()),
        },
        ResolveErrorKind::Io(io) if io.kind() == std::io::ErrorKind::TimedOut => DnsErrorKind::Timeout,
        _ => classify_message(&error.to_string()),
    }
}

/// Map a DNS response code of an answer without records.
#[must_use]
pub fn kind_for_response_code(code: ResponseCode) -> DnsErrorKind {
    match code {
        ResponseCode::NoError => DnsErrorKind::NoAnswer,
        ResponseCode::NXDomain => DnsErrorKind::NxDomain,
        ResponseCode::ServFail => DnsErrorKind::ServFail,
        ResponseCode::Refused => DnsErrorKind::Refused,
        ResponseCode::FormErr => DnsErrorKind::FormErr,
        ResponseCode::YXDomain => DnsErrorKind::YxDomain,
        _ => DnsErrorKind::Unknown,
    }
}

/// Last-resort classification from an error message.
#[must_use]
pub fn classify_message(message: &str) -> DnsErrorKind {
    let upper = message.to_ascii_uppercase();
    if upper.contains("NXDOMAIN") {
        DnsErrorKind::NxDomain
    } else if upper.contains("YXDOMAIN") {
        DnsErrorKind::YxDomain
    } else if upper.contains("REFUSED") {
        DnsErrorKind::Refused
    } else if upper.contains("FORMERR") {
        DnsErrorKind::FormErr
    } else if upper.contains("SERVFAIL") {
        DnsErrorKind::ServFail
    } else if upper.contains("TIMED OUT") || upper.contains("TIMEOUT") {
        DnsErrorKind::Timeout
    } else {
        DnsErrorKind::Unknown
    }
}

/// Human-readable detail for a failed query.
#[must_use]
pub fn describe(kind: DnsErrorKind, domain: &str, server: IpAddr, raw: &str) -> String {
    match kind {
        DnsErrorKind::Timeout => format!("Timeout occurred for domain: {domain} on server: {server}"),
        DnsErrorKind::NoAnswer => format!("No answer for domain: {domain} on server: {server}"),
        DnsErrorKind::NxDomain => format!("Non-existent domain: {domain} on server: {server}"),
        DnsErrorKind::YxDomain => format!("Domain name should not exist: {domain} on server: {server}"),
        DnsErrorKind::NoNameservers => format!("No nameservers for domain: {domain} on server: {server}"),
        DnsErrorKind::ServFail => format!("Server failure for domain: {domain} on server: {server}"),
        DnsErrorKind::Refused => {
            format!("Server refused to answer for domain: {domain} on server: {server}")
        }
        DnsErrorKind::FormErr => format!("Format error for domain: {domain} on server: {server}"),
        DnsErrorKind::Unknown => format!("Unexpected error querying {domain} on {server}: {raw}"),
    }
}

/// Validate hostname syntax and return it lowercased without a trailing dot.
///
/// # Errors
///
/// Returns [`Error::InvalidDomain`] for empty names, bad labels or overlong names.
pub fn normalize_domain(domain: &str) -> Result<String> {
    let name = domain.trim().trim_end_matches('.').to_ascii_lowercase();
    if name.is_empty() || name.len() > MAX_DOMAIN_LEN {
        return Err(Error::invalid_domain(domain));
    }

    let valid = name.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= MAX_LABEL_LEN
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    });

    if valid {
        Ok(name)
    } else {
        Err(Error::invalid_domain(domain))
    }
}

/// Append the root dot so the query is never expanded with search domains.
fn to_fqdn(domain: &str) -> String {
    if domain.ends_with('.') {
        domain.to_string()
    } else {
        format!("{domain}.")
    }
}
