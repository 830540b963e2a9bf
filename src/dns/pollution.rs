//! DNS pollution detection.
//!
//! Detects DNS poisoning by querying every resolver of every vantage group for a
//! domain and comparing the per-group answer sets. Sets rather than single answers
//! are compared so ordinary load-balancing differences between resolvers do not
//! register as tampering.

#![allow(clippy::missing_errors_doc)]

use crate::config::DnsSettings;
use crate::dns::directory::{ResolverDirectory, ResolverEndpoint};
use crate::dns::probe::{normalize_domain, DnsProbe, ResolverProbe};
use crate::dns::types::{DnsErrorKind, DnsQueryOutcome, DomainPoisoningRecord, PoisoningClass, RecordType};
use crate::error::Result;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::time::Instant;

/// DNS pollution checker.
///
/// Fans one probe out per (resolver, record type) pair and classifies the
/// aggregated answers. Probes share one concurrency budget across all domains.
///
/// # Example
///
/// ```ignore
/// let checker = PollutionChecker::new(directory, DnsSettings::default());
/// let record = checker.compare("google.com").await?;
/// println!("{}: {}", record.domain, record.classification);
/// ```
pub struct PollutionChecker {
    probe: Arc<dyn DnsProbe>,
    directory: Arc<ResolverDirectory>,
    settings: DnsSettings,
    permits: Arc<Semaphore>,
}

impl PollutionChecker {
    /// Create a checker that queries resolvers over the network.
    #[must_use]
    pub fn new(directory: ResolverDirectory, settings: DnsSettings) -> Self {
        Self::with_probe(Arc::new(ResolverProbe::new()), directory, settings)
    }

    /// Create a checker with a custom probe implementation.
    #[must_use]
    pub fn with_probe(probe: Arc<dyn DnsProbe>, directory: ResolverDirectory, settings: DnsSettings) -> Self {
        let permits = Arc::new(Semaphore::new(settings.concurrency.max(1)));
        Self {
            probe,
            directory: Arc::new(directory),
            settings,
            permits,
        }
    }

    /// Resolver groups this checker compares.
    #[must_use]
    pub fn directory(&self) -> &ResolverDirectory {
        &self.directory
    }

    /// Compare resolver groups for one domain.
    ///
    /// Waits for every probe to finish, time out, or be cut off by the per-domain
    /// deadline; cut-off probes are recorded as `Timeout`. The deadline clock of a
    /// probe starts when it leaves the shared queue, so waiting for a permit behind
    /// other domains never turns into a `Timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidDomain`] if the name fails syntax validation.
    /// Network failures never produce an error.
    pub async fn compare(&self, domain: &str) -> Result<DomainPoisoningRecord> {
        let domain = normalize_domain(domain)?;
        Ok(self.compare_normalized(&domain).await)
    }

    /// Compare many domains, a bounded batch at a time.
    ///
    /// Every name is validated before any probe is sent. Records come back in
    /// input order.
    pub async fn compare_all(&self, domains: &[String]) -> Result<Vec<DomainPoisoningRecord>> {
        let domains = domains
            .iter()
            .map(|d| normalize_domain(d))
            .collect::<Result<Vec<_>>>()?;

        tracing::info!(
            "Checking {} domains against {} resolvers",
            domains.len(),
            self.directory.len()
        );

        let records = stream::iter(domains.iter())
            .map(|domain| self.compare_normalized(domain))
            .buffered(self.settings.domain_batch.max(1))
            .collect()
            .await;
        Ok(records)
    }

    async fn compare_normalized(&self, domain: &str) -> DomainPoisoningRecord {
        let deadline = self.settings.deadline();
        let timeout = self.settings.timeout();

        let jobs: Vec<(&ResolverEndpoint, RecordType)> = self
            .directory
            .endpoints()
            .flat_map(|resolver| self.settings.record_types.iter().map(move |rt| (resolver, *rt)))
            .collect();

        let probe = self.probe.as_ref();
        let permits = self.permits.as_ref();
        let mut outcomes: Vec<DnsQueryOutcome> = futures::future::join_all(jobs.into_iter().map(
            |(resolver, record_type)| async move {
                // queued probes have not been sent yet; the deadline only runs once in flight
                let _permit = permits.acquire().await.ok();
                let cutoff = Instant::now() + deadline;
                match tokio::time::timeout_at(cutoff, probe.probe(domain, resolver, record_type, timeout)).await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        tracing::warn!(
                            "Deadline expired for {domain} on {} ({record_type})",
                            resolver.address
                        );
                        DnsQueryOutcome::timed_out(resolver.clone(), record_type, domain)
                    }
                }
            },
        ))
        .await;

        outcomes.sort_by(|a, b| {
            (&a.resolver.region, a.resolver.address, a.record_type).cmp(&(
                &b.resolver.region,
                b.resolver.address,
                b.record_type,
            ))
        });

        let record = DomainPoisoningRecord::from_outcomes(domain, Utc::now(), self.directory.regions(), outcomes);
        tracing::info!(
            "{domain}: {} ({}/{} probes answered)",
            record.classification,
            record.answered(),
            record.outcomes.len()
        );
        record
    }
}

/// Classify aggregated per-group answers.
///
/// Rules are checked in priority order and the first match wins:
/// NXDOMAIN, bogus address, strict subset, divergence, agreement, otherwise
/// inconclusive.
#[must_use]
pub fn classify(
    addresses: &BTreeMap<String, BTreeSet<IpAddr>>,
    errors: &BTreeMap<String, BTreeSet<DnsErrorKind>>,
) -> PoisoningClass {
    let any_answer = addresses.values().any(|set| !set.is_empty());
    if !any_answer && errors.values().any(|kinds| kinds.contains(&DnsErrorKind::NxDomain)) {
        return PoisoningClass::NxDomain;
    }

    if addresses.values().flatten().any(|ip| is_bogus(*ip)) {
        return PoisoningClass::BogusIp;
    }

    let answered: Vec<&BTreeSet<IpAddr>> = addresses.values().filter(|set| !set.is_empty()).collect();

    let strict_subset = answered
        .iter()
        .any(|a| answered.iter().any(|b| a.len() < b.len() && a.is_subset(b)));
    if strict_subset {
        return PoisoningClass::Subset;
    }

    if answered.windows(2).any(|pair| pair[0] != pair[1]) {
        return PoisoningClass::Divergent;
    }

    if !addresses.is_empty() && answered.len() == addresses.len() {
        return PoisoningClass::Clean;
    }

    PoisoningClass::Inconclusive
}

/// Whether an address can never be a legitimate public answer.
///
/// Covers RFC 1918, loopback, link-local, unspecified and "this network" ranges for
/// IPv4; loopback, unspecified, link-local (`fe80::/10`) and unique-local
/// (`fc00::/7`) for IPv6. IPv4-mapped IPv6 addresses are checked as IPv4.
#[must_use]
pub fn is_bogus(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_private() || v4.is_loopback() || v4.is_link_local() || v4.is_unspecified() || v4.octets()[0] == 0
        }
        IpAddr::V6(v6) => {
            if let Some(v4) = v6.to_ipv4_mapped() {
                return is_bogus(IpAddr::V4(v4));
            }
            let head = v6.segments()[0];
            v6.is_loopback() || v6.is_unspecified() || (head & 0xffc0) == 0xfe80 || (head & 0xfe00) == 0xfc00
        }
    }
}
