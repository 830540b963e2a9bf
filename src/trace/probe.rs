//! Path probe.
//!
//! Runs the platform trace tool toward a domain's resolved address and turns its
//! output into a [`PathProbeResult`]. The destination is resolved separately from
//! the trace so reachability never depends on what the tool prints.

#![allow(clippy::missing_errors_doc)]

use super::dialect::{native_dialect, TraceDialect};
use super::types::PathProbeResult;
use crate::config::TraceSettings;
use crate::dns::normalize_domain;
use crate::error::Result;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::net::IpAddr;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::time::Instant;

/// Upper bound on the destination lookup before tracing.
const RESOLVE_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-trace parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceOptions {
    /// Trace over IPv6 when the domain has an IPv6 address
    pub prefer_ipv6: bool,
    /// Maximum TTL
    pub max_hops: u8,
    /// Wait per hop
    pub per_hop_timeout: Duration,
    /// Hard limit on the whole trace
    pub overall_timeout: Duration,
}

impl From<&TraceSettings> for TraceOptions {
    fn from(settings: &TraceSettings) -> Self {
        Self {
            prefer_ipv6: settings.prefer_ipv6,
            max_hops: settings.max_hops,
            per_hop_timeout: settings.per_hop_timeout(),
            overall_timeout: settings.overall_timeout(),
        }
    }
}

impl Default for TraceOptions {
    fn default() -> Self {
        Self::from(&TraceSettings::default())
    }
}

/// Looks up the address a trace should end at.
#[async_trait]
pub trait DestinationResolver: Send + Sync + std::fmt::Debug {
    /// First IPv4 and first IPv6 address of `domain`, either possibly absent.
    async fn resolve(&self, domain: &str) -> (Option<IpAddr>, Option<IpAddr>);
}

/// Destination lookup through the operating system resolver.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

#[async_trait]
impl DestinationResolver for SystemResolver {
    async fn resolve(&self, domain: &str) -> (Option<IpAddr>, Option<IpAddr>) {
        let lookup = tokio::time::timeout(RESOLVE_TIMEOUT, tokio::net::lookup_host((domain, 0))).await;
        let addrs: Vec<IpAddr> = match lookup {
            Ok(Ok(addrs)) => addrs.map(|sa| sa.ip()).collect(),
            Ok(Err(e)) => {
                tracing::debug!("Unable to resolve {domain}: {e}");
                Vec::new()
            }
            Err(_) => {
                tracing::debug!("Resolving {domain} timed out");
                Vec::new()
            }
        };

        let v4 = addrs.iter().copied().find(IpAddr::is_ipv4);
        let v6 = addrs.iter().copied().find(IpAddr::is_ipv6);
        (v4, v6)
    }
}

/// Trace runner.
///
/// # Example
///
/// ```ignore
/// let prober = PathProber::native(4);
/// let result = prober.trace("google.com", &TraceOptions::default()).await?;
/// println!("{:?}", result.last_responsive_hop());
/// ```
#[derive(Debug, Clone)]
pub struct PathProber {
    dialect: Option<Arc<dyn TraceDialect>>,
    resolver: Arc<dyn DestinationResolver>,
    concurrency: usize,
}

impl PathProber {
    /// Prober using the running platform's trace tool.
    #[must_use]
    pub fn native(concurrency: usize) -> Self {
        Self {
            dialect: native_dialect().map(Arc::from),
            resolver: Arc::new(SystemResolver),
            concurrency: concurrency.max(1),
        }
    }

    /// Prober using an explicit dialect.
    #[must_use]
    pub fn with_dialect(dialect: Arc<dyn TraceDialect>, concurrency: usize) -> Self {
        Self {
            dialect: Some(dialect),
            resolver: Arc::new(SystemResolver),
            concurrency: concurrency.max(1),
        }
    }

    /// Replace the destination lookup.
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn DestinationResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Trace toward one domain.
    ///
    /// Only a malformed domain is an error; every runtime failure is reported
    /// through the result's termination reason.
    pub async fn trace(&self, domain: &str, options: &TraceOptions) -> Result<PathProbeResult> {
        let domain = normalize_domain(domain)?;
        Ok(self.trace_normalized(&domain, options).await)
    }

    /// Trace many domains through a bounded pool, retrying over IPv4 any IPv6
    /// trace that produced no responsive hop. Results come back in input order.
    pub async fn trace_all(&self, domains: &[String], options: &TraceOptions) -> Result<Vec<PathProbeResult>> {
        let domains = domains
            .iter()
            .map(|d| normalize_domain(d))
            .collect::<Result<Vec<_>>>()?;

        let results = stream::iter(domains.iter())
            .map(|domain| self.trace_with_fallback(domain, options))
            .buffered(self.concurrency)
            .collect()
            .await;
        Ok(results)
    }

    async fn trace_with_fallback(&self, domain: &str, options: &TraceOptions) -> PathProbeResult {
        let result = self.trace_normalized(domain, options).await;
        if result.ipv6 && !result.has_usable_hops() {
            tracing::info!("{domain}: no usable IPv6 hops, retrying over IPv4");
            let v4 = TraceOptions {
                prefer_ipv6: false,
                ..*options
            };
            return self.trace_normalized(domain, &v4).await;
        }
        result
    }

    async fn trace_normalized(&self, domain: &str, options: &TraceOptions) -> PathProbeResult {
        let (v4, v6) = self.resolver.resolve(domain).await;
        let ipv6 = options.prefer_ipv6 && v6.is_some();
        let destination = if ipv6 { v6 } else { v4 };

        let Some(dialect) = self.dialect.as_ref() else {
            tracing::warn!("No trace tool known for {}", std::env::consts::OS);
            return PathProbeResult::command_failure(domain, destination, ipv6);
        };

        let target = destination.map_or_else(|| domain.to_string(), |ip| ip.to_string());
        let command = dialect.command(&target, ipv6, options.max_hops, options.per_hop_timeout);
        tracing::debug!("Running trace command: {command}");

        let mut child = match Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!("Failed to run {}: {e}", command.program);
                return PathProbeResult::command_failure(domain, destination, ipv6);
            }
        };

        let deadline = Instant::now() + options.overall_timeout;
        let mut output = String::new();
        let mut timed_out = false;

        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match tokio::time::timeout_at(deadline, lines.next_line()).await {
                    Ok(Ok(Some(line))) => {
                        output.push_str(&line);
                        output.push('\n');
                    }
                    Ok(Ok(None)) => break,
                    Ok(Err(e)) => {
                        tracing::debug!("Trace output for {domain} unreadable: {e}");
                        break;
                    }
                    Err(_) => {
                        timed_out = true;
                        break;
                    }
                }
            }
        }

        let tool_failed = if timed_out {
            tracing::warn!("Traceroute command timed out for {domain}");
            let _ = child.kill().await;
            false
        } else {
            match tokio::time::timeout_at(deadline, child.wait()).await {
                Ok(Ok(status)) => !status.success(),
                Ok(Err(_)) => true,
                Err(_) => {
                    timed_out = true;
                    let _ = child.kill().await;
                    false
                }
            }
        };

        let hops = dialect.parse(&output);
        let result = PathProbeResult::from_hops(domain, hops, destination, ipv6, timed_out, tool_failed);
        tracing::info!(
            "{domain}: {} hops, {} ({})",
            result.hops.len(),
            result.termination_reason,
            dialect.name()
        );
        result
    }
}
