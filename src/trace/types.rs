//! Path probe and censorship localization types.

use crate::geo::GeoLocation;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

/// One hop of a trace. `address` is `None` when the hop did not answer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TraceHop {
    /// 1-based TTL of the hop
    pub index: u32,
    /// Responding router, if any
    pub address: Option<IpAddr>,
}

impl TraceHop {
    /// Create a hop.
    #[must_use]
    pub fn new(index: u32, address: Option<IpAddr>) -> Self {
        Self { index, address }
    }

    /// Create a hop that did not answer.
    #[must_use]
    pub fn silent(index: u32) -> Self {
        Self { index, address: None }
    }
}

/// Why a trace stopped.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TerminationReason {
    /// Last responsive hop is the destination
    ReachedDestination,
    /// Overall trace timeout elapsed
    Timeout,
    /// Trace finished without reaching the destination
    NoResponse,
    /// Trace tool missing, unsupported platform, or tool refused to run
    CommandFailure,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ReachedDestination => "ReachedDestination",
            Self::Timeout => "Timeout",
            Self::NoResponse => "NoResponse",
            Self::CommandFailure => "CommandFailure",
        };
        f.pad(s)
    }
}

/// Outcome of one trace toward a domain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PathProbeResult {
    /// Domain traced
    pub domain: String,
    /// Hops in TTL order, contiguous from 1
    pub hops: Vec<TraceHop>,
    /// Whether the last responsive hop is the destination
    pub reached_destination: bool,
    /// Destination resolved independently of the trace
    pub destination_address: Option<IpAddr>,
    /// Why the trace stopped
    pub termination_reason: TerminationReason,
    /// Whether the trace ran over IPv6
    pub ipv6: bool,
}

impl PathProbeResult {
    /// Derive reachability and termination from the parsed hops.
    ///
    /// `timed_out` marks a trace cut off by its overall timeout; `tool_failed`
    /// marks a trace tool that exited unsuccessfully.
    #[must_use]
    pub fn from_hops(
        domain: impl Into<String>,
        hops: Vec<TraceHop>,
        destination: Option<IpAddr>,
        ipv6: bool,
        timed_out: bool,
        tool_failed: bool,
    ) -> Self {
        let last = hops.iter().rev().find_map(|hop| hop.address);
        let reached = matches!((last, destination), (Some(last), Some(dest)) if last == dest);

        let termination_reason = if reached {
            TerminationReason::ReachedDestination
        } else if timed_out {
            TerminationReason::Timeout
        } else if tool_failed && last.is_none() {
            TerminationReason::CommandFailure
        } else {
            TerminationReason::NoResponse
        };

        Self {
            domain: domain.into(),
            hops,
            reached_destination: reached,
            destination_address: destination,
            termination_reason,
            ipv6,
        }
    }

    /// Result for a trace that could not be started.
    #[must_use]
    pub fn command_failure(domain: impl Into<String>, destination: Option<IpAddr>, ipv6: bool) -> Self {
        Self {
            domain: domain.into(),
            hops: Vec::new(),
            reached_destination: false,
            destination_address: destination,
            termination_reason: TerminationReason::CommandFailure,
            ipv6,
        }
    }

    /// Address of the last hop that answered.
    #[must_use]
    pub fn last_responsive_hop(&self) -> Option<IpAddr> {
        self.hops.iter().rev().find_map(|hop| hop.address)
    }

    /// Whether any hop answered.
    #[must_use]
    pub fn has_usable_hops(&self) -> bool {
        self.hops.iter().any(|hop| hop.address.is_some())
    }
}

/// Where and how a path appears to be blocked.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BlockingClass {
    /// Trace reached the destination
    NoBlockingDetected,
    /// Trace stopped at a known hop short of the resolved destination
    BlockedAtHop,
    /// Hops answered but the destination could not be resolved to compare against
    DestinationUnreachable,
    /// No hop answered or the trace could not run
    ProbeFailed,
}

impl fmt::Display for BlockingClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NoBlockingDetected => "NoBlockingDetected",
            Self::BlockedAtHop => "BlockedAtHop",
            Self::DestinationUnreachable => "DestinationUnreachable",
            Self::ProbeFailed => "ProbeFailed",
        };
        f.pad(s)
    }
}

/// Censorship localization for one domain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CensorshipLocalization {
    /// Domain traced
    pub domain: String,
    /// When the localization finished
    pub timestamp: DateTime<Utc>,
    /// Last hop that answered
    pub last_responsive_hop: Option<IpAddr>,
    /// Approximate location of that hop
    pub location: Option<GeoLocation>,
    /// Why `location` is absent, when geolocation was attempted and failed
    pub location_error: Option<String>,
    /// A hop other than the destination answered a SYN with a reset
    pub rst_detected: bool,
    /// A SYN was answered by an address other than the one probed
    pub redirection_detected: bool,
    /// Verdict
    pub classification: BlockingClass,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> Option<IpAddr> {
        Some(s.parse().unwrap())
    }

    #[test]
    fn test_reached_destination() {
        let hops = vec![TraceHop::new(1, ip("10.0.0.1")), TraceHop::new(2, ip("9.9.9.9"))];
        let result = PathProbeResult::from_hops("x.com", hops, ip("9.9.9.9"), false, false, false);
        assert!(result.reached_destination);
        assert_eq!(result.termination_reason, TerminationReason::ReachedDestination);
    }

    #[test]
    fn test_trailing_silent_hops_do_not_hide_destination() {
        let hops = vec![
            TraceHop::new(1, ip("10.0.0.1")),
            TraceHop::new(2, ip("9.9.9.9")),
            TraceHop::silent(3),
        ];
        let result = PathProbeResult::from_hops("x.com", hops, ip("9.9.9.9"), false, false, false);
        assert!(result.reached_destination);
    }

    #[test]
    fn test_truncated_trace() {
        let hops = vec![
            TraceHop::silent(1),
            TraceHop::new(2, ip("5.6.7.8")),
            TraceHop::silent(3),
            TraceHop::silent(4),
        ];
        let result = PathProbeResult::from_hops("x.com", hops, ip("9.9.9.9"), false, false, false);
        assert!(!result.reached_destination);
        assert_eq!(result.termination_reason, TerminationReason::NoResponse);
        assert_eq!(result.last_responsive_hop(), ip("5.6.7.8"));
    }

    #[test]
    fn test_timeout_and_tool_failure() {
        let timed = PathProbeResult::from_hops("x.com", vec![TraceHop::silent(1)], ip("9.9.9.9"), false, true, false);
        assert_eq!(timed.termination_reason, TerminationReason::Timeout);

        let failed = PathProbeResult::from_hops("x.com", Vec::new(), ip("9.9.9.9"), false, false, true);
        assert_eq!(failed.termination_reason, TerminationReason::CommandFailure);
        assert!(!failed.has_usable_hops());

        // a failing exit after real hops is still a network observation
        let partial =
            PathProbeResult::from_hops("x.com", vec![TraceHop::new(1, ip("10.0.0.1"))], ip("9.9.9.9"), false, false, true);
        assert_eq!(partial.termination_reason, TerminationReason::NoResponse);
    }

    #[test]
    fn test_unresolved_destination_never_reached() {
        let hops = vec![TraceHop::new(1, ip("10.0.0.1"))];
        let result = PathProbeResult::from_hops("x.com", hops, None, false, false, false);
        assert!(!result.reached_destination);
    }
}
