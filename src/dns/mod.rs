//! DNS module.
//!
//! This module provides the DNS side of the measurement:
//! - Resolver directory grouped by vantage region
//! - Single-resolver probing
//! - Cross-group poisoning comparison
//! - Core data types

pub mod directory;
pub mod pollution;
pub mod probe;
pub mod types;

pub use directory::{ResolverDirectory, ResolverEndpoint};
pub use pollution::{classify, is_bogus, PollutionChecker};
pub use probe::{normalize_domain, DnsProbe, ResolverProbe};
pub use types::*;
