//! gfwprobe - DNS poisoning and path blocking measurement.
//!
//! This crate provides both a library API and a CLI tool for:
//! - Comparing DNS answers for a domain across resolver groups in different regions
//! - Classifying the comparison (NXDOMAIN, bogus addresses, subsets, divergence)
//! - Tracing the forwarding path toward a domain with the platform trace tool
//! - Locating where a truncated path stops, with SYN probing and hop geolocation
//!
//! # Library Usage
//!
//! ```ignore
//! use gfwprobe::{ConfigLoader, Localizer, PathProber, PollutionChecker, TraceOptions};
//!
//! let settings = ConfigLoader::load_default_settings()?;
//! let directory = ConfigLoader::load_default_directory()?;
//!
//! // Compare resolver groups
//! let checker = PollutionChecker::new(directory, settings.dns.clone());
//! let record = checker.compare("google.com").await?;
//!
//! // Trace and localize
//! let prober = PathProber::native(settings.trace.concurrency);
//! let path = prober.trace("google.com", &TraceOptions::from(&settings.trace)).await?;
//! let localization = Localizer::from_settings(&settings, true).localize(&path).await;
//! ```
//!
//! # CLI Usage
//!
//! ```bash
//! # Compare resolver groups for domains
//! gfwprobe poison google.com twitter.com
//! gfwprobe poison --file domains.txt --region china --region overseas
//! gfwprobe poison --dns 114.114.114.114#114DNS@china --dns 8.8.8.8#Google@overseas example.com
//!
//! # Trace and localize blocking
//! gfwprobe trace google.com --ipv4 --max-hops 20
//!
//! # List the resolver directory
//! gfwprobe resolvers
//! ```

pub mod cli;
pub mod config;
pub mod dns;
pub mod error;
pub mod geo;
pub mod trace;

// Re-export commonly used types
pub use cli::{Cli, Commands, OutputFormat};
pub use config::{ConfigLoader, Settings};
pub use dns::types::{DnsErrorKind, DnsQueryOutcome, DomainPoisoningRecord, PoisoningClass, RecordType};
pub use dns::{PollutionChecker, ResolverDirectory, ResolverEndpoint};
pub use error::{Error, GeoError, Result};
pub use geo::{GeoLocation, Geolocator, TieredGeolocator};
pub use trace::types::{BlockingClass, CensorshipLocalization, PathProbeResult, TerminationReason, TraceHop};
pub use trace::{Localizer, PathProber, TraceOptions};
