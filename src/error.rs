//! Error types module.
//!
//! Only configuration and precondition failures surface as [`Error`]; individual
//! probe and lookup failures are folded into typed outcomes by the engines.

use thiserror::Error;

/// A specialized `Result` type for gfwprobe operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error enum for gfwprobe.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (configuration files, domain lists)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error (settings, resolver directory)
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV parsing error (resolver directory, domain lists)
    #[error("CSV parse error: {0}")]
    Csv(#[from] csv::Error),

    /// HTTP client construction error
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// DNS resolver construction error
    #[error("DNS resolver error: {0}")]
    Resolver(#[from] trust_dns_resolver::error::ResolveError),

    /// Configuration error (invalid settings, missing files)
    #[error("Config error: {0}")]
    Config(String),

    /// Parse error (invalid input format, malformed data)
    #[error("Parse error: {0}")]
    Parse(String),

    /// Domain name failed syntax validation before probing
    #[error("Invalid domain name: {0}")]
    InvalidDomain(String),

    /// No resolvers configured for a comparison
    #[error("Resolver directory is empty")]
    EmptyDirectory,
}

impl Error {
    /// Create a new configuration error with a message.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new parse error with a message.
    #[must_use]
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Create a new invalid-domain error.
    #[must_use]
    pub fn invalid_domain(domain: impl Into<String>) -> Self {
        Self::InvalidDomain(domain.into())
    }
}

/// Geolocation failure taxonomy.
///
/// These never abort a localization; they only explain why a location is absent.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GeoError {
    /// Online provider unreachable or rejected the query
    #[error("online IP lookup failed: {reason}")]
    OnlineLookupFailed {
        reason: String,
        /// Transport-level failure worth another attempt
        retryable: bool,
    },

    /// Address absent from the offline database
    #[error("IP address not found in local database")]
    NotFoundLocally,

    /// Offline database could not be opened or read
    #[error("local IP lookup failed: {0}")]
    LocalLookupFailed(String),
}

impl GeoError {
    /// Whether a retry of the same request could plausibly succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::OnlineLookupFailed { retryable: true, .. })
    }

    /// Online failure caused by the transport (timeout, connection reset).
    #[must_use]
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::OnlineLookupFailed {
            reason: reason.into(),
            retryable: true,
        }
    }

    /// Online failure reported by the provider itself.
    #[must_use]
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::OnlineLookupFailed {
            reason: reason.into(),
            retryable: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            Error::invalid_domain("bad..name").to_string(),
            "Invalid domain name: bad..name"
        );
        assert_eq!(Error::EmptyDirectory.to_string(), "Resolver directory is empty");
        assert_eq!(Error::config("x").to_string(), "Config error: x");
    }

    #[test]
    fn test_geo_error_transient() {
        assert!(GeoError::transport("connection reset").is_transient());
        assert!(!GeoError::rejected("status fail").is_transient());
        assert!(!GeoError::NotFoundLocally.is_transient());
    }
}
