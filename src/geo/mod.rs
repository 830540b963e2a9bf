//! Geolocation module.
//!
//! Tiered IP geolocation: an online provider with bounded retries first, then a
//! local GeoLite2 database. Failures are returned as [`GeoError`] and never
//! abort the caller.

pub mod offline;
pub mod online;
pub mod retry;

pub use offline::OfflineGeolocator;
pub use online::OnlineGeolocator;
pub use retry::{RetryPolicy, Sleeper, TokioSleeper};

use crate::config::GeoSettings;
use crate::error::GeoError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

/// Placeholder for fields a provider does not know.
const UNKNOWN: &str = "Unknown";

/// Approximate location of an address.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GeoLocation {
    /// Country name
    pub country: String,
    /// Region, state or province
    pub region: String,
    /// City
    pub city: String,
}

impl GeoLocation {
    /// Create a location, substituting "Unknown" for missing parts.
    #[must_use]
    pub fn from_parts(country: Option<String>, region: Option<String>, city: Option<String>) -> Self {
        let or_unknown = |part: Option<String>| part.filter(|s| !s.is_empty()).unwrap_or_else(|| UNKNOWN.to_string());
        Self {
            country: or_unknown(country),
            region: or_unknown(region),
            city: or_unknown(city),
        }
    }
}

impl fmt::Display for GeoLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}, {}", self.country, self.region, self.city)
    }
}

/// Address → location lookup.
#[async_trait]
pub trait Geolocator: Send + Sync {
    /// Locate one address.
    async fn locate(&self, ip: IpAddr) -> Result<GeoLocation, GeoError>;
}

/// Online lookup with retries, falling back to an offline database.
pub struct TieredGeolocator {
    online: Option<Arc<dyn Geolocator>>,
    offline: Option<Arc<dyn Geolocator>>,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl TieredGeolocator {
    /// Compose the two tiers explicitly.
    #[must_use]
    pub fn new(
        online: Option<Arc<dyn Geolocator>>,
        offline: Option<Arc<dyn Geolocator>>,
        retry: RetryPolicy,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            online,
            offline,
            retry,
            sleeper,
        }
    }

    /// Build both tiers from settings.
    ///
    /// A tier that cannot be set up (HTTP client failure, unreadable database) is
    /// logged and left out; lookups then fall through to the remaining tier.
    #[must_use]
    pub fn from_settings(settings: &GeoSettings) -> Self {
        let online: Option<Arc<dyn Geolocator>> = if settings.offline_only {
            None
        } else {
            match OnlineGeolocator::new(settings.online_url.clone(), settings.online_timeout()) {
                Ok(geo) => Some(Arc::new(geo)),
                Err(e) => {
                    tracing::warn!("Online geolocation disabled: {e}");
                    None
                }
            }
        };

        let offline: Option<Arc<dyn Geolocator>> = settings.database.as_ref().and_then(|path| {
            match OfflineGeolocator::open(path) {
                Ok(geo) => Some(Arc::new(geo) as Arc<dyn Geolocator>),
                Err(e) => {
                    tracing::warn!("Offline geolocation disabled: {e}");
                    None
                }
            }
        });

        Self::new(
            online,
            offline,
            RetryPolicy::new(settings.attempts, settings.backoff()),
            Arc::new(TokioSleeper),
        )
    }
}

#[async_trait]
impl Geolocator for TieredGeolocator {
    async fn locate(&self, ip: IpAddr) -> Result<GeoLocation, GeoError> {
        let mut last_error = None;

        if let Some(online) = &self.online {
            let result = self
                .retry
                .run(self.sleeper.as_ref(), |_| online.locate(ip), GeoError::is_transient)
                .await;
            match result {
                Ok(location) => return Ok(location),
                Err(e) => {
                    tracing::warn!("Online lookup for {ip} failed, falling back: {e}");
                    last_error = Some(e);
                }
            }
        }

        if let Some(offline) = &self.offline {
            return offline.locate(ip).await;
        }

        Err(last_error.unwrap_or_else(|| GeoError::LocalLookupFailed("no geolocation provider configured".into())))
    }
}
