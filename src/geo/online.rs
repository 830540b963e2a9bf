//! Online IP geolocation against an ip-api compatible JSON endpoint.

use super::{GeoLocation, Geolocator};
use crate::error::{Error, GeoError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::net::IpAddr;
use std::time::Duration;

/// Response body of `GET {base}{ip}`.
#[derive(Debug, Deserialize)]
struct IpApiResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    country: Option<String>,
    #[serde(default, rename = "regionName")]
    region_name: Option<String>,
    #[serde(default)]
    city: Option<String>,
}

impl IpApiResponse {
    fn into_location(self) -> std::result::Result<GeoLocation, GeoError> {
        if self.status != "success" {
            return Err(GeoError::rejected(format!(
                "status {}: {}",
                self.status,
                self.message.as_deref().unwrap_or("no message")
            )));
        }
        Ok(GeoLocation::from_parts(self.country, self.region_name, self.city))
    }
}

/// Single-attempt online geolocator. Retries are layered on top by the caller.
#[derive(Debug, Clone)]
pub struct OnlineGeolocator {
    client: reqwest::Client,
    base_url: String,
}

impl OnlineGeolocator {
    /// Create a geolocator for `base_url` (the address is appended verbatim).
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(Error::Http)?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl Geolocator for OnlineGeolocator {
    async fn locate(&self, ip: IpAddr) -> std::result::Result<GeoLocation, GeoError> {
        let url = format!("{}{ip}", self.base_url);
        tracing::debug!("Looking up {ip} online");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| GeoError::transport(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(GeoError::transport(format!("HTTP {status}")));
        }
        if !status.is_success() {
            return Err(GeoError::rejected(format!("HTTP {status}")));
        }

        let body: IpApiResponse = response
            .json()
            .await
            .map_err(|e| GeoError::rejected(format!("malformed response: {e}")))?;
        body.into_location()
    }
}
