//! Offline IP geolocation from a MaxMind GeoLite2 City database.

use super::{GeoLocation, Geolocator};
use crate::error::GeoError;
use async_trait::async_trait;
use maxminddb::{geoip2, MaxMindDBError, Reader};
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;

/// Read-only handle to a GeoLite2 City database, shared across lookups.
#[derive(Clone)]
pub struct OfflineGeolocator {
    reader: Arc<Reader<Vec<u8>>>,
}

impl std::fmt::Debug for OfflineGeolocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineGeolocator")
            .field("database_type", &self.reader.metadata.database_type)
            .finish()
    }
}

impl OfflineGeolocator {
    /// Load the database at `path` into memory.
    ///
    /// # Errors
    ///
    /// Returns [`GeoError::LocalLookupFailed`] if the file is missing or invalid.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, GeoError> {
        let reader = Reader::open_readfile(path.as_ref())
            .map_err(|e| GeoError::LocalLookupFailed(format!("{}: {e}", path.as_ref().display())))?;
        Ok(Self {
            reader: Arc::new(reader),
        })
    }

    fn lookup(&self, ip: IpAddr) -> Result<GeoLocation, GeoError> {
        let city: geoip2::City = match self.reader.lookup(ip) {
            Ok(city) => city,
            Err(MaxMindDBError::AddressNotFoundError(_)) => return Err(GeoError::NotFoundLocally),
            Err(e) => return Err(GeoError::LocalLookupFailed(e.to_string())),
        };

        let country = city
            .country
            .as_ref()
            .and_then(|c| c.names.as_ref())
            .and_then(|names| names.get("en"))
            .map(|name| (*name).to_string());
        let region = city
            .subdivisions
            .as_ref()
            .and_then(|subs| subs.last())
            .and_then(|s| s.names.as_ref())
            .and_then(|names| names.get("en"))
            .map(|name| (*name).to_string());
        let city_name = city
            .city
            .as_ref()
            .and_then(|c| c.names.as_ref())
            .and_then(|names| names.get("en"))
            .map(|name| (*name).to_string());

        Ok(GeoLocation::from_parts(country, region, city_name))
    }
}

#[async_trait]
impl Geolocator for OfflineGeolocator {
    async fn locate(&self, ip: IpAddr) -> Result<GeoLocation, GeoError> {
        tracing::debug!("Looking up {ip} in local database");
        self.lookup(ip)
    }
}
