//! Resolver directory.
//!
//! An immutable set of resolvers grouped by vantage region. Built once at startup
//! and shared read-only by every comparison.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;

/// A single DNS resolver and the vantage group it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ResolverEndpoint {
    /// Resolver address, used as the only nameserver for its queries
    pub address: IpAddr,
    /// Vantage group label (e.g. "china", "global")
    pub region: String,
    /// Operator name (e.g. "China Mobile", "Google")
    pub provider: String,
}

impl ResolverEndpoint {
    /// Create a new resolver endpoint.
    pub fn new(address: IpAddr, region: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            address,
            region: region.into(),
            provider: provider.into(),
        }
    }
}

/// Resolvers grouped by region.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResolverDirectory {
    groups: BTreeMap<String, Vec<ResolverEndpoint>>,
}

impl ResolverDirectory {
    /// Build a directory from a flat list of endpoints.
    ///
    /// Duplicate addresses within one region are dropped, keeping the first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyDirectory`] if no endpoints are given.
    pub fn from_endpoints(endpoints: impl IntoIterator<Item = ResolverEndpoint>) -> Result<Self> {
        let mut groups: BTreeMap<String, Vec<ResolverEndpoint>> = BTreeMap::new();
        for endpoint in endpoints {
            let group = groups.entry(endpoint.region.clone()).or_default();
            if group.iter().any(|e| e.address == endpoint.address) {
                tracing::debug!(
                    "Skipping duplicate resolver {} in region {}",
                    endpoint.address,
                    endpoint.region
                );
                continue;
            }
            group.push(endpoint);
        }

        if groups.is_empty() {
            return Err(Error::EmptyDirectory);
        }
        Ok(Self { groups })
    }

    /// Resolvers of one region.
    #[must_use]
    pub fn group(&self, region: &str) -> Option<&[ResolverEndpoint]> {
        self.groups.get(region).map(Vec::as_slice)
    }

    /// All region names, sorted.
    pub fn regions(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    /// Region → resolvers mapping.
    #[must_use]
    pub fn groups(&self) -> &BTreeMap<String, Vec<ResolverEndpoint>> {
        &self.groups
    }

    /// Restrict the directory to the named regions.
    ///
    /// # Errors
    ///
    /// Returns a config error naming the first unknown region.
    pub fn select(&self, regions: &[String]) -> Result<Self> {
        let mut groups = BTreeMap::new();
        for region in regions {
            let members = self
                .groups
                .get(region)
                .ok_or_else(|| Error::config(format!("Unknown resolver region: {region}")))?;
            groups.insert(region.clone(), members.clone());
        }
        if groups.is_empty() {
            return Err(Error::EmptyDirectory);
        }
        Ok(Self { groups })
    }

    /// Iterate over every endpoint, region by region.
    pub fn endpoints(&self) -> impl Iterator<Item = &ResolverEndpoint> {
        self.groups.values().flatten()
    }

    /// Total number of resolvers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    /// Check if the directory has no resolvers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ep(ip: &str, region: &str) -> ResolverEndpoint {
        ResolverEndpoint::new(ip.parse().unwrap(), region, "P")
    }

    #[test]
    fn test_directory_groups_and_dedup() {
        let dir = ResolverDirectory::from_endpoints(vec![
            ep("8.8.8.8", "global"),
            ep("1.1.1.1", "global"),
            ep("8.8.8.8", "global"),
            ep("114.114.114.114", "china"),
        ])
        .unwrap();

        assert_eq!(dir.len(), 3);
        assert_eq!(dir.regions().collect::<Vec<_>>(), vec!["china", "global"]);
        assert_eq!(dir.group("global").unwrap().len(), 2);
        assert!(dir.group("europe").is_none());
    }

    #[test]
    fn test_directory_same_address_in_two_regions() {
        let dir =
            ResolverDirectory::from_endpoints(vec![ep("8.8.8.8", "a"), ep("8.8.8.8", "b")]).unwrap();
        assert_eq!(dir.len(), 2);
    }

    #[test]
    fn test_empty_directory_rejected() {
        let result = ResolverDirectory::from_endpoints(Vec::new());
        assert!(matches!(result, Err(Error::EmptyDirectory)));
    }

    #[test]
    fn test_select_regions() {
        let dir = ResolverDirectory::from_endpoints(vec![
            ep("8.8.8.8", "global"),
            ep("114.114.114.114", "china"),
            ep("77.88.8.8", "russia"),
        ])
        .unwrap();

        let picked = dir.select(&["china".into(), "global".into()]).unwrap();
        assert_eq!(picked.len(), 2);
        assert!(dir.select(&["mars".into()]).is_err());
    }
}
