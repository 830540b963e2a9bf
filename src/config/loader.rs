//! Configuration loader.
//!
//! Loads settings from JSON, the resolver directory from CSV or JSON, and domain
//! lists from plain text or CSV files.

use crate::config::Settings;
use crate::dns::{ResolverDirectory, ResolverEndpoint};
use crate::error::{Error, Result};
use serde::Deserialize;
use std::io::Read;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

/// Region assigned to resolvers given on the command line without one.
const DEFAULT_REGION: &str = "custom";

/// One row of a resolver CSV file: `region,address,provider`.
#[derive(Debug, Deserialize)]
struct ResolverRow {
    region: String,
    address: String,
    #[serde(default)]
    provider: String,
}

/// JSON resolver file layout.
#[derive(Debug, Deserialize)]
struct ResolverFile {
    resolvers: Vec<ResolverRow>,
}

/// Configuration loader.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Get the config directory path.
    #[must_use]
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("gfwprobe")
    }

    /// Load settings from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<Settings> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let settings: Settings = serde_json::from_str(&content)?;
        Ok(settings)
    }

    /// Load settings from `$CONFIG_DIR/gfwprobe/config.json`, or defaults when absent.
    ///
    /// # Errors
    ///
    /// Returns an error only if the file exists but is invalid.
    pub fn load_default_settings() -> Result<Settings> {
        let path = Self::config_dir().join("config.json");
        if path.exists() {
            tracing::debug!("Loading settings from {}", path.display());
            Self::load_settings(path)
        } else {
            Ok(Settings::default())
        }
    }

    /// Load the resolver directory from a `.json` or CSV file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, a row has a malformed address,
    /// or the directory ends up empty.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let directory = ConfigLoader::load_directory("dns_servers.csv")?;
    /// for region in directory.regions() {
    ///     println!("{region}");
    /// }
    /// ```
    pub fn load_directory<P: AsRef<Path>>(path: P) -> Result<ResolverDirectory> {
        let path = path.as_ref();
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        if is_json {
            let content = std::fs::read_to_string(path)?;
            let file: ResolverFile = serde_json::from_str(&content)?;
            Self::directory_from_rows(file.resolvers)
        } else {
            Self::directory_from_csv(std::fs::File::open(path)?)
        }
    }

    /// Load the resolver directory from `$CONFIG_DIR/gfwprobe/dns_servers.csv`.
    ///
    /// # Errors
    ///
    /// Returns a config error if the default file does not exist.
    pub fn load_default_directory() -> Result<ResolverDirectory> {
        let path = Self::config_dir().join("dns_servers.csv");
        if !path.exists() {
            return Err(Error::config(format!(
                "No resolver directory found at {}. Pass one with --resolvers.",
                path.display()
            )));
        }
        Self::load_directory(path)
    }

    /// Parse a `region,address,provider` CSV with a header row.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed rows or addresses, or an empty directory.
    pub fn directory_from_csv<R: Read>(reader: R) -> Result<ResolverDirectory> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(reader);

        let rows = csv_reader
            .deserialize::<ResolverRow>()
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Self::directory_from_rows(rows)
    }

    fn directory_from_rows(rows: Vec<ResolverRow>) -> Result<ResolverDirectory> {
        let mut endpoints = Vec::with_capacity(rows.len());
        for row in rows {
            let address: IpAddr = row
                .address
                .parse()
                .map_err(|_| Error::parse(format!("Invalid IP address: {}", row.address)))?;
            let provider = if row.provider.is_empty() {
                row.address.clone()
            } else {
                row.provider
            };
            endpoints.push(ResolverEndpoint::new(address, row.region, provider));
        }
        ResolverDirectory::from_endpoints(endpoints)
    }

    /// Build a directory from command-line arguments.
    ///
    /// Each argument has the form `IP[#Provider][@region]`.
    ///
    /// # Errors
    ///
    /// Returns an error if any IP address is invalid or no arguments are given.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let args = vec!["8.8.8.8#Google@global".to_string(), "114.114.114.114@china".to_string()];
    /// let directory = ConfigLoader::directory_from_args(args)?;
    /// ```
    pub fn directory_from_args(args: Vec<String>) -> Result<ResolverDirectory> {
        let mut endpoints = Vec::with_capacity(args.len());
        for arg in args {
            let (rest, region) = match arg.rsplit_once('@') {
                Some((rest, region)) => (rest, region.trim()),
                None => (arg.as_str(), DEFAULT_REGION),
            };
            let (ip, provider) = match rest.split_once('#') {
                Some((ip, provider)) => (ip.trim(), provider.trim()),
                None => (rest.trim(), rest.trim()),
            };

            let address: IpAddr = ip
                .parse()
                .map_err(|_| Error::parse(format!("Invalid IP address: {ip}")))?;
            endpoints.push(ResolverEndpoint::new(address, region, provider));
        }
        ResolverDirectory::from_endpoints(endpoints)
    }

    /// Load a domain list: first column of each line, skipping blanks, `#`
    /// comments and a leading `domain` header.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn load_domains<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Ok(Self::parse_domains(&content))
    }

    /// Parse domain list content.
    #[must_use]
    pub fn parse_domains(content: &str) -> Vec<String> {
        content
            .lines()
            .map(|line| line.split(',').next().unwrap_or("").trim())
            .filter(|first| !first.is_empty() && !first.starts_with('#'))
            .enumerate()
            .filter(|(idx, first)| !(*idx == 0 && first.eq_ignore_ascii_case("domain")))
            .map(|(_, first)| first.to_string())
            .collect()
    }
}
