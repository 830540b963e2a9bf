//! Command-line interface (CLI) argument parsing module.
//!
//! This module provides CLI argument parsing using `clap`.
//! It supports three commands: DNS poisoning comparison, path tracing with
//! censorship localization, and listing the resolver directory.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// CLI argument parser using clap derive macro.
///
/// # Example
///
/// ```ignore
/// let cli = Cli::parse();
/// match cli.command {
///     Commands::Poison { domains, .. } => { /* ... */ }
///     Commands::Trace { domains, .. } => { /* ... */ }
///     Commands::Resolvers { .. } => { /* ... */ }
/// }
/// ```
#[derive(Parser, Debug)]
#[command(
    name = "gfwprobe",
    version,
    about = "DNS污染与路径阻断检测工具",
    long_about = "Compare DNS answers across resolver regions and locate where network paths are blocked",
    infer_subcommands = true
)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Quiet mode (only errors)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Output format
    #[arg(long, global = true, default_value = "table")]
    pub format: OutputFormat,

    /// Settings file (JSON); defaults to the user config directory
    #[arg(long, global = true, env = "GFWPROBE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for CLI commands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Table format (default, human-readable)
    #[default]
    Table,
    /// JSON format
    Json,
}

impl OutputFormat {
    /// Get all available output format names.
    #[must_use]
    pub fn names() -> &'static [&'static str] {
        &["table", "json"]
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            _ => Err(format!(
                "Unknown format: {}. Valid options are: {:?}",
                s,
                Self::names()
            )),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Table => write!(f, "table"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// Where the domains to probe come from.
#[derive(Debug, Args)]
pub struct DomainArgs {
    /// Domains to probe
    pub domains: Vec<String>,

    /// Read domains from a file (one per line, first CSV column)
    #[arg(short, long)]
    pub file: Option<PathBuf>,
}

impl DomainArgs {
    /// Whether no domain source was given.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.domains.is_empty() && self.file.is_none()
    }
}

/// Available commands for the gfwprobe CLI.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// DNS污染检测
    ///
    /// Query every resolver of every region for each domain and classify how
    /// the per-region answers differ.
    #[command(alias = "p")]
    Poison {
        #[command(flatten)]
        domains: DomainArgs,

        /// Resolver directory file (CSV `region,address,provider` or JSON)
        #[arg(short, long)]
        resolvers: Option<PathBuf>,

        /// Custom resolvers (format: IP#Provider@region)
        #[arg(long = "dns")]
        dns_servers: Vec<String>,

        /// Only compare these regions
        #[arg(long = "region")]
        regions: Vec<String>,
    },

    /// 路径阻断定位
    ///
    /// Trace the path toward each domain and locate where it stops, with SYN
    /// probing and geolocation of the last responsive hop.
    #[command(alias = "t")]
    Trace {
        #[command(flatten)]
        domains: DomainArgs,

        /// Never trace over IPv6
        #[arg(long = "ipv4")]
        ipv4_only: bool,

        /// Maximum number of hops
        #[arg(short, long)]
        max_hops: Option<u8>,

        /// Skip online geolocation
        #[arg(long)]
        offline_only: bool,

        /// Skip SYN probing of hops
        #[arg(long)]
        no_syn: bool,
    },

    /// 列出DNS服务器
    ///
    /// List the resolver directory grouped by region.
    #[command(alias = "l")]
    Resolvers {
        /// Resolver directory file
        #[arg(short, long)]
        resolvers: Option<PathBuf>,
    },
}

/// Parse CLI arguments.
#[must_use]
pub fn parse() -> Cli {
    Cli::parse()
}
