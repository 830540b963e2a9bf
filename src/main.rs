//! gfwprobe - DNS污染与路径阻断检测工具
//!
//! Binary entry point for the gfwprobe CLI application.

#![warn(clippy::all, warnings)]
#![warn(clippy::pedantic, clippy::nursery)]

use anyhow::{bail, Context};
use gfwprobe::cli::{Commands, DomainArgs, OutputFormat};
use gfwprobe::config::{ConfigLoader, Settings};
use gfwprobe::dns::{DomainPoisoningRecord, PollutionChecker, ResolverDirectory};
use gfwprobe::trace::{CensorshipLocalization, Localizer, PathProbeResult, PathProber, TraceOptions};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Set up logging based on verbosity level.
///
/// # Arguments
///
/// * `verbose` - Enable debug-level logging
/// * `quiet` - Enable error-level only logging
fn setup_logging(verbose: bool, quiet: bool) {
    let level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().without_time().with_writer(std::io::stderr))
        .init();
}

/// Load settings from an explicit file or the user config directory.
fn load_settings(path: Option<PathBuf>) -> anyhow::Result<Settings> {
    match path {
        Some(path) => ConfigLoader::load_settings(&path)
            .with_context(|| format!("failed to load settings from {}", path.display())),
        None => Ok(ConfigLoader::load_default_settings()?),
    }
}

/// Load the resolver directory from command-line arguments, a file, or the default location.
///
/// # Arguments
///
/// * `file` - Optional directory file (CSV or JSON)
/// * `dns_args` - Optional command-line resolvers (IP#Provider@region)
/// * `regions` - Restrict to these regions when non-empty
fn load_directory(file: Option<PathBuf>, dns_args: Vec<String>, regions: &[String]) -> anyhow::Result<ResolverDirectory> {
    let directory = if !dns_args.is_empty() {
        ConfigLoader::directory_from_args(dns_args)?
    } else if let Some(path) = file {
        ConfigLoader::load_directory(&path)
            .with_context(|| format!("failed to load resolvers from {}", path.display()))?
    } else {
        ConfigLoader::load_default_directory().context("no resolver directory given and no default found")?
    };

    if regions.is_empty() {
        Ok(directory)
    } else {
        Ok(directory.select(regions)?)
    }
}

/// Collect domains from positional arguments and an optional file, in that order.
fn collect_domains(args: DomainArgs) -> anyhow::Result<Vec<String>> {
    if args.is_empty() {
        bail!("no domains given; pass them as arguments or with --file");
    }

    let mut domains = args.domains;
    if let Some(path) = args.file {
        domains.extend(
            ConfigLoader::load_domains(&path)
                .with_context(|| format!("failed to read domains from {}", path.display()))?,
        );
    }
    if domains.is_empty() {
        bail!("domain list is empty");
    }
    Ok(domains)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Run the DNS poisoning comparison and output records.
async fn run_poison(
    settings: Settings,
    domains: DomainArgs,
    resolvers: Option<PathBuf>,
    dns_servers: Vec<String>,
    regions: &[String],
    format: OutputFormat,
) -> anyhow::Result<()> {
    let directory = load_directory(resolvers, dns_servers, regions)?;
    let domains = collect_domains(domains)?;

    tracing::info!(
        "Comparing {} domains across {} resolvers in {} regions",
        domains.len(),
        directory.len(),
        directory.groups().len()
    );

    let checker = PollutionChecker::new(directory, settings.dns);
    let records = checker.compare_all(&domains).await?;

    match format {
        OutputFormat::Json => print_json(&records)?,
        OutputFormat::Table => print_poison_table(&records),
    }
    Ok(())
}

/// Print poisoning records in table format.
fn print_poison_table(records: &[DomainPoisoningRecord]) {
    println!("{:<4} {:<28} {:<14} {:<12} {}", "#", "域名", "结果", "区域", "解析");
    println!("{}", "-".repeat(90));

    for (idx, record) in records.iter().enumerate() {
        let regions: BTreeSet<&String> = record
            .per_group_addresses
            .keys()
            .chain(record.per_group_errors.keys())
            .collect();

        if regions.is_empty() {
            println!("{:<4} {:<28} {:<14}", idx + 1, record.domain, record.classification);
        }
        for (row, region) in regions.into_iter().enumerate() {
            let answers = describe_group(record, region);
            if row == 0 {
                println!(
                    "{:<4} {:<28} {:<14} {:<12} {}",
                    idx + 1,
                    record.domain,
                    record.classification,
                    region,
                    answers
                );
            } else {
                println!("{:<4} {:<28} {:<14} {:<12} {}", "", "", "", region, answers);
            }
        }
    }

    let suspicious = records.iter().filter(|r| r.classification.is_suspicious()).count();
    println!("\n=== 统计 ===");
    println!("域名数: {}", records.len());
    println!("疑似污染: {suspicious}");
}

fn describe_group(record: &DomainPoisoningRecord, region: &str) -> String {
    let addresses = record
        .per_group_addresses
        .get(region)
        .map(|set| set.iter().map(ToString::to_string).collect::<Vec<_>>())
        .unwrap_or_default();
    let errors = record
        .per_group_errors
        .get(region)
        .map(|set| set.iter().map(ToString::to_string).collect::<Vec<_>>())
        .unwrap_or_default();

    match (addresses.is_empty(), errors.is_empty()) {
        (false, true) => addresses.join(", "),
        (true, false) => format!("[{}]", errors.join(", ")),
        (false, false) => format!("{} [{}]", addresses.join(", "), errors.join(", ")),
        (true, true) => "-".to_string(),
    }
}

/// Path probe and localization for one domain.
#[derive(Serialize)]
struct TraceReport<'a> {
    path: &'a PathProbeResult,
    localization: &'a CensorshipLocalization,
}

/// Run path probes, localize blocking, and output records.
async fn run_trace(
    mut settings: Settings,
    domains: DomainArgs,
    ipv4_only: bool,
    max_hops: Option<u8>,
    offline_only: bool,
    no_syn: bool,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let domains = collect_domains(domains)?;

    if ipv4_only {
        settings.trace.prefer_ipv6 = false;
    }
    if let Some(hops) = max_hops {
        settings.trace.max_hops = hops;
    }
    if offline_only {
        settings.geo.offline_only = true;
    }

    let options = TraceOptions::from(&settings.trace);
    let prober = PathProber::native(settings.trace.concurrency);
    let paths = prober.trace_all(&domains, &options).await?;

    let localizer = Localizer::from_settings(&settings, !no_syn);
    let localizations = localizer.localize_all(&paths).await;

    match format {
        OutputFormat::Json => {
            let reports: Vec<_> = paths
                .iter()
                .zip(&localizations)
                .map(|(path, localization)| TraceReport { path, localization })
                .collect();
            print_json(&reports)?;
        }
        OutputFormat::Table => print_trace_table(&paths, &localizations),
    }
    Ok(())
}

/// Print path probe results in table format.
fn print_trace_table(paths: &[PathProbeResult], localizations: &[CensorshipLocalization]) {
    println!(
        "{:<4} {:<28} {:<22} {:<6} {:<40} {:<4} {:<4} {}",
        "#", "域名", "结果", "跳数", "最后响应节点", "RST", "重定向", "终止原因"
    );
    println!("{}", "-".repeat(130));

    for (idx, (path, loc)) in paths.iter().zip(localizations).enumerate() {
        let hop = loc.last_responsive_hop.map_or_else(|| "-".to_string(), |ip| ip.to_string());
        let place = loc
            .location
            .as_ref()
            .map_or_else(|| hop.clone(), |location| format!("{hop} ({location})"));
        println!(
            "{:<4} {:<28} {:<22} {:<6} {:<40} {:<4} {:<4} {}",
            idx + 1,
            path.domain,
            loc.classification,
            path.hops.len(),
            place,
            if loc.rst_detected { "是" } else { "否" },
            if loc.redirection_detected { "是" } else { "否" },
            path.termination_reason
        );
    }
}

/// List the resolver directory.
fn run_resolvers(resolvers: Option<PathBuf>, format: OutputFormat) -> anyhow::Result<()> {
    let directory = load_directory(resolvers, Vec::new(), &[])?;

    if format == OutputFormat::Json {
        let endpoints: Vec<_> = directory.endpoints().collect();
        return print_json(&endpoints);
    }

    println!("DNS服务器列表 (共 {} 个):\n", directory.len());
    println!("{:<4} {:<12} {:<24} {:<40}", "#", "区域", "提供商", "IP");
    println!("{}", "-".repeat(80));

    for (idx, endpoint) in directory.endpoints().enumerate() {
        println!(
            "{:<4} {:<12} {:<24} {:<40}",
            idx + 1,
            endpoint.region,
            endpoint.provider,
            endpoint.address
        );
    }
    Ok(())
}

/// Main entry point for the gfwprobe CLI application.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = gfwprobe::cli::parse();
    setup_logging(cli.verbose, cli.quiet);

    let settings = load_settings(cli.config)?;
    tracing::debug!("Settings: {settings:?}");

    match cli.command {
        Commands::Poison {
            domains,
            resolvers,
            dns_servers,
            regions,
        } => run_poison(settings, domains, resolvers, dns_servers, &regions, cli.format).await,

        Commands::Trace {
            domains,
            ipv4_only,
            max_hops,
            offline_only,
            no_syn,
        } => run_trace(settings, domains, ipv4_only, max_hops, offline_only, no_syn, cli.format).await,

        Commands::Resolvers { resolvers } => run_resolvers(resolvers, cli.format),
    }
}
