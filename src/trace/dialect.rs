//! Trace tool dialects.
//!
//! Each platform's trace tool takes different flags and prints hops slightly
//! differently. A [`TraceDialect`] owns both halves: building the command line and
//! turning its output into an ordered, gap-free hop list.

use super::types::TraceHop;
use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

/// Program and arguments for one trace invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceCommand {
    /// Executable name or path
    pub program: String,
    /// Arguments, target last
    pub args: Vec<String>,
}

impl TraceCommand {
    fn new(program: &str, args: Vec<String>) -> Self {
        Self {
            program: program.to_string(),
            args,
        }
    }
}

impl fmt::Display for TraceCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.program, self.args.join(" "))
    }
}

/// A trace tool's command syntax and output format.
pub trait TraceDialect: Send + Sync + fmt::Debug {
    /// Short dialect name for logs.
    fn name(&self) -> &'static str;

    /// Command tracing toward `target` (an address or host name).
    fn command(&self, target: &str, ipv6: bool, max_hops: u8, per_hop_timeout: Duration) -> TraceCommand;

    /// Parse one output line into `(hop index, first responding address)`.
    ///
    /// Lines that are not hop lines (headers, footers, continuations) yield `None`.
    fn parse_line(&self, line: &str) -> Option<(u32, Option<IpAddr>)> {
        let mut tokens = line.split_whitespace();
        let index: u32 = tokens.next()?.parse().ok()?;
        if index == 0 {
            return None;
        }
        Some((index, tokens.find_map(token_address)))
    }

    /// Parse the full tool output into hops numbered 1..=N with no gaps.
    fn parse(&self, output: &str) -> Vec<TraceHop> {
        normalize_hops(output.lines().filter_map(|line| self.parse_line(line)))
    }
}

/// Windows `tracert`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowsTracert;

impl TraceDialect for WindowsTracert {
    fn name(&self) -> &'static str {
        "windows"
    }

    fn command(&self, target: &str, ipv6: bool, max_hops: u8, per_hop_timeout: Duration) -> TraceCommand {
        let family = if ipv6 { "-6" } else { "-4" };
        TraceCommand::new(
            "tracert",
            vec![
                "-d".to_string(),
                "-h".to_string(),
                max_hops.to_string(),
                "-w".to_string(),
                per_hop_timeout.as_millis().max(1).to_string(),
                family.to_string(),
                target.to_string(),
            ],
        )
    }

    fn parse_line(&self, line: &str) -> Option<(u32, Option<IpAddr>)> {
        let mut tokens = line.split_whitespace();
        let index: u32 = tokens.next()?.parse().ok()?;
        // "  3     *        *        *     Request timed out."
        if line.contains("Request timed out") {
            return Some((index, None));
        }
        // the host column comes after the three RTT columns; take the last address
        let address = tokens.filter_map(token_address).last();
        Some((index, address))
    }
}

/// Linux `traceroute` from the traceroute package.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinuxTraceroute;

impl TraceDialect for LinuxTraceroute {
    fn name(&self) -> &'static str {
        "linux"
    }

    fn command(&self, target: &str, ipv6: bool, max_hops: u8, per_hop_timeout: Duration) -> TraceCommand {
        let mut args = vec![
            "-n".to_string(),
            "-m".to_string(),
            max_hops.to_string(),
            "-w".to_string(),
            whole_seconds(per_hop_timeout),
        ];
        if ipv6 && program_on_path("traceroute6") {
            args.push(target.to_string());
            return TraceCommand::new("traceroute6", args);
        }
        if ipv6 {
            args.insert(0, "-6".to_string());
        }
        args.push(target.to_string());
        TraceCommand::new("traceroute", args)
    }
}

/// macOS `traceroute` / `traceroute6`.
///
/// Additional responders for the same TTL are printed on indented continuation
/// lines without a hop number; the default line parser skips them.
#[derive(Debug, Clone, Copy, Default)]
pub struct MacTraceroute;

impl TraceDialect for MacTraceroute {
    fn name(&self) -> &'static str {
        "macos"
    }

    fn command(&self, target: &str, ipv6: bool, max_hops: u8, per_hop_timeout: Duration) -> TraceCommand {
        let program = if ipv6 { "traceroute6" } else { "traceroute" };
        TraceCommand::new(
            program,
            vec![
                "-n".to_string(),
                "-m".to_string(),
                max_hops.to_string(),
                "-w".to_string(),
                whole_seconds(per_hop_timeout),
                target.to_string(),
            ],
        )
    }
}

/// Dialect for an operating system name as reported by `std::env::consts::OS`.
#[must_use]
pub fn dialect_for_os(os: &str) -> Option<Box<dyn TraceDialect>> {
    match os {
        "windows" => Some(Box::new(WindowsTracert)),
        "linux" | "android" | "freebsd" | "openbsd" | "netbsd" => Some(Box::new(LinuxTraceroute)),
        "macos" | "ios" => Some(Box::new(MacTraceroute)),
        _ => None,
    }
}

/// Dialect for the running platform.
#[must_use]
pub fn native_dialect() -> Option<Box<dyn TraceDialect>> {
    dialect_for_os(std::env::consts::OS)
}

/// Interpret one output token as an address, stripping `()`/`[]` decoration.
fn token_address(token: &str) -> Option<IpAddr> {
    token
        .trim_matches(|c| matches!(c, '(' | ')' | '[' | ']' | ','))
        .parse()
        .ok()
}

/// Order hops, keep the first answer per index and fill gaps with silent hops.
fn normalize_hops(parsed: impl IntoIterator<Item = (u32, Option<IpAddr>)>) -> Vec<TraceHop> {
    let mut by_index: BTreeMap<u32, Option<IpAddr>> = BTreeMap::new();
    for (index, address) in parsed {
        let slot = by_index.entry(index).or_insert(None);
        if slot.is_none() {
            *slot = address;
        }
    }

    let last = by_index.keys().next_back().copied().unwrap_or(0);
    (1..=last)
        .map(|index| TraceHop::new(index, by_index.get(&index).copied().flatten()))
        .collect()
}

fn whole_seconds(duration: Duration) -> String {
    duration.as_secs().max(1).to_string()
}

/// Whether an executable with this name exists on `PATH`.
fn program_on_path(program: &str) -> bool {
    std::env::var_os("PATH").is_some_and(|paths| {
        std::env::split_paths(&paths).any(|dir| Path::new(&dir).join(program).is_file())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> Option<IpAddr> {
        Some(s.parse().unwrap())
    }

    const LINUX_OUTPUT: &str = "\
traceroute to 142.250.72.14 (142.250.72.14), 30 hops max, 60 byte packets
 1  192.168.1.1  0.512 ms  0.498 ms  0.487 ms
 2  * * *
 3  10.10.0.1  3.112 ms 10.10.0.2  3.200 ms  3.301 ms
 4  202.97.12.1  20.1 ms !H  * *
 5  * * *
";

    #[test]
    fn test_linux_parse() {
        let hops = LinuxTraceroute.parse(LINUX_OUTPUT);
        assert_eq!(hops.len(), 5);
        assert_eq!(hops[0], TraceHop::new(1, ip("192.168.1.1")));
        assert_eq!(hops[1], TraceHop::silent(2));
        assert_eq!(hops[2].address, ip("10.10.0.1"));
        assert_eq!(hops[3].address, ip("202.97.12.1"));
        assert_eq!(hops[4], TraceHop::silent(5));
    }

    #[test]
    fn test_linux_ipv6_parse() {
        let output = "\
traceroute to 2404:6800:4005:80f::200e (2404:6800:4005:80f::200e), 30 hops max, 80 byte packets
 1  2001:db8:1::1  1.001 ms  0.950 ms  0.900 ms
 2  *  *  *
 3  2404:6800:4005:80f::200e  30.1 ms  29.8 ms  29.9 ms
";
        let hops = LinuxTraceroute.parse(output);
        assert_eq!(hops.len(), 3);
        assert_eq!(hops[0].address, ip("2001:db8:1::1"));
        assert_eq!(hops[2].address, ip("2404:6800:4005:80f::200e"));
    }

    #[test]
    fn test_windows_parse() {
        let output = "\
Tracing route to 142.250.72.14 over a maximum of 30 hops

  1    <1 ms    <1 ms    <1 ms  192.168.0.1
  2     *        *        *     Request timed out.
  3     7 ms     6 ms     6 ms  61.152.24.1
  4    12 ms    11 ms    12 ms  host.example [202.97.33.10]

Trace complete.
";
        let hops = WindowsTracert.parse(output);
        assert_eq!(hops.len(), 4);
        assert_eq!(hops[0].address, ip("192.168.0.1"));
        assert_eq!(hops[1], TraceHop::silent(2));
        assert_eq!(hops[2].address, ip("61.152.24.1"));
        assert_eq!(hops[3].address, ip("202.97.33.10"));
    }

    #[test]
    fn test_mac_parse_ignores_continuations() {
        let output = "\
traceroute to 93.184.216.34 (93.184.216.34), 64 hops max, 52 byte packets
 1  192.168.1.254  2.345 ms  1.901 ms  1.876 ms
 2  100.64.0.1  9.1 ms
    100.64.0.2  9.4 ms
 3  * * *
";
        let hops = MacTraceroute.parse(output);
        assert_eq!(hops.len(), 3);
        assert_eq!(hops[1].address, ip("100.64.0.1"));
        assert_eq!(hops[2], TraceHop::silent(3));
    }

    #[test]
    fn test_gaps_are_filled() {
        let hops = normalize_hops(vec![(1, ip("10.0.0.1")), (4, ip("5.6.7.8"))]);
        let indices: Vec<u32> = hops.iter().map(|h| h.index).collect();
        assert_eq!(indices, vec![1, 2, 3, 4]);
        assert!(hops[1].address.is_none() && hops[2].address.is_none());
    }

    #[test]
    fn test_empty_output() {
        assert!(LinuxTraceroute.parse("traceroute: unknown host\n").is_empty());
    }

    #[test]
    fn test_commands() {
        let cmd = WindowsTracert.command("1.2.3.4", false, 30, Duration::from_secs(5));
        assert_eq!(cmd.to_string(), "tracert -d -h 30 -w 5000 -4 1.2.3.4");

        let cmd = MacTraceroute.command("2001:db8::1", true, 20, Duration::from_millis(500));
        assert_eq!(cmd.to_string(), "traceroute6 -n -m 20 -w 1 2001:db8::1");

        let cmd = LinuxTraceroute.command("1.2.3.4", false, 30, Duration::from_secs(3));
        assert_eq!(cmd.to_string(), "traceroute -n -m 30 -w 3 1.2.3.4");
    }

    #[test]
    fn test_dialect_for_os() {
        assert_eq!(dialect_for_os("windows").unwrap().name(), "windows");
        assert_eq!(dialect_for_os("linux").unwrap().name(), "linux");
        assert_eq!(dialect_for_os("macos").unwrap().name(), "macos");
        assert!(dialect_for_os("plan9").is_none());
    }
}
