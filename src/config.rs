//! Command line configuration.

use crate::types::{HijackError, Result};
use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_DNS_SERVERS: &str =
    "1.1.1.1:53,8.8.8.8:53,8.8.4.4:53,1.0.0.1:53,208.67.222.222:53,208.67.220.220:53";

/// Package registries that can be scanned.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryKind {
    Npm,
    Pypi,
}

/// Finds package maintainers whose email domain can be registered by anyone.
#[derive(Parser, Debug, Clone)]
#[command(name = "maintainer-hijack")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Registry to scan
    #[arg(long, value_enum, default_value = "npm")]
    pub registry: RegistryKind,

    /// Local copy of the npm `_all_docs` package index
    #[arg(long, default_value = "_all_docs")]
    pub localfile: PathBuf,

    /// DNS retry attempts
    #[arg(long, default_value = "3")]
    pub retries: usize,

    /// DNS servers to use, comma separated
    #[arg(
        long = "dns-server",
        env = "MAINTAINER_HIJACK_DNS_SERVERS",
        default_value = DEFAULT_DNS_SERVERS
    )]
    pub dns_servers: String,

    /// Also report domains that expire soon
    #[arg(long)]
    pub expired: bool,

    /// Window in days for --expired
    #[arg(long, default_value = "7")]
    pub expiry_days: i64,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Number of packages checked in parallel
    #[arg(long, default_value = "10")]
    pub threads: usize,

    /// Log file, console output is mirrored into it
    #[arg(long, default_value = "output.txt")]
    pub log: PathBuf,

    /// Timeout in seconds for every network call
    #[arg(long, default_value = "60")]
    pub timeout: u64,

    /// Registry requests per second
    #[arg(long, default_value = "10")]
    pub rate_limit: u32,

    /// WHOIS queries per second (0 disables the limit)
    #[arg(long, default_value = "5")]
    pub whois_rate_limit: u32,

    /// Additionally write findings as JSON lines to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl Config {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// Parse `--dns-server` into socket addresses. A bare IP gets port 53.
    pub fn dns_servers(&self) -> Result<Vec<SocketAddr>> {
        parse_dns_servers(&self.dns_servers)
    }
}

fn parse_dns_servers(raw: &str) -> Result<Vec<SocketAddr>> {
    let servers = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<SocketAddr>()
                .or_else(|_| s.parse::<std::net::IpAddr>().map(|ip| SocketAddr::new(ip, 53)))
                .map_err(|_| HijackError::ConfigError(format!("invalid DNS server {:?}", s)))
        })
        .collect::<Result<Vec<_>>>()?;

    if servers.is_empty() {
        return Err(HijackError::ConfigError("no DNS servers given".to_string()));
    }
    Ok(servers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::parse_from(["maintainer-hijack"]);

        assert_eq!(config.registry, RegistryKind::Npm);
        assert_eq!(config.localfile, PathBuf::from("_all_docs"));
        assert_eq!(config.retries, 3);
        assert_eq!(config.threads, 10);
        assert_eq!(config.expiry_days, 7);
        assert_eq!(config.timeout(), Duration::from_secs(60));
        assert!(!config.expired);
        assert!(config.output.is_none());
    }

    #[test]
    fn test_flags() {
        let config = Config::parse_from([
            "maintainer-hijack",
            "--registry",
            "pypi",
            "--expired",
            "--expiry-days",
            "30",
            "--threads",
            "4",
            "--dns-server",
            "9.9.9.9:53",
            "-o",
            "findings.jsonl",
        ]);

        assert_eq!(config.registry, RegistryKind::Pypi);
        assert!(config.expired);
        assert_eq!(config.expiry_days, 30);
        assert_eq!(config.threads, 4);
        assert_eq!(config.dns_servers().unwrap(), vec!["9.9.9.9:53".parse().unwrap()]);
        assert_eq!(config.output, Some(PathBuf::from("findings.jsonl")));
    }

    #[test]
    fn test_default_dns_servers_parse() {
        let servers = parse_dns_servers(DEFAULT_DNS_SERVERS).unwrap();
        assert_eq!(servers.len(), 6);
        assert_eq!(servers[0], "1.1.1.1:53".parse().unwrap());
    }

    #[test]
    fn test_dns_servers_accept_bare_ips() {
        let servers = parse_dns_servers("9.9.9.9, [2620:fe::fe]:53").unwrap();
        assert_eq!(
            servers,
            vec![
                "9.9.9.9:53".parse::<SocketAddr>().unwrap(),
                "[2620:fe::fe]:53".parse().unwrap(),
            ]
        );
    }

    #[test]
    fn test_invalid_dns_server_is_config_error() {
        assert!(matches!(
            parse_dns_servers("1.1.1.1:53,dns.example"),
            Err(HijackError::ConfigError(_))
        ));
        assert!(matches!(parse_dns_servers(" , "), Err(HijackError::ConfigError(_))));
    }
}
