//! DNS queries used by the risk checks.

use crate::types::{HijackError, Result};
use async_trait::async_trait;
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tracing::trace;
use trust_dns_resolver::config::{NameServerConfig, Protocol, ResolverConfig, ResolverOpts};
use trust_dns_resolver::error::{ResolveError, ResolveErrorKind};
use trust_dns_resolver::TokioAsyncResolver;

/// The DNS record lookups needed by the checks.
///
/// "No such name" and "no records" are empty answers, not errors.
#[async_trait]
pub trait DnsBackend: Send + Sync {
    async fn mx(&self, domain: &str) -> Result<Vec<String>>;
    async fn ns(&self, domain: &str) -> Result<Vec<String>>;
    async fn addresses(&self, host: &str) -> Result<Vec<IpAddr>>;
}

/// Resolver talking to a fixed list of upstream servers.
pub struct TrustDnsBackend {
    resolver: TokioAsyncResolver,
    /// Bound on one query including all retries.
    timeout: Duration,
}

impl TrustDnsBackend {
    /// Create a resolver over `servers`, retrying each query `attempts` times.
    /// `timeout` applies to each attempt and to the query as a whole.
    pub fn new(servers: &[SocketAddr], attempts: usize, timeout: Duration) -> Result<Self> {
        if servers.is_empty() {
            return Err(HijackError::ConfigError(
                "at least one DNS server is required".to_string(),
            ));
        }

        let mut config = ResolverConfig::new();
        for server in servers {
            config.add_name_server(NameServerConfig {
                socket_addr: *server,
                protocol: Protocol::Udp,
                tls_dns_name: None,
                trust_negative_responses: false,
                bind_addr: None,
            });
        }

        let mut opts = ResolverOpts::default();
        opts.attempts = attempts.max(1);
        opts.timeout = timeout;
        // Results are memoized by the lookup cache.
        opts.cache_size = 0;

        Ok(Self {
            resolver: TokioAsyncResolver::tokio(config, opts),
            timeout,
        })
    }
}

/// Query names are made absolute so the system search list is never appended.
fn fqdn(name: &str) -> String {
    if name.ends_with('.') {
        name.to_string()
    } else {
        format!("{}.", name)
    }
}

fn strip_root(name: String) -> String {
    name.trim_end_matches('.').to_string()
}

/// Map "no records" to an empty answer and keep real failures.
fn empty_on_no_records<T>(name: &str, err: ResolveError) -> Result<Vec<T>> {
    match err.kind() {
        ResolveErrorKind::NoRecordsFound { .. } => {
            trace!("no records for {}", name);
            Ok(Vec::new())
        }
        _ => Err(HijackError::DnsError {
            name: name.to_string(),
            message: err.to_string(),
        }),
    }
}

/// Fail with [`HijackError::Timeout`] if `query` does not finish within `limit`.
async fn deadline<T>(
    limit: Duration,
    target: String,
    query: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(limit, query).await {
        Ok(result) => result,
        Err(_) => Err(HijackError::Timeout { target }),
    }
}

#[async_trait]
impl DnsBackend for TrustDnsBackend {
    async fn mx(&self, domain: &str) -> Result<Vec<String>> {
        deadline(self.timeout, format!("MX for {}", domain), async {
            match self.resolver.mx_lookup(fqdn(domain)).await {
                Ok(lookup) => Ok(lookup
                    .iter()
                    .map(|mx| strip_root(mx.exchange().to_utf8()))
                    .collect()),
                Err(e) => empty_on_no_records(domain, e),
            }
        })
        .await
    }

    async fn ns(&self, domain: &str) -> Result<Vec<String>> {
        deadline(self.timeout, format!("NS for {}", domain), async {
            match self.resolver.ns_lookup(fqdn(domain)).await {
                Ok(lookup) => Ok(lookup
                    .iter()
                    .map(|ns| strip_root(ns.0.to_utf8()))
                    .collect()),
                Err(e) => empty_on_no_records(domain, e),
            }
        })
        .await
    }

    async fn addresses(&self, host: &str) -> Result<Vec<IpAddr>> {
        deadline(self.timeout, format!("addresses for {}", host), async {
            match self.resolver.lookup_ip(fqdn(host)).await {
                Ok(lookup) => Ok(lookup.iter().collect()),
                Err(e) => empty_on_no_records(host, e),
            }
        })
        .await
    }
}
