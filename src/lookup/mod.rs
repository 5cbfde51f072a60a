//! Cached DNS and WHOIS access.
//!
//! NS and WHOIS queries are always made for the root domain. MX and address
//! queries use the name exactly as given, since a mail host usually lives
//! under a different domain than the addresses it serves.

pub mod cache;
pub mod dns;
pub mod whois;

pub use cache::LookupCache;
pub use dns::{DnsBackend, TrustDnsBackend};
pub use whois::{TcpWhoisBackend, WhoisBackend};

use crate::domain::root_domain;
use crate::types::{Result, WhoisFailure, WhoisStatus};
use governor::{Quota, RateLimiter};
use std::net::IpAddr;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

type DirectRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// DNS and WHOIS lookups memoized in a [`LookupCache`].
pub struct Lookup {
    cache: Arc<LookupCache>,
    dns: Arc<dyn DnsBackend>,
    whois: Arc<dyn WhoisBackend>,
    whois_limiter: Option<Arc<DirectRateLimiter>>,
    whois_queries: AtomicUsize,
}

impl Lookup {
    pub fn new(
        cache: Arc<LookupCache>,
        dns: Arc<dyn DnsBackend>,
        whois: Arc<dyn WhoisBackend>,
    ) -> Self {
        Self {
            cache,
            dns,
            whois,
            whois_limiter: None,
            whois_queries: AtomicUsize::new(0),
        }
    }

    /// Throttle live WHOIS queries to `per_second`. Zero disables throttling.
    pub fn with_whois_rate_limit(mut self, per_second: u32) -> Self {
        self.whois_limiter = NonZeroU32::new(per_second)
            .map(|rate| Arc::new(RateLimiter::direct(Quota::per_second(rate))));
        self
    }

    pub fn cache(&self) -> &LookupCache {
        &self.cache
    }

    /// Number of WHOIS queries actually sent so far.
    pub fn whois_queries(&self) -> usize {
        self.whois_queries.load(Ordering::Relaxed)
    }

    /// MX hostnames for `domain`. An empty list means no mail exchanger.
    pub async fn query_mx(&self, domain: &str) -> Result<Vec<String>> {
        if let Some(hit) = self.cache.mx.get(domain) {
            trace!("MX cache hit for {}", domain);
            return Ok(hit);
        }

        let mx = self
            .dns
            .mx(domain)
            .await
            .map_err(|e| e.context(format!("error when resolving MX for {}", domain)))?;
        self.cache.mx.put(domain, mx.clone());
        Ok(mx)
    }

    /// Nameservers of the root domain of `domain`.
    pub async fn query_ns(&self, domain: &str) -> Result<Vec<String>> {
        let root = root_domain(domain)
            .map_err(|e| e.context(format!("could not get root domain for {}", domain)))?;

        if let Some(hit) = self.cache.ns.get(&root) {
            trace!("NS cache hit for {}", root);
            return Ok(hit);
        }

        let ns = self
            .dns
            .ns(&root)
            .await
            .map_err(|e| e.context(format!("error when resolving NS for {}", root)))?;
        self.cache.ns.put(&root, ns.clone());
        Ok(ns)
    }

    /// A and AAAA addresses of `host`.
    pub async fn resolve_addresses(&self, host: &str) -> Result<Vec<IpAddr>> {
        if let Some(hit) = self.cache.addresses.get(host) {
            trace!("address cache hit for {}", host);
            return Ok(hit);
        }

        let addresses = self
            .dns
            .addresses(host)
            .await
            .map_err(|e| e.context(format!("error when resolving {}", host)))?;
        self.cache.addresses.put(host, addresses.clone());
        Ok(addresses)
    }

    /// Registration state of the root domain of `domain`.
    ///
    /// A failure is cached: every later query for the same root domain returns
    /// [`WhoisFailure::Repeated`] without touching the network.
    pub async fn query_whois(&self, domain: &str) -> std::result::Result<WhoisStatus, WhoisFailure> {
        let root = root_domain(domain)
            .map_err(|e| e.context(format!("could not get root domain for {}", domain)))?;

        if let Some(hit) = self.cache.whois.get(&root) {
            trace!("WHOIS cache hit for {}", root);
            return Ok(hit);
        }

        if self.cache.whois_errors.contains(&root) {
            trace!("WHOIS for {} failed before, not asking again", root);
            return Err(WhoisFailure::Repeated);
        }

        if let Some(ref limiter) = self.whois_limiter {
            limiter.until_ready().await;
        }

        self.whois_queries.fetch_add(1, Ordering::Relaxed);
        match self.whois.lookup(&root).await {
            Ok(status) => {
                if status.is_free() {
                    debug!("WHOIS reports {} as free", root);
                }
                self.cache.whois.put(&root, status.clone());
                Ok(status)
            }
            Err(e) => {
                self.cache.whois_errors.put(&root, e.to_string());
                Err(WhoisFailure::Transient(
                    e.context(format!("error on whois for {}", root)),
                ))
            }
        }
    }
}
