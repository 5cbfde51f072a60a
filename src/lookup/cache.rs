//! In-memory caches for DNS and WHOIS answers.
//!
//! Entries live for one scan run: there is no TTL and no eviction. A missing key
//! means "never queried", a present empty value means "queried, nothing there".

use crate::types::WhoisStatus;
use dashmap::DashMap;
use std::net::IpAddr;

/// One record kind, keyed by domain or host name.
#[derive(Debug)]
pub struct RecordMap<V> {
    entries: DashMap<String, V>,
}

impl<V: Clone> RecordMap<V> {
    fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Get a cached value, `None` if the key was never stored.
    pub fn get(&self, key: &str) -> Option<V> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Store a value. Racing writers for the same key: last write wins.
    pub fn put(&self, key: &str, value: V) {
        self.entries.insert(key.to_string(), value);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Thread-safe lookup cache shared by every package check of a run.
///
/// Each record kind is a separate map with its own locks, so a writer of one
/// kind never blocks readers of another.
#[derive(Debug)]
pub struct LookupCache {
    /// MX hostnames, keyed by mail domain.
    pub mx: RecordMap<Vec<String>>,
    /// Nameservers, keyed by root domain.
    pub ns: RecordMap<Vec<String>>,
    /// A and AAAA addresses, keyed by host name.
    pub addresses: RecordMap<Vec<IpAddr>>,
    /// WHOIS answers, keyed by root domain.
    pub whois: RecordMap<WhoisStatus>,
    /// Message of the first WHOIS failure, keyed by root domain.
    pub whois_errors: RecordMap<String>,
}

impl LookupCache {
    pub fn new() -> Self {
        Self {
            mx: RecordMap::new(),
            ns: RecordMap::new(),
            addresses: RecordMap::new(),
            whois: RecordMap::new(),
            whois_errors: RecordMap::new(),
        }
    }
}

impl Default for LookupCache {
    fn default() -> Self {
        Self::new()
    }
}
