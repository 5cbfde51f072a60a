//! maintainer-hijack - Finds package maintainers with hijackable email domains.
//!
//! A maintainer whose email domain is unregistered (or about to expire) can
//! lose the account: whoever registers the domain receives the password reset
//! mail. This library:
//! - Lists every package of a registry (npm or PyPI) and its maintainers
//! - Resolves NS and MX records of each maintainer domain, caching per run
//! - Falls back to rate limited WHOIS lookups only when DNS shows no life
//! - Reports hits through pluggable finding sinks
//!
//! # Example
//!
//! ```no_run
//! use maintainer_hijack::lookup::{Lookup, LookupCache, TcpWhoisBackend, TrustDnsBackend};
//! use maintainer_hijack::notify::ConsoleSink;
//! use maintainer_hijack::registry::{HttpFetcher, PypiRegistry};
//! use maintainer_hijack::{RiskEvaluator, Scanner};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> maintainer_hijack::Result<()> {
//!     let timeout = Duration::from_secs(60);
//!     let dns = TrustDnsBackend::new(&["1.1.1.1:53".parse().unwrap()], 3, timeout)?;
//!     let lookup = Lookup::new(
//!         Arc::new(LookupCache::new()),
//!         Arc::new(dns),
//!         Arc::new(TcpWhoisBackend::new(timeout)),
//!     );
//!     let registry = PypiRegistry::new(Arc::new(HttpFetcher::new(timeout, 10)?));
//!
//!     let summary = Scanner::new(
//!         Arc::new(registry),
//!         Arc::new(RiskEvaluator::new(Arc::new(lookup))),
//!         Arc::new(ConsoleSink::new(7)),
//!     )
//!     .run()
//!     .await?;
//!     println!("{} findings", summary.findings);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod date;
pub mod domain;
pub mod lookup;
pub mod notify;
pub mod registry;
pub mod risk;
pub mod scanner;
pub mod types;

pub use config::{Config, RegistryKind};
pub use risk::RiskEvaluator;
pub use scanner::Scanner;
pub use types::{
    DomainRiskResult, Finding, HijackError, Result, RiskKind, RiskOutcome, ScanSummary, Severity,
    WhoisFailure,
};
