//! Hijackability checks for one maintainer email domain.
//!
//! Three independent checks are combined into a [`DomainRiskResult`]:
//! - the root domain has no nameservers and WHOIS reports it free
//! - an MX host resolves to nothing and its own domain is free
//! - the root domain expires within the configured window (opt-in)

use crate::date::parse_date;
use crate::domain::root_domain;
use crate::lookup::Lookup;
use crate::types::{DomainRiskResult, RiskOutcome, WhoisFailure, WhoisStatus};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::debug;

/// Default window for the expiring-soon check.
pub const DEFAULT_EXPIRY_DAYS: i64 = 7;

type CheckResult<T> = std::result::Result<T, WhoisFailure>;

/// Expiry data of a domain flagged as expiring soon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expiry {
    pub expiration_date: Option<String>,
    pub registrar: Option<String>,
}

/// True if `expiration` lies before `now + days`, including dates in the past.
pub fn expires_within(expiration: DateTime<Utc>, now: DateTime<Utc>, days: i64) -> bool {
    expiration < now + Duration::days(days)
}

/// Evaluates maintainer domains against the lookup layer.
pub struct RiskEvaluator {
    lookup: Arc<Lookup>,
    check_expiring: bool,
    expiry_days: i64,
}

impl RiskEvaluator {
    pub fn new(lookup: Arc<Lookup>) -> Self {
        Self {
            lookup,
            check_expiring: false,
            expiry_days: DEFAULT_EXPIRY_DAYS,
        }
    }

    /// Also run the expiring-soon check, with a window of `days`.
    pub fn with_expiry_check(mut self, days: i64) -> Self {
        self.check_expiring = true;
        self.expiry_days = days;
        self
    }

    pub fn expiry_days(&self) -> i64 {
        self.expiry_days
    }

    pub fn lookup(&self) -> &Lookup {
        &self.lookup
    }

    /// Evaluate `domain` as of now.
    pub async fn evaluate(&self, domain: &str) -> RiskOutcome {
        self.evaluate_at(domain, Utc::now()).await
    }

    /// Evaluate `domain`, comparing expiration dates against `now`.
    pub async fn evaluate_at(&self, domain: &str, now: DateTime<Utc>) -> RiskOutcome {
        let unregistered = match self.check_unregistered(domain).await {
            Ok(unregistered) => unregistered,
            Err(failure) => return Self::abandon(failure, domain, "unregistered state"),
        };

        let unregistered_mx_hosts = match self.check_mx_unregistered(domain).await {
            Ok(hosts) => hosts,
            Err(failure) => return Self::abandon(failure, domain, "unregistered MX state"),
        };

        let mut result = DomainRiskResult {
            domain: domain.to_string(),
            unregistered,
            unregistered_mx: !unregistered_mx_hosts.is_empty(),
            unregistered_mx_hosts,
            ..Default::default()
        };

        if self.check_expiring {
            match self.check_expires_soon(domain, now).await {
                Ok(Some(expiry)) => {
                    result.expiring_soon = true;
                    result.expiration_date = expiry.expiration_date;
                    result.registrar = expiry.registrar;
                }
                Ok(None) => {}
                Err(failure) => return Self::abandon(failure, domain, "expiry"),
            }
        }

        RiskOutcome::Found(result)
    }

    fn abandon(failure: WhoisFailure, domain: &str, check: &str) -> RiskOutcome {
        match failure {
            WhoisFailure::Repeated => {
                debug!("skipping {} ({}), WHOIS already failed", domain, check);
                RiskOutcome::Suppressed
            }
            WhoisFailure::Transient(e) => RiskOutcome::Failed(
                e.context(format!("could not check domain {} for {}", domain, check)),
            ),
        }
    }

    /// No nameservers and a free WHOIS record. WHOIS is only asked when NS is empty.
    pub async fn check_unregistered(&self, domain: &str) -> CheckResult<bool> {
        let root = root_domain(domain)
            .map_err(|e| e.context(format!("could not get root domain for {}", domain)))?;

        let nameservers = self.lookup.query_ns(&root).await?;
        if !nameservers.is_empty() {
            return Ok(false);
        }

        Ok(self.lookup.query_whois(&root).await?.is_free())
    }

    /// MX hosts of `domain` that have no address and whose domain is free.
    pub async fn check_mx_unregistered(&self, domain: &str) -> CheckResult<Vec<String>> {
        let mut unregistered = Vec::new();

        for host in self.lookup.query_mx(domain).await? {
            if host.is_empty() {
                continue;
            }
            if self.check_mx_host_unregistered(&host).await? {
                unregistered.push(host);
            }
        }

        Ok(unregistered)
    }

    async fn check_mx_host_unregistered(&self, host: &str) -> CheckResult<bool> {
        // A live address means mail is delivered somewhere; skip the rate limited WHOIS.
        if !self.lookup.resolve_addresses(host).await?.is_empty() {
            return Ok(false);
        }

        match self.lookup.query_whois(host).await {
            Ok(status) => Ok(status.is_free()),
            Err(WhoisFailure::Transient(e)) => Err(WhoisFailure::Transient(
                e.context(format!("error on checking mx whois for {}", host)),
            )),
            Err(WhoisFailure::Repeated) => Err(WhoisFailure::Repeated),
        }
    }

    /// Registration expiring before `now + expiry_days`. `None` if not expiring,
    /// free, or the registry publishes no expiration date.
    pub async fn check_expires_soon(
        &self,
        domain: &str,
        now: DateTime<Utc>,
    ) -> CheckResult<Option<Expiry>> {
        let root = root_domain(domain)
            .map_err(|e| e.context(format!("could not get root domain for {}", domain)))?;

        let record = match self.lookup.query_whois(&root).await? {
            WhoisStatus::Registered(record) => record,
            WhoisStatus::Free => return Ok(None),
        };

        let Some(ref raw) = record.expiration_date else {
            return Ok(None);
        };

        let expiration = parse_date(raw)
            .map_err(|e| e.context(format!("invalid expiration date for {}", root)))?;

        if expires_within(expiration, now, self.expiry_days) {
            Ok(Some(Expiry {
                expiration_date: record.expiration_date,
                registrar: record.registrar,
            }))
        } else {
            Ok(None)
        }
    }
}
