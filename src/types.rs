//! Core types and errors for the maintainer domain hijack scanner.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during scanning.
#[derive(Error, Debug)]
pub enum HijackError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("HTTP status code for {url} not 200: {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("invalid domain: {0}")]
    DomainError(String),

    #[error("could not parse {0} as a date")]
    DateFormatError(String),

    #[error("DNS lookup for {name} failed: {message}")]
    DnsError { name: String, message: String },

    #[error("WHOIS lookup for {domain} failed: {message}")]
    WhoisError { domain: String, message: String },

    #[error("timed out talking to {target}")]
    Timeout { target: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<HijackError>,
    },
}

impl HijackError {
    /// Wrap this error with a description of what was being attempted.
    pub fn context(self, context: impl Into<String>) -> Self {
        HijackError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

pub type Result<T> = std::result::Result<T, HijackError>;

/// A failed WHOIS lookup.
///
/// `Repeated` means the same root domain already failed earlier in this run:
/// no query was sent and the first failure has already been reported.
#[derive(Error, Debug)]
pub enum WhoisFailure {
    #[error(transparent)]
    Transient(#[from] HijackError),

    #[error("WHOIS already failed for this domain")]
    Repeated,
}

/// Registration data extracted from a WHOIS response.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WhoisRecord {
    /// Expiration date exactly as the registry printed it.
    pub expiration_date: Option<String>,
    pub registrar: Option<String>,
}

/// Registration state of a root domain as reported by WHOIS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WhoisStatus {
    Registered(WhoisRecord),
    /// The registry has no record, anybody can register the domain.
    Free,
}

impl WhoisStatus {
    pub fn is_free(&self) -> bool {
        matches!(self, WhoisStatus::Free)
    }
}

/// Verdict for one maintainer domain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DomainRiskResult {
    pub domain: String,
    pub unregistered: bool,
    pub expiring_soon: bool,
    pub expiration_date: Option<String>,
    pub registrar: Option<String>,
    pub unregistered_mx: bool,
    pub unregistered_mx_hosts: Vec<String>,
}

impl DomainRiskResult {
    /// True if any of the checks flagged the domain.
    pub fn is_risky(&self) -> bool {
        self.unregistered || self.expiring_soon || self.unregistered_mx
    }
}

/// Outcome of evaluating a single maintainer domain.
#[derive(Debug)]
pub enum RiskOutcome {
    Found(DomainRiskResult),
    /// A WHOIS lookup repeated an already reported failure; skip silently.
    Suppressed,
    Failed(HijackError),
}

/// Severity level of a finding, derived from the package download count.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    /// Classify a download count. Negative counts mean "unknown".
    pub fn from_downloads(downloads: i64) -> Self {
        match downloads {
            d if d >= 1_000_000 => Severity::High,
            d if d >= 100_000 => Severity::Medium,
            _ => Severity::Low,
        }
    }
}

/// Why a maintainer domain is considered hijackable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RiskKind {
    /// The root domain is not registered.
    UnregisteredDomain,
    /// The root domain expires within the configured window (or already has).
    ExpiringSoon {
        expiration_date: Option<String>,
        registrar: Option<String>,
    },
    /// Mail exchangers that resolve to nothing and whose domain is free.
    UnregisteredMx { hosts: Vec<String> },
}

impl RiskKind {
    /// Headline used when reporting the finding.
    pub fn title(&self, expiry_days: i64) -> String {
        match self {
            RiskKind::UnregisteredDomain => "[HIT] DOMAIN UNREGISTERED".to_string(),
            RiskKind::ExpiringSoon { .. } => format!(
                "[POSSIBLE HIT] DOMAIN EXPIRES WITHIN {} DAYS OR IS ALREADY EXPIRED",
                expiry_days
            ),
            RiskKind::UnregisteredMx { .. } => "[HIT] UNREGISTERED MX".to_string(),
        }
    }
}

/// One reported risk for a (package, maintainer domain) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub package: String,
    pub link: String,
    pub maintainer: String,
    pub domain: String,
    #[serde(flatten)]
    pub kind: RiskKind,
    /// Download count, when the registry reports one.
    pub downloads: Option<i64>,
    pub severity: Severity,
}

/// Totals for a finished scan.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanSummary {
    pub packages_total: usize,
    pub packages_checked: usize,
    pub packages_failed: usize,
    pub findings: usize,
    pub whois_queries: usize,
    pub duration_secs: f64,
}

/// Per-package counters collected by the scan driver.
#[derive(Debug, Clone, Copy, Default)]
pub struct PackageReport {
    pub findings: usize,
    pub failed: bool,
}
