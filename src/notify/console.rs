//! Log output for findings.
//!
//! Findings go through `tracing` so they reach both the console and the log
//! file. The level follows the severity: high is `error`, medium is `warn`,
//! low is `info`.

use crate::notify::FindingSink;
use crate::types::{Finding, RiskKind, Severity};
use tracing::{error, info, warn};

macro_rules! at_severity {
    ($severity:expr, $($arg:tt)+) => {
        match $severity {
            Severity::High => error!($($arg)+),
            Severity::Medium => warn!($($arg)+),
            Severity::Low => info!($($arg)+),
        }
    };
}

/// Writes one structured log line per finding.
pub struct ConsoleSink {
    expiry_days: i64,
}

impl ConsoleSink {
    /// `expiry_days` is the window quoted in expiring-soon headlines.
    pub fn new(expiry_days: i64) -> Self {
        Self { expiry_days }
    }
}

/// Downloads as printed, `-` when the registry does not publish them.
fn format_downloads(downloads: Option<i64>) -> String {
    downloads.map_or_else(|| "-".to_string(), |d| d.to_string())
}

impl FindingSink for ConsoleSink {
    fn emit(&self, finding: &Finding) {
        let title = finding.kind.title(self.expiry_days);
        let downloads = format_downloads(finding.downloads);

        match &finding.kind {
            RiskKind::UnregisteredDomain => at_severity!(
                finding.severity,
                package = %finding.package,
                maintainer = %finding.maintainer,
                link = %finding.link,
                downloads = %downloads,
                domain = %finding.domain,
                "{}",
                title
            ),
            RiskKind::ExpiringSoon {
                expiration_date,
                registrar,
            } => at_severity!(
                finding.severity,
                package = %finding.package,
                maintainer = %finding.maintainer,
                link = %finding.link,
                downloads = %downloads,
                domain = %finding.domain,
                expiration = expiration_date.as_deref().unwrap_or("-"),
                registrar = registrar.as_deref().unwrap_or("-"),
                "{}",
                title
            ),
            RiskKind::UnregisteredMx { hosts } => at_severity!(
                finding.severity,
                package = %finding.package,
                maintainer = %finding.maintainer,
                link = %finding.link,
                downloads = %downloads,
                domain = %finding.domain,
                mx = %hosts.join(", "),
                "{}",
                title
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_downloads() {
        assert_eq!(format_downloads(Some(1234)), "1234");
        assert_eq!(format_downloads(None), "-");
    }

    #[test]
    fn test_emit_every_kind() {
        // No subscriber installed, this must simply not panic.
        let sink = ConsoleSink::new(7);
        for (kind, severity) in [
            (RiskKind::UnregisteredDomain, Severity::High),
            (
                RiskKind::ExpiringSoon {
                    expiration_date: Some("2024-03-05".to_string()),
                    registrar: None,
                },
                Severity::Medium,
            ),
            (
                RiskKind::UnregisteredMx {
                    hosts: vec!["mx1.gone.example".to_string(), "mx2.gone.example".to_string()],
                },
                Severity::Low,
            ),
        ] {
            sink.emit(&Finding {
                package: "pkg".to_string(),
                link: "https://pypi.org/project/pkg/".to_string(),
                maintainer: "dev@gone.example".to_string(),
                domain: "gone.example".to_string(),
                kind,
                downloads: None,
                severity,
            });
        }
    }
}
