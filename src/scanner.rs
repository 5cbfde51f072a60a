//! Scan driver: walks every package of a registry and reports risky
//! maintainer domains.

use crate::notify::FindingSink;
use crate::registry::{Registry, UNKNOWN_POPULARITY};
use crate::risk::RiskEvaluator;
use crate::types::{
    DomainRiskResult, Finding, HijackError, PackageReport, Result, RiskKind, RiskOutcome,
    ScanSummary, Severity,
};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, trace, warn};

/// GitHub's private commit address domain. It cannot be registered.
const IGNORED_DOMAIN: &str = "users.noreply.github.com";

/// Progress is logged once per this many packages.
const PROGRESS_INTERVAL: usize = 1000;

/// Domain part of a maintainer address, or `None` if the address is skipped.
pub fn maintainer_domain(maintainer: &str) -> Option<&str> {
    let maintainer = maintainer.trim();
    // "@name" is a platform user alias, not an address
    if maintainer.is_empty() || maintainer.starts_with('@') {
        return None;
    }

    let (_, domain) = maintainer.split_once('@')?;
    if domain.contains('@') {
        return None;
    }

    let domain = domain.trim();
    if domain.is_empty() || domain.eq_ignore_ascii_case(IGNORED_DOMAIN) {
        return None;
    }
    Some(domain)
}

/// One risk kind per flag set on `result`.
fn risk_kinds(result: DomainRiskResult) -> Vec<RiskKind> {
    let mut kinds = Vec::new();
    if result.unregistered {
        kinds.push(RiskKind::UnregisteredDomain);
    }
    if result.expiring_soon {
        kinds.push(RiskKind::ExpiringSoon {
            expiration_date: result.expiration_date,
            registrar: result.registrar,
        });
    }
    if result.unregistered_mx {
        kinds.push(RiskKind::UnregisteredMx {
            hosts: result.unregistered_mx_hosts,
        });
    }
    kinds
}

#[derive(Clone)]
pub struct Scanner {
    registry: Arc<dyn Registry>,
    evaluator: Arc<RiskEvaluator>,
    sink: Arc<dyn FindingSink>,
    concurrency: usize,
}

impl Scanner {
    pub fn new(
        registry: Arc<dyn Registry>,
        evaluator: Arc<RiskEvaluator>,
        sink: Arc<dyn FindingSink>,
    ) -> Self {
        Self {
            registry,
            evaluator,
            sink,
            concurrency: 10,
        }
    }

    /// At most `concurrency` packages are evaluated at once.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Scan every package of the registry.
    ///
    /// Only a failure to list the packages is returned as an error. Failures
    /// while checking a single package are logged and counted in the summary.
    pub async fn run(&self) -> Result<ScanSummary> {
        let start = Instant::now();

        let packages = self.registry.list_packages().await.map_err(|e| {
            e.context(format!("could not list {} packages", self.registry.name()))
        })?;
        let total = packages.len();
        info!("checking {} {} packages", total, self.registry.name());

        let mut summary = ScanSummary {
            packages_total: total,
            ..Default::default()
        };

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();

        for (i, package) in packages.into_iter().enumerate() {
            if i % PROGRESS_INTERVAL == 0 {
                info!("{} / {}", i, total);
            }

            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| HijackError::ConfigError("worker pool closed".to_string()))?;

            let scanner = self.clone();
            tasks.spawn(async move {
                // released when the task ends, however it ends
                let _permit = permit;
                scanner.check_package(&package).await
            });

            while let Some(joined) = tasks.try_join_next() {
                Self::record(&mut summary, joined);
            }
        }

        while let Some(joined) = tasks.join_next().await {
            Self::record(&mut summary, joined);
        }

        summary.whois_queries = self.evaluator.lookup().whois_queries();
        summary.duration_secs = start.elapsed().as_secs_f64();
        Ok(summary)
    }

    fn record(summary: &mut ScanSummary, joined: std::result::Result<PackageReport, JoinError>) {
        match joined {
            Ok(report) => {
                summary.packages_checked += 1;
                summary.findings += report.findings;
                if report.failed {
                    summary.packages_failed += 1;
                }
            }
            Err(e) => {
                error!("package task failed: {}", e);
                summary.packages_failed += 1;
            }
        }
    }

    /// Evaluate every maintainer domain of `package`, in maintainer order.
    pub async fn check_package(&self, package: &str) -> PackageReport {
        let mut report = PackageReport::default();

        let maintainers = match self.registry.maintainers(package).await {
            Ok(maintainers) => maintainers,
            Err(e) => {
                error!(package = %package, "could not get maintainers: {}", e);
                report.failed = true;
                return report;
            }
        };

        // fetched on the first finding only
        let mut downloads: Option<i64> = None;

        for maintainer in &maintainers {
            let Some(domain) = maintainer_domain(maintainer) else {
                trace!("skipping maintainer {:?} of {}", maintainer, package);
                continue;
            };

            let result = match self.evaluator.evaluate(domain).await {
                RiskOutcome::Found(result) => result,
                RiskOutcome::Suppressed => continue,
                RiskOutcome::Failed(e) => {
                    error!(package = %package, maintainer = %maintainer, "{}", e);
                    report.failed = true;
                    continue;
                }
            };

            if !result.is_risky() {
                debug!("{} of {} looks fine", domain, package);
                continue;
            }

            let count = match downloads {
                Some(count) => count,
                None => {
                    let count = self.popularity(package).await;
                    downloads = Some(count);
                    count
                }
            };

            for kind in risk_kinds(result) {
                self.sink.emit(&Finding {
                    package: package.to_string(),
                    link: self.registry.package_link(package),
                    maintainer: maintainer.clone(),
                    domain: domain.to_string(),
                    kind,
                    downloads: (count >= 0).then_some(count),
                    severity: Severity::from_downloads(count),
                });
                report.findings += 1;
            }
        }

        report
    }

    async fn popularity(&self, package: &str) -> i64 {
        match self.registry.popularity(package).await {
            Ok(count) => count,
            Err(e) => {
                warn!(package = %package, "could not get popularity: {}", e);
                UNKNOWN_POPULARITY
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::testing::{lookup_with, MockDns, MockWhois};
    use crate::notify::CollectingSink;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct MockRegistry {
        packages: Vec<String>,
        maintainers: HashMap<String, Vec<String>>,
        downloads: HashMap<String, i64>,
        unlisted: bool,
        delay: Option<Duration>,
        active: AtomicUsize,
        max_active: AtomicUsize,
    }

    impl MockRegistry {
        fn with_package(mut self, name: &str, maintainers: &[&str]) -> Self {
            self.packages.push(name.to_string());
            self.maintainers.insert(
                name.to_string(),
                maintainers.iter().map(|m| m.to_string()).collect(),
            );
            self
        }

        fn with_downloads(mut self, name: &str, downloads: i64) -> Self {
            self.downloads.insert(name.to_string(), downloads);
            self
        }
    }

    #[async_trait]
    impl Registry for MockRegistry {
        fn name(&self) -> &'static str {
            "mock"
        }

        async fn list_packages(&self) -> Result<Vec<String>> {
            if self.unlisted {
                return Err(HijackError::ConfigError("no index".to_string()));
            }
            Ok(self.packages.clone())
        }

        async fn maintainers(&self, package: &str) -> Result<Vec<String>> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.active.fetch_sub(1, Ordering::SeqCst);

            self.maintainers
                .get(package)
                .cloned()
                .ok_or_else(|| HijackError::HttpStatus {
                    url: package.to_string(),
                    status: 404,
                })
        }

        async fn popularity(&self, package: &str) -> Result<i64> {
            self.downloads
                .get(package)
                .copied()
                .ok_or_else(|| HijackError::HttpStatus {
                    url: package.to_string(),
                    status: 500,
                })
        }

        fn package_link(&self, package: &str) -> String {
            format!("https://registry.example/{}", package)
        }
    }

    fn scanner(
        registry: MockRegistry,
        dns: MockDns,
        whois: MockWhois,
    ) -> (Scanner, Arc<MockRegistry>, Arc<CollectingSink>, Arc<MockWhois>) {
        let registry = Arc::new(registry);
        let whois = Arc::new(whois);
        let lookup = Arc::new(lookup_with(Arc::new(dns), whois.clone()));
        let sink = Arc::new(CollectingSink::default());
        let scanner = Scanner::new(
            registry.clone(),
            Arc::new(RiskEvaluator::new(lookup)),
            sink.clone(),
        );
        (scanner, registry, sink, whois)
    }

    #[test]
    fn test_maintainer_domain() {
        let cases = [
            ("dev@example.com", Some("example.com")),
            ("  dev@example.com  ", Some("example.com")),
            ("dev@ example.com", Some("example.com")),
            ("user@users.noreply.github.com", None),
            ("user@USERS.NOREPLY.GITHUB.COM", None),
            ("user@", None),
            ("user@  ", None),
            ("@someone", None),
            ("", None),
            ("   ", None),
            ("no-at-sign", None),
            ("two@at@signs.example", None),
        ];

        for (maintainer, expected) in cases {
            assert_eq!(maintainer_domain(maintainer), expected, "{:?}", maintainer);
        }
    }

    #[test]
    fn test_risk_kinds_one_per_flag() {
        let result = DomainRiskResult {
            domain: "gone.example".to_string(),
            unregistered: true,
            expiring_soon: false,
            expiration_date: None,
            registrar: None,
            unregistered_mx: true,
            unregistered_mx_hosts: vec!["mx.gone.example".to_string()],
        };

        assert_eq!(
            risk_kinds(result),
            vec![
                RiskKind::UnregisteredDomain,
                RiskKind::UnregisteredMx {
                    hosts: vec!["mx.gone.example".to_string()]
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_end_to_end_findings() {
        let (scanner, _, sink, whois) = scanner(
            MockRegistry::default()
                .with_package("ghost", &["user@users.noreply.github.com"])
                .with_package("broken", &["user@"])
                .with_package("orphan", &["user@freedomain.example"])
                .with_downloads("orphan", 50_000),
            MockDns::default(),
            MockWhois::default().free("freedomain.example"),
        );

        let summary = scanner.run().await.unwrap();
        let findings = sink.findings();

        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].package, "orphan");
        assert_eq!(findings[0].maintainer, "user@freedomain.example");
        assert_eq!(findings[0].domain, "freedomain.example");
        assert_eq!(findings[0].kind, RiskKind::UnregisteredDomain);
        assert_eq!(findings[0].link, "https://registry.example/orphan");
        assert_eq!(findings[0].severity, Severity::Low);
        assert_eq!(findings[0].downloads, Some(50_000));
        assert_eq!(whois.calls(), vec!["freedomain.example"]);

        assert_eq!(summary.packages_total, 3);
        assert_eq!(summary.packages_checked, 3);
        assert_eq!(summary.packages_failed, 0);
        assert_eq!(summary.findings, 1);
        assert_eq!(summary.whois_queries, 1);
    }

    #[tokio::test]
    async fn test_severity_follows_downloads() {
        let (scanner, _, sink, _) = scanner(
            MockRegistry::default()
                .with_package("popular", &["a@free.example"])
                .with_downloads("popular", 2_000_000)
                .with_package("unknown", &["b@free.example"]),
            MockDns::default(),
            MockWhois::default().free("free.example"),
        );

        scanner.run().await.unwrap();

        let mut findings = sink.findings();
        findings.sort_by(|a, b| a.package.cmp(&b.package));
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].package, "popular");
        assert_eq!(findings[0].severity, Severity::High);
        // popularity lookup failed: unknown
        assert_eq!(findings[1].severity, Severity::Low);
        assert_eq!(findings[1].downloads, None);
    }

    #[tokio::test]
    async fn test_failed_domain_does_not_stop_package() {
        let (scanner, _, sink, _) = scanner(
            MockRegistry::default().with_package(
                "mixed",
                &["a@flaky.example", "b@free.example"],
            ),
            MockDns::default(),
            MockWhois::default()
                .failing("flaky.example")
                .free("free.example"),
        );

        let report = scanner.check_package("mixed").await;

        assert!(report.failed);
        assert_eq!(report.findings, 1);
        assert_eq!(sink.findings()[0].domain, "free.example");
    }

    #[tokio::test]
    async fn test_findings_keep_maintainer_order() {
        let (scanner, _, sink, _) = scanner(
            MockRegistry::default().with_package(
                "pkg",
                &["a@second.example", "b@first.example"],
            ),
            MockDns::default(),
            MockWhois::default()
                .free("second.example")
                .free("first.example"),
        );

        scanner.check_package("pkg").await;

        let domains: Vec<String> = sink.findings().into_iter().map(|f| f.domain).collect();
        assert_eq!(domains, vec!["second.example", "first.example"]);
    }

    #[tokio::test]
    async fn test_missing_maintainers_counts_as_failed() {
        let (scanner, _, _, _) = scanner(
            MockRegistry::default(),
            MockDns::default(),
            MockWhois::default(),
        );

        let report = scanner.check_package("does-not-exist").await;
        assert!(report.failed);
        assert_eq!(report.findings, 0);
    }

    #[tokio::test]
    async fn test_listing_failure_aborts_run() {
        let registry = MockRegistry {
            unlisted: true,
            ..Default::default()
        };
        let (scanner, _, _, _) = scanner(registry, MockDns::default(), MockWhois::default());

        assert!(scanner.run().await.is_err());
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let mut registry = MockRegistry {
            delay: Some(Duration::from_millis(20)),
            ..Default::default()
        };
        for i in 0..8 {
            registry = registry.with_package(&format!("pkg-{}", i), &[]);
        }

        let (scanner, registry, _, _) =
            scanner(registry, MockDns::default(), MockWhois::default());
        let summary = scanner.with_concurrency(2).run().await.unwrap();

        assert_eq!(summary.packages_checked, 8);
        assert_eq!(registry.max_active.load(Ordering::SeqCst), 2);
    }
}
