//! maintainer-hijack - Finds package maintainers with hijackable email domains.
//!
//! CLI entry point.

use clap::Parser;
use maintainer_hijack::lookup::{Lookup, LookupCache, TcpWhoisBackend, TrustDnsBackend};
use maintainer_hijack::notify::{ConsoleSink, FindingSink, JsonlSink, MultiSink};
use maintainer_hijack::registry::{HttpFetcher, NpmRegistry, PypiRegistry, Registry};
use maintainer_hijack::{Config, RegistryKind, RiskEvaluator, Scanner};
use std::fs::OpenOptions;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();

    let log_file = match OpenOptions::new().create(true).append(true).open(&config.log) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("could not open log file {}: {}", config.log.display(), e);
            return ExitCode::FAILURE;
        }
    };
    // Flushes the log file when dropped at the end of main.
    let (log_writer, _log_guard) = tracing_appender::non_blocking(log_file);

    let filter = if config.verbose {
        EnvFilter::new("maintainer_hijack=debug,info")
    } else {
        EnvFilter::new("maintainer_hijack=info,warn")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(
            fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(log_writer),
        )
        .init();

    let scanner = match build_scanner(&config) {
        Ok(scanner) => scanner,
        Err(e) => {
            error!("Failed to create scanner: {}", e);
            return ExitCode::FAILURE;
        }
    };

    tokio::select! {
        result = scanner.run() => match result {
            Ok(summary) => {
                info!(
                    packages = summary.packages_total,
                    checked = summary.packages_checked,
                    failed = summary.packages_failed,
                    findings = summary.findings,
                    whois_queries = summary.whois_queries,
                    "scan finished in {:.1}s",
                    summary.duration_secs
                );
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!("{}", e);
                ExitCode::FAILURE
            }
        },
        _ = shutdown_signal() => {
            warn!("Signal received, abandoning scan");
            ExitCode::from(130)
        }
    }
}

fn build_scanner(config: &Config) -> maintainer_hijack::Result<Scanner> {
    let timeout = config.timeout();

    let fetcher = Arc::new(HttpFetcher::new(timeout, config.rate_limit)?);
    let registry: Arc<dyn Registry> = match config.registry {
        RegistryKind::Npm => Arc::new(NpmRegistry::new(fetcher, config.localfile.clone())),
        RegistryKind::Pypi => Arc::new(PypiRegistry::new(fetcher)),
    };

    let dns = TrustDnsBackend::new(&config.dns_servers()?, config.retries, timeout)?;
    let lookup = Lookup::new(
        Arc::new(LookupCache::new()),
        Arc::new(dns),
        Arc::new(TcpWhoisBackend::new(timeout)),
    )
    .with_whois_rate_limit(config.whois_rate_limit);

    let mut evaluator = RiskEvaluator::new(Arc::new(lookup));
    if config.expired {
        evaluator = evaluator.with_expiry_check(config.expiry_days);
    }

    let mut sink = MultiSink::new().with(ConsoleSink::new(config.expiry_days));
    if let Some(ref path) = config.output {
        sink = sink.with(JsonlSink::create(path)?);
    }
    let sink: Arc<dyn FindingSink> = Arc::new(sink);

    Ok(Scanner::new(registry, Arc::new(evaluator), sink).with_concurrency(config.threads))
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => {},
                    _ = tokio::signal::ctrl_c() => {},
                }
            }
            Err(e) => {
                warn!("could not register SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
