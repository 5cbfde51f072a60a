//! Package registry adapters.
//!
//! An adapter lists the packages of a registry and returns, per package, the
//! maintainer email addresses and a popularity figure.

pub mod npm;
pub mod pypi;

pub use npm::NpmRegistry;
pub use pypi::PypiRegistry;

use crate::types::{HijackError, Result};
use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

/// Popularity value for registries that do not publish download counts.
pub const UNKNOWN_POPULARITY: i64 = -1;

#[async_trait]
pub trait Registry: Send + Sync {
    /// Short registry name used in logs.
    fn name(&self) -> &'static str;

    /// All package identifiers, in registry order.
    async fn list_packages(&self) -> Result<Vec<String>>;

    /// Email-like maintainer strings of `package`, de-duplicated.
    async fn maintainers(&self, package: &str) -> Result<Vec<String>>;

    /// Download count of `package`, or [`UNKNOWN_POPULARITY`].
    async fn popularity(&self, package: &str) -> Result<i64>;

    /// Human facing page for `package`.
    fn package_link(&self, package: &str) -> String;
}

/// Rate limited HTTP GET shared by the adapters.
pub struct HttpFetcher {
    client: Client,
    rate_limiter: Arc<
        RateLimiter<
            governor::state::NotKeyed,
            governor::state::InMemoryState,
            governor::clock::DefaultClock,
        >,
    >,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, rate_limit: u32) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("maintainer-hijack/", env!("CARGO_PKG_VERSION")))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()?;

        let quota = Quota::per_second(NonZeroU32::new(rate_limit).unwrap_or(NonZeroU32::MIN));

        Ok(Self {
            client,
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        })
    }

    /// GET `url`, failing on any status other than 200.
    pub async fn get_text(&self, url: &str) -> Result<String> {
        self.rate_limiter.until_ready().await;
        trace!("GET {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| HijackError::from(e).context(format!("could not get {}", url)))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(HijackError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response
            .text()
            .await
            .map_err(|e| HijackError::from(e).context(format!("could not read body from {}", url)))
    }

    /// GET `url` and decode the body as JSON.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let body = self.get_text(url).await?;
        serde_json::from_str(&body).map_err(|e| {
            HijackError::from(e).context(format!("error on json unmarshal for {}", url))
        })
    }
}

/// Extract the bare address from `addr` or `Name <addr>`.
pub fn parse_address(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let address = match (raw.rfind('<'), raw.rfind('>')) {
        (Some(start), Some(end)) if start < end => &raw[start + 1..end],
        (None, None) => raw,
        _ => return None,
    };

    let address = address.trim();
    if address.is_empty() || address.contains(char::is_whitespace) || !address.contains('@') {
        return None;
    }
    Some(address.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    #[test]
    fn test_parse_address() {
        assert_eq!(parse_address("dev@example.com").as_deref(), Some("dev@example.com"));
        assert_eq!(
            parse_address("Jane Doe <jane@example.org>").as_deref(),
            Some("jane@example.org")
        );
        assert_eq!(parse_address("  spaced@example.net ").as_deref(), Some("spaced@example.net"));
        assert_eq!(parse_address("no address here"), None);
        assert_eq!(parse_address("broken <jane@example.org"), None);
        assert_eq!(parse_address(""), None);
    }

    #[tokio::test]
    async fn test_get_text_rejects_non_200() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/missing")
            .with_status(404)
            .create_async()
            .await;

        let fetcher = HttpFetcher::new(Duration::from_secs(5), 100).unwrap();
        let result = fetcher.get_text(&format!("{}/missing", server.url())).await;

        mock.assert_async().await;
        assert!(matches!(result, Err(HijackError::HttpStatus { status: 404, .. })));
    }

    #[tokio::test]
    async fn test_get_json_reports_url_on_bad_body() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/broken")
            .with_status(200)
            .with_body("{not json")
            .create_async()
            .await;

        let fetcher = HttpFetcher::new(Duration::from_secs(5), 100).unwrap();
        let url = format!("{}/broken", server.url());
        let result: Result<serde_json::Value> = fetcher.get_json(&url).await;

        let message = result.unwrap_err().to_string();
        assert!(message.contains("/broken"), "{}", message);
    }
}
