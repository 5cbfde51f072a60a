//! PyPI registry adapter.

use crate::registry::{parse_address, HttpFetcher, Registry, UNKNOWN_POPULARITY};
use crate::types::{HijackError, Result};
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

const BASE_URL: &str = "https://pypi.org";

#[derive(Debug, Deserialize)]
struct ProjectJson {
    info: ProjectInfo,
}

#[derive(Debug, Deserialize)]
struct ProjectInfo {
    #[serde(default)]
    author_email: Option<String>,
    #[serde(default)]
    maintainer_email: Option<String>,
}

pub struct PypiRegistry {
    fetcher: Arc<HttpFetcher>,
    base_url: String,
    link_pattern: Regex,
}

impl PypiRegistry {
    pub fn new(fetcher: Arc<HttpFetcher>) -> Self {
        Self {
            fetcher,
            base_url: BASE_URL.to_string(),
            link_pattern: Regex::new(r#"<a href="/simple/(.+?)/""#).unwrap(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Project names linked from the simple index page.
    fn parse_simple_index(&self, html: &str) -> Vec<String> {
        self.link_pattern
            .captures_iter(html)
            .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
            .collect()
    }
}

/// Author and maintainer addresses. Fields may hold comma separated lists.
fn project_maintainers(info: ProjectInfo) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut maintainers = Vec::new();

    for field in [info.author_email, info.maintainer_email].into_iter().flatten() {
        for raw in field.split(',') {
            let raw = raw.trim();
            if raw.is_empty() || raw == "UNKNOWN" {
                continue;
            }
            match parse_address(raw) {
                Some(address) => {
                    if seen.insert(address.clone()) {
                        maintainers.push(address);
                    }
                }
                None => debug!("invalid maintainer {}", raw),
            }
        }
    }

    maintainers
}

#[async_trait]
impl Registry for PypiRegistry {
    fn name(&self) -> &'static str {
        "pypi"
    }

    async fn list_packages(&self) -> Result<Vec<String>> {
        let html = self
            .fetcher
            .get_text(&format!("{}/simple/", self.base_url))
            .await?;

        let packages = self.parse_simple_index(&html);
        if packages.is_empty() {
            return Err(HijackError::ConfigError(
                "could not get package names from the PyPI simple index".to_string(),
            ));
        }
        Ok(packages)
    }

    async fn maintainers(&self, package: &str) -> Result<Vec<String>> {
        let url = format!("{}/pypi/{}/json", self.base_url, urlencoding::encode(package));
        let project: ProjectJson = self.fetcher.get_json(&url).await?;
        Ok(project_maintainers(project.info))
    }

    /// PyPI only exposes download counts through BigQuery.
    async fn popularity(&self, _package: &str) -> Result<i64> {
        Ok(UNKNOWN_POPULARITY)
    }

    fn package_link(&self, package: &str) -> String {
        format!("https://pypi.org/project/{}/", package)
    }
}
