//! npm registry adapter.
//!
//! The package list comes from a local copy of the CouchDB `_all_docs`
//! listing, since paging through the live registry is far too slow.

use crate::registry::{parse_address, HttpFetcher, Registry};
use crate::types::{HijackError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

const REGISTRY_URL: &str = "https://registry.npmjs.org";
const DOWNLOADS_URL: &str = "https://api.npmjs.org/downloads/point/last-year";
const INDEX_URL: &str = "https://skimdb.npmjs.com/registry/_all_docs";

/// `_all_docs` listing.
#[derive(Debug, Deserialize)]
struct AllDocs {
    rows: Vec<AllDocsRow>,
}

#[derive(Debug, Deserialize)]
struct AllDocsRow {
    key: String,
}

#[derive(Debug, Default, Deserialize)]
struct Person {
    #[serde(default)]
    email: Option<String>,
}

/// The parts of a packument we look at.
#[derive(Debug, Deserialize)]
struct Packument {
    #[serde(rename = "_npmUser", default)]
    npm_user: Option<Person>,
    #[serde(default)]
    maintainers: Vec<Person>,
}

#[derive(Debug, Deserialize)]
struct DownloadPoint {
    downloads: i64,
}

pub struct NpmRegistry {
    fetcher: Arc<HttpFetcher>,
    index_path: PathBuf,
    registry_url: String,
    downloads_url: String,
}

impl NpmRegistry {
    pub fn new(fetcher: Arc<HttpFetcher>, index_path: impl Into<PathBuf>) -> Self {
        Self {
            fetcher,
            index_path: index_path.into(),
            registry_url: REGISTRY_URL.to_string(),
            downloads_url: DOWNLOADS_URL.to_string(),
        }
    }

    /// Point the adapter at other registry and downloads endpoints.
    pub fn with_base_urls(mut self, registry_url: &str, downloads_url: &str) -> Self {
        self.registry_url = registry_url.trim_end_matches('/').to_string();
        self.downloads_url = downloads_url.trim_end_matches('/').to_string();
        self
    }

    /// Scoped package: @scope/name -> @scope%2Fname
    fn encode_package_name(package: &str) -> String {
        if package.starts_with('@') {
            package.replace('/', "%2F")
        } else {
            urlencoding::encode(package).into_owned()
        }
    }
}

/// Read package names from an `_all_docs` dump.
pub fn load_index(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            HijackError::ConfigError(format!(
                "the local index {} was not found. Please download it before running this tool from {}",
                path.display(),
                INDEX_URL
            ))
        } else {
            HijackError::from(e).context(format!("could not read {}", path.display()))
        }
    })?;

    let docs: AllDocs = serde_json::from_str(&content).map_err(|e| {
        HijackError::from(e).context("error on json unmarshal for all package names")
    })?;

    Ok(docs.rows.into_iter().map(|row| row.key).collect())
}

/// Maintainer addresses from a packument body, publisher first, de-duplicated.
fn packument_maintainers(packument: Packument) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut maintainers = Vec::new();

    let people = packument.npm_user.into_iter().chain(packument.maintainers);
    for raw in people.filter_map(|person| person.email) {
        if raw.trim().is_empty() {
            continue;
        }
        match parse_address(&raw) {
            Some(address) => {
                if seen.insert(address.clone()) {
                    maintainers.push(address);
                }
            }
            None => debug!("invalid maintainer {}", raw),
        }
    }

    maintainers
}

#[async_trait]
impl Registry for NpmRegistry {
    fn name(&self) -> &'static str {
        "npm"
    }

    async fn list_packages(&self) -> Result<Vec<String>> {
        load_index(&self.index_path)
    }

    async fn maintainers(&self, package: &str) -> Result<Vec<String>> {
        let url = format!("{}/{}", self.registry_url, Self::encode_package_name(package));
        let packument: Packument = self.fetcher.get_json(&url).await?;
        Ok(packument_maintainers(packument))
    }

    async fn popularity(&self, package: &str) -> Result<i64> {
        let url = format!("{}/{}", self.downloads_url, package);
        let point: DownloadPoint = self
            .fetcher
            .get_json(&url)
            .await
            .map_err(|e| e.context(format!("could not get download count for {}", package)))?;
        Ok(point.downloads)
    }

    fn package_link(&self, package: &str) -> String {
        format!("https://www.npmjs.com/package/{}", package)
    }
}
