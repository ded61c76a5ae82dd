//! Skeleton reference files
//!
//! The entry point and alternate container wiring are replaced by the
//! files shipped with the latest matching skeleton release.

use crate::config::SkeletonSettings;
use crate::error::{MigrationError, MigrationResult};
use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::OnceCell;

/// Source of reference files for the target release
#[async_trait]
pub trait SkeletonFetcher: Send + Sync {
    /// Newest release tag matching `version_pattern`, or the default branch
    async fn resolve_latest_version_tag(&self, version_pattern: &str) -> MigrationResult<String>;

    /// Content of `relative_path` at `version_tag`
    async fn fetch_reference_file(&self, version_tag: &str, relative_path: &str) -> MigrationResult<String>;
}

/// First key of `package.versions` matching `pattern`
///
/// Registry metadata lists versions newest first, so key order matters.
pub fn select_version_tag(metadata: &Value, pattern: &Regex) -> Option<String> {
    metadata
        .get("package")?
        .get("versions")?
        .as_object()?
        .keys()
        .find(|version| pattern.is_match(version))
        .cloned()
}

/// Fetches registry metadata and raw files over HTTP
pub struct HttpSkeletonFetcher {
    client: reqwest::Client,
    metadata_url: String,
    raw_url: String,
    repository: String,
    default_branch: String,
}

impl HttpSkeletonFetcher {
    pub fn new(settings: &SkeletonSettings) -> MigrationResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .user_agent(concat!("mezzio-migration/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| MigrationError::fetch("HTTP client", e.to_string()))?;
        Ok(Self {
            client,
            metadata_url: settings.metadata_url.replace("{package}", &settings.package),
            raw_url: settings.raw_url.clone(),
            repository: settings.repository.clone(),
            default_branch: settings.default_branch.clone(),
        })
    }

    fn file_url(&self, version_tag: &str, relative_path: &str) -> String {
        self.raw_url
            .replace("{repository}", &self.repository)
            .replace("{tag}", version_tag)
            .replace("{path}", relative_path.trim_start_matches('/'))
    }

    async fn get(&self, url: &str) -> MigrationResult<reqwest::Response> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| MigrationError::fetch(url, e.to_string()))?;

        if !response.status().is_success() {
            return Err(MigrationError::fetch(
                url,
                format!("HTTP {}", response.status()),
            ));
        }
        Ok(response)
    }
}

#[async_trait]
impl SkeletonFetcher for HttpSkeletonFetcher {
    async fn resolve_latest_version_tag(&self, version_pattern: &str) -> MigrationResult<String> {
        let pattern = Regex::new(version_pattern)
            .map_err(|e| MigrationError::config(format!("skeleton version pattern: {e}")))?;

        let metadata: Value = self
            .get(&self.metadata_url)
            .await?
            .json()
            .await
            .map_err(|e| MigrationError::fetch(&self.metadata_url, e.to_string()))?;

        let tag = select_version_tag(&metadata, &pattern).unwrap_or_else(|| {
            tracing::warn!(default = %self.default_branch, "No skeleton release matches; using default branch");
            self.default_branch.clone()
        });
        Ok(tag)
    }

    async fn fetch_reference_file(&self, version_tag: &str, relative_path: &str) -> MigrationResult<String> {
        let url = self.file_url(version_tag, relative_path);
        tracing::debug!(url = %url, "Fetching reference file");
        self.get(&url)
            .await?
            .text()
            .await
            .map_err(|e| MigrationError::fetch(&url, e.to_string()))
    }
}

/// Reference files pinned to one skeleton version for this instance's lifetime
///
/// The version tag is resolved on first use and reused afterwards; a tag
/// from configuration bypasses resolution.
pub struct SkeletonFiles<F> {
    fetcher: F,
    version_pattern: String,
    tag: OnceCell<String>,
}

impl<F: SkeletonFetcher> SkeletonFiles<F> {
    pub fn new(fetcher: F, settings: &SkeletonSettings) -> Self {
        let tag = match &settings.pinned_tag {
            Some(pinned) => OnceCell::new_with(Some(pinned.clone())),
            None => OnceCell::new(),
        };
        Self {
            fetcher,
            version_pattern: settings.version_pattern.clone(),
            tag,
        }
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Skeleton version every file is fetched from
    pub async fn version_tag(&self) -> MigrationResult<&str> {
        let tag = self
            .tag
            .get_or_try_init(|| async {
                let tag = self
                    .fetcher
                    .resolve_latest_version_tag(&self.version_pattern)
                    .await?;
                tracing::info!(version = %tag, "Using skeleton version");
                Ok::<_, MigrationError>(tag)
            })
            .await?;
        Ok(tag.as_str())
    }

    /// Fetch a reference file at the resolved version
    pub async fn fetch(&self, relative_path: &str) -> MigrationResult<String> {
        let tag = self.version_tag().await?;
        self.fetcher.fetch_reference_file(tag, relative_path).await
    }
}
