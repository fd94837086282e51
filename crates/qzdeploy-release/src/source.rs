use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use tracing::debug;

use crate::types::Release;

pub const DEFAULT_RELEASES_URL: &str = "https://api.github.com/repos/qzind/tray/releases";
pub const RELEASES_PAGE_SIZE: u32 = 100;

/// Upstream release metadata, read-only.
pub trait ReleaseSource {
    fn list_releases(&self) -> Result<Vec<Release>>;

    fn release_by_tag(&self, tag: &str) -> Result<Option<Release>>;
}

#[derive(Debug, Clone)]
pub struct GithubReleases {
    client: Client,
    base_url: String,
}

impl GithubReleases {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("qzdeploy/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .context("failed to build release metadata HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn get(&self, url: &str) -> Result<Option<String>> {
        debug!(%url, "requesting release metadata");
        let response = self
            .client
            .get(url)
            .header("Accept", "application/vnd.github+json")
            .send()
            .with_context(|| format!("release metadata request failed: {url}"))?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(anyhow!("release metadata request failed: {url} status={status}"));
        }
        let body = response
            .text()
            .with_context(|| format!("failed reading release metadata body: {url}"))?;
        Ok(Some(body))
    }
}

impl ReleaseSource for GithubReleases {
    fn list_releases(&self) -> Result<Vec<Release>> {
        let url = format!("{}?per_page={RELEASES_PAGE_SIZE}", self.base_url);
        let body = self
            .get(&url)?
            .ok_or_else(|| anyhow!("release listing not found: {url}"))?;
        serde_json::from_str(&body)
            .with_context(|| format!("failed to parse release listing: {url}"))
    }

    fn release_by_tag(&self, tag: &str) -> Result<Option<Release>> {
        let url = format!("{}/tags/{tag}", self.base_url);
        let Some(body) = self.get(&url)? else {
            return Ok(None);
        };
        let release = serde_json::from_str(&body)
            .with_context(|| format!("failed to parse release metadata: {url}"))?;
        Ok(Some(release))
    }
}
