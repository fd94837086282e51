use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use qzdeploy_host::{LifecycleTiming, DEFAULT_OVERRIDE_CERT_URL};
use qzdeploy_release::DEFAULT_RELEASES_URL;
use serde::Deserialize;
use tracing::debug;

const CONFIG_DIR_NAME: &str = "qzdeploy";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Optional on-disk settings. Every field has a default.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct DeployConfig {
    pub releases_url: String,
    /// Override trust artifact location. An empty value skips the download.
    pub override_cert_url: String,
    pub stop_timeout_secs: u64,
    pub start_grace_secs: u64,
    pub quit_grace_secs: u64,
    pub poll_interval_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            releases_url: DEFAULT_RELEASES_URL.to_string(),
            override_cert_url: DEFAULT_OVERRIDE_CERT_URL.to_string(),
            stop_timeout_secs: 10,
            start_grace_secs: 3,
            quit_grace_secs: 2,
            poll_interval_ms: 1000,
            request_timeout_secs: 30,
        }
    }
}

impl DeployConfig {
    pub(crate) fn from_toml_str(input: &str) -> Result<Self> {
        toml::from_str(input).context("failed to parse qzdeploy config")
    }

    /// Reads `explicit` when given, else the per-user config file if it exists.
    pub(crate) fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::read(path);
        }
        match default_config_path() {
            Some(path) if path.is_file() => Self::read(&path),
            _ => {
                debug!("no config file; using defaults");
                Ok(Self::default())
            }
        }
    }

    fn read(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "reading config");
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;
        Self::from_toml_str(&raw).with_context(|| format!("invalid config: {}", path.display()))
    }

    pub(crate) fn timing(&self) -> LifecycleTiming {
        LifecycleTiming {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            start_grace: Duration::from_secs(self.start_grace_secs),
            quit_grace: Duration::from_secs(self.quit_grace_secs),
        }
    }

    pub(crate) fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

pub(crate) fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}
