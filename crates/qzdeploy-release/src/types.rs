use std::fmt;

use anyhow::{anyhow, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ReleaseAsset {
    pub name: String,
    #[serde(rename = "browser_download_url")]
    pub url: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Release {
    #[serde(rename = "tag_name")]
    pub tag: String,
    #[serde(default)]
    pub prerelease: bool,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Stable,
    Beta,
}

impl Channel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stable => "stable",
            Self::Beta => "beta",
        }
    }
}

/// What the operator asked for: a release track or one exact tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseSelector {
    Channel(Channel),
    Version(String),
}

impl ReleaseSelector {
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "" | "stable" => return Ok(Self::Channel(Channel::Stable)),
            "beta" | "unstable" => return Ok(Self::Channel(Channel::Beta)),
            _ => {}
        }

        if looks_like_version(trimmed) {
            return Ok(Self::Version(normalize_version_tag(trimmed)));
        }

        Err(anyhow!(
            "unrecognized release selector '{trimmed}'; expected 'stable', 'beta', 'unstable' or a version such as 2.2.4"
        ))
    }
}

impl fmt::Display for ReleaseSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Channel(channel) => f.write_str(channel.as_str()),
            Self::Version(tag) => f.write_str(tag),
        }
    }
}

fn looks_like_version(value: &str) -> bool {
    let digits = value
        .strip_prefix('v')
        .or_else(|| value.strip_prefix('V'))
        .unwrap_or(value);
    digits.chars().next().is_some_and(|ch| ch.is_ascii_digit())
}

/// Prefixes the `v` marker release tags carry when the operator left it off.
pub fn normalize_version_tag(version: &str) -> String {
    let trimmed = version.trim();
    if let Some(rest) = trimmed.strip_prefix('V') {
        return format!("v{rest}");
    }
    if trimmed.starts_with('v') {
        return trimmed.to_string();
    }
    format!("v{trimmed}")
}
