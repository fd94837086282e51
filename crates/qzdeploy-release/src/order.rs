use semver::Version;
use tracing::debug;

use crate::types::{Channel, Release};

/// Parses a release tag into a semantic version, padding missing minor/patch parts.
pub fn tag_version(tag: &str) -> Option<Version> {
    let trimmed = tag.trim();
    let raw = trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed);
    if let Ok(version) = Version::parse(raw) {
        return Some(version);
    }

    let split_at = raw.find(['-', '+']).unwrap_or(raw.len());
    let (core, suffix) = raw.split_at(split_at);
    let mut parts = core.split('.').collect::<Vec<_>>();
    if parts.is_empty() || parts.len() > 3 || parts.iter().any(|part| part.is_empty()) {
        return None;
    }
    while parts.len() < 3 {
        parts.push("0");
    }
    Version::parse(&format!("{}{suffix}", parts.join("."))).ok()
}

/// Highest tag of the partition `channel` maps to: stable-only, or stable plus prereleases.
pub fn latest_tag(releases: &[Release], channel: Channel) -> Option<&Release> {
    releases
        .iter()
        .filter(|release| channel == Channel::Beta || !release.prerelease)
        .filter_map(|release| match tag_version(&release.tag) {
            Some(version) => Some((version, release)),
            None => {
                debug!(tag = %release.tag, "ignoring release tag without a semantic version");
                None
            }
        })
        .max_by(|(left, _), (right, _)| left.cmp(right))
        .map(|(_, release)| release)
}
