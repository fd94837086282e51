use anyhow::{anyhow, Context, Result};
use qzdeploy_core::{Architecture, PackageExtension, Platform};
use tracing::debug;

use crate::order::latest_tag;
use crate::source::ReleaseSource;
use crate::types::{ReleaseAsset, ReleaseSelector};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub tag: String,
    pub asset: ReleaseAsset,
}

/// Architecture bucket an asset belongs to, judged from its file name.
pub fn bucket_for_asset(asset: &ReleaseAsset) -> Architecture {
    let lower = asset.name.to_ascii_lowercase();
    if lower.contains("arm64") || lower.contains("aarch64") {
        return Architecture::Arm64;
    }
    if lower.contains("riscv") {
        return Architecture::Riscv;
    }
    Architecture::Amd64
}

/// First asset with the packaging extension whose bucket matches `architecture`.
pub fn select_asset<'a>(
    assets: &'a [ReleaseAsset],
    extension: PackageExtension,
    architecture: Architecture,
) -> Option<&'a ReleaseAsset> {
    assets
        .iter()
        .filter(|asset| extension.matches_file_name(&asset.name))
        .find(|asset| bucket_for_asset(asset) == architecture)
}

pub fn resolve_target(
    source: &dyn ReleaseSource,
    selector: &ReleaseSelector,
    platform: Platform,
    architecture: Architecture,
) -> Result<ResolvedTarget> {
    let release = match selector {
        ReleaseSelector::Version(tag) => source
            .release_by_tag(tag)
            .with_context(|| format!("failed to look up release {tag}"))?
            .ok_or_else(|| anyhow!("release {tag} was not found upstream"))?,
        ReleaseSelector::Channel(channel) => {
            let releases = source
                .list_releases()
                .context("failed to fetch release metadata")?;
            debug!(count = releases.len(), channel = channel.as_str(), "fetched releases");
            latest_tag(&releases, *channel)
                .cloned()
                .ok_or_else(|| {
                    anyhow!(
                        "no release tag could be resolved for channel '{}'",
                        channel.as_str()
                    )
                })?
        }
    };

    let extension = PackageExtension::for_platform(platform);
    let asset = select_asset(&release.assets, extension, architecture).ok_or_else(|| {
        anyhow!(
            "release {} has no {} asset for {}/{}",
            release.tag,
            extension.suffix(),
            platform.as_str(),
            architecture.as_str()
        )
    })?;

    Ok(ResolvedTarget {
        tag: release.tag.clone(),
        asset: asset.clone(),
    })
}
