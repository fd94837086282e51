mod order;
mod select;
mod source;
mod types;

pub use order::{latest_tag, tag_version};
pub use select::{bucket_for_asset, resolve_target, select_asset, ResolvedTarget};
pub use source::{GithubReleases, ReleaseSource, DEFAULT_RELEASES_URL, RELEASES_PAGE_SIZE};
pub use types::{normalize_version_tag, Channel, Release, ReleaseAsset, ReleaseSelector};
