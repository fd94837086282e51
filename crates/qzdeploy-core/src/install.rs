use std::fmt;
use std::path::{Path, PathBuf};

use crate::identity::AppIdentity;
use crate::platform::Platform;

/// Which detection strategy produced an installation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionSource {
    RunningProcess,
    Registry,
    KnownLocation,
    FilesystemSearch,
    CommandLookup,
    Spotlight,
}

impl DetectionSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RunningProcess => "running-process",
            Self::Registry => "registry",
            Self::KnownLocation => "known-location",
            Self::FilesystemSearch => "filesystem-search",
            Self::CommandLookup => "command-lookup",
            Self::Spotlight => "spotlight",
        }
    }
}

impl fmt::Display for DetectionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallationRecord {
    pub install_dir: PathBuf,
    pub console: Option<PathBuf>,
    pub source: DetectionSource,
}

impl InstallationRecord {
    /// Builds a record for `install_dir`, resolving the first console candidate that exists.
    pub fn discover(
        identity: &AppIdentity,
        platform: Platform,
        install_dir: impl Into<PathBuf>,
        source: DetectionSource,
    ) -> Self {
        let install_dir = install_dir.into();
        let console = identity
            .console_candidates(platform)
            .iter()
            .map(|candidate| install_dir.join(candidate))
            .find(|path| path.is_file());
        Self {
            install_dir,
            console,
            source,
        }
    }

    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    /// Directory the override trust artifact is copied into.
    pub fn override_cert_dir(&self, platform: Platform) -> PathBuf {
        match platform {
            Platform::MacOs => self.install_dir.join("Contents").join("Resources"),
            _ => self.install_dir.clone(),
        }
    }
}
