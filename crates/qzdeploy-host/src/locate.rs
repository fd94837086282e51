use std::path::{Path, PathBuf};

use qzdeploy_core::{AppIdentity, DetectionSource, InstallationRecord, Platform};
use tracing::debug;

use crate::process::ProcessInfo;

/// One named install-path detection strategy.
pub struct Locator<'a> {
    name: &'static str,
    probe: Box<dyn Fn() -> Option<InstallationRecord> + 'a>,
}

impl<'a> Locator<'a> {
    pub fn new(
        name: &'static str,
        probe: impl Fn() -> Option<InstallationRecord> + 'a,
    ) -> Self {
        Self {
            name,
            probe: Box::new(probe),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Runs locators in order and stops at the first that finds an install.
pub fn resolve_first(locators: &[Locator<'_>]) -> Option<InstallationRecord> {
    for locator in locators {
        debug!(strategy = locator.name, "trying install path strategy");
        if let Some(record) = (locator.probe)() {
            debug!(
                strategy = locator.name,
                path = %record.install_dir.display(),
                "install path resolved"
            );
            return Some(record);
        }
    }
    debug!("no install path strategy succeeded");
    None
}

/// Canonical install directories and search roots for one platform.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KnownLocations {
    pub install_dirs: Vec<PathBuf>,
    pub search_roots: Vec<PathBuf>,
}

impl KnownLocations {
    pub fn new(install_dirs: Vec<PathBuf>, search_roots: Vec<PathBuf>) -> Self {
        Self {
            install_dirs,
            search_roots,
        }
    }

    pub fn for_platform(platform: Platform, identity: &AppIdentity) -> Self {
        match platform {
            Platform::Windows => {
                let roots = windows_program_roots();
                let mut install_dirs = roots
                    .iter()
                    .map(|root| root.join(identity.display_name))
                    .collect::<Vec<_>>();
                if let Some(local) = std::env::var_os("LOCALAPPDATA") {
                    install_dirs.push(
                        PathBuf::from(local)
                            .join("Programs")
                            .join(identity.display_name),
                    );
                }
                Self::new(dedup(install_dirs), roots)
            }
            Platform::MacOs => {
                let mut install_dirs =
                    vec![PathBuf::from("/Applications").join(identity.bundle_name)];
                if let Some(home) = dirs::home_dir() {
                    install_dirs.push(home.join("Applications").join(identity.bundle_name));
                }
                Self::new(install_dirs, Vec::new())
            }
            Platform::Linux | Platform::Unknown => {
                let unit = identity.service_unit;
                let mut install_dirs = vec![PathBuf::from("/opt").join(unit)];
                if let Some(data) = dirs::data_dir() {
                    install_dirs.push(data.join(unit));
                }
                Self::new(dedup(install_dirs), Vec::new())
            }
        }
    }
}

fn windows_program_roots() -> Vec<PathBuf> {
    let roots = ["ProgramW6432", "ProgramFiles", "ProgramFiles(x86)"]
        .iter()
        .filter_map(|key| std::env::var_os(key))
        .map(PathBuf::from)
        .collect::<Vec<_>>();
    dedup(roots)
}

fn dedup(paths: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut unique: Vec<PathBuf> = Vec::with_capacity(paths.len());
    for path in paths {
        if !unique.contains(&path) {
            unique.push(path);
        }
    }
    unique
}

pub(crate) fn has_expected_executable(
    identity: &AppIdentity,
    platform: Platform,
    dir: &Path,
) -> bool {
    identity
        .console_candidates(platform)
        .iter()
        .any(|candidate| dir.join(candidate).is_file())
}

/// Nearest ancestor (or `path` itself) named like the application.
pub(crate) fn naming_ancestor(identity: &AppIdentity, path: &Path) -> Option<PathBuf> {
    path.ancestors()
        .find(|ancestor| {
            ancestor
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| identity.matches_directory_name(name))
        })
        .map(Path::to_path_buf)
}

fn install_root_for_executable(platform: Platform, exe: &Path) -> Option<PathBuf> {
    if platform == Platform::MacOs {
        if let Some(bundle) = exe
            .ancestors()
            .find(|ancestor| ancestor.extension().is_some_and(|ext| ext == "app"))
        {
            return Some(bundle.to_path_buf());
        }
    }
    exe.parent().map(Path::to_path_buf)
}

pub(crate) fn from_running_processes(
    identity: &AppIdentity,
    platform: Platform,
    processes: &[ProcessInfo],
) -> Option<InstallationRecord> {
    let record = |dir: PathBuf| {
        InstallationRecord::discover(identity, platform, dir, DetectionSource::RunningProcess)
    };

    let native = processes
        .iter()
        .filter(|process| identity.signature.matches_process_name(platform, &process.name))
        .filter_map(|process| process.exe.as_deref())
        .filter_map(|exe| install_root_for_executable(platform, exe))
        .find(|dir| dir.is_dir());
    if let Some(dir) = native {
        return Some(record(dir));
    }

    // The application may run on a bundled runtime (e.g. java) that names its entry jar or class.
    processes
        .iter()
        .filter(|process| identity.signature.matches_command_line(&process.command_line()))
        .find_map(|process| {
            let jar_dirs = process
                .cmd
                .iter()
                .filter(|arg| arg.to_ascii_lowercase().ends_with(identity.entry_jar))
                .map(PathBuf::from)
                .filter(|jar| jar.is_absolute())
                .filter_map(|jar| jar.parent().and_then(|dir| naming_ancestor(identity, dir)));
            let exe_dirs = process
                .exe
                .as_deref()
                .and_then(|exe| naming_ancestor(identity, exe));
            jar_dirs.chain(exe_dirs).find(|dir| dir.is_dir())
        })
        .map(record)
}

pub(crate) fn from_known_locations(
    identity: &AppIdentity,
    platform: Platform,
    locations: &KnownLocations,
) -> Option<InstallationRecord> {
    locations
        .install_dirs
        .iter()
        .find(|dir| has_expected_executable(identity, platform, dir))
        .map(|dir| {
            InstallationRecord::discover(identity, platform, dir, DetectionSource::KnownLocation)
        })
}
