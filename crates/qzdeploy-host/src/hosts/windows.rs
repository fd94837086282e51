use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use qzdeploy_core::{DetectionSource, InstallationRecord, Platform};
use tracing::debug;

use crate::command::CommandSpec;
use crate::hosts::HostDeps;
use crate::lifecycle::HostPlatform;
use crate::locate::{from_known_locations, from_running_processes, Locator};

const UNINSTALL_ROOTS: [&str; 3] = [
    r"HKLM\SOFTWARE\Microsoft\Windows\CurrentVersion\Uninstall",
    r"HKLM\SOFTWARE\WOW6432Node\Microsoft\Windows\CurrentVersion\Uninstall",
    r"HKCU\SOFTWARE\Microsoft\Windows\CurrentVersion\Uninstall",
];

const SEARCH_DEPTH: usize = 3;

pub struct WindowsHost<'a> {
    deps: HostDeps<'a>,
}

impl<'a> WindowsHost<'a> {
    pub fn new(deps: HostDeps<'a>) -> Self {
        Self { deps }
    }

    fn from_registry(&self) -> Option<InstallationRecord> {
        let identity = self.deps.identity;
        for root in UNINSTALL_ROOTS {
            let spec = CommandSpec::new("reg").args(["query", root, "/s"]);
            let output = match self.deps.runner.output(&spec) {
                Ok(output) if output.success() => output,
                Ok(_) => continue,
                Err(err) => {
                    debug!(root, error = %err, "registry query unavailable");
                    continue;
                }
            };

            let found = parse_uninstall_entries(&output.stdout)
                .iter()
                .filter(|entry| entry.display_name_contains(identity.display_name))
                .flat_map(install_dir_candidates)
                .find(|dir| dir.is_dir());
            if let Some(dir) = found {
                return Some(InstallationRecord::discover(
                    identity,
                    Platform::Windows,
                    dir,
                    DetectionSource::Registry,
                ));
            }
        }
        None
    }

    fn from_filesystem_search(&self) -> Option<InstallationRecord> {
        let identity = self.deps.identity;
        let file_name = identity.executable_name(Platform::Windows);
        self.deps
            .locations
            .search_roots
            .iter()
            .find_map(|root| search_for_file(root, &file_name, SEARCH_DEPTH))
            .and_then(|hit| hit.parent().map(Path::to_path_buf))
            .map(|dir| {
                InstallationRecord::discover(
                    identity,
                    Platform::Windows,
                    dir,
                    DetectionSource::FilesystemSearch,
                )
            })
    }
}

impl HostPlatform for WindowsHost<'_> {
    fn platform(&self) -> Platform {
        Platform::Windows
    }

    fn deps(&self) -> &HostDeps<'_> {
        &self.deps
    }

    fn request_graceful_quit(&self) {}

    fn launch(&self, install: Option<&InstallationRecord>) -> bool {
        let Some(install) = install else {
            debug!("no install directory; cannot launch on windows");
            return false;
        };
        let exe = install
            .install_dir
            .join(self.deps.identity.executable_name(Platform::Windows));
        if !exe.is_file() {
            debug!(exe = %exe.display(), "executable missing");
            return false;
        }
        let spec = CommandSpec::new(&exe).current_dir(&install.install_dir);
        self.deps.runner.spawn(&spec).is_ok()
    }

    fn locators(&self) -> Vec<Locator<'_>> {
        let deps = &self.deps;
        vec![
            Locator::new("running-process", move || {
                let processes = deps.monitor(Platform::Windows).processes();
                from_running_processes(deps.identity, Platform::Windows, &processes)
            }),
            Locator::new("registry", move || self.from_registry()),
            Locator::new("known-location", move || {
                from_known_locations(deps.identity, Platform::Windows, &deps.locations)
            }),
            Locator::new("filesystem-search", move || self.from_filesystem_search()),
        ]
    }
}

/// One uninstall subkey from `reg query ... /s` output.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) struct UninstallEntry {
    pub key: String,
    pub values: BTreeMap<String, String>,
}

impl UninstallEntry {
    fn value(&self, name: &str) -> Option<&str> {
        self.values
            .get(name)
            .map(String::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    pub fn display_name_contains(&self, needle: &str) -> bool {
        self.value("DisplayName").is_some_and(|name| {
            name.to_ascii_lowercase()
                .contains(&needle.to_ascii_lowercase())
        })
    }
}

pub(crate) fn parse_uninstall_entries(raw: &str) -> Vec<UninstallEntry> {
    let mut entries = Vec::new();
    let mut current: Option<UninstallEntry> = None;

    for line in raw.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.starts_with("HKEY_") {
            if let Some(entry) = current.take() {
                entries.push(entry);
            }
            current = Some(UninstallEntry {
                key: trimmed.to_string(),
                values: BTreeMap::new(),
            });
            continue;
        }

        let Some(entry) = current.as_mut() else {
            continue;
        };
        // `    Name    REG_SZ    Value` with runs of spaces as separators.
        let Some(type_at) = trimmed.find("    REG_") else {
            continue;
        };
        let name = trimmed[..type_at].trim();
        let rest = trimmed[type_at..].trim_start();
        let value = rest
            .split_once("    ")
            .map(|(_, value)| value.trim())
            .unwrap_or("");
        entry.values.insert(name.to_string(), value.to_string());
    }

    if let Some(entry) = current {
        entries.push(entry);
    }
    entries
}

/// Install directory guesses from an uninstall entry, in trust order.
pub(crate) fn install_dir_candidates(entry: &UninstallEntry) -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(location) = entry.value("InstallLocation") {
        candidates.push(PathBuf::from(strip_quotes(location)));
    }
    if let Some(command) = entry.value("UninstallString") {
        if let Some(dir) = executable_from_command(command).and_then(parent_dir) {
            candidates.push(dir);
        }
    }
    if let Some(icon) = entry.value("DisplayIcon") {
        if let Some(dir) = parent_dir(icon_path(icon)) {
            candidates.push(dir);
        }
    }
    candidates
}

fn strip_quotes(value: &str) -> &str {
    value.trim().trim_matches('"').trim()
}

fn parent_dir(path: PathBuf) -> Option<PathBuf> {
    path.parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map(Path::to_path_buf)
}

fn executable_from_command(command: &str) -> Option<PathBuf> {
    let trimmed = command.trim();
    if let Some(rest) = trimmed.strip_prefix('"') {
        let end = rest.find('"')?;
        return Some(PathBuf::from(&rest[..end]));
    }
    let lower = trimmed.to_ascii_lowercase();
    match lower.find(".exe") {
        Some(index) => Some(PathBuf::from(&trimmed[..index + 4])),
        None => trimmed.split_whitespace().next().map(PathBuf::from),
    }
}

fn icon_path(icon: &str) -> PathBuf {
    let unquoted = strip_quotes(icon);
    let without_index = match unquoted.rsplit_once(',') {
        Some((path, index)) if index.trim().parse::<i32>().is_ok() => path,
        _ => unquoted,
    };
    PathBuf::from(strip_quotes(without_index))
}

/// Depth-limited search for `file_name` under `root`; unreadable directories are skipped.
pub(crate) fn search_for_file(root: &Path, file_name: &str, max_depth: usize) -> Option<PathBuf> {
    let entries = fs::read_dir(root).ok()?;
    let mut subdirs = Vec::new();
    let mut files = Vec::new();
    for entry in entries.flatten() {
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_dir() {
            subdirs.push(entry.path());
        } else if file_type.is_file() {
            files.push(entry.path());
        }
    }

    files.sort();
    if let Some(hit) = files.into_iter().find(|path| {
        path.file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.eq_ignore_ascii_case(file_name))
    }) {
        return Some(hit);
    }

    if max_depth == 0 {
        return None;
    }
    subdirs.sort();
    subdirs
        .iter()
        .find_map(|dir| search_for_file(dir, file_name, max_depth - 1))
}
