mod linux;
mod macos;
mod windows;

use qzdeploy_core::{AppIdentity, Platform};

use crate::command::CommandRunner;
use crate::lifecycle::{HostPlatform, LifecycleTiming};
use crate::locate::KnownLocations;
use crate::process::{ProcessMonitor, ProcessTable};

pub use linux::LinuxHost;
pub use macos::MacosHost;
pub use windows::WindowsHost;

#[cfg(test)]
pub(crate) use linux::{parse_which_output, parse_whereis_output};
#[cfg(test)]
pub(crate) use macos::parse_spotlight_output;
#[cfg(test)]
pub(crate) use windows::{install_dir_candidates, parse_uninstall_entries, search_for_file};

/// Collaborators shared by every platform host.
pub struct HostDeps<'a> {
    pub identity: &'a AppIdentity,
    pub table: &'a dyn ProcessTable,
    pub runner: &'a dyn CommandRunner,
    pub timing: LifecycleTiming,
    pub locations: KnownLocations,
    pub self_pid: u32,
}

impl<'a> HostDeps<'a> {
    pub fn new(
        identity: &'a AppIdentity,
        table: &'a dyn ProcessTable,
        runner: &'a dyn CommandRunner,
        timing: LifecycleTiming,
        locations: KnownLocations,
    ) -> Self {
        Self {
            identity,
            table,
            runner,
            timing,
            locations,
            self_pid: std::process::id(),
        }
    }

    pub fn monitor(&self, platform: Platform) -> ProcessMonitor<'_> {
        ProcessMonitor::new(
            self.identity,
            platform,
            self.table,
            self.runner,
            self.self_pid,
        )
    }
}

/// Picks the host implementation for `platform`; `Unknown` has none.
pub fn host_for<'a>(platform: Platform, deps: HostDeps<'a>) -> Option<Box<dyn HostPlatform + 'a>> {
    match platform {
        Platform::Windows => Some(Box::new(WindowsHost::new(deps))),
        Platform::MacOs => Some(Box::new(MacosHost::new(deps))),
        Platform::Linux => Some(Box::new(LinuxHost::new(deps))),
        Platform::Unknown => None,
    }
}
