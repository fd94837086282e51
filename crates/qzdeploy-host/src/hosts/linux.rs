use std::fs;
use std::path::{Path, PathBuf};

use qzdeploy_core::{DetectionSource, InstallationRecord, Platform};
use tracing::debug;

use crate::command::CommandSpec;
use crate::hosts::HostDeps;
use crate::lifecycle::HostPlatform;
use crate::locate::{from_known_locations, from_running_processes, Locator};

pub struct LinuxHost<'a> {
    deps: HostDeps<'a>,
}

impl<'a> LinuxHost<'a> {
    pub fn new(deps: HostDeps<'a>) -> Self {
        Self { deps }
    }

    fn systemctl_user(&self, action: &str) -> bool {
        let spec = CommandSpec::new("systemctl").args([
            "--user",
            action,
            self.deps.identity.service_unit,
        ]);
        match self.deps.runner.output(&spec) {
            Ok(output) => output.success(),
            Err(err) => {
                debug!(action, error = %err, "systemctl unavailable");
                false
            }
        }
    }

    fn from_command_lookup(&self) -> Option<InstallationRecord> {
        let name = self.deps.identity.executable_name(Platform::Linux);
        let which = CommandSpec::new("which").arg(&name);
        let whereis = CommandSpec::new("whereis").args(["-b", name.as_str()]);

        let found = self
            .deps
            .runner
            .output(&which)
            .ok()
            .filter(|output| output.success())
            .and_then(|output| parse_which_output(&output.stdout))
            .or_else(|| {
                self.deps
                    .runner
                    .output(&whereis)
                    .ok()
                    .filter(|output| output.success())
                    .and_then(|output| parse_whereis_output(&output.stdout))
            })?;

        let resolved = fs::canonicalize(&found).unwrap_or(found);
        let dir = resolved.parent()?.to_path_buf();
        Some(InstallationRecord::discover(
            self.deps.identity,
            Platform::Linux,
            dir,
            DetectionSource::CommandLookup,
        ))
    }
}

impl HostPlatform for LinuxHost<'_> {
    fn platform(&self) -> Platform {
        Platform::Linux
    }

    fn deps(&self) -> &HostDeps<'_> {
        &self.deps
    }

    fn request_graceful_quit(&self) {
        if !self.systemctl_user("stop") {
            debug!("service stop not applicable");
        }
    }

    fn launch(&self, install: Option<&InstallationRecord>) -> bool {
        if self.systemctl_user("start") {
            return true;
        }

        let Some(install) = install else {
            debug!("service start failed and no install directory is known");
            return false;
        };
        let exe = install
            .install_dir
            .join(self.deps.identity.executable_name(Platform::Linux));
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
                let processes = deps.monitor(Platform::Linux).processes();
                from_running_processes(deps.identity, Platform::Linux, &processes)
            }),
            Locator::new("known-location", move || {
                from_known_locations(deps.identity, Platform::Linux, &deps.locations)
            }),
            Locator::new("command-lookup", move || self.from_command_lookup()),
        ]
    }
}

pub(crate) fn parse_which_output(raw: &str) -> Option<PathBuf> {
    raw.lines()
        .map(str::trim)
        .find(|line| Path::new(line).is_absolute())
        .map(PathBuf::from)
}

/// `whereis -b` prints `name: /path/one /path/two`.
pub(crate) fn parse_whereis_output(raw: &str) -> Option<PathBuf> {
    let (_, paths) = raw.lines().next()?.split_once(':')?;
    paths
        .split_whitespace()
        .find(|path| Path::new(path).is_absolute())
        .map(PathBuf::from)
}
