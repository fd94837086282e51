use std::path::{Path, PathBuf};

use qzdeploy_core::{DetectionSource, InstallationRecord, Platform};
use tracing::debug;

use crate::command::CommandSpec;
use crate::hosts::HostDeps;
use crate::lifecycle::{HostPlatform, LifecycleTiming};
use crate::locate::{from_known_locations, from_running_processes, Locator};

pub struct MacosHost<'a> {
    deps: HostDeps<'a>,
}

impl<'a> MacosHost<'a> {
    pub fn new(deps: HostDeps<'a>) -> Self {
        Self { deps }
    }

    fn from_spotlight(&self) -> Option<InstallationRecord> {
        let query = format!(
            "kMDItemContentType == 'com.apple.application-bundle' && kMDItemDisplayName == '{}'",
            self.deps.identity.display_name
        );
        let spec = CommandSpec::new("mdfind").arg(query);
        let output = match self.deps.runner.output(&spec) {
            Ok(output) if output.success() => output,
            Ok(_) => return None,
            Err(err) => {
                debug!(error = %err, "spotlight unavailable");
                return None;
            }
        };

        let bundle = parse_spotlight_output(&output.stdout)
            .into_iter()
            .find(|path| path.is_dir())?;
        Some(InstallationRecord::discover(
            self.deps.identity,
            Platform::MacOs,
            bundle,
            DetectionSource::Spotlight,
        ))
    }
}

impl HostPlatform for MacosHost<'_> {
    fn platform(&self) -> Platform {
        Platform::MacOs
    }

    fn deps(&self) -> &HostDeps<'_> {
        &self.deps
    }

    fn request_graceful_quit(&self) {
        let script = format!(
            "tell application \"{}\" to quit",
            self.deps.identity.display_name
        );
        let spec = CommandSpec::new("osascript").args(["-e", script.as_str()]);
        match self.deps.runner.output(&spec) {
            Ok(output) if output.success() => {
                // The quit event is asynchronous.
                LifecycleTiming::pause(self.deps.timing.quit_grace);
            }
            Ok(output) => debug!(code = ?output.code, "app quit request rejected"),
            Err(err) => debug!(error = %err, "osascript unavailable"),
        }
    }

    fn launch(&self, install: Option<&InstallationRecord>) -> bool {
        let spec = match install {
            Some(install) => CommandSpec::new("open").arg(&install.install_dir),
            None => CommandSpec::new("open").args(["-a", self.deps.identity.display_name]),
        };
        match self.deps.runner.output(&spec) {
            Ok(output) => output.success(),
            Err(err) => {
                debug!(error = %err, "open unavailable");
                false
            }
        }
    }

    fn locators(&self) -> Vec<Locator<'_>> {
        let deps = &self.deps;
        vec![
            Locator::new("running-process", move || {
                let processes = deps.monitor(Platform::MacOs).processes();
                from_running_processes(deps.identity, Platform::MacOs, &processes)
            }),
            Locator::new("known-location", move || {
                from_known_locations(deps.identity, Platform::MacOs, &deps.locations)
            }),
            Locator::new("spotlight", move || self.from_spotlight()),
        ]
    }
}

pub(crate) fn parse_spotlight_output(raw: &str) -> Vec<PathBuf> {
    raw.lines()
        .map(str::trim)
        .filter(|line| line.ends_with(".app") && Path::new(line).is_absolute())
        .map(PathBuf::from)
        .collect()
}
