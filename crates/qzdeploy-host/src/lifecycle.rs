use std::thread;
use std::time::Duration;

use qzdeploy_core::{InstallationRecord, Platform};
use tracing::{debug, warn};

use crate::hosts::HostDeps;
use crate::locate::{resolve_first, Locator};
use crate::process::ProcessMonitor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleTiming {
    pub poll_interval: Duration,
    pub start_grace: Duration,
    pub quit_grace: Duration,
}

impl Default for LifecycleTiming {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            start_grace: Duration::from_secs(3),
            quit_grace: Duration::from_secs(2),
        }
    }
}

impl LifecycleTiming {
    /// Zero-length timing for tests and dry runs.
    pub fn immediate() -> Self {
        Self {
            poll_interval: Duration::ZERO,
            start_grace: Duration::ZERO,
            quit_grace: Duration::ZERO,
        }
    }

    pub(crate) fn pause(duration: Duration) {
        if !duration.is_zero() {
            thread::sleep(duration);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    NotRunning,
    Stopped { waited_secs: u64 },
    Killed,
    StillRunning,
}

impl StopOutcome {
    pub fn is_stopped(self) -> bool {
        !matches!(self, Self::StillRunning)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Running,
    Unconfirmed,
    NotLaunched,
}

/// Per-platform lifecycle capabilities. `stop`, `start` and `resolve_install_path`
/// are shared algorithms over the platform primitives.
pub trait HostPlatform {
    fn platform(&self) -> Platform;

    fn deps(&self) -> &HostDeps<'_>;

    /// OS-native quit request issued before termination signals.
    fn request_graceful_quit(&self);

    /// Starts the application. Returns whether a launch was issued.
    fn launch(&self, install: Option<&InstallationRecord>) -> bool;

    /// Install path strategies in the order they must be tried.
    fn locators(&self) -> Vec<Locator<'_>>;

    fn monitor(&self) -> ProcessMonitor<'_> {
        self.deps().monitor(self.platform())
    }

    fn is_running(&self) -> bool {
        self.monitor().is_running()
    }

    fn resolve_install_path(&self) -> Option<InstallationRecord> {
        resolve_first(&self.locators())
    }

    /// Graceful quit plus termination signals, bounded polling, then a forced kill.
    /// Never fails; the outcome is advisory.
    fn stop(&self, max_wait_secs: u64, progress: &mut dyn FnMut(u64, u64)) -> StopOutcome {
        let monitor = self.monitor();
        if !monitor.is_running() {
            return StopOutcome::NotRunning;
        }

        let deps = self.deps();
        self.request_graceful_quit();
        for pid in monitor.matching_pids() {
            if !deps.table.terminate(pid) {
                debug!(pid, "termination signal not delivered");
            }
        }

        for waited in 0..max_wait_secs {
            if !monitor.is_running() {
                return StopOutcome::Stopped {
                    waited_secs: waited,
                };
            }
            progress(waited, max_wait_secs);
            LifecycleTiming::pause(deps.timing.poll_interval);
        }
        if !monitor.is_running() {
            return StopOutcome::Stopped {
                waited_secs: max_wait_secs,
            };
        }

        warn!(max_wait_secs, "application still running; forcing kill");
        for pid in monitor.matching_pids() {
            if !deps.table.kill(pid) {
                debug!(pid, "kill signal not delivered");
            }
        }
        LifecycleTiming::pause(deps.timing.poll_interval);

        if monitor.is_running() {
            StopOutcome::StillRunning
        } else {
            StopOutcome::Killed
        }
    }

    /// Launches, waits the start grace period, then checks once.
    fn start(&self, install: Option<&InstallationRecord>) -> StartOutcome {
        if !self.launch(install) {
            return StartOutcome::NotLaunched;
        }
        LifecycleTiming::pause(self.deps().timing.start_grace);
        if self.is_running() {
            StartOutcome::Running
        } else {
            StartOutcome::Unconfirmed
        }
    }
}
