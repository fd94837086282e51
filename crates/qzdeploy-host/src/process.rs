use std::path::PathBuf;

use qzdeploy_core::{AppIdentity, Platform};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, Signal, System, UpdateKind};
use tracing::debug;

use crate::command::{CommandRunner, CommandSpec};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
    pub exe: Option<PathBuf>,
    pub cmd: Vec<String>,
}

impl ProcessInfo {
    pub fn command_line(&self) -> String {
        self.cmd.join(" ")
    }
}

pub trait ProcessTable {
    /// All running processes, or `None` when the listing facility is unavailable.
    fn snapshot(&self) -> Option<Vec<ProcessInfo>>;

    /// Polite termination request. Returns whether a signal was delivered.
    fn terminate(&self, pid: u32) -> bool;

    /// Unconditional kill. Returns whether a signal was delivered.
    fn kill(&self, pid: u32) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcessTable;

impl SystemProcessTable {
    fn with_process<T>(pid: u32, action: impl FnOnce(&sysinfo::Process) -> T) -> Option<T> {
        let pid = Pid::from_u32(pid);
        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        system.process(pid).map(action)
    }
}

impl ProcessTable for SystemProcessTable {
    fn snapshot(&self) -> Option<Vec<ProcessInfo>> {
        let mut system = System::new();
        let refreshed = system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing()
                .with_exe(UpdateKind::OnlyIfNotSet)
                .with_cmd(UpdateKind::OnlyIfNotSet),
        );
        if refreshed == 0 {
            return None;
        }

        Some(
            system
                .processes()
                .iter()
                .map(|(pid, process)| ProcessInfo {
                    pid: pid.as_u32(),
                    name: process.name().to_string_lossy().into_owned(),
                    exe: process.exe().map(PathBuf::from),
                    cmd: process
                        .cmd()
                        .iter()
                        .map(|arg| arg.to_string_lossy().into_owned())
                        .collect(),
                })
                .collect(),
        )
    }

    fn terminate(&self, pid: u32) -> bool {
        Self::with_process(pid, |process| {
            process
                .kill_with(Signal::Term)
                .unwrap_or_else(|| process.kill())
        })
        .unwrap_or(false)
    }

    fn kill(&self, pid: u32) -> bool {
        Self::with_process(pid, |process| process.kill()).unwrap_or(false)
    }
}

/// Answers whether the application is running on this host.
pub struct ProcessMonitor<'a> {
    identity: &'a AppIdentity,
    platform: Platform,
    table: &'a dyn ProcessTable,
    runner: &'a dyn CommandRunner,
    self_pid: u32,
}

impl<'a> ProcessMonitor<'a> {
    pub fn new(
        identity: &'a AppIdentity,
        platform: Platform,
        table: &'a dyn ProcessTable,
        runner: &'a dyn CommandRunner,
        self_pid: u32,
    ) -> Self {
        Self {
            identity,
            platform,
            table,
            runner,
            self_pid,
        }
    }

    pub fn processes(&self) -> Vec<ProcessInfo> {
        match self.table.snapshot() {
            Some(processes) => processes
                .into_iter()
                .filter(|process| process.pid != self.self_pid)
                .collect(),
            None => {
                debug!("process listing unavailable; treating as no processes");
                Vec::new()
            }
        }
    }

    fn is_native_process(&self, process: &ProcessInfo) -> bool {
        self.identity
            .signature
            .matches_process_name(self.platform, &process.name)
    }

    fn has_signature(&self, process: &ProcessInfo) -> bool {
        self.identity
            .signature
            .matches_command_line(&process.command_line())
    }

    pub fn matching_processes(&self) -> Vec<ProcessInfo> {
        self.processes()
            .into_iter()
            .filter(|process| self.is_native_process(process) || self.has_signature(process))
            .collect()
    }

    pub fn matching_pids(&self) -> Vec<u32> {
        self.matching_processes()
            .into_iter()
            .map(|process| process.pid)
            .collect()
    }

    /// Linux only: the user-level service unit reports `active`.
    pub fn service_active(&self) -> bool {
        if self.platform != Platform::Linux {
            return false;
        }
        let spec = CommandSpec::new("systemctl")
            .args(["--user", "is-active", self.identity.service_unit]);
        match self.runner.output(&spec) {
            Ok(output) => output.success() && output.stdout.trim() == "active",
            Err(err) => {
                debug!(error = %err, "systemctl unavailable; skipping service probe");
                false
            }
        }
    }

    pub fn is_running(&self) -> bool {
        let processes = self.processes();
        processes.iter().any(|process| self.is_native_process(process))
            || processes.iter().any(|process| self.has_signature(process))
            || self.service_active()
    }
}
