use std::fs;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use qzdeploy_core::{InstallationRecord, Platform};
use tracing::debug;

use crate::command::{CommandRunner, CommandSpec};
use crate::download::Fetcher;
use crate::elevate::Elevation;

pub const OVERRIDE_CERT_FILE: &str = "override.crt";
pub const DEFAULT_OVERRIDE_CERT_URL: &str =
    "https://raw.githubusercontent.com/qzind/tray/master/assets/signing/digital-certificate.txt";

const ROUTE_PROBE_ADDR: &str = "8.8.8.8:80";

/// `localhost`, then the primary IPv4 when one was detected, joined by `;`.
pub fn compose_host_list(primary_ipv4: Option<Ipv4Addr>) -> String {
    let mut hosts = vec!["localhost".to_string()];
    if let Some(ip) = primary_ipv4 {
        hosts.push(ip.to_string());
    }
    hosts.join(";")
}

pub fn usable_ipv4(addr: IpAddr) -> Option<Ipv4Addr> {
    match addr {
        IpAddr::V4(ip) if !ip.is_loopback() && !ip.is_unspecified() => Some(ip),
        _ => None,
    }
}

/// Address of the interface that routes outbound traffic. No packet is sent.
pub fn detect_primary_ipv4() -> Option<Ipv4Addr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    if let Err(err) = socket.connect(ROUTE_PROBE_ADDR) {
        debug!(error = %err, "no outbound route for primary address detection");
        return None;
    }
    let local = socket.local_addr().ok()?;
    usable_ipv4(local.ip())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertgenOutcome {
    Generated,
    Failed { code: Option<i32>, detail: String },
    NoConsole,
}

/// Drives the vendor certificate tool and the override trust artifact.
pub struct CertificateDeployer<'a> {
    platform: Platform,
    runner: &'a dyn CommandRunner,
    elevation: Elevation,
}

impl<'a> CertificateDeployer<'a> {
    pub fn new(platform: Platform, runner: &'a dyn CommandRunner, elevation: Elevation) -> Self {
        Self {
            platform,
            runner,
            elevation,
        }
    }

    pub fn certgen_command(&self, console: &Path, hosts: &str) -> CommandSpec {
        let mut spec = CommandSpec::new(console).args(["certgen", "--host", hosts]);
        if let Some(dir) = console.parent() {
            spec = spec.current_dir(dir);
        }
        self.elevation.wrap(spec)
    }

    pub fn generate(&self, install: &InstallationRecord, hosts: &str) -> CertgenOutcome {
        let Some(console) = install.console.as_deref() else {
            return CertgenOutcome::NoConsole;
        };
        let spec = self.certgen_command(console, hosts);
        let output = match self.runner.output(&spec) {
            Ok(output) => output,
            Err(err) => {
                return CertgenOutcome::Failed {
                    code: None,
                    detail: format!("failed to start {}: {err}", spec.program_name()),
                }
            }
        };

        let report = self.elevation.exit_report(&output);
        if report.is_success() {
            return CertgenOutcome::Generated;
        }
        CertgenOutcome::Failed {
            code: report.code(),
            detail: output.stderr.trim().to_string(),
        }
    }

    pub fn copy_command(&self, source: &Path, destination: &Path) -> CommandSpec {
        let spec = match self.platform {
            Platform::Windows => CommandSpec::new("cmd").args([
                "/c".into(),
                "copy".into(),
                "/Y".into(),
                source.as_os_str().to_os_string(),
                destination.as_os_str().to_os_string(),
            ]),
            _ => CommandSpec::new("cp").arg(source).arg(destination),
        };
        self.elevation.wrap(spec)
    }

    /// Downloads the override artifact into `staging_dir` and copies it into the install.
    /// Success means the file exists at its destination afterwards.
    pub fn deploy_override(
        &self,
        install: &InstallationRecord,
        fetcher: &dyn Fetcher,
        url: &str,
        staging_dir: &Path,
    ) -> Result<PathBuf> {
        fs::create_dir_all(staging_dir).with_context(|| {
            format!("failed to create staging dir: {}", staging_dir.display())
        })?;
        let staged = staging_dir.join(OVERRIDE_CERT_FILE);
        fetcher
            .fetch(url, &staged)
            .with_context(|| format!("failed to download override certificate from {url}"))?;

        let destination = install
            .override_cert_dir(self.platform)
            .join(OVERRIDE_CERT_FILE);
        let spec = self.copy_command(&staged, &destination);
        let output = self
            .runner
            .output(&spec)
            .with_context(|| format!("failed to start {}", spec.program_name()))?;
        let report = self.elevation.exit_report(&output);
        if !report.is_success() {
            debug!(?report, stderr = %output.stderr.trim(), "override copy reported failure");
        }

        if destination.is_file() {
            Ok(destination)
        } else {
            Err(anyhow!(
                "override certificate was not found after copy: {}",
                destination.display()
            ))
        }
    }
}
