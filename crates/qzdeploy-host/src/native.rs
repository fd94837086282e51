use std::path::Path;

use anyhow::{bail, Context, Result};
use qzdeploy_core::Platform;
use tracing::debug;

use crate::command::{CommandRunner, CommandSpec};
use crate::elevate::{Elevation, ExitReport};

/// Unelevated command that installs `package` silently, if the platform has one.
pub fn installer_command(platform: Platform, package: &Path) -> Option<CommandSpec> {
    match platform {
        Platform::Windows => Some(CommandSpec::new(package).arg("/S")),
        Platform::MacOs => Some(
            CommandSpec::new("installer")
                .arg("-pkg")
                .arg(package)
                .args(["-target", "/"]),
        ),
        Platform::Linux => Some(CommandSpec::new("bash").arg(package).args(["--", "-y"])),
        Platform::Unknown => None,
    }
}

pub fn install_package(
    platform: Platform,
    elevation: Elevation,
    runner: &dyn CommandRunner,
    package: &Path,
) -> Result<()> {
    let Some(command) = installer_command(platform, package) else {
        bail!("no native installer for platform '{}'", platform.as_str());
    };
    let spec = elevation.wrap(command);
    debug!(command = %spec.rendered(), "running native installer");
    let output = runner
        .output(&spec)
        .with_context(|| format!("failed to start installer for {}", package.display()))?;

    match elevation.exit_report(&output) {
        report if report.is_success() => Ok(()),
        ExitReport::Code(code) => bail!(
            "installer for {} exited with status {code}: {}",
            package.display(),
            output.stderr.trim()
        ),
        _ => bail!(
            "installer for {} did not report an exit status",
            package.display()
        ),
    }
}
