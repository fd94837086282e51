use std::net::Ipv4Addr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use qzdeploy_core::{Architecture, InstallationRecord, Platform};
use qzdeploy_host::{
    compose_host_list, install_package, CertgenOutcome, CertificateDeployer, CommandRunner,
    DownloadTool, Elevation, Fetcher, HostPlatform, StartOutcome, StopOutcome,
    OVERRIDE_CERT_FILE,
};
use qzdeploy_release::{resolve_target, ReleaseSelector, ReleaseSource};
use tracing::debug;

use crate::config::DeployConfig;
use crate::error::DeployError;
use crate::render::{render_status_line, OutputStyle, TerminalRenderer};

/// State threaded through every stage of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RunContext {
    pub platform: Platform,
    pub architecture: Architecture,
    pub install: Option<InstallationRecord>,
    pub warnings: Vec<String>,
}

impl RunContext {
    pub(crate) fn new(platform: Platform, architecture: Architecture) -> Self {
        Self {
            platform,
            architecture,
            install: None,
            warnings: Vec::new(),
        }
    }

    fn warn(&mut self, renderer: TerminalRenderer, message: impl Into<String>) {
        let message = message.into();
        renderer.print_status("warn", &message);
        self.warnings.push(message);
    }
}

/// Collaborators of a deploy run.
pub(crate) struct DeployServices<'a> {
    pub releases: &'a dyn ReleaseSource,
    pub fetcher: &'a dyn Fetcher,
    pub host: &'a dyn HostPlatform,
    pub runner: &'a dyn CommandRunner,
    pub elevation: Elevation,
    pub primary_ipv4: &'a dyn Fn() -> Option<Ipv4Addr>,
    pub staging_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DeploySettings {
    pub max_wait_secs: u64,
    pub override_cert_url: Option<String>,
}

impl DeploySettings {
    /// `--max-wait` wins over the configured stop timeout.
    pub(crate) fn resolve(config: &DeployConfig, max_wait: Option<u64>) -> Self {
        let url = config.override_cert_url.trim();
        Self {
            max_wait_secs: max_wait.unwrap_or(config.stop_timeout_secs),
            override_cert_url: (!url.is_empty()).then(|| url.to_string()),
        }
    }
}

pub(crate) fn require_download_tool(
    tool: Option<DownloadTool>,
) -> Result<DownloadTool, DeployError> {
    tool.ok_or(DeployError::NoDownloadTool)
}

/// Resolve, download, stop, install, configure certificates, start.
///
/// Only resolution, download and install failures abort the run. Everything after the
/// install degrades to a warning on `ctx`.
pub(crate) fn run_deploy(
    ctx: &mut RunContext,
    selector: &ReleaseSelector,
    services: &DeployServices<'_>,
    settings: &DeploySettings,
    renderer: TerminalRenderer,
) -> Result<()> {
    renderer.print_section("Release");
    renderer.print_status(
        "step",
        &format!(
            "resolving {selector} release for {}/{}",
            ctx.platform.as_str(),
            ctx.architecture.as_str()
        ),
    );
    let target = resolve_target(services.releases, selector, ctx.platform, ctx.architecture)
        .map_err(|err| DeployError::Resolution(format!("{err:#}")))?;
    renderer.print_status(
        "ok",
        &format!("selected {} from {}", target.asset.name, target.tag),
    );

    let package = services.staging_dir.join(&target.asset.name);
    services
        .fetcher
        .fetch(&target.asset.url, &package)
        .with_context(|| format!("failed to download {}", target.asset.url))?;
    renderer.print_status("ok", &format!("downloaded {}", package.display()));

    renderer.print_section("Install");
    stop_running(ctx, services.host, settings.max_wait_secs, renderer);

    renderer.print_status("step", &format!("installing {}", target.asset.name));
    install_package(ctx.platform, services.elevation, services.runner, &package)
        .map_err(|err| DeployError::Install(format!("{err:#}")))?;
    renderer.print_status("ok", &format!("installed QZ Tray {}", target.tag));

    ctx.install = services.host.resolve_install_path();
    renderer.print_section("Certificates");
    if let Some(install) = ctx.install.clone() {
        renderer.print_status(
            "ok",
            &format!(
                "install located at {} (via {})",
                install.install_dir.display(),
                install.source
            ),
        );
        configure_certificates(
            ctx,
            &install,
            services,
            settings.override_cert_url.as_deref(),
            renderer,
        );
    } else {
        ctx.warn(
            renderer,
            "installed QZ Tray could not be located; certificate setup skipped",
        );
    }

    renderer.print_section("Start");
    start_application(ctx, services.host, renderer);

    renderer.print_lines(&format_warning_summary(renderer.style(), &ctx.warnings));
    Ok(())
}

fn stop_running(
    ctx: &mut RunContext,
    host: &dyn HostPlatform,
    max_wait_secs: u64,
    renderer: TerminalRenderer,
) {
    renderer.print_status("step", "stopping QZ Tray");
    let progress = renderer.start_wait("waiting for QZ Tray to quit", max_wait_secs);
    let outcome = host.stop(max_wait_secs, &mut |waited, total| progress.set(waited, total));
    progress.finish();

    match outcome {
        StopOutcome::NotRunning => renderer.print_status("ok", "QZ Tray was not running"),
        StopOutcome::Stopped { waited_secs } => {
            renderer.print_status("ok", &format!("QZ Tray stopped after {waited_secs}s"))
        }
        StopOutcome::Killed => renderer.print_status(
            "warn",
            &format!("QZ Tray did not quit within {max_wait_secs}s and was killed"),
        ),
        StopOutcome::StillRunning => ctx.warn(
            renderer,
            "QZ Tray is still running; the installer may fail to replace files in use",
        ),
    }
}

fn configure_certificates(
    ctx: &mut RunContext,
    install: &InstallationRecord,
    services: &DeployServices<'_>,
    override_cert_url: Option<&str>,
    renderer: TerminalRenderer,
) {
    let deployer = CertificateDeployer::new(ctx.platform, services.runner, services.elevation);

    let primary = (services.primary_ipv4)();
    if primary.is_none() {
        ctx.warn(
            renderer,
            "primary IPv4 address not detected; certificate covers localhost only",
        );
    }
    let hosts = compose_host_list(primary);

    renderer.print_status("step", &format!("generating certificate for {hosts}"));
    match deployer.generate(install, &hosts) {
        CertgenOutcome::Generated => renderer.print_status("ok", "certificate generated"),
        CertgenOutcome::Failed { code, detail } => {
            let status = code
                .map(|code| code.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            let console = install
                .console
                .as_deref()
                .map(|path| path.display().to_string())
                .unwrap_or_default();
            let mut message = format!(
                "certificate generation exited with status {status}; re-run '{console} certgen --host {hosts}' as administrator"
            );
            if !detail.is_empty() {
                message.push_str(&format!(" ({detail})"));
            }
            ctx.warn(renderer, message);
        }
        CertgenOutcome::NoConsole => ctx.warn(
            renderer,
            format!(
                "no console executable in {}; certificate not generated",
                install.install_dir.display()
            ),
        ),
    }

    let Some(url) = override_cert_url else {
        debug!("override_cert_url is empty");
        ctx.warn(
            renderer,
            format!(
                "override_cert_url is empty; copy {OVERRIDE_CERT_FILE} into {} manually",
                install.override_cert_dir(ctx.platform).display()
            ),
        );
        return;
    };
    match deployer.deploy_override(install, services.fetcher, url, &services.staging_dir) {
        Ok(path) => renderer.print_status(
            "ok",
            &format!("override certificate deployed to {}", path.display()),
        ),
        Err(err) => ctx.warn(
            renderer,
            format!(
                "override certificate not deployed: {err:#}; copy it into {} manually",
                install.override_cert_dir(ctx.platform).display()
            ),
        ),
    }
}

fn start_application(ctx: &mut RunContext, host: &dyn HostPlatform, renderer: TerminalRenderer) {
    renderer.print_status("step", "starting QZ Tray");
    match host.start(ctx.install.as_ref()) {
        StartOutcome::Running => renderer.print_status("ok", "QZ Tray is running"),
        StartOutcome::Unconfirmed => ctx.warn(
            renderer,
            "QZ Tray was launched but is not reported running; start it manually",
        ),
        StartOutcome::NotLaunched => {
            ctx.warn(renderer, "QZ Tray could not be launched; start it manually")
        }
    }
}

pub(crate) fn format_warning_summary(style: OutputStyle, warnings: &[String]) -> Vec<String> {
    if warnings.is_empty() {
        return vec![render_status_line(style, "ok", "QZ Tray deployment complete")];
    }

    let mut lines = vec![render_status_line(
        style,
        "warn",
        &format!(
            "QZ Tray deployment completed with {} warning(s):",
            warnings.len()
        ),
    )];
    lines.extend(warnings.iter().map(|warning| format!("  - {warning}")));
    lines.push(
        "Resolve the items above manually, or re-run qzdeploy with -v for diagnostics."
            .to_string(),
    );
    lines
}

/// Locates an existing install without changing anything.
pub(crate) fn run_detect(host: &dyn HostPlatform, style: OutputStyle) -> Vec<String> {
    let record = host.resolve_install_path();
    let running = host.is_running();
    format_detect_lines(style, record.as_ref(), running)
}

pub(crate) fn format_detect_lines(
    style: OutputStyle,
    record: Option<&InstallationRecord>,
    running: bool,
) -> Vec<String> {
    let mut lines = Vec::new();
    match record {
        Some(record) => {
            lines.push(render_status_line(
                style,
                "ok",
                &format!(
                    "QZ Tray found at {} (via {})",
                    record.install_dir.display(),
                    record.source
                ),
            ));
            if let Some(console) = &record.console {
                lines.push(format!("console: {}", console.display()));
            }
        }
        None => lines.push(render_status_line(
            style,
            "warn",
            "QZ Tray installation not found; run 'qzdeploy stable' to install it",
        )),
    }
    lines.push(format!("running: {}", if running { "yes" } else { "no" }));
    lines
}
