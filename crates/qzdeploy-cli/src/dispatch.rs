use std::fs;

use anyhow::{Context, Result};
use clap::CommandFactory;
use qzdeploy_core::{detect_architecture, detect_platform, QZ_TRAY};
use qzdeploy_host::{
    detect_primary_ipv4, host_for, make_run_dir, DownloadTool, Elevation, HostDeps,
    KnownLocations, SystemProcessTable, SystemRunner, ToolFetcher,
};
use qzdeploy_release::{GithubReleases, ReleaseSelector};
use tracing::debug;

use crate::config::DeployConfig;
use crate::error::DeployError;
use crate::flows::{
    require_download_tool, run_deploy, run_detect, DeployServices, DeploySettings, RunContext,
};
use crate::render::TerminalRenderer;
use crate::Cli;

const STAGING_PREFIX: &str = "qzdeploy";

pub(crate) fn run_cli(cli: Cli) -> Result<()> {
    let word = cli.target.trim().to_ascii_lowercase();
    if word == "help" {
        Cli::command()
            .print_long_help()
            .context("failed to print help")?;
        return Ok(());
    }

    let platform = detect_platform();
    if !platform.is_supported() {
        return Err(DeployError::UnsupportedPlatform(std::env::consts::OS.to_string()).into());
    }

    let config = DeployConfig::load(cli.config.as_deref())?;
    let renderer = TerminalRenderer::current();
    let table = SystemProcessTable;
    let runner = SystemRunner;
    let deps = HostDeps::new(
        &QZ_TRAY,
        &table,
        &runner,
        config.timing(),
        KnownLocations::for_platform(platform, &QZ_TRAY),
    );
    let host = host_for(platform, deps)
        .ok_or_else(|| DeployError::UnsupportedPlatform(platform.as_str().to_string()))?;

    if word == "detect" {
        renderer.print_lines(&run_detect(host.as_ref(), renderer.style()));
        return Ok(());
    }

    let tool = require_download_tool(DownloadTool::detect(platform))?;
    renderer.print_status("ok", &format!("using {} for downloads", tool.name()));
    let selector = ReleaseSelector::parse(&cli.target)
        .map_err(|err| DeployError::Resolution(format!("{err:#}")))?;

    let fetcher = ToolFetcher::new(tool, &runner);
    let releases = GithubReleases::new(config.releases_url.clone(), config.request_timeout())?;
    let staging_dir = make_run_dir(STAGING_PREFIX)?;
    let services = DeployServices {
        releases: &releases,
        fetcher: &fetcher,
        host: host.as_ref(),
        runner: &runner,
        elevation: Elevation::detect(platform, &runner),
        primary_ipv4: &detect_primary_ipv4,
        staging_dir: staging_dir.clone(),
    };
    let settings = DeploySettings::resolve(&config, cli.max_wait);

    let mut ctx = RunContext::new(platform, detect_architecture());
    let result = run_deploy(&mut ctx, &selector, &services, &settings, renderer);

    if let Err(err) = fs::remove_dir_all(&staging_dir) {
        debug!(path = %staging_dir.display(), error = %err, "failed to remove staging dir");
    }
    result
}
