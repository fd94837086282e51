use std::cell::RefCell;
use std::fs;
use std::io;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{anyhow, Result};
use clap::{CommandFactory, Parser};
use qzdeploy_core::{Architecture, DetectionSource, InstallationRecord, Platform, QZ_TRAY};
use qzdeploy_host::{
    CommandOutput, CommandRunner, CommandSpec, DownloadTool, Elevation, Fetcher, HostDeps,
    HostPlatform, KnownLocations, LifecycleTiming, LinuxHost, ProcessInfo, ProcessTable,
    DEFAULT_OVERRIDE_CERT_URL,
};
use qzdeploy_release::{Release, ReleaseAsset, ReleaseSelector, ReleaseSource};

use super::*;
use crate::config::DeployConfig;
use crate::error::DeployError;
use crate::flows::{
    format_detect_lines, format_warning_summary, require_download_tool, run_deploy, run_detect,
    DeployServices, DeploySettings, RunContext,
};
use crate::render::{OutputStyle, TerminalRenderer};

const OVERRIDE_URL: &str = "https://example.test/override.crt";

fn test_root() -> PathBuf {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("qzdeploy-cli-test-{nanos}-{seq}"))
}

fn touch(path: &Path) {
    fs::create_dir_all(path.parent().expect("file must have a parent"))
        .expect("must create parent dir");
    fs::write(path, b"").expect("must write file");
}

fn command_line(spec: &CommandSpec) -> String {
    std::iter::once(spec.program_name())
        .chain(spec.args_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}

fn exit(code: i32) -> CommandOutput {
    CommandOutput {
        code: Some(code),
        ..CommandOutput::default()
    }
}

/// A Linux host whose installer drops files into `install_dir`.
struct FakeMachine {
    install_dir: PathBuf,
    processes: RefCell<Vec<ProcessInfo>>,
    events: RefCell<Vec<String>>,
    installer_code: i32,
    certgen_code: i32,
}

impl FakeMachine {
    fn new(install_dir: PathBuf) -> Self {
        Self {
            install_dir,
            processes: RefCell::new(Vec::new()),
            events: RefCell::new(Vec::new()),
            installer_code: 0,
            certgen_code: 0,
        }
    }

    fn with_running_instance(self) -> Self {
        self.processes.borrow_mut().push(qz_process(500));
        self
    }

    fn position(&self, prefix: &str) -> usize {
        self.events
            .borrow()
            .iter()
            .position(|event| event.starts_with(prefix))
            .unwrap_or_else(|| panic!("missing event '{prefix}' in {:?}", self.events.borrow()))
    }

    fn saw(&self, prefix: &str) -> bool {
        self.events
            .borrow()
            .iter()
            .any(|event| event.starts_with(prefix))
    }
}

fn qz_process(pid: u32) -> ProcessInfo {
    ProcessInfo {
        pid,
        name: "qz-tray".to_string(),
        exe: None,
        cmd: Vec::new(),
    }
}

impl ProcessTable for FakeMachine {
    fn snapshot(&self) -> Option<Vec<ProcessInfo>> {
        Some(self.processes.borrow().clone())
    }

    fn terminate(&self, pid: u32) -> bool {
        self.events.borrow_mut().push(format!("terminate {pid}"));
        self.processes.borrow_mut().retain(|process| process.pid != pid);
        true
    }

    fn kill(&self, pid: u32) -> bool {
        self.events.borrow_mut().push(format!("kill {pid}"));
        self.processes.borrow_mut().retain(|process| process.pid != pid);
        true
    }
}

impl CommandRunner for FakeMachine {
    fn output(&self, spec: &CommandSpec) -> io::Result<CommandOutput> {
        let line = command_line(spec);
        self.events.borrow_mut().push(format!("run {line}"));
        match spec.program_name().as_str() {
            "bash" => {
                if self.installer_code == 0 {
                    touch(&self.install_dir.join("qz-tray"));
                    touch(&self.install_dir.join("qz-tray-console"));
                }
                Ok(exit(self.installer_code))
            }
            "qz-tray-console" => Ok(exit(self.certgen_code)),
            "cp" => {
                let [source, destination] = spec.args.as_slice() else {
                    return Ok(exit(1));
                };
                fs::copy(source, destination)?;
                Ok(exit(0))
            }
            _ => Err(io::Error::new(io::ErrorKind::NotFound, line)),
        }
    }

    fn spawn(&self, spec: &CommandSpec) -> io::Result<()> {
        self.events
            .borrow_mut()
            .push(format!("spawn {}", spec.program.to_string_lossy()));
        self.processes.borrow_mut().push(qz_process(501));
        Ok(())
    }
}

impl Fetcher for FakeMachine {
    fn fetch(&self, url: &str, destination: &Path) -> Result<()> {
        self.events.borrow_mut().push(format!("fetch {url}"));
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(destination, url.as_bytes())?;
        Ok(())
    }
}

struct FixtureReleases(Vec<Release>);

impl ReleaseSource for FixtureReleases {
    fn list_releases(&self) -> Result<Vec<Release>> {
        Ok(self.0.clone())
    }

    fn release_by_tag(&self, tag: &str) -> Result<Option<Release>> {
        Ok(self.0.iter().find(|release| release.tag == tag).cloned())
    }
}

struct OfflineReleases;

impl ReleaseSource for OfflineReleases {
    fn list_releases(&self) -> Result<Vec<Release>> {
        Err(anyhow!("network unreachable"))
    }

    fn release_by_tag(&self, _tag: &str) -> Result<Option<Release>> {
        Err(anyhow!("network unreachable"))
    }
}

fn release(tag: &str, prerelease: bool, assets: &[&str]) -> Release {
    Release {
        tag: tag.to_string(),
        prerelease,
        assets: assets
            .iter()
            .map(|name| ReleaseAsset {
                name: name.to_string(),
                url: format!("https://example.test/download/{tag}/{name}"),
            })
            .collect(),
    }
}

fn upstream() -> FixtureReleases {
    FixtureReleases(vec![
        release("v2.2.5-beta.1", true, &["qz-tray-2.2.5-beta.1-x86_64.run"]),
        release(
            "v2.2.4",
            false,
            &[
                "qz-tray-2.2.4-x86_64.pkg",
                "qz-tray-2.2.4-arm64.run",
                "qz-tray-2.2.4-x86_64.run",
                "qz-tray-2.2.4-x86_64.exe",
            ],
        ),
        release("v2.1.0", false, &["qz-tray-2.1.0-x86_64.run"]),
    ])
}

fn linux_host(machine: &FakeMachine) -> LinuxHost<'_> {
    let mut deps = HostDeps::new(
        &QZ_TRAY,
        machine,
        machine,
        LifecycleTiming::immediate(),
        KnownLocations::new(vec![machine.install_dir.clone()], Vec::new()),
    );
    deps.self_pid = 1;
    LinuxHost::new(deps)
}

fn plain() -> TerminalRenderer {
    TerminalRenderer::from_style(OutputStyle::Plain)
}

fn settings() -> DeploySettings {
    DeploySettings {
        max_wait_secs: 3,
        override_cert_url: Some(OVERRIDE_URL.to_string()),
    }
}

fn deploy(
    machine: &FakeMachine,
    releases: &dyn ReleaseSource,
    selector: &str,
    primary_ipv4: Option<Ipv4Addr>,
    staging_dir: PathBuf,
) -> (RunContext, Result<()>) {
    deploy_with(machine, releases, selector, primary_ipv4, staging_dir, &settings())
}

fn deploy_with(
    machine: &FakeMachine,
    releases: &dyn ReleaseSource,
    selector: &str,
    primary_ipv4: Option<Ipv4Addr>,
    staging_dir: PathBuf,
    settings: &DeploySettings,
) -> (RunContext, Result<()>) {
    let host = linux_host(machine);
    let probe = move || primary_ipv4;
    let services = DeployServices {
        releases,
        fetcher: machine,
        host: &host,
        runner: machine,
        elevation: Elevation::AlreadyElevated,
        primary_ipv4: &probe,
        staging_dir,
    };
    let selector = ReleaseSelector::parse(selector).expect("selector must parse");
    let mut ctx = RunContext::new(Platform::Linux, Architecture::Amd64);
    let result = run_deploy(&mut ctx, &selector, &services, settings, plain());
    (ctx, result)
}

#[test]
fn stable_linux_amd64_deploy_runs_end_to_end() {
    let root = test_root();
    let install_dir = root.join("opt").join("qz-tray");
    let machine = FakeMachine::new(install_dir.clone()).with_running_instance();

    let (ctx, result) = deploy(
        &machine,
        &upstream(),
        "stable",
        Some(Ipv4Addr::new(10, 1, 2, 3)),
        root.join("staging"),
    );
    result.expect("deploy must succeed");

    assert!(ctx.warnings.is_empty(), "unexpected warnings: {:?}", ctx.warnings);
    let install = ctx.install.as_ref().expect("install must be located");
    assert_eq!(install.install_dir, install_dir);
    assert_eq!(install.source, DetectionSource::KnownLocation);
    assert!(install_dir.join("override.crt").is_file());

    let order = [
        "fetch https://example.test/download/v2.2.4/qz-tray-2.2.4-x86_64.run",
        "terminate 500",
        "run bash ",
        "run qz-tray-console certgen --host localhost;10.1.2.3",
        format!("fetch {OVERRIDE_URL}").as_str(),
        "run cp ",
        "spawn ",
    ]
    .map(|prefix| machine.position(prefix));
    assert!(
        order.windows(2).all(|pair| pair[0] < pair[1]),
        "stages out of order: {:?}",
        machine.events.borrow()
    );

    assert!(linux_host(&machine).is_running());

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn explicit_version_deploys_that_release() {
    let root = test_root();
    let machine = FakeMachine::new(root.join("qz-tray"));

    let (_, result) = deploy(
        &machine,
        &upstream(),
        "2.1.0",
        Some(Ipv4Addr::new(10, 1, 2, 3)),
        root.join("staging"),
    );
    result.expect("deploy must succeed");
    assert!(machine.saw("fetch https://example.test/download/v2.1.0/qz-tray-2.1.0-x86_64.run"));
    assert!(!machine.saw("terminate"), "nothing was running");

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn resolution_failure_aborts_before_stopping() {
    let root = test_root();
    let machine = FakeMachine::new(root.join("qz-tray")).with_running_instance();

    let (_, result) = deploy(&machine, &OfflineReleases, "stable", None, root.join("staging"));
    let err = result.expect_err("offline metadata must fail");

    assert!(matches!(
        err.downcast_ref::<DeployError>(),
        Some(DeployError::Resolution(_))
    ));
    assert_eq!(exit_code_for(&err), 2);
    assert!(!machine.saw("terminate"));
    assert!(!machine.saw("fetch"));
}

#[test]
fn missing_version_is_a_resolution_error() {
    let root = test_root();
    let machine = FakeMachine::new(root.join("qz-tray"));

    let (_, result) = deploy(&machine, &upstream(), "9.9.9", None, root.join("staging"));
    let err = result.expect_err("unknown version must fail");
    assert!(format!("{err:#}").contains("release v9.9.9 was not found upstream"));
    assert_eq!(exit_code_for(&err), 2);
}

#[test]
fn installer_failure_is_fatal_and_skips_configuration() {
    let root = test_root();
    let mut machine = FakeMachine::new(root.join("qz-tray"));
    machine.installer_code = 1;

    let (_, result) = deploy(
        &machine,
        &upstream(),
        "stable",
        Some(Ipv4Addr::new(10, 1, 2, 3)),
        root.join("staging"),
    );
    let err = result.expect_err("installer failure must abort");

    assert!(matches!(
        err.downcast_ref::<DeployError>(),
        Some(DeployError::Install(_))
    ));
    assert!(!machine.saw("run qz-tray-console"));
    assert!(!machine.saw("spawn"));

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn degraded_certificate_steps_become_warnings() {
    let root = test_root();
    let mut machine = FakeMachine::new(root.join("qz-tray"));
    machine.certgen_code = 3;

    let (ctx, result) = deploy(&machine, &upstream(), "stable", None, root.join("staging"));
    result.expect("degraded steps must not abort");

    assert!(machine.saw("run qz-tray-console certgen --host localhost"));
    assert!(!machine.saw("run qz-tray-console certgen --host localhost;"));
    assert_eq!(ctx.warnings.len(), 2, "warnings: {:?}", ctx.warnings);
    assert!(ctx.warnings[0].contains("primary IPv4 address not detected"));
    assert!(ctx.warnings[1].contains("certificate generation exited with status 3"));
    assert!(
        machine.saw(&format!("fetch {OVERRIDE_URL}")),
        "override deployment is independent of certgen"
    );

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn default_config_deploys_builtin_override_certificate() {
    let root = test_root();
    let install_dir = root.join("qz-tray");
    let machine = FakeMachine::new(install_dir.clone());
    let settings = DeploySettings::resolve(&DeployConfig::default(), None);

    let (ctx, result) = deploy_with(
        &machine,
        &upstream(),
        "stable",
        Some(Ipv4Addr::new(10, 1, 2, 3)),
        root.join("staging"),
        &settings,
    );
    result.expect("deploy must succeed");

    assert!(ctx.warnings.is_empty(), "unexpected warnings: {:?}", ctx.warnings);
    assert!(machine.saw(&format!("fetch {DEFAULT_OVERRIDE_CERT_URL}")));
    assert!(install_dir.join("override.crt").is_file());

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn empty_override_url_is_reported_as_warning() {
    let root = test_root();
    let install_dir = root.join("qz-tray");
    let machine = FakeMachine::new(install_dir.clone());
    let config = DeployConfig {
        override_cert_url: "  ".to_string(),
        ..DeployConfig::default()
    };
    let settings = DeploySettings::resolve(&config, None);
    assert_eq!(settings.override_cert_url, None);

    let (ctx, result) = deploy_with(
        &machine,
        &upstream(),
        "stable",
        Some(Ipv4Addr::new(10, 1, 2, 3)),
        root.join("staging"),
        &settings,
    );
    result.expect("a skipped override must not abort");

    assert_eq!(ctx.warnings.len(), 1, "warnings: {:?}", ctx.warnings);
    assert!(ctx.warnings[0].contains("copy override.crt into"));
    assert!(!machine.saw("run cp "));
    assert!(!install_dir.join("override.crt").exists());
    assert!(format_warning_summary(OutputStyle::Plain, &ctx.warnings)[0]
        .contains("completed with 1 warning(s)"));

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn max_wait_flag_beats_configured_stop_timeout() {
    let config = DeployConfig {
        stop_timeout_secs: 20,
        ..DeployConfig::default()
    };
    assert_eq!(DeploySettings::resolve(&config, Some(30)).max_wait_secs, 30);
    assert_eq!(DeploySettings::resolve(&config, None).max_wait_secs, 20);
    assert_eq!(
        DeploySettings::resolve(&config, None).override_cert_url.as_deref(),
        Some(DEFAULT_OVERRIDE_CERT_URL)
    );
}

#[test]
fn missing_download_tool_is_a_precondition_failure() {
    let err = require_download_tool(None).expect_err("no tool must fail");
    assert!(matches!(err, DeployError::NoDownloadTool));
    assert_eq!(err.exit_code(), 2);

    let tool = require_download_tool(Some(DownloadTool::Curl(PathBuf::from("curl"))))
        .expect("tool must pass through");
    assert_eq!(tool.name(), "curl");
}

#[test]
fn exit_codes_follow_error_kind() {
    assert_eq!(
        exit_code_for(&DeployError::UnsupportedPlatform("plan9".to_string()).into()),
        1
    );
    assert_eq!(exit_code_for(&DeployError::NoDownloadTool.into()), 2);
    let wrapped = anyhow::Error::from(DeployError::UnsupportedPlatform("plan9".to_string()))
        .context("while starting");
    assert_eq!(exit_code_for(&wrapped), 1);
    assert_eq!(exit_code_for(&anyhow!("boom")), 2);
}

#[test]
fn detect_reports_install_and_running_state() {
    let root = test_root();
    let install_dir = root.join("qz-tray");
    touch(&install_dir.join("qz-tray"));
    let machine = FakeMachine::new(install_dir.clone()).with_running_instance();

    let lines = run_detect(&linux_host(&machine), OutputStyle::Rich);
    assert_eq!(
        lines[0],
        format!(
            "[OK] QZ Tray found at {} (via known-location)",
            install_dir.display()
        )
    );
    assert_eq!(lines[1], format!("console: {}", install_dir.join("qz-tray").display()));
    assert_eq!(lines[2], "running: yes");

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn detect_without_install_suggests_installer() {
    let lines = format_detect_lines(OutputStyle::Plain, None, false);
    assert_eq!(
        lines,
        vec![
            "QZ Tray installation not found; run 'qzdeploy stable' to install it".to_string(),
            "running: no".to_string(),
        ]
    );

    let record = InstallationRecord {
        install_dir: PathBuf::from("/opt/qz-tray"),
        console: None,
        source: DetectionSource::CommandLookup,
    };
    let lines = format_detect_lines(OutputStyle::Plain, Some(&record), true);
    assert_eq!(
        lines,
        vec![
            "QZ Tray found at /opt/qz-tray (via command-lookup)".to_string(),
            "running: yes".to_string(),
        ]
    );
}

#[test]
fn warning_summary_lists_every_warning() {
    assert_eq!(
        format_warning_summary(OutputStyle::Rich, &[]),
        vec!["[OK] QZ Tray deployment complete".to_string()]
    );

    let lines = format_warning_summary(
        OutputStyle::Rich,
        &["first".to_string(), "second".to_string()],
    );
    assert_eq!(lines[0], "[WARN] QZ Tray deployment completed with 2 warning(s):");
    assert_eq!(lines[1], "  - first");
    assert_eq!(lines[2], "  - second");
    assert!(lines[3].contains("re-run qzdeploy with -v"));
}

#[test]
fn render_status_line_plain_is_unadorned() {
    assert_eq!(
        render_status_line(OutputStyle::Plain, "ok", "installed QZ Tray v2.2.4"),
        "installed QZ Tray v2.2.4"
    );
}

#[test]
fn render_status_line_rich_includes_ascii_badge() {
    assert_eq!(
        render_status_line(OutputStyle::Rich, "ok", "installed QZ Tray v2.2.4"),
        "[OK] installed QZ Tray v2.2.4"
    );
    assert_eq!(
        render_status_line(OutputStyle::Rich, "warn", "certificate not generated"),
        "[WARN] certificate not generated"
    );
    assert_eq!(
        render_status_line(OutputStyle::Rich, "err", "no download tool"),
        "[ERR] no download tool"
    );
    assert_eq!(
        render_status_line(OutputStyle::Rich, "step", "stopping QZ Tray"),
        "[..] stopping QZ Tray"
    );
}

#[test]
fn cli_defaults_to_stable() {
    let cli = Cli::try_parse_from(["qzdeploy"]).expect("command must parse");
    assert_eq!(cli.target, "stable");
    assert_eq!(cli.max_wait, None);
    assert!(!cli.verbose);
}

#[test]
fn cli_accepts_target_and_flags() {
    let cli = Cli::try_parse_from([
        "qzdeploy",
        "beta",
        "--max-wait",
        "30",
        "--config",
        "/etc/qzdeploy.toml",
        "-v",
    ])
    .expect("command must parse");
    assert_eq!(cli.target, "beta");
    assert_eq!(cli.max_wait, Some(30));
    assert_eq!(cli.config, Some(PathBuf::from("/etc/qzdeploy.toml")));
    assert!(cli.verbose);

    let cli = Cli::try_parse_from(["qzdeploy", "detect"]).expect("detect must parse");
    assert_eq!(cli.target, "detect");
}

#[test]
fn cli_rejects_non_numeric_wait() {
    let err = Cli::try_parse_from(["qzdeploy", "--max-wait", "soon"])
        .expect_err("non-numeric wait must fail");
    assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
}

#[test]
fn config_defaults_match_documented_values() {
    let config = DeployConfig::from_toml_str("").expect("empty config must parse");
    assert_eq!(config, DeployConfig::default());
    assert_eq!(config.releases_url, qzdeploy_release::DEFAULT_RELEASES_URL);
    assert_eq!(config.override_cert_url, DEFAULT_OVERRIDE_CERT_URL);
    assert_eq!(config.stop_timeout_secs, 10);
    assert_eq!(config.timing(), LifecycleTiming::default());
    assert_eq!(config.request_timeout(), std::time::Duration::from_secs(30));
}

#[test]
fn config_overrides_and_rejects_unknown_keys() {
    let config = DeployConfig::from_toml_str(
        r#"
override_cert_url = "https://certs.example.test/override.crt"
stop_timeout_secs = 20
poll_interval_ms = 250
"#,
    )
    .expect("config must parse");
    assert_eq!(
        config.override_cert_url,
        "https://certs.example.test/override.crt"
    );
    assert_eq!(config.stop_timeout_secs, 20);
    assert_eq!(
        config.timing().poll_interval,
        std::time::Duration::from_millis(250)
    );

    let err = DeployConfig::from_toml_str("stop_timeout = 5").expect_err("unknown key must fail");
    assert!(format!("{err:#}").contains("failed to parse qzdeploy config"));
}

#[test]
fn config_load_reads_explicit_path() {
    let root = test_root();
    let path = root.join("config.toml");
    fs::create_dir_all(&root).expect("must create root");
    fs::write(&path, "start_grace_secs = 7\n").expect("must write config");

    let config = DeployConfig::load(Some(&path)).expect("config must load");
    assert_eq!(config.start_grace_secs, 7);

    let err = DeployConfig::load(Some(&root.join("missing.toml")))
        .expect_err("missing explicit config must fail");
    assert!(err.to_string().contains("failed to read config"));

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn config_path_can_come_from_environment() {
    let command = Cli::command();
    let config_arg = command
        .get_arguments()
        .find(|arg| arg.get_id() == "config")
        .expect("config argument must exist");
    assert_eq!(
        config_arg.get_env(),
        Some(std::ffi::OsStr::new("QZDEPLOY_CONFIG"))
    );

    let root = test_root();
    let path = root.join("env.toml");
    fs::create_dir_all(&root).expect("must create root");
    fs::write(&path, "stop_timeout_secs = 4
").expect("must write config");

    let cli = Cli::try_parse_from(["qzdeploy", "--config", path.to_str().expect("utf-8 path")])
        .expect("command must parse");
    let config = DeployConfig::load(cli.config.as_deref()).expect("config must load");
    assert_eq!(DeploySettings::resolve(&config, cli.max_wait).max_wait_secs, 4);

    let _ = fs::remove_dir_all(&root);
}
