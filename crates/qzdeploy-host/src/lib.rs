mod certs;
mod command;
mod download;
mod elevate;
mod fs_utils;
mod hosts;
mod lifecycle;
mod locate;
mod native;
mod process;

pub use certs::{
    compose_host_list, detect_primary_ipv4, usable_ipv4, CertgenOutcome, CertificateDeployer,
    DEFAULT_OVERRIDE_CERT_URL, OVERRIDE_CERT_FILE,
};
pub use command::{find_on_path, CommandOutput, CommandRunner, CommandSpec, SystemRunner};
pub use download::{DownloadTool, Fetcher, ToolFetcher};
pub use elevate::{Elevation, ExitReport};
pub use fs_utils::{make_run_dir, remove_file_if_exists};
pub use hosts::{host_for, HostDeps, LinuxHost, MacosHost, WindowsHost};
pub use lifecycle::{HostPlatform, LifecycleTiming, StartOutcome, StopOutcome};
pub use locate::{resolve_first, KnownLocations, Locator};
pub use native::{install_package, installer_command};
pub use process::{ProcessInfo, ProcessMonitor, ProcessTable, SystemProcessTable};
