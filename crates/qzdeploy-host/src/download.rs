use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use qzdeploy_core::Platform;
use tracing::debug;

use crate::command::{escape_ps_single_quote, find_on_path, CommandRunner, CommandSpec};
use crate::fs_utils::remove_file_if_exists;

/// Retrieves a URL into a local file.
pub trait Fetcher {
    fn fetch(&self, url: &str, destination: &Path) -> Result<()>;
}

/// External program used for every download in a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadTool {
    Curl(PathBuf),
    Wget(PathBuf),
    PowerShell(PathBuf),
}

impl DownloadTool {
    pub fn detect(platform: Platform) -> Option<Self> {
        Self::from_available(platform, |name| find_on_path(name))
    }

    /// Picks curl, then wget (PowerShell on Windows), from whatever `lookup` finds.
    pub fn from_available<F>(platform: Platform, lookup: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<PathBuf>,
    {
        if let Some(path) = lookup("curl") {
            return Some(Self::Curl(path));
        }
        if platform == Platform::Windows {
            return lookup("powershell").map(Self::PowerShell);
        }
        lookup("wget").map(Self::Wget)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Curl(_) => "curl",
            Self::Wget(_) => "wget",
            Self::PowerShell(_) => "powershell",
        }
    }

    pub fn download_command(&self, url: &str, out_path: &Path) -> CommandSpec {
        match self {
            Self::Curl(program) => CommandSpec::new(program)
                .args(["-fL", "--retry", "2", "-o"])
                .arg(out_path)
                .arg(url),
            Self::Wget(program) => CommandSpec::new(program).arg("-O").arg(out_path).arg(url),
            Self::PowerShell(program) => CommandSpec::new(program).args([
                "-NoProfile".to_string(),
                "-Command".to_string(),
                format!(
                    "Invoke-WebRequest -Uri '{}' -OutFile '{}'",
                    escape_ps_single_quote(url),
                    escape_ps_single_quote(&out_path.to_string_lossy())
                ),
            ]),
        }
    }
}

pub struct ToolFetcher<'a> {
    tool: DownloadTool,
    runner: &'a dyn CommandRunner,
}

impl<'a> ToolFetcher<'a> {
    pub fn new(tool: DownloadTool, runner: &'a dyn CommandRunner) -> Self {
        Self { tool, runner }
    }

    pub fn tool(&self) -> &DownloadTool {
        &self.tool
    }
}

impl Fetcher for ToolFetcher<'_> {
    fn fetch(&self, url: &str, destination: &Path) -> Result<()> {
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create download dir: {}", parent.display()))?;
        }

        let part_path = destination.with_file_name(format!(
            "{}.part",
            destination
                .file_name()
                .and_then(|v| v.to_str())
                .unwrap_or("download")
        ));

        debug!(tool = self.tool.name(), url, "downloading");
        let spec = self.tool.download_command(url, &part_path);
        let context_message = format!("{} download failed", self.tool.name());
        if let Err(err) = self.runner.run_checked(&spec, &context_message) {
            let _ = fs::remove_file(&part_path);
            return Err(err);
        }

        remove_file_if_exists(destination)
            .with_context(|| format!("failed to replace file: {}", destination.display()))?;
        fs::rename(&part_path, destination).with_context(|| {
            format!(
                "failed to move download into place: {}",
                destination.display()
            )
        })?;
        Ok(())
    }
}
