use thiserror::Error;

/// Failures that abort a run. Anything else that reaches the top level exits with 2.
#[derive(Debug, Error)]
pub(crate) enum DeployError {
    #[error("unsupported platform '{0}'; expected windows, macos or linux")]
    UnsupportedPlatform(String),
    #[error("no download tool found on PATH; install curl or wget (PowerShell on Windows) and retry")]
    NoDownloadTool,
    #[error("release resolution failed: {0}")]
    Resolution(String),
    #[error("installation failed: {0}")]
    Install(String),
}

impl DeployError {
    pub(crate) fn exit_code(&self) -> u8 {
        match self {
            Self::UnsupportedPlatform(_) => 1,
            Self::NoDownloadTool | Self::Resolution(_) | Self::Install(_) => 2,
        }
    }
}

pub(crate) fn exit_code_for(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<DeployError>()
        .map(DeployError::exit_code)
        .unwrap_or(2)
}
