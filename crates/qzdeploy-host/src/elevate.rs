use std::ffi::OsString;

use qzdeploy_core::Platform;
use tracing::debug;

use crate::command::{
    escape_ps_single_quote, find_on_path, CommandOutput, CommandRunner, CommandSpec,
};

/// How privileged commands are run on this host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Elevation {
    AlreadyElevated,
    Sudo,
    Su,
    WindowsRunAs,
}

/// Exit status of an elevated command as far as the elevation wrapper can tell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReport {
    Code(i32),
    /// The wrapper completed but the elevated child reported no exit code.
    CompletedWithoutCode,
    Unknown,
}

impl ExitReport {
    pub fn is_success(self) -> bool {
        matches!(self, Self::Code(0) | Self::CompletedWithoutCode)
    }

    pub fn code(self) -> Option<i32> {
        match self {
            Self::Code(code) => Some(code),
            Self::CompletedWithoutCode | Self::Unknown => None,
        }
    }
}

impl Elevation {
    pub fn detect(platform: Platform, runner: &dyn CommandRunner) -> Self {
        if platform == Platform::Windows {
            return Self::WindowsRunAs;
        }

        let uid = runner
            .output(&CommandSpec::new("id").arg("-u"))
            .ok()
            .filter(CommandOutput::success)
            .map(|output| output.stdout.trim().to_string());
        if uid.as_deref() == Some("0") {
            return Self::AlreadyElevated;
        }
        if find_on_path("sudo").is_some() {
            return Self::Sudo;
        }
        debug!("sudo not found; falling back to su");
        Self::Su
    }

    pub fn wrap(self, spec: CommandSpec) -> CommandSpec {
        match self {
            Self::AlreadyElevated => spec,
            Self::Sudo => {
                let mut wrapped = CommandSpec::new("sudo").arg(spec.program).args(spec.args);
                wrapped.cwd = spec.cwd;
                wrapped
            }
            Self::Su => {
                let mut words = vec![posix_quote(&spec.program)];
                words.extend(spec.args.iter().map(posix_quote));
                let mut wrapped = CommandSpec::new("su").args([
                    OsString::from("root"),
                    OsString::from("-c"),
                    OsString::from(words.join(" ")),
                ]);
                wrapped.cwd = spec.cwd;
                wrapped
            }
            Self::WindowsRunAs => {
                let arguments = spec
                    .args
                    .iter()
                    .map(|arg| format!("'{}'", escape_ps_single_quote(&windows_argument(arg))))
                    .collect::<Vec<_>>();
                let argument_list = if arguments.is_empty() {
                    String::new()
                } else {
                    format!(" -ArgumentList @({})", arguments.join(","))
                };
                let script = format!(
                    "$p = Start-Process -FilePath '{}'{} -Verb RunAs -Wait -PassThru -ErrorAction Stop; if ($null -ne $p.ExitCode) {{ Write-Output $p.ExitCode }}",
                    escape_ps_single_quote(&spec.program.to_string_lossy()),
                    argument_list
                );
                let mut wrapped = CommandSpec::new("powershell").args([
                    "-NoProfile",
                    "-NonInteractive",
                    "-Command",
                    script.as_str(),
                ]);
                wrapped.cwd = spec.cwd;
                wrapped
            }
        }
    }

    /// Interprets the wrapper's output as the elevated child's exit status.
    pub fn exit_report(self, output: &CommandOutput) -> ExitReport {
        match self {
            Self::WindowsRunAs => {
                if !output.success() {
                    return output.code.map(ExitReport::Code).unwrap_or(ExitReport::Unknown);
                }
                let reported = output.stdout.trim();
                if reported.is_empty() {
                    return ExitReport::CompletedWithoutCode;
                }
                reported
                    .lines()
                    .last()
                    .and_then(|line| line.trim().parse::<i32>().ok())
                    .map(ExitReport::Code)
                    .unwrap_or(ExitReport::Unknown)
            }
            _ => output.code.map(ExitReport::Code).unwrap_or(ExitReport::Unknown),
        }
    }
}

fn posix_quote(value: &OsString) -> String {
    let raw = value.to_string_lossy();
    if !raw.is_empty()
        && raw
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || "/._-=:".contains(ch))
    {
        return raw.into_owned();
    }
    format!("'{}'", raw.replace('\'', "'\\''"))
}

/// Quotes a single argument for a Windows command line when it needs it.
fn windows_argument(value: &OsString) -> String {
    let raw = value.to_string_lossy();
    if raw.is_empty() || raw.contains([' ', '\t', ';']) {
        return format!("\"{}\"", raw.replace('"', "\\\""));
    }
    raw.into_owned()
}
