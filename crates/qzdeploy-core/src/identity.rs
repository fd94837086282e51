use crate::platform::Platform;

/// Strings that identify the application among all running processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessSignature {
    pub patterns: &'static [&'static str],
    pub process_name: &'static str,
}

impl ProcessSignature {
    pub fn native_process_name(&self, platform: Platform) -> String {
        match platform {
            Platform::Windows => format!("{}.exe", self.process_name),
            _ => self.process_name.to_string(),
        }
    }

    pub fn matches_process_name(&self, platform: Platform, name: &str) -> bool {
        name.trim()
            .eq_ignore_ascii_case(&self.native_process_name(platform))
    }

    pub fn matches_command_line(&self, command_line: &str) -> bool {
        self.patterns
            .iter()
            .any(|pattern| command_line.contains(pattern))
    }
}

/// Every name the host layer needs to find, drive and configure the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppIdentity {
    pub display_name: &'static str,
    pub signature: ProcessSignature,
    pub bundle_name: &'static str,
    pub service_unit: &'static str,
    pub entry_jar: &'static str,
    windows_consoles: &'static [&'static str],
    macos_consoles: &'static [&'static str],
    unix_consoles: &'static [&'static str],
}

pub const QZ_TRAY: AppIdentity = AppIdentity {
    display_name: "QZ Tray",
    signature: ProcessSignature {
        patterns: &["qz-tray.jar", "qz.App", "qz.ws.PrintSocketServer"],
        process_name: "qz-tray",
    },
    bundle_name: "QZ Tray.app",
    service_unit: "qz-tray",
    entry_jar: "qz-tray.jar",
    windows_consoles: &["qz-tray-console.exe", "qz-tray.exe"],
    macos_consoles: &["Contents/MacOS/QZ Tray"],
    unix_consoles: &["qz-tray-console", "qz-tray"],
};

impl AppIdentity {
    /// The executable whose presence marks a directory as an install.
    pub fn executable_name(&self, platform: Platform) -> String {
        self.signature.native_process_name(platform)
    }

    /// Console executable candidates relative to the install directory, preferred first.
    pub fn console_candidates(&self, platform: Platform) -> &'static [&'static str] {
        match platform {
            Platform::Windows => self.windows_consoles,
            Platform::MacOs => self.macos_consoles,
            Platform::Linux | Platform::Unknown => self.unix_consoles,
        }
    }

    /// Directory names such as `QZ Tray`, `qz-tray` or `QZTray.app` belong to the application.
    pub fn matches_directory_name(&self, name: &str) -> bool {
        let compact = name
            .chars()
            .filter(|ch| ch.is_ascii_alphanumeric() || *ch == '.')
            .collect::<String>()
            .to_ascii_lowercase();
        let stem = compact.strip_suffix(".app").unwrap_or(&compact);
        stem == "qztray"
    }
}
