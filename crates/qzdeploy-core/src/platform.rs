use std::process::Command;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Windows,
    MacOs,
    Linux,
    Unknown,
}

impl Platform {
    pub fn current() -> Self {
        Self::from_os_str(std::env::consts::OS)
    }

    pub fn from_os_str(os: &str) -> Self {
        match os.trim().to_ascii_lowercase().as_str() {
            "windows" => Self::Windows,
            "macos" | "darwin" => Self::MacOs,
            "linux" => Self::Linux,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Windows => "windows",
            Self::MacOs => "macos",
            Self::Linux => "linux",
            Self::Unknown => "unknown",
        }
    }

    pub fn is_supported(self) -> bool {
        self != Self::Unknown
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Architecture {
    Amd64,
    Arm64,
    Riscv,
}

impl Architecture {
    /// Buckets a CPU identification string by substring; anything unrecognized is amd64.
    pub fn from_identifier(identifier: &str) -> Self {
        let lower = identifier.to_ascii_lowercase();
        if lower.contains("arm64") || lower.contains("aarch64") {
            return Self::Arm64;
        }
        if lower.contains("riscv") {
            return Self::Riscv;
        }
        Self::Amd64
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Amd64 => "amd64",
            Self::Arm64 => "arm64",
            Self::Riscv => "riscv",
        }
    }
}

static PLATFORM: OnceLock<Platform> = OnceLock::new();
static ARCHITECTURE: OnceLock<Architecture> = OnceLock::new();

pub fn detect_platform() -> Platform {
    *PLATFORM.get_or_init(Platform::current)
}

pub fn detect_architecture() -> Architecture {
    *ARCHITECTURE.get_or_init(|| {
        let identifier = host_cpu_identifier(detect_platform())
            .unwrap_or_else(|| std::env::consts::ARCH.to_string());
        Architecture::from_identifier(&identifier)
    })
}

fn host_cpu_identifier(platform: Platform) -> Option<String> {
    if platform == Platform::Windows {
        // WOW64 processes see the emulated arch in PROCESSOR_ARCHITECTURE.
        return std::env::var("PROCESSOR_ARCHITEW6432")
            .or_else(|_| std::env::var("PROCESSOR_ARCHITECTURE"))
            .ok()
            .filter(|value| !value.trim().is_empty());
    }

    let output = Command::new("uname").arg("-m").output().ok()?;
    if !output.status.success() {
        return None;
    }
    let machine = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!machine.is_empty()).then_some(machine)
}
