use crate::platform::Platform;

/// Installer packaging formats published for each platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageExtension {
    Exe,
    Pkg,
    Run,
}

impl PackageExtension {
    pub fn for_platform(platform: Platform) -> Self {
        match platform {
            Platform::Windows => Self::Exe,
            Platform::MacOs => Self::Pkg,
            Platform::Linux | Platform::Unknown => Self::Run,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exe => "exe",
            Self::Pkg => "pkg",
            Self::Run => "run",
        }
    }

    pub fn suffix(self) -> &'static str {
        match self {
            Self::Exe => ".exe",
            Self::Pkg => ".pkg",
            Self::Run => ".run",
        }
    }

    pub fn matches_file_name(self, file_name: &str) -> bool {
        let lower = file_name.to_ascii_lowercase();
        let without_fragment = lower.split('#').next().unwrap_or(&lower);
        let without_query = without_fragment
            .split('?')
            .next()
            .unwrap_or(without_fragment);
        without_query.ends_with(self.suffix())
    }
}
