mod identity;
mod install;
mod package;
mod platform;

pub use identity::{AppIdentity, ProcessSignature, QZ_TRAY};
pub use install::{DetectionSource, InstallationRecord};
pub use package::PackageExtension;
pub use platform::{detect_architecture, detect_platform, Architecture, Platform};
