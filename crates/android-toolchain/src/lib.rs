//! Android Toolchain Management
//!
//! Handles the SDK side of the emulator lifecycle:
//! - Locating sdkmanager, avdmanager, emulator and adb
//! - Installing missing runtime tools on demand
//! - Provisioning platform and system image packages

pub mod detector;
pub mod sdk_manager;
pub mod provision;

pub use detector::{BootstrapTools, DetectionError, RuntimeTools, Tool, ToolchainDetector};
pub use sdk_manager::{PackageInstaller, SdkComponent, SdkManager, SdkManagerError};
pub use provision::{package_set, provision, Provisioned};

use avdctl_core::AvdctlError;

impl From<DetectionError> for AvdctlError {
    fn from(e: DetectionError) -> Self {
        AvdctlError::MissingTool(e.to_string())
    }
}
