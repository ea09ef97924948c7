//! Emulator Configuration
//!
//! Resolves, once per run, everything the lifecycle steps read:
//! - Android SDK root and AVD home directory
//! - System image triple and device profile
//! - Boot behaviour (headless window, boot timeout)
//!
//! Values are layered: command-line flags and environment variables win
//! over the optional TOML config file, which wins over built-in defaults.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::Deserialize;
use tracing::debug;

use crate::error::{AvdctlError, Result};

/// Default AVD name
pub const DEFAULT_AVD_NAME: &str = "avdctl_pixel";

/// Default API level
pub const DEFAULT_API_LEVEL: u32 = 34;

/// Default system image flavor
pub const DEFAULT_IMAGE_FLAVOR: &str = "google_apis";

/// Default device profile
pub const DEFAULT_DEVICE_PROFILE: &str = "pixel_6";

/// Default boot timeout in seconds
pub const DEFAULT_BOOT_TIMEOUT_SECS: u64 = 300;

/// System image used when the requested one cannot be installed
pub const FALLBACK_API_LEVEL: u32 = 35;
pub const FALLBACK_IMAGE_FLAVOR: &str = "google_apis_playstore";
pub const FALLBACK_ABI: &str = "x86_64";

/// System image triple identifying an installable OS image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemImage {
    pub api_level: u32,
    /// google_apis, google_apis_playstore, default, ...
    pub flavor: String,
    /// x86_64, arm64-v8a, ...
    pub abi: String,
}

impl SystemImage {
    /// Image for `api_level`, e.g. `SystemImage::new(34, "google_apis", "x86_64")`
    pub fn new(api_level: u32, flavor: &str, abi: &str) -> Self {
        Self {
            api_level,
            flavor: flavor.to_string(),
            abi: abi.to_string(),
        }
    }

    /// The deterministic fallback profile
    pub fn fallback() -> Self {
        Self::new(FALLBACK_API_LEVEL, FALLBACK_IMAGE_FLAVOR, FALLBACK_ABI)
    }

    /// Package id for sdkmanager / avdmanager
    pub fn package(&self) -> String {
        format!("system-images;android-{};{};{}", self.api_level, self.flavor, self.abi)
    }
}

impl fmt::Display for SystemImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "android-{} {} {}", self.api_level, self.flavor, self.abi)
    }
}

/// ABI matching the host CPU, so the emulator can use hardware acceleration
pub fn host_abi() -> &'static str {
    if cfg!(target_arch = "aarch64") {
        "arm64-v8a"
    } else {
        "x86_64"
    }
}

/// One layer of optional settings.
///
/// Used both for the TOML config file and for command-line/environment
/// overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PartialConfig {
    pub sdk_root: Option<PathBuf>,
    pub avd_home: Option<PathBuf>,
    pub name: Option<String>,
    pub api_level: Option<u32>,
    pub image_flavor: Option<String>,
    pub abi: Option<String>,
    pub device: Option<String>,
    pub headless: Option<bool>,
    pub boot_timeout_secs: Option<u64>,
}

impl PartialConfig {
    /// Default config file location
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("dev", "avdctl", "avdctl")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load a config file
    pub async fn load(path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", path);
        let contents = tokio::fs::read_to_string(path).await?;
        let config: PartialConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Fill every unset field from `lower`
    pub fn or(self, lower: PartialConfig) -> PartialConfig {
        PartialConfig {
            sdk_root: self.sdk_root.or(lower.sdk_root),
            avd_home: self.avd_home.or(lower.avd_home),
            name: self.name.or(lower.name),
            api_level: self.api_level.or(lower.api_level),
            image_flavor: self.image_flavor.or(lower.image_flavor),
            abi: self.abi.or(lower.abi),
            device: self.device.or(lower.device),
            headless: self.headless.or(lower.headless),
            boot_timeout_secs: self.boot_timeout_secs.or(lower.boot_timeout_secs),
        }
    }
}

/// Fully resolved configuration.
///
/// Never mutated after [`EmulatorConfig::resolve`]; steps that need a
/// different image produce a new value with [`EmulatorConfig::with_system_image`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmulatorConfig {
    /// Android SDK root
    pub sdk_root: PathBuf,
    /// Directory holding `<name>.ini` and `<name>.avd/`
    pub avd_home: PathBuf,
    /// AVD name
    pub avd_name: String,
    pub system_image: SystemImage,
    /// avdmanager device profile (e.g. pixel_6)
    pub device_profile: String,
    /// Run without a window, using software rendering
    pub headless: bool,
    /// Deadline for boot completion, measured from invocation start
    pub boot_timeout: Duration,
}

impl EmulatorConfig {
    /// Apply defaults to a merged layer and validate the result
    pub fn resolve(layer: PartialConfig) -> Result<Self> {
        let sdk_root = layer
            .sdk_root
            .or_else(default_sdk_root)
            .ok_or_else(|| AvdctlError::Config("Cannot determine Android SDK root; set ANDROID_SDK_ROOT".into()))?;

        let avd_home = layer
            .avd_home
            .or_else(default_avd_home)
            .ok_or_else(|| AvdctlError::Config("Cannot determine AVD home; set ANDROID_AVD_HOME".into()))?;

        let avd_name = layer.name.unwrap_or_else(|| DEFAULT_AVD_NAME.to_string());
        validate_avd_name(&avd_name)?;

        let boot_timeout_secs = layer.boot_timeout_secs.unwrap_or(DEFAULT_BOOT_TIMEOUT_SECS);
        if boot_timeout_secs == 0 {
            return Err(AvdctlError::Config("Boot timeout must be at least one second".into()));
        }

        let system_image = SystemImage {
            api_level: layer.api_level.unwrap_or(DEFAULT_API_LEVEL),
            flavor: layer.image_flavor.unwrap_or_else(|| DEFAULT_IMAGE_FLAVOR.to_string()),
            abi: layer.abi.unwrap_or_else(|| host_abi().to_string()),
        };

        Ok(Self {
            sdk_root,
            avd_home,
            avd_name,
            system_image,
            device_profile: layer.device.unwrap_or_else(|| DEFAULT_DEVICE_PROFILE.to_string()),
            headless: layer.headless.unwrap_or(false),
            boot_timeout: Duration::from_secs(boot_timeout_secs),
        })
    }

    /// Same configuration bound to another system image
    pub fn with_system_image(self, system_image: SystemImage) -> Self {
        Self { system_image, ..self }
    }
}

/// avdmanager accepts letters, digits, `.`, `_` and `-`
fn validate_avd_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));

    if valid {
        Ok(())
    } else {
        Err(AvdctlError::Config(format!("Invalid AVD name {:?}: use letters, digits, '.', '_' or '-'", name)))
    }
}

/// SDK root from ANDROID_HOME or a common install location
fn default_sdk_root() -> Option<PathBuf> {
    if let Some(home) = std::env::var_os("ANDROID_HOME") {
        return Some(PathBuf::from(home));
    }

    let home = dirs::home_dir()?;
    let candidates = [
        home.join("Android").join("Sdk"),
        home.join("Library").join("Android").join("sdk"),
        PathBuf::from("/opt/android-sdk"),
    ];

    let found = candidates.iter().find(|p| p.exists()).cloned();
    Some(found.unwrap_or_else(|| candidates[0].clone()))
}

/// `$ANDROID_USER_HOME/avd`, else `~/.android/avd`
fn default_avd_home() -> Option<PathBuf> {
    if let Some(user_home) = std::env::var_os("ANDROID_USER_HOME") {
        return Some(PathBuf::from(user_home).join("avd"));
    }
    dirs::home_dir().map(|h| h.join(".android").join("avd"))
}
