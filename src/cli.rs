//! Command-line surface
//!
//! Every setting can be given as a flag or through its environment
//! variable; unset ones fall back to the config file, then to defaults.

use std::path::PathBuf;

use clap::builder::BoolishValueParser;
use clap::{Args, Parser, Subcommand};

use avdctl_core::PartialConfig;

/// Provision, boot and stop Android emulators
#[derive(Parser, Debug)]
#[command(name = "avdctl", version, about, long_about = None)]
pub struct Cli {
    /// Global settings
    #[command(flatten)]
    pub settings: Settings,

    /// Without a command, provisions and boots the configured AVD
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Settings shared by all commands
#[derive(Args, Debug, Default)]
pub struct Settings {
    /// TOML config file
    #[arg(long, env = "AVDCTL_CONFIG", global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Android SDK root
    #[arg(long, env = "ANDROID_SDK_ROOT", global = true, value_name = "DIR")]
    pub sdk_root: Option<PathBuf>,

    /// Directory holding AVD definitions
    #[arg(long, env = "ANDROID_AVD_HOME", global = true, value_name = "DIR")]
    pub avd_home: Option<PathBuf>,

    /// AVD name
    #[arg(long, env = "AVD_NAME", global = true)]
    pub name: Option<String>,

    /// System image API level
    #[arg(long, env = "AVD_API_LEVEL", global = true)]
    pub api_level: Option<u32>,

    /// System image flavor (google_apis, google_apis_playstore, default, ...)
    #[arg(long, env = "AVD_IMAGE_FLAVOR", global = true)]
    pub image_flavor: Option<String>,

    /// System image ABI (x86_64, arm64-v8a, ...)
    #[arg(long, env = "AVD_ABI", global = true)]
    pub abi: Option<String>,

    /// avdmanager device profile
    #[arg(long, env = "AVD_DEVICE", global = true)]
    pub device: Option<String>,

    /// Run without a window, using software rendering
    #[arg(
        long,
        env = "AVD_HEADLESS",
        global = true,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub headless: Option<bool>,

    /// Seconds to wait for boot completion
    #[arg(long, env = "AVD_BOOT_TIMEOUT", global = true, value_name = "SECS")]
    pub boot_timeout: Option<u64>,
}

impl Settings {
    /// The override layer these settings form
    pub fn to_partial(&self) -> PartialConfig {
        PartialConfig {
            sdk_root: self.sdk_root.clone(),
            avd_home: self.avd_home.clone(),
            name: self.name.clone(),
            api_level: self.api_level,
            image_flavor: self.image_flavor.clone(),
            abi: self.abi.clone(),
            device: self.device.clone(),
            headless: self.headless,
            boot_timeout_secs: self.boot_timeout,
        }
    }
}

/// Subcommands
#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Stop one running emulator
    #[command(visible_alias = "stop")]
    Kill {
        /// Serial of the emulator to stop, required when several are running
        #[arg(long, env = "AVD_SERIAL")]
        serial: Option<String>,
    },
}
