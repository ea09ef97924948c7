//! avdctl Core - configuration and shared types
//!
//! Every lifecycle step reads the [`EmulatorConfig`] resolved here and
//! reports fatal conditions through [`AvdctlError`].

pub mod config;
pub mod error;

pub use config::{EmulatorConfig, PartialConfig, SystemImage};
pub use error::{AvdctlError, Result};

/// avdctl version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "avdctl";
