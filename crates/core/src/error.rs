//! Error types for avdctl
//!
//! Centralized error handling using thiserror. The toolchain and bridge
//! crates keep their own error enums and convert into [`AvdctlError`]
//! at the command boundary.

use thiserror::Error;

/// Main error type for avdctl
#[derive(Error, Debug)]
pub enum AvdctlError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Missing tool: {0}")]
    MissingTool(String),

    #[error("Device definition error: {0}")]
    Definition(String),

    #[error("Emulator error: {0}")]
    Emulator(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Bridge error: {0}")]
    Bridge(String),

    #[error("Invalid target: {0}")]
    InvalidTarget(String),
}

/// Result type alias for avdctl operations
pub type Result<T> = std::result::Result<T, AvdctlError>;

impl AvdctlError {
    /// Check if this error came from the boot deadline
    pub fn is_timeout(&self) -> bool {
        matches!(self, AvdctlError::Timeout(_))
    }
}
