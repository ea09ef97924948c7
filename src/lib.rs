//! avdctl - Android emulator lifecycle tool
//!
//! Guarantees that a runnable Android Virtual Device exists, boots it and
//! waits until it is usable, or stops one of several running emulators.
//!
//! ## Architecture
//!
//! - `avdctl-core`: resolved configuration and error types
//! - `avdctl-android-toolchain`: SDK tool detection and package provisioning
//! - `avdctl-emulator-bridge`: AVD definitions, emulator launch, adb control

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cli;
pub mod commands;

// Re-export main components for library usage
pub use avdctl_core as core;
pub use avdctl_android_toolchain as toolchain;
pub use avdctl_emulator_bridge as emulator;
