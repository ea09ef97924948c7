//! Android Emulator Bridge
//!
//! Manages Android Virtual Devices (AVDs) and emulator instances.

pub mod avd;
pub mod emulator;
pub mod adb;
pub mod device;
pub mod instances;

pub use avd::{ensure_definition, AvdConfig, AvdError, AvdInfo, AvdManager, AvdTool};
pub use emulator::{boot, BootedInstance, EmulatorError, EmulatorLauncher, EmulatorOptions, EmulatorSpawner};
pub use adb::{AdbClient, AdbError, Bridge};
pub use device::{Device, DeviceState, DeviceType};
pub use instances::{kill_one, running_emulators, InstanceError, KillOutcome, EXIT_AMBIGUOUS};

use std::net::{Ipv4Addr, TcpListener};
use std::ops::Range;

use avdctl_core::AvdctlError;

/// Default emulator console port
pub const DEFAULT_CONSOLE_PORT: u16 = 5554;

/// Emulator console port range
pub const EMULATOR_PORT_RANGE: Range<u16> = DEFAULT_CONSOLE_PORT..5586;

/// Get next available emulator console port in `range`.
///
/// Skips ports adb reports as used and ports whose console or adb port
/// (`port + 1`) is already bound on the loopback interface, which covers
/// emulators that are still starting.
pub fn next_emulator_port(range: Range<u16>, used_ports: &[u16]) -> Option<u16> {
    range
        .step_by(2)
        .find(|port| !used_ports.contains(port) && port_pair_free(*port))
}

/// Whether both the console port and its adb port can be bound
fn port_pair_free(console_port: u16) -> bool {
    [console_port, console_port + 1]
        .into_iter()
        .all(|port| TcpListener::bind((Ipv4Addr::LOCALHOST, port)).is_ok())
}

impl From<AvdError> for AvdctlError {
    fn from(e: AvdError) -> Self {
        AvdctlError::Definition(e.to_string())
    }
}

impl From<EmulatorError> for AvdctlError {
    fn from(e: EmulatorError) -> Self {
        match e {
            EmulatorError::BootTimeout { .. } => AvdctlError::Timeout(e.to_string()),
            _ => AvdctlError::Emulator(e.to_string()),
        }
    }
}

impl From<InstanceError> for AvdctlError {
    fn from(e: InstanceError) -> Self {
        match e {
            InstanceError::NotRunning { .. } => AvdctlError::InvalidTarget(e.to_string()),
            InstanceError::Bridge(_) => AvdctlError::Bridge(e.to_string()),
        }
    }
}
