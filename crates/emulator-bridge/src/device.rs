//! Device Types and State
//!
//! Represents devices reported by `adb devices`.

use once_cell::sync::Lazy;
use regex::Regex;

/// Serial adb assigns to a running emulator (`emulator-<console port>`)
static EMULATOR_SERIAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^emulator-(\d+)$").expect("valid emulator serial pattern")
});

/// Check whether a serial names a running emulator
pub fn is_emulator_serial(serial: &str) -> bool {
    EMULATOR_SERIAL.is_match(serial)
}

/// Console port encoded in an emulator serial
pub fn emulator_port(serial: &str) -> Option<u16> {
    EMULATOR_SERIAL
        .captures(serial)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Device state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    /// Device is online and ready
    Online,
    /// Device is offline (an emulator that is still starting shows up like this)
    Offline,
    /// Device is not authorized (need to accept on device)
    Unauthorized,
    /// Unknown state
    Unknown,
}

impl DeviceState {
    /// Parse the state column of `adb devices`
    pub fn parse(s: &str) -> Self {
        match s {
            "device" => DeviceState::Online,
            "offline" => DeviceState::Offline,
            "unauthorized" => DeviceState::Unauthorized,
            _ => DeviceState::Unknown,
        }
    }
}

/// Device type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceType {
    /// Physical device connected via USB/WiFi
    Physical,
    /// Android emulator
    Emulator,
}

/// Device information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    /// Device serial number
    pub serial: String,
    /// Device state
    pub state: DeviceState,
    /// Device type
    pub device_type: DeviceType,
}

impl Device {
    /// Device from an `adb devices` row; the type follows from the serial
    pub fn new(serial: &str, state: DeviceState) -> Self {
        let device_type = if is_emulator_serial(serial) {
            DeviceType::Emulator
        } else {
            DeviceType::Physical
        };

        Self {
            serial: serial.to_string(),
            state,
            device_type,
        }
    }

    /// Check if this is an emulator
    pub fn is_emulator(&self) -> bool {
        self.device_type == DeviceType::Emulator
    }

    /// Console port, for emulators
    pub fn console_port(&self) -> Option<u16> {
        emulator_port(&self.serial)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emulator_serials() {
        assert!(is_emulator_serial("emulator-5554"));
        assert!(!is_emulator_serial("emulator-"));
        assert!(!is_emulator_serial("emulator-5554x"));
        assert!(!is_emulator_serial("R58M123ABC"));
        assert!(!is_emulator_serial("192.168.1.20:5555"));

        assert_eq!(emulator_port("emulator-5556"), Some(5556));
        assert_eq!(emulator_port("R58M123ABC"), None);
    }

    #[test]
    fn test_device_type_from_serial() {
        let emu = Device::new("emulator-5554", DeviceState::Offline);
        assert!(emu.is_emulator());
        assert_eq!(emu.state, DeviceState::Offline);
        assert_eq!(emu.console_port(), Some(5554));

        let phone = Device::new("R58M123ABC", DeviceState::parse("device"));
        assert!(!phone.is_emulator());
        assert_eq!(phone.state, DeviceState::Online);
    }
}
