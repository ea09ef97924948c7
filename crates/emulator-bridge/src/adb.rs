//! ADB (Android Debug Bridge) Client
//!
//! Communicates with running instances via ADB.

use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use crate::device::{Device, DeviceState};

/// Property set to "1" once Android has finished booting
pub const BOOT_COMPLETED_PROP: &str = "sys.boot_completed";

/// Key code of the menu key, dismisses the lock screen on fresh images
pub const KEYCODE_MENU: &str = "82";

/// ADB errors
#[derive(Debug, thiserror::Error)]
pub enum AdbError {
    #[error("ADB not found at {0}")]
    NotFound(PathBuf),
    #[error("ADB command failed: {0}")]
    CommandFailed(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Operations the lifecycle needs from the bridge
#[allow(async_fn_in_trait)]
pub trait Bridge {
    /// List attached devices
    async fn list_devices(&self) -> Result<Vec<Device>, AdbError>;

    /// Block until `serial` is attached
    async fn wait_for_device(&self, serial: &str) -> Result<(), AdbError>;

    /// Read a system property
    async fn get_prop(&self, serial: &str, prop: &str) -> Result<String, AdbError>;

    /// Inject a key event
    async fn send_keyevent(&self, serial: &str, keycode: &str) -> Result<(), AdbError>;

    /// Ask an emulator to shut down
    async fn emu_kill(&self, serial: &str) -> Result<(), AdbError>;
}

/// ADB Client
pub struct AdbClient {
    adb_path: PathBuf,
}

impl AdbClient {
    /// Create a client for the adb executable at `adb_path`
    pub fn new(adb_path: PathBuf) -> Self {
        Self { adb_path }
    }

    /// Check if ADB is available
    pub fn is_available(&self) -> bool {
        self.adb_path.exists()
    }

    /// Run an ADB command
    async fn run(&self, args: &[&str]) -> Result<String, AdbError> {
        if !self.is_available() {
            return Err(AdbError::NotFound(self.adb_path.clone()));
        }

        debug!("adb {:?}", args);

        let output = Command::new(&self.adb_path)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AdbError::CommandFailed(format!("adb {}: {}", args.join(" "), stderr.trim())));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Run an ADB command for a specific device
    async fn run_for_device(&self, serial: &str, args: &[&str]) -> Result<String, AdbError> {
        let mut full_args = vec!["-s", serial];
        full_args.extend(args);
        self.run(&full_args).await
    }

    /// Run a shell command on device
    pub async fn shell(&self, serial: &str, command: &str) -> Result<String, AdbError> {
        self.run_for_device(serial, &["shell", command]).await
    }
}

impl Bridge for AdbClient {
    async fn list_devices(&self) -> Result<Vec<Device>, AdbError> {
        let output = self.run(&["devices"]).await?;
        Ok(parse_devices(&output))
    }

    async fn wait_for_device(&self, serial: &str) -> Result<(), AdbError> {
        self.run_for_device(serial, &["wait-for-device"]).await?;
        Ok(())
    }

    async fn get_prop(&self, serial: &str, prop: &str) -> Result<String, AdbError> {
        let output = self.shell(serial, &format!("getprop {}", prop)).await?;
        Ok(output.trim().to_string())
    }

    async fn send_keyevent(&self, serial: &str, keycode: &str) -> Result<(), AdbError> {
        self.shell(serial, &format!("input keyevent {}", keycode)).await?;
        Ok(())
    }

    async fn emu_kill(&self, serial: &str) -> Result<(), AdbError> {
        self.run_for_device(serial, &["emu", "kill"]).await?;
        Ok(())
    }
}

/// Parse the output of `adb devices`
pub fn parse_devices(output: &str) -> Vec<Device> {
    output
        .lines()
        .map(str::trim)
        // header and daemon start-up chatter
        .filter(|line| !line.is_empty() && !line.starts_with("List of devices") && !line.starts_with('*'))
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let serial = parts.next()?;
            let state = parts.next()?;
            Some(Device::new(serial, DeviceState::parse(state)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceType;

    #[test]
    fn test_parse_devices() {
        let output = "\
* daemon not running; starting now at tcp:5037
* daemon started successfully
List of devices attached
emulator-5554\tdevice
emulator-5556\toffline
R58M123ABC\tunauthorized

";
        let devices = parse_devices(output);
        assert_eq!(devices.len(), 3);
        assert_eq!(devices[0].serial, "emulator-5554");
        assert_eq!(devices[0].state, DeviceState::Online);
        assert_eq!(devices[1].state, DeviceState::Offline);
        assert_eq!(devices[2].device_type, DeviceType::Physical);
        assert_eq!(devices[2].state, DeviceState::Unauthorized);
    }

    #[test]
    fn test_parse_no_devices() {
        assert!(parse_devices("List of devices attached\n\n").is_empty());
    }

    #[tokio::test]
    async fn test_missing_adb() {
        let client = AdbClient::new(PathBuf::from("/nonexistent/platform-tools/adb"));
        assert!(!client.is_available());
        let err = client.list_devices().await.unwrap_err();
        assert!(matches!(err, AdbError::NotFound(_)));
    }
}
