//! Running Instances
//!
//! Finds running emulators through adb and stops exactly one of them.

use tracing::{info, warn};

use crate::adb::{AdbError, Bridge};

/// Errors while selecting an instance
#[derive(Debug, thiserror::Error)]
pub enum InstanceError {
    #[error("{target} is not running. Running emulators: {}", .running.join(" "))]
    NotRunning { target: String, running: Vec<String> },
    #[error("Could not list devices: {0}")]
    Bridge(#[from] AdbError),
}

/// What a kill request did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KillOutcome {
    /// Nothing was running
    NoneRunning,
    /// A kill request was sent to this serial
    Killed(String),
    /// Several emulators are running and none was named
    Ambiguous(Vec<String>),
}

/// Exit code asking the operator to pick an emulator
pub const EXIT_AMBIGUOUS: u8 = 2;

impl KillOutcome {
    /// Process exit code: only an ambiguous request is not a success
    pub fn exit_code(&self) -> u8 {
        match self {
            KillOutcome::NoneRunning | KillOutcome::Killed(_) => 0,
            KillOutcome::Ambiguous(_) => EXIT_AMBIGUOUS,
        }
    }
}

/// Serials of the running emulators, as adb reports them
pub async fn running_emulators<B: Bridge>(bridge: &B) -> Result<Vec<String>, AdbError> {
    let devices = bridge.list_devices().await?;
    Ok(devices
        .into_iter()
        .filter(|d| d.is_emulator())
        .map(|d| d.serial)
        .collect())
}

/// Stop one running emulator.
///
/// With `target` set, that serial must be running. Without it, the only
/// running emulator is stopped; with several running nothing is killed.
/// The outcome of the kill request itself is logged, not returned.
pub async fn kill_one<B: Bridge>(bridge: &B, target: Option<&str>) -> Result<KillOutcome, InstanceError> {
    let running = running_emulators(bridge).await?;

    if running.is_empty() {
        info!("No running emulators");
        return Ok(KillOutcome::NoneRunning);
    }

    let serial = match target {
        Some(target) => {
            if !running.iter().any(|s| s == target) {
                return Err(InstanceError::NotRunning {
                    target: target.to_string(),
                    running,
                });
            }
            target.to_string()
        }
        None if running.len() == 1 => running[0].clone(),
        None => return Ok(KillOutcome::Ambiguous(running)),
    };

    info!("Stopping {}", serial);
    if let Err(e) = bridge.emu_kill(&serial).await {
        warn!("Kill request to {} failed: {}", serial, e);
    }

    Ok(KillOutcome::Killed(serial))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Device, DeviceState};
    use std::cell::RefCell;

    struct FakeBridge {
        devices: Vec<Device>,
        kill_fails: bool,
        kills: RefCell<Vec<String>>,
    }

    impl FakeBridge {
        fn with(serials: &[&str]) -> Self {
            Self {
                devices: serials.iter().map(|s| Device::new(s, DeviceState::Online)).collect(),
                kill_fails: false,
                kills: RefCell::new(Vec::new()),
            }
        }
    }

    impl Bridge for FakeBridge {
        async fn list_devices(&self) -> Result<Vec<Device>, AdbError> {
            Ok(self.devices.clone())
        }

        async fn wait_for_device(&self, _serial: &str) -> Result<(), AdbError> {
            Ok(())
        }

        async fn get_prop(&self, _serial: &str, _prop: &str) -> Result<String, AdbError> {
            Ok(String::new())
        }

        async fn send_keyevent(&self, _serial: &str, _keycode: &str) -> Result<(), AdbError> {
            Ok(())
        }

        async fn emu_kill(&self, serial: &str) -> Result<(), AdbError> {
            self.kills.borrow_mut().push(serial.to_string());
            if self.kill_fails {
                return Err(AdbError::CommandFailed("error: could not connect to TCP port 5554".into()));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_none_running() {
        let bridge = FakeBridge::with(&["R58M123ABC"]);
        let outcome = kill_one(&bridge, None).await.unwrap();
        assert_eq!(outcome, KillOutcome::NoneRunning);
        assert!(bridge.kills.borrow().is_empty());
    }

    #[tokio::test]
    async fn test_single_instance_needs_no_target() {
        let bridge = FakeBridge::with(&["emulator-5554", "R58M123ABC"]);
        let outcome = kill_one(&bridge, None).await.unwrap();
        assert_eq!(outcome, KillOutcome::Killed("emulator-5554".into()));
        assert_eq!(*bridge.kills.borrow(), vec!["emulator-5554"]);
    }

    #[tokio::test]
    async fn test_several_instances_without_target_kill_nothing() {
        let bridge = FakeBridge::with(&["emulator-5554", "emulator-5556"]);
        let outcome = kill_one(&bridge, None).await.unwrap();
        assert_eq!(
            outcome,
            KillOutcome::Ambiguous(vec!["emulator-5554".into(), "emulator-5556".into()])
        );
        assert!(bridge.kills.borrow().is_empty());
    }

    #[tokio::test]
    async fn test_explicit_target() {
        let bridge = FakeBridge::with(&["emulator-5554", "emulator-5556"]);
        let outcome = kill_one(&bridge, Some("emulator-5556")).await.unwrap();
        assert_eq!(outcome, KillOutcome::Killed("emulator-5556".into()));
        assert_eq!(*bridge.kills.borrow(), vec!["emulator-5556"]);
    }

    #[tokio::test]
    async fn test_unknown_target_lists_running() {
        let bridge = FakeBridge::with(&["emulator-5554", "emulator-5556"]);
        let err = kill_one(&bridge, Some("emulator-5558")).await.unwrap_err();

        assert_eq!(
            err.to_string(),
            "emulator-5558 is not running. Running emulators: emulator-5554 emulator-5556"
        );
        assert!(bridge.kills.borrow().is_empty());
    }

    #[tokio::test]
    async fn test_failed_kill_is_still_success() {
        let mut bridge = FakeBridge::with(&["emulator-5554"]);
        bridge.kill_fails = true;
        let outcome = tokio_test::assert_ok!(kill_one(&bridge, Some("emulator-5554")).await);
        assert_eq!(outcome, KillOutcome::Killed("emulator-5554".into()));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(KillOutcome::NoneRunning.exit_code(), 0);
        assert_eq!(KillOutcome::Killed("emulator-5554".into()).exit_code(), 0);
        assert_eq!(
            KillOutcome::Ambiguous(vec!["emulator-5554".into(), "emulator-5556".into()]).exit_code(),
            EXIT_AMBIGUOUS
        );
    }
}
