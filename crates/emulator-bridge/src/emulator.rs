//! Emulator Launcher
//!
//! Launches an emulator instance detached from this process and waits,
//! through adb, until Android reports boot completion.

use std::ops::Range;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use avdctl_core::EmulatorConfig;

use crate::adb::{AdbError, Bridge, BOOT_COMPLETED_PROP, KEYCODE_MENU};

/// Interval between boot-completion queries
pub const BOOT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Pause between boot completion and the unlock key event
pub const SETTLE_DELAY: Duration = Duration::from_secs(2);

/// Emulator errors
#[derive(Debug, thiserror::Error)]
pub enum EmulatorError {
    #[error("Emulator not found at {0}")]
    NotFound(PathBuf),
    #[error("No free emulator console port")]
    NoFreePort,
    #[error("Failed to start emulator: {0}")]
    StartFailed(String),
    #[error("Emulator {serial} did not finish booting within {timeout_secs}s")]
    BootTimeout { serial: String, timeout_secs: u64 },
    #[error("Lost contact with {serial}: {source}")]
    Bridge {
        serial: String,
        #[source]
        source: AdbError,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Emulator launch options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmulatorOptions {
    /// GPU mode (host, swiftshader_indirect, ...)
    pub gpu: Option<String>,
    /// Run without a window
    pub no_window: bool,
    /// Skip the boot animation
    pub no_boot_anim: bool,
    /// Neither load nor save snapshots
    pub no_snapshot: bool,
    /// Acceleration mode (auto, on, off)
    pub accel: Option<String>,
    /// Network latency emulation
    pub netdelay: Option<String>,
    /// Network speed emulation
    pub netspeed: Option<String>,
    /// Console port; adb serial is `emulator-<port>`
    pub port: Option<u16>,
}

impl EmulatorOptions {
    /// Options for a reproducible cold boot
    pub fn for_boot(headless: bool, port: u16) -> Self {
        let base = Self {
            no_boot_anim: true,
            no_snapshot: true,
            accel: Some("auto".to_string()),
            netdelay: Some("none".to_string()),
            netspeed: Some("full".to_string()),
            port: Some(port),
            ..Default::default()
        };

        if headless {
            Self {
                gpu: Some("swiftshader_indirect".to_string()),
                no_window: true,
                ..base
            }
        } else {
            Self {
                gpu: Some("host".to_string()),
                ..base
            }
        }
    }

    /// Convert to command line arguments
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.no_snapshot {
            args.push("-no-snapshot".to_string());
        }

        if self.no_boot_anim {
            args.push("-no-boot-anim".to_string());
        }

        if let Some(ref accel) = self.accel {
            args.push("-accel".to_string());
            args.push(accel.clone());
        }

        if let Some(ref delay) = self.netdelay {
            args.push("-netdelay".to_string());
            args.push(delay.clone());
        }

        if let Some(ref speed) = self.netspeed {
            args.push("-netspeed".to_string());
            args.push(speed.clone());
        }

        if self.no_window {
            args.push("-no-window".to_string());
        }

        if let Some(ref gpu) = self.gpu {
            args.push("-gpu".to_string());
            args.push(gpu.clone());
        }

        if let Some(port) = self.port {
            args.push("-port".to_string());
            args.push(port.to_string());
        }

        args
    }
}

/// Starts emulator processes without keeping a handle on them
pub trait EmulatorSpawner {
    fn spawn_detached(&self, avd_name: &str, options: &EmulatorOptions) -> Result<(), EmulatorError>;
}

/// Emulator launcher
pub struct EmulatorLauncher {
    emulator_path: PathBuf,
    sdk_path: PathBuf,
    avd_home: PathBuf,
}

impl EmulatorLauncher {
    /// Create a new emulator launcher
    pub fn new(emulator_path: PathBuf, sdk_path: PathBuf, avd_home: PathBuf) -> Self {
        Self {
            emulator_path,
            sdk_path,
            avd_home,
        }
    }

    /// Check if emulator is available
    pub fn is_available(&self) -> bool {
        self.emulator_path.exists()
    }
}

impl EmulatorSpawner for EmulatorLauncher {
    fn spawn_detached(&self, avd_name: &str, options: &EmulatorOptions) -> Result<(), EmulatorError> {
        if !self.is_available() {
            return Err(EmulatorError::NotFound(self.emulator_path.clone()));
        }

        let mut args = vec!["-avd".to_string(), avd_name.to_string()];
        args.extend(options.to_args());

        debug!("Emulator args: {:?}", args);

        let child = Command::new(&self.emulator_path)
            .args(&args)
            .env("ANDROID_SDK_ROOT", &self.sdk_path)
            .env("ANDROID_AVD_HOME", &self.avd_home)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(false)
            .spawn()
            .map_err(|e| EmulatorError::StartFailed(e.to_string()))?;

        info!("Launched emulator {} (pid {:?})", avd_name, child.id());
        // Only adb is used to observe the instance from here on
        drop(child);
        Ok(())
    }
}

/// A booted instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootedInstance {
    pub avd_name: String,
    pub serial: String,
    pub port: u16,
    /// Time from invocation start to boot completion
    pub boot_time: Duration,
}

/// Launch the configured AVD and wait until it has booted.
///
/// `started` is the invocation start; the boot timeout is measured from it.
pub async fn boot<S: EmulatorSpawner, B: Bridge>(
    spawner: &S,
    bridge: &B,
    config: &EmulatorConfig,
    started: Instant,
) -> Result<BootedInstance, EmulatorError> {
    boot_on_ports(spawner, bridge, config, started, crate::EMULATOR_PORT_RANGE).await
}

async fn boot_on_ports<S: EmulatorSpawner, B: Bridge>(
    spawner: &S,
    bridge: &B,
    config: &EmulatorConfig,
    started: Instant,
    ports: Range<u16>,
) -> Result<BootedInstance, EmulatorError> {
    let used_ports: Vec<u16> = match bridge.list_devices().await {
        Ok(devices) => devices.iter().filter_map(|d| d.console_port()).collect(),
        Err(e) => {
            warn!("Could not list running devices: {}", e);
            Vec::new()
        }
    };
    let port = crate::next_emulator_port(ports, &used_ports).ok_or(EmulatorError::NoFreePort)?;
    let serial = format!("emulator-{}", port);

    info!("Launching emulator {} on port {}", config.avd_name, port);
    spawner.spawn_detached(&config.avd_name, &EmulatorOptions::for_boot(config.headless, port))?;

    info!("Waiting for {} to attach...", serial);
    bridge
        .wait_for_device(&serial)
        .await
        .map_err(|source| EmulatorError::Bridge { serial: serial.clone(), source })?;

    info!("Waiting for emulator to boot...");
    loop {
        if started.elapsed() >= config.boot_timeout {
            return Err(EmulatorError::BootTimeout {
                serial,
                timeout_secs: config.boot_timeout.as_secs(),
            });
        }

        match bridge.get_prop(&serial, BOOT_COMPLETED_PROP).await {
            Ok(value) if value.trim() == "1" => break,
            Ok(value) => debug!("{}={:?}", BOOT_COMPLETED_PROP, value),
            Err(e) => debug!("{} not readable yet: {}", BOOT_COMPLETED_PROP, e),
        }

        tokio::time::sleep(BOOT_POLL_INTERVAL).await;
    }

    let boot_time = started.elapsed();

    tokio::time::sleep(SETTLE_DELAY).await;
    if let Err(e) = bridge.send_keyevent(&serial, KEYCODE_MENU).await {
        warn!("Could not dismiss lock screen on {}: {}", serial, e);
    }

    info!("Emulator {} booted in {}s", serial, boot_time.as_secs());

    Ok(BootedInstance {
        avd_name: config.avd_name.clone(),
        serial,
        port,
        boot_time,
    })
}
