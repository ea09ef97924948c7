//! CLI commands for avdctl
//!
//! `BootCommand` runs tool check, provisioning, AVD definition and boot in
//! that order; `KillCommand` runs the tool check and stops one emulator.

use tokio::time::Instant;
use tracing::info;

use avdctl_core::{EmulatorConfig, Result};
use avdctl_android_toolchain::{provision, BootstrapTools, PackageInstaller, RuntimeTools, SdkManager, ToolchainDetector};
use avdctl_emulator_bridge::{
    boot, ensure_definition, kill_one, AdbClient, AvdManager, AvdTool, BootedInstance, Bridge,
    EmulatorLauncher, EmulatorSpawner, KillOutcome,
};

/// Exit code of a fatal error
pub const EXIT_FATAL: u8 = 1;

/// What one invocation did
#[derive(Debug)]
pub enum Outcome {
    /// An instance was booted
    Booted(BootedInstance),
    /// A kill request was handled
    Kill(KillOutcome),
}

impl Outcome {
    /// Process exit code for a completed invocation
    pub fn exit_code(&self) -> u8 {
        match self {
            Outcome::Booted(_) => 0,
            Outcome::Kill(outcome) => outcome.exit_code(),
        }
    }
}

/// Process exit code for an invocation result; any error is fatal
pub fn exit_code<E>(result: &std::result::Result<Outcome, E>) -> u8 {
    match result {
        Ok(outcome) => outcome.exit_code(),
        Err(_) => EXIT_FATAL,
    }
}

/// Located SDK tools
struct Toolset {
    sdk: SdkManager,
    bootstrap: BootstrapTools,
    runtime: RuntimeTools,
}

impl Toolset {
    /// Check the bootstrap tools and install missing runtime tools
    async fn check(config: &EmulatorConfig) -> Result<Self> {
        let detector = ToolchainDetector::new(&config.sdk_root);
        let bootstrap = detector.check_mandatory()?;
        let sdk = SdkManager::new(config.sdk_root.clone(), bootstrap.sdkmanager.clone());
        let runtime = detector.ensure_optional(&sdk).await;

        Ok(Self {
            sdk,
            bootstrap,
            runtime,
        })
    }
}

/// Provision and boot the configured AVD
pub struct BootCommand {
    /// Resolved configuration
    pub config: EmulatorConfig,
}

impl BootCommand {
    /// Execute the boot command
    pub async fn execute(&self) -> Result<BootedInstance> {
        let started = Instant::now();
        let tools = Toolset::check(&self.config).await?;

        let avd_manager = AvdManager::new(
            tools.bootstrap.avdmanager.clone(),
            self.config.sdk_root.clone(),
            self.config.avd_home.clone(),
        );
        let launcher = EmulatorLauncher::new(
            tools.runtime.emulator.clone(),
            self.config.sdk_root.clone(),
            self.config.avd_home.clone(),
        );
        let adb = AdbClient::new(tools.runtime.adb.clone());

        let booted = run_lifecycle(&tools.sdk, &avd_manager, &launcher, &adb, self.config.clone(), started).await?;

        println!("Emulator {} is ready ({}).", booted.serial, booted.avd_name);
        println!("Stop it with either of:");
        for hint in shutdown_hints(&booted.serial) {
            println!("  {}", hint);
        }

        Ok(booted)
    }
}

/// Provision, define and boot with the given collaborators.
///
/// The configuration returned by provisioning, which may carry the fallback
/// image, is the one the later steps see.
pub async fn run_lifecycle<I, T, S, B>(
    installer: &I,
    avd_tool: &T,
    spawner: &S,
    bridge: &B,
    config: EmulatorConfig,
    started: Instant,
) -> Result<BootedInstance>
where
    I: PackageInstaller,
    T: AvdTool,
    S: EmulatorSpawner,
    B: Bridge,
{
    let provisioned = provision(installer, config).await;
    if provisioned.used_fallback {
        info!("Continuing with fallback image {}", provisioned.config.system_image);
    }
    let install_error = provisioned.install_error.as_ref().map(|e| e.to_string());

    let avd = ensure_definition(avd_tool, &provisioned.config, install_error.as_deref()).await?;
    if avd.created {
        info!("Created AVD {} at {:?}", avd.name, avd.path);
    } else {
        info!("Using existing AVD {} at {:?}", avd.name, avd.path);
    }

    Ok(boot(spawner, bridge, &provisioned.config, started).await?)
}

/// The two ways to stop an instance by hand
pub fn shutdown_hints(serial: &str) -> [String; 2] {
    [
        format!("adb -s {} emu kill", serial),
        format!("{} kill --serial {}", avdctl_core::APP_NAME, serial),
    ]
}

/// Stop one running emulator
pub struct KillCommand {
    /// Resolved configuration
    pub config: EmulatorConfig,
    /// Emulator to stop, if named
    pub serial: Option<String>,
}

impl KillCommand {
    /// Execute the kill command
    pub async fn execute(&self) -> Result<KillOutcome> {
        let tools = Toolset::check(&self.config).await?;
        let adb = AdbClient::new(tools.runtime.adb.clone());

        let outcome = kill_one(&adb, self.serial.as_deref()).await?;

        match &outcome {
            KillOutcome::NoneRunning => println!("No emulators running."),
            KillOutcome::Killed(serial) => println!("Sent kill request to {}.", serial),
            KillOutcome::Ambiguous(running) => {
                println!("Several emulators are running:");
                for serial in running {
                    println!("  {}", serial);
                }
                println!("Choose one with: {} kill --serial <serial>", avdctl_core::APP_NAME);
            }
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    use avdctl_android_toolchain::{SdkComponent, SdkManagerError};
    use avdctl_core::{AvdctlError, SystemImage};
    use avdctl_emulator_bridge::{AdbError, AvdConfig, AvdError, Device, EmulatorError, EmulatorOptions};

    /// Installer that can only install the fallback image
    struct FallbackOnlyInstaller;

    impl PackageInstaller for FallbackOnlyInstaller {
        async fn install(&self, components: &[SdkComponent]) -> std::result::Result<(), SdkManagerError> {
            let ok = components.iter().all(|c| match c {
                SdkComponent::SystemImage(image) => *image == SystemImage::fallback(),
                _ => true,
            });
            if ok {
                Ok(())
            } else {
                Err(SdkManagerError::InstallFailed {
                    packages: components.iter().map(|c| c.package_name()).collect(),
                    code: Some(1),
                    stderr: "Failed to find package".into(),
                })
            }
        }
    }

    #[derive(Default)]
    struct FakeAvdTool {
        names: RefCell<Vec<String>>,
        creates: RefCell<Vec<AvdConfig>>,
    }

    impl AvdTool for FakeAvdTool {
        async fn list_avd_names(&self) -> std::result::Result<Vec<String>, AvdError> {
            Ok(self.names.borrow().clone())
        }

        async fn create_avd(&self, config: &AvdConfig) -> std::result::Result<(), AvdError> {
            tokio::fs::create_dir_all(&config.path).await?;
            self.names.borrow_mut().push(config.name.clone());
            self.creates.borrow_mut().push(config.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeSpawner {
        launches: RefCell<usize>,
    }

    impl EmulatorSpawner for FakeSpawner {
        fn spawn_detached(&self, _avd_name: &str, _options: &EmulatorOptions) -> std::result::Result<(), EmulatorError> {
            *self.launches.borrow_mut() += 1;
            Ok(())
        }
    }

    /// Bridge that reports boot completion only if `boots`
    struct FakeBridge {
        boots: bool,
    }

    impl Bridge for FakeBridge {
        async fn list_devices(&self) -> std::result::Result<Vec<Device>, AdbError> {
            Ok(Vec::new())
        }

        async fn wait_for_device(&self, _serial: &str) -> std::result::Result<(), AdbError> {
            Ok(())
        }

        async fn get_prop(&self, _serial: &str, _prop: &str) -> std::result::Result<String, AdbError> {
            Ok(if self.boots { "1".into() } else { "0".into() })
        }

        async fn send_keyevent(&self, _serial: &str, _keycode: &str) -> std::result::Result<(), AdbError> {
            Ok(())
        }

        async fn emu_kill(&self, _serial: &str) -> std::result::Result<(), AdbError> {
            Ok(())
        }
    }

    fn config(avd_home: &Path, timeout_secs: u64) -> EmulatorConfig {
        EmulatorConfig {
            sdk_root: PathBuf::from("/sdk"),
            avd_home: avd_home.to_path_buf(),
            avd_name: "ci_pixel".into(),
            system_image: SystemImage::new(30, "google_apis", "x86"),
            device_profile: "pixel_6".into(),
            headless: true,
            boot_timeout: Duration::from_secs(timeout_secs),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_image_reaches_avd_creation() {
        let home = tempfile::tempdir().unwrap();
        let avd_tool = FakeAvdTool::default();
        let spawner = FakeSpawner::default();

        let booted = run_lifecycle(
            &FallbackOnlyInstaller,
            &avd_tool,
            &spawner,
            &FakeBridge { boots: true },
            config(home.path(), 300),
            Instant::now(),
        )
        .await
        .unwrap();

        assert_eq!(booted.serial, "emulator-5554");
        assert_eq!(
            avd_tool.creates.borrow()[0].package,
            "system-images;android-35;google_apis_playstore;x86_64"
        );
        assert_eq!(*spawner.launches.borrow(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_run_does_not_recreate_avd() {
        let home = tempfile::tempdir().unwrap();
        let avd_tool = FakeAvdTool::default();
        let spawner = FakeSpawner::default();
        let bridge = FakeBridge { boots: true };

        for _ in 0..2 {
            run_lifecycle(&FallbackOnlyInstaller, &avd_tool, &spawner, &bridge, config(home.path(), 300), Instant::now())
                .await
                .unwrap();
        }

        assert_eq!(avd_tool.creates.borrow().len(), 1);
        assert_eq!(*spawner.launches.borrow(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_boot_timeout_is_fatal() {
        let home = tempfile::tempdir().unwrap();

        let err = run_lifecycle(
            &FallbackOnlyInstaller,
            &FakeAvdTool::default(),
            &FakeSpawner::default(),
            &FakeBridge { boots: false },
            config(home.path(), 20),
            Instant::now(),
        )
        .await
        .unwrap_err();

        assert!(err.is_timeout());
        assert!(err.to_string().contains("20s"));
        assert_eq!(exit_code(&Err::<Outcome, _>(err)), EXIT_FATAL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exit_codes() {
        let home = tempfile::tempdir().unwrap();
        let booted = run_lifecycle(
            &FallbackOnlyInstaller,
            &FakeAvdTool::default(),
            &FakeSpawner::default(),
            &FakeBridge { boots: true },
            config(home.path(), 300),
            Instant::now(),
        )
        .await
        .map(Outcome::Booted);
        assert_eq!(exit_code(&booted), 0);

        assert_eq!(exit_code::<AvdctlError>(&Ok(Outcome::Kill(KillOutcome::NoneRunning))), 0);
        assert_eq!(
            exit_code::<AvdctlError>(&Ok(Outcome::Kill(KillOutcome::Killed("emulator-5554".into())))),
            0
        );
        assert_eq!(
            exit_code::<AvdctlError>(&Ok(Outcome::Kill(KillOutcome::Ambiguous(vec![
                "emulator-5554".into(),
                "emulator-5556".into(),
            ])))),
            2
        );

        let missing: Result<Outcome> = Err(AvdctlError::MissingTool("sdkmanager not found".into()));
        assert_eq!(exit_code(&missing), EXIT_FATAL);
    }

    #[test]
    fn test_shutdown_hints() {
        let [adb, own] = shutdown_hints("emulator-5556");
        assert_eq!(adb, "adb -s emulator-5556 emu kill");
        assert_eq!(own, "avdctl kill --serial emulator-5556");
    }
}
