//! SDK Manager
//!
//! Wraps the Android SDK manager to install SDK components.

use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use avdctl_core::SystemImage;

/// SDK component types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SdkComponent {
    Platform(u32),             // platforms;android-XX
    PlatformTools,             // platform-tools
    SystemImage(SystemImage),  // system-images;android-XX;flavor;abi
    Emulator,                  // emulator
}

impl SdkComponent {
    /// Get the SDK manager package name
    pub fn package_name(&self) -> String {
        match self {
            SdkComponent::Platform(api) => format!("platforms;android-{}", api),
            SdkComponent::PlatformTools => "platform-tools".to_string(),
            SdkComponent::SystemImage(image) => image.package(),
            SdkComponent::Emulator => "emulator".to_string(),
        }
    }
}

/// SDK Manager errors
#[derive(Debug, thiserror::Error)]
pub enum SdkManagerError {
    #[error("Failed to install {}: exit code {code:?}: {stderr}", .packages.join(" "))]
    InstallFailed {
        packages: Vec<String>,
        code: Option<i32>,
        stderr: String,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Anything that can install SDK packages
#[allow(async_fn_in_trait)]
pub trait PackageInstaller {
    /// Install all components in a single request
    async fn install(&self, components: &[SdkComponent]) -> Result<(), SdkManagerError>;
}

/// Number of consent answers fed to license prompts
const LICENSE_ANSWERS: usize = 10;

/// Android SDK Manager wrapper
pub struct SdkManager {
    sdk_root: PathBuf,
    sdkmanager_path: PathBuf,
}

impl SdkManager {
    /// Create a manager for an already located sdkmanager executable
    pub fn new(sdk_root: PathBuf, sdkmanager_path: PathBuf) -> Self {
        Self {
            sdk_root,
            sdkmanager_path,
        }
    }

    /// Create the base command with environment variables
    fn create_command(&self) -> Command {
        let mut cmd = Command::new(&self.sdkmanager_path);

        cmd.arg(format!("--sdk_root={}", self.sdk_root.display()));
        cmd.env("ANDROID_SDK_ROOT", &self.sdk_root);
        cmd.env("ANDROID_HOME", &self.sdk_root);

        cmd
    }
}

/// Log sdkmanager progress lines until EOF; lines need not be UTF-8
async fn log_progress<R: AsyncRead + Unpin>(stdout: Option<R>) {
    let Some(stdout) = stdout else { return };
    let mut lines = BufReader::new(stdout).split(b'\n');

    loop {
        match lines.next_segment().await {
            Ok(Some(line)) => debug!("sdkmanager: {}", String::from_utf8_lossy(&line).trim_end()),
            Ok(None) => break,
            Err(e) => {
                debug!("sdkmanager stdout: {}", e);
                break;
            }
        }
    }
}

async fn read_all<R: AsyncRead + Unpin>(stream: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut stream) = stream {
        if let Err(e) = stream.read_to_end(&mut buf).await {
            debug!("sdkmanager stderr: {}", e);
        }
    }
    buf
}

impl PackageInstaller for SdkManager {
    async fn install(&self, components: &[SdkComponent]) -> Result<(), SdkManagerError> {
        let packages: Vec<String> = components.iter().map(|c| c.package_name()).collect();

        info!("Installing SDK packages: {:?}", packages);

        let mut cmd = self.create_command();
        for package in &packages {
            cmd.arg(package);
        }

        let mut child = cmd
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // Accept any license prompts
        if let Some(mut stdin) = child.stdin.take() {
            for _ in 0..LICENSE_ANSWERS {
                if let Err(e) = stdin.write_all(b"y\n").await {
                    // sdkmanager exits without reading stdin when nothing needs consent
                    debug!("sdkmanager stdin closed: {}", e);
                    break;
                }
            }
        }

        // Both pipes are drained together so neither can fill up
        let (_, stderr) = tokio::join!(log_progress(child.stdout.take()), read_all(child.stderr.take()));
        let status = child.wait().await?;

        if !status.success() {
            return Err(SdkManagerError::InstallFailed {
                packages,
                code: status.code(),
                stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
            });
        }

        info!("SDK packages installed successfully");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_package_name() {
        assert_eq!(
            SdkComponent::Platform(34).package_name(),
            "platforms;android-34"
        );
        assert_eq!(SdkComponent::PlatformTools.package_name(), "platform-tools");
        assert_eq!(SdkComponent::Emulator.package_name(), "emulator");
        assert_eq!(
            SdkComponent::SystemImage(SystemImage::new(34, "google_apis", "x86_64")).package_name(),
            "system-images;android-34;google_apis;x86_64"
        );
    }

    #[test]
    fn test_install_error_lists_packages() {
        let err = SdkManagerError::InstallFailed {
            packages: vec!["platform-tools".into(), "platforms;android-34".into()],
            code: Some(1),
            stderr: "Failed to find package".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("platform-tools platforms;android-34"));
        assert!(msg.contains("Failed to find package"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_install_runs_sdkmanager_with_sdk_root() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("args.log");
        let script = dir.path().join("sdkmanager");
        std::fs::write(
            &script,
            format!("#!/bin/sh\necho \"$@\" > {}\ncat > /dev/null\n", log.display()),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let manager = SdkManager::new(dir.path().to_path_buf(), script);
        manager.install(&[SdkComponent::PlatformTools]).await.unwrap();

        let args = std::fs::read_to_string(&log).unwrap();
        assert!(args.contains(&format!("--sdk_root={}", dir.path().display())));
        assert!(args.contains("platform-tools"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_noisy_failing_sdkmanager_is_drained() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("sdkmanager");
        std::fs::write(
            &script,
            concat!(
                "#!/bin/sh\n",
                "printf '\\377\\376 not utf-8\\n'\n",
                "i=0\n",
                "while [ $i -lt 3000 ]; do echo \"Warning: noisy line $i\" >&2; i=$((i+1)); done\n",
                "echo '[====] 100% done'\n",
                "exit 3\n",
            ),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let manager = SdkManager::new(dir.path().to_path_buf(), script);
        let err = manager.install(&[SdkComponent::Emulator]).await.unwrap_err();

        match err {
            SdkManagerError::InstallFailed { packages, code, stderr } => {
                assert_eq!(packages, vec!["emulator"]);
                assert_eq!(code, Some(3));
                assert!(stderr.ends_with("Warning: noisy line 2999"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }
}
