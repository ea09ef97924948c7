//! AVD (Android Virtual Device) Manager
//!
//! Makes sure the configured AVD exists, creating it with avdmanager the
//! first time. Existing AVDs are never modified, recreated or deleted.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};
use configparser::ini::Ini;

use avdctl_core::EmulatorConfig;

/// AVD Manager errors
#[derive(Debug, thiserror::Error)]
pub enum AvdError {
    #[error("AVD Manager not found at {0}")]
    ManagerNotFound(PathBuf),
    #[error("avdmanager {command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },
    #[error(
        "AVD '{name}' was not created: {} does not exist{}",
        .path.display(),
        .cause.as_deref().map(|c| format!(" ({})", c)).unwrap_or_default()
    )]
    NotCreated {
        name: String,
        path: PathBuf,
        cause: Option<String>,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// AVD information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvdInfo {
    pub name: String,
    pub path: PathBuf,
    /// Whether this run created the AVD
    pub created: bool,
}

/// AVD configuration for creation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvdConfig {
    pub name: String,
    pub package: String, // system image package
    pub device: String,  // device profile
    pub path: PathBuf,
    pub force: bool,
}

impl AvdConfig {
    /// Creation request for the configured AVD, placed at `path`
    pub fn from_config(config: &EmulatorConfig, path: PathBuf) -> Self {
        Self {
            name: config.avd_name.clone(),
            package: config.system_image.package(),
            device: config.device_profile.clone(),
            path,
            force: true,
        }
    }
}

/// Operations the lifecycle needs from avdmanager
#[allow(async_fn_in_trait)]
pub trait AvdTool {
    /// Names of the AVDs avdmanager knows about
    async fn list_avd_names(&self) -> Result<Vec<String>, AvdError>;

    /// Create an AVD
    async fn create_avd(&self, config: &AvdConfig) -> Result<(), AvdError>;
}

/// AVD Manager
pub struct AvdManager {
    avdmanager_path: PathBuf,
    sdk_path: PathBuf,
    avd_home: PathBuf,
}

impl AvdManager {
    /// Create a new AVD manager
    pub fn new(avdmanager_path: PathBuf, sdk_path: PathBuf, avd_home: PathBuf) -> Self {
        Self {
            avdmanager_path,
            sdk_path,
            avd_home,
        }
    }

    fn command(&self) -> Result<Command, AvdError> {
        if !self.avdmanager_path.exists() {
            return Err(AvdError::ManagerNotFound(self.avdmanager_path.clone()));
        }

        let mut cmd = Command::new(&self.avdmanager_path);
        cmd.env("ANDROID_SDK_ROOT", &self.sdk_path);
        cmd.env("ANDROID_AVD_HOME", &self.avd_home);
        Ok(cmd)
    }
}

impl AvdTool for AvdManager {
    async fn list_avd_names(&self) -> Result<Vec<String>, AvdError> {
        let output = self
            .command()?
            .arg("list")
            .arg("avd")
            .arg("-c")
            .stdin(Stdio::null())
            .output()
            .await?;

        if !output.status.success() {
            return Err(AvdError::CommandFailed {
                command: "list avd".into(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(parse_avd_names(&String::from_utf8_lossy(&output.stdout)))
    }

    async fn create_avd(&self, config: &AvdConfig) -> Result<(), AvdError> {
        info!("Creating AVD: {} ({})", config.name, config.package);

        let mut cmd = self.command()?;
        cmd.arg("create")
            .arg("avd")
            .arg("-n").arg(&config.name)
            .arg("-k").arg(&config.package)
            .arg("-d").arg(&config.device)
            .arg("-p").arg(&config.path);

        if config.force {
            cmd.arg("--force");
        }

        let mut child = cmd
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // Decline the custom hardware profile question
        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(b"no\n").await {
                debug!("avdmanager stdin closed: {}", e);
            }
        }

        let output = child.wait_with_output().await?;

        if !output.status.success() {
            return Err(AvdError::CommandFailed {
                command: "create avd".into(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        info!("AVD created successfully: {}", config.name);
        Ok(())
    }
}

/// Parse `avdmanager list avd` output, compact (`-c`) or verbose
pub fn parse_avd_names(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            if let Some(name) = line.strip_prefix("Name:") {
                Some(name.trim().to_string())
            } else if line.contains(':') || line.contains(' ') || line.starts_with('-') {
                // verbose detail lines and separators
                None
            } else {
                Some(line.to_string())
            }
        })
        .collect()
}

/// Directory of AVD `name`.
///
/// Honours the `path=` entry of `<avd_home>/<name>.ini` when the AVD was
/// created somewhere else, otherwise `<avd_home>/<name>.avd`.
pub async fn definition_dir(avd_home: &Path, name: &str) -> PathBuf {
    let default_dir = avd_home.join(format!("{}.avd", name));
    let ini_path = avd_home.join(format!("{}.ini", name));

    let content = match tokio::fs::read_to_string(&ini_path).await {
        Ok(content) => content,
        Err(_) => return default_dir,
    };

    let mut ini = Ini::new();
    if let Err(e) = ini.read(content) {
        warn!("Ignoring unreadable {:?}: {}", ini_path, e);
        return default_dir;
    }

    match ini.get("default", "path") {
        Some(path) if !path.trim().is_empty() => PathBuf::from(path.trim()),
        _ => default_dir,
    }
}

/// Make sure the configured AVD exists.
///
/// An AVD with the configured name is reused as is, even if it was built
/// from a different system image. `provision_error` is the package install
/// failure from the provisioning step, reported if creation fails.
pub async fn ensure_definition<T: AvdTool>(
    tool: &T,
    config: &EmulatorConfig,
    provision_error: Option<&str>,
) -> Result<AvdInfo, AvdError> {
    let name = &config.avd_name;
    let path = definition_dir(&config.avd_home, name).await;

    match tool.list_avd_names().await {
        Ok(names) if names.iter().any(|n| n == name) => {
            info!("AVD {} already exists at {:?}", name, path);
            return Ok(AvdInfo {
                name: name.clone(),
                path,
                created: false,
            });
        }
        Ok(_) => debug!("AVD {} not found, creating it", name),
        Err(e) => warn!("Could not list AVDs ({}), creating {}", e, name),
    }

    let create_error = match tool.create_avd(&AvdConfig::from_config(config, path.clone())).await {
        Ok(()) => None,
        Err(e) => {
            warn!("avdmanager reported an error: {}", e);
            Some(e.to_string())
        }
    };

    if !dir_exists(&path).await {
        let cause = match (create_error, provision_error) {
            (Some(c), Some(p)) => Some(format!("{}; package installation failed earlier: {}", c, p)),
            (Some(c), None) => Some(c),
            (None, Some(p)) => Some(format!("package installation failed earlier: {}", p)),
            (None, None) => None,
        };
        return Err(AvdError::NotCreated {
            name: name.clone(),
            path,
            cause,
        });
    }

    Ok(AvdInfo {
        name: name.clone(),
        path,
        created: true,
    })
}

async fn dir_exists(path: &Path) -> bool {
    tokio::fs::metadata(path).await.map(|m| m.is_dir()).unwrap_or(false)
}
