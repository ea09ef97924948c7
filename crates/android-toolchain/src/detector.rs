//! Tool Detection
//!
//! Locates the SDK command-line tools the emulator lifecycle depends on.
//! `sdkmanager` and `avdmanager` are bootstrap tools and must already be
//! present; `emulator` and `adb` are installed on demand when missing.

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use which::which;

use crate::sdk_manager::{PackageInstaller, SdkComponent};

/// External tools used by the lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    SdkManager,
    AvdManager,
    Emulator,
    Adb,
}

impl Tool {
    /// Executable name without platform suffix
    pub fn name(&self) -> &'static str {
        match self {
            Tool::SdkManager => "sdkmanager",
            Tool::AvdManager => "avdmanager",
            Tool::Emulator => "emulator",
            Tool::Adb => "adb",
        }
    }

    /// Executable file name on this platform
    fn exe_name(&self) -> String {
        if cfg!(windows) {
            match self {
                Tool::SdkManager | Tool::AvdManager => format!("{}.bat", self.name()),
                Tool::Emulator | Tool::Adb => format!("{}.exe", self.name()),
            }
        } else {
            self.name().to_string()
        }
    }

    /// Package providing the tool, for tools that may be installed on demand
    pub fn package(&self) -> Option<SdkComponent> {
        match self {
            Tool::Emulator => Some(SdkComponent::Emulator),
            Tool::Adb => Some(SdkComponent::PlatformTools),
            Tool::SdkManager | Tool::AvdManager => None,
        }
    }

    /// Directory the tool is expected in
    pub fn expected_dir(&self, sdk_root: &Path) -> PathBuf {
        match self {
            Tool::SdkManager | Tool::AvdManager => {
                sdk_root.join("cmdline-tools").join("latest").join("bin")
            }
            Tool::Emulator => sdk_root.join("emulator"),
            Tool::Adb => sdk_root.join("platform-tools"),
        }
    }

    /// Candidate locations under the SDK root, most preferred first
    fn sdk_candidates(&self, sdk_root: &Path) -> Vec<PathBuf> {
        let exe = self.exe_name();
        let mut candidates = vec![self.expected_dir(sdk_root).join(&exe)];

        if matches!(self, Tool::SdkManager | Tool::AvdManager) {
            // Versioned cmdline-tools/X.Y installs
            let cmdline_tools = sdk_root.join("cmdline-tools");
            if let Ok(entries) = std::fs::read_dir(&cmdline_tools) {
                let mut versioned: Vec<(Vec<u32>, PathBuf)> = entries
                    .flatten()
                    .map(|e| (version_key(&e.file_name().to_string_lossy()), e.path().join("bin").join(&exe)))
                    .collect();
                versioned.sort_by(|a, b| b.cmp(a));
                candidates.extend(versioned.into_iter().map(|(_, path)| path));
            }

            // Legacy tools directory
            candidates.push(sdk_root.join("tools").join("bin").join(&exe));
        }

        candidates
    }
}

/// Numeric components of a version directory name; non-numeric names sort first
fn version_key(name: &str) -> Vec<u32> {
    name.split('.').map_while(|part| part.parse().ok()).collect()
}

/// Tool detection errors
#[derive(Debug, thiserror::Error)]
pub enum DetectionError {
    #[error(
        "{} not found. Install the Android command-line tools into {} (SDK root {})",
        .tool.name(), .expected.display(), .sdk_root.display()
    )]
    MandatoryToolMissing {
        tool: Tool,
        expected: PathBuf,
        sdk_root: PathBuf,
    },
}

/// Paths of the bootstrap tools
#[derive(Debug, Clone)]
pub struct BootstrapTools {
    pub sdkmanager: PathBuf,
    pub avdmanager: PathBuf,
}

/// Paths of the tools used to run and talk to instances
#[derive(Debug, Clone)]
pub struct RuntimeTools {
    pub emulator: PathBuf,
    pub adb: PathBuf,
}

/// Toolchain detector
pub struct ToolchainDetector {
    sdk_root: PathBuf,
    search_path: bool,
}

impl ToolchainDetector {
    /// Detector looking under `sdk_root`, then on PATH
    pub fn new(sdk_root: &Path) -> Self {
        Self {
            sdk_root: sdk_root.to_path_buf(),
            search_path: true,
        }
    }

    /// Only look under the SDK root
    pub fn sdk_only(mut self) -> Self {
        self.search_path = false;
        self
    }

    /// Locate a tool, if present
    pub fn locate(&self, tool: Tool) -> Option<PathBuf> {
        let found = tool
            .sdk_candidates(&self.sdk_root)
            .into_iter()
            .find(|p| p.is_file());

        if found.is_some() || !self.search_path {
            return found;
        }

        which(tool.exe_name()).ok()
    }

    /// Resolve the bootstrap tools; these cannot be installed on demand
    pub fn check_mandatory(&self) -> Result<BootstrapTools, DetectionError> {
        Ok(BootstrapTools {
            sdkmanager: self.require(Tool::SdkManager)?,
            avdmanager: self.require(Tool::AvdManager)?,
        })
    }

    fn require(&self, tool: Tool) -> Result<PathBuf, DetectionError> {
        match self.locate(tool) {
            Some(path) => {
                debug!("Found {} at {:?}", tool.name(), path);
                Ok(path)
            }
            None => Err(DetectionError::MandatoryToolMissing {
                tool,
                expected: tool.expected_dir(&self.sdk_root),
                sdk_root: self.sdk_root.clone(),
            }),
        }
    }

    /// Resolve emulator and adb, installing missing ones through the package manager.
    ///
    /// Never fails: a tool that is still missing resolves to its expected
    /// path and the step that runs it reports the error.
    pub async fn ensure_optional<I: PackageInstaller>(&self, installer: &I) -> RuntimeTools {
        RuntimeTools {
            emulator: self.ensure(Tool::Emulator, installer).await,
            adb: self.ensure(Tool::Adb, installer).await,
        }
    }

    async fn ensure<I: PackageInstaller>(&self, tool: Tool, installer: &I) -> PathBuf {
        if let Some(path) = self.locate(tool) {
            debug!("Found {} at {:?}", tool.name(), path);
            return path;
        }

        if let Some(component) = tool.package() {
            info!("{} not found, installing {}", tool.name(), component.package_name());
            if let Err(e) = installer.install(&[component]).await {
                warn!("Could not install {}: {}", tool.name(), e);
            }
        }

        self.locate(tool)
            .unwrap_or_else(|| tool.expected_dir(&self.sdk_root).join(tool.exe_name()))
    }
}
