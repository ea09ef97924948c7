//! Environment Provisioning
//!
//! Installs the platform tools, platform and system image for the
//! configured triple. If that fails once, the request is retried with the
//! fallback image; a second failure is logged and left for the AVD step to
//! surface.

use tracing::{info, warn};

use avdctl_core::{EmulatorConfig, SystemImage};

use crate::sdk_manager::{PackageInstaller, SdkComponent, SdkManagerError};

/// Result of provisioning
#[derive(Debug)]
pub struct Provisioned {
    /// Configuration every later step must use
    pub config: EmulatorConfig,
    /// Whether the fallback image replaced the requested one
    pub used_fallback: bool,
    /// Last installation failure, kept for later diagnostics
    pub install_error: Option<SdkManagerError>,
}

/// Packages required to boot `image`
pub fn package_set(image: &SystemImage) -> Vec<SdkComponent> {
    vec![
        SdkComponent::PlatformTools,
        SdkComponent::Platform(image.api_level),
        SdkComponent::SystemImage(image.clone()),
    ]
}

/// Install the package set for `config`, falling back once if needed
pub async fn provision<I: PackageInstaller>(installer: &I, config: EmulatorConfig) -> Provisioned {
    info!("Provisioning system image {}", config.system_image);

    let first = match installer.install(&package_set(&config.system_image)).await {
        Ok(()) => {
            return Provisioned {
                config,
                used_fallback: false,
                install_error: None,
            }
        }
        Err(e) => e,
    };

    let fallback = SystemImage::fallback();
    warn!(
        "Could not install {} ({}); falling back to {}",
        config.system_image, first, fallback
    );

    let config = config.with_system_image(fallback);
    let install_error = match installer.install(&package_set(&config.system_image)).await {
        Ok(()) => None,
        Err(e) => {
            warn!("Fallback image install failed, continuing: {}", e);
            Some(e)
        }
    };

    Provisioned {
        config,
        used_fallback: true,
        install_error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::path::PathBuf;
    use std::time::Duration;

    /// Installer failing for any request that names an image in `broken`
    struct FakeInstaller {
        broken: Vec<SystemImage>,
        calls: RefCell<Vec<Vec<String>>>,
    }

    impl FakeInstaller {
        fn new(broken: Vec<SystemImage>) -> Self {
            Self {
                broken,
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl PackageInstaller for FakeInstaller {
        async fn install(&self, components: &[SdkComponent]) -> Result<(), SdkManagerError> {
            let packages: Vec<String> = components.iter().map(|c| c.package_name()).collect();
            self.calls.borrow_mut().push(packages.clone());

            let broken = components.iter().any(|c| match c {
                SdkComponent::SystemImage(image) => self.broken.contains(image),
                _ => false,
            });
            if broken {
                return Err(SdkManagerError::InstallFailed {
                    packages,
                    code: Some(1),
                    stderr: "Failed to find package".into(),
                });
            }
            Ok(())
        }
    }

    fn config(image: SystemImage) -> EmulatorConfig {
        EmulatorConfig {
            sdk_root: PathBuf::from("/sdk"),
            avd_home: PathBuf::from("/avd"),
            avd_name: "test".into(),
            system_image: image,
            device_profile: "pixel_6".into(),
            headless: true,
            boot_timeout: Duration::from_secs(300),
        }
    }

    #[tokio::test]
    async fn test_requested_image_installed() {
        let requested = SystemImage::new(34, "google_apis", "x86_64");
        let installer = FakeInstaller::new(vec![]);

        let result = provision(&installer, config(requested.clone())).await;

        assert!(!result.used_fallback);
        assert!(result.install_error.is_none());
        assert_eq!(result.config.system_image, requested);
        assert_eq!(
            *installer.calls.borrow(),
            vec![vec![
                "platform-tools".to_string(),
                "platforms;android-34".to_string(),
                "system-images;android-34;google_apis;x86_64".to_string(),
            ]]
        );
    }

    #[tokio::test]
    async fn test_unavailable_image_falls_back() {
        for requested in [
            SystemImage::new(29, "default", "x86"),
            SystemImage::new(34, "google_apis", "arm64-v8a"),
            SystemImage::new(99, "aosp_atd", "x86_64"),
        ] {
            let installer = FakeInstaller::new(vec![requested.clone()]);
            let result = provision(&installer, config(requested)).await;

            assert!(result.used_fallback);
            assert!(result.install_error.is_none());
            assert_eq!(result.config.system_image, SystemImage::fallback());
            assert_eq!(result.config.avd_name, "test");
            assert_eq!(installer.calls.borrow().len(), 2);
            assert_eq!(
                installer.calls.borrow()[1][2],
                "system-images;android-35;google_apis_playstore;x86_64"
            );
        }
    }

    #[tokio::test]
    async fn test_failed_fallback_is_soft() {
        let requested = SystemImage::new(30, "google_apis", "x86");
        let installer = FakeInstaller::new(vec![requested.clone(), SystemImage::fallback()]);

        let result = provision(&installer, config(requested)).await;

        assert!(result.used_fallback);
        assert_eq!(result.config.system_image, SystemImage::fallback());
        assert!(result.install_error.is_some());
        // exactly one retry
        assert_eq!(installer.calls.borrow().len(), 2);
    }
}
