//! Device and application identity
//!
//! The identity snapshot is denormalized onto every entry. Population never
//! fails outward: a provider that cannot read the host falls back to an
//! "unknown" snapshot carrying the failure text.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceIdentity {
    pub device_id: Option<String>,
    pub platform: Option<String>,
    pub os_version: Option<String>,
    pub device_model: Option<String>,
    pub app_version: Option<String>,
    pub build_number: Option<String>,
    pub package_name: Option<String>,
    /// Why population failed, if it did
    pub error: Option<String>,
}

impl DeviceIdentity {
    pub fn unknown(error: impl Into<String>) -> Self {
        Self {
            platform: Some("unknown".to_string()),
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

pub trait IdentityProvider: Send + Sync {
    fn identity(&self) -> Arc<DeviceIdentity>;
}

/// Caller-supplied identity
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity {
    identity: Arc<DeviceIdentity>,
}

impl StaticIdentity {
    pub fn new(identity: DeviceIdentity) -> Self {
        Self {
            identity: Arc::new(identity),
        }
    }
}

impl IdentityProvider for StaticIdentity {
    fn identity(&self) -> Arc<DeviceIdentity> {
        Arc::clone(&self.identity)
    }
}

/// Identity read once from the host operating system
///
/// Application fields come from the builder; OS fields are read lazily on
/// first use.
#[derive(Debug, Default)]
pub struct SystemIdentity {
    package_name: Option<String>,
    app_version: Option<String>,
    build_number: Option<String>,
    cached: OnceLock<Arc<DeviceIdentity>>,
}

impl SystemIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_package(mut self, name: impl Into<String>) -> Self {
        self.package_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_app_version(
        mut self,
        version: impl Into<String>,
        build_number: impl Into<String>,
    ) -> Self {
        self.app_version = Some(version.into());
        self.build_number = Some(build_number.into());
        self
    }

    fn populate(&self) -> DeviceIdentity {
        match read_os_release() {
            Ok(os_version) => DeviceIdentity {
                device_id: read_machine_id(),
                platform: Some(std::env::consts::OS.to_string()),
                os_version: Some(os_version),
                device_model: Some(std::env::consts::ARCH.to_string()),
                app_version: self.app_version.clone(),
                build_number: self.build_number.clone(),
                package_name: self.package_name.clone(),
                error: None,
            },
            Err(e) => DeviceIdentity {
                app_version: self.app_version.clone(),
                build_number: self.build_number.clone(),
                package_name: self.package_name.clone(),
                ..DeviceIdentity::unknown(e.to_string())
            },
        }
    }
}

impl IdentityProvider for SystemIdentity {
    fn identity(&self) -> Arc<DeviceIdentity> {
        Arc::clone(self.cached.get_or_init(|| Arc::new(self.populate())))
    }
}

#[cfg(target_os = "linux")]
fn read_os_release() -> std::io::Result<String> {
    let release = std::fs::read_to_string("/proc/sys/kernel/osrelease")?;
    Ok(format!("Linux {}", release.trim()))
}

#[cfg(not(target_os = "linux"))]
fn read_os_release() -> std::io::Result<String> {
    Ok(std::env::consts::OS.to_string())
}

fn read_machine_id() -> Option<String> {
    ["/etc/machine-id", "/var/lib/dbus/machine-id"]
        .iter()
        .find_map(|path| std::fs::read_to_string(path).ok())
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
}
