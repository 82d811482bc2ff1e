//! Host collaborators the ring driver consumes: transport permission and the host's own name.

use async_trait::async_trait;
use log::{debug, info};

/// Label used when the host name cannot be determined.
pub const FALLBACK_DEVICE_NAME: &str = "Taika Bridge";

#[async_trait]
pub trait PermissionGateway: Send + Sync {
    /// Asks the platform for Bluetooth access. Returns whether it was granted.
    async fn request_transport_permission(&self) -> bool;
}

/// Desktop platforms grant Bluetooth access at the OS level, so asking always succeeds.
pub struct AlwaysGranted;

#[async_trait]
impl PermissionGateway for AlwaysGranted {
    async fn request_transport_permission(&self) -> bool {
        info!("Bluetooth permission is managed by the OS, assuming granted");
        true
    }
}

pub trait DeviceNameLookup: Send + Sync {
    /// Label this host shows up under in the ring's device list.
    fn device_name(&self) -> String;
}

/// Reads the host name from the environment, then `/etc/hostname`.
pub struct HostName;

impl DeviceNameLookup for HostName {
    fn device_name(&self) -> String {
        let from_env = ["HOSTNAME", "COMPUTERNAME"]
            .iter()
            .find_map(|key| std::env::var(key).ok());
        let name = from_env
            .or_else(|| std::fs::read_to_string("/etc/hostname").ok())
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty());
        match name {
            Some(name) => name,
            None => {
                debug!("Host name unavailable, using {}", FALLBACK_DEVICE_NAME);
                FALLBACK_DEVICE_NAME.to_string()
            }
        }
    }
}

/// Fixed name, for tests and headless setups.
pub struct FixedName(pub String);

impl DeviceNameLookup for FixedName {
    fn device_name(&self) -> String {
        self.0.clone()
    }
}
