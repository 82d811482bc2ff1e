//! Registry of the counterpart devices bonded with the ring.
//!
//! Device handles are host-side numbers. Handle 0 is always this application.
//! Bonding handles are assigned by the ring and only known once the ring reports them.

use std::collections::BTreeSet;
use std::sync::Arc;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::DeviceRegistryError;
use crate::ring::types::{APPLICATION_DEVICE_HANDLE, ConnectionType, NO_BONDING};
use crate::storage::{KeyCondition, PersistenceGateway, TableKind, load_rows, save_row};

/// Name given to a device the ring reported but the user has not named yet.
pub const UNCONFIRMED_DEVICE_NAME: &str = "Unconfirmed Device";

/// Device handle of the built-in MQTT bridge, which cannot be deleted.
const PROTECTED_MQTT_HANDLE: u8 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectedDevice {
    pub device_handle: u8,
    pub name: String,
    pub connection_type: ConnectionType,
    pub bonding_handle: u8,
}

fn handle_key(device_handle: u8) -> KeyCondition {
    KeyCondition::eq("device_handle", device_handle)
}

pub struct ConnectedDevices {
    confirmed: Vec<ConnectedDevice>,
    unconfirmed: Vec<ConnectedDevice>,
    self_bonding_handle: u8,
    store: Arc<dyn PersistenceGateway>,
}

impl ConnectedDevices {
    /// Loads both device lists and makes sure this application is registered at handle 0.
    pub async fn load(
        store: Arc<dyn PersistenceGateway>,
        self_name: &str,
    ) -> Result<Self, DeviceRegistryError> {
        let confirmed: Vec<ConnectedDevice> =
            load_rows(store.as_ref(), TableKind::ConfirmedDevices, &KeyCondition::all()).await?;
        let unconfirmed: Vec<ConnectedDevice> =
            load_rows(store.as_ref(), TableKind::UnconfirmedDevices, &KeyCondition::all()).await?;
        let self_bonding_handle = confirmed
            .iter()
            .find(|d| d.device_handle == APPLICATION_DEVICE_HANDLE)
            .map_or(NO_BONDING, |d| d.bonding_handle);

        let mut devices = Self {
            confirmed,
            unconfirmed,
            self_bonding_handle,
            store,
        };
        if devices.device(APPLICATION_DEVICE_HANDLE).is_none() {
            devices
                .add_confirmed(
                    self_name,
                    ConnectionType::PrimaryPhone,
                    NO_BONDING,
                    Some(APPLICATION_DEVICE_HANDLE),
                )
                .await?;
        }
        devices.log_devices();
        Ok(devices)
    }

    pub fn confirmed(&self) -> &[ConnectedDevice] {
        &self.confirmed
    }

    pub fn unconfirmed(&self) -> &[ConnectedDevice] {
        &self.unconfirmed
    }

    /// Bonding handle the ring assigned to this application.
    pub fn self_bonding_handle(&self) -> u8 {
        self.self_bonding_handle
    }

    pub fn device(&self, device_handle: u8) -> Option<&ConnectedDevice> {
        self.confirmed.iter().find(|d| d.device_handle == device_handle)
    }

    /// Ring-side bonding of a confirmed device, or [`NO_BONDING`].
    pub fn bonding_for(&self, device_handle: u8) -> u8 {
        self.device(device_handle)
            .map_or(NO_BONDING, |d| d.bonding_handle)
    }

    pub fn name_for_bonding(&self, bonding_handle: u8) -> Option<&str> {
        self.confirmed
            .iter()
            .find(|d| d.bonding_handle == bonding_handle)
            .map(|d| d.name.as_str())
    }

    /// Lowest free handle above the application's own.
    fn next_device_handle(&self) -> Result<u8, DeviceRegistryError> {
        let taken: BTreeSet<u8> = self
            .confirmed
            .iter()
            .chain(&self.unconfirmed)
            .map(|d| d.device_handle)
            .collect();
        (APPLICATION_DEVICE_HANDLE + 1..NO_BONDING)
            .find(|handle| !taken.contains(handle))
            .ok_or(DeviceRegistryError::HandlesExhausted)
    }

    /// Adds a confirmed device, at `device_handle` if given. Returns the handle used.
    pub async fn add_confirmed(
        &mut self,
        name: &str,
        connection_type: ConnectionType,
        bonding_handle: u8,
        device_handle: Option<u8>,
    ) -> Result<u8, DeviceRegistryError> {
        if self.confirmed.iter().any(|d| d.name == name) {
            return Err(DeviceRegistryError::DuplicateName(name.to_string()));
        }
        let device_handle = match device_handle {
            Some(handle) if self.device(handle).is_some() => {
                return Err(DeviceRegistryError::HandleTaken(handle));
            }
            Some(handle) => handle,
            None => self.next_device_handle()?,
        };

        let device = ConnectedDevice {
            device_handle,
            name: name.to_string(),
            connection_type,
            bonding_handle,
        };
        let key = handle_key(device_handle);
        save_row(self.store.as_ref(), TableKind::ConfirmedDevices, &device, &key).await?;
        if device_handle == APPLICATION_DEVICE_HANDLE {
            self.self_bonding_handle = bonding_handle;
        }
        info!("Confirmed device {} added at handle {}", name, device_handle);
        self.confirmed.push(device);
        Ok(device_handle)
    }

    /// Records a counterpart the ring asked us to confirm. Returns its new device handle.
    pub async fn add_unconfirmed(
        &mut self,
        connection_type: ConnectionType,
        bonding_handle: u8,
    ) -> Result<u8, DeviceRegistryError> {
        if self.unconfirmed.iter().any(|d| d.bonding_handle == bonding_handle) {
            return Err(DeviceRegistryError::DuplicateBonding(bonding_handle));
        }
        let device = ConnectedDevice {
            device_handle: self.next_device_handle()?,
            name: UNCONFIRMED_DEVICE_NAME.to_string(),
            connection_type,
            bonding_handle,
        };
        save_row(
            self.store.as_ref(),
            TableKind::UnconfirmedDevices,
            &device,
            &handle_key(device.device_handle),
        )
        .await?;
        info!(
            "Unconfirmed {:?} device with bonding {} at handle {}",
            connection_type, bonding_handle, device.device_handle
        );
        let handle = device.device_handle;
        self.unconfirmed.push(device);
        Ok(handle)
    }

    /// Moves an unconfirmed device into the confirmed list under `name`.
    pub async fn confirm(
        &mut self,
        device_handle: u8,
        name: &str,
        connection_type: ConnectionType,
    ) -> Result<ConnectedDevice, DeviceRegistryError> {
        let index = self
            .unconfirmed
            .iter()
            .position(|d| d.device_handle == device_handle)
            .ok_or(DeviceRegistryError::UnknownUnconfirmed(device_handle))?;
        let bonding = self.unconfirmed[index].bonding_handle;

        self.add_confirmed(name, connection_type, bonding, Some(device_handle))
            .await?;
        self.store
            .delete(TableKind::UnconfirmedDevices, &handle_key(device_handle))
            .await?;
        self.unconfirmed.remove(index);
        info!("Device {} confirmed at handle {}", name, device_handle);
        self.device(device_handle)
            .cloned()
            .ok_or(DeviceRegistryError::UnknownDevice(device_handle))
    }

    /// Drops a pending confirmation. Returns whether one existed.
    pub async fn cancel_confirmation(
        &mut self,
        device_handle: u8,
    ) -> Result<bool, DeviceRegistryError> {
        let Some(index) = self
            .unconfirmed
            .iter()
            .position(|d| d.device_handle == device_handle)
        else {
            return Ok(false);
        };
        self.store
            .delete(TableKind::UnconfirmedDevices, &handle_key(device_handle))
            .await?;
        self.unconfirmed.remove(index);
        Ok(true)
    }

    fn is_protected(device: &ConnectedDevice) -> bool {
        device.connection_type == ConnectionType::PrimaryPhone
            || (device.connection_type == ConnectionType::Mqtt
                && device.device_handle == PROTECTED_MQTT_HANDLE)
    }

    pub async fn delete_confirmed(&mut self, device_handle: u8) -> Result<(), DeviceRegistryError> {
        let index = self
            .confirmed
            .iter()
            .position(|d| d.device_handle == device_handle)
            .ok_or(DeviceRegistryError::UnknownDevice(device_handle))?;
        if Self::is_protected(&self.confirmed[index]) {
            warn!("Deletion blocked for protected device handle {}", device_handle);
            return Err(DeviceRegistryError::Protected(device_handle));
        }
        self.store
            .delete(TableKind::ConfirmedDevices, &handle_key(device_handle))
            .await?;
        let removed = self.confirmed.remove(index);
        info!("Deleted device {}", removed.name);
        Ok(())
    }

    /// Sets the bonding of `device_handle`, carrying every device that shared its old
    /// bonding along. Returns whether anything changed.
    pub async fn update_bonding_handle(
        &mut self,
        device_handle: u8,
        new_bonding: u8,
    ) -> Result<bool, DeviceRegistryError> {
        let old_bonding = self
            .device(device_handle)
            .map(|d| d.bonding_handle)
            .ok_or(DeviceRegistryError::UnknownDevice(device_handle))?;
        if device_handle == APPLICATION_DEVICE_HANDLE {
            self.self_bonding_handle = new_bonding;
        }

        let mut updated = Vec::new();
        for device in &mut self.confirmed {
            let same_device = device.device_handle == device_handle;
            if same_device || device.bonding_handle == old_bonding {
                device.bonding_handle = new_bonding;
                updated.push(device.clone());
            }
        }
        for device in &updated {
            save_row(
                self.store.as_ref(),
                TableKind::ConfirmedDevices,
                device,
                &handle_key(device.device_handle),
            )
            .await?;
        }
        debug!("Bonding {} -> {} on {} devices", old_bonding, new_bonding, updated.len());
        Ok(!updated.is_empty())
    }

    pub async fn update_confirmed(
        &mut self,
        device_handle: u8,
        name: &str,
        connection_type: ConnectionType,
    ) -> Result<(), DeviceRegistryError> {
        let device = self
            .confirmed
            .iter_mut()
            .find(|d| d.device_handle == device_handle)
            .ok_or(DeviceRegistryError::UnknownDevice(device_handle))?;
        device.name = name.to_string();
        device.connection_type = connection_type;
        let device = device.clone();
        let key = handle_key(device_handle);
        save_row(self.store.as_ref(), TableKind::ConfirmedDevices, &device, &key).await?;
        Ok(())
    }

    /// Deletes confirmed devices whose bonding the ring no longer reports.
    /// Protected devices are kept.
    pub async fn retain_bondings(&mut self, bondings: &[u8]) -> Result<(), DeviceRegistryError> {
        let stale: Vec<u8> = self
            .confirmed
            .iter()
            .filter(|d| !bondings.contains(&d.bonding_handle) && !Self::is_protected(d))
            .map(|d| d.device_handle)
            .collect();
        for device_handle in stale {
            self.delete_confirmed(device_handle).await?;
        }
        Ok(())
    }

    /// Clears every pending confirmation and every deletable confirmed device.
    pub async fn delete_all_except_protected(&mut self) -> Result<(), DeviceRegistryError> {
        let pending: Vec<u8> = self.unconfirmed.iter().map(|d| d.device_handle).collect();
        for device_handle in pending {
            self.cancel_confirmation(device_handle).await?;
        }
        self.retain_bondings(&[]).await
    }

    pub fn log_devices(&self) {
        info!("Confirmed devices:");
        for d in &self.confirmed {
            info!(
                "\tName: {}, BondingHandle: {}, DeviceHandle: {}, Type: {:?}",
                d.name, d.bonding_handle, d.device_handle, d.connection_type
            );
        }
        info!("Unconfirmed devices: {}", self.unconfirmed.len());
    }
}
