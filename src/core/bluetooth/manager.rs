//! Ring manager for the Taika Ring Bridge
//! This module ties the ring services to the persisted configuration: every change is
//! stored first and pushed to the ring when it is connected.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

use crate::config::ConnectionSettings;
use crate::core::bluetooth::commands::ControlCommand;
use crate::core::bluetooth::connection::{RingReadyCallback, forget_paired_ring};
use crate::core::bluetooth::gateway::CharacteristicGateway;
use crate::core::bluetooth::services::{ControlService, RingServices};
use crate::core::codec::{LedConfig, RingVersion};
use crate::core::debounce::Debouncer;
use crate::core::events::{EventBus, RingEvent};
use crate::error::DeviceRegistryError;
use crate::ring::{
    APPLICATION_DEVICE_HANDLE, ConnectedDevices, ConnectionType, DeviceIdentity, GestureMapping,
    Handedness, ModeIndex, ModeLibrary, MouseSensitivity, RingMode,
};
use crate::storage::{KeyCondition, PersistenceGateway, TableKind, load_row, save_row};

const SETTINGS_ROW: u32 = 1;

#[derive(Serialize, Deserialize)]
struct MouseRow {
    id: u32,
    #[serde(flatten)]
    sensitivity: MouseSensitivity,
}

#[derive(Serialize, Deserialize)]
struct HandednessRow {
    id: u32,
    user_handedness: Handedness,
}

#[derive(Serialize, Deserialize)]
struct LedRow {
    id: u32,
    #[serde(flatten)]
    config: LedConfig,
}

fn settings_key() -> KeyCondition {
    KeyCondition::eq("id", SETTINGS_ROW)
}

async fn load_setting<T, R>(
    store: &dyn PersistenceGateway,
    table: TableKind,
    pick: impl FnOnce(R) -> T,
) -> T
where
    T: Default,
    R: serde::de::DeserializeOwned,
{
    match load_row::<R>(store, table, &settings_key()).await {
        Ok(Some(row)) => pick(row),
        Ok(None) => T::default(),
        Err(e) => {
            warn!("Failed to load {}, using default: {}", table, e);
            T::default()
        }
    }
}

/// Keeps the device registry in step with what the ring reports.
async fn sync_registry(devices: &Mutex<ConnectedDevices>, host_name: &str, event: &RingEvent) {
    let mut devices = devices.lock().await;
    let result = match event {
        RingEvent::DeviceConfirmationNeeded {
            bonding,
            connection_type,
        } => devices
            .add_unconfirmed(*connection_type, *bonding)
            .await
            .map(|_| ()),
        RingEvent::BondingListChanged(bondings) => devices.retain_bondings(bondings).await,
        RingEvent::BecamePrimary { bonding } => {
            match devices
                .update_bonding_handle(APPLICATION_DEVICE_HANDLE, *bonding)
                .await
            {
                Ok(_) => {
                    devices
                        .update_confirmed(
                            APPLICATION_DEVICE_HANDLE,
                            host_name,
                            ConnectionType::PrimaryPhone,
                        )
                        .await
                }
                Err(e) => Err(e),
            }
        }
        _ => Ok(()),
    };
    if let Err(e) = result {
        error!("Device registry update for {} failed: {}", event.name(), e);
    }
    devices.log_devices();
}

/// Owns the ring's configuration and the services that push it.
pub struct RingManager {
    services: RingServices,
    gateway: CharacteristicGateway,
    store: Arc<dyn PersistenceGateway>,
    bus: Arc<EventBus>,
    host_name: String,
    modes: Mutex<ModeLibrary>,
    devices: Arc<Mutex<ConnectedDevices>>,
    mouse: Mutex<MouseSensitivity>,
    handedness: Mutex<Handedness>,
    led: Mutex<LedConfig>,
    version: Mutex<Option<RingVersion>>,
    battery_level: Mutex<Option<u8>>,
    mouse_push: Debouncer<MouseSensitivity>,
}

impl RingManager {
    /// Loads every persisted setting. Must be called inside a Tokio runtime.
    pub async fn new(
        gateway: CharacteristicGateway,
        bus: Arc<EventBus>,
        store: Arc<dyn PersistenceGateway>,
        host_name: impl Into<String>,
        settings: &ConnectionSettings,
    ) -> Result<Self> {
        let host_name = host_name.into();
        let modes = ModeLibrary::load(store.as_ref()).await?;
        let devices = ConnectedDevices::load(store.clone(), &host_name).await?;
        let mouse = load_setting(store.as_ref(), TableKind::MouseConfiguration, |row: MouseRow| {
            row.sensitivity
        })
        .await;
        let stored_handedness =
            load_row::<HandednessRow>(store.as_ref(), TableKind::Handedness, &settings_key()).await;
        let handedness = match stored_handedness {
            Ok(row) => row.map_or(Handedness::RightHanded, |row| row.user_handedness),
            Err(e) => {
                warn!("Failed to load handedness: {}", e);
                Handedness::RightHanded
            }
        };
        let led = load_setting(store.as_ref(), TableKind::LedConfiguration, |row: LedRow| {
            row.config
        })
        .await;

        let control = Arc::new(ControlService::new(gateway.clone()));
        let mouse_push = Debouncer::new(settings.mouse_debounce(), move |sensitivity| {
            let control = control.clone();
            async move {
                control
                    .send(&ControlCommand::AdjustSensitivity(sensitivity))
                    .await;
            }
        });

        info!("Ring manager loaded {} modes, slots {:?}", modes.modes().count(), modes.slots());
        Ok(Self {
            services: RingServices::with_settings(
                gateway.clone(),
                bus.clone(),
                settings.low_battery_threshold,
                settings.led_settle(),
            ),
            gateway,
            store,
            bus,
            host_name,
            modes: Mutex::new(modes),
            devices: Arc::new(Mutex::new(devices)),
            mouse: Mutex::new(mouse),
            handedness: Mutex::new(handedness),
            led: Mutex::new(led),
            version: Mutex::new(None),
            battery_level: Mutex::new(None),
            mouse_push,
        })
    }

    /// Subscribes the device registry to ring reports. Handlers forward into a task
    /// since bus handlers cannot await.
    pub fn spawn_registry_sync(&self) -> JoinHandle<()> {
        let (tx, mut rx) = mpsc::unbounded_channel::<RingEvent>();
        for name in [
            RingEvent::DEVICE_CONFIRMATION_NEEDED,
            RingEvent::BONDING_LIST_CHANGED,
            RingEvent::BECAME_PRIMARY,
        ] {
            let tx = tx.clone();
            self.bus.subscribe(name, move |event| {
                let _ = tx.send(event.clone());
            });
        }

        let devices = self.devices.clone();
        let host_name = self.host_name.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                sync_registry(&devices, &host_name, &event).await;
            }
        })
    }

    pub fn devices(&self) -> Arc<Mutex<ConnectedDevices>> {
        self.devices.clone()
    }

    pub async fn is_ready(&self) -> bool {
        self.gateway.is_ready().await
    }

    pub async fn modes(&self) -> Vec<RingMode> {
        self.modes.lock().await.modes().cloned().collect()
    }

    pub async fn active_modes(&self) -> Vec<RingMode> {
        self.modes.lock().await.active_modes()
    }

    pub async fn mouse_sensitivity(&self) -> MouseSensitivity {
        *self.mouse.lock().await
    }

    pub async fn handedness(&self) -> Handedness {
        *self.handedness.lock().await
    }

    pub async fn led_config(&self) -> LedConfig {
        *self.led.lock().await
    }

    /// Version read on the last connection.
    pub async fn firmware_version(&self) -> Option<RingVersion> {
        self.version.lock().await.clone()
    }

    /// Last battery level read from the ring, in percent.
    pub async fn battery_level(&self) -> Option<u8> {
        *self.battery_level.lock().await
    }

    async fn push_modes(&self, modes: &[RingMode]) -> bool {
        if modes.is_empty() || !self.gateway.is_ready().await {
            return false;
        }
        let devices = self.devices.lock().await;
        let mut all = true;
        for mode in modes {
            all &= self.services.mode.update_mode_for_index(mode, &devices).await;
        }
        all
    }

    /// Writes all three slotted modes to the ring.
    pub async fn push_active_modes(&self) -> bool {
        let active = self.modes.lock().await.active_modes();
        self.push_modes(&active).await
    }

    /// Stores `mode` and pushes it if it occupies a slot.
    pub async fn set_mode(&self, mode: RingMode) -> Result<()> {
        let unique_id = mode.unique_id;
        let on_ring = {
            let mut modes = self.modes.lock().await;
            let on_ring = modes.upsert(mode);
            modes.save_mode(self.store.as_ref(), unique_id).await?;
            on_ring
        };
        if let Some(mode) = on_ring {
            self.push_modes(&[mode]).await;
        }
        Ok(())
    }

    pub async fn assign_mode_to_slot(&self, unique_id: u32, index: ModeIndex) -> Result<()> {
        let changed = {
            let mut modes = self.modes.lock().await;
            let changed = modes.assign_to_slot(unique_id, index)?;
            modes.save_slots(self.store.as_ref()).await?;
            for mode in &changed {
                modes.save_mode(self.store.as_ref(), mode.unique_id).await?;
            }
            changed
        };
        self.push_modes(&changed).await;
        Ok(())
    }

    pub async fn set_gesture_mapping(&self, unique_id: u32, mapping: GestureMapping) -> Result<()> {
        let on_ring = {
            let mut modes = self.modes.lock().await;
            let on_ring = modes.set_mapping(unique_id, mapping)?;
            modes.save_mode(self.store.as_ref(), unique_id).await?;
            on_ring
        };
        if let Some(mode) = on_ring {
            self.push_modes(&[mode]).await;
        }
        Ok(())
    }

    /// Stores the sensitivity now; the ring gets the last value of a burst.
    pub async fn set_mouse_sensitivity(&self, sensitivity: MouseSensitivity) -> Result<()> {
        *self.mouse.lock().await = sensitivity;
        let row = MouseRow {
            id: SETTINGS_ROW,
            sensitivity,
        };
        save_row(self.store.as_ref(), TableKind::MouseConfiguration, &row, &settings_key()).await?;
        self.mouse_push.push(sensitivity);
        Ok(())
    }

    pub async fn set_handedness(&self, handedness: Handedness) -> Result<()> {
        *self.handedness.lock().await = handedness;
        let row = HandednessRow {
            id: SETTINGS_ROW,
            user_handedness: handedness,
        };
        save_row(self.store.as_ref(), TableKind::Handedness, &row, &settings_key()).await?;
        self.services
            .control
            .send(&ControlCommand::ChangeHandedness(handedness))
            .await;
        Ok(())
    }

    /// Pushes the stored mouse axes and handedness.
    pub async fn push_device_settings(&self) -> bool {
        let mouse = *self.mouse.lock().await;
        let handedness = *self.handedness.lock().await;
        let control = &self.services.control;
        control.send(&ControlCommand::AdjustSensitivity(mouse)).await
            && control.send(&ControlCommand::ChangeHandedness(handedness)).await
    }

    pub async fn set_led_config(&self, config: LedConfig) -> Result<bool> {
        self.save_led(config).await?;
        Ok(self.services.led.write_all(&config).await)
    }

    /// Reads the LED configuration off the ring and stores it.
    pub async fn request_led_config(&self) -> Result<Option<LedConfig>> {
        let Some(config) = self.services.led.read_config().await else {
            return Ok(None);
        };
        self.save_led(config).await?;
        Ok(Some(config))
    }

    async fn save_led(&self, config: LedConfig) -> Result<()> {
        *self.led.lock().await = config;
        let row = LedRow {
            id: SETTINGS_ROW,
            config,
        };
        save_row(self.store.as_ref(), TableKind::LedConfiguration, &row, &settings_key()).await
    }

    pub async fn set_streaming(&self, enabled: bool) -> bool {
        self.services.config.set_streaming(enabled).await
    }

    pub async fn battery(&self) -> Option<u8> {
        let level = self.services.battery.read_level().await;
        if level.is_some() {
            *self.battery_level.lock().await = level;
        }
        level
    }

    pub async fn rssi(&self) -> Option<i16> {
        self.gateway.rssi().await
    }

    pub async fn send_command(&self, command: ControlCommand) -> bool {
        self.services.control.send(&command).await
    }

    /// Names a device the ring reported and tells the ring it is accepted.
    pub async fn confirm_device(
        &self,
        device_handle: u8,
        name: &str,
        connection_type: ConnectionType,
    ) -> Result<(), DeviceRegistryError> {
        let device = self
            .devices
            .lock()
            .await
            .confirm(device_handle, name, connection_type)
            .await?;
        self.services
            .control
            .send(&ControlCommand::ConfirmConnection {
                bonding: device.bonding_handle,
                connection_type,
            })
            .await;
        Ok(())
    }

    pub async fn reject_device(&self, device_handle: u8) -> Result<bool, DeviceRegistryError> {
        self.devices
            .lock()
            .await
            .cancel_confirmation(device_handle)
            .await
    }

    /// Forgets a confirmed device here and on the ring. Protected devices are refused.
    pub async fn delete_device(&self, device_handle: u8) -> Result<(), DeviceRegistryError> {
        let bonding = {
            let mut devices = self.devices.lock().await;
            let bonding = devices.bonding_for(device_handle);
            devices.delete_confirmed(device_handle).await?;
            bonding
        };
        self.services
            .control
            .send(&ControlCommand::DeleteBonding(bonding))
            .await;
        Ok(())
    }

    /// Wipes the ring, optionally into ship mode, and forgets it along with every
    /// deletable device.
    pub async fn factory_reset(&self, ship: bool) -> Result<()> {
        self.devices.lock().await.delete_all_except_protected().await?;
        let command = if ship {
            ControlCommand::FactoryResetAndShip
        } else {
            ControlCommand::FactoryReset
        };
        if !self.services.control.send(&command).await {
            warn!("{:?} was not delivered to the ring", command);
        }
        forget_paired_ring(self.store.as_ref()).await?;
        info!("Ring forgotten after {:?}", command);
        Ok(())
    }

    pub async fn ship_mode(&self) -> bool {
        self.services.control.send(&ControlCommand::ShipMode).await
    }
}

#[async_trait]
impl RingReadyCallback for RingManager {
    async fn on_ring_ready(&self, ring: &DeviceIdentity) {
        let version = self.services.device_info.read_version().await;
        *self.version.lock().await = version;
        match self.battery().await {
            Some(level) => info!("Ring {} battery at {}%", ring.id, level),
            None => warn!("Could not read battery of {}", ring.id),
        }
        if !self.services.mode.claim_primary().await {
            warn!("Could not claim primary on {}", ring.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::sleep;

    use super::*;
    use crate::core::bluetooth::constants::CharacteristicId;
    use crate::core::bluetooth::fake::{Call, FakeTransport};
    use crate::core::bluetooth::transport::event_channel;
    use crate::core::bluetooth::types::{ConnectedRing, LinkState, SharedLink, new_shared_link};
    use crate::core::codec::{LED_CONFIG_LEN, LED_CONFIG_READ_HEADER, LedRegister};
    use crate::ring::{Gesture, MappingAction, ModeType, NO_BONDING};
    use crate::storage::MemoryStore;

    struct Fixture {
        fake: Arc<FakeTransport>,
        link: SharedLink,
        bus: Arc<EventBus>,
        store: Arc<MemoryStore>,
        manager: RingManager,
    }

    async fn fixture(ready: bool) -> Fixture {
        let (tx, _rx) = event_channel();
        let fake = FakeTransport::new(tx);
        let link = new_shared_link();
        if ready {
            let mut ring = ConnectedRing::new(DeviceIdentity::new("AA", "Taika Ring"));
            for c in FakeTransport::ring_characteristics() {
                ring.characteristics.insert(c.uuid, c);
            }
            ring.ready = true;
            *link.lock().await = LinkState::Linked(ring);
        }
        let bus = EventBus::new();
        let store = Arc::new(MemoryStore::new());
        let settings = ConnectionSettings {
            led_read_settle_ms: 0,
            mouse_debounce_ms: 30,
            ..ConnectionSettings::default()
        };
        let manager = RingManager::new(
            CharacteristicGateway::new(fake.clone(), link.clone()),
            bus.clone(),
            store.clone(),
            "Desk",
            &settings,
        )
        .await
        .unwrap();
        Fixture {
            fake,
            link,
            bus,
            store,
            manager,
        }
    }

    fn control_writes(fake: &FakeTransport) -> Vec<Vec<u8>> {
        fake.writes_to(CharacteristicId::ControlToServer.uuid())
    }

    #[tokio::test]
    async fn ready_reads_version_and_claims_primary() {
        let f = fixture(true).await;
        f.fake.push_read(CharacteristicId::HardwareRevision.uuid(), b"C.1:B.2".to_vec());
        f.fake.push_read(CharacteristicId::FirmwareRevision.uuid(), b"0x020001".to_vec());

        f.manager.on_ring_ready(&DeviceIdentity::new("AA", "Taika Ring")).await;

        let version = f.manager.firmware_version().await.unwrap();
        assert_eq!(version.firmware_major, 2);
        assert_eq!(version.hardware_touch_letter, "B");
        assert_eq!(f.fake.writes_to(CharacteristicId::ClaimPrimary.uuid()), vec![vec![1]]);
    }

    #[tokio::test]
    async fn ready_reads_battery_once() {
        let f = fixture(true).await;
        let low = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen = low.clone();
        f.bus.subscribe(RingEvent::LOW_BATTERY, move |event| {
            seen.lock().unwrap().push(event.clone())
        });
        f.fake.push_read(CharacteristicId::BatteryLevel.uuid(), vec![9]);

        f.manager.on_ring_ready(&DeviceIdentity::new("AA", "Taika Ring")).await;

        assert_eq!(f.manager.battery_level().await, Some(9));
        assert_eq!(f.fake.count(|c| *c == Call::Read(CharacteristicId::BatteryLevel.uuid())), 1);
        assert_eq!(*low.lock().unwrap(), vec![RingEvent::LowBattery(9)]);
    }

    #[tokio::test]
    async fn slot_swap_is_persisted_and_pushed() {
        let f = fixture(true).await;
        // Presentation Tool into slot 0, displacing Music.
        f.manager.assign_mode_to_slot(3, ModeIndex::ALL[0]).await.unwrap();

        let writes = f.fake.writes_to(CharacteristicId::ModeUpdate.uuid());
        assert_eq!(writes.len(), 1);
        let reloaded = ModeLibrary::load(f.store.as_ref()).await.unwrap();
        assert_eq!(reloaded.slots(), [3, 0, 1]);

        // Mouse into slot 0 swaps with Presentation Tool: both are re-pushed.
        f.fake.clear_calls();
        f.manager.assign_mode_to_slot(1, ModeIndex::ALL[0]).await.unwrap();
        assert_eq!(f.fake.writes_to(CharacteristicId::ModeUpdate.uuid()).len(), 2);
        let reloaded = ModeLibrary::load(f.store.as_ref()).await.unwrap();
        assert_eq!(reloaded.slots(), [1, 0, 3]);
    }

    #[tokio::test]
    async fn changes_are_stored_while_disconnected() {
        let f = fixture(false).await;
        let mapping = GestureMapping::new(Gesture::SingleTap, MappingAction::PlayPause);
        f.manager.set_gesture_mapping(6, mapping).await.unwrap();
        assert!(f.fake.calls().is_empty());

        let reloaded = ModeLibrary::load(f.store.as_ref()).await.unwrap();
        assert_eq!(
            reloaded.mode(6).and_then(|m| m.mapping(Gesture::SingleTap)).map(|m| m.action),
            Some(MappingAction::PlayPause)
        );
    }

    #[tokio::test]
    async fn mapping_outside_mode_type_is_rejected() {
        let f = fixture(true).await;
        let mapping = GestureMapping::new(Gesture::SingleTap, MappingAction::PlayPause);
        assert!(f.manager.set_gesture_mapping(1, mapping).await.is_err());
        assert!(f.fake.writes_to(CharacteristicId::ModeUpdate.uuid()).is_empty());
        let reloaded = ModeLibrary::load(f.store.as_ref()).await.unwrap();
        assert_eq!(reloaded.mode(1).map(|m| m.mode_type), Some(ModeType::ComputerMouse));
    }

    #[tokio::test]
    async fn mouse_burst_is_stored_at_once_and_pushed_once() {
        let f = fixture(true).await;
        let mut sensitivity = MouseSensitivity::default();
        for speed in 1..=4 {
            sensitivity.x_speed = speed as f32;
            f.manager.set_mouse_sensitivity(sensitivity).await.unwrap();
        }
        let stored: Option<MouseRow> =
            load_row(f.store.as_ref(), TableKind::MouseConfiguration, &settings_key())
                .await
                .unwrap();
        assert_eq!(stored.map(|r| r.sensitivity.x_speed), Some(4.0));

        sleep(Duration::from_millis(150)).await;
        assert_eq!(
            control_writes(&f.fake),
            vec![ControlCommand::AdjustSensitivity(sensitivity).to_bytes()]
        );
    }

    #[tokio::test]
    async fn settings_survive_reload() {
        let f = fixture(false).await;
        f.manager.set_handedness(Handedness::LeftHanded).await.unwrap();
        let mut led = LedConfig::default();
        led.color.g = 200;
        assert!(!f.manager.set_led_config(led).await.unwrap());

        let settings = ConnectionSettings::default();
        let again = RingManager::new(
            CharacteristicGateway::new(f.fake.clone(), f.link.clone()),
            f.bus.clone(),
            f.store.clone(),
            "Desk",
            &settings,
        )
        .await
        .unwrap();
        assert_eq!(again.handedness().await, Handedness::LeftHanded);
        assert_eq!(again.led_config().await.color.g, 200);
    }

    #[tokio::test]
    async fn led_round_trip_through_ring() {
        let f = fixture(true).await;
        assert!(f.manager.set_led_config(LedConfig::default()).await.unwrap());
        assert_eq!(
            f.fake.writes_to(CharacteristicId::LedControl.uuid()).len(),
            LedRegister::ALL.len()
        );

        let mut raw = vec![0u8; LED_CONFIG_LEN];
        raw[0] = LED_CONFIG_READ_HEADER;
        raw[7] = 9;
        f.fake.push_read(CharacteristicId::LedControl.uuid(), raw);
        let read = f.manager.request_led_config().await.unwrap().unwrap();
        assert_eq!(read.color.r, 9);
        assert_eq!(f.manager.led_config().await.color.r, 9);
    }

    #[tokio::test]
    async fn registry_follows_ring_reports() {
        let f = fixture(true).await;
        let sync = f.manager.spawn_registry_sync();

        f.bus.publish(&RingEvent::BecamePrimary { bonding: 2 });
        f.bus.publish(&RingEvent::DeviceConfirmationNeeded {
            bonding: 5,
            connection_type: ConnectionType::Computer,
        });
        sleep(Duration::from_millis(50)).await;

        {
            let devices = f.manager.devices();
            let devices = devices.lock().await;
            assert_eq!(devices.self_bonding_handle(), 2);
            assert_eq!(devices.device(0).map(|d| d.name.as_str()), Some("Desk"));
            assert_eq!(devices.unconfirmed().len(), 1);
        }

        let handle = f.manager.devices().lock().await.unconfirmed()[0].device_handle;
        f.manager
            .confirm_device(handle, "Laptop", ConnectionType::Computer)
            .await
            .unwrap();
        assert_eq!(
            control_writes(&f.fake),
            vec![ControlCommand::ConfirmConnection {
                bonding: 5,
                connection_type: ConnectionType::Computer,
            }
            .to_bytes()]
        );

        f.bus.publish(&RingEvent::BondingListChanged(vec![2]));
        sleep(Duration::from_millis(50)).await;
        assert!(f.manager.devices().lock().await.device(handle).is_none());
        sync.abort();
    }

    #[tokio::test]
    async fn protected_device_is_not_deleted() {
        let f = fixture(true).await;
        assert!(matches!(
            f.manager.delete_device(0).await,
            Err(DeviceRegistryError::Protected(0))
        ));
        assert!(control_writes(&f.fake).is_empty());
    }

    #[tokio::test]
    async fn factory_reset_forgets_the_ring() {
        let f = fixture(true).await;
        let handle = f
            .manager
            .devices()
            .lock()
            .await
            .add_confirmed("Tablet", ConnectionType::Computer, 7, None)
            .await
            .unwrap();

        f.manager.factory_reset(true).await.unwrap();

        assert!(f.manager.devices().lock().await.device(handle).is_none());
        assert_eq!(
            control_writes(&f.fake),
            vec![ControlCommand::FactoryResetAndShip.to_bytes()]
        );
        let paired = crate::core::bluetooth::connection::load_paired_ring(f.store.as_ref()).await;
        assert!(paired.is_unset());
        assert_eq!(f.manager.devices().lock().await.bonding_for(handle), NO_BONDING);
    }
}
