//! Typed wrappers over the characteristic gateway, one per ring service.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::time::sleep;

use crate::core::bluetooth::commands::ControlCommand;
use crate::core::bluetooth::constants::{
    CharacteristicId, LED_READ_SETTLE_MS, LOW_BATTERY_THRESHOLD,
};
use crate::core::bluetooth::gateway::CharacteristicGateway;
use crate::core::codec::{
    LED_CONFIG_READ_HEADER, LedConfig, LedRegister, RingVersion, decode_led_config,
    encode_led_register, encode_ring_mode, parse_ring_version,
};
use crate::core::events::{EventBus, RingEvent};
use crate::ring::{ConnectedDevices, RingMode, resolve_for_ring};

const STREAMING_FLAG: u8 = 0x80;
const STREAM_DATA: u8 = 0x02;

pub struct ControlService {
    gateway: CharacteristicGateway,
}

impl ControlService {
    pub fn new(gateway: CharacteristicGateway) -> Self {
        Self { gateway }
    }

    pub async fn send(&self, command: &ControlCommand) -> bool {
        debug!("Sending {:?}", command);
        self.gateway
            .write(CharacteristicId::ControlToServer, &command.to_bytes())
            .await
    }
}

pub struct ModeService {
    gateway: CharacteristicGateway,
}

impl ModeService {
    pub fn new(gateway: CharacteristicGateway) -> Self {
        Self { gateway }
    }

    /// Writes `mode` into its slot after resolving device handles to bonding handles.
    pub async fn update_mode_for_index(&self, mode: &RingMode, devices: &ConnectedDevices) -> bool {
        let packet = encode_ring_mode(&resolve_for_ring(mode, devices));
        let written = self.gateway.write(CharacteristicId::ModeUpdate, &packet).await;
        if written {
            info!("Mode {} pushed to slot {}", mode.name, mode.mode_index.value());
        }
        written
    }

    pub async fn claim_primary(&self) -> bool {
        self.gateway.write(CharacteristicId::ClaimPrimary, &[1]).await
    }
}

pub struct BatteryService {
    gateway: CharacteristicGateway,
    bus: Arc<EventBus>,
    low_threshold: u8,
}

impl BatteryService {
    pub fn new(gateway: CharacteristicGateway, bus: Arc<EventBus>, low_threshold: u8) -> Self {
        Self {
            gateway,
            bus,
            low_threshold,
        }
    }

    /// Reads the level in percent. Publishes `lowBattery` at or under the threshold.
    pub async fn read_level(&self) -> Option<u8> {
        let bytes = self.gateway.read(CharacteristicId::BatteryLevel).await?;
        let Some(&level) = bytes.first() else {
            warn!("Empty battery level value");
            return None;
        };
        if level <= self.low_threshold {
            self.bus.publish(&RingEvent::LowBattery(level));
        }
        Some(level)
    }
}

pub struct DeviceInfoService {
    gateway: CharacteristicGateway,
}

impl DeviceInfoService {
    pub fn new(gateway: CharacteristicGateway) -> Self {
        Self { gateway }
    }

    /// Hardware and firmware revisions. Unparseable strings yield the default version.
    pub async fn read_version(&self) -> Option<RingVersion> {
        let hardware = self.gateway.read(CharacteristicId::HardwareRevision).await?;
        let firmware = self.gateway.read(CharacteristicId::FirmwareRevision).await?;
        match parse_ring_version(&hardware, &firmware) {
            Some(version) => {
                info!("Ring version {}", version);
                Some(version)
            }
            None => {
                warn!(
                    "Could not parse ring version from {:?} / {:?}",
                    String::from_utf8_lossy(&hardware),
                    String::from_utf8_lossy(&firmware)
                );
                Some(RingVersion::default())
            }
        }
    }
}

pub struct ConfigService {
    gateway: CharacteristicGateway,
}

impl ConfigService {
    pub fn new(gateway: CharacteristicGateway) -> Self {
        Self { gateway }
    }

    pub async fn set_streaming(&self, enabled: bool) -> bool {
        let first = if enabled {
            STREAMING_FLAG | STREAM_DATA
        } else {
            STREAMING_FLAG
        };
        self.gateway
            .write(CharacteristicId::AppConfig, &[first, 0, 0, 0, 0])
            .await
    }
}

pub struct LedService {
    gateway: CharacteristicGateway,
    settle: Duration,
}

impl LedService {
    pub fn new(gateway: CharacteristicGateway, settle: Duration) -> Self {
        Self { gateway, settle }
    }

    pub async fn write_register(&self, config: &LedConfig, register: LedRegister) -> bool {
        self.gateway
            .write(CharacteristicId::LedControl, &encode_led_register(config, register))
            .await
    }

    /// Writes every register; stops at the first failure.
    pub async fn write_all(&self, config: &LedConfig) -> bool {
        for register in LedRegister::ALL {
            if !self.write_register(config, register).await {
                return false;
            }
        }
        true
    }

    pub async fn read_config(&self) -> Option<LedConfig> {
        if !self
            .gateway
            .write(CharacteristicId::LedControl, &[LED_CONFIG_READ_HEADER])
            .await
        {
            return None;
        }
        sleep(self.settle).await;
        let bytes = self.gateway.read(CharacteristicId::LedControl).await?;
        match decode_led_config(&bytes) {
            Ok(config) => Some(config),
            Err(e) => {
                warn!("LED configuration read-back rejected: {}", e);
                None
            }
        }
    }
}

/// Every service of the ring, sharing one gateway.
pub struct RingServices {
    pub control: ControlService,
    pub mode: ModeService,
    pub battery: BatteryService,
    pub device_info: DeviceInfoService,
    pub config: ConfigService,
    pub led: LedService,
}

impl RingServices {
    pub fn new(gateway: CharacteristicGateway, bus: Arc<EventBus>) -> Self {
        Self::with_settings(
            gateway,
            bus,
            LOW_BATTERY_THRESHOLD,
            Duration::from_millis(LED_READ_SETTLE_MS),
        )
    }

    pub fn with_settings(
        gateway: CharacteristicGateway,
        bus: Arc<EventBus>,
        low_battery_threshold: u8,
        led_settle: Duration,
    ) -> Self {
        Self {
            control: ControlService::new(gateway.clone()),
            mode: ModeService::new(gateway.clone()),
            battery: BatteryService::new(gateway.clone(), bus, low_battery_threshold),
            device_info: DeviceInfoService::new(gateway.clone()),
            config: ConfigService::new(gateway.clone()),
            led: LedService::new(gateway, led_settle),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::core::bluetooth::fake::{Call, FakeTransport};
    use crate::core::bluetooth::transport::event_channel;
    use crate::core::bluetooth::types::{ConnectedRing, LinkState, new_shared_link};
    use crate::core::codec::RING_MODE_PACKET_LEN;
    use crate::ring::{ConnectionType, DeviceIdentity, ModeLibrary, ModeType};
    use crate::storage::MemoryStore;

    async fn ready_services() -> (Arc<FakeTransport>, Arc<EventBus>, RingServices) {
        let (tx, _rx) = event_channel();
        let fake = FakeTransport::new(tx);
        let link = new_shared_link();
        let mut ring = ConnectedRing::new(DeviceIdentity::new("AA", "Taika Ring"));
        for c in FakeTransport::ring_characteristics() {
            ring.characteristics.insert(c.uuid, c);
        }
        ring.ready = true;
        *link.lock().await = LinkState::Linked(ring);
        let bus = EventBus::new();
        let gateway = CharacteristicGateway::new(fake.clone(), link);
        let services = RingServices::with_settings(gateway, bus.clone(), 20, Duration::ZERO);
        (fake, bus, services)
    }

    #[tokio::test]
    async fn streaming_toggle_bytes() {
        let (fake, _, services) = ready_services().await;
        assert!(services.config.set_streaming(true).await);
        assert!(services.config.set_streaming(false).await);
        assert_eq!(
            fake.writes_to(CharacteristicId::AppConfig.uuid()),
            vec![vec![0x82, 0, 0, 0, 0], vec![0x80, 0, 0, 0, 0]]
        );
    }

    #[tokio::test]
    async fn low_battery_is_published() {
        let (fake, bus, services) = ready_services().await;
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        bus.subscribe(RingEvent::LOW_BATTERY, move |event| {
            sink.lock().unwrap().push(event.clone());
        });

        fake.push_read(CharacteristicId::BatteryLevel.uuid(), vec![64]);
        fake.push_read(CharacteristicId::BatteryLevel.uuid(), vec![20]);
        assert_eq!(services.battery.read_level().await, Some(64));
        assert_eq!(services.battery.read_level().await, Some(20));
        assert_eq!(*seen.lock().unwrap(), vec![RingEvent::LowBattery(20)]);
    }

    #[tokio::test]
    async fn version_falls_back_to_default() {
        let (fake, _, services) = ready_services().await;
        fake.push_read(CharacteristicId::HardwareRevision.uuid(), b"B.2:A.1".to_vec());
        fake.push_read(CharacteristicId::FirmwareRevision.uuid(), b"0x010203".to_vec());
        let version = services.device_info.read_version().await.unwrap();
        assert_eq!(version.hardware_main_letter, "B");
        assert_eq!(version.firmware_patch, 3);

        fake.push_read(CharacteristicId::HardwareRevision.uuid(), b"garbage".to_vec());
        fake.push_read(CharacteristicId::FirmwareRevision.uuid(), b"1.2.3".to_vec());
        assert_eq!(services.device_info.read_version().await, Some(RingVersion::default()));
    }

    #[tokio::test]
    async fn led_read_back_requests_then_reads() {
        let (fake, _, services) = ready_services().await;
        let mut raw = vec![0u8; crate::core::codec::LED_CONFIG_LEN];
        raw[0] = LED_CONFIG_READ_HEADER;
        fake.push_read(CharacteristicId::LedControl.uuid(), raw);

        assert!(services.led.read_config().await.is_some());
        assert_eq!(
            fake.writes_to(CharacteristicId::LedControl.uuid()),
            vec![vec![LED_CONFIG_READ_HEADER]]
        );
        let calls = fake.calls();
        let write = calls.iter().position(|c| matches!(c, Call::Write { .. }));
        let read = calls.iter().position(|c| matches!(c, Call::Read(_)));
        assert!(write < read);
    }

    #[tokio::test]
    async fn led_write_all_covers_every_register() {
        let (fake, _, services) = ready_services().await;
        assert!(services.led.write_all(&LedConfig::default()).await);
        let writes = fake.writes_to(CharacteristicId::LedControl.uuid());
        let ids: Vec<u8> = writes.iter().map(|w| w[0]).collect();
        assert_eq!(ids, LedRegister::ALL.iter().map(|r| *r as u8).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn mode_push_resolves_bondings() {
        let (fake, _, services) = ready_services().await;
        let store = Arc::new(MemoryStore::new());
        let mut devices = ConnectedDevices::load(store, "Desk").await.unwrap();
        devices.update_bonding_handle(0, 4).await.unwrap();
        let library = ModeLibrary::with_defaults();
        let mouse = library
            .active_modes()
            .into_iter()
            .find(|m| m.mode_type == ModeType::ComputerMouse)
            .unwrap();

        assert!(services.mode.update_mode_for_index(&mouse, &devices).await);
        assert!(services.mode.claim_primary().await);

        let writes = fake.writes_to(CharacteristicId::ModeUpdate.uuid());
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].len(), RING_MODE_PACKET_LEN);
        assert_eq!(writes[0], encode_ring_mode(&resolve_for_ring(&mouse, &devices)).to_vec());
        assert_eq!(fake.writes_to(CharacteristicId::ClaimPrimary.uuid()), vec![vec![1]]);
        assert_eq!(
            devices.device(0).map(|d| d.connection_type),
            Some(ConnectionType::PrimaryPhone)
        );
    }

    #[tokio::test]
    async fn control_commands_go_to_control_characteristic() {
        let (fake, _, services) = ready_services().await;
        assert!(services.control.send(&ControlCommand::DeleteBonding(3)).await);
        assert_eq!(
            fake.writes_to(CharacteristicId::ControlToServer.uuid()),
            vec![ControlCommand::DeleteBonding(3).to_bytes()]
        );
    }
}
