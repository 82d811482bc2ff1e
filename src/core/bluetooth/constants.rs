//! Constants used throughout the ring driver
//! Service and characteristic UUIDs of the Taika ring, plus the tuning
//! values shared by the connection layer.

use std::fmt;

use uuid::Uuid;

/// Product name token expected in the advertised name of an unpaired ring.
pub const RING_PRODUCT_NAME: &str = "Taika Ring";

/// Ring signal must be stronger than this while pairing for the first time.
pub const DEFAULT_SIGNAL_FLOOR: i16 = -60;

/// Standard Bluetooth Service UUIDs
pub const UUID_DEVICE_INFORMATION_SERVICE: Uuid =
    Uuid::from_u128(0x0000180a_0000_1000_8000_00805f9b34fb);
pub const UUID_BATTERY_SERVICE: Uuid = Uuid::from_u128(0x0000180f_0000_1000_8000_00805f9b34fb);

/// Standard Bluetooth Characteristic UUIDs
pub const UUID_BATTERY_LEVEL: Uuid = Uuid::from_u128(0x00002a19_0000_1000_8000_00805f9b34fb);
pub const UUID_HARDWARE_REVISION: Uuid = Uuid::from_u128(0x00002a27_0000_1000_8000_00805f9b34fb);
pub const UUID_FIRMWARE_REVISION: Uuid = Uuid::from_u128(0x00002a26_0000_1000_8000_00805f9b34fb);

/// Ring control service
pub const UUID_CONTROL_SERVICE: Uuid = Uuid::from_u128(0xdc374d70_77bc_4f4e_8c7e_047f09f8e883);
pub const UUID_CONTROL_TO_SERVER: Uuid = Uuid::from_u128(0xa6d93476_f864_44f7_8197_a2cc089ffa7b);
pub const UUID_CONTROL_TO_CLIENT: Uuid = Uuid::from_u128(0x2d193527_cd1f_4eb6_bd6c_9d47bcd00019);

/// Mode service
pub const UUID_MODE_SERVICE: Uuid = Uuid::from_u128(0x869309e1_2649_483a_b9a8_2c4047987325);
pub const UUID_APPLY_USER_MODE: Uuid = Uuid::from_u128(0x28ae7e63_48e8_4ed5_9d20_473f4cbebbc1);
pub const UUID_UPDATE_MODE_FOR_INDEX: Uuid =
    Uuid::from_u128(0x199792a7_7e83_487a_9bf2_5b06ba48235e);
pub const UUID_CLAIM_PRIMARY: Uuid = Uuid::from_u128(0x5fcf6df9_7113_4df1_b163_0c3de91db165);

/// Data service. Also the service every ring advertises, so scans filter on it.
pub const UUID_DATA_SERVICE: Uuid = Uuid::from_u128(0x2d9c938c_4161_4ce7_bfef_3907998c9f4e);
pub const UUID_IMU_DATA: Uuid = Uuid::from_u128(0x2e3283c4_c0ac_4d18_acc4_fd17803b624b);
pub const UUID_TOUCHPAD_DEBUG: Uuid = Uuid::from_u128(0xdfe0cb08_1a2c_4063_9525_ed771b076eef);

/// Combined touch and motion update service
pub const UUID_UPDATE_SERVICE: Uuid = Uuid::from_u128(0x71f66364_797b_4e2b_b286_b97cdc04940d);
pub const UUID_COMBINED_UPDATE: Uuid = Uuid::from_u128(0x14205919_23a5_4be8_ab28_fa2b29d0b9b0);

/// LED service
pub const UUID_LED_SERVICE: Uuid = Uuid::from_u128(0xef6779a1_0566_4917_a12d_7388d7727d64);
pub const UUID_LED_RGB: Uuid = Uuid::from_u128(0x373a0e9b_5789_4439_90a9_9b6ae5d5f1a5);
pub const UUID_LED_PERIODIC: Uuid = Uuid::from_u128(0x7513a1e4_cda3_4f01_8237_f220263dc5d2);
pub const UUID_LED_FLASH_SEQUENCE: Uuid = Uuid::from_u128(0xa9ed9a57_82fc_4a4c_b563_cadae5f364ea);
pub const UUID_LED_CONTROL: Uuid = Uuid::from_u128(0x751ec71e_c52c_40a2_9ec8_9fd5c9fbead8);

/// Over-the-air update service
pub const UUID_OTA_SERVICE: Uuid = Uuid::from_u128(0x1d14d6ee_fd63_4fa1_bfa4_8f47b42119f0);
pub const UUID_OTA_CONTROL: Uuid = Uuid::from_u128(0xf7bf3564_fb6d_4e53_88a4_5e37e0326063);
pub const UUID_OTA_DATA: Uuid = Uuid::from_u128(0x984227f3_34fc_4045_a5d0_2c581f81a153);

/// Application configuration service
pub const UUID_CONFIG_SERVICE: Uuid = Uuid::from_u128(0xa0f5e4ad_da0f_4b83_8e39_0f55260b2320);
pub const UUID_APP_CONFIG: Uuid = Uuid::from_u128(0x98dd72f0_e06a_4645_b47c_7ec7022aafb7);

/// Delay between writing the LED read request and reading the response
pub const LED_READ_SETTLE_MS: u64 = 100;

/// First delay before retrying a failed scan or connection
pub const RETRY_BACKOFF_INITIAL_MS: u64 = 250;

/// Upper bound on the retry delay
pub const RETRY_BACKOFF_MAX_MS: u64 = 8000;

/// Quiet period before a mouse sensitivity change is pushed
pub const MOUSE_CONFIG_DEBOUNCE_MS: u64 = 200;

/// Battery level (percent) at or below which `lowBattery` is published
pub const LOW_BATTERY_THRESHOLD: u8 = 20;

/// How a characteristic is used by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Directionality {
    pub read: bool,
    pub write: bool,
    pub write_without_response: bool,
    pub notify: bool,
}

impl Directionality {
    const fn new(read: bool, write: bool, write_without_response: bool, notify: bool) -> Self {
        Self {
            read,
            write,
            write_without_response,
            notify,
        }
    }
}

/// Every characteristic the driver talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CharacteristicId {
    ControlToServer,
    ControlToClient,
    ApplyUserMode,
    ModeUpdate,
    ClaimPrimary,
    ImuData,
    TouchpadDebug,
    CombinedUpdate,
    BatteryLevel,
    HardwareRevision,
    FirmwareRevision,
    LedRgb,
    LedPeriodic,
    LedFlashSequence,
    LedControl,
    OtaControl,
    OtaData,
    AppConfig,
}

impl CharacteristicId {
    pub const ALL: [CharacteristicId; 18] = [
        CharacteristicId::ControlToServer,
        CharacteristicId::ControlToClient,
        CharacteristicId::ApplyUserMode,
        CharacteristicId::ModeUpdate,
        CharacteristicId::ClaimPrimary,
        CharacteristicId::ImuData,
        CharacteristicId::TouchpadDebug,
        CharacteristicId::CombinedUpdate,
        CharacteristicId::BatteryLevel,
        CharacteristicId::HardwareRevision,
        CharacteristicId::FirmwareRevision,
        CharacteristicId::LedRgb,
        CharacteristicId::LedPeriodic,
        CharacteristicId::LedFlashSequence,
        CharacteristicId::LedControl,
        CharacteristicId::OtaControl,
        CharacteristicId::OtaData,
        CharacteristicId::AppConfig,
    ];

    pub fn uuid(self) -> Uuid {
        match self {
            CharacteristicId::ControlToServer => UUID_CONTROL_TO_SERVER,
            CharacteristicId::ControlToClient => UUID_CONTROL_TO_CLIENT,
            CharacteristicId::ApplyUserMode => UUID_APPLY_USER_MODE,
            CharacteristicId::ModeUpdate => UUID_UPDATE_MODE_FOR_INDEX,
            CharacteristicId::ClaimPrimary => UUID_CLAIM_PRIMARY,
            CharacteristicId::ImuData => UUID_IMU_DATA,
            CharacteristicId::TouchpadDebug => UUID_TOUCHPAD_DEBUG,
            CharacteristicId::CombinedUpdate => UUID_COMBINED_UPDATE,
            CharacteristicId::BatteryLevel => UUID_BATTERY_LEVEL,
            CharacteristicId::HardwareRevision => UUID_HARDWARE_REVISION,
            CharacteristicId::FirmwareRevision => UUID_FIRMWARE_REVISION,
            CharacteristicId::LedRgb => UUID_LED_RGB,
            CharacteristicId::LedPeriodic => UUID_LED_PERIODIC,
            CharacteristicId::LedFlashSequence => UUID_LED_FLASH_SEQUENCE,
            CharacteristicId::LedControl => UUID_LED_CONTROL,
            CharacteristicId::OtaControl => UUID_OTA_CONTROL,
            CharacteristicId::OtaData => UUID_OTA_DATA,
            CharacteristicId::AppConfig => UUID_APP_CONFIG,
        }
    }

    pub fn service(self) -> Uuid {
        match self {
            CharacteristicId::ControlToServer | CharacteristicId::ControlToClient => {
                UUID_CONTROL_SERVICE
            }
            CharacteristicId::ApplyUserMode
            | CharacteristicId::ModeUpdate
            | CharacteristicId::ClaimPrimary => {
                UUID_MODE_SERVICE
            }
            CharacteristicId::ImuData | CharacteristicId::TouchpadDebug => UUID_DATA_SERVICE,
            CharacteristicId::CombinedUpdate => UUID_UPDATE_SERVICE,
            CharacteristicId::BatteryLevel => UUID_BATTERY_SERVICE,
            CharacteristicId::HardwareRevision | CharacteristicId::FirmwareRevision => {
                UUID_DEVICE_INFORMATION_SERVICE
            }
            CharacteristicId::LedRgb
            | CharacteristicId::LedPeriodic
            | CharacteristicId::LedFlashSequence
            | CharacteristicId::LedControl => UUID_LED_SERVICE,
            CharacteristicId::OtaControl | CharacteristicId::OtaData => UUID_OTA_SERVICE,
            CharacteristicId::AppConfig => UUID_CONFIG_SERVICE,
        }
    }

    pub fn directionality(self) -> Directionality {
        match self {
            CharacteristicId::ControlToServer => Directionality::new(false, true, false, false),
            CharacteristicId::ControlToClient => Directionality::new(true, false, false, true),
            CharacteristicId::ApplyUserMode | CharacteristicId::ModeUpdate => {
                Directionality::new(false, true, false, false)
            }
            CharacteristicId::ClaimPrimary => Directionality::new(true, true, false, true),
            CharacteristicId::ImuData
            | CharacteristicId::TouchpadDebug
            | CharacteristicId::CombinedUpdate => Directionality::new(false, false, false, true),
            CharacteristicId::BatteryLevel => Directionality::new(true, false, false, true),
            CharacteristicId::HardwareRevision | CharacteristicId::FirmwareRevision => {
                Directionality::new(true, false, false, false)
            }
            CharacteristicId::LedRgb
            | CharacteristicId::LedPeriodic
            | CharacteristicId::LedFlashSequence => Directionality::new(false, true, false, false),
            CharacteristicId::LedControl | CharacteristicId::AppConfig => {
                Directionality::new(true, true, false, false)
            }
            CharacteristicId::OtaControl => Directionality::new(false, true, false, true),
            CharacteristicId::OtaData => Directionality::new(false, false, true, false),
        }
    }

    pub fn from_uuid(uuid: Uuid) -> Option<Self> {
        Self::ALL.into_iter().find(|id| id.uuid() == uuid)
    }
}

impl fmt::Display for CharacteristicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({})", self, self.uuid())
    }
}
