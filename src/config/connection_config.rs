use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::bluetooth::{
    Backoff, DEFAULT_SIGNAL_FLOOR, LED_READ_SETTLE_MS, LOW_BATTERY_THRESHOLD,
    MOUSE_CONFIG_DEBOUNCE_MS, RETRY_BACKOFF_INITIAL_MS, RETRY_BACKOFF_MAX_MS, RING_PRODUCT_NAME,
    UUID_DATA_SERVICE,
};

/// How the bridge finds, connects to and talks with the ring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Advertised name an unpaired ring must contain.
    pub product_name: String,
    /// Unpaired rings must advertise with an RSSI above this, in dBm.
    pub signal_floor: i16,
    pub scan_service_filter: Uuid,
    pub retry_backoff_initial_ms: u64,
    pub retry_backoff_max_ms: u64,
    /// Wait between requesting the LED configuration and reading it back.
    pub led_read_settle_ms: u64,
    pub mouse_debounce_ms: u64,
    /// Battery percentage at or below which `lowBattery` is published.
    pub low_battery_threshold: u8,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            product_name: RING_PRODUCT_NAME.to_string(),
            signal_floor: DEFAULT_SIGNAL_FLOOR,
            scan_service_filter: UUID_DATA_SERVICE,
            retry_backoff_initial_ms: RETRY_BACKOFF_INITIAL_MS,
            retry_backoff_max_ms: RETRY_BACKOFF_MAX_MS,
            led_read_settle_ms: LED_READ_SETTLE_MS,
            mouse_debounce_ms: MOUSE_CONFIG_DEBOUNCE_MS,
            low_battery_threshold: LOW_BATTERY_THRESHOLD,
        }
    }
}

impl ConnectionSettings {
    pub fn backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_millis(self.retry_backoff_initial_ms),
            Duration::from_millis(self.retry_backoff_max_ms),
        )
    }

    pub fn led_settle(&self) -> Duration {
        Duration::from_millis(self.led_read_settle_ms)
    }

    pub fn mouse_debounce(&self) -> Duration {
        Duration::from_millis(self.mouse_debounce_ms)
    }
}
