//! Bluetooth functionality for the Taika Ring Bridge
//! This module handles everything between the adapter and the ring: scanning,
//! the connection lifecycle, characteristic I/O and the typed ring services.

mod bluest_transport;
mod commands;
mod connection;
mod constants;
mod diagnostics;
#[cfg(test)]
pub(crate) mod fake;
mod gateway;
mod manager;
mod notification;
mod scanner;
mod services;
mod transport;
mod types;

pub use bluest_transport::BluestTransport;
pub use commands::ControlCommand;
pub use connection::{
    Backoff, ConnectionStateMachine, RingReadyCallback, forget_paired_ring, load_paired_ring,
};
pub use constants::*;
pub use diagnostics::{log_ring_error, log_touchpad_frame};
pub use gateway::{CharacteristicGateway, decode_value, encode_value};
pub use manager::RingManager;
pub use notification::NotificationRouter;
pub use scanner::{BluetoothScanner, DeviceFilter};
pub use services::{
    BatteryService, ConfigService, ControlService, DeviceInfoService, LedService, ModeService,
    RingServices,
};
pub use transport::{
    AdapterState, Advertisement, DiscoveredCharacteristic, RingTransport, TransportEvent,
    TransportEventReceiver, TransportEventSender, event_channel, monitor_transaction_id,
};
pub use types::{ConnectedRing, ConnectionState, LinkState, SharedLink, new_shared_link};
