//! Ring domain model: modes, gesture mappings and the devices bonded with the ring.

mod devices;
mod modes;
mod types;

pub use devices::{ConnectedDevice, ConnectedDevices, UNCONFIRMED_DEVICE_NAME};
pub use modes::{DEFAULT_SLOTS, ModeLibrary, default_mappings, default_modes, resolve_for_ring};
pub use types::*;
