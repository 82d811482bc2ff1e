//! Core functionality for the Taika Ring Bridge
//! Packet codecs, the Bluetooth stack and the in-process event plumbing.

pub mod bluetooth;
pub mod codec;
pub mod debounce;
pub mod events;

pub use bluetooth::{ConnectionStateMachine, RingManager};
pub use events::{EventBus, RingEvent};
