//! Taika Ring Bridge library
//! Host-side driver for the Taika smart ring: discovery, connection lifecycle,
//! characteristic I/O, packet codecs and the ring's persisted configuration.

pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod platform;
pub mod ring;
pub mod state;
pub mod storage;
pub mod utils;

pub use state::AppState;
