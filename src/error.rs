//! Error types shared across the ring driver.
//! Application plumbing uses `anyhow`; these enums mark the typed boundaries.

use thiserror::Error;

use crate::core::bluetooth::CharacteristicId;
use crate::ring::{MappingAction, ModeType};

/// A payload could not be decoded. Decoding never yields a partial value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("payload too short: expected at least {expected} bytes, got {actual}")]
    TooShort { expected: usize, actual: usize },
    #[error("unexpected header byte: expected {expected:#04x}, got {actual:#04x}")]
    BadHeader { expected: u8, actual: u8 },
}

impl DecodeError {
    /// Checks `bytes` against a minimum length.
    pub fn ensure_len(bytes: &[u8], expected: usize) -> Result<(), DecodeError> {
        if bytes.len() < expected {
            return Err(DecodeError::TooShort {
                expected,
                actual: bytes.len(),
            });
        }
        Ok(())
    }
}

/// Failures reported by the radio transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("operation was cancelled")]
    Cancelled,
    #[error("device disconnected")]
    Disconnected,
    #[error("bluetooth adapter unavailable")]
    AdapterUnavailable,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("value encoding error: {0}")]
    Encoding(String),
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Errors that happen as a normal side effect of tearing a link down.
    pub fn is_expected_teardown(&self) -> bool {
        matches!(self, TransportError::Cancelled | TransportError::Disconnected)
    }
}

/// Reasons a characteristic read or write was refused or failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("no ring connected")]
    NotConnected,
    #[error("ring connected but not ready yet")]
    NotReady,
    #[error("characteristic {0} was not discovered on the connected ring")]
    UnknownCharacteristic(CharacteristicId),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Mode library errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SlotError {
    #[error("no mode with unique id {0}")]
    UnknownMode(u32),
    #[error("mode {0} is in more than one slot")]
    DuplicateSlot(u32),
    #[error("{action:?} is not available in {mode_type:?} modes")]
    DisallowedAction {
        mode_type: ModeType,
        action: MappingAction,
    },
}

/// Errors from the connected-devices registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceRegistryError {
    #[error("a device with bonding handle {0} is already waiting for confirmation")]
    DuplicateBonding(u8),
    #[error("no unconfirmed device with device handle {0}")]
    UnknownUnconfirmed(u8),
    #[error("no device with device handle {0}")]
    UnknownDevice(u8),
    #[error("device handle {0} is protected and cannot be deleted")]
    Protected(u8),
    #[error("device handle {0} is already taken")]
    HandleTaken(u8),
    #[error("a device named '{0}' already exists")]
    DuplicateName(String),
    #[error("no free device handle left")]
    HandlesExhausted,
    #[error("storage failure: {0}")]
    Storage(String),
}

impl From<anyhow::Error> for DeviceRegistryError {
    fn from(error: anyhow::Error) -> Self {
        DeviceRegistryError::Storage(error.to_string())
    }
}
