//! Notification handling for the ring
//! Turns raw notifications into typed events on the bus.

use std::sync::Arc;

use log::{debug, info, warn};
use uuid::Uuid;

use crate::core::bluetooth::constants::CharacteristicId;
use crate::core::bluetooth::diagnostics::{log_ring_error, log_touchpad_frame};
use crate::core::codec::{
    decode_incremental_action, decode_mode_action, decode_motion, decode_touch,
};
use crate::core::events::{EventBus, RingEvent};
use crate::ring::ConnectionType;

/// Command ids in byte 0 of control-to-client notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ControlToClient {
    ConfirmConnection = 0x00,
    UpdateState = 0x01,
    PerformModeAction = 0x02,
    HardwareVersionings = 0x03,
    ConfirmedBondings = 0x04,
    SuccessfulBonding = 0x05,
    PerformIncrementalModeAction = 0x06,
    UpdateError = 0x07,
    UpdateConfirmedConnections = 0x08,
}

impl ControlToClient {
    pub fn from_wire(value: u8) -> Option<Self> {
        use ControlToClient::*;
        [
            ConfirmConnection,
            UpdateState,
            PerformModeAction,
            HardwareVersionings,
            ConfirmedBondings,
            SuccessfulBonding,
            PerformIncrementalModeAction,
            UpdateError,
            UpdateConfirmedConnections,
        ]
        .into_iter()
        .find(|cmd| *cmd as u8 == value)
    }
}

/// Routes notifications by characteristic to the matching decoder.
#[derive(Clone)]
pub struct NotificationRouter {
    bus: Arc<EventBus>,
}

impl NotificationRouter {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self { bus }
    }

    /// Decodes `bytes` from `characteristic`, publishes the resulting events
    /// and returns them. Malformed or unknown input yields no events.
    pub fn route(&self, characteristic: Uuid, bytes: &[u8]) -> Vec<RingEvent> {
        let events = match CharacteristicId::from_uuid(characteristic) {
            Some(CharacteristicId::ControlToClient) => Self::control_to_client(bytes),
            Some(CharacteristicId::ClaimPrimary) => Self::claim_primary(bytes),
            Some(CharacteristicId::CombinedUpdate) => Self::stream_update(bytes),
            Some(CharacteristicId::TouchpadDebug) => {
                log_touchpad_frame(bytes);
                Vec::new()
            }
            Some(CharacteristicId::ModeUpdate) => {
                info!("Mode update notification: {:?}", bytes);
                Vec::new()
            }
            Some(id) => {
                debug!("No handler for notifications from {:?}", id);
                Vec::new()
            }
            None => {
                warn!("Notification from unknown characteristic {}", characteristic);
                Vec::new()
            }
        };

        for event in &events {
            self.bus.publish(event);
        }
        events
    }

    fn control_to_client(bytes: &[u8]) -> Vec<RingEvent> {
        let Some((command, payload)) = bytes.split_first() else {
            warn!("Control to client notification empty.");
            return Vec::new();
        };
        let Some(command) = ControlToClient::from_wire(*command) else {
            warn!("Unknown control to client command 0x{:02x}", command);
            return Vec::new();
        };
        info!("Control to client {:?}: {:?}", command, payload);

        match command {
            ControlToClient::ConfirmConnection => match payload {
                [kind, bonding, ..] => vec![RingEvent::DeviceConfirmationNeeded {
                    bonding: *bonding,
                    connection_type: ConnectionType::from_wire(*kind),
                }],
                _ => {
                    warn!("Confirm connection payload too short: {:?}", payload);
                    Vec::new()
                }
            },
            ControlToClient::PerformModeAction => match decode_mode_action(bytes) {
                Ok(action) => vec![RingEvent::ModeAction(action)],
                Err(e) => {
                    warn!("Mode action dropped: {}", e);
                    Vec::new()
                }
            },
            ControlToClient::PerformIncrementalModeAction => {
                match decode_incremental_action(bytes) {
                    Ok(action) => vec![RingEvent::ModeAction(action)],
                    Err(e) => {
                        warn!("Incremental mode action dropped: {}", e);
                        Vec::new()
                    }
                }
            }
            ControlToClient::UpdateError => {
                log_ring_error(payload);
                vec![RingEvent::RingError(payload.to_vec())]
            }
            ControlToClient::UpdateConfirmedConnections if !payload.is_empty() => {
                vec![RingEvent::BondingListChanged(payload.to_vec())]
            }
            ControlToClient::UpdateConfirmedConnections
            | ControlToClient::UpdateState
            | ControlToClient::HardwareVersionings
            | ControlToClient::ConfirmedBondings
            | ControlToClient::SuccessfulBonding => Vec::new(),
        }
    }

    fn claim_primary(bytes: &[u8]) -> Vec<RingEvent> {
        match bytes {
            [1, bonding, ..] => vec![RingEvent::BecamePrimary { bonding: *bonding }],
            _ => {
                info!("Cannot be primary.");
                vec![RingEvent::ClaimRejected]
            }
        }
    }

    /// Touch and motion come from the same payload and are decoded independently.
    fn stream_update(bytes: &[u8]) -> Vec<RingEvent> {
        debug!("Stream length: {}", bytes.len());
        let mut events = Vec::with_capacity(2);
        match decode_touch(bytes) {
            Ok(touch) => events.push(RingEvent::Touch(touch)),
            Err(e) => debug!("No touch sample: {}", e),
        }
        match decode_motion(bytes) {
            Ok(motion) => events.push(RingEvent::Motion(motion)),
            Err(e) => debug!("No motion sample: {}", e),
        }
        events
    }
}
