//! Ring control commands
//! This module contains the commands written to the control-to-server characteristic

use crate::core::codec::TouchpadReadType;
use crate::ring::{ConnectionType, Handedness, MouseSensitivity, RingState};

/// Command ids understood by the control-to-server characteristic.
mod id {
    pub const ADJUST_SENSITIVITY: u8 = 0x01;
    pub const DELETE_BONDINGS: u8 = 0x02;
    pub const DELETE_BONDING: u8 = 0x03;
    pub const SYSTEM_RESET: u8 = 0x04;
    pub const FORCE_SHUTOFF: u8 = 0x05;
    pub const CONFIRM_CONNECTION_NAME: u8 = 0x07;
    pub const FORCE_STATE: u8 = 0x08;
    pub const ASK_FOR_STATE: u8 = 0x0A;
    pub const CHANGE_HANDEDNESS: u8 = 0x0E;
    pub const CLEAR_ERRORS: u8 = 0x13;
    pub const SHIP_MODE: u8 = 0x14;
    pub const KEEP_ACTIVE: u8 = 0x15;
    pub const FACTORY_RESET: u8 = 0x16;
    pub const FACTORY_RESET_AND_SHIP: u8 = 0x17;
    pub const RESEED_TOUCHPAD: u8 = 0x18;
    pub const TOUCHPAD_DEBUG_STATE: u8 = 0x1B;
    pub const MAG_CALIBRATION: u8 = 0x1C;
}

/// Number of f32 values in a sensitivity packet.
const SENSITIVITY_VALUE_COUNT: u8 = 5;

/// Ring control commands
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlCommand {
    /// Mouse axes, speed and acceleration
    AdjustSensitivity(MouseSensitivity),
    /// Forget every bonded counterpart
    DeleteBondings,
    /// Forget one bonded counterpart
    DeleteBonding(u8),
    SystemReset,
    ForceShutoff,
    /// Accept a counterpart that asked to connect
    ConfirmConnection { bonding: u8, connection_type: ConnectionType },
    /// Pin the ring in `Some(state)`, or hand state control back to the ring with `None`
    ForceState(Option<RingState>),
    /// Ask the ring to report its state through a notification
    AskForState,
    ChangeHandedness(Handedness),
    ClearErrors,
    /// Turn the ring fully off until it is put on a charger
    ShipMode,
    KeepActive(bool),
    FactoryReset,
    FactoryResetAndShip,
    ReseedTouchpad,
    /// Start streaming `Some(read type)` on the touchpad debug characteristic, or stop with `None`
    TouchpadDebug(Option<TouchpadReadType>),
    MagCalibration,
}

impl ControlCommand {
    /// Convert the command to its byte representation
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::AdjustSensitivity(config) => {
                let mut out = vec![id::ADJUST_SENSITIVITY, SENSITIVITY_VALUE_COUNT];
                for value in [
                    config.x_speed,
                    config.y_speed,
                    config.x_acceleration,
                    config.y_acceleration,
                    config.quaternion,
                ] {
                    out.extend_from_slice(&value.to_le_bytes());
                }
                out.push(config.flip_x_axis as u8);
                out.push(config.flip_y_axis as u8);
                out
            }
            Self::DeleteBondings => vec![id::DELETE_BONDINGS],
            Self::DeleteBonding(bonding) => vec![id::DELETE_BONDING, *bonding],
            Self::SystemReset => vec![id::SYSTEM_RESET],
            Self::ForceShutoff => vec![id::FORCE_SHUTOFF],
            Self::ConfirmConnection { bonding, connection_type } => {
                vec![id::CONFIRM_CONNECTION_NAME, *bonding, *connection_type as u8]
            }
            Self::ForceState(Some(state)) => vec![id::FORCE_STATE, 1, *state as u8],
            Self::ForceState(None) => vec![id::FORCE_STATE, 0, 0],
            Self::AskForState => vec![id::ASK_FOR_STATE],
            Self::ChangeHandedness(handedness) => vec![id::CHANGE_HANDEDNESS, *handedness as u8],
            Self::ClearErrors => vec![id::CLEAR_ERRORS],
            Self::ShipMode => vec![id::SHIP_MODE],
            Self::KeepActive(keep) => vec![id::KEEP_ACTIVE, *keep as u8],
            Self::FactoryReset => vec![id::FACTORY_RESET],
            Self::FactoryResetAndShip => vec![id::FACTORY_RESET_AND_SHIP],
            Self::ReseedTouchpad => vec![id::RESEED_TOUCHPAD],
            Self::TouchpadDebug(Some(read_type)) => {
                vec![id::TOUCHPAD_DEBUG_STATE, *read_type as u8, 1]
            }
            Self::TouchpadDebug(None) => {
                vec![id::TOUCHPAD_DEBUG_STATE, TouchpadReadType::Default as u8, 0]
            }
            Self::MagCalibration => vec![id::MAG_CALIBRATION],
        }
    }
}
