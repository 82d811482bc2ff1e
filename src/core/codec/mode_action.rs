use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use super::le_f32;
use crate::error::DecodeError;
use crate::ring::{Gesture, ModeIndex};

pub const MODE_ACTION_LEN: usize = 6;
pub const INCREMENTAL_ACTION_LEN: usize = 18;

/// A gesture performed in one of the ring's modes.
///
/// The raw gesture and mode index bytes are kept as received; firmware may
/// report gesture codes that carry no host mapping.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModeActionEvent {
    pub mode_index: u8,
    pub gesture: u8,
    pub is_incremental: bool,
    pub incremental_started: bool,
    /// Roll, pitch and yaw. Zero for discrete gestures.
    pub roll_pitch_yaw: Vector3<f32>,
}

impl ModeActionEvent {
    pub fn mapped_gesture(&self) -> Option<Gesture> {
        Gesture::from_wire(self.gesture)
    }

    pub fn mode(&self) -> Option<ModeIndex> {
        ModeIndex::new(self.mode_index)
    }
}

/// `[cmd, action, gesture, target, modeIndex, attribute]`
pub fn decode_mode_action(bytes: &[u8]) -> Result<ModeActionEvent, DecodeError> {
    DecodeError::ensure_len(bytes, MODE_ACTION_LEN)?;
    Ok(ModeActionEvent {
        mode_index: bytes[4],
        gesture: bytes[2],
        is_incremental: false,
        incremental_started: false,
        roll_pitch_yaw: Vector3::zeros(),
    })
}

/// `[cmd, action, gesture, target, modeIndex, firstFlag, roll, pitch, yaw]`
pub fn decode_incremental_action(bytes: &[u8]) -> Result<ModeActionEvent, DecodeError> {
    DecodeError::ensure_len(bytes, INCREMENTAL_ACTION_LEN)?;
    Ok(ModeActionEvent {
        mode_index: bytes[4],
        gesture: bytes[2],
        is_incremental: true,
        incremental_started: bytes[5] == 1,
        roll_pitch_yaw: Vector3::new(le_f32(bytes, 6), le_f32(bytes, 10), le_f32(bytes, 14)),
    })
}
