//! Touch and motion samples from the combined update characteristic.
//! Touch occupies bytes 0..19, the IMU block bytes 19..87 of the same payload.

use nalgebra::{Quaternion, Vector3};
use serde::{Deserialize, Serialize};

use super::{le_f32, le_u16, le_u32};
use crate::error::DecodeError;

/// Minimum payload length carrying a touch sample.
pub const TOUCH_LEN: usize = 19;

/// Minimum payload length carrying the IMU block.
pub const MOTION_LEN: usize = 87;

/// Touch event bitfield reported alongside each touch sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TouchEventMask(pub u32);

impl TouchEventMask {
    pub const ACTIVE: u32 = 1 << 0;
    pub const START: u32 = 1 << 1;
    pub const END: u32 = 1 << 2;
    pub const TOP: u32 = 1 << 3;
    pub const SIDE: u32 = 1 << 4;
    pub const GESTURE: u32 = 1 << 5;
    pub const LOW_POWER_OUTPUT: u32 = 1 << 6;
    pub const HOLD_START: u32 = 1 << 8;
    pub const HOLD_RELEASE: u32 = 1 << 9;
    pub const HOLD_ONGOING: u32 = 1 << 10;
    pub const SINGLE_TAP: u32 = 1 << 11;
    pub const DOUBLE_TAP: u32 = 1 << 12;
    pub const TRIPLE_TAP: u32 = 1 << 13;
    pub const SLOW_SWIPE_UP: u32 = 1 << 16;
    pub const SLOW_SWIPE_DOWN: u32 = 1 << 17;
    pub const SLOW_SWIPE_LEFT: u32 = 1 << 18;
    pub const SLOW_SWIPE_RIGHT: u32 = 1 << 19;
    pub const SWIPE_UP: u32 = 1 << 20;
    pub const SWIPE_DOWN: u32 = 1 << 21;
    pub const SWIPE_LEFT: u32 = 1 << 22;
    pub const SWIPE_RIGHT: u32 = 1 << 23;
    pub const PM_ACTIVE: u32 = 1 << 26;
    pub const PM_IDLE: u32 = 1 << 27;
    pub const PM_LOW_POWER: u32 = 1 << 28;
    pub const PM_TO_ACTIVE: u32 = 1 << 29;
    pub const PM_TO_IDLE: u32 = 1 << 30;
    pub const PM_TO_LOW_POWER: u32 = 1 << 31;

    pub fn contains(self, flag: u32) -> bool {
        self.0 & flag == flag
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn is_tap(self) -> bool {
        self.0 & (Self::SINGLE_TAP | Self::DOUBLE_TAP | Self::TRIPLE_TAP) != 0
    }

    pub fn is_swipe(self) -> bool {
        self.0 & (0xFF << 16) != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TouchSample {
    pub active: bool,
    pub x: u16,
    pub y: u16,
    pub strength: u16,
    pub timestamp_ms: u32,
    pub event_mask: TouchEventMask,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionSample {
    pub acceleration: Vector3<f32>,
    pub gyro: Vector3<f32>,
    pub magnetometer: Vector3<f32>,
    pub orientation_relative: Quaternion<f32>,
    pub orientation_absolute: Quaternion<f32>,
}

/// Decodes the touch part of a combined update.
///
/// The mask sits at offset 11 and the timestamp at 15; the offsets are
/// fixed by firmware and do not follow struct field order.
pub fn decode_touch(bytes: &[u8]) -> Result<TouchSample, DecodeError> {
    DecodeError::ensure_len(bytes, TOUCH_LEN)?;
    Ok(TouchSample {
        active: bytes[0] != 0,
        x: le_u16(bytes, 1),
        y: le_u16(bytes, 3),
        strength: le_u16(bytes, 5),
        event_mask: TouchEventMask(le_u32(bytes, 11)),
        timestamp_ms: le_u32(bytes, 15),
    })
}

/// Decodes the IMU block of a combined update.
pub fn decode_motion(bytes: &[u8]) -> Result<MotionSample, DecodeError> {
    DecodeError::ensure_len(bytes, MOTION_LEN)?;
    let vector = |offset: usize| {
        Vector3::new(
            le_f32(bytes, offset),
            le_f32(bytes, offset + 4),
            le_f32(bytes, offset + 8),
        )
    };
    // Wire order is x, y, z, w.
    let quaternion = |offset: usize| {
        Quaternion::new(
            le_f32(bytes, offset + 12),
            le_f32(bytes, offset),
            le_f32(bytes, offset + 4),
            le_f32(bytes, offset + 8),
        )
    };
    Ok(MotionSample {
        acceleration: vector(19),
        gyro: vector(31),
        magnetometer: vector(43),
        orientation_relative: quaternion(55),
        orientation_absolute: quaternion(71),
    })
}
