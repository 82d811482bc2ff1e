//! Binary codec for ring packets.
//! Pure functions between raw notification bytes and typed values. All
//! multi-byte fields are little-endian and every decoder validates the
//! minimum length before touching a single offset.

mod led;
mod mode_action;
mod report;
mod ring_mode;
mod stream;

pub use led::{
    ActivityIndication, BrightnessConfig, ChargingAnimation, ColorConfig, GeneralLedFlags,
    LedConfig, LedRegister, TimingConfig, TouchResponseFlags, LED_CONFIG_LEN,
    LED_CONFIG_READ_HEADER, decode_led_config, encode_led_register,
};
pub use mode_action::{
    INCREMENTAL_ACTION_LEN, MODE_ACTION_LEN, ModeActionEvent, decode_incremental_action,
    decode_mode_action,
};
pub use report::{
    RING_ERROR_REPORT_LEN, RingErrorReport, RingVersion, TouchpadDebugFrame, TouchpadReadType,
    decode_ring_error, decode_touchpad_debug, firmware_file_name, parse_ring_version,
};
pub use ring_mode::{RING_MODE_PACKET_LEN, encode_ring_mode};
pub use stream::{
    MOTION_LEN, MotionSample, TOUCH_LEN, TouchEventMask, TouchSample, decode_motion, decode_touch,
};

// Callers validate the length first; these only read.

fn le_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

fn le_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

fn le_f32(bytes: &[u8], offset: usize) -> f32 {
    f32::from_bits(le_u32(bytes, offset))
}
