//! LED configuration registers.
//!
//! Each sub-structure is written separately as `[register, payload..]` to the
//! LED control characteristic. Writing [`LED_CONFIG_READ_HEADER`] alone asks the
//! ring to prepare the full configuration, which it returns in one read:
//!
//! | offset | size | field |
//! |---|---|---|
//! | 0 | 1 | header |
//! | 1 | 1 | general flags |
//! | 2 | 1 | touch response flags |
//! | 3 | 4 | charging: enabled, brightness, step ms (u16) |
//! | 7 | 3 | color r, g, b |
//! | 10 | 4 | brightness active (u16), idle (u16) |
//! | 14 | 4 | timing multiplier (u16), 2 reserved |
//! | 18 | 4 | activity active ms (u16), idle ms (u16) |

use serde::{Deserialize, Serialize};

use super::le_u16;
use crate::error::DecodeError;

pub const LED_CONFIG_READ_HEADER: u8 = 0xFF;
pub const LED_CONFIG_LEN: usize = 22;

/// Register ids for tagged LED writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum LedRegister {
    General = 0x01,
    TouchResponse = 0x02,
    Charging = 0x03,
    Color = 0x04,
    Brightness = 0x05,
    Timing = 0x06,
    Activity = 0x07,
}

impl LedRegister {
    pub const ALL: [LedRegister; 7] = [
        LedRegister::General,
        LedRegister::TouchResponse,
        LedRegister::Charging,
        LedRegister::Color,
        LedRegister::Brightness,
        LedRegister::Timing,
        LedRegister::Activity,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneralLedFlags {
    pub led_on_when_ring_active: bool,
    pub blink_periodically_when_active: bool,
    pub blink_periodically_when_idle: bool,
    pub mag_calibration_animation: bool,
    pub disable_system_behaviour: bool,
    pub restore_defaults: bool,
}

impl GeneralLedFlags {
    fn to_byte(self) -> u8 {
        pack_bits(&[
            self.led_on_when_ring_active,
            self.blink_periodically_when_active,
            self.blink_periodically_when_idle,
            self.mag_calibration_animation,
            self.disable_system_behaviour,
            self.restore_defaults,
        ])
    }

    fn from_byte(byte: u8) -> Self {
        Self {
            led_on_when_ring_active: bit(byte, 0),
            blink_periodically_when_active: bit(byte, 1),
            blink_periodically_when_idle: bit(byte, 2),
            mag_calibration_animation: bit(byte, 3),
            disable_system_behaviour: bit(byte, 4),
            restore_defaults: bit(byte, 5),
        }
    }
}

impl Default for GeneralLedFlags {
    fn default() -> Self {
        Self {
            led_on_when_ring_active: true,
            blink_periodically_when_active: false,
            blink_periodically_when_idle: false,
            mag_calibration_animation: true,
            disable_system_behaviour: false,
            restore_defaults: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TouchResponseFlags {
    pub active_touch_animation: bool,
    pub gesture_animations: bool,
    pub gesture_show_tap_count: bool,
    pub gesture_press_and_hold: bool,
}

impl TouchResponseFlags {
    fn to_byte(self) -> u8 {
        pack_bits(&[
            self.active_touch_animation,
            self.gesture_animations,
            self.gesture_show_tap_count,
            self.gesture_press_and_hold,
        ])
    }

    fn from_byte(byte: u8) -> Self {
        Self {
            active_touch_animation: bit(byte, 0),
            gesture_animations: bit(byte, 1),
            gesture_show_tap_count: bit(byte, 2),
            gesture_press_and_hold: bit(byte, 3),
        }
    }
}

impl Default for TouchResponseFlags {
    fn default() -> Self {
        Self {
            active_touch_animation: true,
            gesture_animations: true,
            gesture_show_tap_count: false,
            gesture_press_and_hold: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargingAnimation {
    pub enabled: bool,
    pub brightness: u8,
    pub step_ms: u16,
}

impl Default for ChargingAnimation {
    fn default() -> Self {
        Self {
            enabled: true,
            brightness: 5,
            step_ms: 400,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorConfig {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Default for ColorConfig {
    fn default() -> Self {
        Self { r: 128, g: 0, b: 128 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrightnessConfig {
    pub active: u16,
    pub idle: u16,
}

impl Default for BrightnessConfig {
    fn default() -> Self {
        Self { active: 150, idle: 10 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingConfig {
    pub multiplier: u16,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self { multiplier: 420 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityIndication {
    pub active_interval_ms: u16,
    pub idle_interval_ms: u16,
}

impl Default for ActivityIndication {
    fn default() -> Self {
        Self {
            active_interval_ms: 1000,
            idle_interval_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LedConfig {
    pub general: GeneralLedFlags,
    pub touch_response: TouchResponseFlags,
    pub charging: ChargingAnimation,
    pub color: ColorConfig,
    pub brightness: BrightnessConfig,
    pub timing: TimingConfig,
    pub activity: ActivityIndication,
}

/// Builds the tagged write for one register of `config`.
pub fn encode_led_register(config: &LedConfig, register: LedRegister) -> Vec<u8> {
    let mut out = vec![register as u8];
    match register {
        LedRegister::General => out.push(config.general.to_byte()),
        LedRegister::TouchResponse => out.push(config.touch_response.to_byte()),
        LedRegister::Charging => {
            out.push(config.charging.enabled as u8);
            out.push(config.charging.brightness);
            out.extend_from_slice(&config.charging.step_ms.to_le_bytes());
        }
        LedRegister::Color => {
            out.extend_from_slice(&[config.color.r, config.color.g, config.color.b])
        }
        LedRegister::Brightness => {
            out.extend_from_slice(&config.brightness.active.to_le_bytes());
            out.extend_from_slice(&config.brightness.idle.to_le_bytes());
        }
        LedRegister::Timing => {
            out.extend_from_slice(&config.timing.multiplier.to_le_bytes());
            out.extend_from_slice(&[0, 0]);
        }
        LedRegister::Activity => {
            out.extend_from_slice(&config.activity.active_interval_ms.to_le_bytes());
            out.extend_from_slice(&config.activity.idle_interval_ms.to_le_bytes());
        }
    }
    out
}

/// Decodes the full configuration read back from the LED control characteristic.
pub fn decode_led_config(bytes: &[u8]) -> Result<LedConfig, DecodeError> {
    DecodeError::ensure_len(bytes, LED_CONFIG_LEN)?;
    if bytes[0] != LED_CONFIG_READ_HEADER {
        return Err(DecodeError::BadHeader {
            expected: LED_CONFIG_READ_HEADER,
            actual: bytes[0],
        });
    }
    Ok(LedConfig {
        general: GeneralLedFlags::from_byte(bytes[1]),
        touch_response: TouchResponseFlags::from_byte(bytes[2]),
        charging: ChargingAnimation {
            enabled: bytes[3] != 0,
            brightness: bytes[4],
            step_ms: le_u16(bytes, 5),
        },
        color: ColorConfig {
            r: bytes[7],
            g: bytes[8],
            b: bytes[9],
        },
        brightness: BrightnessConfig {
            active: le_u16(bytes, 10),
            idle: le_u16(bytes, 12),
        },
        timing: TimingConfig {
            multiplier: le_u16(bytes, 14),
        },
        activity: ActivityIndication {
            active_interval_ms: le_u16(bytes, 18),
            idle_interval_ms: le_u16(bytes, 20),
        },
    })
}

fn bit(byte: u8, index: u8) -> bool {
    byte & (1 << index) != 0
}

fn pack_bits(flags: &[bool]) -> u8 {
    flags
        .iter()
        .enumerate()
        .fold(0, |acc, (i, set)| if *set { acc | (1 << i) } else { acc })
}
