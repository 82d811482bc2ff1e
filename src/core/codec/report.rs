//! Diagnostic payloads: ring error reports, touchpad debug frames and the
//! version strings from the device information service.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{le_u16, le_u32};
use crate::error::DecodeError;

pub const RING_ERROR_REPORT_LEN: usize = 14;

/// Touchpad sensor grid is 8 columns by 3 rows.
const TOUCHPAD_COLUMNS: usize = 8;
const TOUCHPAD_ROWS: usize = 3;
const TOUCHPAD_DEBUG_HEADER_LEN: usize = 6;

/// Error reported by the ring firmware through `update-error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingErrorReport {
    pub status_code: u16,
    pub stack_status: u32,
    pub file_id: u8,
    pub index: u16,
    pub count: u8,
    pub reserved: u32,
}

impl RingErrorReport {
    pub fn file_name(&self) -> &'static str {
        firmware_file_name(self.file_id)
    }
}

/// Decodes a ring error report. `bytes` excludes the control command byte.
pub fn decode_ring_error(bytes: &[u8]) -> Result<RingErrorReport, DecodeError> {
    DecodeError::ensure_len(bytes, RING_ERROR_REPORT_LEN)?;
    Ok(RingErrorReport {
        status_code: le_u16(bytes, 0),
        stack_status: le_u32(bytes, 2),
        file_id: bytes[6],
        index: le_u16(bytes, 7),
        count: bytes[9],
        reserved: le_u32(bytes, 10),
    })
}

/// Firmware source file a ring error originated from.
pub fn firmware_file_name(file_id: u8) -> &'static str {
    match file_id {
        0x00 => "Ble connections",
        0x01 => "Ble event handler",
        0x02 => "Ble globals",
        0x03 => "Ble main",
        0x04 => "Communications",
        0x05 => "Ring init",
        0x06 => "States",
        0x07 => "NVM",
        0x08 => "Timer",
        0x09 => "Leds",
        0x0A => "Power management IC",
        0x0B => "Power management",
        0x0C => "Touchpad",
        0x0D => "Touchpad i2c",
        0x0E => "Touchpad gesture recognition",
        0x0F => "Touchpad low level driver",
        0x10 => "Mouse driver",
        0x11 => "Mag IC",
        0x12 => "Mag",
        0x13 => "Acc & Gyro",
        0x14 => "IMU",
        0x15 => "Ble write handler",
        0x16 => "Over the air firmware update",
        0x17 => "Assert",
        0x18 => "Watchdog",
        0x19 => "gsdk files",
        _ => "Unknown file",
    }
}

/// What the touchpad debug characteristic is currently streaming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum TouchpadReadType {
    Default = 0,
    Counts = 1,
    References = 2,
    Deltas = 3,
    Compensation = 4,
}

impl TouchpadReadType {
    pub fn from_wire(value: u8) -> Option<Self> {
        match value {
            0 => Some(TouchpadReadType::Default),
            1 => Some(TouchpadReadType::Counts),
            2 => Some(TouchpadReadType::References),
            3 => Some(TouchpadReadType::Deltas),
            4 => Some(TouchpadReadType::Compensation),
            _ => None,
        }
    }
}

/// One frame from the touchpad debug characteristic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TouchpadDebugFrame {
    pub read_type: TouchpadReadType,
    pub counter: u16,
    pub timestamp_ms: u32,
    pub data: Vec<u8>,
}

impl TouchpadDebugFrame {
    /// Unsigned per-channel values, row-major.
    pub fn channels(&self) -> Vec<u16> {
        self.data
            .chunks_exact(2)
            .take(TOUCHPAD_COLUMNS * TOUCHPAD_ROWS)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect()
    }

    /// Channel values for reads where the firmware reports signed deltas.
    pub fn signed_channels(&self) -> Vec<i16> {
        self.channels().into_iter().map(|v| v as i16).collect()
    }

    /// Info flag bytes of a default-type frame.
    pub fn info_flags(&self) -> Option<(u8, u8)> {
        match (self.data.get(10), self.data.get(11)) {
            (Some(a), Some(b)) => Some((*a, *b)),
            _ => None,
        }
    }

    pub fn columns() -> usize {
        TOUCHPAD_COLUMNS
    }
}

/// Decodes a touchpad debug frame tagged with the active read type.
pub fn decode_touchpad_debug(
    read_type: TouchpadReadType,
    bytes: &[u8],
) -> Result<TouchpadDebugFrame, DecodeError> {
    DecodeError::ensure_len(bytes, TOUCHPAD_DEBUG_HEADER_LEN)?;
    Ok(TouchpadDebugFrame {
        read_type,
        counter: le_u16(bytes, 0),
        timestamp_ms: le_u32(bytes, 2),
        data: bytes[TOUCHPAD_DEBUG_HEADER_LEN..].to_vec(),
    })
}

/// Hardware and firmware revisions of the connected ring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingVersion {
    pub hardware_main_letter: String,
    pub hardware_main_number: u32,
    pub hardware_touch_letter: String,
    pub hardware_touch_number: u32,
    pub firmware_major: u8,
    pub firmware_minor: u8,
    pub firmware_patch: u8,
}

impl Default for RingVersion {
    fn default() -> Self {
        Self {
            hardware_main_letter: "A".into(),
            hardware_main_number: 0,
            hardware_touch_letter: "A".into(),
            hardware_touch_number: 0,
            firmware_major: 0,
            firmware_minor: 0,
            firmware_patch: 0,
        }
    }
}

impl std::fmt::Display for RingVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "hw {}.{}:{}.{} fw {}.{}.{}",
            self.hardware_main_letter,
            self.hardware_main_number,
            self.hardware_touch_letter,
            self.hardware_touch_number,
            self.firmware_major,
            self.firmware_minor,
            self.firmware_patch
        )
    }
}

/// Parses `"B.2:A.1"` style hardware revisions and `"0x010203"` style firmware revisions.
pub fn parse_ring_version(hardware: &[u8], firmware: &[u8]) -> Option<RingVersion> {
    static HARDWARE: OnceLock<Option<Regex>> = OnceLock::new();
    static FIRMWARE: OnceLock<Option<Regex>> = OnceLock::new();

    let hardware_re = HARDWARE
        .get_or_init(|| Regex::new(r"^([A-Za-z]+)\.(\d+):([A-Za-z]+)\.(\d+)").ok())
        .as_ref()?;
    let firmware_re = FIRMWARE
        .get_or_init(|| Regex::new(r"^0[xX]([0-9A-Fa-f]{2})([0-9A-Fa-f]{2})([0-9A-Fa-f]{2})").ok())
        .as_ref()?;

    let hardware = String::from_utf8_lossy(hardware);
    let firmware = String::from_utf8_lossy(firmware);
    let hw = hardware_re.captures(hardware.trim_end_matches('\0'))?;
    let fw = firmware_re.captures(firmware.trim_end_matches('\0'))?;

    Some(RingVersion {
        hardware_main_letter: hw[1].to_string(),
        hardware_main_number: hw[2].parse().ok()?,
        hardware_touch_letter: hw[3].to_string(),
        hardware_touch_number: hw[4].parse().ok()?,
        firmware_major: u8::from_str_radix(&fw[1], 16).ok()?,
        firmware_minor: u8::from_str_radix(&fw[2], 16).ok()?,
        firmware_patch: u8::from_str_radix(&fw[3], 16).ok()?,
    })
}
