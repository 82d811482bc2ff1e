//! Domain types for ring modes and their gesture mappings.
//! Every enum here carries the byte value the firmware uses on the wire.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Bonding value meaning "no bonding assigned".
pub const NO_BONDING: u8 = 255;

/// Device handle reserved for this host application.
pub const APPLICATION_DEVICE_HANDLE: u8 = 0;

/// Sentinel address of a ring that was never paired.
pub const UNSET_DEVICE_ID: &str = "N/A";

/// Default advertised product name.
pub const DEFAULT_RING_NAME: &str = "Taika Ring";

/// Active timeouts offered for a mode, in seconds.
pub const ACTIVE_TIMEOUT_CHOICES: [u32; 11] = [1, 5, 10, 15, 20, 25, 30, 60, 120, 300, 3600];

/// Touchpad gestures that can carry a mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Gesture {
    SingleTap,
    DoubleTap,
    TripleTap,
    SwipeUp,
    SwipeDown,
    SwipeLeft,
    SwipeRight,
    PressAndHold,
}

impl Gesture {
    /// Positional order used by the mode packet. Firmware indexes mappings by slot.
    pub const CANONICAL_ORDER: [Gesture; 8] = [
        Gesture::SingleTap,
        Gesture::DoubleTap,
        Gesture::TripleTap,
        Gesture::SwipeUp,
        Gesture::SwipeDown,
        Gesture::SwipeLeft,
        Gesture::SwipeRight,
        Gesture::PressAndHold,
    ];

    pub fn wire_value(self) -> u8 {
        match self {
            Gesture::SingleTap => 0x08,
            Gesture::DoubleTap => 0x09,
            Gesture::TripleTap => 0x0A,
            Gesture::SwipeUp => 0x06,
            Gesture::SwipeDown => 0x07,
            Gesture::SwipeLeft => 0x05,
            Gesture::SwipeRight => 0x04,
            Gesture::PressAndHold => 0x01,
        }
    }

    pub fn from_wire(value: u8) -> Option<Self> {
        Self::CANONICAL_ORDER
            .into_iter()
            .find(|gesture| gesture.wire_value() == value)
    }
}

/// Actions a gesture can trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MappingAction {
    NoAction = 0x00,
    PlayPause = 0x01,
    NextSong = 0x02,
    PreviousSong = 0x03,
    VolumeUp = 0x04,
    VolumeDown = 0x05,
    LeftClick = 0x06,
    DoubleClick = 0x07,
    RightClick = 0x08,
    LeftKey = 0x09,
    RightKey = 0x0A,
    SwipeUp = 0x0D,
    SwipeDown = 0x0E,
    SwipeLeft = 0x0F,
    SwipeRight = 0x10,
    TurnLightsOn = 0x80,
    TurnLightsOff = 0x81,
    ToggleLights = 0x82,
    Mqtt = 0x83,
    DragAndDrop = 0xB2,
    Cursor = 0xB3,
}

impl MappingAction {
    const ALL: [MappingAction; 21] = [
        MappingAction::NoAction,
        MappingAction::PlayPause,
        MappingAction::NextSong,
        MappingAction::PreviousSong,
        MappingAction::VolumeUp,
        MappingAction::VolumeDown,
        MappingAction::LeftClick,
        MappingAction::DoubleClick,
        MappingAction::RightClick,
        MappingAction::LeftKey,
        MappingAction::RightKey,
        MappingAction::SwipeUp,
        MappingAction::SwipeDown,
        MappingAction::SwipeLeft,
        MappingAction::SwipeRight,
        MappingAction::TurnLightsOn,
        MappingAction::TurnLightsOff,
        MappingAction::ToggleLights,
        MappingAction::Mqtt,
        MappingAction::DragAndDrop,
        MappingAction::Cursor,
    ];

    pub fn from_wire(value: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|action| *action as u8 == value)
    }

    /// Actions above this divider are handled by the ring itself rather than sent as HID.
    pub fn is_hid(self) -> bool {
        (self as u8) < 0x7F
    }
}

/// Application category of a mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ModeType {
    MqttControl = 0x00,
    ComputerMouse = 0x01,
    PresentationTool = 0x03,
    Influencer = 0x05,
    Music = 0x06,
    Custom = 0x07,
}

impl ModeType {
    pub fn from_wire(value: u8) -> Option<Self> {
        [
            ModeType::MqttControl,
            ModeType::ComputerMouse,
            ModeType::PresentationTool,
            ModeType::Influencer,
            ModeType::Music,
            ModeType::Custom,
        ]
        .into_iter()
        .find(|kind| *kind as u8 == value)
    }

    /// Actions a mapping of this mode type may use.
    pub fn allowed_actions(self) -> &'static [MappingAction] {
        use MappingAction::*;
        match self {
            ModeType::MqttControl => &[NoAction, Mqtt],
            ModeType::ComputerMouse => &[
                NoAction, LeftKey, RightKey, Cursor, LeftClick, DoubleClick, RightClick,
                DragAndDrop,
            ],
            ModeType::PresentationTool => &[
                NoAction, LeftKey, RightKey, Cursor, LeftClick, DoubleClick, RightClick,
            ],
            ModeType::Music => &[NoAction, PlayPause, NextSong, PreviousSong, VolumeUp, VolumeDown],
            ModeType::Influencer | ModeType::Custom => &[
                NoAction, PlayPause, NextSong, PreviousSong, VolumeUp, VolumeDown, LeftClick,
                DoubleClick, RightClick, DragAndDrop, Cursor, SwipeUp, SwipeDown, SwipeLeft,
                SwipeRight,
            ],
        }
    }
}

/// Mode indicator colours known to the firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum LedColor {
    Red = 0x00,
    Green = 0x01,
    Blue = 0x02,
    Purple = 0x03,
    Teal = 0x04,
    Yellow = 0x05,
    Indigo = 0x06,
    Orange = 0x07,
    Pink = 0x08,
}

/// One of the three physical mode slots on the ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct ModeIndex(u8);

impl ModeIndex {
    pub const ONE: ModeIndex = ModeIndex(0);
    pub const TWO: ModeIndex = ModeIndex(1);
    pub const THREE: ModeIndex = ModeIndex(2);
    pub const ALL: [ModeIndex; 3] = [ModeIndex::ONE, ModeIndex::TWO, ModeIndex::THREE];

    pub fn new(value: u8) -> Option<Self> {
        (value < 3).then_some(ModeIndex(value))
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn slot(self) -> usize {
        self.0 as usize
    }
}

impl TryFrom<u8> for ModeIndex {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        ModeIndex::new(value).ok_or_else(|| format!("mode index {} out of range 0..=2", value))
    }
}

impl From<ModeIndex> for u8 {
    fn from(index: ModeIndex) -> Self {
        index.0
    }
}

impl fmt::Display for ModeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mode {}", self.0 + 1)
    }
}

/// Kind of counterpart device bonded with the ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ConnectionType {
    Other = 0x00,
    PrimaryPhone = 0x01,
    Computer = 0x02,
    OtherPhone = 0x05,
    Mqtt = 0x06,
}

impl ConnectionType {
    pub fn from_wire(value: u8) -> Self {
        match value {
            0x01 => ConnectionType::PrimaryPhone,
            0x02 => ConnectionType::Computer,
            0x05 => ConnectionType::OtherPhone,
            0x06 => ConnectionType::Mqtt,
            _ => ConnectionType::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Handedness {
    LeftHanded = 0,
    RightHanded = 1,
}

/// Ring firmware states that can be forced from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum RingState {
    Active = 0,
    Idle = 1,
    Sleep = 2,
    Fault = 3,
    Shutoff = 4,
    Test = 5,
    Charging = 6,
}

/// What a single gesture does inside a mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GestureMapping {
    pub gesture: Gesture,
    pub action: MappingAction,
    /// Bonding handle of the counterpart receiving the action.
    pub bonding: u8,
    /// Host-side device handle of the target.
    pub target: u8,
    pub attribute: u8,
}

impl GestureMapping {
    pub fn new(gesture: Gesture, action: MappingAction) -> Self {
        Self {
            gesture,
            action,
            bonding: APPLICATION_DEVICE_HANDLE,
            target: APPLICATION_DEVICE_HANDLE,
            attribute: 0,
        }
    }
}

/// A persisted mode configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RingMode {
    pub unique_id: u32,
    /// Host-only label, never transmitted.
    pub name: String,
    pub mode_index: ModeIndex,
    pub mode_type: ModeType,
    pub color: LedColor,
    pub active_timeout_seconds: u32,
    pub mappings: BTreeMap<Gesture, GestureMapping>,
    pub default_target: u8,
    pub mouse_target: u8,
    pub active_mouse: bool,
}

impl RingMode {
    /// Inserts or replaces the mapping for `mapping.gesture`.
    pub fn set_mapping(&mut self, mapping: GestureMapping) {
        self.mappings.insert(mapping.gesture, mapping);
    }

    pub fn mapping(&self, gesture: Gesture) -> Option<&GestureMapping> {
        self.mappings.get(&gesture)
    }
}

/// The previously paired ring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub id: String,
    pub name: String,
}

impl DeviceIdentity {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// Identity of a ring that was never paired.
    pub fn unset() -> Self {
        Self::new(UNSET_DEVICE_ID, DEFAULT_RING_NAME)
    }

    pub fn is_unset(&self) -> bool {
        self.id == UNSET_DEVICE_ID
    }
}

impl Default for DeviceIdentity {
    fn default() -> Self {
        Self::unset()
    }
}

/// Mouse axes and sensitivity pushed to the ring.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MouseSensitivity {
    pub x_speed: f32,
    pub y_speed: f32,
    pub x_acceleration: f32,
    pub y_acceleration: f32,
    pub quaternion: f32,
    pub flip_x_axis: bool,
    pub flip_y_axis: bool,
}

impl Default for MouseSensitivity {
    fn default() -> Self {
        Self {
            x_speed: 6.0,
            y_speed: 8.0,
            x_acceleration: 1.4,
            y_acceleration: 1.4,
            quaternion: 0.1,
            flip_x_axis: true,
            flip_y_axis: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gesture_wire_values_round_trip() {
        for gesture in Gesture::CANONICAL_ORDER {
            assert_eq!(Gesture::from_wire(gesture.wire_value()), Some(gesture));
        }
        assert_eq!(Gesture::from_wire(0x02), None);
    }

    #[test]
    fn mode_index_rejects_out_of_range() {
        assert_eq!(ModeIndex::new(2), Some(ModeIndex::THREE));
        assert_eq!(ModeIndex::new(3), None);
        assert!(serde_json::from_str::<ModeIndex>("7").is_err());
        assert_eq!(serde_json::from_str::<ModeIndex>("1").ok(), Some(ModeIndex::TWO));
    }

    #[test]
    fn hid_divider_splits_actions() {
        assert!(MappingAction::VolumeUp.is_hid());
        assert!(!MappingAction::Mqtt.is_hid());
        assert_eq!(MappingAction::from_wire(0xB3), Some(MappingAction::Cursor));
        assert_eq!(MappingAction::from_wire(0x0B), None);
    }

    #[test]
    fn unset_identity_is_sentinel() {
        assert!(DeviceIdentity::default().is_unset());
        assert!(!DeviceIdentity::new("AA:BB", "Taika Ring").is_unset());
    }
}
