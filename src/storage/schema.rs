//! Tables the driver persists, with their fields and primary keys.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TableKind {
    AppConfig,
    ConfirmedDevices,
    UnconfirmedDevices,
    MouseConfiguration,
    Handedness,
    CurrentRingModes,
    AllModes,
    GestureMappings,
    RingBleInfo,
    LedConfiguration,
}

/// Static description of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSchema {
    pub name: &'static str,
    pub fields: &'static [&'static str],
    pub primary_key: &'static [&'static str],
}

impl TableKind {
    pub const ALL: [TableKind; 10] = [
        TableKind::AppConfig,
        TableKind::ConfirmedDevices,
        TableKind::UnconfirmedDevices,
        TableKind::MouseConfiguration,
        TableKind::Handedness,
        TableKind::CurrentRingModes,
        TableKind::AllModes,
        TableKind::GestureMappings,
        TableKind::RingBleInfo,
        TableKind::LedConfiguration,
    ];

    pub fn schema(self) -> &'static TableSchema {
        match self {
            TableKind::AppConfig => &TableSchema {
                name: "AppConfig",
                fields: &["id", "ring_name"],
                primary_key: &["id"],
            },
            TableKind::ConfirmedDevices => &TableSchema {
                name: "ConfirmedDevices",
                fields: &["device_handle", "name", "connection_type", "bonding_handle"],
                primary_key: &["device_handle"],
            },
            TableKind::UnconfirmedDevices => &TableSchema {
                name: "UnconfirmedDevices",
                fields: &["device_handle", "name", "connection_type", "bonding_handle"],
                primary_key: &["device_handle"],
            },
            TableKind::MouseConfiguration => &TableSchema {
                name: "MouseConfiguration",
                fields: &[
                    "id",
                    "x_speed",
                    "y_speed",
                    "x_acceleration",
                    "y_acceleration",
                    "quaternion",
                    "flip_x_axis",
                    "flip_y_axis",
                ],
                primary_key: &["id"],
            },
            TableKind::Handedness => &TableSchema {
                name: "Handedness",
                fields: &["id", "user_handedness"],
                primary_key: &["id"],
            },
            TableKind::CurrentRingModes => &TableSchema {
                name: "CurrentApplicationModes",
                fields: &["id", "ring_mode_one", "ring_mode_two", "ring_mode_three"],
                primary_key: &["id"],
            },
            TableKind::AllModes => &TableSchema {
                name: "AllModes",
                fields: &[
                    "unique_id",
                    "name",
                    "mode_type",
                    "active_timeout_seconds",
                    "color",
                    "mode_index",
                    "default_target",
                    "mouse_target",
                    "active_mouse",
                    "mappings",
                ],
                primary_key: &["unique_id"],
            },
            TableKind::GestureMappings => &TableSchema {
                name: "IOMappings",
                fields: &["mode_id", "gesture", "action", "attribute", "bonding", "target"],
                primary_key: &["mode_id", "gesture"],
            },
            TableKind::RingBleInfo => &TableSchema {
                name: "BLEInfo",
                fields: &["sql_identifier", "id", "name"],
                primary_key: &["sql_identifier"],
            },
            TableKind::LedConfiguration => &TableSchema {
                name: "LedConfiguration",
                fields: &[
                    "id",
                    "general",
                    "touch_response",
                    "charging",
                    "color",
                    "brightness",
                    "timing",
                    "activity",
                ],
                primary_key: &["id"],
            },
        }
    }

    pub fn name(self) -> &'static str {
        self.schema().name
    }
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_keys_are_fields() {
        for table in TableKind::ALL {
            let schema = table.schema();
            for key in schema.primary_key {
                assert!(schema.fields.contains(key), "{} key {} missing", schema.name, key);
            }
        }
    }
}
