//! Built-in mode templates and the library that keeps every mode and the three ring slots.

use std::collections::BTreeMap;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::SlotError;
use crate::ring::devices::ConnectedDevices;
use crate::ring::types::{
    APPLICATION_DEVICE_HANDLE, Gesture, GestureMapping, LedColor, MappingAction, ModeIndex,
    ModeType, RingMode,
};
use crate::storage::{KeyCondition, PersistenceGateway, TableKind, load_row, load_rows, save_row};

/// Unique ids of the modes in slots one, two and three on first run: Music, MQTT, Mouse.
pub const DEFAULT_SLOTS: [u32; 3] = [6, 0, 1];

/// Mapping table for every gesture, `NoAction` where `actions` has no entry.
fn mapping_table(actions: &[(Gesture, MappingAction)]) -> BTreeMap<Gesture, GestureMapping> {
    Gesture::CANONICAL_ORDER
        .into_iter()
        .map(|gesture| {
            let action = actions
                .iter()
                .find(|(g, _)| *g == gesture)
                .map_or(MappingAction::NoAction, |(_, action)| *action);
            (gesture, GestureMapping::new(gesture, action))
        })
        .collect()
}

/// Default gesture mappings of a mode type.
pub fn default_mappings(mode_type: ModeType) -> BTreeMap<Gesture, GestureMapping> {
    use Gesture::*;
    use MappingAction as A;
    match mode_type {
        ModeType::MqttControl => mapping_table(
            &Gesture::CANONICAL_ORDER.map(|gesture| (gesture, A::Mqtt)),
        ),
        ModeType::ComputerMouse => mapping_table(&[
            (SingleTap, A::LeftClick),
            (DoubleTap, A::DoubleClick),
            (TripleTap, A::RightClick),
            (PressAndHold, A::DragAndDrop),
        ]),
        ModeType::PresentationTool => mapping_table(&[
            (SingleTap, A::RightKey),
            (DoubleTap, A::DoubleClick),
            (SwipeLeft, A::RightKey),
            (SwipeRight, A::LeftKey),
            (PressAndHold, A::Cursor),
        ]),
        ModeType::Influencer => mapping_table(&[
            (SingleTap, A::PlayPause),
            (DoubleTap, A::NextSong),
            (TripleTap, A::PreviousSong),
            (SwipeUp, A::SwipeUp),
            (SwipeDown, A::SwipeDown),
            (Gesture::SwipeLeft, A::SwipeLeft),
            (Gesture::SwipeRight, A::SwipeRight),
        ]),
        ModeType::Music => mapping_table(&[
            (SingleTap, A::PlayPause),
            (DoubleTap, A::NextSong),
            (TripleTap, A::PreviousSong),
            (SwipeUp, A::VolumeUp),
            (SwipeDown, A::VolumeDown),
            (Gesture::SwipeLeft, A::NextSong),
            (Gesture::SwipeRight, A::PreviousSong),
        ]),
        ModeType::Custom => mapping_table(&[]),
    }
}

fn template(
    unique_id: u32,
    name: &str,
    mode_type: ModeType,
    color: LedColor,
    active_timeout_seconds: u32,
    active_mouse: bool,
) -> RingMode {
    RingMode {
        unique_id,
        name: name.to_string(),
        mode_index: ModeIndex::ONE,
        mode_type,
        color,
        active_timeout_seconds,
        mappings: default_mappings(mode_type),
        default_target: APPLICATION_DEVICE_HANDLE,
        mouse_target: APPLICATION_DEVICE_HANDLE,
        active_mouse,
    }
}

/// Modes created on first run.
pub fn default_modes() -> Vec<RingMode> {
    vec![
        template(0, "MQTT", ModeType::MqttControl, LedColor::Yellow, 10, false),
        template(1, "Computer Mouse", ModeType::ComputerMouse, LedColor::Green, 5, true),
        template(3, "Presentation Tool", ModeType::PresentationTool, LedColor::Purple, 15, false),
        template(5, "Influencer", ModeType::Influencer, LedColor::Yellow, 10, false),
        template(6, "Music", ModeType::Music, LedColor::Teal, 30, false),
        template(7, "Custom", ModeType::Custom, LedColor::Red, 60, false),
    ]
}

/// Copy of `mode` with host device handles replaced by the ring's bonding handles.
pub fn resolve_for_ring(mode: &RingMode, devices: &ConnectedDevices) -> RingMode {
    let mut resolved = mode.clone();
    for mapping in resolved.mappings.values_mut() {
        mapping.bonding = devices.bonding_for(mapping.target);
    }
    let default_bonding = devices.bonding_for(mode.default_target);
    resolved.default_target = default_bonding;
    resolved.mouse_target = default_bonding;
    resolved
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct SlotsRow {
    id: u32,
    ring_mode_one: u32,
    ring_mode_two: u32,
    ring_mode_three: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct MappingRow {
    mode_id: u32,
    gesture: Gesture,
    action: MappingAction,
    attribute: u8,
    bonding: u8,
    target: u8,
}

fn mapping_key(mode_id: u32, gesture: Gesture) -> KeyCondition {
    let gesture = serde_json::to_value(gesture).unwrap_or_default();
    KeyCondition::eq("mode_id", mode_id).and("gesture", gesture)
}

fn first_duplicate(slots: &[u32; 3]) -> Option<u32> {
    slots
        .iter()
        .enumerate()
        .find(|(i, id)| slots[..*i].contains(id))
        .map(|(_, id)| *id)
}

/// Replaces every repeated slot id with the lowest unslotted mode id.
fn repair_slots(modes: &[RingMode], mut slots: [u32; 3]) -> [u32; 3] {
    let mut ids: Vec<u32> = modes.iter().map(|m| m.unique_id).collect();
    ids.sort_unstable();
    for i in 1..slots.len() {
        if !slots[..i].contains(&slots[i]) {
            continue;
        }
        let spare = ids.iter().copied().find(|id| !slots.contains(id));
        match spare {
            Some(spare) => {
                warn!(
                    "Mode {} stored in two slots, {} moved to {}",
                    slots[i],
                    spare,
                    ModeIndex::ALL[i]
                );
                slots[i] = spare;
            }
            None => break,
        }
    }
    slots
}

/// Every known mode plus the three slots. Each slot always holds exactly one mode.
#[derive(Debug, Clone)]
pub struct ModeLibrary {
    modes: BTreeMap<u32, RingMode>,
    slots: [u32; 3],
}

impl ModeLibrary {
    pub fn new(modes: Vec<RingMode>, slots: [u32; 3]) -> Result<Self, SlotError> {
        if let Some(id) = first_duplicate(&slots) {
            return Err(SlotError::DuplicateSlot(id));
        }
        let mut library = Self {
            modes: modes.into_iter().map(|m| (m.unique_id, m)).collect(),
            slots,
        };
        for index in ModeIndex::ALL {
            let id = slots[index.slot()];
            library
                .modes
                .get_mut(&id)
                .ok_or(SlotError::UnknownMode(id))?
                .mode_index = index;
        }
        Ok(library)
    }

    pub fn with_defaults() -> Self {
        let modes: BTreeMap<u32, RingMode> = default_modes()
            .into_iter()
            .map(|m| (m.unique_id, m))
            .collect();
        let mut library = Self {
            modes,
            slots: DEFAULT_SLOTS,
        };
        for index in ModeIndex::ALL {
            if let Some(mode) = library.modes.get_mut(&DEFAULT_SLOTS[index.slot()]) {
                mode.mode_index = index;
            }
        }
        library
    }

    pub fn mode(&self, unique_id: u32) -> Option<&RingMode> {
        self.modes.get(&unique_id)
    }

    pub fn modes(&self) -> impl Iterator<Item = &RingMode> {
        self.modes.values()
    }

    pub fn slots(&self) -> [u32; 3] {
        self.slots
    }

    pub fn mode_in_slot(&self, index: ModeIndex) -> Option<&RingMode> {
        self.modes.get(&self.slots[index.slot()])
    }

    pub fn slot_of(&self, unique_id: u32) -> Option<ModeIndex> {
        ModeIndex::ALL
            .into_iter()
            .find(|index| self.slots[index.slot()] == unique_id)
    }

    /// Modes currently on the ring, slot order.
    pub fn active_modes(&self) -> Vec<RingMode> {
        ModeIndex::ALL
            .into_iter()
            .filter_map(|index| self.mode_in_slot(index).cloned())
            .collect()
    }

    /// Puts `unique_id` into `index`. A mode displaced from `index` moves to the slot
    /// the assigned mode vacated, if it had one. Returns the modes to re-push.
    pub fn assign_to_slot(
        &mut self,
        unique_id: u32,
        index: ModeIndex,
    ) -> Result<Vec<RingMode>, SlotError> {
        if !self.modes.contains_key(&unique_id) {
            return Err(SlotError::UnknownMode(unique_id));
        }
        let displaced = self.slots[index.slot()];
        if displaced == unique_id {
            return Ok(Vec::new());
        }

        let mut changed = Vec::with_capacity(2);
        if let Some(vacated) = self.slot_of(unique_id) {
            self.slots[vacated.slot()] = displaced;
            if let Some(mode) = self.modes.get_mut(&displaced) {
                mode.mode_index = vacated;
                changed.push(mode.clone());
            }
        }
        self.slots[index.slot()] = unique_id;
        if let Some(mode) = self.modes.get_mut(&unique_id) {
            mode.mode_index = index;
            changed.insert(0, mode.clone());
        }
        info!("Mode {} assigned to {}", unique_id, index);
        Ok(changed)
    }

    /// Stores `mode`, keeping slot placement authoritative. Returns it if it is on the ring.
    pub fn upsert(&mut self, mut mode: RingMode) -> Option<RingMode> {
        let slot = self.slot_of(mode.unique_id);
        if let Some(index) = slot {
            mode.mode_index = index;
        }
        self.modes.insert(mode.unique_id, mode.clone());
        slot.map(|_| mode)
    }

    /// Sets one gesture mapping. Returns the mode if it is on the ring.
    pub fn set_mapping(
        &mut self,
        unique_id: u32,
        mapping: GestureMapping,
    ) -> Result<Option<RingMode>, SlotError> {
        let on_ring = self.slot_of(unique_id).is_some();
        let mode = self
            .modes
            .get_mut(&unique_id)
            .ok_or(SlotError::UnknownMode(unique_id))?;
        if !mode.mode_type.allowed_actions().contains(&mapping.action) {
            warn!("{:?} rejected for {:?} mode {}", mapping.action, mode.mode_type, unique_id);
            return Err(SlotError::DisallowedAction {
                mode_type: mode.mode_type,
                action: mapping.action,
            });
        }
        mode.set_mapping(mapping);
        Ok(on_ring.then(|| mode.clone()))
    }

    /// Loads the library, seeding the defaults on first run.
    pub async fn load(store: &dyn PersistenceGateway) -> anyhow::Result<Self> {
        let mut modes: Vec<RingMode> =
            load_rows(store, TableKind::AllModes, &KeyCondition::all()).await?;
        if modes.is_empty() {
            info!("No stored modes, creating defaults");
            let library = Self::with_defaults();
            library.save_all(store).await?;
            return Ok(library);
        }

        let mappings: Vec<MappingRow> =
            load_rows(store, TableKind::GestureMappings, &KeyCondition::all()).await?;
        for row in mappings {
            if let Some(mode) = modes.iter_mut().find(|m| m.unique_id == row.mode_id) {
                mode.set_mapping(GestureMapping {
                    gesture: row.gesture,
                    action: row.action,
                    bonding: row.bonding,
                    target: row.target,
                    attribute: row.attribute,
                });
            }
        }

        let slots_key = KeyCondition::eq("id", 1);
        let slots = load_row::<SlotsRow>(store, TableKind::CurrentRingModes, &slots_key)
            .await?
            .map_or(DEFAULT_SLOTS, |row| {
                [row.ring_mode_one, row.ring_mode_two, row.ring_mode_three]
            });
        if first_duplicate(&slots).is_none() {
            return Ok(Self::new(modes, slots)?);
        }

        let library = Self::new(modes.clone(), repair_slots(&modes, slots))?;
        library.save_slots(store).await?;
        Ok(library)
    }

    pub async fn save_slots(&self, store: &dyn PersistenceGateway) -> anyhow::Result<()> {
        let row = SlotsRow {
            id: 1,
            ring_mode_one: self.slots[0],
            ring_mode_two: self.slots[1],
            ring_mode_three: self.slots[2],
        };
        save_row(store, TableKind::CurrentRingModes, &row, &KeyCondition::eq("id", 1)).await
    }

    /// Saves a mode row and each of its gesture mappings.
    pub async fn save_mode(
        &self,
        store: &dyn PersistenceGateway,
        unique_id: u32,
    ) -> anyhow::Result<()> {
        let Some(mode) = self.modes.get(&unique_id) else {
            return Err(SlotError::UnknownMode(unique_id).into());
        };
        let key = KeyCondition::eq("unique_id", unique_id);
        save_row(store, TableKind::AllModes, mode, &key).await?;
        for mapping in mode.mappings.values() {
            let row = MappingRow {
                mode_id: unique_id,
                gesture: mapping.gesture,
                action: mapping.action,
                attribute: mapping.attribute,
                bonding: mapping.bonding,
                target: mapping.target,
            };
            let key = mapping_key(unique_id, mapping.gesture);
            save_row(store, TableKind::GestureMappings, &row, &key).await?;
        }
        Ok(())
    }

    pub async fn save_all(&self, store: &dyn PersistenceGateway) -> anyhow::Result<()> {
        for unique_id in self.modes.keys() {
            self.save_mode(store, *unique_id).await?;
        }
        self.save_slots(store).await
    }
}
