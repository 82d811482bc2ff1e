use crate::ring::{Gesture, RingMode};

/// Header (8) + eight 4-byte gesture blocks + mouse target + active mouse.
pub const RING_MODE_PACKET_LEN: usize = 8 + 4 * 8 + 2;

/// Serializes a mode into the packet written to the mode-update characteristic.
///
/// Gesture blocks are emitted in [`Gesture::CANONICAL_ORDER`]; a gesture
/// with no mapping is written as four zero bytes.
pub fn encode_ring_mode(mode: &RingMode) -> [u8; RING_MODE_PACKET_LEN] {
    let mut packet = [0u8; RING_MODE_PACKET_LEN];
    let index = mode.mode_index.value();

    packet[0] = index;
    packet[1..5].copy_from_slice(&mode.active_timeout_seconds.to_le_bytes());
    packet[5] = mode.mode_type as u8;
    packet[6] = mode.color as u8;
    packet[7] = index;

    for (slot, gesture) in Gesture::CANONICAL_ORDER.iter().enumerate() {
        if let Some(mapping) = mode.mappings.get(gesture) {
            let start = 8 + slot * 4;
            packet[start] = mapping.action as u8;
            packet[start + 1] = mapping.bonding;
            packet[start + 2] = mapping.target;
            packet[start + 3] = mapping.attribute;
        }
    }

    packet[RING_MODE_PACKET_LEN - 2] = mode.mouse_target;
    packet[RING_MODE_PACKET_LEN - 1] = mode.active_mouse as u8;
    packet
}
