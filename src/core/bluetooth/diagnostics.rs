//! Logging of ring diagnostics that are not application events.

use log::{info, warn};

use crate::core::codec::{
    RingErrorReport, TouchpadDebugFrame, TouchpadReadType, decode_ring_error, decode_touchpad_debug,
};

const ATI_ERROR: u8 = 0x08;
const RE_ATI: u8 = 0x10;
const ALP_ATI_ERROR: u8 = 0x20;
const ALP_RE_ATI: u8 = 0x40;
const RESET: u8 = 0x80;

const ONE_FINGER: u8 = 0x01;
const TWO_FINGERS: u8 = 0x02;
const MOVEMENT: u8 = 0x04;
const TOO_MANY_FINGERS: u8 = 0x10;
const ALP_OUTPUT: u8 = 0x40;

/// Logs a touchpad debug notification. Byte 0 is the read type tag.
pub fn log_touchpad_frame(bytes: &[u8]) -> Option<TouchpadDebugFrame> {
    let (tag, rest) = bytes.split_first()?;
    let Some(read_type) = TouchpadReadType::from_wire(*tag) else {
        warn!("Unknown touchpad read type {}", tag);
        return None;
    };
    let frame = match decode_touchpad_debug(read_type, rest) {
        Ok(frame) => frame,
        Err(e) => {
            warn!("Touchpad debug frame dropped: {}", e);
            return None;
        }
    };

    info!(
        "TP {:?} #{} at {} ms",
        frame.read_type, frame.counter, frame.timestamp_ms
    );
    match frame.read_type {
        TouchpadReadType::Default => log_touchpad_info(&frame),
        TouchpadReadType::Deltas => {
            let rows = format_rows(frame.signed_channels().iter().map(|v| format!("{:>5}", v)));
            info!("TP deltas\n{}", rows);
        }
        _ => {
            let rows = format_rows(frame.channels().iter().map(|v| format!("{:>5}", v)));
            info!("TP channels\n{}", rows);
        }
    }
    Some(frame)
}

fn format_rows(values: impl Iterator<Item = String>) -> String {
    let values: Vec<String> = values.collect();
    values
        .chunks(TouchpadDebugFrame::columns())
        .map(|row| row.join(" "))
        .collect::<Vec<_>>()
        .join("\n")
}

fn log_touchpad_info(frame: &TouchpadDebugFrame) {
    let Some((system, fingers)) = frame.info_flags() else {
        return;
    };
    let flags = [
        (system, ATI_ERROR, "ATI error"),
        (system, RE_ATI, "ReATI occurred"),
        (system, ALP_ATI_ERROR, "ALP ATI error"),
        (system, ALP_RE_ATI, "ALP ReATI occurred"),
        (system, RESET, "Reset occurred"),
        (fingers, ONE_FINGER, "1 finger"),
        (fingers, TWO_FINGERS, "2 fingers"),
        (fingers, MOVEMENT, "TP movement"),
        (fingers, TOO_MANY_FINGERS, "Too many fingers"),
        (fingers, ALP_OUTPUT, "ALP output"),
    ];
    for (byte, mask, label) in flags {
        if byte & mask != 0 {
            info!("TP info: {}", label);
        }
    }
}

/// Logs an `update-error` report. `bytes` excludes the command id.
pub fn log_ring_error(bytes: &[u8]) -> Option<RingErrorReport> {
    match decode_ring_error(bytes) {
        Ok(report) => {
            warn!(
                "Ring error in {}: status 0x{:04x}, stack status 0x{:08x}, \
                 index 0x{:04x}, count {}",
                report.file_name(),
                report.status_code,
                report.stack_status,
                report.index,
                report.count
            );
            Some(report)
        }
        Err(e) => {
            warn!("Ring error report unreadable: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touchpad_frame_needs_a_known_tag() {
        assert!(log_touchpad_frame(&[]).is_none());
        assert!(log_touchpad_frame(&[9, 0, 0, 0, 0, 0, 0]).is_none());
        let frame = log_touchpad_frame(&[3, 1, 0, 0, 0, 0, 0, 0xFF, 0xFF]).unwrap();
        assert_eq!(frame.read_type, TouchpadReadType::Deltas);
        assert_eq!(frame.signed_channels(), vec![-1]);
    }

    #[test]
    fn rows_wrap_at_eight_columns() {
        let rows = format_rows((0..10).map(|v| v.to_string()));
        assert_eq!(rows, "0 1 2 3 4 5 6 7\n8 9");
    }
}
