//! Frame decoder for relay node telemetry.
//!
//! Two layouts exist on the wire:
//! - compact, exactly 15 bytes, no sender byte
//! - extended, 29 bytes or more, with the same 15-byte block at offset 13
//!   and the sender id in the last byte
//!
//! The 15-byte block is `temperature(1) | pressure(3, BE, /100) | seconds(1)`
//! followed by five `(neighbor id, count)` slots.
//!
//! Compact frames drop slots whose id is 0; extended frames keep them.

use chrono::{DateTime, Utc};

use crate::error::DecodeError;
use crate::models::{FrameLayout, NeighborObservation, Reading, TARGET_COUNT, UNKNOWN_SENDER};

/// Size of the shared measurement block and of a whole compact frame.
pub const COMPACT_LEN: usize = 15;

/// Minimum length of an extended frame.
pub const EXTENDED_MIN_LEN: usize = 29;

/// Offset of the measurement block inside an extended frame.
const EXTENDED_BLOCK_OFFSET: usize = 13;

const SLOT_OFFSET: usize = 5;
const SLOT_COUNT: usize = 5;

// ---

/// Decode a hex frame captured at `captured_at`.
///
/// Whitespace anywhere in `hex_frame` is ignored.
pub fn decode(hex_frame: &str, captured_at: DateTime<Utc>) -> Result<Reading, DecodeError> {
    // ---
    let cleaned: String = hex_frame.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = hex::decode(&cleaned).map_err(|e| DecodeError::InvalidEncoding(e.to_string()))?;

    match bytes.len() {
        COMPACT_LEN => decode_block(&bytes, FrameLayout::Compact, UNKNOWN_SENDER, captured_at),
        len if len >= EXTENDED_MIN_LEN => {
            let sender = bytes[len - 1].to_string();
            let block = &bytes[EXTENDED_BLOCK_OFFSET..EXTENDED_BLOCK_OFFSET + COMPACT_LEN];
            decode_block(block, FrameLayout::Extended, &sender, captured_at)
        }
        len => Err(DecodeError::UnsupportedLength { len }),
    }
}

/// Decode a 15-byte measurement block.
///
/// Bounds are checked per field so a short block reports where it ran out
/// instead of panicking.
fn decode_block(
    block: &[u8],
    layout: FrameLayout,
    sender_id: &str,
    captured_at: DateTime<Utc>,
) -> Result<Reading, DecodeError> {
    // ---
    let temperature = read_u8(block, 0)?;
    let pressure = f64::from(read_u24_be(block, 1)?) / 100.0;
    let elapsed_seconds = read_u8(block, 4)?;

    let mut neighbors = Vec::with_capacity(SLOT_COUNT);
    for slot in 0..SLOT_COUNT {
        let offset = SLOT_OFFSET + slot * 2;
        let id = read_u8(block, offset)?;
        let count = read_u8(block, offset + 1)?;

        if layout == FrameLayout::Compact && id == 0 {
            continue;
        }

        neighbors.push(NeighborObservation {
            neighbor_id: id.to_string(),
            count,
            reception_rate: reception_rate(count, elapsed_seconds),
            timestamp: captured_at,
        });
    }

    let target_reached = neighbors.iter().any(|n| n.count >= TARGET_COUNT);

    Ok(Reading {
        sender_id: sender_id.to_string(),
        layout,
        temperature,
        pressure,
        elapsed_seconds,
        neighbors,
        target_reached,
        captured_at,
    })
}

/// Packets per second, defined as 0 for an empty window.
pub fn reception_rate(count: u8, elapsed_seconds: u8) -> f64 {
    if elapsed_seconds == 0 {
        0.0
    } else {
        f64::from(count) / f64::from(elapsed_seconds)
    }
}

fn read_u8(data: &[u8], offset: usize) -> Result<u8, DecodeError> {
    data.get(offset)
        .copied()
        .ok_or(DecodeError::MalformedPayload {
            offset,
            needed: 1,
            len: data.len(),
        })
}

fn read_u24_be(data: &[u8], offset: usize) -> Result<u32, DecodeError> {
    match data.get(offset..offset + 3) {
        Some(b) => Ok(u32::from_be_bytes([0, b[0], b[1], b[2]])),
        None => Err(DecodeError::MalformedPayload {
            offset,
            needed: 3,
            len: data.len(),
        }),
    }
}
