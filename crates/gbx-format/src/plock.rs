//! Parameter-lock codec.
//!
//! Per-step parameter automation lives in tables located after a fixed
//! 9-byte signature inside a track body. Three sub-formats share that
//! discovery mechanism:
//!
//! - the standard 48-slot table of 5-byte entries and 3-byte empty markers,
//! - the T10 header format (9-byte header + 9-byte continuations),
//! - the drum 18-byte record format used on drum-engine tracks 1-2.
//!
//! The standard table is parsed with slot offsets preserved so lanes can be
//! rewritten in place without disturbing any other byte.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{InvariantError, MutateError, ParseError};

/// Signature preceding every parameter-lock table.
pub const PLOCK_SIG: [u8; 9] = [0xF0, 0x3C, 0x00, 0x00, 0x7F, 0x00, 0x00, 0x00, 0x0A];

/// Number of slots in the standard table.
pub const SLOT_COUNT: usize = 48;

/// Empty slot marker.
pub const EMPTY_SLOT: [u8; 3] = [0xFF, 0x00, 0x00];

/// Param ids that continue the preceding lane instead of opening a new one.
pub const CONTINUATION_IDS: [u8; 2] = [0x00, 0x50];

/// Lowest value that is safe to write during an in-place rewrite. Values
/// below this are only safe when the whole file is regenerated from scratch.
pub const INPLACE_VALUE_FLOOR: u16 = 256;

/// Locate the table: the offset immediately after the signature.
pub fn find_plock_start(body: &[u8]) -> Result<usize, ParseError> {
    if body.len() < PLOCK_SIG.len() {
        return Err(ParseError::PlockSignatureMissing);
    }
    (0..=body.len() - PLOCK_SIG.len())
        .find(|&i| body[i..i + PLOCK_SIG.len()] == PLOCK_SIG)
        .map(|i| i + PLOCK_SIG.len())
        .ok_or(ParseError::PlockSignatureMissing)
}

/// One slot of the standard table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// 3-byte empty marker.
    Empty,
    /// 5-byte entry: param id and 16-bit value.
    Entry { param_id: u8, value: u16 },
}

/// Parsed standard table. Slots keep their body offsets so a rewrite can
/// patch values without re-deriving the layout.
#[derive(Debug, Clone)]
pub struct SlotTable {
    /// Body offset of the first slot.
    pub start: usize,
    /// Slots in table order with their body offsets.
    pub slots: Vec<(usize, Slot)>,
}

/// One lane rewrite: a param id and the replacement values for its lane, in
/// encounter order.
#[derive(Debug, Clone)]
pub struct LaneRewrite {
    pub param_id: u8,
    pub values: Vec<u16>,
}

/// Options for [`SlotTable::rewrite`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RewriteOpts {
    /// Accept fewer values than the lane holds, leaving the rest untouched.
    pub allow_partial: bool,
    /// The caller is regenerating the file from scratch, so the in-place
    /// value floor does not apply.
    pub regenerated: bool,
}

impl SlotTable {
    /// Parse the standard table from a track body.
    pub fn parse(body: &[u8]) -> Result<Self, ParseError> {
        let start = find_plock_start(body)?;
        let mut slots = Vec::with_capacity(SLOT_COUNT);
        let mut offset = start;
        for _ in 0..SLOT_COUNT {
            if offset + EMPTY_SLOT.len() > body.len() {
                return Err(ParseError::TruncatedPlock { offset });
            }
            if body[offset] == 0xFF {
                if body[offset + 1..offset + 3] != EMPTY_SLOT[1..] {
                    return Err(ParseError::MalformedPlockEntry {
                        offset,
                        found: [body[offset + 1], body[offset + 2]],
                    });
                }
                slots.push((offset, Slot::Empty));
                offset += EMPTY_SLOT.len();
            } else {
                if offset + 5 > body.len() {
                    return Err(ParseError::TruncatedPlock { offset });
                }
                let terminator = [body[offset + 3], body[offset + 4]];
                if terminator != [0x00, 0x00] {
                    return Err(ParseError::MalformedPlockEntry {
                        offset,
                        found: terminator,
                    });
                }
                slots.push((
                    offset,
                    Slot::Entry {
                        param_id: body[offset],
                        value: LittleEndian::read_u16(&body[offset + 1..offset + 3]),
                    },
                ));
                offset += 5;
            }
        }
        Ok(SlotTable { start, slots })
    }

    /// First param id that opens a lane (not empty, not a continuation).
    pub fn first_param_id(&self) -> Option<u8> {
        self.slots.iter().find_map(|(_, slot)| match slot {
            Slot::Entry { param_id, .. } if !CONTINUATION_IDS.contains(param_id) => Some(*param_id),
            _ => None,
        })
    }

    /// Number of values in a lane: the opening entry plus its continuation
    /// entries, terminated by an empty slot or a different real param id.
    pub fn lane_len(&self, param_id: u8) -> usize {
        self.lane_offsets(param_id).len()
    }

    /// Body offsets of a lane's value fields.
    fn lane_offsets(&self, param_id: u8) -> Vec<usize> {
        let mut offsets = Vec::new();
        let mut in_lane = false;
        for (offset, slot) in &self.slots {
            match slot {
                Slot::Entry { param_id: id, .. } => {
                    if *id == param_id && !in_lane {
                        in_lane = true;
                        offsets.push(*offset);
                    } else if in_lane && CONTINUATION_IDS.contains(id) {
                        offsets.push(*offset);
                    } else if in_lane {
                        break;
                    }
                }
                Slot::Empty => {
                    if in_lane {
                        break;
                    }
                }
            }
        }
        offsets
    }

    /// Rewrite the values of one or several disjoint lanes in encounter
    /// order, producing a new body.
    pub fn rewrite(
        &self,
        body: &[u8],
        groups: &[LaneRewrite],
        opts: RewriteOpts,
    ) -> Result<Vec<u8>, MutateError> {
        let mut out = body.to_vec();
        for group in groups {
            let offsets = self.lane_offsets(group.param_id);
            if group.values.len() != offsets.len()
                && !(opts.allow_partial && group.values.len() < offsets.len())
            {
                return Err(InvariantError::PlockValueCount {
                    param_id: group.param_id,
                    expected: offsets.len(),
                    supplied: group.values.len(),
                }
                .into());
            }
            for (&offset, &value) in offsets.iter().zip(&group.values) {
                if !opts.regenerated && value < INPLACE_VALUE_FLOOR {
                    return Err(InvariantError::PlockValueFloor { value }.into());
                }
                LittleEndian::write_u16(&mut out[offset + 1..offset + 3], value);
            }
        }
        Ok(out)
    }
}

// T10 header format constants.
const T10_HEADER_MARK: u8 = 0x51;
const T10_CONT_MARK: u8 = 0x31;
const T10_RECORD_TAIL: u8 = 0x1C;

/// Record length shared by the T10 header and its continuations.
pub const T10_RECORD_LEN: usize = 9;

/// A parsed T10-format lane: one header record plus zero or more
/// continuation records sharing the header's meta bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct T10Lane {
    pub param_id: u8,
    pub initial: u16,
    pub meta: [u8; 2],
    pub values: Vec<u16>,
}

/// Parse a T10-format lane starting at the given offset.
pub fn parse_t10(bytes: &[u8]) -> Result<T10Lane, ParseError> {
    if bytes.len() < T10_RECORD_LEN {
        return Err(ParseError::TruncatedPlock { offset: 0 });
    }
    // Header: [param][value u16][00][51][meta][meta][00][1C]
    if bytes[3] != 0x00
        || bytes[4] != T10_HEADER_MARK
        || bytes[7] != 0x00
        || bytes[8] != T10_RECORD_TAIL
    {
        return Err(ParseError::MalformedPlockRecord { offset: 0 });
    }
    let param_id = bytes[0];
    let initial = LittleEndian::read_u16(&bytes[1..3]);
    let meta = [bytes[5], bytes[6]];

    let mut values = Vec::new();
    let mut offset = T10_RECORD_LEN;
    while offset + T10_RECORD_LEN <= bytes.len() {
        let rec = &bytes[offset..offset + T10_RECORD_LEN];
        // Continuation: [value u16][00][00][31][meta][meta][00][1C]
        if rec[2] != 0x00 || rec[3] != 0x00 || rec[4] != T10_CONT_MARK {
            break;
        }
        if rec[5..7] != meta || rec[7] != 0x00 || rec[8] != T10_RECORD_TAIL {
            return Err(ParseError::MalformedPlockRecord { offset });
        }
        values.push(LittleEndian::read_u16(&rec[0..2]));
        offset += T10_RECORD_LEN;
    }
    Ok(T10Lane {
        param_id,
        initial,
        meta,
        values,
    })
}

/// Encode a T10-format lane.
pub fn encode_t10(lane: &T10Lane) -> Vec<u8> {
    let mut out = Vec::with_capacity(T10_RECORD_LEN * (1 + lane.values.len()));
    out.push(lane.param_id);
    let mut value = [0u8; 2];
    LittleEndian::write_u16(&mut value, lane.initial);
    out.extend_from_slice(&value);
    out.extend_from_slice(&[0x00, T10_HEADER_MARK, lane.meta[0], lane.meta[1], 0x00]);
    out.push(T10_RECORD_TAIL);
    for &v in &lane.values {
        LittleEndian::write_u16(&mut value, v);
        out.extend_from_slice(&value);
        out.extend_from_slice(&[0x00, 0x00, T10_CONT_MARK, lane.meta[0], lane.meta[1], 0x00]);
        out.push(T10_RECORD_TAIL);
    }
    out
}

/// Record length of the drum format.
pub const DRUM_RECORD_LEN: usize = 18;

/// Constant suffix closing every drum-format continuation record.
pub const DRUM_SUFFIX: [u8; 16] = [
    0x00, 0x00, 0x3F, 0x00, 0x00, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x7D,
];

/// A parsed drum-format lane. Only drum-engine tracks 1-2 carry this format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrumLane {
    pub param_id: u8,
    /// Values in record order; the first comes from the header record.
    pub values: Vec<u16>,
}

/// Parse a drum-format lane starting at the given offset.
pub fn parse_drum(bytes: &[u8]) -> Result<DrumLane, ParseError> {
    if bytes.len() < DRUM_RECORD_LEN {
        return Err(ParseError::TruncatedPlock { offset: 0 });
    }
    // Header: [param][value u16] + suffix minus its first byte.
    if bytes[3..DRUM_RECORD_LEN] != DRUM_SUFFIX[1..] {
        return Err(ParseError::MalformedPlockRecord { offset: 0 });
    }
    let param_id = bytes[0];
    let mut values = vec![LittleEndian::read_u16(&bytes[1..3])];

    let mut offset = DRUM_RECORD_LEN;
    while offset + DRUM_RECORD_LEN <= bytes.len() {
        let rec = &bytes[offset..offset + DRUM_RECORD_LEN];
        if rec[2..] != DRUM_SUFFIX {
            break;
        }
        values.push(LittleEndian::read_u16(&rec[0..2]));
        offset += DRUM_RECORD_LEN;
    }
    Ok(DrumLane { param_id, values })
}

/// Encode a drum-format lane.
pub fn encode_drum(lane: &DrumLane) -> Vec<u8> {
    let mut out = Vec::with_capacity(DRUM_RECORD_LEN * lane.values.len().max(1));
    let mut value = [0u8; 2];
    out.push(lane.param_id);
    LittleEndian::write_u16(&mut value, lane.values.first().copied().unwrap_or(0));
    out.extend_from_slice(&value);
    out.extend_from_slice(&DRUM_SUFFIX[1..]);
    for &v in lane.values.iter().skip(1) {
        LittleEndian::write_u16(&mut value, v);
        out.extend_from_slice(&value);
        out.extend_from_slice(&DRUM_SUFFIX);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// A body holding the signature, then an interleaved table: a 3-value
    /// lane for 0x22 (entry + two continuations), an empty slot, and a
    /// 1-value lane for 0x30, padded with empties to 48 slots.
    fn table_body() -> Vec<u8> {
        let mut body = vec![0x00; 6];
        body.extend_from_slice(&PLOCK_SIG);
        body.extend_from_slice(&[0x22, 0x00, 0x02, 0x00, 0x00]);
        body.extend_from_slice(&[0x00, 0x01, 0x03, 0x00, 0x00]);
        body.extend_from_slice(&[0x50, 0x02, 0x04, 0x00, 0x00]);
        body.extend_from_slice(&EMPTY_SLOT);
        body.extend_from_slice(&[0x30, 0xE8, 0x03, 0x00, 0x00]);
        for _ in 0..SLOT_COUNT - 5 {
            body.extend_from_slice(&EMPTY_SLOT);
        }
        body
    }

    #[test]
    fn test_find_signature() {
        let body = table_body();
        assert_eq!(find_plock_start(&body).unwrap(), 6 + PLOCK_SIG.len());
        assert_eq!(
            find_plock_start(&[0u8; 32]),
            Err(ParseError::PlockSignatureMissing)
        );
    }

    #[test]
    fn test_parse_table() {
        let body = table_body();
        let table = SlotTable::parse(&body).unwrap();
        assert_eq!(table.slots.len(), SLOT_COUNT);
        assert_eq!(
            table.slots[0].1,
            Slot::Entry {
                param_id: 0x22,
                value: 0x0200
            }
        );
        assert_eq!(table.slots[3].1, Slot::Empty);
        assert_eq!(table.first_param_id(), Some(0x22));
    }

    #[test]
    fn test_lane_len_follows_continuations() {
        let table = SlotTable::parse(&table_body()).unwrap();
        assert_eq!(table.lane_len(0x22), 3);
        assert_eq!(table.lane_len(0x30), 1);
        assert_eq!(table.lane_len(0x77), 0);
    }

    #[test]
    fn test_rewrite_in_place() {
        let body = table_body();
        let table = SlotTable::parse(&body).unwrap();
        let out = table
            .rewrite(
                &body,
                &[LaneRewrite {
                    param_id: 0x22,
                    values: vec![300, 400, 500],
                }],
                RewriteOpts::default(),
            )
            .unwrap();
        let reparsed = SlotTable::parse(&out).unwrap();
        let values: Vec<u16> = reparsed
            .slots
            .iter()
            .take(3)
            .map(|(_, slot)| match slot {
                Slot::Entry { value, .. } => *value,
                Slot::Empty => panic!("lane slot became empty"),
            })
            .collect();
        assert_eq!(values, vec![300, 400, 500]);
        // Everything outside the rewritten value fields is untouched.
        assert_eq!(out.len(), body.len());
        assert_eq!(out[..15], body[..15]);
    }

    #[test]
    fn test_rewrite_floor_enforced() {
        let body = table_body();
        let table = SlotTable::parse(&body).unwrap();
        let err = table
            .rewrite(
                &body,
                &[LaneRewrite {
                    param_id: 0x30,
                    values: vec![100],
                }],
                RewriteOpts::default(),
            )
            .unwrap_err();
        assert_eq!(
            err,
            MutateError::Invariant(InvariantError::PlockValueFloor { value: 100 })
        );
        // Regeneration lifts the floor.
        assert!(table
            .rewrite(
                &body,
                &[LaneRewrite {
                    param_id: 0x30,
                    values: vec![100],
                }],
                RewriteOpts {
                    regenerated: true,
                    ..Default::default()
                },
            )
            .is_ok());
    }

    #[test]
    fn test_rewrite_count_mismatch() {
        let body = table_body();
        let table = SlotTable::parse(&body).unwrap();
        let err = table
            .rewrite(
                &body,
                &[LaneRewrite {
                    param_id: 0x22,
                    values: vec![300],
                }],
                RewriteOpts::default(),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            MutateError::Invariant(InvariantError::PlockValueCount {
                expected: 3,
                supplied: 1,
                ..
            })
        ));
        // Partial consumption is an explicit opt-in.
        assert!(table
            .rewrite(
                &body,
                &[LaneRewrite {
                    param_id: 0x22,
                    values: vec![300],
                }],
                RewriteOpts {
                    allow_partial: true,
                    ..Default::default()
                },
            )
            .is_ok());
    }

    #[test]
    fn test_malformed_entry_rejected() {
        let mut body = table_body();
        let start = find_plock_start(&body).unwrap();
        body[start + 4] = 0x01; // non-zero terminator on the first entry
        assert!(matches!(
            SlotTable::parse(&body),
            Err(ParseError::MalformedPlockEntry { .. })
        ));
    }

    #[test]
    fn test_t10_round_trip() {
        let lane = T10Lane {
            param_id: 0x12,
            initial: 512,
            meta: [0x34, 0x01],
            values: vec![600, 700],
        };
        let bytes = encode_t10(&lane);
        assert_eq!(bytes.len(), 3 * T10_RECORD_LEN);
        assert_eq!(parse_t10(&bytes).unwrap(), lane);
    }

    #[test]
    fn test_t10_stops_at_foreign_data() {
        let lane = T10Lane {
            param_id: 0x12,
            initial: 512,
            meta: [0x34, 0x01],
            values: vec![600],
        };
        let mut bytes = encode_t10(&lane);
        bytes.extend_from_slice(&[0x99; 9]);
        assert_eq!(parse_t10(&bytes).unwrap(), lane);
    }

    #[test]
    fn test_t10_meta_mismatch_rejected() {
        let lane = T10Lane {
            param_id: 0x12,
            initial: 512,
            meta: [0x34, 0x01],
            values: vec![600],
        };
        let mut bytes = encode_t10(&lane);
        bytes[T10_RECORD_LEN + 5] ^= 0xFF; // continuation meta diverges
        assert!(matches!(
            parse_t10(&bytes),
            Err(ParseError::MalformedPlockRecord { .. })
        ));
    }

    #[test]
    fn test_drum_round_trip() {
        let lane = DrumLane {
            param_id: 0x41,
            values: vec![1000, 1100, 1200],
        };
        let bytes = encode_drum(&lane);
        assert_eq!(bytes.len(), 3 * DRUM_RECORD_LEN);
        assert_eq!(parse_drum(&bytes).unwrap(), lane);
    }
}
