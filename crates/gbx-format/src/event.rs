//! Note-event codec.
//!
//! A note event is a variable-length record embedded in a track body:
//! a two-byte `[event_type][count]` header followed by `count` note records
//! sorted ascending by absolute tick. The per-record tick encoding is a small
//! state machine driven by a continuation byte; the four forms are modeled by
//! [`TickEncoding`] and matched exhaustively in both directions.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{ParseError, ValidationError};

/// Sequencer resolution: one 16th-note step is 480 ticks.
pub const TICKS_PER_STEP: u32 = 480;

/// Highest step addressable by one event record.
pub const MAX_STEP: u8 = 64;

/// Maximum notes in one event record.
pub const MAX_NOTES: usize = 64;

/// Event type bytes observed across all engines and track slots.
pub const VALID_EVENT_TYPES: [u8; 6] = [0x1E, 0x1F, 0x20, 0x21, 0x25, 0x2D];

/// Gate field marker for the firmware default gate length.
pub const GATE_DEFAULT_MARK: [u8; 4] = [0xF0, 0x00, 0x00, 0x01];

const CONT_ABSOLUTE: u8 = 0x00;
const CONT_ESCAPE: u8 = 0x01;
const CONT_CHORD: u8 = 0x04;

const FLAG_TICK_PRESENT: u8 = 0x00;
const FLAG_TICK_ZERO: u8 = 0x02;

/// One note trigger on the 16th-note grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Note {
    /// 1-based position on the 16th-note grid.
    pub step: u8,
    /// Pitch, 0-127.
    pub note: u8,
    /// Velocity, 0-127.
    pub velocity: u8,
    /// Sub-step micro-timing in ticks, 0-479.
    pub tick_offset: u16,
    /// Explicit gate length in ticks; 0 selects the firmware default gate.
    pub gate_ticks: u16,
}

impl Note {
    /// Absolute tick position of this note.
    pub fn abs_tick(&self) -> u32 {
        (self.step as u32 - 1) * TICKS_PER_STEP + self.tick_offset as u32
    }
}

/// The four tick encodings a record can use, selected by the continuation
/// byte in front of it (or by the first-note rule).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickEncoding {
    /// Explicit 2-byte little-endian tick.
    Absolute2,
    /// Explicit 4-byte little-endian tick; only the first note uses this.
    Absolute4,
    /// Single high byte, tick = byte << 8.
    Escape8High,
    /// No tick field; the tick is inherited from the previous note.
    ChordContinuation,
}

impl TickEncoding {
    fn continuation_byte(&self) -> u8 {
        match self {
            TickEncoding::Absolute2 => CONT_ABSOLUTE,
            TickEncoding::Escape8High => CONT_ESCAPE,
            TickEncoding::ChordContinuation => CONT_CHORD,
            // The 4-byte form never appears behind a continuation byte.
            TickEncoding::Absolute4 => CONT_ABSOLUTE,
        }
    }

    fn from_continuation(byte: u8, offset: usize) -> Result<Self, ParseError> {
        match byte {
            CONT_ABSOLUTE => Ok(TickEncoding::Absolute2),
            CONT_ESCAPE => Ok(TickEncoding::Escape8High),
            CONT_CHORD => Ok(TickEncoding::ChordContinuation),
            other => Err(ParseError::BadContinuation {
                offset,
                found: other,
            }),
        }
    }
}

/// Pick the encoding for a non-first note relative to its predecessor.
fn select_encoding(prev_tick: u32, tick: u32) -> TickEncoding {
    if tick == prev_tick {
        TickEncoding::ChordContinuation
    } else if tick != 0 && tick & 0xFF == 0 {
        TickEncoding::Escape8High
    } else {
        TickEncoding::Absolute2
    }
}

fn check_range(
    field: &'static str,
    value: u32,
    min: u32,
    max: u32,
) -> Result<(), ValidationError> {
    if value < min || value > max {
        return Err(ValidationError::FieldOutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}

fn validate_note(note: &Note) -> Result<(), ValidationError> {
    check_range("step", note.step as u32, 1, MAX_STEP as u32)?;
    check_range("note", note.note as u32, 0, 127)?;
    check_range("velocity", note.velocity as u32, 0, 127)?;
    check_range("tick_offset", note.tick_offset as u32, 0, TICKS_PER_STEP - 1)?;
    Ok(())
}

/// The firmware rejects records where pitch and velocity are exactly equal;
/// nudge velocity by one to stay clear of that crash path.
fn nudged_velocity(note: &Note) -> u8 {
    if note.note == note.velocity {
        if note.velocity == 127 {
            126
        } else {
            note.velocity + 1
        }
    } else {
        note.velocity
    }
}

fn push_flag_and_pads(out: &mut Vec<u8>, tick: u32) {
    if tick == 0 {
        out.push(FLAG_TICK_ZERO);
    } else {
        out.push(FLAG_TICK_PRESENT);
        out.extend_from_slice(&[0x00, 0x00]);
    }
}

fn push_gate(out: &mut Vec<u8>, gate_ticks: u16) {
    if gate_ticks == 0 {
        out.extend_from_slice(&GATE_DEFAULT_MARK);
    } else {
        let mut field = [0u8; 2];
        LittleEndian::write_u16(&mut field, gate_ticks);
        out.extend_from_slice(&field);
        out.extend_from_slice(&[0x00, 0x00, 0x00]);
    }
}

/// Encode a note list into one event record.
///
/// Notes are sorted by absolute tick before encoding; simultaneous notes are
/// emitted through the chord-continuation path in their given order.
pub fn encode(notes: &[Note], event_type: u8) -> Result<Vec<u8>, ValidationError> {
    if notes.is_empty() {
        return Err(ValidationError::EmptyNotes);
    }
    if notes.len() > MAX_NOTES {
        return Err(ValidationError::TooManyNotes { count: notes.len() });
    }
    if !VALID_EVENT_TYPES.contains(&event_type) {
        return Err(ValidationError::UnknownEventType { found: event_type });
    }
    for note in notes {
        validate_note(note)?;
    }

    let mut sorted = notes.to_vec();
    sorted.sort_by_key(Note::abs_tick);

    let mut out = vec![event_type, sorted.len() as u8];
    for (i, note) in sorted.iter().enumerate() {
        let tick = note.abs_tick();
        if i == 0 {
            if tick == 0 {
                let mut field = [0u8; 2];
                LittleEndian::write_u16(&mut field, 0);
                out.extend_from_slice(&field);
                out.push(FLAG_TICK_ZERO);
            } else {
                let mut field = [0u8; 4];
                LittleEndian::write_u32(&mut field, tick);
                out.extend_from_slice(&field);
                out.push(FLAG_TICK_PRESENT);
                out.extend_from_slice(&[0x00, 0x00]);
            }
        } else {
            let prev_tick = sorted[i - 1].abs_tick();
            match select_encoding(prev_tick, tick) {
                TickEncoding::ChordContinuation => {}
                TickEncoding::Escape8High => {
                    out.push((tick >> 8) as u8);
                    push_flag_and_pads(&mut out, tick);
                }
                TickEncoding::Absolute2 | TickEncoding::Absolute4 => {
                    let mut field = [0u8; 2];
                    LittleEndian::write_u16(&mut field, tick as u16);
                    out.extend_from_slice(&field);
                    push_flag_and_pads(&mut out, tick);
                }
            }
        }

        push_gate(&mut out, note.gate_ticks);
        out.push(note.note);
        out.push(nudged_velocity(note));

        // Trail of this note, then the next note's continuation byte.
        out.extend_from_slice(&[0x00, 0x00]);
        if let Some(next) = sorted.get(i + 1) {
            out.push(select_encoding(tick, next.abs_tick()).continuation_byte());
        }
    }
    Ok(out)
}

/// Locate and decode the note event inside an activated track body.
///
/// Events sit after the parameter-lock table (and before the parameter tail
/// on tail-insertion engines). The body itself stores no event offset, so
/// candidate offsets are tried in order: the first position whose byte is a
/// known event type and whose record decodes cleanly wins.
pub fn locate(body: &[u8], engine: crate::engine::EngineId) -> Option<(usize, Vec<Note>)> {
    let search_start = crate::plock::find_plock_start(body)
        .map(|start| start + crate::plock::SLOT_COUNT * crate::plock::EMPTY_SLOT.len())
        .unwrap_or(0);
    let search_end = match crate::engine::layout(engine).insert {
        crate::engine::InsertMode::BeforeTail => {
            body.len().saturating_sub(crate::engine::PARAM_TAIL_LEN)
        }
        crate::engine::InsertMode::Append => body.len(),
    };
    for offset in search_start..search_end {
        if !VALID_EVENT_TYPES.contains(&body[offset]) {
            continue;
        }
        if let Ok(notes) = decode(&body[offset..search_end]) {
            return Some((offset, notes));
        }
    }
    None
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn u8(&mut self) -> Result<u8, ParseError> {
        let byte = self
            .bytes
            .get(self.pos)
            .copied()
            .ok_or(ParseError::TruncatedEvent { offset: self.pos })?;
        self.pos += 1;
        Ok(byte)
    }

    fn u16(&mut self) -> Result<u16, ParseError> {
        if self.pos + 2 > self.bytes.len() {
            return Err(ParseError::TruncatedEvent { offset: self.pos });
        }
        let value = LittleEndian::read_u16(&self.bytes[self.pos..self.pos + 2]);
        self.pos += 2;
        Ok(value)
    }

    fn skip(&mut self, n: usize) -> Result<(), ParseError> {
        if self.pos + n > self.bytes.len() {
            return Err(ParseError::TruncatedEvent { offset: self.pos });
        }
        self.pos += n;
        Ok(())
    }

    fn peek4(&self) -> Option<[u8; 4]> {
        if self.pos + 4 > self.bytes.len() {
            return None;
        }
        let mut out = [0u8; 4];
        out.copy_from_slice(&self.bytes[self.pos..self.pos + 4]);
        Some(out)
    }
}

/// Consume the tick flag byte and any pad bytes that follow it.
fn read_flag_and_pads(r: &mut Reader<'_>) -> Result<(), ParseError> {
    let offset = r.pos;
    match r.u8()? {
        FLAG_TICK_ZERO => Ok(()),
        FLAG_TICK_PRESENT => r.skip(2),
        other => Err(ParseError::BadTickFlag {
            offset,
            found: other,
        }),
    }
}

fn read_gate(r: &mut Reader<'_>) -> Result<u16, ParseError> {
    if r.peek4() == Some(GATE_DEFAULT_MARK) {
        r.skip(4)?;
        return Ok(0);
    }
    let offset = r.pos;
    let gate = r.u16()?;
    for _ in 0..3 {
        if r.u8()? != 0x00 {
            return Err(ParseError::BadGateField { offset });
        }
    }
    Ok(gate)
}

/// Decode one event record.
///
/// Mirrors [`encode`] exactly; bytes after the declared note count are
/// ignored, since captured bodies routinely carry trailing data there.
pub fn decode(bytes: &[u8]) -> Result<Vec<Note>, ParseError> {
    let mut r = Reader { bytes, pos: 0 };

    let event_type = r.u8()?;
    if !VALID_EVENT_TYPES.contains(&event_type) {
        return Err(ParseError::UnknownEventType {
            offset: 0,
            found: event_type,
        });
    }
    let count = r.u8()?;
    if count == 0 || count as usize > MAX_NOTES {
        return Err(ParseError::InvalidNoteCount { offset: 1, count });
    }

    let mut notes = Vec::with_capacity(count as usize);
    let mut prev_tick = 0u32;
    for i in 0..count {
        let tick;
        if i == 0 {
            let low = r.u16()? as u32;
            let offset = r.pos;
            let third = r.u8()?;
            if third == FLAG_TICK_ZERO {
                tick = low;
            } else {
                // 4-byte form: the byte just read is tick byte 2.
                let high = r.u8()? as u32;
                tick = low | (third as u32) << 16 | high << 24;
                let flag = r.u8()?;
                if flag != FLAG_TICK_PRESENT {
                    return Err(ParseError::BadTickFlag {
                        offset,
                        found: flag,
                    });
                }
                r.skip(2)?;
            }
        } else {
            let offset = r.pos;
            let cont = r.u8()?;
            match TickEncoding::from_continuation(cont, offset)? {
                TickEncoding::ChordContinuation => {
                    tick = prev_tick;
                }
                TickEncoding::Escape8High => {
                    tick = (r.u8()? as u32) << 8;
                    read_flag_and_pads(&mut r)?;
                }
                TickEncoding::Absolute2 | TickEncoding::Absolute4 => {
                    tick = r.u16()? as u32;
                    read_flag_and_pads(&mut r)?;
                }
            }
        }

        let gate_ticks = read_gate(&mut r)?;
        let note = r.u8()?;
        let velocity = r.u8()?;
        r.skip(2)?;

        notes.push(Note {
            step: (tick / TICKS_PER_STEP) as u8 + 1,
            note,
            velocity,
            tick_offset: (tick % TICKS_PER_STEP) as u16,
            gate_ticks,
        });
        prev_tick = tick;
    }
    Ok(notes)
}
