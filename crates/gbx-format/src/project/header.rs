//! Named header fields packed into the pre-track region.
//!
//! The playback settings live in a 32-bit little-endian word at 0x08 plus
//! two adjacent single bytes. The multi-pattern counters for tracks 1 and 2
//! are two independent bytes at 0x56/0x57.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::ParseError;

/// Offset of the packed tempo/groove word.
pub const HEADER_WORD_OFFSET: usize = 0x08;

/// Offset of the groove amount byte.
pub const GROOVE_AMOUNT_OFFSET: usize = 0x0C;

/// Offset of the metronome level byte.
pub const METRONOME_OFFSET: usize = 0x0D;

/// Track-1 pattern-count-minus-one counter.
pub const PATTERN_COUNTER_1: usize = 0x56;

/// Track-2 pattern-count-minus-one counter.
pub const PATTERN_COUNTER_2: usize = 0x57;

/// Offset at which the variable-length multi-pattern descriptor is inserted.
pub const DESCRIPTOR_OFFSET: usize = 0x58;

/// Decoded header fields. Round-trips exactly through [`Header::write`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Header {
    /// Tempo in tenths of BPM (1200 = 120.0 BPM).
    pub tempo_tenths: u16,
    /// Groove flag bits.
    pub groove_flags: u8,
    /// Groove type selector.
    pub groove_type: u8,
    /// Groove amount.
    pub groove_amount: u8,
    /// Metronome level.
    pub metronome_level: u8,
}

impl Header {
    /// Read the header fields from a pre-track region.
    pub fn read(pre_track: &[u8]) -> Result<Self, ParseError> {
        if pre_track.len() < METRONOME_OFFSET + 1 {
            return Err(ParseError::TooShort {
                len: pre_track.len(),
                minimum: METRONOME_OFFSET + 1,
            });
        }
        let word = LittleEndian::read_u32(&pre_track[HEADER_WORD_OFFSET..HEADER_WORD_OFFSET + 4]);
        Ok(Header {
            tempo_tenths: (word & 0xFFFF) as u16,
            groove_flags: ((word >> 16) & 0xFF) as u8,
            groove_type: ((word >> 24) & 0xFF) as u8,
            groove_amount: pre_track[GROOVE_AMOUNT_OFFSET],
            metronome_level: pre_track[METRONOME_OFFSET],
        })
    }

    /// Write the header fields back into a pre-track region.
    pub fn write(&self, pre_track: &mut [u8]) -> Result<(), ParseError> {
        if pre_track.len() < METRONOME_OFFSET + 1 {
            return Err(ParseError::TooShort {
                len: pre_track.len(),
                minimum: METRONOME_OFFSET + 1,
            });
        }
        let word = self.tempo_tenths as u32
            | (self.groove_flags as u32) << 16
            | (self.groove_type as u32) << 24;
        LittleEndian::write_u32(
            &mut pre_track[HEADER_WORD_OFFSET..HEADER_WORD_OFFSET + 4],
            word,
        );
        pre_track[GROOVE_AMOUNT_OFFSET] = self.groove_amount;
        pre_track[METRONOME_OFFSET] = self.metronome_level;
        Ok(())
    }
}

/// Read the track-1 / track-2 pattern counters.
pub fn pattern_counters(pre_track: &[u8]) -> Result<(u8, u8), ParseError> {
    if pre_track.len() < PATTERN_COUNTER_2 + 1 {
        return Err(ParseError::TooShort {
            len: pre_track.len(),
            minimum: PATTERN_COUNTER_2 + 1,
        });
    }
    Ok((pre_track[PATTERN_COUNTER_1], pre_track[PATTERN_COUNTER_2]))
}

/// Write the track-1 / track-2 pattern counters.
pub fn set_pattern_counters(
    pre_track: &mut [u8],
    track1: u8,
    track2: u8,
) -> Result<(), ParseError> {
    if pre_track.len() < PATTERN_COUNTER_2 + 1 {
        return Err(ParseError::TooShort {
            len: pre_track.len(),
            minimum: PATTERN_COUNTER_2 + 1,
        });
    }
    pre_track[PATTERN_COUNTER_1] = track1;
    pre_track[PATTERN_COUNTER_2] = track2;
    Ok(())
}
