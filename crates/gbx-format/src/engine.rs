//! Synth-engine identifiers and the per-engine layout table.
//!
//! The engine id byte inside a track body selects several codec layout
//! variants: where note events are inserted, where the step-component slot
//! table starts, and the baseline added to the allocation marker. The table
//! is a closed `match` so a newly recovered engine cannot be added without
//! deciding all of its fields.

/// Known synth engines, keyed by the engine id byte in the track body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EngineId {
    /// Drum engine (tracks 1-2 on factory projects).
    Drum,
    /// Bass engine.
    Bass,
    /// Sampler engine.
    Sampler,
    /// Prism engine.
    Prism,
    /// Electric piano engine. Carries the fixed 47-byte parameter tail.
    EPiano,
    /// Pluck engine. Carries the fixed 47-byte parameter tail.
    Pluck,
    /// Wavetable engine.
    Wavetable,
    /// Engine byte not seen in any dissected capture. Treated with default
    /// layout; callers that need exactness should reject it upstream.
    Other(u8),
}

impl EngineId {
    /// Map the engine id byte from a track body.
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0x01 => EngineId::Drum,
            0x02 => EngineId::Bass,
            0x03 => EngineId::Sampler,
            0x04 => EngineId::Prism,
            0x05 => EngineId::EPiano,
            0x06 => EngineId::Pluck,
            0x07 => EngineId::Wavetable,
            other => EngineId::Other(other),
        }
    }

    /// The engine id byte as stored in a track body.
    pub fn as_byte(&self) -> u8 {
        match self {
            EngineId::Drum => 0x01,
            EngineId::Bass => 0x02,
            EngineId::Sampler => 0x03,
            EngineId::Prism => 0x04,
            EngineId::EPiano => 0x05,
            EngineId::Pluck => 0x06,
            EngineId::Wavetable => 0x07,
            EngineId::Other(b) => *b,
        }
    }

    /// Short lowercase name for display.
    pub fn name(&self) -> &'static str {
        match self {
            EngineId::Drum => "drum",
            EngineId::Bass => "bass",
            EngineId::Sampler => "sampler",
            EngineId::Prism => "prism",
            EngineId::EPiano => "epiano",
            EngineId::Pluck => "pluck",
            EngineId::Wavetable => "wavetable",
            EngineId::Other(_) => "unknown",
        }
    }
}

/// Where note events go when inserted into an activated body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertMode {
    /// Append the encoded event after the last body byte.
    Append,
    /// Insert the encoded event immediately before the fixed parameter tail
    /// and clear the events-marker bit in the tail's first byte.
    BeforeTail,
}

/// Length of the fixed trailing parameter block on tail-insertion engines.
pub const PARAM_TAIL_LEN: usize = 47;

/// Bit in the parameter tail's first byte that is cleared once the body
/// carries note events.
pub const TAIL_EVENTS_BIT: u8 = 0x40;

/// Per-engine codec layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineLayout {
    /// Note-event insertion point.
    pub insert: InsertMode,
    /// Offset of the step-component slot table in an activated body.
    pub component_table: usize,
    /// Offset of the component allocation marker in an activated body.
    pub alloc_offset: usize,
    /// Engine baseline added to the computed allocation byte.
    pub alloc_baseline: u8,
}

/// Layout table for all engines. The default arm covers engines whose
/// captures showed no layout deviation.
pub fn layout(engine: EngineId) -> EngineLayout {
    match engine {
        EngineId::Drum => EngineLayout {
            insert: InsertMode::Append,
            component_table: 0x1C,
            alloc_offset: 0x14,
            alloc_baseline: 0x10,
        },
        EngineId::Prism => EngineLayout {
            insert: InsertMode::Append,
            component_table: 0x18,
            alloc_offset: 0x14,
            alloc_baseline: 0x08,
        },
        EngineId::EPiano | EngineId::Pluck => EngineLayout {
            insert: InsertMode::BeforeTail,
            component_table: 0x18,
            alloc_offset: 0x14,
            alloc_baseline: 0x00,
        },
        _ => EngineLayout {
            insert: InsertMode::Append,
            component_table: 0x18,
            alloc_offset: 0x14,
            alloc_baseline: 0x00,
        },
    }
}

/// Resolve the note-event type byte for a track slot.
///
/// Track 1 always uses 0x25 regardless of engine. Other slots default to
/// 0x21 unless the engine overrides it. `track` is 0-based.
pub fn event_type_for_track(track: usize, engine: EngineId) -> u8 {
    if track == 0 {
        return 0x25;
    }
    match engine {
        EngineId::Drum => 0x1F,
        EngineId::Bass => 0x1E,
        EngineId::Sampler => 0x20,
        EngineId::Prism => 0x2D,
        _ => 0x21,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_byte_round_trip() {
        for byte in 0x01..=0x07u8 {
            assert_eq!(EngineId::from_byte(byte).as_byte(), byte);
        }
        assert_eq!(EngineId::from_byte(0x42), EngineId::Other(0x42));
        assert_eq!(EngineId::Other(0x42).as_byte(), 0x42);
    }

    #[test]
    fn test_tail_engines_insert_before_tail() {
        assert_eq!(layout(EngineId::EPiano).insert, InsertMode::BeforeTail);
        assert_eq!(layout(EngineId::Pluck).insert, InsertMode::BeforeTail);
        assert_eq!(layout(EngineId::Drum).insert, InsertMode::Append);
        assert_eq!(layout(EngineId::Other(0x30)).insert, InsertMode::Append);
    }

    #[test]
    fn test_event_type_track_one_wins() {
        assert_eq!(event_type_for_track(0, EngineId::Drum), 0x25);
        assert_eq!(event_type_for_track(0, EngineId::Prism), 0x25);
        assert_eq!(event_type_for_track(1, EngineId::Drum), 0x1F);
        assert_eq!(event_type_for_track(4, EngineId::Prism), 0x2D);
        assert_eq!(event_type_for_track(12, EngineId::Wavetable), 0x21);
    }
}
