//! Container layer: splits a raw capture into the pre-track region and the
//! 16 physical track blocks, and reassembles the exact reverse.

pub mod header;

use crate::engine::EngineId;
use crate::error::ParseError;

/// File magic at offset 0.
pub const MAGIC: [u8; 4] = [0x47, 0x42, 0x58, 0x00];

/// First three bytes of the 8-byte track signature.
pub const SIG_HEAD: [u8; 3] = [0xAA, 0x55, 0x0E];

/// Last four bytes of the 8-byte track signature. The byte between head and
/// tail varies per capture and is not matched.
pub const SIG_TAIL: [u8; 4] = [0x00, 0x40, 0x00, 0x21];

/// Total track signature length.
pub const SIG_LEN: usize = 8;

/// External preamble length in front of each physical block.
pub const PREAMBLE_LEN: usize = 4;

/// Number of physical track block slots in every project file.
pub const TRACK_COUNT: usize = 16;

/// Size of the pre-track region when no multi-pattern descriptor is present.
pub const PRE_TRACK_BASE_LEN: usize = 0x58;

/// Body offset of the type byte.
pub const BODY_TYPE_OFFSET: usize = 9;

/// Type byte of an inactive body (2 pad bytes follow at offsets 10-11).
pub const TYPE_INACTIVE: u8 = 0x05;

/// Type byte of an activated body (no padding).
pub const TYPE_ACTIVE: u8 = 0x07;

/// Engine id byte offset in an activated body.
pub const ENGINE_ID_OFFSET_ACTIVE: usize = 10;

/// Engine id byte offset in an inactive body (after the 2 pad bytes).
pub const ENGINE_ID_OFFSET_INACTIVE: usize = 12;

/// Smallest buffer that can hold a valid project: base pre-track region plus
/// 16 blocks of preamble, signature and the fixed body prefix.
pub const MIN_FILE_LEN: usize = PRE_TRACK_BASE_LEN + TRACK_COUNT * (PREAMBLE_LEN + 13);

/// One physical track slot: a 4-byte preamble and an immutable body.
///
/// Bodies are never edited in place; mutation always produces a new block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackBlock {
    /// Sentinel byte, pattern-count byte, bar-count nibble, constant byte.
    pub preamble: [u8; 4],
    /// Body bytes, beginning with the 8-byte track signature.
    pub body: Vec<u8>,
}

impl TrackBlock {
    /// The type byte, if the body is long enough to carry one.
    pub fn type_byte(&self) -> Option<u8> {
        self.body.get(BODY_TYPE_OFFSET).copied()
    }

    /// Whether the body has been activated.
    pub fn is_active(&self) -> bool {
        self.type_byte() == Some(TYPE_ACTIVE)
    }

    /// The engine id, read from the type-dependent offset.
    pub fn engine_id(&self) -> Result<EngineId, ParseError> {
        let offset = if self.is_active() {
            ENGINE_ID_OFFSET_ACTIVE
        } else {
            ENGINE_ID_OFFSET_INACTIVE
        };
        let byte = self
            .body
            .get(offset)
            .copied()
            .ok_or(ParseError::BodyTooShort {
                len: self.body.len(),
                needed: offset + 1,
            })?;
        Ok(EngineId::from_byte(byte))
    }

    /// Pattern count declared on this block's preamble. 0 and 1 both mean a
    /// single pattern.
    pub fn pattern_count(&self) -> usize {
        (self.preamble[1] as usize).max(1)
    }
}

/// A whole project file: the opaque pre-track region plus exactly 16 blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    /// Header plus variable-length descriptor area, owned verbatim.
    pub pre_track: Vec<u8>,
    /// The 16 physical track blocks in file order.
    pub tracks: Vec<TrackBlock>,
}

impl Project {
    /// Parse a captured project file.
    ///
    /// Locates the 16 physical blocks by scanning for the track signature.
    /// Signature matches beyond the 16th are accepted only when the pre-track
    /// region indicates multi-pattern content: they belong to the overflow
    /// chain inside the final slot, which carries its entries' preambles
    /// inline.
    pub fn parse(bytes: &[u8]) -> Result<Self, ParseError> {
        if bytes.len() < MIN_FILE_LEN {
            return Err(ParseError::TooShort {
                len: bytes.len(),
                minimum: MIN_FILE_LEN,
            });
        }
        let mut found = [0u8; 4];
        found.copy_from_slice(&bytes[..4]);
        if found != MAGIC {
            return Err(ParseError::BadMagic {
                expected: MAGIC,
                found,
            });
        }

        let matches = scan_signatures(bytes, PREAMBLE_LEN);
        if matches.len() < TRACK_COUNT {
            return Err(ParseError::TrackCount {
                found: matches.len(),
            });
        }
        if matches.len() > TRACK_COUNT && !multi_pattern_hint(bytes, matches[0] - PREAMBLE_LEN) {
            return Err(ParseError::TrackCount {
                found: matches.len(),
            });
        }

        let starts: Vec<usize> = matches
            .iter()
            .take(TRACK_COUNT)
            .map(|sig| sig - PREAMBLE_LEN)
            .collect();
        let pre_track = bytes[..starts[0]].to_vec();

        let mut tracks = Vec::with_capacity(TRACK_COUNT);
        for (k, &start) in starts.iter().enumerate() {
            let end = if k + 1 < TRACK_COUNT {
                starts[k + 1]
            } else {
                bytes.len()
            };
            let mut preamble = [0u8; 4];
            preamble.copy_from_slice(&bytes[start..start + PREAMBLE_LEN]);
            tracks.push(TrackBlock {
                preamble,
                body: bytes[start + PREAMBLE_LEN..end].to_vec(),
            });
        }

        Ok(Project { pre_track, tracks })
    }

    /// Serialize back to bytes: pre-track region, then each block's preamble
    /// and body. The format has no padding or alignment beyond what track
    /// bodies already contain.
    pub fn serialize(&self) -> Vec<u8> {
        let body_len: usize = self
            .tracks
            .iter()
            .map(|t| PREAMBLE_LEN + t.body.len())
            .sum();
        let mut out = Vec::with_capacity(self.pre_track.len() + body_len);
        out.extend_from_slice(&self.pre_track);
        for track in &self.tracks {
            out.extend_from_slice(&track.preamble);
            out.extend_from_slice(&track.body);
        }
        out
    }
}

/// All offsets in `bytes` (at or after `from`) where a track signature
/// begins.
pub(crate) fn scan_signatures(bytes: &[u8], from: usize) -> Vec<usize> {
    let mut out = Vec::new();
    if bytes.len() < SIG_LEN {
        return out;
    }
    for i in from..=bytes.len() - SIG_LEN {
        if bytes[i..i + 3] == SIG_HEAD && bytes[i + 4..i + 8] == SIG_TAIL {
            out.push(i);
        }
    }
    out
}

/// Whether the pre-track region declares multi-pattern content: a non-zero
/// pattern counter for track 1 or 2, or a descriptor area extending the
/// region past its base size.
fn multi_pattern_hint(bytes: &[u8], pre_track_len: usize) -> bool {
    bytes[header::PATTERN_COUNTER_1] != 0
        || bytes[header::PATTERN_COUNTER_2] != 0
        || pre_track_len > PRE_TRACK_BASE_LEN
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_round_trip_baseline() {
        let bytes = fixture::baseline_project_bytes();
        let project = Project::parse(&bytes).unwrap();
        assert_eq!(project.tracks.len(), TRACK_COUNT);
        assert_eq!(project.pre_track.len(), PRE_TRACK_BASE_LEN);
        assert_eq!(project.serialize(), bytes);
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = fixture::baseline_project_bytes();
        bytes[0] ^= 0xFF;
        match Project::parse(&bytes) {
            Err(ParseError::BadMagic { expected, .. }) => assert_eq!(expected, MAGIC),
            other => panic!("expected BadMagic, got {:?}", other),
        }
    }

    #[test]
    fn test_too_short() {
        let bytes = fixture::baseline_project_bytes();
        let err = Project::parse(&bytes[..MIN_FILE_LEN - 1]).unwrap_err();
        assert!(matches!(err, ParseError::TooShort { .. }));
    }

    #[test]
    fn test_missing_block_rejected() {
        let bytes = fixture::baseline_project_bytes();
        let project = Project::parse(&bytes).unwrap();
        // Drop the last block entirely.
        let mut short = Project {
            pre_track: project.pre_track.clone(),
            tracks: project.tracks[..15].to_vec(),
        }
        .serialize();
        // Keep overall length valid so the count check is what fires.
        short.extend(std::iter::repeat(0u8).take(300));
        let err = Project::parse(&short).unwrap_err();
        assert_eq!(err, ParseError::TrackCount { found: 15 });
    }

    #[test]
    fn test_extra_signature_without_hint_rejected() {
        let mut bytes = fixture::baseline_project_bytes();
        // Splice a bare signature plus preamble at the end of the file.
        bytes.extend_from_slice(&[0x40, 0x00, 0x12, 0x00]);
        bytes.extend_from_slice(&SIG_HEAD);
        bytes.push(0x30);
        bytes.extend_from_slice(&SIG_TAIL);
        let err = Project::parse(&bytes).unwrap_err();
        assert_eq!(err, ParseError::TrackCount { found: 17 });
    }

    #[test]
    fn test_engine_id_offsets() {
        let bytes = fixture::baseline_project_bytes();
        let project = Project::parse(&bytes).unwrap();
        // Fixture tracks 1-2 are drum engine, inactive.
        assert!(!project.tracks[0].is_active());
        assert_eq!(project.tracks[0].engine_id().unwrap(), EngineId::Drum);
        assert_eq!(project.tracks[4].engine_id().unwrap(), EngineId::Prism);
    }
}
