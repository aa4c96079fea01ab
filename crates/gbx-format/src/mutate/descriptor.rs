//! Multi-pattern descriptor synthesis.
//!
//! The pre-track region describes which tracks beyond 1-2 carry more than
//! one pattern. Two mutually exclusive encodings exist:
//!
//! - **Scheme A** covers any subset of tracks 3-16 with a closed-form
//!   encoder recovered from capture diffs.
//! - **Scheme B** applies as soon as track 1 or 2 participates. No general
//!   formula has been recovered for it; only a fixed table of
//!   device-verified topologies is supported, and anything else fails fast
//!   in strict mode instead of emitting a guess.

use super::DescriptorStrategy;
use crate::error::ValidationError;
use crate::project::TRACK_COUNT;

/// Synthesize the descriptor bytes for the given per-track pattern counts.
///
/// Returns an empty vector when no track has more than one pattern or the
/// verified encoding for the topology is the bare counter pair. The two
/// counter bytes at 0x56/0x57 are the caller's responsibility.
pub fn synthesize(
    counts: &[usize; TRACK_COUNT],
    strategy: DescriptorStrategy,
) -> Result<Vec<u8>, ValidationError> {
    let participants: Vec<(u8, u8)> = counts
        .iter()
        .enumerate()
        .filter(|(_, &count)| count > 1)
        .map(|(index, &count)| ((index + 1) as u8, count as u8))
        .collect();
    if participants.is_empty() {
        return Ok(Vec::new());
    }

    if participants.iter().all(|(track, _)| *track >= 3) {
        return Ok(scheme_a(&participants));
    }

    match strategy {
        DescriptorStrategy::Strict => {
            verified_descriptor(&participants).ok_or_else(|| ValidationError::UnsupportedTopology {
                tracks: participants.iter().map(|(track, _)| *track).collect(),
            })
        }
        DescriptorStrategy::HeuristicV1 => {
            // Encode the tracks >= 3 as if scheme A applied and let the
            // counters cover tracks 1-2. Wrong for several topologies.
            let high: Vec<(u8, u8)> = participants
                .iter()
                .copied()
                .filter(|(track, _)| *track >= 3)
                .collect();
            if high.is_empty() {
                Ok(Vec::new())
            } else {
                Ok(scheme_a(&high))
            }
        }
    }
}

/// Closed-form scheme A: a `(gap, maxslot)` pair per participating track,
/// a two-byte terminator, then a token derived from the highest track.
fn scheme_a(participants: &[(u8, u8)]) -> Vec<u8> {
    let mut out = Vec::with_capacity(participants.len() * 2 + 6);
    for (track, count) in participants {
        out.push(track - 3);
        out.push(count - 1);
    }
    out.extend_from_slice(&[0x00, 0x00]);
    let highest = participants.last().map(|(track, _)| *track).unwrap_or(3);
    out.push(0x1E - highest);
    out.push(0x01);
    out.extend_from_slice(&[0x00, 0x00]);
    out
}

/// Device-verified scheme-B topologies.
///
/// Each arm was diffed out of a firmware-authored capture. Topologies made
/// of tracks 1-2 alone encode entirely through the counter bytes and carry
/// no descriptor string.
fn verified_descriptor(participants: &[(u8, u8)]) -> Option<Vec<u8>> {
    match participants {
        [(1, 2)] | [(1, 3)] | [(1, 4)] => Some(Vec::new()),
        [(2, 2)] | [(2, 3)] => Some(Vec::new()),
        [(1, 2), (2, 2)] | [(1, 3), (2, 2)] | [(1, 2), (2, 3)] => Some(Vec::new()),
        [(1, 2), (3, 2)] | [(1, 2), (2, 2), (3, 2)] => {
            Some(vec![0x00, 0x01, 0x00, 0x00, 0x1B, 0x01, 0x00, 0x00])
        }
        _ => None,
    }
}
