//! Multi-pattern block rotation.
//!
//! A project file always has 16 physical block slots. When tracks carry more
//! than one pattern, the slots are repacked as a flattened sequence of
//! (track, pattern) logical entries in track order; entries beyond the 15th
//! physical slot are concatenated into the 16th slot as an overflow chain,
//! where every entry after the first carries its own 4-byte preamble inline
//! (only the first slot of a physical block has an external preamble).

use super::{
    activate_body, descriptor, insert_event, DescriptorStrategy, TrackPatterns,
    FOLLOWER_EXEMPT_TRACK, PREAMBLE_FOLLOWER_MARK,
};
use crate::engine;
use crate::error::{MutateError, ParseError, ValidationError};
use crate::event;
use crate::project::{header, scan_signatures, Project, TrackBlock, PREAMBLE_LEN, TRACK_COUNT};

/// The (track, pattern) address of one physical block after rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogicalEntry {
    /// 0-based track index.
    pub track: usize,
    /// 0-based pattern index within the track.
    pub pattern: usize,
}

/// Where a logical entry physically lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotRef {
    /// One of the first 15 physical slots.
    Direct(usize),
    /// Position inside the 16th slot's overflow chain; 0 is the externally
    /// preambled head of the chain.
    Overflow(usize),
}

/// One entry of the 16th slot's overflow chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverflowEntry {
    /// External preamble for the head entry, inline preamble otherwise.
    pub preamble: [u8; 4],
    /// Body bytes, beginning with the track signature.
    pub body: Vec<u8>,
}

/// Split the final physical slot into its overflow chain. A single-pattern
/// file yields one entry: the slot itself.
pub fn split_overflow(block: &TrackBlock) -> Vec<OverflowEntry> {
    let matches = scan_signatures(&block.body, 0);
    let mut bounds: Vec<(usize, [u8; 4])> = vec![(0, block.preamble)];
    for &sig in matches.iter().skip(1) {
        if sig < PREAMBLE_LEN {
            continue;
        }
        let mut preamble = [0u8; 4];
        preamble.copy_from_slice(&block.body[sig - PREAMBLE_LEN..sig]);
        bounds.push((sig, preamble));
    }

    let mut entries = Vec::with_capacity(bounds.len());
    for (k, &(start, preamble)) in bounds.iter().enumerate() {
        let end = if k + 1 < bounds.len() {
            bounds[k + 1].0 - PREAMBLE_LEN
        } else {
            block.body.len()
        };
        entries.push(OverflowEntry {
            preamble,
            body: block.body[start..end].to_vec(),
        });
    }
    entries
}

/// Read each track's pattern count from its leader preamble, walking the
/// rotated layout.
pub fn pattern_counts(project: &Project) -> Result<[usize; TRACK_COUNT], ParseError> {
    let overflow = split_overflow(&project.tracks[TRACK_COUNT - 1]);
    let present = TRACK_COUNT - 1 + overflow.len();

    let mut counts = [1usize; TRACK_COUNT];
    let mut cursor = 0usize;
    for count in counts.iter_mut() {
        let preamble = if cursor < TRACK_COUNT - 1 {
            project.tracks[cursor].preamble
        } else {
            overflow
                .get(cursor - (TRACK_COUNT - 1))
                .ok_or(ParseError::LogicalEntryCount {
                    declared: cursor + 1,
                    present,
                })?
                .preamble
        };
        *count = (preamble[1] as usize).max(1);
        cursor += *count;
    }
    if cursor != present {
        return Err(ParseError::LogicalEntryCount {
            declared: cursor,
            present,
        });
    }
    Ok(counts)
}

/// Enumerate the flattened (track, pattern) entries and their physical
/// locations.
pub fn logical_entries(project: &Project) -> Result<Vec<(LogicalEntry, SlotRef)>, ParseError> {
    let counts = pattern_counts(project)?;
    let mut out = Vec::new();
    let mut cursor = 0usize;
    for (track, &count) in counts.iter().enumerate() {
        for pattern in 0..count {
            let slot = if cursor < TRACK_COUNT - 1 {
                SlotRef::Direct(cursor)
            } else {
                SlotRef::Overflow(cursor - (TRACK_COUNT - 1))
            };
            out.push((LogicalEntry { track, pattern }, slot));
            cursor += 1;
        }
    }
    Ok(out)
}

struct BuiltEntry {
    track: usize,
    pattern: usize,
    preamble: [u8; 4],
    body: Vec<u8>,
    active: bool,
}

fn requested_notes<'a>(
    requests: &'a [TrackPatterns],
    track: usize,
    pattern: usize,
) -> Option<&'a Vec<event::Note>> {
    requests
        .iter()
        .find(|r| r.track == track)
        .and_then(|r| r.patterns.get(pattern))
        .and_then(|p| p.as_ref())
        .filter(|notes| !notes.is_empty())
}

/// Full multi-pattern synthesis over a single-pattern template.
///
/// The descriptor is synthesized first so a strict-mode rejection happens
/// before any block bytes are produced.
pub(crate) fn synthesize(
    project: &Project,
    requests: &[TrackPatterns],
    strategy: DescriptorStrategy,
) -> Result<Project, MutateError> {
    let template_counts = pattern_counts(project)?;
    if let Some((track, &count)) = template_counts.iter().enumerate().find(|(_, &c)| c != 1) {
        return Err(ValidationError::TemplateNotPlain { track, count }.into());
    }

    let mut counts = [1usize; TRACK_COUNT];
    for request in requests {
        counts[request.track] = request.patterns.len();
    }
    let descriptor_bytes = descriptor::synthesize(&counts, strategy)?;

    let mut entries: Vec<BuiltEntry> = Vec::new();
    let mut activated = [false; TRACK_COUNT];
    for track in 0..TRACK_COUNT {
        let source = &project.tracks[track];
        let engine_id = source.engine_id()?;
        let count = counts[track];
        for pattern in 0..count {
            let mut active = false;
            let mut body = match requested_notes(requests, track, pattern) {
                Some(notes) => {
                    let activated_body = activate_body(&source.body)?;
                    let event_type = engine::event_type_for_track(track, engine_id);
                    let event = event::encode(notes, event_type)?;
                    active = true;
                    activated[track] = true;
                    insert_event(&activated_body, &event, engine_id)?
                }
                None => source.body.clone(),
            };
            // Non-final pattern bodies of a set are stored one byte shorter.
            // Firmware quirk with no recovered meaning; preserved verbatim.
            if count > 1 && pattern + 1 < count {
                body.pop();
            }

            let preamble = if pattern == 0 {
                let mut preamble = source.preamble;
                if count > 1 {
                    preamble[1] = count as u8;
                }
                preamble
            } else {
                [0x00, 0x00, source.preamble[2], source.preamble[3]]
            };
            entries.push(BuiltEntry {
                track,
                pattern,
                preamble,
                body,
                active,
            });
        }
    }

    // Leader preambles follow the same propagation rule as single-pattern
    // activation, track-5 exemption included.
    for index in 0..entries.len() {
        let entry = &entries[index];
        if entry.pattern == 0
            && entry.track > 0
            && activated[entry.track - 1]
            && entry.track != FOLLOWER_EXEMPT_TRACK
        {
            entries[index].preamble[0] = PREAMBLE_FOLLOWER_MARK;
        }
    }

    // Clone preamble byte 1: follower mark when the preceding physical
    // block is active, otherwise the un-rotated next track's preamble
    // byte 0.
    for index in 1..entries.len() {
        if entries[index].pattern == 0 {
            continue;
        }
        let byte = if entries[index - 1].active {
            PREAMBLE_FOLLOWER_MARK
        } else {
            let next_track = entries[index].track + 1;
            if next_track < TRACK_COUNT {
                project.tracks[next_track].preamble[0]
            } else {
                0x00
            }
        };
        entries[index].preamble[1] = byte;
    }

    // Pack the flattened entries back into 16 physical slots.
    let mut tracks: Vec<TrackBlock> = Vec::with_capacity(TRACK_COUNT);
    if entries.len() == TRACK_COUNT {
        for entry in entries {
            tracks.push(TrackBlock {
                preamble: entry.preamble,
                body: entry.body,
            });
        }
    } else {
        for entry in &entries[..TRACK_COUNT - 1] {
            tracks.push(TrackBlock {
                preamble: entry.preamble,
                body: entry.body.clone(),
            });
        }
        let head = &entries[TRACK_COUNT - 1];
        let mut body = head.body.clone();
        for entry in &entries[TRACK_COUNT..] {
            body.extend_from_slice(&entry.preamble);
            body.extend_from_slice(&entry.body);
        }
        tracks.push(TrackBlock {
            preamble: head.preamble,
            body,
        });
    }

    let mut pre_track = project.pre_track.clone();
    header::set_pattern_counters(
        &mut pre_track,
        (counts[0] - 1) as u8,
        (counts[1] - 1) as u8,
    )?;
    if !descriptor_bytes.is_empty() {
        let mut widened = Vec::with_capacity(pre_track.len() + descriptor_bytes.len());
        widened.extend_from_slice(&pre_track[..header::DESCRIPTOR_OFFSET]);
        widened.extend_from_slice(&descriptor_bytes);
        widened.extend_from_slice(&pre_track[header::DESCRIPTOR_OFFSET..]);
        pre_track = widened;
    }

    Ok(Project { pre_track, tracks })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Note;
    use crate::fixture;
    use crate::project::{BODY_TYPE_OFFSET, TYPE_ACTIVE};
    use pretty_assertions::assert_eq;

    fn note(step: u8, pitch: u8, velocity: u8) -> Note {
        Note {
            step,
            note: pitch,
            velocity,
            tick_offset: 0,
            gate_ticks: 0,
        }
    }

    fn two_patterns_on_track_one() -> (Project, Project) {
        let template = Project::parse(&fixture::baseline_project_bytes()).unwrap();
        let built = synthesize(
            &template,
            &[TrackPatterns {
                track: 0,
                patterns: vec![None, Some(vec![note(1, 60, 100)])],
            }],
            DescriptorStrategy::Strict,
        )
        .unwrap();
        (template, built)
    }

    #[test]
    fn test_counters_set_for_track_one() {
        let (_, built) = two_patterns_on_track_one();
        assert_eq!(header::pattern_counters(&built.pre_track).unwrap(), (1, 0));
        // Track-1-only topologies carry no descriptor string.
        assert_eq!(built.pre_track.len(), fixture::baseline_pre_track().len());
    }

    #[test]
    fn test_overflow_chain_holds_displaced_entry() {
        let (template, built) = two_patterns_on_track_one();
        assert_eq!(built.tracks.len(), TRACK_COUNT);
        // 17 logical entries: the last two share the final physical slot.
        let chain = split_overflow(&built.tracks[TRACK_COUNT - 1]);
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].body, template.tracks[14].body);
        assert_eq!(chain[1].body, template.tracks[15].body);
        assert_eq!(chain[1].preamble, template.tracks[15].preamble);
    }

    #[test]
    fn test_leader_declares_pattern_count() {
        let (_, built) = two_patterns_on_track_one();
        assert_eq!(built.tracks[0].preamble[1], 2);
        assert_eq!(pattern_counts(&built).unwrap()[0], 2);
    }

    #[test]
    fn test_blank_leader_is_trimmed() {
        let (template, built) = two_patterns_on_track_one();
        // Pattern 1 of track 1 is blank and not last: one byte shorter.
        assert_eq!(built.tracks[0].body.len(), template.tracks[0].body.len() - 1);
        // Pattern 2 carries the note event and is activated.
        assert_eq!(built.tracks[1].body[BODY_TYPE_OFFSET], TYPE_ACTIVE);
    }

    #[test]
    fn test_clone_preamble_rules() {
        let (template, built) = two_patterns_on_track_one();
        // The clone (track 1, pattern 2) sits in physical slot 2. Its
        // sentinel byte is zeroed; byte 1 falls back to the un-rotated
        // next track's sentinel because the preceding block is inactive.
        assert_eq!(built.tracks[1].preamble[0], 0x00);
        assert_eq!(built.tracks[1].preamble[1], template.tracks[1].preamble[0]);
    }

    #[test]
    fn test_round_trip_multi_pattern_file() {
        let (_, built) = two_patterns_on_track_one();
        let bytes = built.serialize();
        let reparsed = Project::parse(&bytes).unwrap();
        assert_eq!(reparsed.serialize(), bytes);
        assert_eq!(pattern_counts(&reparsed).unwrap()[0], 2);
    }

    #[test]
    fn test_logical_entries_enumeration() {
        let (_, built) = two_patterns_on_track_one();
        let entries = logical_entries(&built).unwrap();
        assert_eq!(entries.len(), 17);
        assert_eq!(
            entries[0],
            (
                LogicalEntry {
                    track: 0,
                    pattern: 0
                },
                SlotRef::Direct(0)
            )
        );
        assert_eq!(
            entries[16],
            (
                LogicalEntry {
                    track: 15,
                    pattern: 0
                },
                SlotRef::Overflow(1)
            )
        );
    }

    #[test]
    fn test_strict_rejects_unverified_topology() {
        let template = Project::parse(&fixture::baseline_project_bytes()).unwrap();
        let err = synthesize(
            &template,
            &[
                TrackPatterns {
                    track: 1,
                    patterns: vec![None, Some(vec![note(1, 60, 100)])],
                },
                TrackPatterns {
                    track: 6,
                    patterns: vec![None, Some(vec![note(1, 62, 100)])],
                },
            ],
            DescriptorStrategy::Strict,
        )
        .unwrap_err();
        assert_eq!(
            err,
            MutateError::Validation(ValidationError::UnsupportedTopology {
                tracks: vec![2, 7]
            })
        );
    }

    #[test]
    fn test_scheme_a_descriptor_inserted() {
        let template = Project::parse(&fixture::baseline_project_bytes()).unwrap();
        let built = synthesize(
            &template,
            &[TrackPatterns {
                track: 2,
                patterns: vec![Some(vec![note(1, 60, 100)]), None],
            }],
            DescriptorStrategy::Strict,
        )
        .unwrap();
        let base = fixture::baseline_pre_track().len();
        assert_eq!(built.pre_track.len(), base + 8);
        assert_eq!(
            &built.pre_track[header::DESCRIPTOR_OFFSET..header::DESCRIPTOR_OFFSET + 8],
            &[0x00, 0x01, 0x00, 0x00, 0x1B, 0x01, 0x00, 0x00]
        );
        // Counters stay zero: tracks 1-2 are single-pattern here.
        assert_eq!(header::pattern_counters(&built.pre_track).unwrap(), (0, 0));
    }

    #[test]
    fn test_tail_pattern_keeps_full_length() {
        let template = Project::parse(&fixture::baseline_project_bytes()).unwrap();
        let built = synthesize(
            &template,
            &[TrackPatterns {
                track: 2,
                patterns: vec![None, None, None],
            }],
            DescriptorStrategy::Strict,
        )
        .unwrap();
        let original = template.tracks[2].body.len();
        // Two blank non-final patterns are trimmed; the tail keeps its size.
        assert_eq!(built.tracks[2].body.len(), original - 1);
        assert_eq!(built.tracks[3].body.len(), original - 1);
        assert_eq!(built.tracks[4].body.len(), original);
    }

    #[test]
    fn test_clone_after_active_block_gets_mark() {
        let template = Project::parse(&fixture::baseline_project_bytes()).unwrap();
        let built = synthesize(
            &template,
            &[TrackPatterns {
                track: 2,
                patterns: vec![Some(vec![note(1, 60, 100)]), None],
            }],
            DescriptorStrategy::Strict,
        )
        .unwrap();
        // Physical slot 4 holds (track 3, pattern 2); the block before it is
        // active, so byte 1 carries the follower mark.
        assert_eq!(built.tracks[3].preamble[0], 0x00);
        assert_eq!(built.tracks[3].preamble[1], PREAMBLE_FOLLOWER_MARK);
    }

    #[test]
    fn test_synthesize_rejects_multi_pattern_template() {
        let (_, built) = two_patterns_on_track_one();
        let err = synthesize(
            &built,
            &[TrackPatterns {
                track: 2,
                patterns: vec![None, None],
            }],
            DescriptorStrategy::Strict,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            MutateError::Validation(ValidationError::TemplateNotPlain { track: 0, count: 2 })
        ));
    }

    #[test]
    fn test_pattern_counts_on_plain_file() {
        let project = Project::parse(&fixture::baseline_project_bytes()).unwrap();
        assert_eq!(pattern_counts(&project).unwrap(), [1usize; TRACK_COUNT]);
    }
}
