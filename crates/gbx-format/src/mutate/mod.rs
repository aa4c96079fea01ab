//! Mutation engine: activation, event insertion, preamble propagation, and
//! the multi-pattern paths.
//!
//! Every operation takes a [`Project`] (or a body slice) and produces a new
//! value; nothing is patched in place. Buffers are rebuilt by copying the
//! unaffected prefix, writing the new region, and copying the unaffected
//! suffix.

pub mod descriptor;
pub mod rotation;
pub mod scaffold;

use crate::component::{self, StepComponent};
use crate::engine::{self, EngineId, InsertMode, PARAM_TAIL_LEN, TAIL_EVENTS_BIT};
use crate::error::{InvariantError, MutateError, ParseError, ValidationError};
use crate::event::{self, Note};
use crate::project::{
    Project, TrackBlock, BODY_TYPE_OFFSET, TRACK_COUNT, TYPE_ACTIVE, TYPE_INACTIVE,
};

/// Preamble byte 0 written onto the track following an activated track.
pub const PREAMBLE_FOLLOWER_MARK: u8 = 0x64;

/// Track 5 (index 4) never receives the follower mark. Writing it there
/// trips a firmware assertion on load. Empirical; keep as a table entry.
pub const FOLLOWER_EXEMPT_TRACK: usize = 4;

/// Upper bound on patterns per track accepted by the synthesis paths.
pub const MAX_PATTERNS_PER_TRACK: usize = 8;

/// Descriptor synthesis strategy for multi-pattern builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum DescriptorStrategy {
    /// Only emit descriptors verified against device-authored captures;
    /// fail fast on anything else.
    #[default]
    Strict,
    /// Legacy closed-form guesser. Known to be wrong for several topologies
    /// involving tracks 1-2; the output may crash the device. Opt-in only.
    HeuristicV1,
}

/// Single-pattern mutation request for one track.
#[derive(Debug, Clone)]
pub struct TrackNotes {
    /// 0-based track index.
    pub track: usize,
    /// Notes to encode into one event record. May be empty together with
    /// `components`, making the request a no-op for this track.
    pub notes: Vec<Note>,
    /// At most one step component for the single-slot scheme.
    pub components: Vec<StepComponent>,
}

/// Multi-pattern mutation request for one track: one entry per pattern,
/// `None` for a blank pattern.
#[derive(Debug, Clone)]
pub struct TrackPatterns {
    /// 0-based track index.
    pub track: usize,
    /// Pattern contents in play order.
    pub patterns: Vec<Option<Vec<Note>>>,
}

/// Activate a track body: flip the type byte and drop the two pad bytes.
/// Activating an already-active body returns it unchanged.
pub fn activate_body(body: &[u8]) -> Result<Vec<u8>, MutateError> {
    match body.get(BODY_TYPE_OFFSET) {
        Some(&TYPE_ACTIVE) => Ok(body.to_vec()),
        Some(&TYPE_INACTIVE) => {
            if body.len() < BODY_TYPE_OFFSET + 4 {
                return Err(ParseError::BodyTooShort {
                    len: body.len(),
                    needed: BODY_TYPE_OFFSET + 4,
                }
                .into());
            }
            let mut out = Vec::with_capacity(body.len() - 2);
            out.extend_from_slice(&body[..BODY_TYPE_OFFSET]);
            out.push(TYPE_ACTIVE);
            out.extend_from_slice(&body[BODY_TYPE_OFFSET + 3..]);
            Ok(out)
        }
        Some(&other) => Err(ParseError::UnknownTypeByte { found: other }.into()),
        None => Err(ParseError::BodyTooShort {
            len: body.len(),
            needed: BODY_TYPE_OFFSET + 1,
        }
        .into()),
    }
}

/// Insert an encoded event into an activated body.
///
/// Most engines take a pure append. Tail-insertion engines keep a fixed
/// parameter block at the end of the body: the event goes in front of it and
/// the events-marker bit in the tail's first byte is cleared. Mixing these
/// two up is the main source of device-crashing output.
pub fn insert_event(body: &[u8], event: &[u8], engine: EngineId) -> Result<Vec<u8>, MutateError> {
    if body.get(BODY_TYPE_OFFSET) != Some(&TYPE_ACTIVE) {
        return Err(InvariantError::BodyNotActivated.into());
    }
    match engine::layout(engine).insert {
        InsertMode::Append => {
            let mut out = Vec::with_capacity(body.len() + event.len());
            out.extend_from_slice(body);
            out.extend_from_slice(event);
            Ok(out)
        }
        InsertMode::BeforeTail => {
            if body.len() < PARAM_TAIL_LEN {
                return Err(InvariantError::MissingParameterTail {
                    len: body.len(),
                    tail: PARAM_TAIL_LEN,
                }
                .into());
            }
            let split = body.len() - PARAM_TAIL_LEN;
            let mut out = Vec::with_capacity(body.len() + event.len());
            out.extend_from_slice(&body[..split]);
            out.extend_from_slice(event);
            out.push(body[split] & !TAIL_EVENTS_BIT);
            out.extend_from_slice(&body[split + 1..]);
            Ok(out)
        }
    }
}

fn check_tracks_unique<I: Iterator<Item = usize>>(tracks: I) -> Result<(), ValidationError> {
    let mut seen = [false; TRACK_COUNT];
    for track in tracks {
        if track >= TRACK_COUNT {
            return Err(ValidationError::TrackOutOfRange { track });
        }
        if seen[track] {
            return Err(ValidationError::DuplicateTrack { track });
        }
        seen[track] = true;
    }
    Ok(())
}

/// Activate tracks and insert their note events (single-pattern path).
///
/// After all insertions, the follower mark is propagated: every track
/// immediately after an activated track gets preamble byte 0 set to 0x64,
/// except track 5, which keeps its preamble byte-identical.
pub fn apply_notes(project: &Project, requests: &[TrackNotes]) -> Result<Project, MutateError> {
    check_tracks_unique(requests.iter().map(|r| r.track))?;

    let mut out = project.clone();
    let mut activated = [false; TRACK_COUNT];
    for request in requests {
        if request.notes.is_empty() && request.components.is_empty() {
            continue;
        }
        if request.components.len() > 1 {
            return Err(ValidationError::TooManyComponents {
                track: request.track,
                count: request.components.len(),
            }
            .into());
        }
        let engine = out.tracks[request.track].engine_id()?;
        let mut body = activate_body(&out.tracks[request.track].body)?;
        if let Some(step_component) = request.components.first() {
            body = component::insert(&body, step_component, engine)?;
        }
        if !request.notes.is_empty() {
            let event_type = engine::event_type_for_track(request.track, engine);
            let event = event::encode(&request.notes, event_type)?;
            body = insert_event(&body, &event, engine)?;
        }
        out.tracks[request.track].body = body;
        activated[request.track] = true;
    }

    propagate_follower_marks(&mut out.tracks, &activated);
    Ok(out)
}

/// Write the follower mark behind each activated track, honoring the track-5
/// exemption. Applies even when the follower itself was activated in the
/// same call.
fn propagate_follower_marks(tracks: &mut [TrackBlock], activated: &[bool; TRACK_COUNT]) {
    for track in 1..TRACK_COUNT {
        if activated[track - 1] && track != FOLLOWER_EXEMPT_TRACK {
            tracks[track].preamble[0] = PREAMBLE_FOLLOWER_MARK;
        }
    }
}

/// Multi-pattern entry point.
///
/// Requests where every track stays single-pattern are routed through
/// [`apply_notes`]. Otherwise the scaffold writer is tried first (it only
/// touches note-carrying bodies of a template whose topology already
/// matches) and full block-rotation synthesis is the fallback.
pub fn apply_patterns(
    project: &Project,
    requests: &[TrackPatterns],
    strategy: DescriptorStrategy,
) -> Result<Project, MutateError> {
    check_tracks_unique(requests.iter().map(|r| r.track))?;
    for request in requests {
        let count = request.patterns.len();
        if count == 0 || count > MAX_PATTERNS_PER_TRACK {
            return Err(ValidationError::PatternCountOutOfRange {
                track: request.track,
                count,
                max: MAX_PATTERNS_PER_TRACK,
            }
            .into());
        }
    }

    if requests.iter().all(|r| r.patterns.len() == 1) {
        let singles: Vec<TrackNotes> = requests
            .iter()
            .map(|r| TrackNotes {
                track: r.track,
                notes: r.patterns[0].clone().unwrap_or_default(),
                components: Vec::new(),
            })
            .collect();
        return apply_notes(project, &singles);
    }

    if let Some(result) = scaffold::try_write(project, requests)? {
        return Ok(result);
    }
    rotation::synthesize(project, requests, strategy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture;
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

    #[test]
    fn test_activation_is_idempotent() {
        let inactive = fixture::inactive_body(EngineId::Bass);
        let once = activate_body(&inactive).unwrap();
        let twice = activate_body(&once).unwrap();
        assert_eq!(once, twice);
        assert_eq!(once.len(), inactive.len() - 2);
        assert_eq!(once[BODY_TYPE_OFFSET], TYPE_ACTIVE);
    }

    #[test]
    fn test_insert_append() {
        let body = fixture::active_body(EngineId::Bass);
        let event = [0x21, 0x01, 0x00, 0x00, 0x02];
        let out = insert_event(&body, &event, EngineId::Bass).unwrap();
        assert_eq!(&out[..body.len()], body.as_slice());
        assert_eq!(&out[body.len()..], &event);
    }

    #[test]
    fn test_insert_before_tail_clears_marker() {
        let body = fixture::active_body(EngineId::EPiano);
        let tail_first = body[body.len() - PARAM_TAIL_LEN];
        assert_ne!(tail_first & TAIL_EVENTS_BIT, 0);

        let event = [0x21, 0x01, 0x00, 0x00, 0x02];
        let out = insert_event(&body, &event, EngineId::EPiano).unwrap();
        let split = body.len() - PARAM_TAIL_LEN;
        assert_eq!(&out[split..split + event.len()], &event);
        let new_tail_first = out[split + event.len()];
        assert_eq!(new_tail_first & TAIL_EVENTS_BIT, 0);
        assert_eq!(new_tail_first, tail_first & !TAIL_EVENTS_BIT);
        // Rest of the tail is untouched.
        assert_eq!(&out[split + event.len() + 1..], &body[split + 1..]);
    }

    #[test]
    fn test_insert_requires_activation() {
        let body = fixture::inactive_body(EngineId::Bass);
        let err = insert_event(&body, &[0x21, 0x01], EngineId::Bass).unwrap_err();
        assert_eq!(err, MutateError::Invariant(InvariantError::BodyNotActivated));
    }

    #[test]
    fn test_apply_notes_marks_follower() {
        let project = Project::parse(&fixture::baseline_project_bytes()).unwrap();
        let out = apply_notes(
            &project,
            &[TrackNotes {
                track: 0,
                notes: vec![note(1, 60, 100)],
                components: Vec::new(),
            }],
        )
        .unwrap();
        assert!(out.tracks[0].is_active());
        assert_eq!(out.tracks[1].preamble[0], PREAMBLE_FOLLOWER_MARK);
        // Untouched tracks keep their bytes.
        assert_eq!(out.tracks[2], project.tracks[2]);
    }

    #[test]
    fn test_track_five_exemption() {
        let project = Project::parse(&fixture::baseline_project_bytes()).unwrap();
        let out = apply_notes(
            &project,
            &[
                TrackNotes {
                    track: 2,
                    notes: vec![note(1, 60, 100)],
                    components: Vec::new(),
                },
                TrackNotes {
                    track: 3,
                    notes: vec![note(1, 62, 100)],
                    components: Vec::new(),
                },
            ],
        )
        .unwrap();
        // Track 4 (following activated track 3) gets the mark...
        assert_eq!(out.tracks[3].preamble[0], PREAMBLE_FOLLOWER_MARK);
        // ...but track 5 stays byte-identical despite track 4 being active.
        assert_eq!(out.tracks[4].preamble, project.tracks[4].preamble);
    }

    #[test]
    fn test_apply_notes_rejects_duplicates() {
        let project = Project::parse(&fixture::baseline_project_bytes()).unwrap();
        let request = TrackNotes {
            track: 2,
            notes: vec![note(1, 60, 100)],
            components: Vec::new(),
        };
        let err = apply_notes(&project, &[request.clone(), request]).unwrap_err();
        assert_eq!(
            err,
            MutateError::Validation(ValidationError::DuplicateTrack { track: 2 })
        );
    }

    #[test]
    fn test_full_build_round_trips() {
        let project = Project::parse(&fixture::baseline_project_bytes()).unwrap();
        let out = apply_notes(
            &project,
            &[TrackNotes {
                track: 0,
                notes: vec![note(1, 60, 100)],
                components: Vec::new(),
            }],
        )
        .unwrap();
        let bytes = out.serialize();
        let reparsed = Project::parse(&bytes).unwrap();
        assert_eq!(reparsed.serialize(), bytes);
    }
}
