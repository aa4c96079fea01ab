//! Scaffold writer: in-place note injection into a template whose
//! multi-pattern topology already matches the request.
//!
//! Compared to full rotation synthesis this changes far fewer bytes of a
//! known-good capture: the template's descriptor bytes and preamble chain
//! are reused verbatim, and only the (track, pattern) slots that carry note
//! data get a new body. It is therefore tried first whenever it applies.

use super::{activate_body, insert_event, rotation, TrackPatterns};
use crate::engine;
use crate::error::MutateError;
use crate::event;
use crate::project::{Project, TrackBlock, TRACK_COUNT};

/// Attempt the scaffold path. Returns `Ok(None)` when the template's
/// topology does not match the request (or is single-pattern throughout),
/// leaving the caller to fall back to full synthesis.
pub(crate) fn try_write(
    project: &Project,
    requests: &[TrackPatterns],
) -> Result<Option<Project>, MutateError> {
    let template_counts = rotation::pattern_counts(project)?;
    let mut requested_counts = [1usize; TRACK_COUNT];
    for request in requests {
        requested_counts[request.track] = request.patterns.len();
    }
    if requested_counts != template_counts {
        return Ok(None);
    }
    if template_counts.iter().all(|&count| count == 1) {
        // Nothing multi-pattern to scaffold over.
        return Ok(None);
    }

    let entries = rotation::logical_entries(project)?;
    let locate = |track: usize, pattern: usize| {
        entries
            .iter()
            .find(|(entry, _)| entry.track == track && entry.pattern == pattern)
            .map(|(_, slot)| *slot)
    };
    let original_overflow = rotation::split_overflow(&project.tracks[TRACK_COUNT - 1]);
    let body_of = |slot: rotation::SlotRef| -> &[u8] {
        match slot {
            rotation::SlotRef::Direct(index) => &project.tracks[index].body,
            rotation::SlotRef::Overflow(index) => &original_overflow[index].body,
        }
    };

    let mut tracks = project.tracks.clone();
    let mut overflow = original_overflow.clone();
    for request in requests {
        let count = requested_counts[request.track];
        // The last pattern slot carries the track's full un-trimmed body;
        // every target is re-derived from it.
        let donor_slot = match locate(request.track, count - 1) {
            Some(slot) => slot,
            None => return Ok(None),
        };
        let donor_body = body_of(donor_slot).to_vec();
        let engine_id = TrackBlock {
            preamble: [0; 4],
            body: donor_body.clone(),
        }
        .engine_id()?;

        for (pattern, contents) in request.patterns.iter().enumerate() {
            let notes = match contents {
                Some(notes) if !notes.is_empty() => notes,
                _ => continue,
            };
            let target_slot = match locate(request.track, pattern) {
                Some(slot) => slot,
                None => return Ok(None),
            };

            let mut body = activate_body(&donor_body)?;
            let event_type = engine::event_type_for_track(request.track, engine_id);
            let event = event::encode(notes, event_type)?;
            body = insert_event(&body, &event, engine_id)?;
            if pattern + 1 < count {
                // Same empirical one-byte trim full synthesis applies to
                // non-final pattern bodies.
                body.pop();
            }

            match target_slot {
                rotation::SlotRef::Direct(index) => tracks[index].body = body,
                rotation::SlotRef::Overflow(index) => overflow[index].body = body,
            }
        }
    }

    // Reassemble the final slot from its (possibly updated) chain.
    let mut final_body = overflow[0].body.clone();
    for entry in &overflow[1..] {
        final_body.extend_from_slice(&entry.preamble);
        final_body.extend_from_slice(&entry.body);
    }
    tracks[TRACK_COUNT - 1] = TrackBlock {
        preamble: project.tracks[TRACK_COUNT - 1].preamble,
        body: final_body,
    };

    Ok(Some(Project {
        pre_track: project.pre_track.clone(),
        tracks,
    }))
}
