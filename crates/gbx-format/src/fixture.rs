//! Synthetic baseline specimens.
//!
//! The real corpus of device-authored captures cannot be redistributed, so
//! the test suites (and offline experiments) build specimens from the same
//! wire constants the codec uses. The layout mirrors a factory-fresh
//! project: a base-size pre-track region and 16 inactive track bodies.

use crate::engine::{self, EngineId, TAIL_EVENTS_BIT};
use crate::plock;
use crate::project::{
    header, BODY_TYPE_OFFSET, MAGIC, PRE_TRACK_BASE_LEN, SIG_HEAD, SIG_TAIL, TRACK_COUNT,
    TYPE_ACTIVE, TYPE_INACTIVE,
};

/// Signature byte between head and tail; varies across real captures.
pub const SIG_VARIABLE_BYTE: u8 = 0x30;

/// Default preamble of a factory-fresh block.
pub const DEFAULT_PREAMBLE: [u8; 4] = [0x40, 0x00, 0x12, 0x00];

/// Engine assignment of the factory-fresh template.
pub fn engine_for_track(track: usize) -> EngineId {
    match track {
        0 | 1 => EngineId::Drum,
        2 | 3 => EngineId::Bass,
        4 | 5 => EngineId::Prism,
        6 | 7 => EngineId::Sampler,
        8 | 9 => EngineId::EPiano,
        10 | 11 => EngineId::Pluck,
        _ => EngineId::Wavetable,
    }
}

/// An activated blank body for the given engine: signature, markers, empty
/// component slots, empty parameter-lock table, and the parameter tail on
/// tail-insertion engines.
pub fn active_body(engine: EngineId) -> Vec<u8> {
    let layout = engine::layout(engine);
    let mut body = Vec::new();
    body.extend_from_slice(&SIG_HEAD);
    body.push(SIG_VARIABLE_BYTE);
    body.extend_from_slice(&SIG_TAIL);
    body.push(0x01);
    body.push(TYPE_ACTIVE);
    body.push(engine.as_byte());
    while body.len() < layout.alloc_offset {
        body.push(0x00);
    }
    body.push(layout.alloc_baseline);
    while body.len() < layout.component_table {
        body.push(0x00);
    }
    for _ in 0..crate::component::SLOT_COUNT {
        body.extend_from_slice(&crate::component::EMPTY_SLOT);
    }
    body.extend_from_slice(&plock::PLOCK_SIG);
    for _ in 0..plock::SLOT_COUNT {
        body.extend_from_slice(&plock::EMPTY_SLOT);
    }
    // Opaque engine blob; preserved verbatim by every operation.
    body.extend_from_slice(&[0x00; 8]);
    if engine == EngineId::EPiano || engine == EngineId::Pluck {
        body.push(TAIL_EVENTS_BIT | 0x23);
        for i in 1..engine::PARAM_TAIL_LEN {
            body.push((i as u8) & 0x0F);
        }
    }
    debug_assert_eq!(body[BODY_TYPE_OFFSET], TYPE_ACTIVE);
    body
}

/// The inactive rendition of [`active_body`]: type byte flipped and the two
/// pad bytes inserted at offsets 10-11.
pub fn inactive_body(engine: EngineId) -> Vec<u8> {
    let active = active_body(engine);
    let mut body = Vec::with_capacity(active.len() + 2);
    body.extend_from_slice(&active[..BODY_TYPE_OFFSET]);
    body.push(TYPE_INACTIVE);
    body.extend_from_slice(&[0x00, 0x00]);
    body.extend_from_slice(&active[BODY_TYPE_OFFSET + 1..]);
    body
}

/// The pre-track region of the baseline specimen: magic, a 120.0 BPM header
/// word, and zeroed pattern counters.
pub fn baseline_pre_track() -> Vec<u8> {
    let mut pre = vec![0u8; PRE_TRACK_BASE_LEN];
    pre[..4].copy_from_slice(&MAGIC);
    let fields = header::Header {
        tempo_tenths: 1200,
        groove_flags: 0x00,
        groove_type: 0x02,
        groove_amount: 0x19,
        metronome_level: 0x00,
    };
    fields
        .write(&mut pre)
        .expect("base pre-track region holds the header fields");
    pre
}

/// A complete factory-fresh specimen: pre-track region plus 16 inactive
/// blocks with the default engine assignment.
pub fn baseline_project_bytes() -> Vec<u8> {
    let mut out = baseline_pre_track();
    for track in 0..TRACK_COUNT {
        out.extend_from_slice(&DEFAULT_PREAMBLE);
        out.extend_from_slice(&inactive_body(engine_for_track(track)));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bodies_carry_expected_markers() {
        let body = inactive_body(EngineId::Drum);
        assert_eq!(body[BODY_TYPE_OFFSET], TYPE_INACTIVE);
        assert_eq!(
            body[crate::project::ENGINE_ID_OFFSET_INACTIVE],
            EngineId::Drum.as_byte()
        );
        let active = active_body(EngineId::Drum);
        assert_eq!(active.len(), body.len() - 2);
        assert_eq!(
            active[crate::project::ENGINE_ID_OFFSET_ACTIVE],
            EngineId::Drum.as_byte()
        );
    }

    #[test]
    fn test_tail_engines_end_in_tail() {
        let body = active_body(EngineId::Pluck);
        let tail_first = body[body.len() - engine::PARAM_TAIL_LEN];
        assert_ne!(tail_first & TAIL_EVENTS_BIT, 0);
        let plain = active_body(EngineId::Bass);
        assert!(body.len() > plain.len());
    }

    #[test]
    fn test_plock_table_discoverable() {
        let body = active_body(EngineId::Sampler);
        let start = plock::find_plock_start(&body).unwrap();
        let layout = engine::layout(EngineId::Sampler);
        assert_eq!(
            start,
            layout.component_table + 2 * 3 + plock::PLOCK_SIG.len()
        );
    }
}
