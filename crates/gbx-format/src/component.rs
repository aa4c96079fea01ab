//! Step-component codec.
//!
//! Step components are per-step modifier records stored in a fixed slot
//! table inside an activated track body. Fourteen component kinds exist,
//! spread over a 14-bit bitmask split into two banks (8 bits + 6 bits). The
//! current scheme replaces a single 3-byte empty slot; only steps 1 and 9
//! have slots under it, and other steps are rejected rather than guessed.

use crate::engine::{self, EngineId};
use crate::error::InvariantError;

/// Empty slot marker in the component table.
pub const EMPTY_SLOT: [u8; 3] = [0xFF, 0x00, 0x00];

/// Slot terminator appended after payloads shorter than the full record.
pub const SLOT_TERMINATOR: u8 = 0xFF;

/// Number of slots in the table (steps 1 and 9).
pub const SLOT_COUNT: usize = 2;

/// The fourteen step-component kinds.
///
/// Bit positions 0-7 form the first bank, 8-13 the second. The five-byte
/// kinds carry a firmware type id in their payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ComponentType {
    Hold,
    Ramp,
    BendUp,
    BendDown,
    Condition,
    Retrig,
    Chance,
    Pulse,
    Jump,
    Skip,
    Mute,
    Accent,
    PulseMax,
    Velocity,
}

impl ComponentType {
    /// Bit position inside the 14-bit component mask.
    pub fn bit_position(&self) -> u8 {
        match self {
            ComponentType::Hold => 0,
            ComponentType::Ramp => 1,
            ComponentType::BendUp => 2,
            ComponentType::BendDown => 3,
            ComponentType::Condition => 4,
            ComponentType::Retrig => 5,
            ComponentType::Chance => 6,
            ComponentType::Pulse => 7,
            ComponentType::Jump => 8,
            ComponentType::Skip => 9,
            ComponentType::Mute => 10,
            ComponentType::Accent => 11,
            ComponentType::PulseMax => 12,
            ComponentType::Velocity => 13,
        }
    }

    /// Bank index: 0 for bits 0-7, 1 for bits 8-13.
    pub fn bank(&self) -> u8 {
        self.bit_position() / 8
    }

    /// Payload length in bytes: 1, 3, or 5.
    pub fn payload_len(&self) -> usize {
        match self {
            ComponentType::PulseMax | ComponentType::Velocity => 1,
            ComponentType::Pulse => 3,
            _ => 5,
        }
    }

    /// Firmware type id carried by the five-byte payload kinds.
    pub fn firmware_type_id(&self) -> Option<u8> {
        match self {
            ComponentType::Hold => Some(0x00),
            ComponentType::Ramp => Some(0x01),
            ComponentType::BendUp => Some(0x02),
            ComponentType::BendDown => Some(0x03),
            ComponentType::Condition => Some(0x04),
            ComponentType::Retrig => Some(0x05),
            ComponentType::Chance => Some(0x06),
            ComponentType::Jump => Some(0x08),
            ComponentType::Skip => Some(0x09),
            ComponentType::Mute => Some(0x0A),
            ComponentType::Accent => Some(0x0B),
            _ => None,
        }
    }

    /// Parse a component name as used in build requests.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "hold" => Some(ComponentType::Hold),
            "ramp" => Some(ComponentType::Ramp),
            "bend_up" | "bendup" => Some(ComponentType::BendUp),
            "bend_down" | "benddown" => Some(ComponentType::BendDown),
            "condition" | "conditional" => Some(ComponentType::Condition),
            "retrig" | "retrigger" => Some(ComponentType::Retrig),
            "chance" => Some(ComponentType::Chance),
            "pulse" => Some(ComponentType::Pulse),
            "jump" => Some(ComponentType::Jump),
            "skip" => Some(ComponentType::Skip),
            "mute" => Some(ComponentType::Mute),
            "accent" => Some(ComponentType::Accent),
            "pulse_max" | "pulsemax" => Some(ComponentType::PulseMax),
            "velocity" => Some(ComponentType::Velocity),
            _ => None,
        }
    }
}

/// One step component to be placed in a track body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StepComponent {
    /// 1-based step; only 1 and 9 are supported by the single-slot scheme.
    pub step: u8,
    /// Component kind.
    pub component: ComponentType,
    /// Component parameter byte.
    pub param: u8,
}

fn check_step(step: u8) -> Result<(), InvariantError> {
    if step != 1 && step != 9 {
        return Err(InvariantError::UnsupportedComponentStep { step });
    }
    Ok(())
}

/// Header byte derived from step and bank.
///
/// `step_byte = ((0xE - step0) << 4) | nibble` with
/// `nibble = 4 - half + bank`, `half = step0 / 8`.
pub fn step_byte(step: u8, bank: u8) -> Result<u8, InvariantError> {
    check_step(step)?;
    let step0 = step - 1;
    let half = step0 / 8;
    let nibble = 4 - half + bank;
    Ok(((0xE - step0) << 4) | nibble)
}

/// Allocation marker value for a component placement.
///
/// `((0xF - step0) << 4) + low_nibble + baseline`, computed with carrying
/// arithmetic: second-bank values overflow the low nibble and borrow into
/// the step nibble, which bitwise-or would get wrong.
pub fn compute_alloc_byte(
    step: u8,
    component: ComponentType,
    engine: EngineId,
) -> Result<u8, InvariantError> {
    check_step(step)?;
    let step0 = (step - 1) as u16;
    let half = step0 / 8;
    let low_nibble = 4 - half + component.bank() as u16 + (component.bit_position() % 8) as u16;
    let baseline = engine::layout(engine).alloc_baseline as u16;
    Ok((((0xF - step0) << 4) + low_nibble + baseline) as u8)
}

/// Offset of the step's slot in the component table of an activated body.
pub fn slot_offset(engine: EngineId, step: u8) -> Result<usize, InvariantError> {
    check_step(step)?;
    let index = if step == 1 { 0 } else { 1 };
    Ok(engine::layout(engine).component_table + index * EMPTY_SLOT.len())
}

/// Encode a component record: header, payload, and a terminator when the
/// payload does not fill the full record.
pub fn encode(component: &StepComponent) -> Result<Vec<u8>, InvariantError> {
    let kind = component.component;
    let mut out = Vec::with_capacity(2 + kind.payload_len() + 1);
    out.push(step_byte(component.step, kind.bank())?);
    out.push(1 << (kind.bit_position() % 8));
    match kind.payload_len() {
        1 => {
            out.push(component.param);
            out.push(SLOT_TERMINATOR);
        }
        3 => {
            out.extend_from_slice(&[component.param, 0x00, 0x00]);
            out.push(SLOT_TERMINATOR);
        }
        _ => {
            // Five-byte payloads always belong to a type-id-bearing kind.
            let type_id = kind.firmware_type_id().unwrap_or(0x00);
            out.extend_from_slice(&[type_id, component.param, 0x00, 0x00, 0x00]);
        }
    }
    Ok(out)
}

/// Place a component into an activated body: replace the step's 3-byte empty
/// slot with the encoded record and recompute the allocation marker.
///
/// The body is rebuilt from prefix, record, and suffix rather than shifted
/// in place.
pub fn insert(
    body: &[u8],
    component: &StepComponent,
    engine: EngineId,
) -> Result<Vec<u8>, InvariantError> {
    let offset = slot_offset(engine, component.step)?;
    if body.len() < offset + EMPTY_SLOT.len() {
        return Err(InvariantError::ComponentTableOutOfBounds {
            len: body.len(),
            needed: offset + EMPTY_SLOT.len(),
        });
    }
    if body[offset..offset + EMPTY_SLOT.len()] != EMPTY_SLOT {
        return Err(InvariantError::SlotOccupied { offset });
    }

    let record = encode(component)?;
    let mut out = Vec::with_capacity(body.len() - EMPTY_SLOT.len() + record.len());
    out.extend_from_slice(&body[..offset]);
    out.extend_from_slice(&record);
    out.extend_from_slice(&body[offset + EMPTY_SLOT.len()..]);

    let alloc_offset = engine::layout(engine).alloc_offset;
    out[alloc_offset] = compute_alloc_byte(component.step, component.component, engine)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_step_byte_values() {
        assert_eq!(step_byte(1, 0).unwrap(), 0xE4);
        assert_eq!(step_byte(1, 1).unwrap(), 0xE5);
        assert_eq!(step_byte(9, 0).unwrap(), 0x63);
        assert_eq!(step_byte(9, 1).unwrap(), 0x64);
    }

    #[test]
    fn test_unsupported_step() {
        assert_eq!(
            step_byte(5, 0),
            Err(InvariantError::UnsupportedComponentStep { step: 5 })
        );
        let component = StepComponent {
            step: 3,
            component: ComponentType::Hold,
            param: 1,
        };
        assert!(matches!(
            encode(&component),
            Err(InvariantError::UnsupportedComponentStep { step: 3 })
        ));
    }

    #[test]
    fn test_payload_shapes() {
        let one = encode(&StepComponent {
            step: 1,
            component: ComponentType::Velocity,
            param: 0x60,
        })
        .unwrap();
        assert_eq!(one, vec![0xE5, 0x20, 0x60, 0xFF]);

        let three = encode(&StepComponent {
            step: 1,
            component: ComponentType::Pulse,
            param: 0x04,
        })
        .unwrap();
        assert_eq!(three, vec![0xE4, 0x80, 0x04, 0x00, 0x00, 0xFF]);

        let five = encode(&StepComponent {
            step: 9,
            component: ComponentType::Condition,
            param: 0x02,
        })
        .unwrap();
        assert_eq!(five, vec![0x63, 0x10, 0x04, 0x02, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_alloc_byte_uses_engine_baseline() {
        let plain = compute_alloc_byte(1, ComponentType::Hold, EngineId::Bass).unwrap();
        let drum = compute_alloc_byte(1, ComponentType::Hold, EngineId::Drum).unwrap();
        assert_eq!(drum, plain + 0x10);
    }

    #[test]
    fn test_alloc_byte_carries_for_second_bank() {
        // Second-bank kinds push the low part past a nibble on step 1; the
        // value must carry, not mask.
        let value = compute_alloc_byte(1, ComponentType::Velocity, EngineId::Bass).unwrap();
        assert_eq!(value, 0xF0 + 4 + 1 + 5);
    }

    #[test]
    fn test_insert_replaces_empty_slot() {
        let body = fixture::active_body(EngineId::Bass);
        let component = StepComponent {
            step: 9,
            component: ComponentType::Chance,
            param: 0x32,
        };
        let out = insert(&body, &component, EngineId::Bass).unwrap();
        let offset = slot_offset(EngineId::Bass, 9).unwrap();
        let record = encode(&component).unwrap();
        assert_eq!(&out[offset..offset + record.len()], record.as_slice());
        // Record is 7 bytes replacing a 3-byte slot.
        assert_eq!(out.len(), body.len() + record.len() - EMPTY_SLOT.len());
        // Step-1 slot is untouched.
        let first = slot_offset(EngineId::Bass, 1).unwrap();
        assert_eq!(&out[first..first + 3], &EMPTY_SLOT);
        // Allocation marker recomputed.
        let alloc = crate::engine::layout(EngineId::Bass).alloc_offset;
        assert_eq!(
            out[alloc],
            compute_alloc_byte(9, ComponentType::Chance, EngineId::Bass).unwrap()
        );
    }

    #[test]
    fn test_insert_rejects_occupied_slot() {
        let body = fixture::active_body(EngineId::Bass);
        let component = StepComponent {
            step: 1,
            component: ComponentType::Hold,
            param: 0x01,
        };
        let once = insert(&body, &component, EngineId::Bass).unwrap();
        let again = insert(
            &once,
            &StepComponent {
                step: 1,
                component: ComponentType::Ramp,
                param: 0x02,
            },
            EngineId::Bass,
        );
        assert!(matches!(again, Err(InvariantError::SlotOccupied { .. })));
    }

    #[test]
    fn test_component_names() {
        assert_eq!(ComponentType::from_name("hold"), Some(ComponentType::Hold));
        assert_eq!(
            ComponentType::from_name("PULSE_MAX"),
            Some(ComponentType::PulseMax)
        );
        assert_eq!(ComponentType::from_name("wobble"), None);
    }
}
