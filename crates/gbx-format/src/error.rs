//! Error types for parsing, request validation, and mutation.

use thiserror::Error;

/// Error raised while decoding a captured project file or an embedded table.
///
/// Parse errors are always fatal: the input is a static byte buffer, so there
/// is nothing to retry. Each variant carries enough context to pinpoint the
/// offending byte or field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Magic constant at offset 0 did not match.
    #[error("bad magic at offset 0: expected {expected:02X?}, got {found:02X?}")]
    BadMagic { expected: [u8; 4], found: [u8; 4] },

    /// Buffer is smaller than the smallest valid project file.
    #[error("file too short: {len} bytes (minimum {minimum})")]
    TooShort { len: usize, minimum: usize },

    /// The signature scan did not find exactly 16 track blocks.
    #[error("expected 16 track blocks, found {found}")]
    TrackCount { found: usize },

    /// Event header carries a type byte outside the known set.
    #[error("unknown event type 0x{found:02X} at offset {offset}")]
    UnknownEventType { offset: usize, found: u8 },

    /// Event header note count outside 1..=64.
    #[error("invalid event note count {count} at offset {offset}")]
    InvalidNoteCount { offset: usize, count: u8 },

    /// Event data ended before the declared note count was decoded.
    #[error("truncated note event at offset {offset}")]
    TruncatedEvent { offset: usize },

    /// A tick flag byte was neither 0x00 nor 0x02.
    #[error("bad tick flag 0x{found:02X} at offset {offset}")]
    BadTickFlag { offset: usize, found: u8 },

    /// A continuation byte was not one of 0x00 / 0x01 / 0x04.
    #[error("bad continuation byte 0x{found:02X} at offset {offset}")]
    BadContinuation { offset: usize, found: u8 },

    /// An explicit gate field did not end in three zero bytes.
    #[error("malformed gate field at offset {offset}")]
    BadGateField { offset: usize },

    /// The parameter-lock table signature was not found in the body.
    #[error("parameter-lock signature not found in track body")]
    PlockSignatureMissing,

    /// A 5-byte parameter-lock entry had non-zero terminator bytes.
    #[error("malformed parameter-lock entry at offset {offset}: terminator {found:02X?}")]
    MalformedPlockEntry { offset: usize, found: [u8; 2] },

    /// A parameter-lock table or record ran past the end of the buffer.
    #[error("truncated parameter-lock data at offset {offset}")]
    TruncatedPlock { offset: usize },

    /// A T10 or drum-format record carried unexpected marker bytes.
    #[error("malformed parameter-lock record at offset {offset}")]
    MalformedPlockRecord { offset: usize },

    /// Track body too small to carry the field being read.
    #[error("track body too short: {len} bytes, need {needed}")]
    BodyTooShort { len: usize, needed: usize },

    /// A body type byte was neither the inactive nor the active marker.
    #[error("unknown body type byte 0x{found:02X}")]
    UnknownTypeByte { found: u8 },

    /// The rotated block layout disagrees with the declared pattern counts.
    #[error("block layout declares {declared} logical entries, file holds {present}")]
    LogicalEntryCount { declared: usize, present: usize },
}

/// Error raised while validating a mutation request, before any bytes are
/// produced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A note event must carry at least one note.
    #[error("note list is empty")]
    EmptyNotes,

    /// More notes than a single event record can hold.
    #[error("too many notes for one event: {count} (maximum 64)")]
    TooManyNotes { count: usize },

    /// Requested event type byte is not in the known set.
    #[error("unknown event type 0x{found:02X}")]
    UnknownEventType { found: u8 },

    /// A note field is outside its wire range.
    #[error("{field} {value} out of range ({min}..={max})")]
    FieldOutOfRange {
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },

    /// Track index outside the 16 physical slots.
    #[error("track index {track} out of range (0..=15)")]
    TrackOutOfRange { track: usize },

    /// The same track was specified more than once.
    #[error("track {track} specified more than once")]
    DuplicateTrack { track: usize },

    /// A request mixed the single-pattern and multi-pattern shapes.
    #[error("track {track} mixes single-pattern and multi-pattern request shapes")]
    MixedRequestShape { track: usize },

    /// The single-slot scheme places at most one component per track body.
    #[error("track {track} requested {count} step components (at most 1 per track)")]
    TooManyComponents { track: usize, count: usize },

    /// A track requested zero patterns or more than the format allows.
    #[error("track {track} requested {count} patterns (allowed 1..={max})")]
    PatternCountOutOfRange {
        track: usize,
        count: usize,
        max: usize,
    },

    /// The requested multi-pattern track set has no device-verified
    /// descriptor encoding.
    #[error("unsupported multi-pattern track set {tracks:?}")]
    UnsupportedTopology { tracks: Vec<u8> },

    /// Multi-pattern synthesis needs a template whose 16 blocks are all
    /// single-pattern.
    #[error("template is not single-pattern (track {track} has {count} patterns)")]
    TemplateNotPlain { track: usize, count: usize },
}

/// Error raised at the point an unsafe byte-level operation would occur.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantError {
    /// Step components can only be placed on steps 1 and 9; other steps need
    /// a multi-slot table rewrite that has not been recovered.
    #[error("step component on step {step} is not supported (only steps 1 and 9)")]
    UnsupportedComponentStep { step: u8 },

    /// The slot to be replaced did not hold the empty marker.
    #[error("component slot at offset {offset} is already occupied")]
    SlotOccupied { offset: usize },

    /// The body ends before the component slot table does.
    #[error("component table out of bounds: body is {len} bytes, slot ends at {needed}")]
    ComponentTableOutOfBounds { len: usize, needed: usize },

    /// Supplied value count does not match the lane being rewritten.
    #[error("parameter-lock lane 0x{param_id:02X} holds {expected} value(s), {supplied} supplied")]
    PlockValueCount {
        param_id: u8,
        expected: usize,
        supplied: usize,
    },

    /// In-place rewrites below 256 hit a firmware crash path.
    #[error("parameter-lock value {value} below in-place rewrite floor of 256")]
    PlockValueFloor { value: u16 },

    /// Event insertion requires an activated body.
    #[error("track body is not activated")]
    BodyNotActivated,

    /// A tail-insertion body was shorter than its fixed parameter tail.
    #[error("track body too short for parameter tail: {len} bytes, tail is {tail}")]
    MissingParameterTail { len: usize, tail: usize },
}

/// Union error for the mutation surface, which crosses all three layers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MutateError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Invariant(#[from] InvariantError),
}
