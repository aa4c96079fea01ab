//! gbx-format - codec and mutation engine for groove-box project files.
//!
//! The device's project-file format has no public specification; everything
//! here was recovered by byte-level diffing of firmware-authored captures.
//! The crate parses a capture into a [`project::Project`], exposes codecs
//! for the note-event, step-component, and parameter-lock tables embedded in
//! track bodies, and mutates projects by activating tracks, inserting
//! events, and synthesizing multi-pattern layouts.
//!
//! Two invariants drive the design:
//!
//! - **Round-trip law**: re-serializing a parsed project reproduces the
//!   input byte-for-byte unless it was explicitly mutated. Regions the codec
//!   does not understand (engine parameter blobs, the descriptor area) are
//!   carried verbatim.
//! - **No guessed bytes**: where the format is only partially recovered
//!   (scheme-B descriptors, step components outside steps 1/9), operations
//!   fail fast instead of emitting output that may crash the device.
//!
//! All operations are pure functions over immutable byte buffers: there is
//! no shared state, no I/O, and no blocking, so independent files can be
//! processed concurrently without coordination.
//!
//! # Example
//!
//! ```ignore
//! use gbx_format::{mutate, project::Project};
//!
//! let bytes = std::fs::read("capture.gbx")?;
//! let template = Project::parse(&bytes)?;
//! let built = mutate::apply_notes(&template, &requests)?;
//! std::fs::write("out.gbx", built.serialize())?;
//! ```

pub mod component;
pub mod engine;
pub mod error;
pub mod event;
pub mod fixture;
pub mod mutate;
pub mod plock;
pub mod project;

pub use component::{ComponentType, StepComponent};
pub use engine::EngineId;
pub use error::{InvariantError, MutateError, ParseError, ValidationError};
pub use event::Note;
pub use mutate::{DescriptorStrategy, TrackNotes, TrackPatterns};
pub use project::{Project, TrackBlock};

/// Crate version for tool identification.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
