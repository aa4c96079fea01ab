//! gbx-cli - command-line tooling around the project-file codec.
//!
//! Three commands cover the collaborator surface of the codec:
//!
//! - `build`: compile a JSON build request into a project file, with a
//!   round-trip self-check and an optional reference comparison.
//! - `inspect`: dump header fields, the track-block table, and decoded note
//!   events of a capture, as human-readable text or JSON.
//! - `compare`: byte-compare two files and report the first mismatch.

pub mod cli_args;
pub mod commands;
pub mod request;
