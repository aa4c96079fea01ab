//! JSON build-request schema and compilation into mutation requests.
//!
//! A request names a template capture and, per track, either a flat `notes`
//! list (single-pattern shape) or a `patterns` list whose entries are `null`
//! for blank patterns (multi-pattern shape). The two shapes cannot be mixed
//! within one request. All shape errors are raised here, before any mutation
//! is attempted.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use gbx_format::component::ComponentType;
use gbx_format::mutate::{DescriptorStrategy, TrackNotes, TrackPatterns};
use gbx_format::project::TRACK_COUNT;
use gbx_format::{Note, StepComponent};

/// Top-level build request.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildRequest {
    /// Path to the template capture.
    pub template: PathBuf,
    /// Per-track content.
    pub tracks: Vec<TrackRequest>,
    /// Optional header overrides.
    #[serde(default)]
    pub header: Option<HeaderOverrides>,
    /// Descriptor synthesis strategy; strict unless opted out.
    #[serde(default)]
    pub descriptor_strategy: DescriptorStrategy,
    /// Optional output path; the --output flag takes precedence.
    #[serde(default)]
    pub output: Option<PathBuf>,
}

/// Content for one track: exactly one of `notes` / `patterns`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrackRequest {
    /// 1-based track number as printed on the device.
    pub track: u8,
    #[serde(default)]
    pub notes: Option<Vec<NoteSpec>>,
    #[serde(default)]
    pub patterns: Option<Vec<Option<PatternSpec>>>,
    /// Optional step components (single-pattern shape only).
    #[serde(default)]
    pub components: Vec<ComponentSpec>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NoteSpec {
    pub step: u8,
    pub note: u8,
    pub velocity: u8,
    #[serde(default)]
    pub tick_offset: u16,
    #[serde(default)]
    pub gate_ticks: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PatternSpec {
    #[serde(default)]
    pub notes: Vec<NoteSpec>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComponentSpec {
    pub step: u8,
    pub component: String,
    pub param: u8,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HeaderOverrides {
    pub tempo_tenths: Option<u16>,
    pub groove_type: Option<u8>,
    pub groove_amount: Option<u8>,
    pub metronome_level: Option<u8>,
}

/// Compiled mutation plan.
#[derive(Debug)]
pub enum Plan {
    /// Single-pattern shape: activation plus event insertion.
    Singles(Vec<TrackNotes>),
    /// Multi-pattern shape: scaffold or full synthesis.
    Patterns(Vec<TrackPatterns>),
}

impl NoteSpec {
    fn to_note(&self) -> Note {
        Note {
            step: self.step,
            note: self.note,
            velocity: self.velocity,
            tick_offset: self.tick_offset,
            gate_ticks: self.gate_ticks,
        }
    }
}

impl BuildRequest {
    /// Parse a request from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("malformed build request")
    }

    /// Compile the request into a mutation plan, raising every shape error
    /// before any mutation runs.
    pub fn compile(&self) -> Result<Plan> {
        let mut single = false;
        let mut multi = false;
        for track in &self.tracks {
            let number = track.track as usize;
            if number == 0 || number > TRACK_COUNT {
                bail!("track {} out of range (1..=16)", track.track);
            }
            match (&track.notes, &track.patterns) {
                (Some(_), Some(_)) => {
                    bail!(
                        "track {} mixes single-pattern and multi-pattern request shapes",
                        track.track
                    );
                }
                (Some(_), None) => single = true,
                (None, Some(_)) => {
                    multi = true;
                    if !track.components.is_empty() {
                        bail!(
                            "track {}: step components are only supported in the single-pattern shape",
                            track.track
                        );
                    }
                }
                (None, None) => {}
            }
        }
        if single && multi {
            bail!("request mixes single-pattern and multi-pattern request shapes");
        }

        if multi {
            let requests = self
                .tracks
                .iter()
                .filter_map(|track| {
                    track.patterns.as_deref().map(|patterns| TrackPatterns {
                        track: track.track as usize - 1,
                        patterns: patterns
                            .iter()
                            .map(|pattern| {
                                pattern
                                    .as_ref()
                                    .map(|p| p.notes.iter().map(NoteSpec::to_note).collect())
                            })
                            .collect(),
                    })
                })
                .collect();
            return Ok(Plan::Patterns(requests));
        }

        let mut requests = Vec::with_capacity(self.tracks.len());
        for track in &self.tracks {
            let mut components = Vec::with_capacity(track.components.len());
            for entry in &track.components {
                let component = ComponentType::from_name(&entry.component)
                    .with_context(|| format!("unknown component \"{}\"", entry.component))?;
                components.push(StepComponent {
                    step: entry.step,
                    component,
                    param: entry.param,
                });
            }
            requests.push(TrackNotes {
                track: track.track as usize - 1,
                notes: track
                    .notes
                    .as_deref()
                    .unwrap_or(&[])
                    .iter()
                    .map(NoteSpec::to_note)
                    .collect(),
                components,
            });
        }
        Ok(Plan::Singles(requests))
    }
}
