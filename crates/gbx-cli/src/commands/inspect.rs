//! Inspect command: human-readable or JSON dump of a project file.

use std::fs;
use std::path::Path;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use colored::Colorize;
use serde_json::json;
use walkdir::WalkDir;

use gbx_format::mutate::rotation;
use gbx_format::project::{header, Project};

/// Run the inspect command over one file or a directory tree.
pub fn run(
    input: Option<&str>,
    input_dir: Option<&str>,
    notes: bool,
    json_output: bool,
) -> Result<ExitCode> {
    match (input, input_dir) {
        (Some(path), None) => {
            inspect_file(Path::new(path), notes, json_output)?;
            Ok(ExitCode::SUCCESS)
        }
        (None, Some(dir)) => {
            let mut failures = 0usize;
            for entry in WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
                let path = entry.path();
                if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("gbx") {
                    continue;
                }
                if let Err(error) = inspect_file(path, notes, json_output) {
                    eprintln!("{} {}: {:#}", "Error:".red().bold(), path.display(), error);
                    failures += 1;
                }
            }
            Ok(if failures == 0 {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        _ => bail!("exactly one of --input / --input-dir is required"),
    }
}

fn inspect_file(path: &Path, notes: bool, json_output: bool) -> Result<()> {
    let bytes =
        fs::read(path).with_context(|| format!("failed to read file: {}", path.display()))?;
    let project =
        Project::parse(&bytes).with_context(|| format!("failed to parse: {}", path.display()))?;
    let fields = header::Header::read(&project.pre_track)?;
    let counters = header::pattern_counters(&project.pre_track)?;
    let counts = rotation::pattern_counts(&project)?;

    if json_output {
        let blocks: Vec<_> = project
            .tracks
            .iter()
            .enumerate()
            .map(|(index, block)| {
                let engine = block.engine_id().ok();
                json!({
                    "slot": index + 1,
                    "preamble": block.preamble,
                    "active": block.is_active(),
                    "engine": engine.map(|e| e.name()),
                    "body_bytes": block.body.len(),
                    "notes": if notes && block.is_active() {
                        engine
                            .and_then(|e| gbx_format::event::locate(&block.body, e))
                            .map(|(_, decoded)| json!(decoded))
                    } else {
                        None
                    },
                })
            })
            .collect();
        let report = json!({
            "file": path.display().to_string(),
            "bytes": bytes.len(),
            "hash": blake3::hash(&bytes).to_hex().to_string(),
            "tempo_tenths": fields.tempo_tenths,
            "groove_type": fields.groove_type,
            "groove_amount": fields.groove_amount,
            "metronome_level": fields.metronome_level,
            "pattern_counters": [counters.0, counters.1],
            "pattern_counts": counts,
            "blocks": blocks,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{} {}", "File:".cyan().bold(), path.display());
    println!(
        "  {} {}.{} BPM  groove {}/{}  metronome {}",
        "Tempo:".dimmed(),
        fields.tempo_tenths / 10,
        fields.tempo_tenths % 10,
        fields.groove_type,
        fields.groove_amount,
        fields.metronome_level,
    );
    println!(
        "  {} {} bytes, pre-track {} bytes, counters {:?}",
        "Size:".dimmed(),
        bytes.len(),
        project.pre_track.len(),
        [counters.0, counters.1],
    );
    for (index, block) in project.tracks.iter().enumerate() {
        let engine = block.engine_id().ok();
        let state = if block.is_active() {
            "active".green()
        } else {
            "inactive".dimmed()
        };
        println!(
            "  {:>2}  {:02X?}  {:<8}  {:<9}  {:>5} bytes  {} pattern(s)",
            index + 1,
            block.preamble,
            state,
            engine.map(|e| e.name()).unwrap_or("?"),
            block.body.len(),
            counts[index],
        );
        if notes && block.is_active() {
            if let Some((offset, decoded)) =
                engine.and_then(|e| gbx_format::event::locate(&block.body, e))
            {
                println!(
                    "        {} {} note(s) at body offset 0x{:04X}",
                    "Event:".dimmed(),
                    decoded.len(),
                    offset,
                );
                for note in decoded {
                    println!(
                        "        step {:>2}+{:<3}  note {:>3}  vel {:>3}  gate {}",
                        note.step,
                        note.tick_offset,
                        note.note,
                        note.velocity,
                        if note.gate_ticks == 0 {
                            "default".to_string()
                        } else {
                            format!("{} ticks", note.gate_ticks)
                        },
                    );
                }
            }
        }
    }
    Ok(())
}
