//! Build command: compile a JSON build request into a project file.
//!
//! Pipeline: load and validate the request, parse the template, apply the
//! mutation plan, apply header overrides, serialize, run the round-trip
//! self-check, optionally compare against a reference file, write the
//! output. Any rejection fails the whole build; there is no partial output.

use std::fs;
use std::path::Path;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use colored::Colorize;
use serde_json::json;

use gbx_format::mutate;
use gbx_format::project::{header::Header, Project};

use super::first_mismatch;
use crate::request::{BuildRequest, Plan};

/// Run the build command. Returns a failing exit code when the expect
/// comparison finds a mismatch.
pub fn run(
    request_path: &str,
    output: Option<&str>,
    expect: Option<&str>,
    json_output: bool,
) -> Result<ExitCode> {
    let request_text = fs::read_to_string(request_path)
        .with_context(|| format!("failed to read build request: {}", request_path))?;
    let request = BuildRequest::from_json(&request_text)?;
    let plan = request.compile()?;

    let template_bytes = fs::read(&request.template)
        .with_context(|| format!("failed to read template: {}", request.template.display()))?;
    let template = Project::parse(&template_bytes)
        .with_context(|| format!("failed to parse template: {}", request.template.display()))?;

    let mut built = match &plan {
        Plan::Singles(requests) => mutate::apply_notes(&template, requests)?,
        Plan::Patterns(requests) => {
            mutate::apply_patterns(&template, requests, request.descriptor_strategy)?
        }
    };

    if let Some(overrides) = &request.header {
        let mut fields = Header::read(&built.pre_track)?;
        if let Some(tempo) = overrides.tempo_tenths {
            fields.tempo_tenths = tempo;
        }
        if let Some(groove_type) = overrides.groove_type {
            fields.groove_type = groove_type;
        }
        if let Some(groove_amount) = overrides.groove_amount {
            fields.groove_amount = groove_amount;
        }
        if let Some(metronome) = overrides.metronome_level {
            fields.metronome_level = metronome;
        }
        fields.write(&mut built.pre_track)?;
    }

    let bytes = built.serialize();

    // Round-trip self-check: the output must re-parse and re-serialize to
    // the same bytes before it is allowed to exist on disk.
    let reparsed =
        Project::parse(&bytes).context("round-trip self-check failed: output does not parse")?;
    if reparsed.serialize() != bytes {
        bail!("round-trip self-check failed: output does not re-serialize identically");
    }

    let hash = blake3::hash(&bytes).to_hex().to_string();

    let mismatch = match expect {
        Some(reference_path) => {
            let reference = fs::read(reference_path)
                .with_context(|| format!("failed to read reference: {}", reference_path))?;
            first_mismatch(&bytes, &reference)
        }
        None => None,
    };

    let output_path: Option<&Path> = output.map(Path::new).or(request.output.as_deref());
    if let Some(path) = output_path {
        fs::write(path, &bytes)
            .with_context(|| format!("failed to write output: {}", path.display()))?;
    }

    if json_output {
        let report = json!({
            "ok": mismatch.is_none(),
            "bytes": bytes.len(),
            "hash": hash,
            "output": output_path.map(|p| p.display().to_string()),
            "mismatch": mismatch.map(|(offset, built_byte, reference_byte)| json!({
                "offset": offset,
                "built": built_byte,
                "reference": reference_byte,
            })),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "{} {} bytes, blake3 {}",
            "Built:".green().bold(),
            bytes.len(),
            &hash[..16]
        );
        if let Some(path) = output_path {
            println!("{} {}", "Wrote:".dimmed(), path.display());
        }
        match mismatch {
            Some((offset, built_byte, reference_byte)) => {
                println!(
                    "{} first mismatch at offset 0x{:04X}: built {} vs reference {}",
                    "Expect:".red().bold(),
                    offset,
                    format_byte(built_byte),
                    format_byte(reference_byte),
                );
            }
            None if expect.is_some() => {
                println!("{} byte-identical to reference", "Expect:".green().bold());
            }
            None => {}
        }
    }

    Ok(if mismatch.is_some() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn format_byte(byte: Option<u8>) -> String {
    match byte {
        Some(value) => format!("0x{:02X}", value),
        None => "(past end)".to_string(),
    }
}
