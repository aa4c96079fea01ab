//! Compare command: byte-compare two project files.
//!
//! Built for regression tooling: the report names the first mismatch offset
//! and the bytes on each side, plus content hashes of both files.

use std::fs;
use std::process::ExitCode;

use anyhow::{Context, Result};
use colored::Colorize;
use serde_json::json;

use super::first_mismatch;

/// Run the compare command. Exit code is zero only for byte-identical files.
pub fn run(path_a: &str, path_b: &str, json_output: bool) -> Result<ExitCode> {
    let data_a = fs::read(path_a).with_context(|| format!("failed to read file A: {}", path_a))?;
    let data_b = fs::read(path_b).with_context(|| format!("failed to read file B: {}", path_b))?;

    let hash_a = blake3::hash(&data_a).to_hex().to_string();
    let hash_b = blake3::hash(&data_b).to_hex().to_string();
    let mismatch = first_mismatch(&data_a, &data_b);

    if json_output {
        let report = json!({
            "identical": mismatch.is_none(),
            "a": { "path": path_a, "bytes": data_a.len(), "hash": hash_a },
            "b": { "path": path_b, "bytes": data_b.len(), "hash": hash_b },
            "mismatch": mismatch.map(|(offset, byte_a, byte_b)| json!({
                "offset": offset,
                "a": byte_a,
                "b": byte_b,
            })),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", "Comparing files:".cyan().bold());
        println!("  {} {} ({} bytes)", "A:".dimmed(), path_a, data_a.len());
        println!("  {} {} ({} bytes)", "B:".dimmed(), path_b, data_b.len());
        println!("{} {}", "Hash A:".dimmed(), &hash_a[..16]);
        println!("{} {}", "Hash B:".dimmed(), &hash_b[..16]);
        match mismatch {
            None => println!("\n{}", "Files are byte-identical!".green().bold()),
            Some((offset, byte_a, byte_b)) => {
                println!(
                    "\n{} first mismatch at offset 0x{:04X}: {} vs {}",
                    "Differ:".red().bold(),
                    offset,
                    describe(byte_a),
                    describe(byte_b),
                );
            }
        }
    }

    Ok(if mismatch.is_none() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn describe(byte: Option<u8>) -> String {
    match byte {
        Some(value) => format!("0x{:02X}", value),
        None => "(past end)".to_string(),
    }
}
