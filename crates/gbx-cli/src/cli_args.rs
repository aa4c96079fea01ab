//! CLI argument definitions.
//!
//! All `#[derive(Parser)]` and `#[derive(Subcommand)]` types are defined
//! here, keeping `main.rs` focused on dispatch logic.

use clap::{Parser, Subcommand};

/// gbx - groove-box project file tooling
#[derive(Parser)]
#[command(name = "gbx")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build a project file from a JSON build request
    Build {
        /// Path to the build request (JSON)
        #[arg(short, long)]
        request: String,

        /// Output file path (overrides the request's output field)
        #[arg(short, long)]
        output: Option<String>,

        /// Reference file to compare the build against
        #[arg(long)]
        expect: Option<String>,

        /// Output machine-readable JSON diagnostics (no colored output)
        #[arg(long)]
        json: bool,
    },

    /// Inspect a project file: header, track table, decoded note events
    Inspect {
        /// Path to the project file
        #[arg(short, long)]
        input: Option<String>,

        /// Directory to recursively scan for project files (batch mode)
        #[arg(long)]
        input_dir: Option<String>,

        /// Also decode and print note events of activated tracks
        #[arg(long)]
        notes: bool,

        /// Output machine-readable JSON diagnostics (no colored output)
        #[arg(long)]
        json: bool,
    },

    /// Byte-compare two project files
    Compare {
        /// Path to the first file (reference)
        #[arg(short, long)]
        a: String,

        /// Path to the second file (comparison target)
        #[arg(short, long)]
        b: String,

        /// Output machine-readable JSON diagnostics (no colored output)
        #[arg(long)]
        json: bool,
    },
}
