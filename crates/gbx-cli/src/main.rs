//! gbx - command-line interface for groove-box project files.

use std::process::ExitCode;

use clap::Parser;

use gbx_cli::cli_args::{Cli, Commands};
use gbx_cli::commands;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let result = match &cli.command {
        Commands::Build {
            request,
            output,
            expect,
            json,
        } => commands::build::run(request, output.as_deref(), expect.as_deref(), *json),
        Commands::Inspect {
            input,
            input_dir,
            notes,
            json,
        } => commands::inspect::run(input.as_deref(), input_dir.as_deref(), *notes, *json),
        Commands::Compare { a, b, json } => commands::compare::run(a, b, *json),
    };
    match result {
        Ok(code) => code,
        Err(error) => {
            eprintln!("Error: {:#}", error);
            ExitCode::FAILURE
        }
    }
}
