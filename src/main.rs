#![allow(unreachable_patterns)]

use clap::{Parser, Subcommand};
use sap::{AlignArgs, CallArgs, FastqConverterArgs, PipelineArgs, align_process, call_process, fastqc_process, pipeline_process};
use std::process::ExitCode;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Converts and quality-filters raw FastQ reads.
    FastqConverter(FastqConverterArgs),
    /// Aligns reads against a reference, emitting an alignment-record stream.
    Align(AlignArgs),
    /// Calls variants from an alignment-record stream.
    Call(CallArgs),
    /// Aligns and calls variants in one process.
    Pipeline(PipelineArgs),
}

fn main() -> ExitCode {
    let args = Cli::parse();

    let result = match args.command {
        Commands::FastqConverter(cmd_args) => fastqc_process(&cmd_args),
        Commands::Align(cmd_args) => align_process(&cmd_args),
        Commands::Call(cmd_args) => call_process(&cmd_args),
        Commands::Pipeline(cmd_args) => pipeline_process(&cmd_args),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
