//! `sap call`: runs components E/I/D/J — replays an alignment-record stream
//! (as emitted by `sap align`) into a fresh evidence vector per reference,
//! then calls SNP/insertion/deletion variants from the accumulated evidence
//! (spec §4.I/§4.J).

use clap::Args;
use std::io::Write;
use std::path::PathBuf;
use zoe::data::err::ResultWithErrorContext;

use crate::processes::align::open_reads;
use crate::sap::{
    config::{CallerConfig, UpdaterConfig},
    evidence_updater::update_evidence,
    stream_io::{AlignmentBlocks, read_reference_file},
    variant_caller::call_variants,
};

static MODULE: &str = module_path!();

/// Command line arguments for `sap call`.
#[derive(Args, Debug)]
pub struct CallArgs {
    /// Path to the reference file the alignment records were produced
    /// against (name line, DNA line, repeating).
    pub reference_file: PathBuf,

    /// Path to the alignment-record stream (spec §6), as emitted by `sap
    /// align`. Reads from stdin if omitted.
    pub alignment_file: Option<PathBuf>,

    #[arg(long, alias = "out")]
    /// Output filepath for the variant stream. Writes to STDOUT if not
    /// provided.
    pub output: Option<PathBuf>,

    #[arg(long, default_value_t = 0.30)]
    /// Minimum average per-read quality (score-space) for a read's records
    /// to contribute evidence.
    pub min_read_quality: f64,

    #[arg(long, default_value_t = 0.9)]
    /// Only records scoring at least this fraction of a read's best score
    /// contribute evidence.
    pub score_fraction: f64,

    #[arg(long, default_value_t = 6)]
    /// Minimum pileup depth for a position to be called.
    pub min_match_count: u32,

    #[arg(long)]
    /// Optional maximum pileup depth; positions deeper than this are
    /// excluded from SNP calling (supplemented feature, see `DESIGN.md`).
    pub max_match_count: Option<u32>,
}

/// Sub-program for calling variants from an alignment-record stream (spec
/// §4.I/§4.J).
pub fn call_process(args: &CallArgs) -> std::io::Result<()> {
    eprintln!(
        "{MODULE} reference={} alignments={} output={} minReadQuality={} scoreFraction={} minMatchCount={}",
        args.reference_file.display(),
        args.alignment_file.as_ref().map_or("-".to_string(), |p| p.display().to_string()),
        args.output.as_ref().map_or("-".to_string(), |p| p.display().to_string()),
        args.min_read_quality,
        args.score_fraction,
        args.min_match_count,
    );

    let (ref_reader, ref_decode_thread) =
        crate::io::open_input(&args.reference_file).with_file_context("Failed to open reference file", &args.reference_file)?;
    let references = read_reference_file(ref_reader).with_file_context("Failed to read reference file", &args.reference_file)?;
    if let Some(thread) = ref_decode_thread {
        thread
            .join()
            .expect("decoder thread panicked")
            .with_file_context("Failed to decompress reference file", &args.reference_file)?;
    }

    let (alignments, decode_thread) = open_reads(args.alignment_file.as_ref())?;
    let updater_config = UpdaterConfig {
        min_read_quality: args.min_read_quality,
        score_fraction: args.score_fraction,
    };

    let mut blocks = AlignmentBlocks::new(alignments);
    let mut contributing = 0u64;
    let mut total = 0u64;

    for block in &mut blocks {
        let (read, records) = block?;
        total += 1;
        if update_evidence(&read, &records, &references, &updater_config) {
            contributing += 1;
        }
    }

    if let Some(thread) = decode_thread {
        thread
            .join()
            .expect("decoder thread panicked")
            .with_context("Failed to decompress alignment stream")?;
    }

    let caller_config = CallerConfig {
        min_match_count: args.min_match_count,
        max_match_count: args.max_match_count,
    };
    let calls = call_variants(&references, &caller_config);

    let mut output = crate::io::create_output(args.output.as_ref()).with_context("Failed to open variant output")?;
    for call in &calls {
        writeln!(output, "{call}")?;
    }
    output.flush().with_context("Failed to write variant output")?;

    eprintln!("Processing finished. Found {contributing} in {total} ({contributing}/{total}).");
    Ok(())
}
