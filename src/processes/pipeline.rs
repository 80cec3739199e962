//! `sap pipeline`: runs alignment and variant calling in one process,
//! sharing the in-memory reference table and evidence vectors directly
//! rather than round-tripping an alignment-record file. See `DESIGN.md`
//! for how this relates to the `align`/`call` split.

use clap::{Args, builder::RangedI64ValueParser};
use std::io::Write;
use std::path::PathBuf;
use zoe::data::err::ResultWithErrorContext;

use crate::processes::align::{load_reference, open_reads};
use crate::sap::{
    aligner::Aligner,
    config::{AlignerConfig, CallerConfig, UpdaterConfig},
    pool::{PoolCounts, run_pipeline},
    stream_io::ReadPairs,
    variant_caller::call_variants,
};

static MODULE: &str = module_path!();

/// Command line arguments for `sap pipeline`.
#[derive(Args, Debug)]
pub struct PipelineArgs {
    /// Path to the reference file (name line, DNA line, repeating).
    pub reference_file: PathBuf,

    /// Path to the reads file (DNA line, quality line, repeating). Reads from
    /// stdin if omitted.
    pub reads_file: Option<PathBuf>,

    #[arg(long, alias = "out")]
    /// Output filepath for the variant stream. Writes to STDOUT if not
    /// provided.
    pub output: Option<PathBuf>,

    #[arg(short = 'k', long, default_value_t = 15, value_parser = RangedI64ValueParser::<i64>::new().range(10..=20))]
    pub piece_size: i64,

    #[arg(long, default_value_t = 24, value_parser = RangedI64ValueParser::<i64>::new().range(20..=32))]
    pub bin_bits: i64,

    #[arg(long, default_value_t = 7)]
    pub cut_count: usize,

    #[arg(long, default_value_t = 0.08)]
    pub max_gap_ratio: f64,

    #[arg(long, default_value_t = 0.90)]
    pub min_quality: f64,

    #[arg(long, default_value_t = 20)]
    pub match_bonus: i32,

    #[arg(long, default_value_t = 13)]
    pub gap_penalty: i32,

    #[arg(long)]
    pub fast_map: bool,

    #[arg(short = 'r', long)]
    /// Also attempt alignment against the reverse complement of each read.
    pub rev_comp: bool,

    #[arg(short = 't', long)]
    /// Worker thread count. Defaults to logical cores minus two (spec §5).
    /// Ignored when built with `dev_no_rayon`.
    pub threads: Option<usize>,

    #[arg(long, default_value_t = 0.30)]
    pub min_read_quality: f64,

    #[arg(long, default_value_t = 0.9)]
    pub score_fraction: f64,

    #[arg(long, default_value_t = 6)]
    pub min_match_count: u32,

    #[arg(long)]
    pub max_match_count: Option<u32>,
}

impl PipelineArgs {
    fn aligner_config(&self) -> AlignerConfig {
        AlignerConfig {
            match_bonus: self.match_bonus,
            gap_penalty: self.gap_penalty,
            min_quality: self.min_quality,
            max_gap_ratio: self.max_gap_ratio,
            cut_count: self.cut_count,
            piece_size: self.piece_size as usize,
            bin_bits: self.bin_bits as u32,
            fast_map: self.fast_map,
        }
    }

    fn updater_config(&self) -> UpdaterConfig {
        UpdaterConfig {
            min_read_quality: self.min_read_quality,
            score_fraction: self.score_fraction,
        }
    }

    fn caller_config(&self) -> CallerConfig {
        CallerConfig {
            min_match_count: self.min_match_count,
            max_match_count: self.max_match_count,
        }
    }
}

/// Sub-program running alignment and variant calling as one pipeline.
pub fn pipeline_process(args: &PipelineArgs) -> std::io::Result<()> {
    eprintln!(
        "{MODULE} reference={} reads={} output={} pieceSize={} binBits={} cutCount={} maxGapRatio={} minQuality={} fastMap={} revComp={} minReadQuality={} scoreFraction={} minMatchCount={}",
        args.reference_file.display(),
        args.reads_file.as_ref().map_or("-".to_string(), |p| p.display().to_string()),
        args.output.as_ref().map_or("-".to_string(), |p| p.display().to_string()),
        args.piece_size,
        args.bin_bits,
        args.cut_count,
        args.max_gap_ratio,
        args.min_quality,
        args.fast_map,
        args.rev_comp,
        args.min_read_quality,
        args.score_fraction,
        args.min_match_count,
    );

    #[cfg(not(feature = "dev_no_rayon"))]
    {
        let threads = args.threads.unwrap_or_else(crate::sap::pool::default_thread_count);
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .unwrap_or_else(|e| eprintln!("{MODULE} Warning! Could not set thread count to {threads}: {e}"));
    }

    let aligner_config = args.aligner_config();
    let (references, index) = load_reference(&args.reference_file, &aligner_config)?;
    let aligner = Aligner::new(aligner_config, &references, &index);

    let (reads, decode_thread) = open_reads(args.reads_file.as_ref())?;
    let read_pairs = ReadPairs::new(reads);

    let updater_config = args.updater_config();
    let PoolCounts { mapped, total } = run_pipeline(read_pairs, &aligner, args.rev_comp, &references, &updater_config)?;

    if let Some(thread) = decode_thread {
        thread
            .join()
            .expect("decoder thread panicked")
            .with_context("Failed to decompress reads file")?;
    }

    let calls = call_variants(&references, &args.caller_config());

    let mut output = crate::io::create_output(args.output.as_ref()).with_context("Failed to open variant output")?;
    for call in &calls {
        writeln!(output, "{call}")?;
    }
    output.flush().with_context("Failed to write variant output")?;

    eprintln!("Processing finished. Found {mapped} in {total} ({mapped}/{total}).");
    Ok(())
}
