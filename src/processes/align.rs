//! `sap align`: runs components E/F/G/H end to end — reads the reference and
//! read files, builds the k-mer seed index, and streams every read through
//! the worker pool, writing the framed alignment-record stream (spec §6).

use clap::{Args, builder::RangedI64ValueParser};
use std::path::PathBuf;
use zoe::data::err::ResultWithErrorContext;

use crate::sap::{
    aligner::{Aligner, build_reference_index},
    config::AlignerConfig,
    kmer_index::{ArenaKmerIndex, KmerParams},
    pool::{PoolCounts, run_pool},
    reference_table::ReferenceTable,
    stream_io::{BlockWriter, ReadPairs, read_reference_file},
};

static MODULE: &str = module_path!();

/// Command line arguments for `sap align`.
#[derive(Args, Debug)]
pub struct AlignArgs {
    /// Path to the reference file (name line, DNA line, repeating). A `.gz`
    /// extension is decompressed transparently.
    pub reference_file: PathBuf,

    /// Path to the reads file (DNA line, quality line, repeating). Reads from
    /// stdin if omitted.
    pub reads_file: Option<PathBuf>,

    #[arg(long, alias = "out")]
    /// Output filepath for the alignment-record stream. Writes to STDOUT if
    /// not provided. A `.gz` extension compresses the output.
    pub output: Option<PathBuf>,

    #[arg(short = 'k', long, default_value_t = 15, value_parser = RangedI64ValueParser::<i64>::new().range(10..=20))]
    /// k-mer ("piece") length used to seed candidate loci.
    pub piece_size: i64,

    #[arg(long, default_value_t = 24, value_parser = RangedI64ValueParser::<i64>::new().range(20..=32))]
    /// log2 of the k-mer hash index's bucket count.
    pub bin_bits: i64,

    #[arg(long, default_value_t = 7)]
    /// Number of seed anchor positions sampled per read.
    pub cut_count: usize,

    #[arg(long, default_value_t = 0.08)]
    /// Fraction of read length defining the maximum seed-cluster gap and DP
    /// band half-width.
    pub max_gap_ratio: f64,

    #[arg(long, default_value_t = 0.90)]
    /// Minimum accepted fraction of `matchBonus * readLen` (or, for a
    /// gap-free cluster, matched fraction of the read).
    pub min_quality: f64,

    #[arg(long, default_value_t = 20)]
    /// DP match/substitution bonus.
    pub match_bonus: i32,

    #[arg(long, default_value_t = 13)]
    /// DP gap-open/extend penalty (read-gap and ref-gap share one cost).
    pub gap_penalty: i32,

    #[arg(long)]
    /// Disables 1-mismatch seed lookup when the exact lookup misses.
    pub fast_map: bool,

    #[arg(short = 'r', long)]
    /// Also attempt alignment against the reverse complement of each read.
    pub rev_comp: bool,

    #[arg(short = 't', long)]
    /// Worker thread count. Defaults to logical cores minus two (spec §5).
    /// Ignored when built with `dev_no_rayon`.
    pub threads: Option<usize>,
}

impl AlignArgs {
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
}

/// Loads the reference file and builds its k-mer seed index (spec §4.F/§5:
/// "built before workers start; read-only during alignment").
pub(crate) fn load_reference(path: &PathBuf, config: &AlignerConfig) -> std::io::Result<(ReferenceTable, ArenaKmerIndex)> {
    let (reader, decode_thread) = crate::io::open_input(path).with_file_context("Failed to open reference file", path)?;
    let table = read_reference_file(reader).with_file_context("Failed to read reference file", path)?;

    if let Some(thread) = decode_thread {
        thread.join().expect("decoder thread panicked").with_file_context("Failed to decompress reference file", path)?;
    }

    let params = KmerParams {
        k: config.piece_size,
        bin_bits: config.bin_bits,
    };
    let index = build_reference_index(&table, params);
    Ok((table, index))
}

/// Opens `path`, or stdin if `None`, as a boxed `BufRead` (spec §4.E's reader
/// contract, made uniform over file-vs-stdin the way `fastqc_process` uses
/// `Either` for its own input). The returned [`crate::io::IoThread`], if any,
/// must be joined once the reader has been fully drained to propagate any
/// gzip decode error.
pub(crate) fn open_reads(path: Option<&PathBuf>) -> std::io::Result<(Box<dyn std::io::BufRead + Send>, Option<crate::io::IoThread>)> {
    match path {
        Some(path) => {
            let (reader, decode_thread) = crate::io::open_input(path).with_file_context("Failed to open reads file", path)?;
            Ok((Box::new(reader), decode_thread))
        }
        None => Ok((Box::new(crate::io::open_stdin()), None)),
    }
}

/// Sub-program for aligning reads against a reference (spec §4.G/§4.H).
pub fn align_process(args: &AlignArgs) -> std::io::Result<()> {
    eprintln!(
        "{MODULE} reference={} reads={} output={} pieceSize={} binBits={} cutCount={} maxGapRatio={} minQuality={} fastMap={} revComp={}",
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
    );

    #[cfg(not(feature = "dev_no_rayon"))]
    {
        let threads = args.threads.unwrap_or_else(crate::sap::pool::default_thread_count);
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .unwrap_or_else(|e| eprintln!("{MODULE} Warning! Could not set thread count to {threads}: {e}"));
    }

    let config = args.aligner_config();
    let (references, index) = load_reference(&args.reference_file, &config)?;
    let aligner = Aligner::new(config, &references, &index);

    let (reads, decode_thread) = open_reads(args.reads_file.as_ref())?;
    let read_pairs = ReadPairs::new(reads);

    let output = crate::io::create_output(args.output.as_ref()).with_context("Failed to open alignment output")?;
    let mut writer = BlockWriter::from_writer(output);

    let PoolCounts { mapped, total } = run_pool(read_pairs, &aligner, args.rev_comp, &mut writer)?;

    writer.flush().with_context("Failed to write alignment output")?;

    if let Some(thread) = decode_thread {
        thread
            .join()
            .expect("decoder thread panicked")
            .with_context("Failed to decompress reads file")?;
    }

    eprintln!("Processing finished. Found {mapped} in {total} ({mapped}/{total}).");
    Ok(())
}
