//! Worker pool & record framing (spec component H).
//!
//! Grounded on `processes/standalone/aligner/mod.rs`'s `align_all`: a
//! `rayon` `par_bridge`/`try_for_each_with` dispatch over the read stream when
//! parallelism is enabled, falling back to a plain serial `try_for_each` under
//! the `dev_no_rayon` feature. Each worker's reusable DP scratch (spec §4.G:
//! "two scratch matrices ... reused") is a thread-local, since `rayon` worker
//! threads are long-lived and reused across `try_for_each_with` items.

use crate::sap::{
    aligner::{Aligner, dp::Scratch},
    config::UpdaterConfig,
    evidence_updater::update_evidence,
    kmer_index::KmerIndex,
    reference_table::ReferenceTable,
    stream_io::{BlockWriter, ReadRecord, format_block},
};
use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};

#[cfg(not(feature = "dev_no_rayon"))]
use rayon::iter::{ParallelBridge, ParallelIterator};

thread_local! {
    static SCRATCH: RefCell<Scratch> = RefCell::new(Scratch::default());
}

/// The worker-thread count to fall back to when `--threads` is not given:
/// logical cores minus two, floored at one (spec §5: "N worker threads
/// (default 1, typically cores-2)"), grounded on the teacher's own
/// `num_procs.rs` use of `num_cpus::get`.
pub fn default_thread_count() -> usize {
    num_cpus::get().saturating_sub(2).max(1)
}

/// Reads seen and reads with at least one accepted alignment record,
/// matching §7's closing summary line "Processing finished. Found F in T
/// (F/T)."
#[derive(Debug, Default, Clone, Copy)]
pub struct PoolCounts {
    pub mapped: u64,
    pub total: u64,
}

/// Runs the worker pool over `reads`, aligning each against `aligner` and
/// writing its output block through `writer`.
///
/// `writer` is borrowed, not consumed: a clone is handed to each rayon job
/// (mirroring `align_all`'s `writer.clone()`), so the caller retains the
/// original writer (with its background-thread handle) to
/// [`flush`](BlockWriter::flush) once this returns.
///
/// A read contributes no block at all if it produces zero alignment records
/// (spec §4.G "Output framing": "unmapped reads do not appear in output").
///
/// ## Errors
///
/// Propagates the first I/O error hit either reading `reads` or sending a
/// block to `writer`.
pub fn run_pool<I, R>(reads: R, aligner: &Aligner<'_, I>, try_reverse: bool, writer: &mut BlockWriter) -> std::io::Result<PoolCounts>
where
    I: KmerIndex + Sync,
    R: Iterator<Item = std::io::Result<ReadRecord>> + Send,
{
    let mapped = AtomicU64::new(0);
    let total = AtomicU64::new(0);

    let work = |writer: &mut BlockWriter, item: std::io::Result<ReadRecord>| -> std::io::Result<()> {
        let read = item?;
        total.fetch_add(1, Ordering::Relaxed);

        let records = SCRATCH.with(|scratch| aligner.align_read(&read.dna, try_reverse, &mut scratch.borrow_mut()));

        if !records.is_empty() {
            mapped.fetch_add(1, Ordering::Relaxed);
            let block = format_block(&read, &records);
            writer
                .write_block(block)
                .map_err(|e| std::io::Error::other(e.to_string()))?;
        }

        Ok(())
    };

    #[cfg(not(feature = "dev_no_rayon"))]
    reads.par_bridge().try_for_each_with(writer.clone(), work)?;

    #[cfg(feature = "dev_no_rayon")]
    reads.try_for_each(|item| work(writer, item))?;

    Ok(PoolCounts {
        mapped: mapped.load(Ordering::Relaxed),
        total: total.load(Ordering::Relaxed),
    })
}

/// Fuses the worker pool (component H) with the evidence updater (component
/// I) in one pass: each read is aligned, then its records are immediately
/// replayed into `references`' evidence vectors — no alignment-record file
/// round-trip (spec §1: the `pipeline` mode "sharing the in-memory reference
/// table and evidence vectors directly").
///
/// ## Errors
///
/// Propagates the first I/O error hit reading `reads`.
pub fn run_pipeline<I, R>(
    reads: R, aligner: &Aligner<'_, I>, try_reverse: bool, references: &ReferenceTable, updater_config: &UpdaterConfig,
) -> std::io::Result<PoolCounts>
where
    I: KmerIndex + Sync,
    R: Iterator<Item = std::io::Result<ReadRecord>> + Send,
{
    let mapped = AtomicU64::new(0);
    let total = AtomicU64::new(0);

    let work = |item: std::io::Result<ReadRecord>| -> std::io::Result<()> {
        let read = item?;
        total.fetch_add(1, Ordering::Relaxed);

        let records = SCRATCH.with(|scratch| aligner.align_read(&read.dna, try_reverse, &mut scratch.borrow_mut()));

        if !records.is_empty() {
            mapped.fetch_add(1, Ordering::Relaxed);
            update_evidence(&read, &records, references, updater_config);
        }

        Ok(())
    };

    #[cfg(not(feature = "dev_no_rayon"))]
    reads.par_bridge().try_for_each(work)?;

    #[cfg(feature = "dev_no_rayon")]
    reads.try_for_each(work)?;

    Ok(PoolCounts {
        mapped: mapped.load(Ordering::Relaxed),
        total: total.load(Ordering::Relaxed),
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::sap::{aligner::build_reference_index, config::AlignerConfig, reference_table::ReferenceTable, sequence::ReferenceSequence};
    use std::io::Cursor;

    #[test]
    fn default_thread_count_is_never_zero() {
        assert!(default_thread_count() >= 1);
    }

    #[test]
    fn unmapped_reads_are_excluded_from_output() {
        let mut refs = ReferenceTable::new();
        refs.insert(ReferenceSequence::new("ref1".into(), b"acgtacgtacgtacgt".to_vec())).unwrap();
        let params = crate::sap::kmer_index::KmerParams { k: 15, bin_bits: 16 };
        let index = build_reference_index(&refs, params);
        let aligner = Aligner::new(AlignerConfig::default(), &refs, &index);

        let reads = vec![
            Ok(ReadRecord {
                dna: b"acgtacgtacgtacgt".to_vec(),
                quality: b"IIIIIIIIIIIIIIII".to_vec(),
            }),
            Ok(ReadRecord {
                dna: b"gggg".to_vec(),
                quality: b"IIII".to_vec(),
            }),
        ]
        .into_iter();

        let dest: Vec<u8> = Vec::new();
        let mut writer = BlockWriter::from_writer(Cursor::new(dest));
        let counts = run_pool(reads, &aligner, false, &mut writer).unwrap();
        writer.flush().unwrap();

        assert_eq!(counts.total, 2);
        assert_eq!(counts.mapped, 1);
    }

    #[test]
    fn pipeline_updates_evidence_without_an_intermediate_file() {
        let mut refs = ReferenceTable::new();
        refs.insert(ReferenceSequence::new("ref1".into(), b"acgtacgtacgtacgt".to_vec())).unwrap();
        let params = crate::sap::kmer_index::KmerParams { k: 15, bin_bits: 16 };
        let index = build_reference_index(&refs, params);
        let aligner = Aligner::new(AlignerConfig::default(), &refs, &index);

        let reads = vec![Ok(ReadRecord {
            dna: b"acgtacgtacgtacgt".to_vec(),
            quality: b"IIIIIIIIIIIIIIII".to_vec(),
        })]
        .into_iter();

        let counts = run_pipeline(reads, &aligner, false, &refs, &crate::sap::config::UpdaterConfig::default()).unwrap();
        assert_eq!(counts.mapped, 1);

        let id = refs.id_of("ref1").unwrap();
        let evidence = &refs.get(id).unwrap().evidence;
        assert_eq!(evidence.match_count(0).iter().sum::<u32>(), 1);
    }
}
