//! Banded seeded aligner (spec component G, "the heart of the system").
//!
//! [`Aligner::align_read`] runs the full per-read pipeline: seed collection
//! (§4.G step 1) against the k-mer index, clustering by reference (step 2),
//! gap-free or banded alignment per cluster (step 3), and emission of
//! [`AlignmentRecord`]s (step 4).

pub mod dp;
pub mod record;

use crate::sap::{
    config::AlignerConfig,
    kmer_index::{KmerIndex, pack_kmer},
    reference_table::ReferenceTable,
    sequence::reverse_complement,
};
use dp::Scratch;
use foldhash::fast::RandomState;
use record::{AlignmentRecord, Direction};
use std::collections::HashMap;

/// Clips `score` into `[0, 1]` using the min-quality-normalized formula from
/// spec §4.G step 4.
pub fn clip_score(quality: f64, min_quality: f64) -> f64 {
    let raw = 1.0 - (1.0 - quality) / (1.0 - min_quality);
    raw.clamp(0.0, 1.0)
}

/// Chooses `cut_count` seed anchor positions over `[0, read_len - k]`,
/// uniformly spaced, with the last forced to `read_len - k - 1` (spec §4.G
/// step 1). Returns an empty vector if the read is shorter than `k`.
fn seed_positions(read_len: usize, k: usize, cut_count: usize) -> Vec<usize> {
    if read_len < k {
        return Vec::new();
    }
    let max_pos = read_len - k;

    if cut_count <= 1 {
        return vec![0];
    }

    let mut positions: Vec<usize> = (0..cut_count)
        .map(|i| (i * max_pos) / (cut_count - 1))
        .collect();
    if let Some(last) = positions.last_mut() {
        *last = max_pos.saturating_sub(1);
    }
    positions.sort_unstable();
    positions.dedup();
    positions
}

/// Counts `n` bases in `window`.
fn n_count(window: &[u8]) -> usize {
    window.iter().filter(|&&b| b == b'n').count()
}

/// The banded seeded aligner: owns tuning configuration and borrows the
/// reference table / k-mer index, which are read-only during alignment
/// (spec §5).
pub struct Aligner<'a, I> {
    pub config: AlignerConfig,
    references: &'a ReferenceTable,
    index: &'a I,
}

impl<'a, I: KmerIndex> Aligner<'a, I> {
    pub fn new(config: AlignerConfig, references: &'a ReferenceTable, index: &'a I) -> Self {
        Self { config, references, index }
    }

    /// Collects seed offsets per candidate reference id (spec §4.G step 1).
    fn collect_candidates(&self, read: &[u8]) -> HashMap<i32, Vec<i64>, RandomState> {
        let k = self.config.piece_size;
        let mut candidates: HashMap<i32, Vec<i64>, RandomState> = HashMap::with_hasher(RandomState::default());

        for p in seed_positions(read.len(), k, self.config.cut_count) {
            let window = &read[p..p + k];
            if n_count(window) > 2 {
                continue;
            }

            let mut hits = self.index.exact_find(window);
            if hits.is_empty() && !self.config.fast_map {
                hits = self.index.one_mismatch_find(window);
            }

            for (seq_id, start) in hits {
                let offset = i64::from(start) - p as i64;
                candidates.entry(seq_id).or_default().push(offset);
            }
        }

        candidates
    }

    /// Clusters sorted offsets into maximal runs within `max_gap_size` of
    /// each other (spec §4.G step 2), discarding clusters with fewer than two
    /// seeds.
    fn cluster_offsets(&self, mut offsets: Vec<i64>, read_len: usize) -> Vec<(i64, i64)> {
        offsets.sort_unstable();
        let max_gap = ((read_len as f64) * self.config.max_gap_ratio).floor() as i64;

        let mut clusters = Vec::new();
        let mut start = 0;
        while start < offsets.len() {
            let mut end = start;
            while end + 1 < offsets.len() && offsets[end + 1] - offsets[start] <= max_gap {
                end += 1;
            }
            if end - start + 1 >= 2 {
                clusters.push((offsets[start], offsets[end]));
            }
            start = end + 1;
        }
        clusters
    }

    /// Aligns one oriented read against every reference, returning the
    /// accepted records (spec §4.G steps 2-4). `scratch` is reused across
    /// calls by the owning worker.
    fn align_oriented(&self, read: &[u8], direction: Direction, scratch: &mut Scratch) -> Vec<AlignmentRecord> {
        let candidates = self.collect_candidates(read);
        let mut records = Vec::new();

        for (seq_id, offsets) in candidates {
            let Some(entry) = self.references.get(seq_id) else { continue };
            let reference = entry.sequence.bytes();

            for (offset_i, offset_r) in self.cluster_offsets(offsets, read.len()) {
                let delta = offset_r - offset_i;

                let result = if delta == 0 {
                    dp::colocated_align(read, reference, offset_i, &self.config)
                } else {
                    dp::banded_align(read, reference, offset_i, delta, &self.config, scratch)
                };

                if let Some(result) = result {
                    records.push(AlignmentRecord {
                        ref_name: entry.sequence.name.clone(),
                        direction,
                        read_start: result.read_start,
                        ref_start: result.ref_start,
                        score: clip_score(result.quality, self.config.min_quality),
                        ops: result.ops,
                    });
                }
            }
        }

        records
    }

    /// Aligns a read in both orientations (if `try_reverse` is set),
    /// returning every accepted record across both. Reads shorter than
    /// `piece_size` are skipped entirely, per spec §7.
    pub fn align_read(&self, read: &[u8], try_reverse: bool, scratch: &mut Scratch) -> Vec<AlignmentRecord> {
        if read.len() < self.config.piece_size {
            return Vec::new();
        }

        let mut records = self.align_oriented(read, Direction::Forward, scratch);

        if try_reverse {
            let rc = reverse_complement(read);
            records.extend(self.align_oriented(&rc, Direction::ReverseComplement, scratch));
        }

        records
    }
}

/// Builds the reference k-mer index once, up front (spec §4.F: the engine
/// uses only the arena variant, constructed at startup and read-only during
/// alignment).
pub fn build_reference_index(
    references: &ReferenceTable, params: crate::sap::kmer_index::KmerParams,
) -> crate::sap::kmer_index::ArenaKmerIndex {
    use crate::sap::kmer_index::ArenaKmerIndex;

    let mut index = ArenaKmerIndex::with_capacity(params, references.total_bases() as usize);

    for (_, entry) in references.iter() {
        let bytes = entry.sequence.bytes();
        if bytes.len() < params.k {
            continue;
        }
        for start in 0..=(bytes.len() - params.k) {
            let window = &bytes[start..start + params.k];
            index.insert(entry.sequence.id(), start as i32, pack_kmer(window));
        }
    }

    index
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::sap::sequence::ReferenceSequence;

    fn make_index_and_refs(seq: &[u8]) -> (ReferenceTable, crate::sap::kmer_index::ArenaKmerIndex) {
        let mut refs = ReferenceTable::new();
        refs.insert(ReferenceSequence::new("ref1".into(), seq.to_vec())).unwrap();
        let params = crate::sap::kmer_index::KmerParams { k: 15, bin_bits: 16 };
        let index = build_reference_index(&refs, params);
        (refs, index)
    }

    #[test]
    fn exact_read_maps_with_full_score() {
        let seq = b"acgtacgtacgtacgt";
        let (refs, index) = make_index_and_refs(seq);
        let aligner = Aligner::new(AlignerConfig::default(), &refs, &index);
        let mut scratch = Scratch::default();

        let records = aligner.align_read(seq, false, &mut scratch);
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.direction, Direction::Forward);
        assert_eq!(record.read_start, 0);
        assert_eq!(record.ref_start, 0);
        assert!((record.score - 1.0).abs() < 1e-9);
        assert!(record.ops.0.iter().all(|op| matches!(op, record::Op::Match)));
    }

    #[test]
    fn short_read_is_unmapped() {
        let seq = b"acgtacgtacgtacgt";
        let (refs, index) = make_index_and_refs(seq);
        let aligner = Aligner::new(AlignerConfig::default(), &refs, &index);
        let mut scratch = Scratch::default();

        let records = aligner.align_read(b"acgt", false, &mut scratch);
        assert!(records.is_empty());
    }

    #[test]
    fn reverse_complement_read_is_reported_as_r() {
        let seq = b"acgtacgtacgtacgtacgtacgt".to_vec();
        let (refs, index) = make_index_and_refs(&seq);
        let aligner = Aligner::new(AlignerConfig::default(), &refs, &index);
        let mut scratch = Scratch::default();

        let rc = reverse_complement(&seq);
        let records = aligner.align_read(&rc, true, &mut scratch);
        assert!(records.iter().any(|r| r.direction == Direction::ReverseComplement));
    }
}
