//! Alignment-record parser & evidence updater (spec component I).
//!
//! Replays read-major batches emitted by the aligner (spec §4.G's output
//! framing) into each reference's [`EvidenceVector`]. Quality-byte handling
//! (clamp, Phred-33 offset) follows the same ASCII-arithmetic idiom
//! `qc/fastq.rs` uses for its own per-base quality pass.

use crate::sap::{
    aligner::record::{AlignmentRecord, Direction, Op},
    config::UpdaterConfig,
    reference_table::ReferenceTable,
    sequence::{base_to_code, complement_base},
    stream_io::ReadRecord,
};

/// Phred quality values above this are folded down to it before scoring
/// (spec §4.I step 1: "qualities are clamped to 93").
const MAX_PHRED: f64 = 93.0;

/// Converts one ASCII Phred+33 quality byte to a clamped Phred score.
#[inline]
fn phred(byte: u8) -> f64 {
    (f64::from(byte.saturating_sub(33))).min(MAX_PHRED)
}

/// The per-base "it matched" probability at quality `q` (spec GLOSSARY:
/// "base-error probability = 10^(-q/10)").
#[inline]
fn score_space(q: f64) -> f64 {
    1.0 - 10f64.powf(-q / 10.0)
}

/// `log(1 - 10^(-q/10))`, spec §4.I step 3's `KM1`.
#[inline]
fn km1(q: f64) -> f64 {
    score_space(q).ln()
}

/// `log(10^(-q/10))`, spec §4.I step 3's `KM2`.
#[inline]
fn km2(q: f64) -> f64 {
    -q / 10.0 * std::f64::consts::LN_10
}

/// The base actually consumed by the alignment at read-orientation position
/// `s`. For a forward record this is `dna[s]`; for a reverse-complement
/// record the stored `dna` is always in the read's original forward
/// orientation (open question, resolved in `DESIGN.md`), so the aligned base
/// is the complement of the mirrored position.
#[inline]
fn aligned_base(dna: &[u8], direction: Direction, s: usize) -> u8 {
    match direction {
        Direction::Forward => dna[s],
        Direction::ReverseComplement => complement_base(dna[dna.len() - 1 - s]),
    }
}

/// The quality byte at read-orientation position `s`, mirrored for reverse
/// direction (spec §4.I step 4: "the per-base quality indexed is
/// `quality[L - s - 1]`").
#[inline]
fn aligned_quality(quality: &[u8], direction: Direction, s: usize) -> u8 {
    match direction {
        Direction::Forward => quality[s],
        Direction::ReverseComplement => quality[quality.len() - 1 - s],
    }
}

/// Average per-base quality of `quality`, in score-space (spec §4.I step 1).
fn average_quality_score(quality: &[u8]) -> f64 {
    if quality.is_empty() {
        return 0.0;
    }
    let sum: f64 = quality.iter().map(|&b| score_space(phred(b))).sum();
    sum / quality.len() as f64
}

/// Replays one read's batch of alignment records into `references`' evidence
/// vectors (spec §4.I steps 1-4). Returns `true` if the batch contributed
/// evidence (i.e. was not rejected on average read quality).
pub fn update_evidence(read: &ReadRecord, records: &[AlignmentRecord], references: &ReferenceTable, config: &UpdaterConfig) -> bool {
    if average_quality_score(&read.quality) < config.min_read_quality {
        return false;
    }

    if records.is_empty() {
        return true;
    }
    let max_score = records.iter().map(|r| r.score).fold(f64::NEG_INFINITY, f64::max);

    let threshold = config.score_fraction * max_score;

    for record in records.iter().filter(|r| r.score >= threshold) {
        let Some(ref_id) = references.id_of(&record.ref_name) else { continue };
        let Some(entry) = references.get(ref_id) else { continue };
        let evidence = &entry.evidence;

        let mut s = record.read_start;
        let mut r = record.ref_start;
        let ops = &record.ops.0;
        let mut i = 0;

        while i < ops.len() {
            match ops[i] {
                Op::Match | Op::Subst => {
                    let q = phred(aligned_quality(&read.quality, record.direction, s));
                    let base = aligned_base(&read.dna, record.direction, s);
                    evidence.update_match(r, base_to_code(base), km1(q) - km2(q), km2(q));
                    s += 1;
                    r += 1;
                    i += 1;
                }
                Op::Del => {
                    let q = phred(aligned_quality(&read.quality, record.direction, s));
                    evidence.update_deletion(r, km1(q) - km2(q), km2(q));
                    r += 1;
                    i += 1;
                }
                Op::Ins => {
                    let run_start = i;
                    while i < ops.len() && ops[i] == Op::Ins {
                        i += 1;
                    }
                    let run_len = i - run_start;

                    let bytes: Vec<u8> = (0..run_len).map(|k| aligned_base(&read.dna, record.direction, s + k)).collect();
                    let avg_q: f64 = (0..run_len)
                        .map(|k| phred(aligned_quality(&read.quality, record.direction, s + k)))
                        .sum::<f64>()
                        / run_len as f64;

                    evidence.insert(r.saturating_sub(1), bytes, km1(avg_q));
                    s += run_len;
                }
            }
        }
    }

    true
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::sap::{aligner::record::OpString, sequence::ReferenceSequence};

    fn make_refs(seq: &[u8]) -> ReferenceTable {
        let mut refs = ReferenceTable::new();
        refs.insert(ReferenceSequence::new("ref1".into(), seq.to_vec())).unwrap();
        refs
    }

    #[test]
    fn low_quality_read_is_rejected_before_updating_evidence() {
        let refs = make_refs(b"acgt");
        let read = ReadRecord {
            dna: b"acgt".to_vec(),
            quality: vec![33; 4], // q=0 everywhere -> score-space 0
        };
        let record = AlignmentRecord {
            ref_name: "ref1".into(),
            direction: Direction::Forward,
            read_start: 0,
            ref_start: 0,
            score: 1.0,
            ops: "nnnn".parse::<OpString>().unwrap(),
        };

        let contributed = update_evidence(&read, &[record], &refs, &UpdaterConfig::default());
        assert!(!contributed);

        let id = refs.id_of("ref1").unwrap();
        assert_eq!(refs.get(id).unwrap().evidence.match_count(0), [0, 0, 0, 0]);
    }

    #[test]
    fn match_updates_land_at_the_correct_reference_position() {
        let refs = make_refs(b"acgt");
        let read = ReadRecord {
            dna: b"acgt".to_vec(),
            quality: vec![b'I'; 4], // q=40
        };
        let record = AlignmentRecord {
            ref_name: "ref1".into(),
            direction: Direction::Forward,
            read_start: 0,
            ref_start: 0,
            score: 1.0,
            ops: "nnnn".parse::<OpString>().unwrap(),
        };

        assert!(update_evidence(&read, &[record], &refs, &UpdaterConfig::default()));

        let id = refs.id_of("ref1").unwrap();
        let evidence = &refs.get(id).unwrap().evidence;
        assert_eq!(evidence.match_count(0)[base_to_code(b'a') as usize], 1);
        assert_eq!(evidence.match_count(3)[base_to_code(b't') as usize], 1);
    }

    #[test]
    fn reverse_complement_record_reads_bases_and_quality_mirrored() {
        let refs = make_refs(b"acgt");
        // Original (forward-orientation) read is the reverse complement of
        // "acgt", i.e. "acgt" itself reverse-complemented is "acgt" -> use a
        // clearer asymmetric example instead.
        let refs = make_refs(b"aaat");
        let read = ReadRecord {
            dna: b"attt".to_vec(), // rc("attt") = "aaat"
            quality: b"ABCD".to_vec(),
        };
        let record = AlignmentRecord {
            ref_name: "ref1".into(),
            direction: Direction::ReverseComplement,
            read_start: 0,
            ref_start: 0,
            score: 1.0,
            ops: "nnnn".parse::<OpString>().unwrap(),
        };

        assert!(update_evidence(&read, &[record], &refs, &UpdaterConfig::default()));
        let id = refs.id_of("ref1").unwrap();
        let evidence = &refs.get(id).unwrap().evidence;
        // rc base at position 0 is complement(dna[3]) = complement('t') = 'a'
        assert_eq!(evidence.match_count(0)[base_to_code(b'a') as usize], 1);
        // rc base at position 3 is complement(dna[0]) = complement('a') = 't'
        assert_eq!(evidence.match_count(3)[base_to_code(b't') as usize], 1);
    }

    #[test]
    fn insertion_run_is_recorded_once_at_preceding_position() {
        let refs = make_refs(b"acgt");
        let read = ReadRecord {
            dna: b"acxxgt".to_vec(),
            quality: b"IIIIII".to_vec(),
        };
        let record = AlignmentRecord {
            ref_name: "ref1".into(),
            direction: Direction::Forward,
            read_start: 0,
            ref_start: 0,
            score: 1.0,
            ops: "nniinn".parse::<OpString>().unwrap(),
        };

        assert!(update_evidence(&read, &[record], &refs, &UpdaterConfig::default()));
        let id = refs.id_of("ref1").unwrap();
        let evidence = &refs.get(id).unwrap().evidence;
        let insertions = evidence.insertions(1);
        assert_eq!(insertions.len(), 1);
        assert_eq!(insertions[0].bytes, b"xx");
    }
}
