//! Per-base evidence accumulator (spec component D), one per reference
//! sequence of length `L`.
//!
//! Updates are protected by a coarse-grain lock per 64-position stripe (spec
//! §3/§5/§9): a spinlock built on an atomic flag, not a full mutex, since a
//! single update only ever touches one reference position and holds its
//! stripe for a handful of instructions.

use std::cell::UnsafeCell;
use std::hint;
use std::sync::atomic::{AtomicBool, Ordering};

/// Positions per stripe lock (spec §3).
const STRIPE_WIDTH: usize = 64;

/// One recorded insertion at a reference position: the inserted bases, their
/// length (always `bytes.len()`), and an accumulated log-likelihood score.
#[derive(Debug, Clone)]
pub struct InsertionRecord {
    pub bytes: Vec<u8>,
    pub score: f64,
}

impl InsertionRecord {
    #[inline]
    pub fn length(&self) -> usize {
        self.bytes.len()
    }
}

/// Per-position accumulated evidence for one reference sequence.
///
/// `matchCount`/`matchScore` are indexed `[base_code][position]`, where
/// `base_code` is the 2-bit A/T/G/C code from
/// [`crate::sap::sequence::base_to_code`].
pub struct EvidenceVector {
    len: usize,
    match_count: UnsafeCell<Vec<[u32; 4]>>,
    match_score: UnsafeCell<Vec<[f64; 4]>>,
    delete_count: UnsafeCell<Vec<u32>>,
    delete_score: UnsafeCell<Vec<f64>>,
    total_q: UnsafeCell<Vec<f64>>,
    insertions: UnsafeCell<Vec<Vec<InsertionRecord>>>,
    stripe_lock: Vec<AtomicBool>,
}

// SAFETY: all mutable access to the `UnsafeCell` fields goes through
// `with_stripe`, which holds the atomic flag for the stripe covering the
// accessed position for the duration of the closure. Distinct stripes never
// overlap, so concurrent access to distinct positions never races; concurrent
// access to the same stripe is serialized by the flag.
unsafe impl Sync for EvidenceVector {}

impl EvidenceVector {
    /// Creates a zeroed evidence vector for a reference sequence of length
    /// `len`.
    pub fn new(len: usize) -> Self {
        let stripes = len.div_ceil(STRIPE_WIDTH).max(1);
        Self {
            len,
            match_count: UnsafeCell::new(vec![[0u32; 4]; len]),
            match_score: UnsafeCell::new(vec![[0.0f64; 4]; len]),
            delete_count: UnsafeCell::new(vec![0u32; len]),
            delete_score: UnsafeCell::new(vec![0.0f64; len]),
            total_q: UnsafeCell::new(vec![0.0f64; len]),
            insertions: UnsafeCell::new((0..len).map(|_| Vec::new()).collect()),
            stripe_lock: (0..stripes).map(|_| AtomicBool::new(false)).collect(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Runs `f` with exclusive access to the stripe covering `pos`, spinning
    /// on the atomic flag until it is acquired.
    fn with_stripe<R>(&self, pos: usize, f: impl FnOnce() -> R) -> R {
        let stripe = pos / STRIPE_WIDTH;
        let lock = &self.stripe_lock[stripe];

        while lock.compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed).is_err() {
            hint::spin_loop();
        }

        let result = f();
        lock.store(false, Ordering::Release);
        result
    }

    /// Records a match/substitution event: increments `matchCount[base][pos]`
    /// by one, adds `score_delta` to `matchScore[base][pos]`, and adds
    /// `q_delta` to `totalQ[pos]` (spec §4.I step 3).
    pub fn update_match(&self, pos: usize, base_code: u8, score_delta: f64, q_delta: f64) {
        debug_assert!(pos < self.len);
        let base = usize::from(base_code & 0b11);

        self.with_stripe(pos, || {
            // SAFETY: the stripe covering `pos` is held by `with_stripe`.
            unsafe {
                (*self.match_count.get())[pos][base] += 1;
                (*self.match_score.get())[pos][base] += score_delta;
                (*self.total_q.get())[pos] += q_delta;
            }
        });
    }

    /// Records a deletion event at `pos` (spec §4.I step 3).
    pub fn update_deletion(&self, pos: usize, score_delta: f64, q_delta: f64) {
        debug_assert!(pos < self.len);

        self.with_stripe(pos, || {
            // SAFETY: the stripe covering `pos` is held by `with_stripe`.
            unsafe {
                (*self.delete_count.get())[pos] += 1;
                (*self.delete_score.get())[pos] += score_delta;
                (*self.total_q.get())[pos] += q_delta;
            }
        });
    }

    /// Records an insertion immediately after `pos` (spec §4.I step 3).
    pub fn insert(&self, pos: usize, bytes: Vec<u8>, score: f64) {
        debug_assert!(pos < self.len);

        self.with_stripe(pos, || {
            // SAFETY: the stripe covering `pos` is held by `with_stripe`.
            unsafe {
                (*self.insertions.get())[pos].push(InsertionRecord { bytes, score });
            }
        });
    }

    /// Reads the four match counts at `pos` (A, T, G, C order).
    pub fn match_count(&self, pos: usize) -> [u32; 4] {
        self.with_stripe(pos, || unsafe { (*self.match_count.get())[pos] })
    }

    /// Reads the four match scores at `pos` (A, T, G, C order).
    pub fn match_score(&self, pos: usize) -> [f64; 4] {
        self.with_stripe(pos, || unsafe { (*self.match_score.get())[pos] })
    }

    pub fn delete_count(&self, pos: usize) -> u32 {
        self.with_stripe(pos, || unsafe { (*self.delete_count.get())[pos] })
    }

    pub fn delete_score(&self, pos: usize) -> f64 {
        self.with_stripe(pos, || unsafe { (*self.delete_score.get())[pos] })
    }

    pub fn total_q(&self, pos: usize) -> f64 {
        self.with_stripe(pos, || unsafe { (*self.total_q.get())[pos] })
    }

    /// Returns a clone of the insertion records at `pos`.
    pub fn insertions(&self, pos: usize) -> Vec<InsertionRecord> {
        self.with_stripe(pos, || unsafe { (*self.insertions.get())[pos].clone() })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn match_updates_accumulate_monotonically() {
        let ev = EvidenceVector::new(4);
        ev.update_match(2, 0, 1.5, 0.1);
        ev.update_match(2, 0, 2.0, 0.2);
        assert_eq!(ev.match_count(2)[0], 2);
        assert!((ev.match_score(2)[0] - 3.5).abs() < 1e-9);
        assert!((ev.total_q(2) - 0.3).abs() < 1e-9);
    }

    #[test]
    fn concurrent_updates_to_distinct_positions_do_not_lose_counts() {
        let ev = Arc::new(EvidenceVector::new(256));
        let mut handles = Vec::new();

        for t in 0..8 {
            let ev = Arc::clone(&ev);
            handles.push(thread::spawn(move || {
                for i in 0..100 {
                    let pos = (t * 31 + i) % 256;
                    ev.update_match(pos, 1, 1.0, 1.0);
                }
            }));
        }

        for h in handles {
            h.join().unwrap();
        }

        let total: u32 = (0..256).map(|p| ev.match_count(p)[1]).sum();
        assert_eq!(total, 800);
    }

    #[test]
    fn insertions_accumulate_in_order() {
        let ev = EvidenceVector::new(4);
        ev.insert(1, b"a".to_vec(), 0.5);
        ev.insert(1, b"aa".to_vec(), 0.25);
        let recs = ev.insertions(1);
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].length(), 1);
        assert_eq!(recs[1].length(), 2);
    }
}
