//! k-mer hash index (spec component F): maps 2-bit-packed k-mers to seed hits
//! `(sequence-id, start-position)`, with exact and 1-mismatch lookup.
//!
//! Two concrete variants implement [`KmerIndex`] (design note 9):
//! [`ArenaKmerIndex`] is a dense, build-once structure with no removal,
//! sized to the reference's total base count; [`DynamicKmerIndex`] supports
//! `insert`/`remove` for dynamic reference sets. The engine only ever
//! constructs the arena variant (it builds the reference index once, up
//! front, and never mutates it during alignment).

use crate::sap::sequence::base_to_code;

/// One seed hit: a reference id and the reference position the k-mer starts
/// at.
pub type SeedHit = (i32, i32);

/// Tuning parameters for a k-mer index (spec §4.F).
#[derive(Debug, Clone, Copy)]
pub struct KmerParams {
    /// k-mer ("piece") length, 10-20.
    pub k: usize,
    /// `log2` of the bucket count, 20-32.
    pub bin_bits: u32,
}

impl KmerParams {
    #[inline]
    pub fn bucket_count(&self) -> usize {
        1usize << self.bin_bits
    }

    #[inline]
    fn bucket_mask(&self) -> u64 {
        (self.bucket_count() as u64) - 1
    }

    #[inline]
    pub fn bucket_of(&self, hash_value: u64) -> usize {
        (hash_value & self.bucket_mask()) as usize
    }
}

/// Packs `window` (length `k`) into its 2-bit hash value, translating `n` to
/// `a` (spec §4.F).
pub fn pack_kmer(window: &[u8]) -> u64 {
    window.iter().fold(0u64, |acc, &b| (acc << 2) | u64::from(base_to_code(b)))
}

/// Perturbs `hash_value` (a packed k-mer of length `k`) by replacing the base
/// at 0-indexed position `pos` (from the start of the window) with
/// `alt_code`.
fn perturb(hash_value: u64, k: usize, pos: usize, _orig_code: u8, alt_code: u8) -> u64 {
    let shift = 2 * (k - 1 - pos);
    let cleared = hash_value & !(0b11u64 << shift);
    cleared | (u64::from(alt_code) << shift)
}

/// A k-mer hash index supporting exact and 1-mismatch lookup (spec §4.F).
pub trait KmerIndex {
    /// The k-mer length this index was built for.
    fn k(&self) -> usize;

    /// Returns every seed hit whose stored hash value equals `hash_value`
    /// exactly (bucket collisions are resolved by comparing the full hash).
    fn exact_find_hash(&self, hash_value: u64) -> Vec<SeedHit>;

    /// Looks up the k-mer `query` (length `k()`) exactly.
    fn exact_find(&self, query: &[u8]) -> Vec<SeedHit> {
        self.exact_find_hash(pack_kmer(query))
    }

    /// Returns every seed hit whose k-mer differs from `query` in exactly one
    /// position, by perturbing each of the `k` positions through the 3
    /// alternative bases and calling [`KmerIndex::exact_find_hash`]. The
    /// original base at each position is skipped, since exact matches are
    /// already covered by [`KmerIndex::exact_find`].
    fn one_mismatch_find(&self, query: &[u8]) -> Vec<SeedHit> {
        let k = self.k();
        debug_assert_eq!(query.len(), k);
        let hash_value = pack_kmer(query);
        let mut out = Vec::new();

        for pos in 0..k {
            let orig_code = base_to_code(query[pos]);
            for alt_code in 0u8..4 {
                if alt_code == orig_code {
                    continue;
                }
                let perturbed = perturb(hash_value, k, pos, orig_code, alt_code);
                out.extend(self.exact_find_hash(perturbed));
            }
        }

        out
    }
}

struct StoredEntry {
    hash_value: u64,
    seq_id: i32,
    start: i32,
}

/// Build-once, dense arena-backed [`KmerIndex`]. Entries are stored
/// contiguously; bucket chains are linked by array index rather than
/// pointer, and there is no `remove`. Used for the reference index, which is
/// built once at startup and never mutated during alignment (spec §4.F).
pub struct ArenaKmerIndex {
    params: KmerParams,
    buckets: Vec<i32>,
    entries: Vec<StoredEntry>,
    next: Vec<i32>,
}

const NO_ENTRY: i32 = -1;

impl ArenaKmerIndex {
    /// Creates an empty index, preallocating `expected_entries` capacity
    /// (spec §4.F: "sized to the expected count, equal to `totalBases`").
    pub fn with_capacity(params: KmerParams, expected_entries: usize) -> Self {
        Self {
            buckets: vec![NO_ENTRY; params.bucket_count()],
            entries: Vec::with_capacity(expected_entries),
            next: Vec::with_capacity(expected_entries),
            params,
        }
    }

    /// Appends a new entry `(hash_value, seq_id, start)` to its bucket. The
    /// buffered/arena variant performs no duplicate check (spec §9: "do not
    /// rely on uniqueness of `(id, start)`").
    pub fn insert(&mut self, seq_id: i32, start: i32, hash_value: u64) {
        let bucket = self.params.bucket_of(hash_value);
        let index = self.entries.len() as i32;

        self.entries.push(StoredEntry { hash_value, seq_id, start });
        self.next.push(self.buckets[bucket]);
        self.buckets[bucket] = index;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KmerIndex for ArenaKmerIndex {
    fn k(&self) -> usize {
        self.params.k
    }

    fn exact_find_hash(&self, hash_value: u64) -> Vec<SeedHit> {
        let mut out = Vec::new();
        let mut cursor = self.buckets[self.params.bucket_of(hash_value)];

        while cursor != NO_ENTRY {
            let entry = &self.entries[cursor as usize];
            if entry.hash_value == hash_value {
                out.push((entry.seq_id, entry.start));
            }
            cursor = self.next[cursor as usize];
        }

        out
    }
}

/// Insert/remove-capable [`KmerIndex`] for dynamic reference sets (design
/// note 9). The engine does not use this variant; it exists for reference
/// sets that are mutated after construction (insert/remove of whole
/// sequences, per spec §1's scope note).
#[derive(Default)]
pub struct DynamicKmerIndex {
    params_k: usize,
    bin_bits: u32,
    buckets: Vec<Vec<(u64, i32, i32)>>,
}

impl DynamicKmerIndex {
    pub fn new(params: KmerParams) -> Self {
        Self {
            params_k: params.k,
            bin_bits: params.bin_bits,
            buckets: vec![Vec::new(); params.bucket_count()],
        }
    }

    fn bucket_of(&self, hash_value: u64) -> usize {
        (hash_value & ((1u64 << self.bin_bits) - 1)) as usize
    }

    /// Inserts `(seq_id, start)`, rejecting an exact `(id, start)` duplicate
    /// already present for the same hash (spec §4.F: the per-entry variant
    /// rejects duplicates).
    pub fn insert(&mut self, seq_id: i32, start: i32, hash_value: u64) -> bool {
        let bucket = self.bucket_of(hash_value);
        let exists = self.buckets[bucket]
            .iter()
            .any(|&(h, id, s)| h == hash_value && id == seq_id && s == start);

        if exists {
            return false;
        }

        self.buckets[bucket].push((hash_value, seq_id, start));
        true
    }

    /// Removes the first bucket entry matching `(seq_id, start)`.
    pub fn remove(&mut self, seq_id: i32, start: i32, hash_value: u64) -> bool {
        let bucket = self.bucket_of(hash_value);
        let bucket_entries = &mut self.buckets[bucket];

        if let Some(pos) = bucket_entries.iter().position(|&(_, id, s)| id == seq_id && s == start) {
            bucket_entries.remove(pos);
            true
        } else {
            false
        }
    }
}

impl KmerIndex for DynamicKmerIndex {
    fn k(&self) -> usize {
        self.params_k
    }

    fn exact_find_hash(&self, hash_value: u64) -> Vec<SeedHit> {
        self.buckets[self.bucket_of(hash_value)]
            .iter()
            .filter(|&&(h, ..)| h == hash_value)
            .map(|&(_, id, start)| (id, start))
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn params() -> KmerParams {
        KmerParams { k: 6, bin_bits: 8 }
    }

    #[test]
    fn exact_find_returns_inserted_entry() {
        let mut index = ArenaKmerIndex::with_capacity(params(), 4);
        let window = b"acgtac";
        index.insert(1, 10, pack_kmer(window));

        let hits = index.exact_find(window);
        assert_eq!(hits, vec![(1, 10)]);
    }

    #[test]
    fn exact_find_ignores_bucket_collisions_with_different_hash() {
        let p = KmerParams { k: 4, bin_bits: 1 };
        let mut index = ArenaKmerIndex::with_capacity(p, 4);
        index.insert(1, 0, pack_kmer(b"aaaa"));
        index.insert(2, 0, pack_kmer(b"cccc"));

        let hits = index.exact_find(b"aaaa");
        assert_eq!(hits, vec![(1, 0)]);
    }

    #[test]
    fn one_mismatch_find_covers_every_single_substitution() {
        let mut index = ArenaKmerIndex::with_capacity(params(), 16);
        let bases = [b'a', b't', b'g', b'c'];

        // Insert every k-mer one substitution away from "acgtac" at each position.
        let origin = b"acgtac".to_vec();
        let mut id = 0;
        for pos in 0..origin.len() {
            for &base in &bases {
                if base == origin[pos] {
                    continue;
                }
                let mut variant = origin.clone();
                variant[pos] = base;
                index.insert(id, pos as i32, pack_kmer(&variant));
                id += 1;
            }
        }

        let hits = index.one_mismatch_find(&origin);
        assert_eq!(hits.len(), origin.len() * 3);
    }

    #[test]
    fn one_mismatch_find_does_not_return_the_exact_match() {
        let mut index = ArenaKmerIndex::with_capacity(params(), 4);
        index.insert(1, 0, pack_kmer(b"acgtac"));

        let hits = index.one_mismatch_find(b"acgtac");
        assert!(hits.is_empty());
    }

    #[test]
    fn dynamic_index_supports_remove() {
        let mut index = DynamicKmerIndex::new(params());
        let hash = pack_kmer(b"acgtac");
        assert!(index.insert(5, 2, hash));
        assert!(!index.insert(5, 2, hash), "duplicate (id, start) must be rejected");
        assert!(index.remove(5, 2, hash));
        assert!(index.exact_find_hash(hash).is_empty());
    }
}
