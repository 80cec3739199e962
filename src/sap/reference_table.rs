//! Reference sequence table (spec component C): a keyed collection of
//! reference sequences with `totalBases` accounting, each carrying its own
//! evidence vector.

use crate::sap::{evidence::EvidenceVector, sequence::ReferenceSequence};
use foldhash::fast::RandomState;
use std::collections::HashMap;

/// One entry in the [`ReferenceTable`]: an immutable reference sequence
/// alongside the evidence vector accumulated against it.
pub struct ReferenceEntry {
    pub sequence: ReferenceSequence,
    pub evidence: EvidenceVector,
}

/// A mapping from reference id to [`ReferenceEntry`], with `totalBases`
/// tracked incrementally.
///
/// Populated once from the reference file, then treated as read-only during
/// alignment (spec.md §5): no lock is needed for lookups once construction
/// finishes.
#[derive(Default)]
pub struct ReferenceTable {
    by_id: HashMap<i32, ReferenceEntry, RandomState>,
    by_name: HashMap<String, i32, RandomState>,
    total_bases: u64,
}

impl ReferenceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `sequence`, allocating a zeroed evidence vector sized to its
    /// length. Returns an error if the name is already present (names must be
    /// unique per table, spec.md §3).
    pub fn insert(&mut self, sequence: ReferenceSequence) -> Result<i32, DuplicateNameError> {
        if self.by_name.contains_key(&sequence.name) {
            return Err(DuplicateNameError(sequence.name));
        }

        let id = sequence.id();
        let name = sequence.name.clone();
        let evidence = EvidenceVector::new(sequence.len());

        self.total_bases += sequence.len() as u64;
        self.by_name.insert(name, id);
        self.by_id.insert(id, ReferenceEntry { sequence, evidence });

        Ok(id)
    }

    /// Removes the reference with the given id, decrementing `totalBases`.
    pub fn remove(&mut self, id: i32) -> Option<ReferenceEntry> {
        let entry = self.by_id.remove(&id)?;
        self.by_name.remove(&entry.sequence.name);
        self.total_bases -= entry.sequence.len() as u64;
        Some(entry)
    }

    #[inline]
    pub fn get(&self, id: i32) -> Option<&ReferenceEntry> {
        self.by_id.get(&id)
    }

    #[inline]
    pub fn id_of(&self, name: &str) -> Option<i32> {
        self.by_name.get(name).copied()
    }

    #[inline]
    pub fn total_bases(&self) -> u64 {
        self.total_bases
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&i32, &ReferenceEntry)> {
        self.by_id.iter()
    }
}

/// Returned by [`ReferenceTable::insert`] when the reference name already
/// exists in the table.
#[derive(Debug)]
pub struct DuplicateNameError(pub String);

impl std::fmt::Display for DuplicateNameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "duplicate reference name: {}", self.0)
    }
}

impl std::error::Error for DuplicateNameError {}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn total_bases_tracks_insert_and_remove() {
        let mut table = ReferenceTable::new();
        let id1 = table.insert(ReferenceSequence::new("ref1".into(), b"acgtacgt".to_vec())).unwrap();
        let _id2 = table.insert(ReferenceSequence::new("ref2".into(), b"acgt".to_vec())).unwrap();
        assert_eq!(table.total_bases(), 12);

        table.remove(id1);
        assert_eq!(table.total_bases(), 4);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut table = ReferenceTable::new();
        table.insert(ReferenceSequence::new("ref1".into(), b"acgt".to_vec())).unwrap();
        let err = table.insert(ReferenceSequence::new("ref1".into(), b"gggg".to_vec()));
        assert!(err.is_err());
    }
}
