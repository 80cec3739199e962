//! The alignment-and-evidence engine (spec.md components A-J): a seed index
//! over a reference table, a banded seeded aligner, a worker pool that
//! streams reads through it, a per-base evidence accumulator, and a variant
//! caller built on top of the accumulated evidence.

pub mod aligner;
pub mod buffer;
pub mod config;
pub mod evidence;
pub mod evidence_updater;
pub mod kmer_index;
pub mod pool;
pub mod reference_table;
pub mod sequence;
pub mod stream_io;
pub mod variant_caller;
