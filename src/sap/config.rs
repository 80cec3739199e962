//! Tuning constants for the aligner, evidence updater, and variant caller,
//! gathered into configuration records passed into the engine's constructors
//! (design note 9: "global tuning constants ... should migrate to a
//! configuration record").

/// Prior probability of heterozygosity (spec §4.J).
pub const PR: f64 = 1e-4;

/// Tuning knobs for the banded seeded aligner (spec §4.G).
#[derive(Debug, Clone, Copy)]
pub struct AlignerConfig {
    pub match_bonus: i32,
    pub gap_penalty: i32,
    pub min_quality: f64,
    pub max_gap_ratio: f64,
    pub cut_count: usize,
    pub piece_size: usize,
    pub bin_bits: u32,
    /// Disables 1-mismatch seed lookup when exact lookup misses.
    pub fast_map: bool,
}

impl Default for AlignerConfig {
    fn default() -> Self {
        Self {
            match_bonus: 20,
            gap_penalty: 13,
            min_quality: 0.90,
            max_gap_ratio: 0.08,
            cut_count: 7,
            piece_size: 15,
            bin_bits: 24,
            fast_map: false,
        }
    }
}

/// Tuning knobs for the evidence updater (spec §4.I).
#[derive(Debug, Clone, Copy)]
pub struct UpdaterConfig {
    /// Minimum average per-read quality (in score-space, i.e. `1 - error
    /// probability`) for a read's records to contribute evidence.
    pub min_read_quality: f64,
    /// Only records scoring at least `score_fraction * max_score` within a
    /// read's batch contribute evidence.
    pub score_fraction: f64,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            min_read_quality: 0.30,
            score_fraction: 0.9,
        }
    }
}

/// Tuning knobs for the variant caller (spec §4.J).
#[derive(Debug, Clone, Copy)]
pub struct CallerConfig {
    pub min_match_count: u32,
    /// Optional cap on pileup depth for SNP calling (supplemented feature,
    /// see `SPEC_FULL.md`); `None` means unbounded, matching spec.md exactly.
    pub max_match_count: Option<u32>,
}

impl Default for CallerConfig {
    fn default() -> Self {
        Self {
            min_match_count: 6,
            max_match_count: None,
        }
    }
}
