//! Builder-style configuration structs (§10).
//!
//! Each config separates "describe what you want" (chainable `with_*`
//! setters on a plain data struct) from "do the expensive work"
//! (a terminal `build()`/constructor that validates and constructs the
//! real object), mirroring the teacher's `FmIndexConfig`.

use crate::error::{Result, SeedCoreError};

/// Configuration for [`crate::index::build`] (Component D).
#[derive(Debug, Clone)]
pub struct IndexBuildConfig {
    pub(crate) word_length: u32,
    pub(crate) word_jump: u32,
    pub(crate) word_ambiguity: u32,
    pub(crate) saturate_threshold: u64,
    pub(crate) memory_limit_bytes: u64,
    pub(crate) translate: bool,
}

impl IndexBuildConfig {
    /// `word_length` has no safe default (0 is meaningless), so it is a
    /// required constructor argument rather than a defaulted field.
    pub fn new(word_length: u32) -> Self {
        IndexBuildConfig {
            word_length,
            word_jump: 1,
            word_ambiguity: 1,
            saturate_threshold: 0,
            memory_limit_bytes: 1 << 30,
            translate: false,
        }
    }

    pub fn with_word_jump(mut self, jump: u32) -> Self {
        self.word_jump = jump;
        self
    }

    pub fn with_word_ambiguity(mut self, ambiguity: u32) -> Self {
        self.word_ambiguity = ambiguity;
        self
    }

    pub fn with_saturate_threshold(mut self, threshold: u64) -> Self {
        self.saturate_threshold = threshold;
        self
    }

    pub fn with_memory_limit_bytes(mut self, limit: u64) -> Self {
        self.memory_limit_bytes = limit;
        self
    }

    pub fn with_translate(mut self, translate: bool) -> Self {
        self.translate = translate;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.word_length == 0 {
            return Err(SeedCoreError::ModeConflict {
                detail: "word_length must be at least 1".into(),
            });
        }
        if self.word_jump == 0 {
            return Err(SeedCoreError::ModeConflict {
                detail: "word_jump must be at least 1".into(),
            });
        }
        Ok(())
    }
}

/// Alignment mode for HSP extension and scoring (§4.G).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    DnaVsDna,
    ProteinVsProtein,
    ProteinVsDnaTranslated,
    DnaVsProteinTranslated,
    CodonVsCodon,
}

impl MatchMode {
    /// Query/target advance stride in residues per match step.
    pub fn strides(self) -> (u32, u32) {
        match self {
            MatchMode::DnaVsDna | MatchMode::ProteinVsProtein => (1, 1),
            MatchMode::ProteinVsDnaTranslated => (1, 3),
            MatchMode::DnaVsProteinTranslated => (3, 1),
            MatchMode::CodonVsCodon => (3, 3),
        }
    }
}

/// Thresholds and limits for one HSP-builder mode (§4.G).
#[derive(Debug, Clone)]
pub struct HspParam {
    pub(crate) mode: MatchMode,
    pub(crate) hsp_threshold: i32,
    pub(crate) hsp_dropoff: i32,
    pub(crate) word_limit: u32,
}

impl HspParam {
    pub fn new(mode: MatchMode, hsp_threshold: i32, hsp_dropoff: i32) -> Self {
        HspParam {
            mode,
            hsp_threshold,
            hsp_dropoff,
            word_limit: u32::MAX,
        }
    }

    pub fn with_word_limit(mut self, limit: u32) -> Self {
        self.word_limit = limit;
        self
    }

    pub fn mode(&self) -> MatchMode {
        self.mode
    }
}

/// Parameters for the geneseed refinement loop (§4.H).
#[derive(Debug, Clone)]
pub struct GeneseedConfig {
    pub(crate) geneseed_threshold: i32,
    pub(crate) seed_repeat: u32,
    pub(crate) max_query_span: u64,
    pub(crate) max_target_span: u64,
}

impl GeneseedConfig {
    pub fn new(geneseed_threshold: i32, max_query_span: u64, max_target_span: u64) -> Self {
        GeneseedConfig {
            geneseed_threshold,
            seed_repeat: 1,
            max_query_span,
            max_target_span,
        }
    }

    pub fn with_seed_repeat(mut self, repeat: u32) -> Self {
        self.seed_repeat = repeat;
        self
    }
}

/// Seeder coordinator resource limits (§4.I).
#[derive(Debug, Clone)]
pub struct SeederConfig {
    pub(crate) memory_ceiling_bytes: u64,
    pub(crate) neighborhood_threshold: Option<i32>,
    pub(crate) per_target_saturation: Option<u64>,
}

impl Default for SeederConfig {
    fn default() -> Self {
        SeederConfig {
            memory_ceiling_bytes: 1 << 32,
            neighborhood_threshold: None,
            per_target_saturation: None,
        }
    }
}

impl SeederConfig {
    pub fn with_memory_ceiling_bytes(mut self, ceiling: u64) -> Self {
        self.memory_ceiling_bytes = ceiling;
        self
    }

    pub fn with_neighborhood_threshold(mut self, threshold: i32) -> Self {
        self.neighborhood_threshold = Some(threshold);
        self
    }

    /// Per-target dynamic saturation (§4.I, §11): a word observed more
    /// than this many times within a single target's scan is ignored
    /// for the remainder of that target only, distinct from the
    /// index-time desaturation applied once at build time.
    pub fn with_per_target_saturation(mut self, threshold: u64) -> Self {
        self.per_target_saturation = Some(threshold);
        self
    }
}
