//! Component G: HSP builder.
//!
//! `HspSet` begins in a *seeding* state accepting `(query_pos,
//! target_pos)` diagonal seeds and moves to *finalised* exactly once,
//! via [`HspSet::finalise`], which performs ungapped extension with
//! dropoff trimming and diagonal deduplication.
//!
//! Scoring is intentionally abstracted behind a per-step closure rather
//! than hard-coded to one alignment mode: the caller (whoever knows
//! whether this is DNA-vs-DNA, protein-vs-protein, or one of the
//! translated/codon split modes from [`crate::config::MatchMode`])
//! supplies `score_at_step(seed_q, seed_t, step) -> Option<i32>`, where
//! `step = 0` is the seed position itself, positive steps extend
//! forward and negative steps extend backward, each by that mode's
//! stride. `None` signals the extension ran off a sequence end.

use crate::error::{Result, SeedCoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Seed {
    pub q: i64,
    pub t: i64,
}

/// A diagonal segment with its computed anchor (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hsp {
    pub q_start: i64,
    pub t_start: i64,
    pub length: u64,
    pub score: i32,
    pub cobs_q: i64,
    pub cobs_t: i64,
}

impl Hsp {
    pub fn diagonal(&self) -> i64 {
        self.q_start - self.t_start
    }

    pub fn q_end(&self) -> i64 {
        self.q_start + self.length as i64
    }
}

enum HspSetState {
    Seeding(Vec<Seed>),
    Finalised(Vec<Hsp>),
}

/// One `(query, target)` pair's HSPs, finalize-once (§3).
pub struct HspSet {
    state: HspSetState,
}

impl Default for HspSet {
    fn default() -> Self {
        Self::new()
    }
}

impl HspSet {
    pub fn new() -> Self {
        HspSet {
            state: HspSetState::Seeding(Vec::new()),
        }
    }

    pub fn seed_hsp(&mut self, q: i64, t: i64) -> Result<()> {
        match &mut self.state {
            HspSetState::Seeding(seeds) => {
                seeds.push(Seed { q, t });
                Ok(())
            }
            HspSetState::Finalised(_) => Err(SeedCoreError::ModeConflict {
                detail: "cannot seed an already-finalised HspSet".into(),
            }),
        }
    }

    /// Consumes seeds assumed sorted by query position (§4.G); sorting
    /// is not re-validated here, matching the source's trust-the-caller
    /// contract for this fast path.
    pub fn seed_all_qy_sorted(&mut self, seeds: impl IntoIterator<Item = (i64, i64)>) -> Result<()> {
        for (q, t) in seeds {
            self.seed_hsp(q, t)?;
        }
        Ok(())
    }

    pub fn is_finalised(&self) -> bool {
        matches!(self.state, HspSetState::Finalised(_))
    }

    /// Extends every seeded diagonal, trims by dropoff, filters by
    /// `hsp_threshold`, deduplicates overlapping same-diagonal HSPs to
    /// their higher-scoring representative, and rejects duplicate
    /// `(cobs_q, cobs_t)` anchors. Returns the finalised HSP slice.
    pub fn finalise(
        &mut self,
        hsp_threshold: i32,
        hsp_dropoff: i32,
        mut score_at_step: impl FnMut(i64, i64, i64) -> Option<i32>,
    ) -> Result<&[Hsp]> {
        let seeds = match &self.state {
            HspSetState::Seeding(seeds) => seeds.clone(),
            HspSetState::Finalised(_) => {
                return Err(SeedCoreError::ModeConflict {
                    detail: "HspSet already finalised".into(),
                })
            }
        };

        let mut candidates = Vec::new();
        for seed in seeds {
            if let Some(hsp) = extend_seed(seed, hsp_dropoff, &mut score_at_step) {
                if hsp.score >= hsp_threshold {
                    candidates.push(hsp);
                }
            }
        }

        let deduped = dedup_diagonals(candidates);
        self.state = HspSetState::Finalised(deduped);
        match &self.state {
            HspSetState::Finalised(hsps) => Ok(hsps),
            HspSetState::Seeding(_) => unreachable!(),
        }
    }

    pub fn hsps(&self) -> &[Hsp] {
        match &self.state {
            HspSetState::Finalised(hsps) => hsps,
            HspSetState::Seeding(_) => &[],
        }
    }
}

/// Extends one seed in both directions, trimming each side to its
/// best-ending position once the running score falls below `best -
/// hsp_dropoff` (§4.G steps 1-2), then locates `cobs` as the position of
/// maximum cumulative score across the merged, trimmed trace.
fn extend_seed(
    seed: Seed,
    hsp_dropoff: i32,
    score_at_step: &mut impl FnMut(i64, i64, i64) -> Option<i32>,
) -> Option<Hsp> {
    let forward_scores = extend_direction(seed, 1, hsp_dropoff, score_at_step);
    let backward_scores = extend_direction(seed, -1, hsp_dropoff, score_at_step);

    let mut trace: Vec<i32> = backward_scores.iter().rev().copied().collect();
    trace.extend(forward_scores.iter().copied());
    if trace.is_empty() {
        return None;
    }

    let total_score: i32 = trace.iter().sum();
    let q_start = seed.q - backward_scores.len() as i64;
    let t_start = seed.t - backward_scores.len() as i64;
    let length = trace.len() as u64;

    let mut cumulative = 0i32;
    let mut best_cumulative = i32::MIN;
    let mut best_offset = 0usize;
    for (i, &s) in trace.iter().enumerate() {
        cumulative += s;
        if cumulative > best_cumulative {
            best_cumulative = cumulative;
            best_offset = i;
        }
    }

    Some(Hsp {
        q_start,
        t_start,
        length,
        score: total_score,
        cobs_q: q_start + best_offset as i64,
        cobs_t: t_start + best_offset as i64,
    })
}

/// Scans one direction (`dir = 1` forward including the seed itself at
/// step 0, `dir = -1` backward starting at step -1) and returns the
/// per-step score sequence trimmed back to the best-ending position.
fn extend_direction(
    seed: Seed,
    dir: i64,
    hsp_dropoff: i32,
    score_at_step: &mut impl FnMut(i64, i64, i64) -> Option<i32>,
) -> Vec<i32> {
    let mut scores = Vec::new();
    let mut running = 0i32;
    let mut best = 0i32;
    let mut best_len = 0usize;

    let start_step = if dir == 1 { 0 } else { -1 };
    let mut step = start_step;
    loop {
        match score_at_step(seed.q, seed.t, step) {
            None => break,
            Some(s) => {
                scores.push(s);
                running += s;
                if running > best {
                    best = running;
                    best_len = scores.len();
                }
                if running < best - hsp_dropoff {
                    break;
                }
            }
        }
        step += dir;
    }

    scores.truncate(best_len);
    scores
}

/// Merges HSPs on the same diagonal that overlap in query range to
/// their higher-scoring representative, and rejects duplicate
/// `(cobs_q, cobs_t)` anchors (§4.G, implemented as a sort + linear
/// sweep rather than the spec's literal rangetree, since within one
/// `HspSet` the anchor set is small and a sort is simpler and behaves
/// identically for this dedup step).
fn dedup_diagonals(mut candidates: Vec<Hsp>) -> Vec<Hsp> {
    candidates.sort_by(|a, b| a.diagonal().cmp(&b.diagonal()).then(a.q_start.cmp(&b.q_start)));

    let mut kept: Vec<Hsp> = Vec::with_capacity(candidates.len());
    for hsp in candidates {
        if let Some(last) = kept.last_mut() {
            let overlaps = last.diagonal() == hsp.diagonal() && hsp.q_start < last.q_end();
            if overlaps {
                if hsp.score > last.score {
                    *last = hsp;
                }
                continue;
            }
        }
        kept.push(hsp);
    }

    let mut seen_anchors = std::collections::HashSet::new();
    kept.retain(|hsp| seen_anchors.insert((hsp.cobs_q, hsp.cobs_t)));
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity_score(query: &[i8], target: &[i8]) -> impl FnMut(i64, i64, i64) -> Option<i32> + '_ {
        move |seed_q, seed_t, step| {
            let qi = seed_q + step;
            let ti = seed_t + step;
            if qi < 0 || ti < 0 || qi as usize >= query.len() || ti as usize >= target.len() {
                return None;
            }
            Some(if query[qi as usize] == target[ti as usize] { 1 } else { -2 })
        }
    }

    #[test]
    fn perfect_match_extends_fully() {
        let query: Vec<i8> = b"ACGTACGT".iter().map(|&b| b as i8).collect();
        let target = query.clone();
        let mut set = HspSet::new();
        set.seed_hsp(3, 3).unwrap();
        let hsps = set.finalise(5, 2, identity_score(&query, &target)).unwrap();
        assert_eq!(hsps.len(), 1);
        assert_eq!(hsps[0].q_start, 0);
        assert_eq!(hsps[0].length, 8);
        assert_eq!(hsps[0].score, 8);
    }

    #[test]
    fn below_threshold_is_discarded() {
        let query: Vec<i8> = b"AAAA".iter().map(|&b| b as i8).collect();
        let target: Vec<i8> = b"TTTT".iter().map(|&b| b as i8).collect();
        let mut set = HspSet::new();
        set.seed_hsp(0, 0).unwrap();
        let hsps = set.finalise(1, 0, identity_score(&query, &target)).unwrap();
        assert!(hsps.is_empty());
    }

    #[test]
    fn overlapping_same_diagonal_hsps_merge_to_best() {
        let query: Vec<i8> = b"ACGTACGTACGT".iter().map(|&b| b as i8).collect();
        let target = query.clone();
        let mut set = HspSet::new();
        set.seed_hsp(2, 2).unwrap();
        set.seed_hsp(4, 4).unwrap();
        let hsps = set.finalise(1, 100, identity_score(&query, &target)).unwrap();
        assert_eq!(hsps.len(), 1);
    }

    #[test]
    fn finalise_twice_fails() {
        let query: Vec<i8> = b"ACGT".iter().map(|&b| b as i8).collect();
        let target = query.clone();
        let mut set = HspSet::new();
        set.seed_hsp(0, 0).unwrap();
        set.finalise(1, 1, identity_score(&query, &target)).unwrap();
        let err = set.finalise(1, 1, identity_score(&query, &target));
        assert!(err.is_err());
    }
}
