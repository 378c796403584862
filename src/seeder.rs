//! Component I: the seeder coordinator.
//!
//! `Seeder` wires a word automaton to one or more [`HspParam`] modes
//! and drives the `FREE → LOADING → READY → SCANNING → DONE` query
//! lifecycle: load queries (building per-word seed lists and,
//! optionally, neighborhood links), prepare (freezing the query set),
//! then scan targets one at a time, emitting a [`Comparison`] per
//! non-empty `(query, target)` HSPset.

use std::collections::HashMap;

use log::debug;

use crate::alphabet::translate_codon;
use crate::automaton::{scan, State, WordAutomaton};
use crate::config::{HspParam, MatchMode, SeederConfig};
use crate::error::{Result, SeedCoreError};
use crate::hsp::{Hsp, HspSet};
use crate::neighborhood::{enumerate_neighborhood, ScoreMatrix, Visit};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SeederState {
    Free,
    Loading,
    Ready,
    Scanning,
    Done,
}

struct QueryRecord {
    id: u64,
    symbols: Vec<u8>,
}

#[derive(Default)]
struct Mailbox {
    match_count: u64,
    match_mailbox: u64,
}

/// One non-empty `(query, target)` HSP set, ready for a downstream
/// alignment consumer (§3 `Comparison`).
pub struct Comparison {
    pub query_id: u64,
    pub target_id: u64,
    pub mode: MatchMode,
    pub hsps: Vec<Hsp>,
}

pub struct Seeder<W: WordAutomaton> {
    automaton: W,
    hsp_params: Vec<HspParam>,
    config: SeederConfig,
    state: SeederState,
    queries: Vec<QueryRecord>,
    /// word state -> (query index, query position at word start).
    word_seeds: HashMap<State, Vec<(usize, i64)>>,
    /// word state -> other word states whose seed list should also be
    /// consulted when this state is hit during a target scan (§4.I
    /// "create a neighbor link pointing back to this word").
    neighbor_links: HashMap<State, Vec<State>>,
    mailbox: HashMap<State, Mailbox>,
    comparison_counter: u64,
    estimated_bytes: u64,
}

impl<W: WordAutomaton> Seeder<W> {
    pub fn new(automaton: W, hsp_params: Vec<HspParam>, config: SeederConfig) -> Self {
        Seeder {
            automaton,
            hsp_params,
            config,
            state: SeederState::Free,
            queries: Vec::new(),
            word_seeds: HashMap::new(),
            neighbor_links: HashMap::new(),
            mailbox: HashMap::new(),
            comparison_counter: 0,
            estimated_bytes: 0,
        }
    }

    pub fn state_is_done(&self) -> bool {
        self.state == SeederState::Done
    }

    /// Loads one query, walking it through the automaton and recording
    /// a seed at every accepting state (§4.I "query load"). Fails with
    /// [`SeedCoreError::AfterPrepare`] once `prepare` has been called.
    pub fn add_query(&mut self, id: u64, symbols: Vec<u8>) -> Result<()> {
        match self.state {
            SeederState::Free => self.state = SeederState::Loading,
            SeederState::Loading => {}
            _ => return Err(SeedCoreError::AfterPrepare),
        }

        self.estimated_bytes += symbols.len() as u64;
        if self.estimated_bytes > self.config.memory_ceiling_bytes {
            return Err(SeedCoreError::MemoryBudget {
                limit_bytes: self.config.memory_ceiling_bytes,
                wanted_bytes: self.estimated_bytes,
            });
        }

        let query_index = self.queries.len();
        let word_length = self.automaton.word_length() as usize;
        let automaton = &self.automaton;
        let word_seeds = &mut self.word_seeds;
        scan(automaton, &symbols, |end_index, state| {
            let start = (end_index + 1 - word_length) as i64;
            word_seeds.entry(state).or_default().push((query_index, start));
        });

        self.queries.push(QueryRecord { id, symbols });
        Ok(())
    }

    /// Freezes the query set and, if `matrix` and
    /// `config.neighborhood_threshold` are both present, builds
    /// neighbor links for every seeded word (§4.I "if this is the
    /// word's first seed and a neighborhood is configured, traverse
    /// the neighborhood").
    pub fn prepare(&mut self, alphabet: &[u8], matrix: Option<&dyn ScoreMatrix>) -> Result<()> {
        match self.state {
            SeederState::Free | SeederState::Loading => self.state = SeederState::Ready,
            _ => {
                return Err(SeedCoreError::ModeConflict {
                    detail: "prepare() called outside FREE/LOADING state".into(),
                })
            }
        }

        if let (Some(matrix), Some(threshold)) = (matrix, self.config.neighborhood_threshold) {
            let seeded_words: Vec<State> = self.word_seeds.keys().copied().collect();
            for word_state in seeded_words {
                let Some(word) = self.automaton.decode_word(word_state) else {
                    continue;
                };
                enumerate_neighborhood(&word, alphabet, matrix, threshold, true, |neighbor_word, _score| {
                    let mut state = 0;
                    for &symbol in neighbor_word {
                        state = self.automaton.advance(state, symbol);
                    }
                    if state != word_state && self.automaton.is_accepting(state) {
                        self.neighbor_links.entry(state).or_default().push(word_state);
                    }
                    Visit::Continue
                });
            }
        }

        Ok(())
    }

    fn record_hit(mailbox: &mut HashMap<State, Mailbox>, state: State, counter: u64, limit: Option<u64>) -> bool {
        let entry = mailbox.entry(state).or_default();
        if entry.match_mailbox != counter {
            entry.match_mailbox = counter;
            entry.match_count = 0;
        }
        entry.match_count += 1;
        match limit {
            Some(limit) if entry.match_count > limit => {
                debug!("per-target saturation: word state {state} exceeded {limit} hits, dropping");
                true
            }
            _ => false,
        }
    }

    /// Scans one target through the automaton, seeds every registered
    /// mode's HSPset from direct and neighbor hits, finalises each
    /// non-empty set, and reports it via `on_comparison` (§4.I "target
    /// scan"). `matrix` is the raw per-residue substitution scorer; a
    /// mode's stride/translation composition is applied on top of it.
    pub fn add_target(
        &mut self,
        target_id: u64,
        target_symbols: &[u8],
        matrix: &impl Fn(u8, u8) -> i32,
        mut on_comparison: impl FnMut(Comparison),
    ) -> Result<()> {
        match self.state {
            SeederState::Ready | SeederState::Scanning => self.state = SeederState::Scanning,
            _ => {
                return Err(SeedCoreError::ModeConflict {
                    detail: "add_target() called before prepare()".into(),
                })
            }
        }

        self.comparison_counter += 1;
        let counter = self.comparison_counter;
        let word_length = self.automaton.word_length() as usize;

        let mut hspsets: HashMap<(usize, usize), HspSet> = HashMap::new();

        let automaton = &self.automaton;
        let word_seeds = &self.word_seeds;
        let neighbor_links = &self.neighbor_links;
        let mailbox = &mut self.mailbox;
        let limit = self.config.per_target_saturation;
        let hsp_params = &self.hsp_params;

        scan(automaton, target_symbols, |end_index, state| {
            if Self::record_hit(mailbox, state, counter, limit) {
                return;
            }
            let raw_pos = (end_index + 1 - word_length) as i64;

            let mut feed = |word_state: State| {
                let Some(seeds) = word_seeds.get(&word_state) else {
                    return;
                };
                for &(query_index, query_pos) in seeds {
                    for param_index in 0..hsp_params.len() {
                        let _ = hspsets
                            .entry((query_index, param_index))
                            .or_insert_with(HspSet::new)
                            .seed_hsp(query_pos, raw_pos);
                    }
                }
            };

            feed(state);
            if let Some(neighbors) = neighbor_links.get(&state) {
                for &neighbor_state in neighbors {
                    feed(neighbor_state);
                }
            }
        });

        for ((query_index, param_index), mut set) in hspsets {
            let param = &self.hsp_params[param_index];
            let query = &self.queries[query_index];
            let mode = param.mode();
            let hsps = set
                .finalise(param.hsp_threshold, param.hsp_dropoff, |seed_q, seed_t, step| {
                    score_at_step(mode, &query.symbols, target_symbols, seed_q, seed_t, step, matrix)
                })?
                .to_vec();
            if !hsps.is_empty() {
                on_comparison(Comparison {
                    query_id: query.id,
                    target_id,
                    mode,
                    hsps,
                });
            }
        }

        Ok(())
    }

    pub fn finish(&mut self) {
        self.state = SeederState::Done;
    }
}

/// Composes a mode's stride/translation rule with the caller's raw
/// residue scorer to answer "what is the score at `step` steps from
/// this seed" (§4.G step 1, §11 translation frames).
fn score_at_step(
    mode: MatchMode,
    query: &[u8],
    target: &[u8],
    seed_q: i64,
    seed_t: i64,
    step: i64,
    matrix: &impl Fn(u8, u8) -> i32,
) -> Option<i32> {
    let (q_stride, t_stride) = mode.strides();
    let q_index = seed_q + step * q_stride as i64;
    let t_index = seed_t + step * t_stride as i64;

    let residue_at = |seq: &[u8], index: i64, stride: u32| -> Option<&[u8]> {
        if index < 0 {
            return None;
        }
        let index = index as usize;
        let end = index + stride as usize;
        seq.get(index..end)
    };

    match mode {
        MatchMode::DnaVsDna | MatchMode::ProteinVsProtein => {
            let q = *query.get(q_index as usize).filter(|_| q_index >= 0)?;
            let t = *target.get(t_index as usize).filter(|_| t_index >= 0)?;
            Some(matrix(q, t))
        }
        MatchMode::ProteinVsDnaTranslated => {
            let q = *query.get(q_index as usize).filter(|_| q_index >= 0)?;
            let codon = residue_at(target, t_index, 3)?;
            let aa = translate_codon(codon[0], codon[1], codon[2]);
            Some(matrix(q, aa))
        }
        MatchMode::DnaVsProteinTranslated => {
            let codon = residue_at(query, q_index, 3)?;
            let aa = translate_codon(codon[0], codon[1], codon[2]);
            let t = *target.get(t_index as usize).filter(|_| t_index >= 0)?;
            Some(matrix(aa, t))
        }
        MatchMode::CodonVsCodon => {
            let q_codon = residue_at(query, q_index, 3)?;
            let t_codon = residue_at(target, t_index, 3)?;
            let q_aa = translate_codon(q_codon[0], q_codon[1], q_codon[2]);
            let t_aa = translate_codon(t_codon[0], t_codon[1], t_codon[2]);
            Some(matrix(q_aa, t_aa))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automaton::vfsm::Vfsm;
    use crate::config::HspParam;

    fn dna_rank(b: u8) -> Option<u32> {
        match b {
            b'A' => Some(0),
            b'C' => Some(1),
            b'G' => Some(2),
            b'T' => Some(3),
            _ => None,
        }
    }
    fn dna_unrank(r: u32) -> u8 {
        [b'A', b'C', b'G', b'T'][r as usize]
    }
    fn identity_matrix(a: u8, b: u8) -> i32 {
        if a == b {
            1
        } else {
            -2
        }
    }

    #[test]
    fn add_query_after_prepare_fails() {
        let automaton = Vfsm::build(4, 3, dna_rank, dna_unrank).unwrap();
        let params = vec![HspParam::new(MatchMode::DnaVsDna, 4, 2)];
        let mut seeder = Seeder::new(automaton, params, SeederConfig::default());
        seeder.add_query(1, b"ACGTACGT".to_vec()).unwrap();
        seeder.prepare(b"ACGT", None).unwrap();
        let err = seeder.add_query(2, b"ACGT".to_vec());
        assert!(matches!(err, Err(SeedCoreError::AfterPrepare)));
    }

    #[test]
    fn matching_query_and_target_yield_comparison() {
        let automaton = Vfsm::build(4, 3, dna_rank, dna_unrank).unwrap();
        let params = vec![HspParam::new(MatchMode::DnaVsDna, 4, 2)];
        let mut seeder = Seeder::new(automaton, params, SeederConfig::default());
        seeder.add_query(7, b"ACGTACGT".to_vec()).unwrap();
        seeder.prepare(b"ACGT", None).unwrap();

        let mut comparisons = Vec::new();
        seeder
            .add_target(99, b"TTTACGTACGTTTT", &identity_matrix, |c| comparisons.push(c))
            .unwrap();

        assert_eq!(comparisons.len(), 1);
        assert_eq!(comparisons[0].query_id, 7);
        assert_eq!(comparisons[0].target_id, 99);
        assert!(!comparisons[0].hsps.is_empty());
    }
}
