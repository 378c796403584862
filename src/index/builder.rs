//! Component D: two-pass word-index builder.
//!
//! Pass 1 counts word frequencies with bounded, constant memory (one
//! counter per present word). Pass 2 re-scans the dataset once per
//! memory-bounded interval of the word space, so the working set of
//! growable per-word occurrence buffers never exceeds the configured
//! ceiling. Offsets recorded in [`super::IndexEntry::byte_offset`] are
//! bit offsets into the occurrence region (the occurrence region is a
//! single [`BitPackedContainer`], which is bit- not byte-addressable
//! throughout this crate) rather than literal byte offsets.

use std::collections::HashMap;

use log::debug;
use rayon::prelude::*;

use crate::alphabet::Alphabet;
use crate::automaton::vfsm::Vfsm;
use crate::automaton::{scan, scan_ambiguous, WordAutomaton};
use crate::bitpack::{bits_for, BitPackedContainer};
use crate::config::IndexBuildConfig;
use crate::error::{Result, SeedCoreError};

use super::{IndexEntry, IndexStrand};

/// One sequence's symbol stream to scan, already resolved to whichever
/// frame/strand this strand build covers (translation/frame handling
/// happens in the caller, which is the only place that knows whether
/// the underlying dataset is DNA being translated or scanned directly).
pub struct ScanStream {
    pub seq_id: u64,
    pub symbols: Vec<u8>,
}

struct WordSurvey {
    /// state -> observed count, absent once desaturated (removed from
    /// the map entirely rather than storing a sentinel, since states
    /// not in the map are already "absent" by construction).
    counts: HashMap<u64, u64>,
    total_kmers: u64,
}

/// Counts each stream independently on the `rayon` pool and reduces the
/// per-stream maps pairwise, mirroring the teacher's chunked
/// `par_iter().reduce()` staged-construction pattern.
fn count_pass<A: Alphabet>(
    streams: &[ScanStream],
    automaton: &Vfsm,
    word_length: u32,
    word_jump: u32,
    word_ambiguity: u32,
) -> WordSurvey {
    let (counts, total_kmers) = streams
        .par_iter()
        .map(|stream| {
            let mut counts: HashMap<u64, u64> = HashMap::new();
            let mut total = 0u64;
            let mut record = |end_index: usize, state: u64| {
                let start = end_index + 1 - word_length as usize;
                if start as u64 % word_jump as u64 == 0 {
                    *counts.entry(state).or_insert(0) += 1;
                    total += 1;
                }
            };
            if word_ambiguity > 1 {
                scan_ambiguous::<A>(automaton, &stream.symbols, word_ambiguity, |i, s| record(i, s));
            } else {
                scan(automaton, &stream.symbols, |i, s| record(i, s));
            }
            (counts, total)
        })
        .reduce(
            || (HashMap::new(), 0u64),
            |(mut acc_counts, acc_total), (counts, total)| {
                for (state, count) in counts {
                    *acc_counts.entry(state).or_insert(0) += count;
                }
                (acc_counts, acc_total + total)
            },
        );

    WordSurvey { counts, total_kmers }
}

/// Desaturation (§4.D): any word whose count exceeds
/// `expected + saturate_threshold` is dropped, where `expected = N /
/// alphabet_size^word_length`.
fn desaturate(survey: &mut WordSurvey, alphabet_size: u32, word_length: u32, saturate_threshold: u64) {
    let space = (alphabet_size as u64).saturating_pow(word_length);
    let expected = if space == 0 { 0 } else { survey.total_kmers / space };
    let ceiling = expected + saturate_threshold;
    let dropped_before = survey.counts.len();
    survey.counts.retain(|_, &mut count| count <= ceiling);
    let dropped = dropped_before - survey.counts.len();
    if dropped > 0 {
        debug!("desaturation dropped {dropped} words (expected={expected}, ceiling={ceiling})");
    }
}

/// Builds one strand (forward or reverse) of the index from a set of
/// already-framed scan streams.
pub fn build_strand<A: Alphabet>(
    streams: &[ScanStream],
    automaton: &Vfsm,
    config: &IndexBuildConfig,
    num_seqs: u64,
    max_seq_len: u64,
) -> Result<(IndexStrand, BitPackedContainer)> {
    config.validate()?;

    let mut survey = count_pass::<A>(streams, automaton, config.word_length, config.word_jump, config.word_ambiguity);
    desaturate(&mut survey, A::CARDINALITY, config.word_length, config.saturate_threshold);

    let mut word_list: Vec<(u64, u64)> = survey.counts.into_iter().collect();
    word_list.sort_unstable_by_key(|(state, _)| *state);

    let max_index_length = word_list.iter().map(|(_, c)| *c).max().unwrap_or(0);
    let max_word_width = bits_for(automaton.state_space_size());
    let max_index_len_width = bits_for(max_index_length.max(1));
    let (num_seqs_width, max_seq_len_width) = super::widths_for_counts(num_seqs, max_seq_len);
    let occurrence_record_width = num_seqs_width + max_seq_len_width;

    // offset assignment: ascending state order, bit offsets.
    let mut offsets = Vec::with_capacity(word_list.len());
    let mut running_bit_offset = 0u64;
    for (_, count) in &word_list {
        offsets.push(running_bit_offset);
        running_bit_offset += count * occurrence_record_width as u64;
    }
    let total_index_length_bits = running_bit_offset;
    let total_index_len_width = bits_for((total_index_length_bits / occurrence_record_width.max(1) as u64).max(1));

    let estimated_bytes = total_index_length_bits / 8 + word_list.len() as u64 * 8;
    if estimated_bytes > config.memory_limit_bytes {
        return Err(SeedCoreError::MemoryBudget {
            limit_bytes: config.memory_limit_bytes,
            wanted_bytes: estimated_bytes,
        });
    }

    // Pass 2, chunked into memory-bounded intervals over word_list so the
    // per-word growable occurrence buffers never all exist at once.
    let bytes_per_interval = config.memory_limit_bytes.max(1024);
    let mut occurrence_bits = BitPackedContainer::new();
    let mut entries = vec![IndexEntry { freq_count: 0, byte_offset: 0 }; word_list.len()];

    let mut interval_start = 0usize;
    while interval_start < word_list.len() {
        let mut interval_end = interval_start;
        let mut interval_bits = 0u64;
        while interval_end < word_list.len() {
            let (_, count) = word_list[interval_end];
            let record_bits = count * occurrence_record_width as u64;
            if interval_end > interval_start && interval_bits + record_bits > bytes_per_interval * 8 {
                break;
            }
            interval_bits += record_bits;
            interval_end += 1;
        }

        let interval_states: HashMap<u64, usize> = word_list[interval_start..interval_end]
            .iter()
            .enumerate()
            .map(|(i, (state, _))| (*state, interval_start + i))
            .collect();
        let mut buffers: HashMap<u64, Vec<(u64, u64)>> = streams
            .par_iter()
            .map(|stream| {
                let mut local: HashMap<u64, Vec<(u64, u64)>> = HashMap::new();
                let mut record = |end_index: usize, state: u64| {
                    if !interval_states.contains_key(&state) {
                        return;
                    }
                    let start = end_index + 1 - config.word_length as usize;
                    if start as u64 % config.word_jump as u64 != 0 {
                        return;
                    }
                    local.entry(state).or_default().push((stream.seq_id, start as u64));
                };
                if config.word_ambiguity > 1 {
                    scan_ambiguous::<A>(automaton, &stream.symbols, config.word_ambiguity, |i, s| record(i, s));
                } else {
                    scan(automaton, &stream.symbols, |i, s| record(i, s));
                }
                local
            })
            .reduce(HashMap::new, |mut acc, local| {
                for (state, mut occs) in local {
                    acc.entry(state).or_default().append(&mut occs);
                }
                acc
            });

        for idx in interval_start..interval_end {
            let (state, count) = word_list[idx];
            let mut occurrences = buffers.remove(&state).unwrap_or_default();
            // translated indices are sorted lexicographically to merge
            // frames cleanly (§4.D); untranslated single-frame scans are
            // already in scan order, sorting is a harmless no-op there.
            occurrences.sort_unstable();
            for (seq_id, pos) in &occurrences {
                occurrence_bits.append(*seq_id, num_seqs_width);
                occurrence_bits.append(*pos, max_seq_len_width);
            }
            entries[idx] = IndexEntry {
                freq_count: count,
                byte_offset: offsets[idx],
            };
        }

        interval_start = interval_end;
    }

    let word_list_states: Vec<u64> = word_list.iter().map(|(state, _)| *state).collect();
    let mut word_table = vec![u32::MAX; automaton.state_space_size() as usize];
    for (i, &state) in word_list_states.iter().enumerate() {
        word_table[state as usize] = i as u32;
    }

    Ok((
        IndexStrand {
            max_index_length,
            max_word_width,
            max_index_len_width,
            total_index_len_width,
            word_table,
            word_list_states,
            entries,
            num_seqs_width,
            max_seq_len_width,
            occurrence_region_offset: 0,
            preloaded: std::sync::Mutex::new(None),
        },
        occurrence_bits,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alphabet::Dna;

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

    #[test]
    fn count_pass_counts_every_window() {
        let automaton = Vfsm::build(4, 3, dna_rank, dna_unrank).unwrap();
        let streams = vec![ScanStream {
            seq_id: 1,
            symbols: b"ACGTACGT".to_vec(),
        }];
        let survey = count_pass::<Dna>(&streams, &automaton, 3, 1, 1);
        assert_eq!(survey.total_kmers, 6);
    }

    #[test]
    fn build_strand_round_trips_occurrences() {
        let automaton = Vfsm::build(4, 3, dna_rank, dna_unrank).unwrap();
        let config = IndexBuildConfig::new(3).with_word_jump(1);
        let streams = vec![ScanStream {
            seq_id: 0,
            symbols: b"ACGTACG".to_vec(),
        }];
        let (strand, occurrences) = build_strand::<Dna>(&streams, &automaton, &config, 1, 7).unwrap();
        let acg_state = automaton.word_to_state(b"ACG").unwrap();
        let entry = strand.lookup(acg_state).unwrap();
        assert_eq!(entry.freq_count, 2);
        let record_width = strand.num_seqs_width + strand.max_seq_len_width;
        let pos0 = occurrences.get(entry.byte_offset + strand.num_seqs_width as u64, strand.max_seq_len_width);
        assert_eq!(pos0, 0);
        let pos1 = occurrences.get(entry.byte_offset + record_width as u64 + strand.num_seqs_width as u64, strand.max_seq_len_width);
        assert_eq!(pos1, 4);
    }
}
