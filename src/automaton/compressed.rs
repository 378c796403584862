//! Transition-compressed Aho-Corasick-style FSM, used when the dense
//! virtual trie would overflow (large alphabets, or `word_length` too
//! deep). Built in three steps: insert every word into a trie with a
//! terminal data slot, compute BFS failure links, then flatten into one
//! `nodes.len() * used_symbols` transition table indexed by a per-symbol
//! dense index.

use std::collections::VecDeque;

use log::debug;

use super::{sealed, State, WordAutomaton};

#[derive(Debug, Clone)]
#[cfg_attr(feature = "savefile", derive(savefile_derive::Savefile))]
pub struct CompressedFsm {
    word_length: u32,
    used_symbols: Vec<u8>,
    symbol_index: [i16; 256],
    /// `transitions[node * used_symbols.len() + symbol_idx] = next_node`
    transitions: Vec<u32>,
    accepting: Vec<bool>,
    words: Vec<Option<Vec<u8>>>,
}

struct TrieNode {
    children: Vec<(u8, usize)>,
    fail: usize,
    depth: u32,
    word: Option<Vec<u8>>,
}

impl CompressedFsm {
    /// Builds a compressed FSM recognizing exactly the words in `words`
    /// (all must share `word_length`). `used_symbols` is the sorted set
    /// of distinct bytes that occur anywhere in `words`.
    pub fn build(words: &[Vec<u8>], word_length: u32) -> Self {
        debug_assert!(words.iter().all(|w| w.len() == word_length as usize));

        let mut used: Vec<u8> = words.iter().flatten().copied().collect();
        used.sort_unstable();
        used.dedup();
        let mut symbol_index = [-1i16; 256];
        for (i, &s) in used.iter().enumerate() {
            symbol_index[s as usize] = i as i16;
        }

        let mut nodes = vec![TrieNode {
            children: Vec::new(),
            fail: 0,
            depth: 0,
            word: None,
        }];

        for word in words {
            let mut cur = 0usize;
            for (depth, &b) in word.iter().enumerate() {
                let existing = nodes[cur].children.iter().find(|(c, _)| *c == b).map(|(_, n)| *n);
                cur = match existing {
                    Some(n) => n,
                    None => {
                        let new_idx = nodes.len();
                        nodes.push(TrieNode {
                            children: Vec::new(),
                            fail: 0,
                            depth: depth as u32 + 1,
                            word: None,
                        });
                        nodes[cur].children.push((b, new_idx));
                        new_idx
                    }
                };
            }
            nodes[cur].word = Some(word.clone());
        }

        // BFS to compute failure links (standard Aho-Corasick construction).
        let mut queue = VecDeque::new();
        for &(_, child) in nodes[0].children.clone().iter() {
            nodes[child].fail = 0;
            queue.push_back(child);
        }
        while let Some(node_idx) = queue.pop_front() {
            let children = nodes[node_idx].children.clone();
            for (symbol, child) in children {
                let mut fallback = nodes[node_idx].fail;
                loop {
                    if let Some(&(_, target)) =
                        nodes[fallback].children.iter().find(|(c, _)| *c == symbol)
                    {
                        nodes[child].fail = target;
                        break;
                    }
                    if fallback == 0 {
                        nodes[child].fail = 0;
                        break;
                    }
                    fallback = nodes[fallback].fail;
                }
                queue.push_back(child);
            }
        }

        let n = nodes.len();
        let m = used.len().max(1);
        let mut transitions = vec![0u32; n * m];
        let mut accepting = vec![false; n];
        let mut out_words = vec![None; n];

        for node_idx in 0..n {
            accepting[node_idx] = nodes[node_idx].word.is_some();
            out_words[node_idx] = nodes[node_idx].word.clone();
            for (sym_idx, &symbol) in used.iter().enumerate() {
                let next = resolve_transition(&nodes, node_idx, symbol);
                transitions[node_idx * m + sym_idx] = next as u32;
            }
        }

        let fsm = CompressedFsm {
            word_length,
            used_symbols: used,
            symbol_index,
            transitions,
            accepting,
            words: out_words,
        };
        debug!(
            "compressed fsm built: {} nodes, {} used symbols, transition table {} bytes",
            n,
            fsm.used_symbols.len(),
            fsm.transitions_byte_len(),
        );
        fsm
    }

    fn used_len(&self) -> usize {
        self.used_symbols.len().max(1)
    }

    /// Size in bytes of the flattened transition table, viewed as a raw
    /// byte buffer rather than walked field-by-field (§10 memory
    /// accounting).
    fn transitions_byte_len(&self) -> usize {
        bytemuck::cast_slice::<u32, u8>(&self.transitions).len()
    }
}

fn resolve_transition(nodes: &[TrieNode], node_idx: usize, symbol: u8) -> usize {
    let mut cur = node_idx;
    loop {
        if let Some(&(_, target)) = nodes[cur].children.iter().find(|(c, _)| *c == symbol) {
            return target;
        }
        if cur == 0 {
            return 0;
        }
        cur = nodes[cur].fail;
    }
}

impl sealed::Sealed for CompressedFsm {}

impl WordAutomaton for CompressedFsm {
    fn word_length(&self) -> u32 {
        self.word_length
    }

    fn advance(&self, state: State, symbol: u8) -> State {
        let idx = self.symbol_index[symbol as usize];
        if idx < 0 {
            return 0;
        }
        let m = self.used_len();
        self.transitions[state as usize * m + idx as usize] as State
    }

    fn is_accepting(&self, state: State) -> bool {
        self.accepting.get(state as usize).copied().unwrap_or(false)
    }

    fn decode_word(&self, state: State) -> Option<Vec<u8>> {
        self.words.get(state as usize).cloned().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automaton::scan;

    #[test]
    fn recognizes_inserted_words_with_overlap() {
        let words = vec![b"ACG".to_vec(), b"CGT".to_vec(), b"GTA".to_vec()];
        let fsm = CompressedFsm::build(&words, 3);
        let text = b"ACGTA";
        let mut hits = Vec::new();
        scan(&fsm, text, |i, state| {
            hits.push((i, fsm.decode_word(state).unwrap()));
        });
        assert_eq!(
            hits,
            vec![(2, b"ACG".to_vec()), (3, b"CGT".to_vec()), (4, b"GTA".to_vec())]
        );
    }

    #[test]
    fn symbol_outside_used_set_resets() {
        let words = vec![b"ACG".to_vec()];
        let fsm = CompressedFsm::build(&words, 3);
        let mut hits = Vec::new();
        scan(&fsm, b"ACNACG", |i, _| hits.push(i));
        assert_eq!(hits, vec![5]);
    }
}
