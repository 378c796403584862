//! Component C: word automata.
//!
//! Two interchangeable implementations share one sealed trait contract:
//! a dense virtual trie ([`vfsm`]) for small `|alphabet|^word_length`
//! state spaces, and a transition-compressed Aho-Corasick-style FSM
//! ([`compressed`]) for everything else. Callers that only need
//! `advance`/`is_accepting` are generic over [`WordAutomaton`] and never
//! see which concrete variant they hold.

pub mod compressed;
pub mod vfsm;

mod sealed {
    pub trait Sealed {}
}

/// State identifier. `0` is always the automaton's root/failure state.
pub type State = u64;

/// Shared contract both word-automaton implementations expose.
pub trait WordAutomaton: sealed::Sealed {
    /// Word length (k) this automaton recognizes.
    fn word_length(&self) -> u32;

    /// Advances `state` by one input `symbol`. An invalid symbol resets
    /// to the root state (§7: silent, not an error).
    fn advance(&self, state: State, symbol: u8) -> State;

    /// True if `state` corresponds to a complete k-length word (i.e. a
    /// hit should be emitted here).
    fn is_accepting(&self, state: State) -> bool;

    /// Decodes an accepting state back to the word bytes it represents,
    /// where the automaton stores enough information to do so (always
    /// true for the dense trie; the compressed FSM stores the word
    /// alongside its terminal node).
    fn decode_word(&self, state: State) -> Option<Vec<u8>>;
}

/// Scans `text` through `automaton`, invoking `on_hit(word_end_index,
/// state)` at every accepting state reached while advancing through
/// valid symbols. Implements the "emit a hit at every new k-character
/// window" contract from §4.C; invalid symbols reset to the root and do
/// not themselves produce a hit.
pub fn scan(automaton: &impl WordAutomaton, text: &[u8], mut on_hit: impl FnMut(usize, State)) {
    let mut state: State = 0;
    for (i, &symbol) in text.iter().enumerate() {
        state = automaton.advance(state, symbol);
        if automaton.is_accepting(state) {
            on_hit(i, state);
        }
    }
}

/// Ambiguity-aware scan (§4.C). At each position, every live state is
/// advanced by every symbol the input IUPAC code expands to; duplicate
/// states are discarded only against the head and tail of the current
/// batch (a cheap, deliberately inexact dedup per §9's open question),
/// and the batch resets to `[0]` whenever the product of live states
/// and substitutions would exceed `word_ambiguity`.
pub fn scan_ambiguous<A: crate::alphabet::Alphabet>(
    automaton: &impl WordAutomaton,
    text: &[u8],
    word_ambiguity: u32,
    mut on_hit: impl FnMut(usize, State),
) {
    let mut live: Vec<State> = vec![0];
    for (i, &symbol) in text.iter().enumerate() {
        let expansion = A::ambiguity_expansion(symbol);
        if expansion.is_empty() {
            live.clear();
            live.push(0);
            continue;
        }

        let projected = live.len() as u64 * expansion.len() as u64;
        if projected > word_ambiguity as u64 {
            live.clear();
            live.push(0);
        }

        let mut next: Vec<State> = Vec::with_capacity(live.len() * expansion.len());
        for &state in &live {
            for &sub_symbol in expansion {
                let next_state = automaton.advance(state, sub_symbol);
                let dup = next.first() == Some(&next_state) || next.last() == Some(&next_state);
                if !dup {
                    next.push(next_state);
                }
            }
        }
        live = next;

        for &state in &live {
            if automaton.is_accepting(state) {
                on_hit(i, state);
            }
        }
    }
}
