//! Component H: geneseed region-refinement.
//!
//! A target that contains an intron-split gene yields many weak HSPs,
//! individually below `hsp_threshold` but collectively diagnostic of
//! the gene's span. Geneseed mode seeds a few confident "anchor" HSPs
//! at an elevated threshold, then alternates: widen the searched
//! region around each anchor, re-seed inside only the newly-widened
//! part (the [`IntervalTree`] delta), and promote any new HSP found
//! near an existing anchor (via the [`RangeTree`] proximity query) to
//! a keeper that drives the next round.
//!
//! This module owns only the bookkeeping (which regions were
//! searched, which HSPs are keepers vs. candidates). It does not read
//! the index or extend HSPs itself — the caller supplies a `rescan`
//! closure that re-seeds HSPs inside a `[start, end)` target interval
//! using whatever index/automaton/dataset handles it already holds
//! (that is the seeder coordinator, §4.I).

pub mod interval_tree;
pub mod range_tree;

use crate::config::GeneseedConfig;
use crate::hsp::Hsp;
use interval_tree::IntervalTree;
use range_tree::RangeTree;

/// One HSP on the refinement work list, tagged with which direction(s)
/// along the target it should still extend the search in. Initial
/// anchors search both directions; a subseed propagated from a parent
/// search only searches away from that parent (§4.H step 3a).
#[derive(Clone, Copy)]
struct WorkItem {
    hsp: Hsp,
    go_fwd: bool,
    go_rev: bool,
}

/// Runs the refinement loop to convergence and returns the final
/// keeper HSPs for one target (§4.H step 4: "emit one HSPset per
/// target built from the keeper range tree").
///
/// `anchors` are the elevated-threshold HSPs found by a prior
/// `geneseed_threshold`/`seed_repeat` pass; they seed both the keeper
/// set and the initial work list. `rescan(start, end)` must re-seed
/// and finalise HSPs at the ordinary `hsp_threshold` restricted to
/// target positions in `[start, end)`.
pub fn refine_target(config: &GeneseedConfig, anchors: Vec<Hsp>, mut rescan: impl FnMut(u64, u64) -> Vec<Hsp>) -> Vec<Hsp> {
    let mut searched = IntervalTree::new();
    let mut keepers: RangeTree<Hsp> = RangeTree::new();
    let mut candidates: RangeTree<Hsp> = RangeTree::new();
    let mut seen_keeper_anchors = std::collections::HashSet::new();

    for hsp in &anchors {
        keepers.insert(hsp.cobs_q, hsp.cobs_t, *hsp);
        seen_keeper_anchors.insert((hsp.cobs_q, hsp.cobs_t));
    }

    let mut work: Vec<WorkItem> = anchors
        .into_iter()
        .map(|hsp| WorkItem { hsp, go_fwd: true, go_rev: true })
        .collect();

    // §8 invariant 5 bounds the whole-run round count by num_anchors +
    // num_targets; for one target's loop that collapses to a per-anchor
    // bound. Generous but finite, so a logic bug degrades to a capped
    // loop rather than hanging.
    let max_rounds = work.len() as u32 * 2 + 16;
    let mut round = 0u32;

    while !work.is_empty() && round < max_rounds {
        round += 1;

        let mut deltas = Vec::new();
        for item in &work {
            if item.go_fwd {
                let start = item.hsp.cobs_t.max(0) as u64;
                let end = start + config.max_target_span;
                deltas.extend(searched.insert(start, end));
            }
            if item.go_rev {
                let end = item.hsp.cobs_t.max(0) as u64;
                let start = end.saturating_sub(config.max_target_span);
                deltas.extend(searched.insert(start, end));
            }
        }

        for (start, end) in merge_adjacent(deltas) {
            for hsp in rescan(start, end) {
                candidates.insert(hsp.cobs_q, hsp.cobs_t, hsp);
            }
        }

        let mut next_work = Vec::new();
        for item in &work {
            let q_span = config.max_query_span as i64;
            let t_span = config.max_target_span as i64;
            let q_min = item.hsp.cobs_q - q_span;
            let q_max = item.hsp.cobs_q + q_span;
            let (t_min, t_max) = match (item.go_fwd, item.go_rev) {
                (true, true) => (item.hsp.cobs_t - t_span, item.hsp.cobs_t + t_span),
                (true, false) => (item.hsp.cobs_t, item.hsp.cobs_t + t_span),
                (false, true) => (item.hsp.cobs_t - t_span, item.hsp.cobs_t),
                (false, false) => continue,
            };

            for (_, _, candidate) in candidates.query(q_min, q_max, t_min, t_max) {
                let key = (candidate.cobs_q, candidate.cobs_t);
                if !seen_keeper_anchors.insert(key) {
                    continue;
                }
                keepers.insert(candidate.cobs_q, candidate.cobs_t, candidate);
                let child_go_fwd = candidate.cobs_t >= item.hsp.cobs_t;
                next_work.push(WorkItem {
                    hsp: candidate,
                    go_fwd: child_go_fwd,
                    go_rev: !child_go_fwd,
                });
            }
        }

        if next_work.is_empty() {
            break;
        }
        work = next_work;
    }

    if round >= max_rounds {
        log::warn!("geneseed refinement hit the {max_rounds}-round safety cap without converging");
    }

    keepers.values()
}

/// Coalesces adjacent/overlapping `[start, end)` ranges after a round
/// that may have produced several abutting deltas across anchors,
/// so `rescan` is never called twice over the same bytes in one round.
fn merge_adjacent(mut ranges: Vec<(u64, u64)>) -> Vec<(u64, u64)> {
    if ranges.is_empty() {
        return ranges;
    }
    ranges.sort_unstable();
    let mut merged = Vec::with_capacity(ranges.len());
    let mut current = ranges[0];
    for &(start, end) in &ranges[1..] {
        if start <= current.1 {
            current.1 = current.1.max(end);
        } else {
            merged.push(current);
            current = (start, end);
        }
    }
    merged.push(current);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hsp(q: i64, t: i64) -> Hsp {
        Hsp {
            q_start: q,
            t_start: t,
            length: 10,
            score: 50,
            cobs_q: q + 5,
            cobs_t: t + 5,
        }
    }

    #[test]
    fn no_candidates_leaves_only_anchors() {
        let config = GeneseedConfig::new(40, 100, 1000);
        let anchor = hsp(0, 1000);
        let result = refine_target(&config, vec![anchor], |_, _| Vec::new());
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].cobs_q, anchor.cobs_q);
    }

    #[test]
    fn nearby_candidate_is_promoted_to_keeper() {
        let config = GeneseedConfig::new(40, 100, 5000);
        let anchor = hsp(0, 1000);
        let nearby = hsp(50, 1200);

        let result = refine_target(&config, vec![anchor], move |start, end| {
            if nearby.cobs_t as u64 >= start && (nearby.cobs_t as u64) < end {
                vec![nearby]
            } else {
                Vec::new()
            }
        });

        assert_eq!(result.len(), 2);
        assert!(result.iter().any(|h| h.cobs_t == nearby.cobs_t));
    }

    #[test]
    fn distant_candidate_is_not_promoted() {
        let config = GeneseedConfig::new(40, 50, 200);
        let anchor = hsp(0, 1000);
        let far = hsp(10_000, 1_200_000);

        let result = refine_target(&config, vec![anchor], move |start, end| {
            if far.cobs_t as u64 >= start && (far.cobs_t as u64) < end {
                vec![far]
            } else {
                Vec::new()
            }
        });

        assert_eq!(result.len(), 1);
    }

    #[test]
    fn terminates_without_hitting_safety_cap() {
        let config = GeneseedConfig::new(40, 100, 500);
        let anchor = hsp(0, 0);
        let mut calls = 0;
        let _ = refine_target(&config, vec![anchor], |_, _| {
            calls += 1;
            Vec::new()
        });
        assert!(calls <= 2);
    }
}
