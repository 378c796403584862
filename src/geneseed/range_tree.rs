//! 2D range tree giving output-sensitive proximity queries over
//! `(q, t)` points (§4.H: keeper and candidate HSP anchors). Primary
//! structure buckets by `q`; each bucket holds its points sorted by
//! `t`, so a window query is a primary range scan (`BTreeMap::range`)
//! plus, per bucket, a binary-searched slice on `t` — the standard
//! range-tree decomposition without fractional cascading.

use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct RangeTree<T: Clone> {
    buckets: BTreeMap<i64, Vec<(i64, T)>>,
}

impl<T: Clone> Default for RangeTree<T> {
    fn default() -> Self {
        RangeTree {
            buckets: BTreeMap::new(),
        }
    }
}

impl<T: Clone> RangeTree<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, q: i64, t: i64, value: T) {
        let bucket = self.buckets.entry(q).or_default();
        let pos = bucket.partition_point(|(existing_t, _)| *existing_t < t);
        bucket.insert(pos, (t, value));
    }

    /// Every point with `q in [q_min, q_max]` and `t in [t_min, t_max]`.
    pub fn query(&self, q_min: i64, q_max: i64, t_min: i64, t_max: i64) -> Vec<(i64, i64, T)> {
        let mut out = Vec::new();
        for (&q, bucket) in self.buckets.range(q_min..=q_max) {
            let start = bucket.partition_point(|(t, _)| *t < t_min);
            for (t, value) in &bucket[start..] {
                if *t > t_max {
                    break;
                }
                out.push((q, *t, value.clone()));
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.buckets.values().map(|b| b.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every stored value, in no particular order. Used to gather the
    /// final keeper set once refinement has converged.
    pub fn values(&self) -> Vec<T> {
        self.buckets.values().flatten().map(|(_, v)| v.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_finds_points_in_window() {
        let mut tree = RangeTree::new();
        tree.insert(10, 100, "a");
        tree.insert(20, 200, "b");
        tree.insert(30, 300, "c");

        let found = tree.query(5, 25, 0, 250);
        let labels: Vec<_> = found.iter().map(|(_, _, v)| *v).collect();
        assert_eq!(labels, vec!["a", "b"]);
    }

    #[test]
    fn query_respects_both_axes() {
        let mut tree = RangeTree::new();
        tree.insert(10, 100, 1);
        tree.insert(10, 500, 2);
        let found = tree.query(0, 20, 0, 200);
        assert_eq!(found, vec![(10, 100, 1)]);
    }

    #[test]
    fn empty_tree_returns_nothing() {
        let tree: RangeTree<()> = RangeTree::new();
        assert!(tree.query(0, 100, 0, 100).is_empty());
    }
}
