//! Batch assembly shared by all acquisition strategies
//!
//! Strategies offer pairs in priority order; the builder accepts only fresh
//! pairs (no definitive observation yet) that are not already in the batch.
//! Afterwards the batch is topped up with random fresh pairs and, only when
//! the candidate set has no fresh pairs left, with repeats of exhausted ones.

use rand::prelude::*;
use std::collections::BTreeSet;

use crate::preference::{pair_count, Pair, PairSet};

/// Above this many candidate pairs, random fresh pairs are found by rejection sampling
const ENUMERATION_LIMIT: usize = 200_000;

/// Rejection-sampling attempts per missing pair before enumerating
const REJECTION_ATTEMPTS_PER_PAIR: usize = 64;

pub(crate) struct BatchBuilder<'a> {
    exhausted: &'a PairSet,
    target: usize,
    chosen: Vec<Pair>,
    seen: BTreeSet<Pair>,
}

impl<'a> BatchBuilder<'a> {
    pub fn new(exhausted: &'a PairSet, target: usize) -> Self {
        Self {
            exhausted,
            target,
            chosen: Vec::with_capacity(target),
            seen: BTreeSet::new(),
        }
    }

    pub fn is_full(&self) -> bool {
        self.chosen.len() >= self.target
    }

    pub fn remaining(&self) -> usize {
        self.target.saturating_sub(self.chosen.len())
    }

    /// Accept `(a, b)` if it is fresh and not yet in the batch
    pub fn offer(&mut self, a: usize, b: usize) -> bool {
        if self.is_full() || a == b {
            return false;
        }
        let Ok(pair) = Pair::new(a, b) else {
            return false;
        };
        if self.exhausted.contains(&pair) || self.seen.contains(&pair) {
            return false;
        }
        self.seen.insert(pair);
        self.chosen.push(pair);
        true
    }

    /// Returns true if `(a, b)` would be accepted
    pub fn is_fresh(&self, a: usize, b: usize) -> bool {
        match Pair::new(a, b) {
            Ok(pair) => !self.exhausted.contains(&pair) && !self.seen.contains(&pair),
            Err(_) => false,
        }
    }

    /// Offer pairs in rank order: (0,1), (0,2), (1,2), (0,3), ...
    pub fn offer_in_rank_order(&mut self, order: &[usize]) {
        for b in 1..order.len() {
            for a in 0..b {
                if self.is_full() {
                    return;
                }
                self.offer(order[a], order[b]);
            }
        }
    }

    /// Fill with uniformly random fresh pairs over `candidates`
    pub fn fill_random_fresh<R: Rng + ?Sized>(&mut self, candidates: &[usize], rng: &mut R) {
        if self.is_full() {
            return;
        }
        let total = pair_count(candidates.len());
        let available = total
            .saturating_sub(self.exhausted.count_within(candidates))
            .saturating_sub(self.chosen.len());
        if available == 0 {
            return;
        }

        if total > ENUMERATION_LIMIT && self.remaining() * 4 < available {
            let attempts = REJECTION_ATTEMPTS_PER_PAIR * self.remaining();
            for _ in 0..attempts {
                if self.is_full() {
                    return;
                }
                let picked: Vec<usize> = candidates.choose_multiple(rng, 2).copied().collect();
                self.offer(picked[0], picked[1]);
            }
        }

        let fresh: Vec<Pair> = all_pairs(candidates)
            .filter(|p| self.is_fresh(p.first(), p.second()))
            .collect();
        let needed = self.remaining();
        let picked: Vec<Pair> = fresh.choose_multiple(rng, needed).copied().collect();
        for pair in picked {
            self.offer(pair.first(), pair.second());
        }
    }

    /// Fill with random repeats of exhausted pairs; returns how many were added
    pub fn fill_repeats<R: Rng + ?Sized>(&mut self, candidates: &[usize], rng: &mut R) -> usize {
        if self.is_full() {
            return 0;
        }
        let mut repeats: Vec<Pair> = all_pairs(candidates)
            .filter(|p| self.exhausted.contains(p) && !self.seen.contains(p))
            .collect();
        repeats.shuffle(rng);
        let mut added = 0;
        for pair in repeats.into_iter().take(self.remaining()) {
            self.seen.insert(pair);
            self.chosen.push(pair);
            added += 1;
        }
        added
    }

    pub fn finish(self) -> Vec<Pair> {
        self.chosen
    }
}

/// Every unordered pair over `candidates`, in canonical candidate order
pub(crate) fn all_pairs(candidates: &[usize]) -> impl Iterator<Item = Pair> + '_ {
    (0..candidates.len()).flat_map(move |a| {
        ((a + 1)..candidates.len()).filter_map(move |b| Pair::new(candidates[a], candidates[b]).ok())
    })
}

/// Sort items by descending score, ties by ascending index
pub(crate) fn order_by_score(items: &[usize], score: impl Fn(usize) -> f64) -> Vec<usize> {
    let mut scored: Vec<(usize, f64)> = items.iter().map(|&i| (i, score(i))).collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    scored.into_iter().map(|(i, _)| i).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offer_rejects_exhausted_and_duplicates() {
        let exhausted: PairSet = [Pair::new(0, 1).unwrap()].into_iter().collect();
        let mut builder = BatchBuilder::new(&exhausted, 3);
        assert!(!builder.offer(1, 0));
        assert!(builder.offer(2, 0));
        assert!(!builder.offer(0, 2));
        assert!(!builder.offer(3, 3));
        assert_eq!(builder.remaining(), 2);
    }

    #[test]
    fn test_rank_order_enumeration() {
        let exhausted = PairSet::new();
        let mut builder = BatchBuilder::new(&exhausted, 4);
        builder.offer_in_rank_order(&[7, 3, 5, 1]);
        let pairs: Vec<_> = builder.finish().iter().map(|p| p.as_tuple()).collect();
        assert_eq!(pairs, vec![(3, 7), (5, 7), (3, 5), (1, 7)]);
    }

    #[test]
    fn test_fill_random_fresh_exact_count() {
        let exhausted = PairSet::new();
        let mut builder = BatchBuilder::new(&exhausted, 10);
        let mut rng = StdRng::seed_from_u64(42);
        builder.fill_random_fresh(&[0, 1, 2, 3, 4], &mut rng);
        let pairs = builder.finish();
        assert_eq!(pairs.len(), 10);
        let unique: BTreeSet<_> = pairs.iter().collect();
        assert_eq!(unique.len(), 10);
    }

    #[test]
    fn test_repeats_only_when_fresh_run_out() {
        let exhausted: PairSet = all_pairs(&[0, 1, 2]).take(2).collect();
        let mut builder = BatchBuilder::new(&exhausted, 3);
        let mut rng = StdRng::seed_from_u64(1);
        builder.fill_random_fresh(&[0, 1, 2], &mut rng);
        assert_eq!(builder.remaining(), 2);
        assert_eq!(builder.fill_repeats(&[0, 1, 2], &mut rng), 2);
        assert_eq!(builder.finish().len(), 3);
    }

    #[test]
    fn test_order_by_score() {
        let order = order_by_score(&[0, 1, 2, 3], |i| [0.2, 0.9, 0.2, 0.5][i]);
        assert_eq!(order, vec![1, 3, 0, 2]);
    }
}
