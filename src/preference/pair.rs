//! Canonical unordered pairs and judgment outcomes

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::error::{PboError, PboResult};

/// Unordered pair of distinct item indices, stored with `first < second`
///
/// `(i, j)` and `(j, i)` always map to the same `Pair`, so a pair can never
/// appear twice in a log or batch under different orderings.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(try_from = "(usize, usize)", into = "(usize, usize)")]
pub struct Pair {
    first: usize,
    second: usize,
}

impl Pair {
    /// Create a canonical pair from two distinct indices in any order
    pub fn new(i: usize, j: usize) -> PboResult<Self> {
        Self::canonical(i, j).map(|(pair, _)| pair)
    }

    /// Canonicalize `(i, j)`, also reporting whether the order was swapped
    pub fn canonical(i: usize, j: usize) -> PboResult<(Self, bool)> {
        match i.cmp(&j) {
            std::cmp::Ordering::Less => Ok((Self { first: i, second: j }, false)),
            std::cmp::Ordering::Greater => Ok((Self { first: j, second: i }, true)),
            std::cmp::Ordering::Equal => Err(PboError::Validation(format!(
                "pair ({}, {}) compares an item with itself",
                i, j
            ))),
        }
    }

    /// Smaller index
    pub fn first(&self) -> usize {
        self.first
    }

    /// Larger index
    pub fn second(&self) -> usize {
        self.second
    }

    /// Indices as a tuple `(first, second)`
    pub fn as_tuple(&self) -> (usize, usize) {
        (self.first, self.second)
    }

    /// Returns true if `item` is one of the two members
    pub fn contains(&self, item: usize) -> bool {
        self.first == item || self.second == item
    }
}

impl TryFrom<(usize, usize)> for Pair {
    type Error = String;

    fn try_from((i, j): (usize, usize)) -> Result<Self, Self::Error> {
        Pair::new(i, j).map_err(|e| e.to_string())
    }
}

impl From<Pair> for (usize, usize) {
    fn from(pair: Pair) -> Self {
        pair.as_tuple()
    }
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.first, self.second)
    }
}

/// Outcome of judging a pair, relative to the order the pair was presented in
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The first item of the presented pair won
    PrefersFirst,
    /// The second item of the presented pair won
    PrefersSecond,
    /// Judged equal; kept in the log, excluded from training
    Tie,
    /// Not judged; kept in the log, excluded from training
    Skip,
}

impl Outcome {
    /// Binary label convention: 1 means the first item won, 0 the second
    pub fn from_label(label: u8) -> Option<Self> {
        match label {
            1 => Some(Self::PrefersFirst),
            0 => Some(Self::PrefersSecond),
            _ => None,
        }
    }

    /// Outcome as seen from the reversed pair
    pub fn flipped(self) -> Self {
        match self {
            Self::PrefersFirst => Self::PrefersSecond,
            Self::PrefersSecond => Self::PrefersFirst,
            other => other,
        }
    }

    /// Returns true for a clear winner (usable for training)
    pub fn is_definitive(self) -> bool {
        matches!(self, Self::PrefersFirst | Self::PrefersSecond)
    }

    /// `Some(true)` if the first item won, `Some(false)` if the second did
    pub fn first_wins(self) -> Option<bool> {
        match self {
            Self::PrefersFirst => Some(true),
            Self::PrefersSecond => Some(false),
            Self::Tie | Self::Skip => None,
        }
    }
}

/// Set of canonical pairs
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairSet {
    pairs: BTreeSet<Pair>,
}

impl PairSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a pair; returns false if it was already present
    pub fn insert(&mut self, pair: Pair) -> bool {
        self.pairs.insert(pair)
    }

    /// Remove a pair; returns true if it was present
    pub fn remove(&mut self, pair: &Pair) -> bool {
        self.pairs.remove(pair)
    }

    /// Membership test
    pub fn contains(&self, pair: &Pair) -> bool {
        self.pairs.contains(pair)
    }

    /// Number of pairs
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Returns true if there are no pairs
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Iterate in canonical order
    pub fn iter(&self) -> impl Iterator<Item = &Pair> {
        self.pairs.iter()
    }

    /// Number of members whose both items are in `candidates`
    pub fn count_within(&self, candidates: &[usize]) -> usize {
        let members: BTreeSet<usize> = candidates.iter().copied().collect();
        self.pairs
            .iter()
            .filter(|p| members.contains(&p.first) && members.contains(&p.second))
            .count()
    }
}

impl FromIterator<Pair> for PairSet {
    fn from_iter<T: IntoIterator<Item = Pair>>(iter: T) -> Self {
        Self {
            pairs: iter.into_iter().collect(),
        }
    }
}

/// Number of unordered pairs over `n` items
pub fn pair_count(n: usize) -> usize {
    n * n.saturating_sub(1) / 2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_ordering() {
        let (a, swapped_a) = Pair::canonical(3, 1).unwrap();
        let (b, swapped_b) = Pair::canonical(1, 3).unwrap();
        assert_eq!(a, b);
        assert!(swapped_a);
        assert!(!swapped_b);
        assert_eq!(a.as_tuple(), (1, 3));
    }

    #[test]
    fn test_self_pair_rejected() {
        assert!(matches!(Pair::new(2, 2), Err(PboError::Validation(_))));
    }

    #[test]
    fn test_pair_serializes_as_tuple() {
        let pair = Pair::new(4, 2).unwrap();
        assert_eq!(serde_json::to_string(&pair).unwrap(), "[2,4]");
        let back: Pair = serde_json::from_str("[4,2]").unwrap();
        assert_eq!(back, pair);
        assert!(serde_json::from_str::<Pair>("[1,1]").is_err());
    }

    #[test]
    fn test_outcome_flip() {
        assert_eq!(Outcome::PrefersFirst.flipped(), Outcome::PrefersSecond);
        assert_eq!(Outcome::Tie.flipped(), Outcome::Tie);
        assert_eq!(Outcome::Skip.first_wins(), None);
        assert_eq!(Outcome::from_label(1), Some(Outcome::PrefersFirst));
        assert_eq!(Outcome::from_label(7), None);
    }

    #[test]
    fn test_pair_set() {
        let mut set = PairSet::new();
        assert!(set.insert(Pair::new(0, 1).unwrap()));
        assert!(!set.insert(Pair::new(1, 0).unwrap()));
        assert!(set.insert(Pair::new(2, 5).unwrap()));
        assert_eq!(set.len(), 2);
        assert_eq!(set.count_within(&[0, 1, 2]), 1);
    }

    #[test]
    fn test_pair_count() {
        assert_eq!(pair_count(0), 0);
        assert_eq!(pair_count(1), 0);
        assert_eq!(pair_count(4), 6);
        assert_eq!(pair_count(10), 45);
    }
}
