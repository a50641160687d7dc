//! Property-based tests for pbo-rank
//!
//! Uses proptest to verify invariants of pairs, batches, the model and the
//! ranking engine.

use pbo_rank::prelude::*;
use pbo_rank::preference::LabeledPair;
use proptest::prelude::*;

/// Well-separated pool: item `i` sits near `(i, offset_i)`
fn spread_pool(offsets: &[f64]) -> FeatureMatrix {
    let rows: Vec<Vec<f64>> = offsets
        .iter()
        .enumerate()
        .map(|(i, &o)| vec![i as f64 + 0.25 * o, o])
        .collect();
    FeatureMatrix::from_rows(&rows).unwrap()
}

fn random_loop(n_items: usize, seed: u64) -> ActiveLearningLoop {
    let offsets: Vec<f64> = (0..n_items).map(|i| ((i * 7) % 5) as f64 * 0.3).collect();
    let mut pbo = ActiveLearningLoop::new(LoopConfig::default().acquisition("random").seed(seed))
        .unwrap();
    pbo.bind_pool(spread_pool(&offsets)).unwrap();
    pbo
}

proptest! {
    // ==================== Pair Properties ====================

    #[test]
    fn canonical_pair_is_ordered(i in 0usize..1000, j in 0usize..1000) {
        prop_assume!(i != j);
        let (pair, swapped) = Pair::canonical(i, j).unwrap();
        prop_assert!(pair.first() < pair.second());
        prop_assert_eq!(swapped, i > j);
        prop_assert_eq!(Pair::canonical(j, i).unwrap().0, pair);
    }

    #[test]
    fn observation_outcome_relative_to_canonical(i in 0usize..50, j in 0usize..50, first in any::<bool>()) {
        prop_assume!(i != j);
        let outcome = if first { Outcome::PrefersFirst } else { Outcome::PrefersSecond };
        let obs = PreferenceObservation::new(i, j, outcome, 1).unwrap();
        let (winner, loser) = obs.winner_loser().unwrap();
        if first {
            prop_assert_eq!((winner, loser), (i, j));
        } else {
            prop_assert_eq!((winner, loser), (j, i));
        }
    }

    // ==================== Batch Properties ====================

    #[test]
    fn batch_has_requested_distinct_pairs(n_items in 2usize..12, fraction in 0.0f64..=1.0, seed in any::<u64>()) {
        let total = n_items * (n_items - 1) / 2;
        let n_pairs = ((total as f64) * fraction).round() as usize;
        let mut pbo = random_loop(n_items, seed);

        let batch = pbo.get_next_batch(n_pairs).unwrap();
        prop_assert_eq!(batch.len(), n_pairs);
        let unique: std::collections::BTreeSet<_> = batch.iter().copied().collect();
        prop_assert_eq!(unique.len(), n_pairs);
        for pair in &batch {
            prop_assert!(pair.first() < pair.second());
            prop_assert!(pair.second() < n_items);
        }
    }

    #[test]
    fn oversized_batch_is_rejected(n_items in 2usize..8, extra in 1usize..5) {
        let total = n_items * (n_items - 1) / 2;
        let mut pbo = random_loop(n_items, 1);
        let result = pbo.get_next_batch(total + extra);
        prop_assert!(matches!(result, Err(PboError::Acquisition(_))));
    }

    // ==================== Loop Counter Properties ====================

    #[test]
    fn total_comparisons_tracks_log(
        n_items in 3usize..7,
        labels in prop::collection::vec(0u8..4, 1..6),
        seed in any::<u64>()
    ) {
        let mut pbo = random_loop(n_items, seed);
        let total = n_items * (n_items - 1) / 2;
        let n_pairs = labels.len().min(total);

        let before = pbo.get_progress().total_comparisons;
        let batch = pbo.get_next_batch(n_pairs).unwrap();
        let pairs: Vec<_> = batch.iter().map(|p| p.as_tuple()).collect();
        let outcomes: Vec<Outcome> = labels[..n_pairs]
            .iter()
            .map(|l| match l {
                0 => Outcome::PrefersFirst,
                1 => Outcome::PrefersSecond,
                2 => Outcome::Tie,
                _ => Outcome::Skip,
            })
            .collect();

        pbo.add_preferences(&pairs, &outcomes).unwrap();
        let progress = pbo.get_progress();
        prop_assert_eq!(progress.total_comparisons, before + n_pairs);
        prop_assert_eq!(progress.total_comparisons, pbo.preferences().len());
        prop_assert_eq!(progress.iteration, 1);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    // ==================== Model Properties ====================

    #[test]
    fn predictions_are_antisymmetric(
        offsets in prop::collection::vec(-1.0f64..1.0, 3..7),
        wins in prop::collection::vec(any::<bool>(), 6)
    ) {
        let features = spread_pool(&offsets);
        let n = features.n_items();
        let observations: Vec<LabeledPair> = (0..n - 1)
            .zip(wins.iter().cycle())
            .map(|(i, &first_wins)| LabeledPair {
                pair: Pair::new(i, i + 1).unwrap(),
                first_wins,
            })
            .collect();

        let model = PreferenceTrainer::new(TrainingConfig::default())
            .fit_with_fallback(&observations, &features, None, 1)
            .unwrap();

        for i in 0..n {
            prop_assert_eq!(model.predict_preference(i, i).unwrap(), 0.5);
            for j in 0..n {
                let p = model.predict_preference(i, j).unwrap();
                let q = model.predict_preference(j, i).unwrap();
                prop_assert!((0.0..=1.0).contains(&p));
                prop_assert!((p + q - 1.0).abs() < 1e-12, "p = {}, q = {}", p, q);
            }
        }
    }

    // ==================== Ranking Properties ====================

    #[test]
    fn ranking_is_a_scored_permutation(
        offsets in prop::collection::vec(-1.0f64..1.0, 3..8),
        wins in prop::collection::vec(any::<bool>(), 8)
    ) {
        let features = spread_pool(&offsets);
        let n = features.n_items();
        let observations: Vec<LabeledPair> = (0..n - 1)
            .zip(wins.iter().cycle())
            .map(|(i, &first_wins)| LabeledPair {
                pair: Pair::new(i, i + 1).unwrap(),
                first_wins,
            })
            .collect();

        let model = PreferenceTrainer::new(TrainingConfig::default())
            .fit_with_fallback(&observations, &features, None, 1)
            .unwrap();
        let ranker = CopelandRanker::default();
        let ranking = ranker.rank(&model).unwrap();

        prop_assert!(ranking.is_permutation());
        prop_assert_eq!(ranking.len(), n);
        for window in ranking.scores().windows(2) {
            prop_assert!(window[0] >= window[1]);
        }
        for &score in ranking.scores() {
            prop_assert!((0.0..=1.0).contains(&score));
        }
        prop_assert_eq!(ranker.rank(&model).unwrap(), ranking);
    }
}
