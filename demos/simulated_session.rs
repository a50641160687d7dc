//! Simulated Preference Session
//!
//! This demo ranks a pool of 20 items with a noisy simulated judge standing
//! in for a human. Judgments are collected in batches until the top of the
//! ranking stops changing, with the session saved to disk after every batch.
//! Halfway through, the loop is dropped and resumed from the store.
//!
//! Run with `RUST_LOG=pbo_rank=debug` for training and acquisition details.

use pbo_rank::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const N_ITEMS: usize = 20;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pbo_rank=info")),
        )
        .init();

    println!("=== Simulated Preference Session ===\n");

    // Items with three features each
    let mut rng = StdRng::seed_from_u64(7);
    let rows: Vec<Vec<f64>> = (0..N_ITEMS)
        .map(|_| (0..3).map(|_| rng.gen_range(-2.0..2.0)).collect())
        .collect();
    let features = FeatureMatrix::from_rows(&rows)?;

    // The judge prefers feature 0, dislikes feature 2, and is a little noisy
    let mut oracle = LinearUtilityOracle::new(vec![1.0, 0.3, -0.6], 0.2, 11)?;
    let truth = oracle.true_ranking(&features)?;

    let dir = tempfile::tempdir()?;
    let store: Arc<dyn SessionStore> = Arc::new(FileSessionStore::new(dir.path())?);

    let config = LoopConfig::default()
        .acquisition("thompson_sampling")
        .n_pairs_per_iteration(8)
        .top_k(3)
        .convergence(4, 3)
        .max_iterations(40)
        .backups(16, 3);

    let mut pbo = ActiveLearningLoop::builder(config.clone())
        .store(store.clone())
        .build()?;
    pbo.bind_pool(features.clone())?;
    let session_id = pbo.session_id().to_string();
    println!("Session: {}", session_id);
    println!("Strategy: {}\n", pbo.strategy().name());

    let mut resumed = false;
    while !pbo.has_converged() {
        let batch = pbo.get_next_batch_default()?;
        let pairs: Vec<_> = batch.iter().map(|p| p.as_tuple()).collect();
        let outcomes = pairs
            .iter()
            .map(|&(i, j)| oracle.judge(i, j, &features))
            .collect::<PboResult<Vec<_>>>()?;
        let summary = pbo.add_preferences(&pairs, &outcomes)?;

        let progress = pbo.get_progress();
        println!(
            "Iteration {:3}: {:3} judgments, top-{} = {:?}",
            summary.iteration,
            progress.total_comparisons,
            config.top_k,
            progress.top_k
        );

        // Simulate a restart once
        if !resumed && summary.iteration == 3 {
            drop(pbo);
            println!("\n--- Resuming session from disk ---\n");
            pbo = ActiveLearningLoop::builder(config.clone())
                .store(store.clone())
                .session_id(session_id.clone())
                .build()?;
            pbo.load_session(&session_id)?;
            resumed = true;
        }
    }

    let progress = pbo.get_progress();
    println!("\nStopped: {:?}", progress.convergence_reason);

    let ranking = pbo.get_ranking()?;
    println!("\nLearned ranking (top 5):");
    for (position, (item, score)) in ranking.iter().take(5).enumerate() {
        let true_position = truth.iter().position(|&t| t == item).unwrap_or(N_ITEMS);
        println!(
            "  {}. item {:2}  copeland {:.3}  (true rank {})",
            position + 1,
            item,
            score,
            true_position + 1
        );
    }

    let hits = ranking
        .top_k(3)
        .iter()
        .filter(|&&item| truth[..3].contains(&item))
        .count();
    println!("\nTrue top-3 recovered: {}/3", hits);

    let info = store.get_info(&session_id)?;
    println!(
        "Stored session: {} comparisons, {} bytes, {} backups",
        info.total_comparisons,
        info.size_bytes,
        store.list_backups(&session_id)?.len()
    );

    Ok(())
}
