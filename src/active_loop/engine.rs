//! Active learning loop
//!
//! The loop owns one session's in-memory state and drives the cycle
//!
//! ```text
//! get_next_batch -> (caller asks an oracle) -> add_preferences
//!     -> retrain on full history -> re-rank -> convergence check -> persist
//! ```
//!
//! Ingestion is transactional. The next session state is built on a copy,
//! persisted if a store is attached, and only then committed, so a failed
//! retrain or save leaves the previous model, ranking and counters intact.

use chrono::Utc;
use rand::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;

use super::state::{IterationSummary, LoopState, Progress};
use crate::acquisition::{AcquisitionRegistry, AcquisitionStrategy, SelectionContext};
use crate::config::LoopConfig;
use crate::convergence::{ConvergenceDetector, ConvergenceStatus};
use crate::error::{PboError, PboResult, PersistenceError};
use crate::model::{PreferenceModel, PreferenceTrainer, MIN_DISTINCT_OBSERVATIONS};
use crate::pool::FeatureMatrix;
use crate::preference::{Outcome, Pair, PreferenceLog, PreferenceObservation};
use crate::ranking::{CopelandRanker, Ranking};
use crate::session::{generate_session_id, is_valid_id, Session, SessionStore};

/// Seed for the batch issued after `batches_issued` earlier batches
fn batch_seed(seed: u64, batches_issued: usize) -> u64 {
    seed ^ (batches_issued as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

/// Orchestrates acquisition, training, ranking, convergence and persistence
///
/// # Example
///
/// ```rust,ignore
/// use pbo_rank::prelude::*;
///
/// let mut pbo = ActiveLearningLoop::builder(LoopConfig::default().top_k(3)).build()?;
/// pbo.bind_pool(features)?;
///
/// while !pbo.has_converged() {
///     let pairs = pbo.get_next_batch_default()?;
///     let outcomes: Vec<Outcome> = pairs.iter().map(|p| ask_user(p)).collect();
///     let answered: Vec<(usize, usize)> = pairs.iter().map(|p| p.as_tuple()).collect();
///     pbo.add_preferences(&answered, &outcomes)?;
/// }
/// println!("{:?}", pbo.get_ranking()?.order());
/// ```
pub struct ActiveLearningLoop {
    config: LoopConfig,
    registry: AcquisitionRegistry,
    strategy: AcquisitionStrategy,
    store: Option<Arc<dyn SessionStore>>,
    detector: ConvergenceDetector,
    ranker: CopelandRanker,
    session: Session,
    model: Option<PreferenceModel>,
    state: LoopState,
}

impl std::fmt::Debug for ActiveLearningLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveLearningLoop")
            .field("session", &self.session.id)
            .field("strategy", &self.strategy)
            .field("state", &self.state)
            .field("iteration", &self.session.iteration)
            .field("total_comparisons", &self.session.total_comparisons)
            .field("has_store", &self.store.is_some())
            .finish()
    }
}

impl ActiveLearningLoop {
    /// Start building a loop
    pub fn builder(config: LoopConfig) -> ActiveLearningLoopBuilder {
        ActiveLearningLoopBuilder::new(config)
    }

    /// Loop with the default registry and no store
    pub fn new(config: LoopConfig) -> PboResult<Self> {
        Self::builder(config).build()
    }

    /// Resume from a session record
    pub fn from_session(
        session: Session,
        registry: AcquisitionRegistry,
        store: Option<Arc<dyn SessionStore>>,
    ) -> PboResult<Self> {
        let config = session.config.clone();
        config.validate()?;
        let strategy = registry.get(&config.acquisition, &config.acquisition_params)?;

        check_record(&session)?;

        let model = match &session.model_checkpoint {
            Some(checkpoint) => Some(PreferenceModel::from_checkpoint(checkpoint.clone())?),
            None => None,
        };

        let state = if session.pool.is_none() {
            LoopState::Uninitialized
        } else if session.converged {
            LoopState::Converged
        } else {
            LoopState::Collecting
        };

        Ok(Self {
            detector: ConvergenceDetector::from_loop(&config),
            ranker: CopelandRanker::new(config.ranking.clone()),
            config,
            registry,
            strategy,
            store,
            session,
            model,
            state,
        })
    }

    /// Get the configuration
    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    /// Active acquisition strategy
    pub fn strategy(&self) -> &AcquisitionStrategy {
        &self.strategy
    }

    /// Current lifecycle state
    pub fn state(&self) -> &LoopState {
        &self.state
    }

    /// Session identifier
    pub fn session_id(&self) -> &str {
        &self.session.id
    }

    /// Full session record as it would be persisted
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Latest trained model
    pub fn model(&self) -> Option<&PreferenceModel> {
        self.model.as_ref()
    }

    /// Pairs issued and not yet answered
    pub fn outstanding_pairs(&self) -> &[Pair] {
        &self.session.outstanding
    }

    /// Judgment log
    pub fn preferences(&self) -> &PreferenceLog {
        &self.session.preferences
    }

    /// Every recorded judgment, ties and skips included
    pub fn export_preferences(&self) -> Vec<PreferenceObservation> {
        self.session.preferences.as_slice().to_vec()
    }

    /// Bind the item pool; moves `Uninitialized` to `Collecting`
    pub fn bind_pool(&mut self, features: FeatureMatrix) -> PboResult<()> {
        if self.state != LoopState::Uninitialized {
            return Err(PboError::InvalidState(format!(
                "pool already bound (state: {})",
                self.state
            )));
        }

        let mut next = self.session.clone();
        next.pool = Some(features);
        next.updated_at = Utc::now();
        if let Some(store) = &self.store {
            store.save(&next)?;
        }

        let n_items = next.pool.as_ref().map(FeatureMatrix::n_items).unwrap_or(0);
        self.session = next;
        self.state = LoopState::Collecting;
        tracing::info!(
            session = %self.session.id,
            n_items,
            strategy = self.strategy.name(),
            "pool bound"
        );
        Ok(())
    }

    fn pool(&self) -> PboResult<&FeatureMatrix> {
        self.session
            .pool
            .as_ref()
            .ok_or_else(|| PboError::InvalidState("no pool bound".into()))
    }

    fn ensure_accepting(&self, operation: &str) -> PboResult<()> {
        if self.state.accepts_judgments() {
            Ok(())
        } else {
            Err(PboError::InvalidState(format!(
                "{} not allowed in state {}",
                operation, self.state
            )))
        }
    }

    /// Choose the next `n_pairs` pairs to judge
    ///
    /// The returned pairs replace the outstanding batch that
    /// [`ActiveLearningLoop::add_preferences`] validates against.
    pub fn get_next_batch(&mut self, n_pairs: usize) -> PboResult<Vec<Pair>> {
        self.ensure_accepting("get_next_batch")?;
        let pool = self.pool()?;
        let candidates = pool.indices();
        let exhausted = self.session.preferences.exhausted_pairs();
        let context = SelectionContext {
            exhausted: &exhausted,
            ranking: self.session.ranking.as_ref(),
        };
        let mut rng = StdRng::seed_from_u64(batch_seed(
            self.config.seed,
            self.session.batches_issued,
        ));

        let batch = self.strategy.select(
            self.model.as_ref(),
            &candidates,
            n_pairs,
            &context,
            &mut rng,
        )?;

        self.session.batches_issued += 1;
        self.session.outstanding = batch.pairs.clone();
        tracing::info!(
            session = %self.session.id,
            strategy = self.strategy.name(),
            pairs = batch.pairs.len(),
            repeated = batch.repeated,
            cold_start = batch.cold_start,
            "batch issued"
        );
        Ok(batch.pairs)
    }

    /// [`ActiveLearningLoop::get_next_batch`] with the configured batch size
    pub fn get_next_batch_default(&mut self) -> PboResult<Vec<Pair>> {
        self.get_next_batch(self.config.n_pairs_per_iteration)
    }

    /// Ingest judgments for pairs from the outstanding batch
    ///
    /// Pairs may be given in either order; each outcome is relative to the
    /// pair as given. On success the model is retrained on the full
    /// definitive history, the ranking and convergence history are updated,
    /// and the session is persisted if a store is attached.
    ///
    /// # Errors
    ///
    /// - `Validation` if lengths differ, the call is empty, a pair is
    ///   repeated, or a pair is not in the outstanding batch
    /// - `ModelTraining` if training fails even with the fallback
    ///   configuration; the loop moves to `Failed`
    /// - `Persistence` if the store rejects the save; nothing is committed
    pub fn add_preferences(
        &mut self,
        pairs: &[(usize, usize)],
        outcomes: &[Outcome],
    ) -> PboResult<IterationSummary> {
        self.ensure_accepting("add_preferences")?;
        let canonical = self.validate_answers(pairs, outcomes)?;

        let mut next = self.session.clone();
        let iteration = next.iteration + 1;
        for (&(i, j), &outcome) in pairs.iter().zip(outcomes) {
            next.preferences.record(i, j, outcome, iteration)?;
        }
        next.outstanding.retain(|pair| !canonical.contains(pair));
        next.iteration = iteration;
        next.total_comparisons = next.preferences.len();
        let definitive = outcomes.iter().filter(|o| o.is_definitive()).count();
        tracing::info!(
            session = %next.id,
            iteration,
            pairs = pairs.len(),
            definitive,
            "preferences ingested"
        );

        let previous_state = self.state.clone();
        self.state = LoopState::Training;
        let trained = match self.retrain(&next, iteration) {
            Ok(trained) => trained,
            Err(err) => {
                self.state = match &err {
                    PboError::ModelTraining(_) => LoopState::Failed {
                        reason: err.to_string(),
                    },
                    _ => previous_state,
                };
                tracing::warn!(session = %next.id, error = %err, "retraining failed");
                return Err(err);
            }
        };

        let report = match &trained {
            Some((model, ranking)) => {
                let k = self.config.top_k.min(ranking.len());
                next.history.record(iteration, ranking.top_k(k));
                next.model_checkpoint = Some(model.checkpoint());
                next.ranking = Some(ranking.clone());
                Some(model.report().clone())
            }
            None => {
                tracing::debug!(
                    session = %next.id,
                    distinct = next.preferences.distinct_definitive(),
                    required = MIN_DISTINCT_OBSERVATIONS,
                    "not enough definitive observations to train"
                );
                None
            }
        };

        let n_items = next.pool.as_ref().map(FeatureMatrix::n_items).unwrap_or(0);
        if !next.converged {
            if let ConvergenceStatus::Converged(reason) =
                self.detector.check(&next.history, iteration, n_items)
            {
                tracing::info!(session = %next.id, iteration, reason = ?reason, "converged");
                next.converged = true;
                next.convergence_reason = Some(reason);
            }
        }
        next.updated_at = Utc::now();

        if let Err(err) = self.persist(&mut next) {
            self.state = previous_state;
            tracing::warn!(session = %next.id, error = %err, "session save failed; state not committed");
            return Err(err);
        }

        let converged = next.converged;
        self.session = next;
        if let Some((model, _)) = trained {
            self.model = Some(model);
        }
        self.state = if converged {
            LoopState::Converged
        } else {
            LoopState::Collecting
        };

        Ok(IterationSummary {
            iteration,
            ingested: pairs.len(),
            definitive,
            training: report,
            converged,
        })
    }

    fn validate_answers(
        &self,
        pairs: &[(usize, usize)],
        outcomes: &[Outcome],
    ) -> PboResult<BTreeSet<Pair>> {
        if pairs.len() != outcomes.len() {
            return Err(PboError::Validation(format!(
                "{} pairs but {} outcomes",
                pairs.len(),
                outcomes.len()
            )));
        }
        if pairs.is_empty() {
            return Err(PboError::Validation("no judgments given".into()));
        }

        let n_items = self.pool()?.n_items();
        let mut seen = BTreeSet::new();
        for &(i, j) in pairs {
            if i >= n_items || j >= n_items {
                return Err(PboError::Validation(format!(
                    "pair ({}, {}) is outside a pool of {}",
                    i, j, n_items
                )));
            }
            let (pair, _) = Pair::canonical(i, j)?;
            if !self.session.outstanding.contains(&pair) {
                return Err(PboError::Validation(format!(
                    "pair {} was not in the outstanding batch",
                    pair
                )));
            }
            if !seen.insert(pair) {
                return Err(PboError::Validation(format!(
                    "pair {} answered more than once",
                    pair
                )));
            }
        }
        Ok(seen)
    }

    /// Fit and rank on the full history of `next`; `None` while data is too thin
    fn retrain(
        &self,
        next: &Session,
        iteration: usize,
    ) -> PboResult<Option<(PreferenceModel, Ranking)>> {
        if next.preferences.distinct_definitive() < MIN_DISTINCT_OBSERVATIONS {
            return Ok(None);
        }
        let pool = next
            .pool
            .as_ref()
            .ok_or_else(|| PboError::InvalidState("no pool bound".into()))?;
        let labeled = next.preferences.labeled_pairs();

        let trainer = PreferenceTrainer::new(self.config.training.clone()).seed(self.config.seed);
        let scaler = self.model.as_ref().map(|m| m.scaler());
        let model = trainer.fit_with_fallback(&labeled, pool, scaler, iteration)?;
        let report = model.report();
        tracing::info!(
            iteration,
            epochs = report.epochs,
            final_loss = report.final_loss,
            stop_reason = ?report.stop_reason,
            num_inducing = report.num_inducing,
            used_fallback = report.used_fallback,
            "model trained"
        );

        let ranking = self.ranker.rank(&model)?;
        Ok(Some((model, ranking)))
    }

    fn persist(&self, next: &mut Session) -> PboResult<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        if store.auto_backup(next, self.config.backup_every, self.config.keep_backups)? {
            next.last_backup_comparisons = next.total_comparisons;
        }
        store.save(next)?;
        Ok(())
    }

    /// Current ranking of the whole pool
    ///
    /// Recomputed from the current model; identical model state always gives
    /// an identical ranking. Before any model exists every item scores 0 and
    /// the order is by index.
    pub fn get_ranking(&self) -> PboResult<Ranking> {
        let pool = self.pool()?;
        match &self.model {
            Some(model) => self.ranker.rank(model),
            None => Ok(Ranking::unranked(pool.n_items())),
        }
    }

    /// Read-only progress snapshot
    pub fn get_progress(&self) -> Progress {
        let top_k = self
            .session
            .history
            .latest()
            .map(|entry| entry.top_k.clone())
            .unwrap_or_default();
        Progress {
            iteration: self.session.iteration,
            total_comparisons: self.session.total_comparisons,
            converged: self.session.converged,
            state: self.state.clone(),
            max_iterations: self.config.max_iterations,
            top_k,
            convergence_reason: self.session.convergence_reason.clone(),
        }
    }

    /// Returns true once the stopping rule has fired
    pub fn has_converged(&self) -> bool {
        self.session.converged
    }

    fn require_store(&self) -> PboResult<Arc<dyn SessionStore>> {
        self.store
            .clone()
            .ok_or_else(|| PboError::Configuration("no session store attached".into()))
    }

    /// Persist the session, optionally under a new identifier
    ///
    /// Returns the identifier the session was saved under.
    pub fn save_session(&mut self, id: Option<&str>) -> PboResult<String> {
        let store = self.require_store()?;
        let mut record = self.session.clone();
        if let Some(id) = id {
            record.id = id.to_string();
        }
        record.updated_at = Utc::now();
        store.save(&record)?;
        tracing::info!(
            session = %record.id,
            comparisons = record.total_comparisons,
            iteration = record.iteration,
            "session saved"
        );
        let id = record.id.clone();
        self.session = record;
        Ok(id)
    }

    /// Replace this loop's state with a stored session
    ///
    /// The session's own configuration takes effect. Nothing changes if
    /// loading fails.
    pub fn load_session(&mut self, id: &str) -> PboResult<()> {
        let store = self.require_store()?;
        let session = store.load(id)?;
        let restored = Self::from_session(session, self.registry.clone(), Some(store))?;
        tracing::info!(
            session = %id,
            comparisons = restored.session.total_comparisons,
            iteration = restored.session.iteration,
            state = %restored.state,
            "session loaded"
        );
        *self = restored;
        Ok(())
    }
}

/// Reject records whose counters or indices contradict their own log
fn check_record(session: &Session) -> Result<(), PersistenceError> {
    let corrupt = |reason: String| PersistenceError::corrupt(session.id.clone(), reason);
    if session.total_comparisons != session.preferences.len() {
        return Err(corrupt(format!(
            "total_comparisons is {} but the log holds {} judgments",
            session.total_comparisons,
            session.preferences.len()
        )));
    }
    match (&session.pool, session.preferences.max_index()) {
        (None, Some(_)) => Err(corrupt("judgments recorded without an item pool".into())),
        (Some(pool), Some(max)) if max >= pool.n_items() => Err(corrupt(format!(
            "item {} is outside a pool of {}",
            max,
            pool.n_items()
        ))),
        _ => Ok(()),
    }
}

/// Builder for [`ActiveLearningLoop`]
pub struct ActiveLearningLoopBuilder {
    config: LoopConfig,
    registry: Option<AcquisitionRegistry>,
    store: Option<Arc<dyn SessionStore>>,
    session_id: Option<String>,
}

impl ActiveLearningLoopBuilder {
    /// Create a builder for `config`
    pub fn new(config: LoopConfig) -> Self {
        Self {
            config,
            registry: None,
            store: None,
            session_id: None,
        }
    }

    /// Acquisition registry (default: [`AcquisitionRegistry::with_defaults`])
    pub fn registry(mut self, registry: AcquisitionRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Persist sessions to `store`
    pub fn store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use a fixed session identifier instead of a generated one
    pub fn session_id(mut self, id: impl Into<String>) -> Self {
        self.session_id = Some(id.into());
        self
    }

    /// Validate the configuration and build an `Uninitialized` loop
    ///
    /// With a store attached and no fixed identifier, the session is created
    /// in the store.
    pub fn build(self) -> PboResult<ActiveLearningLoop> {
        self.config.validate()?;
        let registry = self
            .registry
            .unwrap_or_else(AcquisitionRegistry::with_defaults);
        let strategy = registry.get(&self.config.acquisition, &self.config.acquisition_params)?;

        let id = match (&self.session_id, &self.store) {
            (Some(id), _) if !is_valid_id(id) => {
                return Err(PboError::Configuration(format!(
                    "session id {:?} must be ASCII alphanumerics, '-' or single '_'",
                    id
                )));
            }
            (Some(id), _) => id.clone(),
            (None, Some(store)) => store.create(&self.config)?,
            (None, None) => generate_session_id(&self.config.session_prefix, Utc::now(), |_| false),
        };

        tracing::debug!(session = %id, strategy = strategy.name(), "loop created");
        Ok(ActiveLearningLoop {
            detector: ConvergenceDetector::from_loop(&self.config),
            ranker: CopelandRanker::new(self.config.ranking.clone()),
            session: Session::new(id, self.config.clone()),
            config: self.config,
            registry,
            strategy,
            store: self.store,
            model: None,
            state: LoopState::Uninitialized,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MemorySessionStore;

    fn chain_pool() -> FeatureMatrix {
        FeatureMatrix::from_rows(&[
            vec![3.0, 1.5],
            vec![2.0, 1.4],
            vec![1.0, 0.2],
            vec![0.0, 0.1],
        ])
        .unwrap()
    }

    fn answer_by_index(pairs: &[Pair]) -> (Vec<(usize, usize)>, Vec<Outcome>) {
        let answered = pairs.iter().map(|p| p.as_tuple()).collect();
        let outcomes = pairs.iter().map(|_| Outcome::PrefersFirst).collect();
        (answered, outcomes)
    }

    #[test]
    fn test_uninitialized_rejects_operations() {
        let mut pbo = ActiveLearningLoop::new(LoopConfig::default()).unwrap();
        assert_eq!(pbo.state(), &LoopState::Uninitialized);
        assert!(matches!(
            pbo.get_next_batch(2),
            Err(PboError::InvalidState(_))
        ));
        assert!(pbo.get_ranking().is_err());
    }

    #[test]
    fn test_unknown_strategy_rejected() {
        let result = ActiveLearningLoop::new(LoopConfig::default().acquisition("greedy"));
        assert!(matches!(result, Err(PboError::Configuration(_))));
    }

    #[test]
    fn test_fixed_session_id() {
        let pbo = ActiveLearningLoop::builder(LoopConfig::default())
            .session_id("study-1")
            .build()
            .unwrap();
        assert_eq!(pbo.session_id(), "study-1");

        for bad in ["", "a__b", "../escape"] {
            let result = ActiveLearningLoop::builder(LoopConfig::default())
                .session_id(bad)
                .build();
            assert!(matches!(result, Err(PboError::Configuration(_))), "{:?}", bad);
        }
    }

    #[test]
    fn test_bind_pool_twice_fails() {
        let mut pbo = ActiveLearningLoop::new(LoopConfig::default()).unwrap();
        pbo.bind_pool(chain_pool()).unwrap();
        assert_eq!(pbo.state(), &LoopState::Collecting);
        assert!(pbo.bind_pool(chain_pool()).is_err());
    }

    #[test]
    fn test_full_cycle_updates_counters() {
        let mut pbo = ActiveLearningLoop::new(LoopConfig::default().top_k(2)).unwrap();
        pbo.bind_pool(chain_pool()).unwrap();

        let batch = pbo.get_next_batch(6).unwrap();
        assert_eq!(batch.len(), 6);
        let (answered, outcomes) = answer_by_index(&batch);
        let summary = pbo.add_preferences(&answered, &outcomes).unwrap();

        assert_eq!(summary.iteration, 1);
        assert_eq!(summary.ingested, 6);
        assert!(summary.training.is_some());
        assert_eq!(pbo.get_progress().total_comparisons, 6);
        assert!(pbo.outstanding_pairs().is_empty());
        assert_eq!(pbo.get_ranking().unwrap().order(), &[0, 1, 2, 3]);
        assert_eq!(pbo.get_progress().top_k, vec![0, 1]);
    }

    #[test]
    fn test_pair_outside_batch_rejected() {
        let mut pbo = ActiveLearningLoop::new(LoopConfig::default()).unwrap();
        pbo.bind_pool(chain_pool()).unwrap();
        let batch = pbo.get_next_batch(1).unwrap();

        let other = if batch[0].as_tuple() == (0, 1) { (2, 3) } else { (0, 1) };
        let err = pbo
            .add_preferences(&[other], &[Outcome::PrefersFirst])
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(pbo.get_progress().total_comparisons, 0);
        assert_eq!(pbo.outstanding_pairs().len(), 1);
    }

    #[test]
    fn test_duplicate_and_length_mismatch_rejected() {
        let mut pbo = ActiveLearningLoop::new(LoopConfig::default()).unwrap();
        pbo.bind_pool(chain_pool()).unwrap();
        let batch = pbo.get_next_batch(2).unwrap();
        let (a, b) = batch[0].as_tuple();

        assert!(pbo
            .add_preferences(&[(a, b), (b, a)], &[Outcome::Tie, Outcome::Tie])
            .unwrap_err()
            .is_validation());
        assert!(pbo
            .add_preferences(&[(a, b)], &[])
            .unwrap_err()
            .is_validation());
        assert!(pbo.add_preferences(&[], &[]).unwrap_err().is_validation());
    }

    #[test]
    fn test_reversed_pair_accepted() {
        let mut pbo = ActiveLearningLoop::new(LoopConfig::default()).unwrap();
        pbo.bind_pool(chain_pool()).unwrap();
        let batch = pbo.get_next_batch(1).unwrap();
        let (a, b) = batch[0].as_tuple();

        pbo.add_preferences(&[(b, a)], &[Outcome::PrefersFirst])
            .unwrap();
        let log = pbo.export_preferences();
        assert_eq!(log.len(), 1);
        // stored against the canonical pair, so the outcome flips
        assert_eq!(log[0].outcome, Outcome::PrefersSecond);
        assert_eq!(log[0].winner_loser(), Some((b, a)));
    }

    #[test]
    fn test_ties_counted_but_not_trained() {
        let mut pbo = ActiveLearningLoop::new(LoopConfig::default()).unwrap();
        pbo.bind_pool(chain_pool()).unwrap();
        let batch = pbo.get_next_batch(3).unwrap();
        let answered: Vec<_> = batch.iter().map(|p| p.as_tuple()).collect();
        let outcomes = vec![Outcome::Tie, Outcome::Skip, Outcome::PrefersFirst];

        let summary = pbo.add_preferences(&answered, &outcomes).unwrap();
        assert_eq!(summary.definitive, 1);
        assert!(summary.training.is_none());
        assert!(pbo.model().is_none());
        assert_eq!(pbo.get_progress().total_comparisons, 3);
        assert_eq!(pbo.get_progress().iteration, 1);
        assert_eq!(pbo.get_ranking().unwrap(), Ranking::unranked(4));
    }

    #[test]
    fn test_batches_are_reproducible() {
        let config = LoopConfig::default().acquisition("random").seed(9);
        let mut a = ActiveLearningLoop::new(config.clone()).unwrap();
        let mut b = ActiveLearningLoop::new(config).unwrap();
        a.bind_pool(chain_pool()).unwrap();
        b.bind_pool(chain_pool()).unwrap();
        assert_eq!(a.get_next_batch(3).unwrap(), b.get_next_batch(3).unwrap());
        assert_eq!(a.get_next_batch(3).unwrap(), b.get_next_batch(3).unwrap());
    }

    #[test]
    fn test_max_iterations_converges() {
        let mut pbo = ActiveLearningLoop::new(LoopConfig::default().max_iterations(1)).unwrap();
        pbo.bind_pool(chain_pool()).unwrap();
        let batch = pbo.get_next_batch(1).unwrap();
        let (answered, outcomes) = answer_by_index(&batch);
        let summary = pbo.add_preferences(&answered, &outcomes).unwrap();
        assert!(summary.converged);
        assert!(pbo.has_converged());
        assert_eq!(pbo.state(), &LoopState::Converged);
        // batches are still available after convergence
        assert_eq!(pbo.get_next_batch(1).unwrap().len(), 1);
    }

    #[test]
    fn test_training_failure_moves_to_failed() {
        let training = crate::config::TrainingConfig::default()
            .max_epochs(50)
            .time_budget_ms(0);
        let mut pbo = ActiveLearningLoop::new(LoopConfig::default().training(training)).unwrap();
        pbo.bind_pool(chain_pool()).unwrap();
        let batch = pbo.get_next_batch(3).unwrap();
        let (answered, outcomes) = answer_by_index(&batch);

        let err = pbo.add_preferences(&answered, &outcomes).unwrap_err();
        assert!(matches!(err, PboError::ModelTraining(_)));
        assert!(matches!(pbo.state(), LoopState::Failed { .. }));
        // nothing committed
        assert_eq!(pbo.get_progress().total_comparisons, 0);
        assert_eq!(pbo.outstanding_pairs().len(), 3);
        assert!(pbo.get_next_batch(1).is_err());
    }

    #[test]
    fn test_save_and_load_session() {
        let store: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());
        let mut pbo = ActiveLearningLoop::builder(LoopConfig::default())
            .store(store.clone())
            .build()
            .unwrap();
        pbo.bind_pool(chain_pool()).unwrap();
        let batch = pbo.get_next_batch(4).unwrap();
        let (answered, outcomes) = answer_by_index(&batch);
        pbo.add_preferences(&answered, &outcomes).unwrap();

        let id = pbo.session_id().to_string();
        let ranking = pbo.get_ranking().unwrap();

        let mut other = ActiveLearningLoop::builder(LoopConfig::default())
            .store(store.clone())
            .build()
            .unwrap();
        other.load_session(&id).unwrap();
        assert_eq!(other.session_id(), id);
        assert_eq!(other.get_progress().total_comparisons, 4);
        assert_eq!(other.get_ranking().unwrap(), ranking);
        assert_eq!(other.state(), &LoopState::Collecting);
    }

    #[test]
    fn test_inconsistent_record_is_corrupt() {
        let store = Arc::new(MemorySessionStore::new());
        let mut pbo = ActiveLearningLoop::builder(LoopConfig::default())
            .store(store.clone())
            .build()
            .unwrap();
        pbo.bind_pool(chain_pool()).unwrap();
        let batch = pbo.get_next_batch(2).unwrap();
        let (answered, outcomes) = answer_by_index(&batch);
        pbo.add_preferences(&answered, &outcomes).unwrap();
        let id = pbo.session_id().to_string();
        let saved = store.load(&id).unwrap();

        let mut inflated = saved.clone();
        inflated.total_comparisons = 99;
        let mut shrunk = saved.clone();
        shrunk.pool = Some(FeatureMatrix::from_rows(&[vec![0.0], vec![1.0]]).unwrap());
        let mut poolless = saved;
        poolless.pool = None;

        for record in [inflated, shrunk, poolless] {
            store.put_raw(id.clone(), record.to_json().unwrap());
            let mut other = ActiveLearningLoop::builder(LoopConfig::default())
                .store(store.clone())
                .build()
                .unwrap();
            let before = other.session_id().to_string();
            let err = other.load_session(&id).unwrap_err();
            assert!(
                matches!(err, PboError::Persistence(PersistenceError::Corrupt { .. })),
                "unexpected error: {}",
                err
            );
            assert_eq!(other.session_id(), before);
            assert_eq!(other.get_progress().total_comparisons, 0);
        }
    }

    #[test]
    fn test_save_without_store_fails() {
        let mut pbo = ActiveLearningLoop::new(LoopConfig::default()).unwrap();
        assert!(matches!(
            pbo.save_session(None),
            Err(PboError::Configuration(_))
        ));
    }

    #[test]
    fn test_batch_seed_varies() {
        assert_ne!(batch_seed(42, 0), batch_seed(42, 1));
        assert_eq!(batch_seed(42, 3), batch_seed(42, 3));
    }
}
