//! Loop, training and ranking configuration
//!
//! Every field has a default, so a partial TOML or JSON document is enough:
//!
//! ```toml
//! acquisition = "ucb"
//! top_k = 3
//!
//! [acquisition_params]
//! beta = 1.5
//!
//! [training]
//! num_inducing = 32
//! optimizer = { kind = "adam", learning_rate = 0.05, batch_size = 16 }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{PboError, PboResult};
use crate::model::TrainingOptimizer;

/// Configuration of a single model fit
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Hard cap on optimization epochs
    pub max_epochs: usize,
    /// Consecutive epochs below `min_delta` improvement before stopping
    pub patience: usize,
    /// Minimum loss improvement that resets patience
    pub min_delta: f64,
    /// Upper bound on inducing points
    pub num_inducing: usize,
    /// Base RBF lengthscale; `None` uses the median distance heuristic
    pub lengthscale: Option<f64>,
    /// Base RBF output scale (signal variance)
    pub outputscale: f64,
    /// Select lengthscale and outputscale per fit from a grid around the bases
    pub learn_hyperparameters: bool,
    /// Diagonal jitter added before Cholesky factorization
    pub jitter: f64,
    /// Wall-clock budget per fit; exceeding it is a training failure
    pub time_budget_ms: Option<u64>,
    /// Optimization algorithm
    pub optimizer: TrainingOptimizer,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            max_epochs: 100,
            patience: 10,
            min_delta: 1e-4,
            num_inducing: 64,
            lengthscale: None,
            outputscale: 1.0,
            learn_hyperparameters: true,
            jitter: 1e-6,
            time_budget_ms: None,
            optimizer: TrainingOptimizer::default(),
        }
    }
}

impl TrainingConfig {
    /// Reduced-capacity configuration used to retry a failed fit
    ///
    /// Halves the inducing points, raises jitter a hundredfold and switches
    /// to the deterministic Newton optimizer.
    pub fn fallback(&self) -> Self {
        Self {
            num_inducing: (self.num_inducing / 2).max(1),
            jitter: self.jitter * 100.0,
            optimizer: TrainingOptimizer::default(),
            ..self.clone()
        }
    }

    /// Set maximum epochs
    pub fn max_epochs(mut self, epochs: usize) -> Self {
        self.max_epochs = epochs;
        self
    }

    /// Set early-stopping patience
    pub fn patience(mut self, patience: usize) -> Self {
        self.patience = patience;
        self
    }

    /// Set number of inducing points
    pub fn num_inducing(mut self, m: usize) -> Self {
        self.num_inducing = m;
        self
    }

    /// Set a fixed lengthscale
    pub fn lengthscale(mut self, lengthscale: f64) -> Self {
        self.lengthscale = Some(lengthscale);
        self
    }

    /// Set the base outputscale
    pub fn outputscale(mut self, outputscale: f64) -> Self {
        self.outputscale = outputscale;
        self
    }

    /// Enable or disable per-fit hyperparameter selection
    pub fn learn_hyperparameters(mut self, learn: bool) -> Self {
        self.learn_hyperparameters = learn;
        self
    }

    /// Set the per-fit time budget
    pub fn time_budget_ms(mut self, budget: u64) -> Self {
        self.time_budget_ms = Some(budget);
        self
    }

    /// Set the optimizer
    pub fn optimizer(mut self, optimizer: TrainingOptimizer) -> Self {
        self.optimizer = optimizer;
        self
    }

    /// Check ranges
    pub fn validate(&self) -> PboResult<()> {
        if self.max_epochs == 0 {
            return Err(PboError::Configuration("max_epochs must be at least 1".into()));
        }
        if self.num_inducing == 0 {
            return Err(PboError::Configuration(
                "num_inducing must be at least 1".into(),
            ));
        }
        if !(self.outputscale.is_finite() && self.outputscale > 0.0) {
            return Err(PboError::Configuration(format!(
                "outputscale must be positive, got {}",
                self.outputscale
            )));
        }
        if let Some(ls) = self.lengthscale {
            if !(ls.is_finite() && ls > 0.0) {
                return Err(PboError::Configuration(format!(
                    "lengthscale must be positive, got {}",
                    ls
                )));
            }
        }
        if !(self.jitter.is_finite() && self.jitter >= 0.0) {
            return Err(PboError::Configuration(format!(
                "jitter must be non-negative, got {}",
                self.jitter
            )));
        }
        if !(self.min_delta.is_finite() && self.min_delta >= 0.0) {
            return Err(PboError::Configuration(format!(
                "min_delta must be non-negative, got {}",
                self.min_delta
            )));
        }
        self.optimizer.validate()
    }
}

/// Ranking engine configuration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    /// Opponents sampled per item; `None` compares against the whole pool
    pub max_opponents: Option<usize>,
    /// Seed for opponent sampling
    pub seed: u64,
}

/// Configuration of an active learning session
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    /// Acquisition strategy registry name
    pub acquisition: String,
    /// Keyword parameters passed to the strategy factory
    pub acquisition_params: BTreeMap<String, f64>,
    /// Iteration count at which the session counts as converged
    pub max_iterations: usize,
    /// Default batch size
    pub n_pairs_per_iteration: usize,
    /// Number of recent top-K sets inspected for stability
    pub convergence_window: usize,
    /// How many of those sets must agree with the latest one
    pub convergence_threshold: usize,
    /// Size of the top set tracked for convergence
    pub top_k: usize,
    /// Seed for acquisition and training randomness
    pub seed: u64,
    /// Prefix for generated session identifiers
    pub session_prefix: String,
    /// Write a backup every this many comparisons
    pub backup_every: usize,
    /// Backups retained per session
    pub keep_backups: usize,
    /// Model fit settings
    pub training: TrainingConfig,
    /// Ranking engine settings
    pub ranking: RankingConfig,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            acquisition: "thompson_sampling".to_string(),
            acquisition_params: BTreeMap::new(),
            max_iterations: 100,
            n_pairs_per_iteration: 10,
            convergence_window: 5,
            convergence_threshold: 4,
            top_k: 5,
            seed: 42,
            session_prefix: "session".to_string(),
            backup_every: 10,
            keep_backups: 5,
            training: TrainingConfig::default(),
            ranking: RankingConfig::default(),
        }
    }
}

impl LoopConfig {
    /// Parse a TOML document and validate it
    pub fn from_toml_str(source: &str) -> PboResult<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| PboError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> PboResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            PboError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&source)
    }

    /// Set acquisition strategy by registry name
    pub fn acquisition(mut self, name: impl Into<String>) -> Self {
        self.acquisition = name.into();
        self
    }

    /// Set one acquisition parameter
    pub fn acquisition_param(mut self, key: impl Into<String>, value: f64) -> Self {
        self.acquisition_params.insert(key.into(), value);
        self
    }

    /// Set maximum iterations
    pub fn max_iterations(mut self, iterations: usize) -> Self {
        self.max_iterations = iterations;
        self
    }

    /// Set default batch size
    pub fn n_pairs_per_iteration(mut self, n: usize) -> Self {
        self.n_pairs_per_iteration = n;
        self
    }

    /// Set convergence window and threshold
    pub fn convergence(mut self, window: usize, threshold: usize) -> Self {
        self.convergence_window = window;
        self.convergence_threshold = threshold;
        self
    }

    /// Set top-K
    pub fn top_k(mut self, k: usize) -> Self {
        self.top_k = k;
        self
    }

    /// Set random seed
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set backup cadence and retention
    pub fn backups(mut self, every: usize, keep: usize) -> Self {
        self.backup_every = every;
        self.keep_backups = keep;
        self
    }

    /// Set training configuration
    pub fn training(mut self, training: TrainingConfig) -> Self {
        self.training = training;
        self
    }

    /// Set ranking configuration
    pub fn ranking(mut self, ranking: RankingConfig) -> Self {
        self.ranking = ranking;
        self
    }

    /// Check ranges; the acquisition name is checked against a registry separately
    pub fn validate(&self) -> PboResult<()> {
        if self.top_k == 0 {
            return Err(PboError::Configuration("top_k must be at least 1".into()));
        }
        if self.convergence_window == 0 {
            return Err(PboError::Configuration(
                "convergence_window must be at least 1".into(),
            ));
        }
        if self.convergence_threshold == 0 || self.convergence_threshold > self.convergence_window
        {
            return Err(PboError::Configuration(format!(
                "convergence_threshold must be in 1..={}, got {}",
                self.convergence_window, self.convergence_threshold
            )));
        }
        if self.max_iterations == 0 {
            return Err(PboError::Configuration(
                "max_iterations must be at least 1".into(),
            ));
        }
        if self.backup_every == 0 {
            return Err(PboError::Configuration(
                "backup_every must be at least 1".into(),
            ));
        }
        // "__" separates the id from the counters in backup names
        let prefix = &self.session_prefix;
        if prefix.is_empty()
            || prefix.contains("__")
            || prefix.ends_with('_')
            || !prefix
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(PboError::Configuration(format!(
                "session_prefix must be ASCII alphanumerics, '-' or single '_' not at the end, got {:?}",
                prefix
            )));
        }
        if self.ranking.max_opponents == Some(0) {
            return Err(PboError::Configuration(
                "ranking.max_opponents must be at least 1".into(),
            ));
        }
        self.training.validate()
    }
}
