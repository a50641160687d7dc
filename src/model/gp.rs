//! Sparse Gaussian-process preference model
//!
//! Each comparison `(i, j)` becomes the difference vector `d = x̃_i − x̃_j` of
//! the standardized features with label `+1` if `i` won and `−1` otherwise.
//! A latent function `f` with the odd kernel from [`super::kernel`] is fit
//! under a logistic likelihood, so
//!
//! ```text
//! P(i ≻ j) = σ(f(x̃_i − x̃_j))
//! ```
//!
//! # Approximation
//!
//! - Inducing points `Z` are chosen by farthest-point traversal over the
//!   distinct training differences, at most `num_inducing` of them.
//! - The inducing values are whitened, `u = L v` with `L Lᵀ = K_ZZ + jitter·I`,
//!   which gives features `φ(d) = L⁻¹ k_o(Z, d)` and the prior `v ~ N(0, I)`.
//! - The posterior over `v` is the Laplace approximation at the MAP estimate:
//!   mean `m`, covariance `S = (Φᵀ W Φ + I)⁻¹`.
//!
//! # Hyperparameters
//!
//! Each fit tries a small grid of lengthscales and outputscales. Candidates
//! are compared first by how many distinct pairs have their majority outcome
//! mispredicted, then by the Laplace log marginal likelihood
//! `−L(m) − ½ log|Φᵀ W Φ + I|`. The grid always contains the separating
//! lengthscale from [`super::kernel::separating_lengthscale`], so consistent
//! answers over a modest number of distinct pairs are always reproduced.
//!
//! Cost is `O(N M²)` per epoch and candidate for `N` training pairs,
//! independent of pool size.

use nalgebra::{DMatrix, DVector};
use rand::prelude::*;
use rand_distr::StandardNormal;
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;

use super::checkpoint::{ModelCheckpoint, CHECKPOINT_VERSION};
use super::kernel::{
    farthest_point_indices, median_lengthscale, separating_lengthscale, PreferenceKernel,
};
use super::link::sigmoid;
use super::optimizer::{minimize, LogisticObjective, OptimizationTrace, StopReason};
use crate::config::TrainingConfig;
use crate::error::{ModelError, PboError, PboResult, PersistenceError};
use crate::pool::{FeatureMatrix, StandardScaler};
use crate::preference::{LabeledPair, Pair, PairSet};

/// Distinct definitive pairs required before a model can be fit
pub const MIN_DISTINCT_OBSERVATIONS: usize = 2;

/// Jitter escalation attempts before giving up on a Cholesky factorization
const JITTER_ATTEMPTS: usize = 6;

/// Multiples of the base lengthscale tried when learning hyperparameters
const LENGTHSCALE_FACTORS: [f64; 3] = [0.5, 1.0, 2.0];

/// Multiples of the base outputscale tried when learning hyperparameters
const OUTPUTSCALE_FACTORS: [f64; 3] = [1.0, 4.0, 16.0];

/// Summary of one model fit
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    /// Optimization epochs run
    pub epochs: usize,
    /// Objective value at the returned parameters
    pub final_loss: f64,
    /// Why optimization stopped
    pub stop_reason: StopReason,
    /// Inducing points used
    pub num_inducing: usize,
    /// Training examples (definitive observations, repeats included)
    pub num_pairs: usize,
    /// Kernel lengthscale selected
    pub lengthscale: f64,
    /// Kernel outputscale selected
    #[serde(default)]
    pub outputscale: f64,
    /// Laplace approximation of the log marginal likelihood at the selected kernel
    #[serde(default)]
    pub log_evidence: f64,
    /// Distinct pairs whose majority outcome the model predicts wrongly
    #[serde(default)]
    pub misfit_pairs: usize,
    /// Kernel settings tried
    #[serde(default)]
    pub candidates: usize,
    /// Whether the reduced-capacity fallback produced this model
    pub used_fallback: bool,
}

/// Fits [`PreferenceModel`]s
///
/// Identical inputs and seed always give an identical model.
#[derive(Clone, Debug)]
pub struct PreferenceTrainer {
    config: TrainingConfig,
    seed: u64,
}

impl PreferenceTrainer {
    /// Create a new trainer
    pub fn new(config: TrainingConfig) -> Self {
        Self { config, seed: 0 }
    }

    /// Seed for stochastic optimizers
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Training configuration
    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Fit a model on the full labeled history
    ///
    /// # Arguments
    ///
    /// * `observations` - Definitive outcomes, repeats allowed
    /// * `features` - Raw pool features; a snapshot is kept inside the model
    /// * `scaler` - Previously fit scaler; fit on `features` when absent
    /// * `trained_at` - Loop iteration recorded in the model
    pub fn fit(
        &self,
        observations: &[LabeledPair],
        features: &FeatureMatrix,
        scaler: Option<&StandardScaler>,
        trained_at: usize,
    ) -> PboResult<PreferenceModel> {
        fit_model(&self.config, self.seed, observations, features, scaler, trained_at)
    }

    /// Fit, retrying once with [`TrainingConfig::fallback`] on a numerical failure
    ///
    /// Data and configuration errors are returned immediately.
    pub fn fit_with_fallback(
        &self,
        observations: &[LabeledPair],
        features: &FeatureMatrix,
        scaler: Option<&StandardScaler>,
        trained_at: usize,
    ) -> PboResult<PreferenceModel> {
        match self.fit(observations, features, scaler, trained_at) {
            Err(PboError::ModelTraining(err)) => {
                let fallback = self.config.fallback();
                tracing::warn!(
                    error = %err,
                    num_inducing = fallback.num_inducing,
                    jitter = fallback.jitter,
                    "model training failed, retrying with reduced capacity"
                );
                let mut model = fit_model(
                    &fallback,
                    self.seed,
                    observations,
                    features,
                    scaler,
                    trained_at,
                )?;
                model.report.used_fallback = true;
                Ok(model)
            }
            other => other,
        }
    }
}

fn fit_model(
    config: &TrainingConfig,
    seed: u64,
    observations: &[LabeledPair],
    features: &FeatureMatrix,
    scaler: Option<&StandardScaler>,
    trained_at: usize,
) -> PboResult<PreferenceModel> {
    config.validate()?;

    let distinct: PairSet = observations.iter().map(|obs| obs.pair).collect();
    if distinct.len() < MIN_DISTINCT_OBSERVATIONS {
        return Err(PboError::InsufficientData {
            found: distinct.len(),
            required: MIN_DISTINCT_OBSERVATIONS,
        });
    }
    if let Some(pair) = distinct.iter().find(|p| p.second() >= features.n_items()) {
        return Err(PboError::Validation(format!(
            "pair {} is outside the pool of {} items",
            pair,
            features.n_items()
        )));
    }

    let scaler = match scaler {
        Some(s) => s.clone(),
        None => StandardScaler::fit(features),
    };
    let scaled = scaler.transform(features)?;

    let candidates: Vec<DVector<f64>> = distinct
        .iter()
        .map(|p| scaled.difference(p.first(), p.second()))
        .collect();
    let inducing: Vec<DVector<f64>> = farthest_point_indices(&candidates, config.num_inducing)
        .into_iter()
        .map(|i| candidates[i].clone())
        .collect();

    let group_of: BTreeMap<Pair, usize> = distinct
        .iter()
        .enumerate()
        .map(|(g, &pair)| (pair, g))
        .collect();
    let data = TrainingData {
        inducing: &inducing,
        diffs: observations
            .iter()
            .map(|obs| scaled.difference(obs.pair.first(), obs.pair.second()))
            .collect(),
        labels: observations
            .iter()
            .map(|obs| if obs.first_wins { 1.0 } else { -1.0 })
            .collect(),
        groups: observations.iter().map(|obs| group_of[&obs.pair]).collect(),
        n_groups: distinct.len(),
    };

    let grid = hyperparameter_grid(config, &inducing);
    tracing::debug!(
        pairs = observations.len(),
        distinct = distinct.len(),
        inducing = inducing.len(),
        candidates = grid.len(),
        "fitting preference model"
    );

    let started = Instant::now();
    let n_candidates = grid.len();
    let best = select_candidate(fit_candidates(grid, config, seed, &data, started))?;

    let report = TrainingReport {
        epochs: best.trace.epochs,
        final_loss: best.trace.final_loss,
        stop_reason: best.trace.stop_reason,
        num_inducing: inducing.len(),
        num_pairs: observations.len(),
        lengthscale: best.kernel.lengthscale,
        outputscale: best.kernel.outputscale,
        log_evidence: best.log_evidence,
        misfit_pairs: best.misfit_pairs,
        candidates: n_candidates,
        used_fallback: false,
    };

    tracing::info!(
        epochs = report.epochs,
        loss = report.final_loss,
        stop_reason = ?report.stop_reason,
        inducing = report.num_inducing,
        lengthscale = report.lengthscale,
        outputscale = report.outputscale,
        log_evidence = report.log_evidence,
        misfit_pairs = report.misfit_pairs,
        "preference model trained"
    );

    PreferenceModel::assemble(ModelParts {
        kernel: best.kernel,
        jitter: best.jitter,
        inducing,
        mean: best.trace.weights,
        covariance: best.covariance,
        scaler,
        features: features.clone(),
        trained_at,
        report,
    })
}

/// Training inputs shared by every hyperparameter candidate
struct TrainingData<'a> {
    inducing: &'a [DVector<f64>],
    /// Standardized difference per observation
    diffs: Vec<DVector<f64>>,
    /// ±1 per observation
    labels: Vec<f64>,
    /// Index of the observation's distinct pair
    groups: Vec<usize>,
    n_groups: usize,
}

/// Posterior at one kernel setting
struct CandidateFit {
    kernel: PreferenceKernel,
    jitter: f64,
    trace: OptimizationTrace,
    covariance: DMatrix<f64>,
    log_evidence: f64,
    misfit_pairs: usize,
}

impl CandidateFit {
    /// Fewer misfit pairs wins, then higher evidence; ties keep the earlier candidate
    fn beats(&self, other: &CandidateFit) -> bool {
        self.misfit_pairs < other.misfit_pairs
            || (self.misfit_pairs == other.misfit_pairs && self.log_evidence > other.log_evidence)
    }
}

/// Kernel settings tried by one fit
///
/// The lengthscale base is the configured value or the median heuristic and
/// the outputscale base is the configured value. With learning enabled each
/// is scaled by a few factors and the separating lengthscale is added.
fn hyperparameter_grid(
    config: &TrainingConfig,
    inducing: &[DVector<f64>],
) -> Vec<PreferenceKernel> {
    let lengthscale = config
        .lengthscale
        .unwrap_or_else(|| median_lengthscale(inducing));
    if !config.learn_hyperparameters {
        return vec![PreferenceKernel::new(lengthscale, config.outputscale)];
    }

    let mut lengthscales: Vec<f64> = LENGTHSCALE_FACTORS
        .iter()
        .map(|f| f * lengthscale)
        .collect();
    if let Some(separating) = separating_lengthscale(inducing) {
        if lengthscales.iter().all(|&l| (l - separating).abs() > 1e-12 * l) {
            lengthscales.push(separating);
        }
    }
    lengthscales
        .iter()
        .flat_map(|&l| {
            OUTPUTSCALE_FACTORS
                .iter()
                .map(move |&f| PreferenceKernel::new(l, f * config.outputscale))
        })
        .collect()
}

#[cfg(feature = "parallel")]
fn fit_candidates(
    grid: Vec<PreferenceKernel>,
    config: &TrainingConfig,
    seed: u64,
    data: &TrainingData<'_>,
    started: Instant,
) -> Vec<Result<CandidateFit, ModelError>> {
    grid.into_par_iter()
        .map(|kernel| fit_candidate(kernel, config, seed, data, started))
        .collect()
}

#[cfg(not(feature = "parallel"))]
fn fit_candidates(
    grid: Vec<PreferenceKernel>,
    config: &TrainingConfig,
    seed: u64,
    data: &TrainingData<'_>,
    started: Instant,
) -> Vec<Result<CandidateFit, ModelError>> {
    grid.into_iter()
        .map(|kernel| fit_candidate(kernel, config, seed, data, started))
        .collect()
}

/// MAP fit and Laplace evidence at fixed kernel hyperparameters
fn fit_candidate(
    kernel: PreferenceKernel,
    config: &TrainingConfig,
    seed: u64,
    data: &TrainingData<'_>,
    started: Instant,
) -> Result<CandidateFit, ModelError> {
    let (whitening, jitter) = escalating_whitening(&kernel, data.inducing, config.jitter)?;
    let phi = feature_rows(&kernel, data.inducing, &whitening, &data.diffs);

    let objective = LogisticObjective::new(&phi, &data.labels);
    let mut rng = StdRng::seed_from_u64(seed);
    let trace = minimize(&objective, config, &mut rng, started)?;

    let factor = objective
        .hessian(&trace.weights)
        .cholesky()
        .ok_or(ModelError::NotPositiveDefinite { jitter })?;
    let log_det = 2.0 * factor.l().diagonal().iter().map(|v| v.ln()).sum::<f64>();
    // log p(y) ≈ −L(m) − ½ log|Φᵀ W Φ + I|
    let log_evidence = -trace.final_loss - 0.5 * log_det;
    let log_evidence = if log_evidence.is_finite() {
        log_evidence
    } else {
        f64::NEG_INFINITY
    };

    let margins = &phi * &trace.weights;
    let misfit_pairs = count_misfit_pairs(data, &margins);

    tracing::debug!(
        lengthscale = kernel.lengthscale,
        outputscale = kernel.outputscale,
        log_evidence,
        misfit_pairs,
        epochs = trace.epochs,
        "hyperparameter candidate fit"
    );

    Ok(CandidateFit {
        kernel,
        jitter,
        trace,
        covariance: factor.inverse(),
        log_evidence,
        misfit_pairs,
    })
}

/// Distinct pairs whose majority outcome the fit does not predict
///
/// Pairs with as many wins as losses have no majority and never count.
fn count_misfit_pairs(data: &TrainingData<'_>, margins: &DVector<f64>) -> usize {
    let mut votes = vec![0.0; data.n_groups];
    let mut latent = vec![0.0; data.n_groups];
    for (n, &g) in data.groups.iter().enumerate() {
        votes[g] += data.labels[n];
        latent[g] = margins[n];
    }
    votes
        .iter()
        .zip(&latent)
        .filter(|&(&vote, &f)| {
            let p = sigmoid(f);
            (vote > 0.0 && p <= 0.5) || (vote < 0.0 && p >= 0.5)
        })
        .count()
}

/// Best candidate, or the reason none could be fit
///
/// An exhausted time budget fails the whole fit. Other numerical failures
/// drop the candidate; the first one is returned when every candidate failed.
fn select_candidate(
    fits: Vec<Result<CandidateFit, ModelError>>,
) -> Result<CandidateFit, ModelError> {
    let mut best: Option<CandidateFit> = None;
    let mut first_error = None;
    for fit in fits {
        match fit {
            Ok(candidate) => {
                if best.as_ref().map_or(true, |b| candidate.beats(b)) {
                    best = Some(candidate);
                }
            }
            Err(err @ ModelError::BudgetExceeded { .. }) => return Err(err),
            Err(err) => {
                tracing::debug!(error = %err, "hyperparameter candidate failed");
                first_error.get_or_insert(err);
            }
        }
    }
    match (best, first_error) {
        (Some(candidate), _) => Ok(candidate),
        (None, Some(err)) => Err(err),
        (None, None) => Err(ModelError::NotPositiveDefinite { jitter: 0.0 }),
    }
}

/// Stored parameters from which every derived quantity is rebuilt
struct ModelParts {
    kernel: PreferenceKernel,
    jitter: f64,
    inducing: Vec<DVector<f64>>,
    mean: DVector<f64>,
    covariance: DMatrix<f64>,
    scaler: StandardScaler,
    features: FeatureMatrix,
    trained_at: usize,
    report: TrainingReport,
}

/// Trained preference model over a fixed item pool
///
/// Owns a snapshot of the raw pool features it was trained against, so
/// predictions after a checkpoint restore depend on nothing outside the model.
#[derive(Clone, Debug)]
pub struct PreferenceModel {
    kernel: PreferenceKernel,
    jitter: f64,
    inducing: Vec<DVector<f64>>,
    mean: DVector<f64>,
    covariance: DMatrix<f64>,
    scaler: StandardScaler,
    features: FeatureMatrix,
    trained_at: usize,
    report: TrainingReport,

    scaled: FeatureMatrix,
    /// `L⁻¹` for `L Lᵀ = K_ZZ + jitter·I`
    whitening: DMatrix<f64>,
    /// Lower Cholesky factor of `covariance`
    sample_factor: DMatrix<f64>,
    /// `φ(x̃_i)` for every item, one row each
    item_phi: DMatrix<f64>,
}

impl PreferenceModel {
    fn assemble(parts: ModelParts) -> PboResult<Self> {
        let scaled = parts.scaler.transform(&parts.features)?;
        let whitening = whitening_at(&parts.kernel, &parts.inducing, parts.jitter).ok_or(
            ModelError::NotPositiveDefinite {
                jitter: parts.jitter,
            },
        )?;
        let sample_factor = covariance_factor(&parts.covariance).ok_or(
            ModelError::NotPositiveDefinite {
                jitter: parts.jitter,
            },
        )?;
        let rows: Vec<DVector<f64>> = (0..scaled.n_items()).map(|i| scaled.row(i)).collect();
        let item_phi = feature_rows(&parts.kernel, &parts.inducing, &whitening, &rows);

        Ok(Self {
            kernel: parts.kernel,
            jitter: parts.jitter,
            inducing: parts.inducing,
            mean: parts.mean,
            covariance: parts.covariance,
            scaler: parts.scaler,
            features: parts.features,
            trained_at: parts.trained_at,
            report: parts.report,
            scaled,
            whitening,
            sample_factor,
            item_phi,
        })
    }

    /// Number of items in the pool snapshot
    pub fn n_items(&self) -> usize {
        self.features.n_items()
    }

    /// Loop iteration at which this model was trained
    pub fn trained_at(&self) -> usize {
        self.trained_at
    }

    /// Fit summary
    pub fn report(&self) -> &TrainingReport {
        &self.report
    }

    /// Scaler fit over the pool
    pub fn scaler(&self) -> &StandardScaler {
        &self.scaler
    }

    /// Kernel hyperparameters
    pub fn kernel(&self) -> &PreferenceKernel {
        &self.kernel
    }

    /// Raw pool features the model was trained against
    pub fn features(&self) -> &FeatureMatrix {
        &self.features
    }

    /// Number of inducing points
    pub fn num_inducing(&self) -> usize {
        self.inducing.len()
    }

    /// Probability that item `i` is preferred over item `j`
    ///
    /// `predict_preference(i, j) + predict_preference(j, i) == 1` up to rounding.
    pub fn predict_preference(&self, i: usize, j: usize) -> PboResult<f64> {
        self.check_index(i)?;
        self.check_index(j)?;
        if i == j {
            return Ok(0.5);
        }
        Ok(sigmoid(self.latent_mean(&self.scaled.difference(i, j))))
    }

    /// Latent predictive mean and variance of `f(x̃_i − x̃_j)`
    pub fn predict_difference(&self, i: usize, j: usize) -> PboResult<(f64, f64)> {
        self.check_index(i)?;
        self.check_index(j)?;
        let d = self.scaled.difference(i, j);
        Ok(self.latent(&d))
    }

    /// Posterior mean utility of every item
    pub fn utility_mean(&self) -> DVector<f64> {
        &self.item_phi * &self.mean
    }

    /// Posterior variance of every item's utility
    pub fn utility_variance(&self) -> DVector<f64> {
        DVector::from_fn(self.n_items(), |i, _| {
            let phi = self.item_phi.row(i).transpose();
            let prior = self.kernel.diag(&self.scaled.row(i));
            (prior - phi.norm_squared() + phi.dot(&(&self.covariance * &phi))).max(0.0)
        })
    }

    /// One joint posterior sample of every item's utility
    pub fn sample_utilities<R: Rng + ?Sized>(&self, rng: &mut R) -> DVector<f64> {
        let m = self.mean.len();
        let eps = DVector::from_fn(m, |_, _| {
            let z: f64 = StandardNormal.sample(rng);
            z
        });
        let v = &self.mean + &self.sample_factor * eps;
        &self.item_phi * v
    }

    /// Export explicit, versioned parameters
    pub fn checkpoint(&self) -> ModelCheckpoint {
        let m = self.inducing.len();
        ModelCheckpoint {
            format_version: CHECKPOINT_VERSION,
            kernel: self.kernel.clone(),
            jitter: self.jitter,
            inducing_points: self.inducing.iter().map(|z| z.iter().copied().collect()).collect(),
            variational_mean: self.mean.iter().copied().collect(),
            variational_covariance: (0..m)
                .flat_map(|r| (0..m).map(move |c| (r, c)))
                .map(|(r, c)| self.covariance[(r, c)])
                .collect(),
            scaler: self.scaler.clone(),
            features: self.features.clone(),
            trained_at: self.trained_at,
            report: self.report.clone(),
        }
    }

    /// Rebuild a model from a checkpoint; predictions match the saved model exactly
    pub fn from_checkpoint(checkpoint: ModelCheckpoint) -> PboResult<Self> {
        if checkpoint.format_version > CHECKPOINT_VERSION {
            return Err(PersistenceError::VersionTooNew {
                found: checkpoint.format_version,
                supported: CHECKPOINT_VERSION,
            }
            .into());
        }

        let dim = checkpoint.features.dimension();
        let m = checkpoint.inducing_points.len();
        let corrupt = |reason: String| PboError::from(PersistenceError::corrupt("model checkpoint", reason));

        if m == 0 {
            return Err(corrupt("no inducing points".into()));
        }
        if checkpoint.inducing_points.iter().any(|z| z.len() != dim) {
            return Err(corrupt(format!("inducing points must have dimension {}", dim)));
        }
        if checkpoint.scaler.dimension() != dim {
            return Err(corrupt(format!(
                "scaler dimension {} does not match features {}",
                checkpoint.scaler.dimension(),
                dim
            )));
        }
        if checkpoint.variational_mean.len() != m {
            return Err(corrupt(format!(
                "variational mean has {} entries, expected {}",
                checkpoint.variational_mean.len(),
                m
            )));
        }
        if checkpoint.variational_covariance.len() != m * m {
            return Err(corrupt(format!(
                "variational covariance has {} entries, expected {}",
                checkpoint.variational_covariance.len(),
                m * m
            )));
        }

        Self::assemble(ModelParts {
            kernel: checkpoint.kernel,
            jitter: checkpoint.jitter,
            inducing: checkpoint
                .inducing_points
                .iter()
                .map(|z| DVector::from_column_slice(z))
                .collect(),
            mean: DVector::from_vec(checkpoint.variational_mean),
            covariance: DMatrix::from_row_slice(m, m, &checkpoint.variational_covariance),
            scaler: checkpoint.scaler,
            features: checkpoint.features,
            trained_at: checkpoint.trained_at,
            report: checkpoint.report,
        })
    }

    fn check_index(&self, i: usize) -> PboResult<()> {
        if i >= self.n_items() {
            return Err(PboError::Validation(format!(
                "item {} is outside the pool of {} items",
                i,
                self.n_items()
            )));
        }
        Ok(())
    }

    fn phi(&self, d: &DVector<f64>) -> DVector<f64> {
        &self.whitening * self.kernel.cross(&self.inducing, d)
    }

    fn latent_mean(&self, d: &DVector<f64>) -> f64 {
        self.phi(d).dot(&self.mean)
    }

    fn latent(&self, d: &DVector<f64>) -> (f64, f64) {
        let phi = self.phi(d);
        let mean = phi.dot(&self.mean);
        let var = self.kernel.diag(d) - phi.norm_squared() + phi.dot(&(&self.covariance * &phi));
        (mean, var.max(0.0))
    }
}

/// `L⁻¹` at exactly this jitter
fn whitening_at(
    kernel: &PreferenceKernel,
    inducing: &[DVector<f64>],
    jitter: f64,
) -> Option<DMatrix<f64>> {
    let m = inducing.len();
    let mut k = kernel.gram(inducing);
    for i in 0..m {
        k[(i, i)] += jitter;
    }
    let chol = k.cholesky()?;
    chol.l().solve_lower_triangular(&DMatrix::identity(m, m))
}

/// Retry the factorization with tenfold jitter until it succeeds
fn escalating_whitening(
    kernel: &PreferenceKernel,
    inducing: &[DVector<f64>],
    initial_jitter: f64,
) -> Result<(DMatrix<f64>, f64), ModelError> {
    let mut jitter = initial_jitter;
    for _ in 0..JITTER_ATTEMPTS {
        if let Some(w) = whitening_at(kernel, inducing, jitter) {
            return Ok((w, jitter));
        }
        tracing::debug!(jitter, "inducing kernel not positive definite, raising jitter");
        jitter = if jitter > 0.0 { jitter * 10.0 } else { 1e-8 };
    }
    Err(ModelError::NotPositiveDefinite { jitter })
}

/// Lower Cholesky factor of a posterior covariance, symmetrized first
fn covariance_factor(covariance: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    let symmetric = (covariance + covariance.transpose()) * 0.5;
    symmetric.cholesky().map(|c| c.l())
}

/// Whitened features, one row per point
fn feature_rows(
    kernel: &PreferenceKernel,
    inducing: &[DVector<f64>],
    whitening: &DMatrix<f64>,
    points: &[DVector<f64>],
) -> DMatrix<f64> {
    let mut phi = DMatrix::zeros(points.len(), inducing.len());
    for (n, d) in points.iter().enumerate() {
        let row = whitening * kernel.cross(inducing, d);
        phi.set_row(n, &row.transpose());
    }
    phi
}
