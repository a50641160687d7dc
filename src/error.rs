//! Error types for pbo-rank
//!
//! This module defines all error types used throughout the library.

use thiserror::Error;

/// Error type for session persistence
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// No record exists under this identifier
    #[error("Session not found: {0}")]
    NotFound(String),

    /// Record exists but cannot be decoded
    #[error("Corrupted record {id}: {reason}")]
    Corrupt {
        /// Identifier or path of the damaged record
        id: String,
        /// Decoder message
        reason: String,
    },

    /// Writing or replacing a record failed; the previous record is intact
    #[error("Write failed for {id}: {reason}")]
    WriteFailed {
        /// Identifier of the record being written
        id: String,
        /// Underlying failure
        reason: String,
    },

    /// Record was written by a newer format version
    #[error("Record version {found} is newer than supported ({supported})")]
    VersionTooNew {
        /// Version found in the record
        found: u32,
        /// Highest version this build reads
        supported: u32,
    },

    /// IO error outside of a write (directory listing, deletion)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PersistenceError {
    /// Shorthand for a corrupt-record error
    pub fn corrupt(id: impl Into<String>, reason: impl ToString) -> Self {
        Self::Corrupt {
            id: id.into(),
            reason: reason.to_string(),
        }
    }

    /// Shorthand for a failed write
    pub fn write_failed(id: impl Into<String>, reason: impl ToString) -> Self {
        Self::WriteFailed {
            id: id.into(),
            reason: reason.to_string(),
        }
    }

    /// Returns true if the record was missing
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns true if the record exists but could not be decoded
    pub fn is_corrupt(&self) -> bool {
        matches!(self, Self::Corrupt { .. } | Self::VersionTooNew { .. })
    }
}

/// Failure inside a single model fit
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    /// Kernel matrix could not be factorized even with added jitter
    #[error("Cholesky factorization failed (jitter {jitter:e})")]
    NotPositiveDefinite {
        /// Jitter on the diagonal at the last attempt
        jitter: f64,
    },

    /// Loss or parameters became NaN/inf
    #[error("Optimization diverged at epoch {epoch}: loss = {loss}")]
    Diverged {
        /// Epoch at which divergence was detected
        epoch: usize,
        /// Offending loss value
        loss: f64,
    },

    /// Wall-clock budget exhausted before early stopping fired
    #[error("Training exceeded its time budget of {budget_ms} ms after {epochs} epochs")]
    BudgetExceeded {
        /// Configured budget
        budget_ms: u64,
        /// Epochs completed
        epochs: usize,
    },

    /// Linear solve failed during a Newton step
    #[error("Singular system in Newton step at epoch {0}")]
    SingularStep(usize),

    /// Feature data is malformed
    #[error("Invalid features: {0}")]
    InvalidFeatures(String),
}

/// Top-level error type for active preference learning
#[derive(Debug, Error)]
pub enum PboError {
    /// Invalid or missing settings
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Caller input does not match loop state (e.g. a pair outside the last batch)
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Training requested with too few definitive observations
    #[error("Insufficient data: {found} distinct labeled observations (need {required})")]
    InsufficientData {
        /// Distinct definitive observations available
        found: usize,
        /// Minimum required
        required: usize,
    },

    /// Acquisition requested with fewer than two candidates
    #[error("Insufficient pool: {0} distinct candidates (need at least 2)")]
    InsufficientPool(usize),

    /// Optimization diverged or exceeded its budget
    #[error("Model training failed: {0}")]
    ModelTraining(#[from] ModelError),

    /// Requested pair count cannot be produced without repetition
    #[error("Acquisition failed: {0}")]
    Acquisition(String),

    /// Session persistence error
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// Operation not allowed in the current loop state
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl PboError {
    /// Returns true for errors that must not be retried
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::Validation(_))
    }
}

/// Result type alias for pbo-rank operations
pub type PboResult<T> = Result<T, PboError>;
