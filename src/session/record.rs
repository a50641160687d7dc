//! Durable session record
//!
//! A [`Session`] holds everything needed to resume an active learning run:
//! configuration, the pool, the full judgment log, the model checkpoint, the
//! derived ranking and convergence history, and the loop counters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::LoopConfig;
use crate::convergence::{ConvergenceHistory, ConvergenceReason};
use crate::error::PersistenceError;
use crate::model::ModelCheckpoint;
use crate::pool::FeatureMatrix;
use crate::preference::{Pair, PreferenceLog};
use crate::ranking::Ranking;

/// Current session format version
pub const SESSION_VERSION: u32 = 1;

/// Complete state of an active learning session
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Schema version for forward compatibility
    pub version: u32,
    /// Store identifier
    pub id: String,
    /// Loop configuration the session was started with
    pub config: LoopConfig,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Time of the last save
    pub updated_at: DateTime<Utc>,
    /// Item pool, once bound
    pub pool: Option<FeatureMatrix>,
    /// Every judgment received, ties and skips included
    pub preferences: PreferenceLog,
    /// Completed ingestion cycles
    pub iteration: usize,
    /// Always equal to `preferences.len()`
    pub total_comparisons: usize,
    /// Batches handed out so far
    pub batches_issued: usize,
    /// Pairs issued but not yet answered
    pub outstanding: Vec<Pair>,
    /// Latest trained model
    pub model_checkpoint: Option<ModelCheckpoint>,
    /// Ranking derived from the latest model
    pub ranking: Option<Ranking>,
    /// Top-K sets, one per trained iteration
    pub history: ConvergenceHistory,
    /// Convergence flag
    pub converged: bool,
    /// Why the session converged
    pub convergence_reason: Option<ConvergenceReason>,
    /// `total_comparisons` at the last backup
    pub last_backup_comparisons: usize,
}

#[derive(Deserialize)]
struct VersionProbe {
    #[serde(default)]
    version: u32,
}

impl Session {
    /// Create an empty session
    pub fn new(id: impl Into<String>, config: LoopConfig) -> Self {
        let now = Utc::now();
        Self {
            version: SESSION_VERSION,
            id: id.into(),
            config,
            created_at: now,
            updated_at: now,
            pool: None,
            preferences: PreferenceLog::new(),
            iteration: 0,
            total_comparisons: 0,
            batches_issued: 0,
            outstanding: Vec::new(),
            model_checkpoint: None,
            ranking: None,
            history: ConvergenceHistory::new(),
            converged: false,
            convergence_reason: None,
            last_backup_comparisons: 0,
        }
    }

    /// Returns true if a backup is due under a cadence of `every` comparisons
    ///
    /// A backup is due whenever `total_comparisons` has crossed a multiple of
    /// `every` since the last backup.
    pub fn backup_due(&self, every: usize) -> bool {
        every > 0 && self.total_comparisons / every > self.last_backup_comparisons / every
    }

    /// Lightweight metadata for this record
    pub fn info(&self, size_bytes: u64) -> SessionInfo {
        SessionInfo {
            id: self.id.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            total_comparisons: self.total_comparisons,
            iteration: self.iteration,
            converged: self.converged,
            acquisition: self.config.acquisition.clone(),
            size_bytes,
        }
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> Result<String, PersistenceError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| PersistenceError::write_failed(self.id.clone(), e))
    }

    /// Deserialize from JSON, rejecting records from a newer format
    pub fn from_json(id: &str, json: &str) -> Result<Self, PersistenceError> {
        check_version(id, json)?;
        serde_json::from_str(json).map_err(|e| PersistenceError::corrupt(id, e))
    }
}

/// Check the version field before decoding the rest of a record
pub(crate) fn check_version(id: &str, json: &str) -> Result<(), PersistenceError> {
    let probe: VersionProbe =
        serde_json::from_str(json).map_err(|e| PersistenceError::corrupt(id, e))?;
    if probe.version > SESSION_VERSION {
        return Err(PersistenceError::VersionTooNew {
            found: probe.version,
            supported: SESSION_VERSION,
        });
    }
    Ok(())
}

/// Metadata about a stored session, readable without restoring it
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Store identifier
    pub id: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Time of the last save
    pub updated_at: DateTime<Utc>,
    /// Judgments recorded
    pub total_comparisons: usize,
    /// Completed iterations
    pub iteration: usize,
    /// Convergence flag
    pub converged: bool,
    /// Acquisition strategy name
    pub acquisition: String,
    /// Size of the stored record
    pub size_bytes: u64,
}

/// Subset of a record decoded for [`SessionInfo`]
#[derive(Deserialize)]
pub(crate) struct SessionHeader {
    id: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    total_comparisons: usize,
    #[serde(default)]
    iteration: usize,
    #[serde(default)]
    converged: bool,
    #[serde(default)]
    config: HeaderConfig,
}

#[derive(Deserialize, Default)]
struct HeaderConfig {
    #[serde(default)]
    acquisition: String,
}

impl SessionHeader {
    /// Decode only the header fields of a record
    pub(crate) fn parse(id: &str, json: &str) -> Result<Self, PersistenceError> {
        check_version(id, json)?;
        serde_json::from_str(json).map_err(|e| PersistenceError::corrupt(id, e))
    }

    pub(crate) fn into_info(self, size_bytes: u64) -> SessionInfo {
        SessionInfo {
            id: self.id,
            created_at: self.created_at,
            updated_at: self.updated_at,
            total_comparisons: self.total_comparisons,
            iteration: self.iteration,
            converged: self.converged,
            acquisition: self.config.acquisition,
            size_bytes,
        }
    }
}

/// Generate `{prefix}_{YYYYmmdd_HHMMSS_ffffff}`, suffixed with `_N` while `taken`
pub fn generate_session_id(
    prefix: &str,
    now: DateTime<Utc>,
    taken: impl Fn(&str) -> bool,
) -> String {
    let base = format!("{}_{}", prefix, now.format("%Y%m%d_%H%M%S_%6f"));
    if !taken(&base) {
        return base;
    }
    let mut n = 1usize;
    loop {
        let candidate = format!("{}_{}", base, n);
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Returns true if `id` is safe to use as a file stem
pub(crate) fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && !id.contains("__")
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
