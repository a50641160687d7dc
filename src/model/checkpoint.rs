//! Versioned, library-independent model checkpoints
//!
//! A checkpoint lists every parameter explicitly (kernel hyperparameters,
//! inducing points, variational mean and covariance, scaler, and the pool
//! feature snapshot), so it can be read without this crate's internals.
//! It is embedded as JSON inside session records and can also be written
//! as a standalone binary file:
//!
//! ```text
//! b"PBOM" | format_version: u32 LE | bincode(ModelCheckpoint)
//! ```

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

use super::gp::TrainingReport;
use super::kernel::PreferenceKernel;
use crate::error::PersistenceError;
use crate::pool::{FeatureMatrix, StandardScaler};

/// Current checkpoint format version
pub const CHECKPOINT_VERSION: u32 = 1;

/// Magic bytes at the start of a binary checkpoint
pub const CHECKPOINT_MAGIC: &[u8; 4] = b"PBOM";

/// Explicit snapshot of a trained [`super::PreferenceModel`]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelCheckpoint {
    /// Format version for forward compatibility
    pub format_version: u32,
    /// Kernel hyperparameters
    pub kernel: PreferenceKernel,
    /// Diagonal jitter used when factorizing the inducing kernel
    pub jitter: f64,
    /// Inducing points in standardized difference space
    pub inducing_points: Vec<Vec<f64>>,
    /// Whitened posterior mean
    pub variational_mean: Vec<f64>,
    /// Whitened posterior covariance, row-major
    pub variational_covariance: Vec<f64>,
    /// Feature standardization fit over the pool
    pub scaler: StandardScaler,
    /// Raw pool features at training time
    pub features: FeatureMatrix,
    /// Loop iteration at which the model was trained
    pub trained_at: usize,
    /// Fit summary
    pub report: TrainingReport,
}

impl ModelCheckpoint {
    /// Check if this checkpoint can be read by this build
    pub fn is_compatible(&self) -> bool {
        self.format_version <= CHECKPOINT_VERSION
    }

    /// Encode as magic + version header + bincode body
    pub fn to_bytes(&self) -> Result<Vec<u8>, PersistenceError> {
        let body = bincode::serialize(self)
            .map_err(|e| PersistenceError::write_failed("model checkpoint", e))?;
        let mut bytes = Vec::with_capacity(8 + body.len());
        bytes.extend_from_slice(CHECKPOINT_MAGIC);
        bytes.extend_from_slice(&CHECKPOINT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&body);
        Ok(bytes)
    }

    /// Decode bytes produced by [`ModelCheckpoint::to_bytes`]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PersistenceError> {
        if bytes.len() < 8 {
            return Err(PersistenceError::corrupt(
                "model checkpoint",
                "truncated header",
            ));
        }
        if &bytes[0..4] != CHECKPOINT_MAGIC {
            return Err(PersistenceError::corrupt(
                "model checkpoint",
                "bad magic bytes",
            ));
        }
        let mut version = [0u8; 4];
        version.copy_from_slice(&bytes[4..8]);
        let version = u32::from_le_bytes(version);
        if version > CHECKPOINT_VERSION {
            return Err(PersistenceError::VersionTooNew {
                found: version,
                supported: CHECKPOINT_VERSION,
            });
        }
        bincode::deserialize(&bytes[8..])
            .map_err(|e| PersistenceError::corrupt("model checkpoint", e))
    }

    /// Write to `path`, replacing any existing file atomically
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), PersistenceError> {
        let path = path.as_ref();
        let id = path.display().to_string();
        let bytes = self.to_bytes()?;
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };

        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .map_err(|e| PersistenceError::write_failed(id.clone(), e))?;
        tmp.write_all(&bytes)
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| PersistenceError::write_failed(id.clone(), e))?;
        tmp.persist(path)
            .map_err(|e| PersistenceError::write_failed(id, e.error))?;
        Ok(())
    }

    /// Read a checkpoint written by [`ModelCheckpoint::save`]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PersistenceError::NotFound(path.display().to_string())
            } else {
                PersistenceError::Io(e)
            }
        })?;
        Self::from_bytes(&bytes)
    }
}
