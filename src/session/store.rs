//! Session stores
//!
//! [`FileSessionStore`] keeps one JSON record per session in a directory and
//! replaces it atomically on every save. Backups live in a `backups/`
//! subdirectory and are pruned by count.
//!
//! ```text
//! <root>/<id>.json
//! <root>/backups/<id>__<comparisons:08>__<YYYYmmddTHHMMSSffffff>.json
//! ```

use chrono::Utc;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::record::{generate_session_id, is_valid_id, Session, SessionHeader, SessionInfo};
use crate::config::LoopConfig;
use crate::error::PersistenceError;

/// Durable storage for sessions
///
/// Implementations must make `save` atomic: either the new record fully
/// replaces the old one, or the old one is left intact.
pub trait SessionStore: Send + Sync {
    /// Create and persist an empty session; returns its identifier
    fn create(&self, config: &LoopConfig) -> Result<String, PersistenceError>;

    /// Replace the stored record for `session.id`
    fn save(&self, session: &Session) -> Result<(), PersistenceError>;

    /// Load a session
    fn load(&self, id: &str) -> Result<Session, PersistenceError>;

    /// Identifiers of all stored sessions, sorted
    fn list(&self) -> Result<Vec<String>, PersistenceError>;

    /// Remove a session and its backups
    fn delete(&self, id: &str) -> Result<(), PersistenceError>;

    /// Metadata for one session
    fn get_info(&self, id: &str) -> Result<SessionInfo, PersistenceError>;

    /// Write a backup copy of `session`
    fn write_backup(&self, session: &Session) -> Result<String, PersistenceError>;

    /// Backup names for a session, oldest first
    fn list_backups(&self, id: &str) -> Result<Vec<String>, PersistenceError>;

    /// Remove one backup by name
    fn remove_backup(&self, name: &str) -> Result<(), PersistenceError>;

    /// Returns true if a session with this identifier exists
    fn exists(&self, id: &str) -> Result<bool, PersistenceError> {
        Ok(self.list()?.iter().any(|s| s == id))
    }

    /// Metadata for all sessions, most recently updated first
    ///
    /// Unreadable records are skipped.
    fn list_info(&self) -> Result<Vec<SessionInfo>, PersistenceError> {
        let mut infos = Vec::new();
        for id in self.list()? {
            match self.get_info(&id) {
                Ok(info) => infos.push(info),
                Err(err) => tracing::warn!(id = %id, error = %err, "skipping unreadable session"),
            }
        }
        infos.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
        Ok(infos)
    }

    /// Back up `session` if `every` comparisons have passed since the last backup
    ///
    /// Keeps the newest `keep` backups of the session. Returns true if a
    /// backup was written.
    fn auto_backup(
        &self,
        session: &Session,
        every: usize,
        keep: usize,
    ) -> Result<bool, PersistenceError> {
        if !session.backup_due(every) {
            return Ok(false);
        }
        let name = self.write_backup(session)?;
        tracing::info!(
            id = %session.id,
            backup = %name,
            comparisons = session.total_comparisons,
            "session backup written"
        );

        let backups = self.list_backups(&session.id)?;
        let excess = backups.len().saturating_sub(keep);
        for old in backups.into_iter().take(excess) {
            self.remove_backup(&old)?;
            tracing::debug!(backup = %old, "pruned old backup");
        }
        Ok(true)
    }
}

/// Name of a backup file, without extension
pub(crate) fn backup_name(session: &Session) -> String {
    format!(
        "{}__{:08}__{}",
        session.id,
        session.total_comparisons,
        Utc::now().format("%Y%m%dT%H%M%S%6f")
    )
}

/// Returns true if `name` is a backup of session `id`
pub(crate) fn is_backup_of(name: &str, id: &str) -> bool {
    name.strip_prefix(id)
        .map(|rest| rest.starts_with("__"))
        .unwrap_or(false)
}

pub(crate) fn check_id(id: &str) -> Result<(), PersistenceError> {
    if is_valid_id(id) {
        Ok(())
    } else {
        Err(PersistenceError::NotFound(id.to_string()))
    }
}

/// Sessions stored as JSON files in a directory
#[derive(Clone, Debug)]
pub struct FileSessionStore {
    root: PathBuf,
}

impl FileSessionStore {
    /// Open (creating if needed) a store rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let root = root.into();
        std::fs::create_dir_all(root.join("backups"))?;
        Ok(Self { root })
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("{}.json", id))
    }

    fn backup_dir(&self) -> PathBuf {
        self.root.join("backups")
    }

    fn read_record(&self, id: &str) -> Result<String, PersistenceError> {
        check_id(id)?;
        std::fs::read_to_string(self.record_path(id)).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => PersistenceError::NotFound(id.to_string()),
            std::io::ErrorKind::InvalidData => PersistenceError::corrupt(id, e),
            _ => PersistenceError::Io(e),
        })
    }

    fn write_atomic(&self, dir: &Path, path: &Path, id: &str, contents: &str) -> Result<(), PersistenceError> {
        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .map_err(|e| PersistenceError::write_failed(id, e))?;
        tmp.write_all(contents.as_bytes())
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| PersistenceError::write_failed(id, e))?;
        tmp.persist(path)
            .map_err(|e| PersistenceError::write_failed(id, e.error))?;
        Ok(())
    }

    fn json_stems(dir: &Path) -> Result<Vec<String>, PersistenceError> {
        let mut stems = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                stems.push(stem.to_string());
            }
        }
        stems.sort();
        Ok(stems)
    }
}

impl SessionStore for FileSessionStore {
    fn create(&self, config: &LoopConfig) -> Result<String, PersistenceError> {
        let id = generate_session_id(&config.session_prefix, Utc::now(), |candidate| {
            self.record_path(candidate).exists()
        });
        let session = Session::new(id.clone(), config.clone());
        self.save(&session)?;
        tracing::info!(id = %id, "session created");
        Ok(id)
    }

    fn save(&self, session: &Session) -> Result<(), PersistenceError> {
        if !is_valid_id(&session.id) {
            return Err(PersistenceError::write_failed(
                session.id.clone(),
                "invalid session identifier",
            ));
        }
        let json = session.to_json()?;
        self.write_atomic(&self.root, &self.record_path(&session.id), &session.id, &json)?;
        tracing::debug!(id = %session.id, bytes = json.len(), "session saved");
        Ok(())
    }

    fn load(&self, id: &str) -> Result<Session, PersistenceError> {
        let json = self.read_record(id)?;
        let session = Session::from_json(id, &json)?;
        tracing::debug!(id = %id, comparisons = session.total_comparisons, "session loaded");
        Ok(session)
    }

    fn list(&self) -> Result<Vec<String>, PersistenceError> {
        Ok(Self::json_stems(&self.root)?
            .into_iter()
            .filter(|stem| is_valid_id(stem))
            .collect())
    }

    fn exists(&self, id: &str) -> Result<bool, PersistenceError> {
        Ok(is_valid_id(id) && self.record_path(id).is_file())
    }

    fn delete(&self, id: &str) -> Result<(), PersistenceError> {
        check_id(id)?;
        match std::fs::remove_file(self.record_path(id)) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PersistenceError::NotFound(id.to_string()))
            }
            Err(e) => return Err(PersistenceError::Io(e)),
        }
        for backup in self.list_backups(id)? {
            self.remove_backup(&backup)?;
        }
        tracing::info!(id = %id, "session deleted");
        Ok(())
    }

    fn get_info(&self, id: &str) -> Result<SessionInfo, PersistenceError> {
        let json = self.read_record(id)?;
        Ok(SessionHeader::parse(id, &json)?.into_info(json.len() as u64))
    }

    fn write_backup(&self, session: &Session) -> Result<String, PersistenceError> {
        let name = backup_name(session);
        let json = session.to_json()?;
        let dir = self.backup_dir();
        std::fs::create_dir_all(&dir)?;
        self.write_atomic(&dir, &dir.join(format!("{}.json", name)), &session.id, &json)?;
        Ok(name)
    }

    fn list_backups(&self, id: &str) -> Result<Vec<String>, PersistenceError> {
        let dir = self.backup_dir();
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        Ok(Self::json_stems(&dir)?
            .into_iter()
            .filter(|name| is_backup_of(name, id))
            .collect())
    }

    fn remove_backup(&self, name: &str) -> Result<(), PersistenceError> {
        match std::fs::remove_file(self.backup_dir().join(format!("{}.json", name))) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(PersistenceError::NotFound(name.to_string()))
            }
            Err(e) => Err(PersistenceError::Io(e)),
        }
    }
}
