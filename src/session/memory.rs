//! In-memory session store

use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use super::record::{generate_session_id, is_valid_id, Session, SessionHeader, SessionInfo};
use super::store::{backup_name, check_id, is_backup_of, SessionStore};
use crate::config::LoopConfig;
use crate::error::PersistenceError;

/// Session store that keeps serialized records in memory
///
/// Records go through the same JSON encoding as [`super::FileSessionStore`],
/// so a save/load round trip behaves identically. Contents are lost on drop.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    records: Mutex<BTreeMap<String, String>>,
    backups: Mutex<BTreeMap<String, String>>,
}

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemorySessionStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the raw record for `id`
    pub fn put_raw(&self, id: impl Into<String>, json: impl Into<String>) {
        guard(&self.records).insert(id.into(), json.into());
    }

    fn read_record(&self, id: &str) -> Result<String, PersistenceError> {
        check_id(id)?;
        guard(&self.records)
            .get(id)
            .cloned()
            .ok_or_else(|| PersistenceError::NotFound(id.to_string()))
    }
}

impl SessionStore for MemorySessionStore {
    fn create(&self, config: &LoopConfig) -> Result<String, PersistenceError> {
        let id = {
            let records = guard(&self.records);
            generate_session_id(&config.session_prefix, Utc::now(), |candidate| {
                records.contains_key(candidate)
            })
        };
        self.save(&Session::new(id.clone(), config.clone()))?;
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
        guard(&self.records).insert(session.id.clone(), json);
        Ok(())
    }

    fn load(&self, id: &str) -> Result<Session, PersistenceError> {
        let json = self.read_record(id)?;
        Session::from_json(id, &json)
    }

    fn list(&self) -> Result<Vec<String>, PersistenceError> {
        Ok(guard(&self.records).keys().cloned().collect())
    }

    fn delete(&self, id: &str) -> Result<(), PersistenceError> {
        check_id(id)?;
        if guard(&self.records).remove(id).is_none() {
            return Err(PersistenceError::NotFound(id.to_string()));
        }
        guard(&self.backups).retain(|name, _| !is_backup_of(name, id));
        Ok(())
    }

    fn get_info(&self, id: &str) -> Result<SessionInfo, PersistenceError> {
        let json = self.read_record(id)?;
        Ok(SessionHeader::parse(id, &json)?.into_info(json.len() as u64))
    }

    fn write_backup(&self, session: &Session) -> Result<String, PersistenceError> {
        let json = session.to_json()?;
        let mut backups = guard(&self.backups);
        let base = backup_name(session);
        let mut name = base.clone();
        let mut n = 1;
        while backups.contains_key(&name) {
            name = format!("{}{}", base, n);
            n += 1;
        }
        backups.insert(name.clone(), json);
        Ok(name)
    }

    fn list_backups(&self, id: &str) -> Result<Vec<String>, PersistenceError> {
        Ok(guard(&self.backups)
            .keys()
            .filter(|name| is_backup_of(name, id))
            .cloned()
            .collect())
    }

    fn remove_backup(&self, name: &str) -> Result<(), PersistenceError> {
        guard(&self.backups)
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| PersistenceError::NotFound(name.to_string()))
    }
}
