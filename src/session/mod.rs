//! Durable, resumable session state
//!
//! Use [`FileSessionStore`] for real sessions and [`MemorySessionStore`] in
//! tests or for throwaway runs.

mod memory;
mod record;
mod store;

pub use memory::MemorySessionStore;
pub use record::{generate_session_id, Session, SessionInfo, SESSION_VERSION};
pub(crate) use record::is_valid_id;
pub use store::{FileSessionStore, SessionStore};

/// Prelude for session module
pub mod prelude {
    pub use super::{FileSessionStore, MemorySessionStore, Session, SessionInfo, SessionStore};
}
