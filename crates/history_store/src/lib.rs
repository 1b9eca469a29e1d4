//! Durable conversation history: a capacity-bounded view persisted to a local
//! JSON file, merged with remote sessions on load, and written remotely in the
//! background on append.

pub mod error;
pub mod local;
pub mod merge;
pub mod pairing;
pub mod paths;
pub mod schema;
pub mod session;
pub mod store;

pub use error::HistoryStoreError;
pub use local::LocalHistoryFile;
pub use merge::merge;
pub use pairing::pair_entries;
pub use paths::history_file;
pub use schema::{ConversationTurn, HistoryView};
pub use session::{SessionCache, SESSION_TTL};
pub use store::{
    AppendOutcome, HistoryConfig, HistoryStore, RemoteWriteFailure, DEFAULT_CAPACITY,
};

use std::sync::{Mutex, MutexGuard};

pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
