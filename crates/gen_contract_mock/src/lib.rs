//! Deterministic in-memory implementations of the `gen_contract` seams.
//!
//! This crate contains no transport/protocol logic and is intended for
//! contract-level integration testing of the assembler, resolver and store.

mod clock;
mod remote;
mod transport;

pub use clock::ManualClock;
pub use remote::{InMemoryRemoteHistory, ScriptedSettings};
pub use transport::{ScriptStep, ScriptedTransport};

use std::sync::{Mutex, MutexGuard};

pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
