//! Streaming code generation client.
//!
//! [`Orchestrator`] ties the workspace crates together: `request_profile`
//! turns a raw prompt into a generation request, `stream_assembler` consumes
//! the chunk stream from a `gen_contract::GenerationTransport`, and
//! `history_store` records finished turns locally and remotely.

pub mod config;
pub mod logging;
pub mod orchestrator;

pub use config::EnvConfig;
pub use logging::init_logging;
pub use orchestrator::{Orchestrator, SetupError, SubmitError, Submission, CONTINUE_TIMEOUT};

use std::sync::{Mutex, MutexGuard};

pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
