//! Turns a raw user prompt and a logical intent into a dispatchable
//! [`gen_contract::GenerationRequest`].
//!
//! Sampling profiles come from a fixed per-intent table, prompts are rewritten
//! by an ordered rule table, and personalization is read from a remote
//! settings source with local and built-in fallbacks.

pub mod optimizer;
pub mod personalization;
pub mod profiles;
pub mod resolver;
pub mod validation;

pub use optimizer::optimize_prompt;
pub use personalization::{LocalPersonalization, PersonalizationResolver, PERSONALIZATION_TTL};
pub use profiles::{resolve_profile, resolve_profile_by_name};
pub use resolver::{RequestProfileResolver, ResolverConfig};
pub use validation::{validate_prompt, PromptValidationError, MAX_PROMPT_CHARS};

use std::sync::{Mutex, MutexGuard};

pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
