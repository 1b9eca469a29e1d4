//! Reassembles a chunked generation stream into presentation bundles and a
//! final, sanitized artifact.
//!
//! [`StreamAssembler`] owns the per-request state machine. It can be fed
//! chunk events directly or drive a [`gen_contract::GenerationTransport`]
//! end to end with [`StreamAssembler::run`].

pub mod assembler;
pub mod bundler;
pub mod failure;
pub mod heuristics;
pub mod sanitize;
pub mod sentinels;
pub mod session;
pub mod state;

pub use assembler::{AssemblerConfig, AssemblyEvent, StreamAssembler, StreamEnding, StreamOutcome};
pub use failure::{FailureKind, StreamFailure};
pub use heuristics::{classify_prompt, EarlyTerminationPolicy, PromptClass};
pub use sanitize::{sanitize, SanitizeOptions};
pub use sentinels::STOP_SENTINELS;
pub use session::StreamSession;
pub use state::StreamState;
