//! HTTP client for the code generation service.
//!
//! Owns request building, retry, and event-line parsing for the streaming
//! generation endpoint, plus the JSON history and settings endpoints. The
//! client implements the `gen_contract` transport and remote-store traits so
//! callers never see `reqwest` types.

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod headers;
pub mod payload;
pub mod remote;
pub mod retry;
pub mod sse;
pub mod url;

pub use client::{chunk_stream, GenApiClient};
pub use config::GenApiConfig;
pub use error::GenApiError;
pub use events::GenStreamEvent;
pub use payload::GenerateRequestBody;
pub use sse::EventLineParser;
pub use url::{endpoint_url, normalize_base_url, same_origin_link, Endpoint};
