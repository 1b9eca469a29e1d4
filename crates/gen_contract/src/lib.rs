//! Shared contract between the generation transport, the stream assembler and
//! the history store.
//!
//! This crate defines request/profile types, chunk events, the cancellation
//! signal, the injectable clock and the async seams (`GenerationTransport`,
//! `RemoteHistory`, `SettingsSource`). It contains no HTTP or persistence code.

pub mod cancel;
pub mod chunk;
pub mod clock;
pub mod remote;
pub mod request;
pub mod transport;

pub use cancel::{await_or_cancel, cancel_signal, is_cancelled, CancelSignal, Cancelled};
pub use chunk::{ChunkEvent, ChunkKind};
pub use clock::{Clock, SharedClock, SystemClock, TimedValue};
pub use remote::{
    EntryKind, NewRemoteEntry, RemoteEntry, RemoteError, RemoteHistory, RemoteSession,
    RemoteSetting, SettingsSource,
};
pub use request::{
    ExplanationDetail, GenerationRequest, Intent, PersonalizationProfile, SamplingProfile,
    SkillLevel, DEFAULT_PROJECT_CONTEXT,
};
pub use transport::{ChunkStream, GenerationTransport, TransportError};
