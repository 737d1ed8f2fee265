//! AG-UI runner: drives an agent engine per request and streams its output
//! as AG-UI events, with per-session tracking and message snapshots.
#![allow(missing_docs)]

pub mod activity;
pub mod config;
mod emitter;
pub mod error;
pub mod hooks;
pub mod input;
pub mod reduce;
mod registry;
mod runner;
pub mod session;
mod snapshot;
pub mod track;
pub mod translator;

/// Name of the custom event that records a user turn in the track.
pub const CUSTOM_EVENT_USER_MESSAGE: &str = "user.message";

pub use config::{ConfigError, RunnerConfig};
pub use error::{BoxError, HookStage, RunnerError};
pub use hooks::{
    RunAgentInputHook, RunOptionResolver, SpanFields, StartSpan, StateResolver, UserIdResolver,
};
pub use input::{build_input_message, InputError, InputMessage, InputSource};
pub use reduce::{reduce, ReduceError, Reduction};
pub use runner::{EventStream, Runner, RunnerBuilder};
pub use session::SessionKey;
pub use track::{
    GetEventsOptions, MemoryTrackStore, SessionTracker, SessionTrackerOptions, TrackError,
    TrackEvent, TrackStore, Tracker,
};
pub use translator::{
    DefaultTranslator, TranslateCallbacks, TranslateError, Translator, TranslatorFactory,
    TranslatorOptions,
};
