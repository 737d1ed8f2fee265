use crate::input::InputError;
use std::fmt;

/// Error type returned by pluggable hooks and callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Pre-run stage whose hook failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookStage {
    RunInputHook,
    ResolveUserId,
    ResolveState,
    ResolveRunOption,
    StartSpan,
    CreateTranslator,
}

impl fmt::Display for HookStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::RunInputHook => "run input hook",
            Self::ResolveUserId => "resolve user ID",
            Self::ResolveState => "resolve state",
            Self::ResolveRunOption => "resolve run option",
            Self::StartSpan => "start span",
            Self::CreateTranslator => "create translator",
        })
    }
}

/// Synchronous failures of [`Runner`](crate::Runner) operations.
///
/// None of these are surfaced as AG-UI events; callers get them before any
/// stream is opened.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// Another run holds the session key.
    #[error("run already exists")]
    AlreadyExists,

    /// No in-flight run for the session key.
    #[error("run not found")]
    NotFound,

    #[error("{0}")]
    MissingConfig(&'static str),

    #[error("invalid run input: {0}")]
    InvalidInput(String),

    #[error("build input message: {0}")]
    BuildInput(#[from] InputError),

    #[error("{stage}: {source}")]
    Hook {
        stage: HookStage,
        #[source]
        source: BoxError,
    },
}

impl RunnerError {
    pub(crate) fn hook(stage: HookStage) -> impl FnOnce(BoxError) -> Self {
        move |source| Self::Hook { stage, source }
    }
}
