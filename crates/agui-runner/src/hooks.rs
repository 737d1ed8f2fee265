//! Pluggable request hooks consulted before a run starts.
//!
//! Hooks are plain shared closures. They run synchronously on the caller's
//! task and must not block.

use crate::error::BoxError;
use agui_contract::{RunContext, RunOption};
use agui_protocol::RunAgentInput;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Derives the user id component of the session key.
pub type UserIdResolver =
    Arc<dyn Fn(&RunContext, &RunAgentInput) -> Result<String, BoxError> + Send + Sync>;

/// Rewrites the request. `Ok(None)` keeps the input unchanged.
pub type RunAgentInputHook = Arc<
    dyn Fn(&RunContext, &RunAgentInput) -> Result<Option<RunAgentInput>, BoxError> + Send + Sync,
>;

/// Produces runtime state merged over the state supplied by run options.
pub type StateResolver = Arc<
    dyn Fn(&RunContext, &RunAgentInput) -> Result<Option<Map<String, Value>>, BoxError>
        + Send
        + Sync,
>;

/// Produces options forwarded to the engine.
pub type RunOptionResolver =
    Arc<dyn Fn(&RunContext, &RunAgentInput) -> Result<Vec<RunOption>, BoxError> + Send + Sync>;

/// Opens the span the run task is instrumented with.
pub type StartSpan = Arc<
    dyn Fn(&RunContext, &RunAgentInput, &SpanFields<'_>) -> Result<tracing::Span, BoxError>
        + Send
        + Sync,
>;

/// Identity of the run being started, handed to [`StartSpan`].
#[derive(Debug, Clone, Copy)]
pub struct SpanFields<'a> {
    pub app_name: &'a str,
    pub user_id: &'a str,
}

pub fn default_user_id_resolver() -> UserIdResolver {
    Arc::new(|_: &RunContext, _: &RunAgentInput| Ok("user".to_string()))
}

pub fn default_state_resolver() -> StateResolver {
    Arc::new(|_: &RunContext, _: &RunAgentInput| Ok(None))
}

pub fn default_run_option_resolver() -> RunOptionResolver {
    Arc::new(|_: &RunContext, _: &RunAgentInput| Ok(Vec::new()))
}

pub fn default_start_span() -> StartSpan {
    Arc::new(|_: &RunContext, input: &RunAgentInput, fields: &SpanFields<'_>| {
        Ok(tracing::info_span!(
            "agui.run",
            app_name = %fields.app_name,
            user_id = %fields.user_id,
            thread_id = %input.thread_id,
            run_id = %input.run_id,
        ))
    })
}

/// Apply `hooks` in order; each sees the output of the previous one.
pub(crate) fn apply_input_hooks(
    hooks: &[RunAgentInputHook],
    ctx: &RunContext,
    input: RunAgentInput,
) -> Result<RunAgentInput, BoxError> {
    let mut current = input;
    for hook in hooks {
        if let Some(next) = hook(ctx, &current)? {
            current = next;
        }
    }
    Ok(current)
}
