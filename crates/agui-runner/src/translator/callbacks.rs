use crate::error::BoxError;
use agui_contract::{AgentEvent, RunContext};
use agui_protocol::Event;
use std::sync::Arc;

/// Inspects or replaces an engine event before translation.
pub type BeforeTranslateCallback = Arc<
    dyn Fn(&RunContext, &AgentEvent) -> Result<Option<AgentEvent>, BoxError> + Send + Sync,
>;

/// Inspects or replaces an AG-UI event before it is emitted.
pub type AfterTranslateCallback =
    Arc<dyn Fn(&RunContext, &Event) -> Result<Option<Event>, BoxError> + Send + Sync>;

/// Ordered before/after translate callback chains.
///
/// Callbacks run in registration order. The first one returning `Some`
/// supplies the replacement and ends the chain; `None` passes to the next.
#[derive(Clone, Default)]
pub struct TranslateCallbacks {
    before: Vec<BeforeTranslateCallback>,
    after: Vec<AfterTranslateCallback>,
}

impl std::fmt::Debug for TranslateCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranslateCallbacks")
            .field("before", &self.before.len())
            .field("after", &self.after.len())
            .finish()
    }
}

impl TranslateCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn register_before_translate(mut self, callback: BeforeTranslateCallback) -> Self {
        self.before.push(callback);
        self
    }

    #[must_use]
    pub fn register_after_translate(mut self, callback: AfterTranslateCallback) -> Self {
        self.after.push(callback);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.before.is_empty() && self.after.is_empty()
    }

    pub fn run_before(
        &self,
        ctx: &RunContext,
        event: &AgentEvent,
    ) -> Result<Option<AgentEvent>, BoxError> {
        for callback in &self.before {
            if let Some(replacement) = callback(ctx, event)? {
                return Ok(Some(replacement));
            }
        }
        Ok(None)
    }

    pub fn run_after(&self, ctx: &RunContext, event: &Event) -> Result<Option<Event>, BoxError> {
        for callback in &self.after {
            if let Some(replacement) = callback(ctx, event)? {
                return Ok(Some(replacement));
            }
        }
        Ok(None)
    }
}
