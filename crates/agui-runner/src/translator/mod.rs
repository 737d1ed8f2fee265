//! Per-run conversion of engine events into AG-UI events.

mod callbacks;
mod default;

pub use callbacks::{AfterTranslateCallback, BeforeTranslateCallback, TranslateCallbacks};
pub use default::DefaultTranslator;

use crate::error::BoxError;
use agui_contract::{AgentEvent, RunContext};
use agui_protocol::{Event, RunAgentInput};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum TranslateError {
    #[error("invalid graph {kind} metadata: {source}")]
    InvalidMetadata {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// Failure raised by a custom translator.
    #[error("{0}")]
    Other(String),
}

/// Stateful translator owned by a single run.
///
/// `translate` is called once per engine event, in stream order. Output
/// must keep every `*_CONTENT`/`*_ARGS`/`*_END` behind the matching `*_START`.
pub trait Translator: Send {
    fn translate(&mut self, event: &AgentEvent) -> Result<Vec<Event>, TranslateError>;
}

/// Switches for the graph activity families.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TranslatorOptions {
    pub graph_node_lifecycle_activity_enabled: bool,
    pub graph_node_interrupt_activity_enabled: bool,
    pub graph_node_interrupt_activity_top_level_only: bool,
}

pub type TranslatorFactory = Arc<
    dyn Fn(&RunContext, &RunAgentInput, &TranslatorOptions) -> Result<Box<dyn Translator>, BoxError>
        + Send
        + Sync,
>;

pub fn default_translator_factory() -> TranslatorFactory {
    Arc::new(
        |_: &RunContext, input: &RunAgentInput, _: &TranslatorOptions| {
            let translator: Box<dyn Translator> =
                Box::new(DefaultTranslator::new(&input.thread_id, &input.run_id));
            Ok(translator)
        },
    )
}
