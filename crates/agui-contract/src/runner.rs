use crate::context::RunContext;
use crate::event::AgentEvent;
use crate::model::Message;
use crate::options::RunOptions;
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Stream of events produced by one engine run. The engine ends the stream
/// when the run completes or its context is done.
pub type AgentEventStream = BoxStream<'static, AgentEvent>;

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("{0}")]
    Run(String),

    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl AgentError {
    pub fn run(message: impl Into<String>) -> Self {
        Self::Run(message.into())
    }
}

/// Agent engine driven by the AG-UI runner.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    /// Start a run for `session_id` with `message` as the new input.
    ///
    /// Returning `Err` means the run never started. Failures after the stream
    /// is returned are reported as events.
    async fn run(
        &self,
        ctx: RunContext,
        user_id: &str,
        session_id: &str,
        message: Message,
        options: RunOptions,
    ) -> Result<AgentEventStream, AgentError>;
}
