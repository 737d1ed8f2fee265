#![allow(dead_code)]

use agui_contract::{
    AgentError, AgentEvent, AgentEventStream, AgentRunner, Message as EngineMessage, Response,
    RunContext, RunOptions,
};
use agui_protocol::Event;
use agui_runner::{EventStream, MemoryTrackStore, SessionTracker, SessionTrackerOptions};
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::{Arc, Mutex};

/// Arguments an engine was started with.
#[derive(Debug, Clone)]
pub struct Call {
    pub user_id: String,
    pub session_id: String,
    pub message: EngineMessage,
    pub options: RunOptions,
}

/// Replays a fixed list of events, then ends the stream.
#[derive(Default)]
pub struct ScriptedAgent {
    events: Vec<AgentEvent>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedAgent {
    pub fn new(events: Vec<AgentEvent>) -> Arc<Self> {
        Arc::new(Self {
            events,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AgentRunner for ScriptedAgent {
    async fn run(
        &self,
        _ctx: RunContext,
        user_id: &str,
        session_id: &str,
        message: EngineMessage,
        options: RunOptions,
    ) -> Result<AgentEventStream, AgentError> {
        self.calls.lock().unwrap().push(Call {
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
            message,
            options,
        });
        Ok(Box::pin(futures::stream::iter(self.events.clone())))
    }
}

/// Emits nothing until its run context is done.
pub struct HangingAgent;

#[async_trait]
impl AgentRunner for HangingAgent {
    async fn run(
        &self,
        ctx: RunContext,
        _user_id: &str,
        _session_id: &str,
        _message: EngineMessage,
        _options: RunOptions,
    ) -> Result<AgentEventStream, AgentError> {
        Ok(Box::pin(
            futures::stream::once(async move { ctx.done().await })
                .filter_map(|_| async { None::<AgentEvent> }),
        ))
    }
}

/// Keeps every context it was started with and ends its stream at once.
#[derive(Default)]
pub struct RecordingAgent {
    contexts: Mutex<Vec<RunContext>>,
}

impl RecordingAgent {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn contexts(&self) -> Vec<RunContext> {
        self.contexts.lock().unwrap().clone()
    }
}

#[async_trait]
impl AgentRunner for RecordingAgent {
    async fn run(
        &self,
        ctx: RunContext,
        _user_id: &str,
        _session_id: &str,
        _message: EngineMessage,
        _options: RunOptions,
    ) -> Result<AgentEventStream, AgentError> {
        self.contexts.lock().unwrap().push(ctx);
        Ok(Box::pin(futures::stream::empty()))
    }
}

/// Refuses to start.
pub struct FailingAgent;

#[async_trait]
impl AgentRunner for FailingAgent {
    async fn run(
        &self,
        _ctx: RunContext,
        _user_id: &str,
        _session_id: &str,
        _message: EngineMessage,
        _options: RunOptions,
    ) -> Result<AgentEventStream, AgentError> {
        Err(AgentError::run("model unavailable"))
    }
}

pub fn assistant_reply(id: &str, content: &str) -> AgentEvent {
    AgentEvent::new(format!("ev-{id}"), "assistant")
        .with_response(Response::chat_completion(id, content))
}

pub fn runner_completion() -> AgentEvent {
    AgentEvent::new("ev-done", "runner").with_response(Response::runner_completion())
}

pub fn memory_tracker() -> Arc<SessionTracker> {
    Arc::new(SessionTracker::new(
        Arc::new(MemoryTrackStore::new()),
        SessionTrackerOptions::default(),
    ))
}

pub async fn collect(stream: EventStream) -> Vec<Event> {
    stream.collect().await
}

pub fn event_types(events: &[Event]) -> Vec<&'static str> {
    events.iter().map(Event::event_type).collect()
}
