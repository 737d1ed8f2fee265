//! Reduction of a session's tracked events into conversation messages.

use crate::track::TrackEvent;
use crate::CUSTOM_EVENT_USER_MESSAGE;
use agui_protocol::{Event, EventCodecError, Message, Role, ToolCall};
use serde_json::{json, Value};
use std::collections::HashMap;

#[derive(Debug, thiserror::Error)]
pub enum ReduceError {
    #[error("unmarshal track event payload: {0}")]
    Decode(#[from] EventCodecError),

    #[error("decode user message: {0}")]
    UserMessage(#[source] serde_json::Error),

    #[error("unsupported role: {0}")]
    UnsupportedRole(Role),

    #[error("text message start missing id")]
    TextStartMissingId,

    #[error("duplicate text message start: {0}")]
    DuplicateTextStart(String),

    #[error("text message content without start: {0}")]
    TextContentWithoutStart(String),

    #[error("text message content after end: {0}")]
    TextContentAfterEnd(String),

    #[error("text message end without start: {0}")]
    TextEndWithoutStart(String),

    #[error("duplicate text message end: {0}")]
    DuplicateTextEnd(String),

    #[error("text message chunk missing id")]
    TextChunkMissingId,

    #[error("duplicate text message chunk: {0}")]
    DuplicateTextChunk(String),

    #[error("tool call start missing id")]
    ToolStartMissingId,

    #[error("duplicate tool call start: {0}")]
    DuplicateToolStart(String),

    #[error("tool call start missing parent message id")]
    ToolStartMissingParent,

    #[error("tool call args without start: {0}")]
    ToolArgsWithoutStart(String),

    #[error("tool call args invalid phase: {0}")]
    ToolArgsInvalidPhase(String),

    #[error("tool call end without start: {0}")]
    ToolEndWithoutStart(String),

    #[error("duplicate tool call end: {0}")]
    DuplicateToolEnd(String),

    #[error("tool call end missing parent message: {0}")]
    ToolEndMissingParent(String),

    #[error("tool call result missing identifiers")]
    ToolResultMissingIds,

    #[error("tool call result without completed call: {0}")]
    ToolResultWithoutCall(String),

    #[error("text message {0} not closed")]
    TextNotClosed(String),

    #[error("tool call {0} not completed")]
    ToolCallNotCompleted(String),
}

/// Messages recovered from a track, plus the first failure if any.
///
/// On failure the messages reduced so far are still returned.
#[derive(Debug, Default)]
pub struct Reduction {
    pub messages: Vec<Message>,
    pub error: Option<ReduceError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextPhase {
    Receiving,
    Ended,
}

#[derive(Debug)]
struct TextState {
    content: String,
    phase: TextPhase,
    index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ToolPhase {
    AwaitingArgs,
    AwaitingResult,
    Completed,
}

#[derive(Debug)]
struct ToolCallState {
    message_id: String,
    arguments: String,
    phase: ToolPhase,
    index: usize,
}

struct Reducer<'a> {
    app_name: &'a str,
    user_id: &'a str,
    texts: HashMap<String, TextState>,
    text_order: Vec<String>,
    tool_calls: HashMap<String, ToolCallState>,
    tool_order: Vec<String>,
    messages: Vec<Message>,
}

/// Reduce `events` into the messages a client would have rendered.
///
/// Deterministic over its input.
pub fn reduce(app_name: &str, user_id: &str, events: &[TrackEvent]) -> Reduction {
    let mut reducer = Reducer {
        app_name,
        user_id,
        texts: HashMap::new(),
        text_order: Vec::new(),
        tool_calls: HashMap::new(),
        tool_order: Vec::new(),
        messages: Vec::new(),
    };
    let result = events
        .iter()
        .try_for_each(|event| reducer.reduce(event))
        .and_then(|()| reducer.finalize());
    Reduction {
        messages: reducer.messages,
        error: result.err(),
    }
}

impl Reducer<'_> {
    fn reduce(&mut self, track_event: &TrackEvent) -> Result<(), ReduceError> {
        if track_event.payload.is_empty() {
            return Ok(());
        }
        let event = track_event.decode()?;
        match event {
            Event::TextMessageStart {
                message_id, role, ..
            } => self.text_start(message_id, role),
            Event::TextMessageContent {
                message_id, delta, ..
            } => self.text_content(&message_id, &delta),
            Event::TextMessageEnd { message_id, .. } => self.text_end(&message_id),
            Event::TextMessageChunk {
                message_id,
                role,
                delta,
                ..
            } => self.text_chunk(message_id, role, delta),
            Event::ToolCallStart {
                tool_call_id,
                tool_call_name,
                parent_message_id,
                ..
            } => self.tool_start(tool_call_id, tool_call_name, parent_message_id),
            Event::ToolCallArgs {
                tool_call_id,
                delta,
                ..
            } => self.tool_args(&tool_call_id, &delta),
            Event::ToolCallEnd { tool_call_id, .. } => self.tool_end(&tool_call_id),
            Event::ToolCallResult {
                message_id,
                tool_call_id,
                content,
                role,
                ..
            } => self.tool_result(message_id, tool_call_id, content, role),
            Event::Custom { name, value, .. } if name == CUSTOM_EVENT_USER_MESSAGE => {
                self.user_message(value)
            }
            Event::RunStarted { .. } | Event::RunFinished { .. } | Event::RunError { .. } => Ok(()),
            other => {
                self.activity(other, track_event.timestamp);
                Ok(())
            }
        }
    }

    fn name_for(&self, role: Role) -> Result<String, ReduceError> {
        match role {
            Role::User => Ok(self.user_id.to_string()),
            Role::Assistant => Ok(self.app_name.to_string()),
            other => Err(ReduceError::UnsupportedRole(other)),
        }
    }

    fn push_text(&mut self, id: String, message: Message, content: String, phase: TextPhase) {
        self.messages.push(message);
        self.text_order.push(id.clone());
        self.texts.insert(
            id,
            TextState {
                content,
                phase,
                index: self.messages.len() - 1,
            },
        );
    }

    fn text_start(&mut self, id: String, role: Role) -> Result<(), ReduceError> {
        if id.is_empty() {
            return Err(ReduceError::TextStartMissingId);
        }
        if self.texts.contains_key(&id) {
            return Err(ReduceError::DuplicateTextStart(id));
        }
        let name = self.name_for(role)?;
        let message = Message {
            id: Some(id.clone()),
            role,
            name: Some(name),
            ..Message::default()
        };
        self.push_text(id, message, String::new(), TextPhase::Receiving);
        Ok(())
    }

    fn text_content(&mut self, id: &str, delta: &str) -> Result<(), ReduceError> {
        let state = self
            .texts
            .get_mut(id)
            .ok_or_else(|| ReduceError::TextContentWithoutStart(id.to_string()))?;
        if state.phase != TextPhase::Receiving {
            return Err(ReduceError::TextContentAfterEnd(id.to_string()));
        }
        state.content.push_str(delta);
        Ok(())
    }

    fn text_end(&mut self, id: &str) -> Result<(), ReduceError> {
        let state = self
            .texts
            .get_mut(id)
            .ok_or_else(|| ReduceError::TextEndWithoutStart(id.to_string()))?;
        if state.phase != TextPhase::Receiving {
            return Err(ReduceError::DuplicateTextEnd(id.to_string()));
        }
        state.phase = TextPhase::Ended;
        self.messages[state.index].content = Some(Value::String(state.content.clone()));
        Ok(())
    }

    fn text_chunk(
        &mut self,
        id: Option<String>,
        role: Option<Role>,
        delta: Option<String>,
    ) -> Result<(), ReduceError> {
        let id = id
            .filter(|id| !id.is_empty())
            .ok_or(ReduceError::TextChunkMissingId)?;
        if self.texts.contains_key(&id) {
            return Err(ReduceError::DuplicateTextChunk(id));
        }
        let role = role.unwrap_or(Role::Assistant);
        let name = self.name_for(role)?;
        let content = delta.unwrap_or_default();
        let message = Message {
            id: Some(id.clone()),
            role,
            name: Some(name),
            content: Some(Value::String(content.clone())),
            ..Message::default()
        };
        self.push_text(id, message, content, TextPhase::Ended);
        Ok(())
    }

    fn tool_start(
        &mut self,
        id: String,
        name: String,
        parent: Option<String>,
    ) -> Result<(), ReduceError> {
        if id.is_empty() {
            return Err(ReduceError::ToolStartMissingId);
        }
        if self.tool_calls.contains_key(&id) {
            return Err(ReduceError::DuplicateToolStart(id));
        }
        let parent = parent.ok_or(ReduceError::ToolStartMissingParent)?;
        if !self.texts.contains_key(&parent) {
            // Tool calls without text get a synthesized assistant message.
            let message = Message {
                id: Some(parent.clone()),
                role: Role::Assistant,
                name: Some(self.app_name.to_string()),
                ..Message::default()
            };
            self.push_text(parent.clone(), message, String::new(), TextPhase::Ended);
        }
        let parent_index = self.texts[&parent].index;
        let calls = &mut self.messages[parent_index].tool_calls;
        calls.push(ToolCall::function(id.clone(), name));
        let index = calls.len() - 1;
        self.tool_order.push(id.clone());
        self.tool_calls.insert(
            id,
            ToolCallState {
                message_id: parent,
                arguments: String::new(),
                phase: ToolPhase::AwaitingArgs,
                index,
            },
        );
        Ok(())
    }

    fn tool_args(&mut self, id: &str, delta: &str) -> Result<(), ReduceError> {
        let state = self
            .tool_calls
            .get_mut(id)
            .ok_or_else(|| ReduceError::ToolArgsWithoutStart(id.to_string()))?;
        if state.phase != ToolPhase::AwaitingArgs {
            return Err(ReduceError::ToolArgsInvalidPhase(id.to_string()));
        }
        state.arguments.push_str(delta);
        Ok(())
    }

    fn tool_end(&mut self, id: &str) -> Result<(), ReduceError> {
        let state = self
            .tool_calls
            .get_mut(id)
            .ok_or_else(|| ReduceError::ToolEndWithoutStart(id.to_string()))?;
        if state.phase != ToolPhase::AwaitingArgs {
            return Err(ReduceError::DuplicateToolEnd(id.to_string()));
        }
        let parent = self
            .texts
            .get(&state.message_id)
            .ok_or_else(|| ReduceError::ToolEndMissingParent(state.message_id.clone()))?;
        self.messages[parent.index].tool_calls[state.index]
            .function
            .arguments = state.arguments.clone();
        state.phase = ToolPhase::AwaitingResult;
        Ok(())
    }

    fn tool_result(
        &mut self,
        message_id: String,
        tool_call_id: String,
        content: String,
        role: Option<Role>,
    ) -> Result<(), ReduceError> {
        if message_id.is_empty() || tool_call_id.is_empty() {
            return Err(ReduceError::ToolResultMissingIds);
        }
        let state = self
            .tool_calls
            .get_mut(&tool_call_id)
            .filter(|s| s.phase == ToolPhase::AwaitingResult)
            .ok_or_else(|| ReduceError::ToolResultWithoutCall(tool_call_id.clone()))?;
        state.phase = ToolPhase::Completed;
        self.messages.push(Message {
            id: Some(message_id),
            role: role.unwrap_or(Role::Tool),
            content: Some(Value::String(content)),
            tool_call_id: Some(tool_call_id),
            ..Message::default()
        });
        Ok(())
    }

    fn user_message(&mut self, value: Value) -> Result<(), ReduceError> {
        let mut message: Message =
            serde_json::from_value(value).map_err(ReduceError::UserMessage)?;
        if message.role != Role::User {
            return Err(ReduceError::UnsupportedRole(message.role));
        }
        if message.name.as_deref().map_or(true, str::is_empty) {
            message.name = Some(self.user_id.to_string());
        }
        self.messages.push(message);
        Ok(())
    }

    fn activity(&mut self, event: Event, timestamp: u64) {
        let kind = event.event_type();
        let content = match event {
            Event::StepStarted { step_name, .. } | Event::StepFinished { step_name, .. } => {
                json!({"stepName": step_name})
            }
            Event::StateSnapshot { snapshot, .. } => json!({"snapshot": snapshot}),
            Event::StateDelta { delta, .. } => json!({"delta": delta}),
            Event::MessagesSnapshot { messages, .. } => json!({"messages": messages}),
            Event::ActivitySnapshot {
                message_id,
                activity_type,
                content,
                replace,
                ..
            } => json!({
                "messageId": message_id,
                "activityType": activity_type,
                "content": content,
                "replace": replace,
            }),
            Event::ActivityDelta {
                message_id,
                activity_type,
                patch,
                ..
            } => json!({
                "messageId": message_id,
                "activityType": activity_type,
                "patch": patch,
            }),
            Event::Custom { name, value, .. } => json!({"name": name, "value": value}),
            Event::Raw { event, source, .. } => json!({"source": source, "event": event}),
            _ => return,
        };
        self.messages.push(
            Message::activity(kind, content).with_id(format!("activity-{timestamp}")),
        );
    }

    fn finalize(&self) -> Result<(), ReduceError> {
        for id in &self.text_order {
            if self.texts[id].phase != TextPhase::Ended {
                return Err(ReduceError::TextNotClosed(id.clone()));
            }
        }
        for id in &self.tool_order {
            if self.tool_calls[id].phase != ToolPhase::Completed {
                return Err(ReduceError::ToolCallNotCompleted(id.clone()));
            }
        }
        Ok(())
    }
}
