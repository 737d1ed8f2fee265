//! Events yielded by an agent engine.

use crate::model::{Message, Role};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Well-known values of [`Response::object`].
pub mod object {
    pub const CHAT_COMPLETION: &str = "chat.completion";
    pub const CHAT_COMPLETION_CHUNK: &str = "chat.completion.chunk";
    pub const TOOL_RESPONSE: &str = "tool.response";
    pub const RUNNER_COMPLETION: &str = "runner.completion";
    pub const ERROR: &str = "error";
    pub const STATE_UPDATE: &str = "state.update";
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ResponseError {
    pub message: String,
    #[serde(rename = "type", default)]
    pub error_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Choice {
    #[serde(default)]
    pub index: u32,
    /// Complete message (non-streaming responses).
    #[serde(default)]
    pub message: Message,
    /// Incremental message (streaming chunks).
    #[serde(default)]
    pub delta: Message,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

/// Model or runner output carried by an [`AgentEvent`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Response {
    pub id: String,
    /// One of [`object`], or empty for echoed user input.
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
    #[serde(default)]
    pub done: bool,
}

impl Response {
    /// Complete (non-streaming) chat response with one assistant message.
    pub fn chat_completion(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            object: object::CHAT_COMPLETION.to_string(),
            choices: vec![Choice {
                message: Message::assistant(content),
                ..Choice::default()
            }],
            done: true,
            ..Self::default()
        }
    }

    /// Streaming chunk carrying a content delta.
    pub fn chunk(id: impl Into<String>, delta: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            object: object::CHAT_COMPLETION_CHUNK.to_string(),
            choices: vec![Choice {
                delta: Message {
                    role: Role::Assistant,
                    content: delta.into(),
                    ..Message::default()
                },
                ..Choice::default()
            }],
            ..Self::default()
        }
    }

    pub fn with_finish_reason(mut self, reason: impl Into<String>) -> Self {
        if let Some(choice) = self.choices.first_mut() {
            choice.finish_reason = Some(reason.into());
        }
        self
    }

    pub fn tool_result(
        id: impl Into<String>,
        tool_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            object: object::TOOL_RESPONSE.to_string(),
            choices: vec![Choice {
                message: Message::tool(tool_id, tool_name, content),
                ..Choice::default()
            }],
            done: true,
            ..Self::default()
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            object: object::ERROR.to_string(),
            error: Some(ResponseError {
                message: message.into(),
                ..ResponseError::default()
            }),
            done: true,
            ..Self::default()
        }
    }

    pub fn runner_completion() -> Self {
        Self {
            object: object::RUNNER_COMPLETION.to_string(),
            done: true,
            ..Self::default()
        }
    }

    /// The first choice carries complete tool calls.
    pub fn is_tool_call_response(&self) -> bool {
        self.choices.first().is_some_and(|c| {
            !c.message.tool_calls.is_empty() || !c.delta.tool_calls.is_empty()
        })
    }

    /// The first choice carries a tool result.
    pub fn is_tool_result_response(&self) -> bool {
        self.choices
            .first()
            .is_some_and(|c| !c.message.tool_id.is_empty() || !c.delta.tool_id.is_empty())
    }
}

/// One event yielded by the engine's stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AgentEvent {
    pub id: String,
    #[serde(default)]
    pub invocation_id: String,
    /// Set for events produced by nested invocations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_invocation_id: Option<String>,
    #[serde(default)]
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Response>,
    /// Raw JSON blobs keyed by well-known metadata keys.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub state_delta: HashMap<String, Vec<u8>>,
}

impl AgentEvent {
    pub fn new(id: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            author: author.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_response(mut self, response: Response) -> Self {
        self.response = Some(response);
        self
    }

    #[must_use]
    pub fn with_state_delta(mut self, key: impl Into<String>, raw: Vec<u8>) -> Self {
        self.state_delta.insert(key.into(), raw);
        self
    }

    #[must_use]
    pub fn with_parent_invocation(mut self, parent: impl Into<String>) -> Self {
        self.parent_invocation_id = Some(parent.into());
        self
    }

    /// Terminal marker emitted by the engine's runner after the last event.
    pub fn is_runner_completion(&self) -> bool {
        self.response
            .as_ref()
            .is_some_and(|r| r.object == object::RUNNER_COMPLETION)
    }

    /// Produced by the invocation the run started, not by a nested one.
    pub fn is_top_level(&self) -> bool {
        self.parent_invocation_id
            .as_deref()
            .map_or(true, str::is_empty)
    }

    pub fn state_delta_value(&self, key: &str) -> Option<&[u8]> {
        self.state_delta
            .get(key)
            .map(Vec::as_slice)
            .filter(|raw| !raw.is_empty())
    }
}
