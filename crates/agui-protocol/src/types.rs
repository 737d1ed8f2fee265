use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Role for AG-UI input/output messages.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Developer,
    System,
    #[default]
    Assistant,
    User,
    Tool,
    Activity,
    Reasoning,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Developer => "developer",
            Self::System => "system",
            Self::Assistant => "assistant",
            Self::User => "user",
            Self::Tool => "tool",
            Self::Activity => "activity",
            Self::Reasoning => "reasoning",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Function invocation carried by an assistant tool call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

/// Tool call attached to an assistant message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "default_tool_call_type")]
    pub call_type: String,
    pub function: FunctionCall,
}

fn default_tool_call_type() -> String {
    "function".to_string()
}

impl ToolCall {
    /// Create a function tool call with no arguments yet.
    pub fn function(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            call_type: default_tool_call_type(),
            function: FunctionCall {
                name: name.into(),
                arguments: String::new(),
            },
        }
    }
}

/// One structured part of a request message's content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InputContent {
    Text {
        text: String,
    },
    Binary {
        #[serde(rename = "mimeType", alias = "mime_type", default)]
        mime_type: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        filename: Option<String>,
    },
}

impl InputContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn binary_url(mime_type: impl Into<String>, url: impl Into<String>) -> Self {
        Self::Binary {
            mime_type: mime_type.into(),
            id: None,
            url: Some(url.into()),
            data: None,
            filename: None,
        }
    }
}

/// AG-UI message in a conversation.
///
/// The same shape is used for request messages and for the records carried by
/// `MESSAGES_SNAPSHOT`. `content` stays untyped because requests may carry a
/// string or a list of [`InputContent`] parts, and activity records carry an
/// object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Message {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub role: Role,
    #[serde(
        default,
        alias = "delta",
        alias = "parts",
        skip_serializing_if = "Option::is_none"
    )]
    pub content: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(
        rename = "toolCalls",
        alias = "tool_calls",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub tool_calls: Vec<ToolCall>,
    #[serde(
        rename = "toolCallId",
        alias = "tool_call_id",
        alias = "toolId",
        alias = "tool_id",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub tool_call_id: Option<String>,
    #[serde(
        rename = "toolName",
        alias = "tool_name",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub tool_name: Option<String>,
    #[serde(
        rename = "activityType",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub activity_type: Option<String>,
}

impl Message {
    fn with_role(role: Role, content: Option<Value>) -> Self {
        Self {
            role,
            content,
            ..Self::default()
        }
    }

    /// Create a user message with string content.
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, Some(Value::String(content.into())))
    }

    /// Create a user message from structured parts.
    pub fn user_parts(parts: Vec<InputContent>) -> Self {
        let parts = parts
            .into_iter()
            .filter_map(|p| serde_json::to_value(p).ok())
            .collect();
        Self::with_role(Role::User, Some(Value::Array(parts)))
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, Some(Value::String(content.into())))
    }

    /// Create a tool result message.
    pub fn tool(content: impl Into<String>, tool_call_id: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::with_role(Role::Tool, Some(Value::String(content.into())))
        }
    }

    /// Create an activity record.
    pub fn activity(activity_type: impl Into<String>, content: Value) -> Self {
        Self {
            activity_type: Some(activity_type.into()),
            ..Self::with_role(Role::Activity, Some(content))
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_tool_name(mut self, name: impl Into<String>) -> Self {
        self.tool_name = Some(name.into());
        self
    }

    /// String content, if the content is a plain string.
    pub fn text(&self) -> Option<&str> {
        self.content.as_ref().and_then(Value::as_str)
    }
}

/// AG-UI context entry from frontend readable values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Context {
    pub description: String,
    pub value: Value,
}

/// Frontend-declared tool definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tool {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

/// Request to run an AG-UI agent.
///
/// Accepts both camelCase and snake_case identifiers. Unknown top-level fields
/// are rejected.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct RunAgentInput {
    #[serde(rename = "threadId", alias = "thread_id")]
    pub thread_id: String,
    #[serde(rename = "runId", alias = "run_id", default)]
    pub run_id: String,
    #[serde(
        rename = "parentRunId",
        alias = "parent_run_id",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub parent_run_id: Option<String>,
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Tool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<Context>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<Value>,
    #[serde(
        rename = "forwardedProps",
        alias = "forwarded_props",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub forwarded_props: Option<Value>,
}

impl RunAgentInput {
    pub fn new(thread_id: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            run_id: run_id.into(),
            ..Self::default()
        }
    }

    pub fn with_message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    pub fn with_messages(mut self, messages: Vec<Message>) -> Self {
        self.messages.extend(messages);
        self
    }

    pub fn with_state(mut self, state: Value) -> Self {
        self.state = Some(state);
        self
    }

    pub fn with_forwarded_props(mut self, props: Value) -> Self {
        self.forwarded_props = Some(props);
        self
    }

    /// The last message of the conversation, which drives the run.
    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn run_agent_input_accepts_snake_case_aliases() {
        let input: RunAgentInput = serde_json::from_value(json!({
            "thread_id": "t1",
            "run_id": "r1",
            "messages": [{"role": "user", "content": "hi"}],
            "forwarded_props": {"k": 1}
        }))
        .unwrap();
        assert_eq!(input.thread_id, "t1");
        assert_eq!(input.run_id, "r1");
        assert_eq!(input.forwarded_props, Some(json!({"k": 1})));
        assert_eq!(input.messages[0].text(), Some("hi"));
    }

    #[test]
    fn run_agent_input_rejects_unknown_fields() {
        let err = serde_json::from_value::<RunAgentInput>(json!({
            "threadId": "t1",
            "runId": "r1",
            "messages": [],
            "surprise": true
        }))
        .unwrap_err();
        assert!(err.to_string().contains("surprise"));
    }

    #[test]
    fn run_agent_input_requires_messages() {
        let err = serde_json::from_value::<RunAgentInput>(json!({
            "threadId": "t1",
            "runId": "r1"
        }))
        .unwrap_err();
        assert!(err.to_string().contains("messages"));
    }

    #[test]
    fn tool_message_reads_tool_id_aliases() {
        let msg: Message = serde_json::from_value(json!({
            "role": "tool",
            "content": "42",
            "tool_id": "c1",
            "tool_name": "calc"
        }))
        .unwrap();
        assert_eq!(msg.tool_call_id.as_deref(), Some("c1"));
        assert_eq!(msg.tool_name.as_deref(), Some("calc"));
    }

    #[test]
    fn message_serializes_tool_calls_in_camel_case() {
        let mut msg = Message::assistant("").with_id("m1");
        msg.tool_calls.push(ToolCall::function("c1", "search"));
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["toolCalls"][0]["type"], "function");
        assert_eq!(value["toolCalls"][0]["function"]["name"], "search");
        assert!(value.get("toolCallId").is_none());
    }

    #[test]
    fn binary_part_round_trips_mime_type() {
        let part: InputContent = serde_json::from_value(json!({
            "type": "binary",
            "mimeType": "image/png",
            "url": "https://example.com/a.png"
        }))
        .unwrap();
        assert_eq!(
            part,
            InputContent::binary_url("image/png", "https://example.com/a.png")
        );
    }
}
