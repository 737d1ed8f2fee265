//! Validation of a run request and conversion of its last message into the
//! engine's input message.

use agui_contract::model::{ContentPart, Message as EngineMessage};
use agui_protocol::{InputContent, Message, Role};
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("no messages provided")]
    NoMessages,

    #[error("last message role must be user or tool")]
    UnsupportedRole,

    #[error("tool message missing tool call id")]
    MissingToolCallId,

    #[error("last message content is not a string")]
    ContentNotString,

    #[error("unsupported input content type: {0}")]
    UnsupportedContentType(String),

    #[error("decode input content: {0}")]
    InvalidContent(#[source] serde_json::Error),

    #[error("binary input content requires a url")]
    MissingBinaryUrl,
}

/// Where the engine input came from.
#[derive(Debug, Clone, PartialEq)]
pub enum InputSource {
    /// A user turn; the record is tracked as a `user.message` custom event.
    User(Message),
    /// A tool result; replayed to the client as `TOOL_CALL_RESULT`.
    Tool {
        tool_call_id: String,
        content: String,
    },
}

/// Canonical input for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct InputMessage {
    pub message: EngineMessage,
    pub message_id: String,
    pub source: InputSource,
}

/// Build the engine input from the last request message.
pub fn build_input_message(messages: &[Message]) -> Result<InputMessage, InputError> {
    let last = messages.last().ok_or(InputError::NoMessages)?;
    let message_id = match last.id.as_deref() {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => uuid::Uuid::new_v4().to_string(),
    };

    match last.role {
        Role::User => {
            let message = match last.content.as_ref() {
                Some(Value::String(text)) => EngineMessage::user(text.clone()),
                Some(Value::Array(items)) => EngineMessage::user_parts(content_parts(items)?),
                _ => return Err(InputError::ContentNotString),
            };
            let record = Message {
                id: Some(message_id.clone()),
                ..last.clone()
            };
            Ok(InputMessage {
                message,
                message_id,
                source: InputSource::User(record),
            })
        }
        Role::Tool => {
            let tool_call_id = last
                .tool_call_id
                .as_deref()
                .filter(|id| !id.is_empty())
                .ok_or(InputError::MissingToolCallId)?
                .to_string();
            let content = match last.content.as_ref() {
                Some(Value::String(text)) => text.clone(),
                _ => return Err(InputError::ContentNotString),
            };
            let tool_name = [&last.tool_name, &last.name]
                .into_iter()
                .flatten()
                .find(|name| !name.is_empty())
                .cloned()
                .unwrap_or_default();
            Ok(InputMessage {
                message: EngineMessage::tool(tool_call_id.clone(), tool_name, content.clone()),
                message_id,
                source: InputSource::Tool {
                    tool_call_id,
                    content,
                },
            })
        }
        _ => Err(InputError::UnsupportedRole),
    }
}

/// Decode each array element into a typed part, then map it to the engine's
/// content part. Binary parts become images with the URL passed through.
fn content_parts(items: &[Value]) -> Result<Vec<ContentPart>, InputError> {
    items
        .iter()
        .map(|item| {
            let kind = item.get("type").and_then(Value::as_str).unwrap_or_default();
            if kind != "text" && kind != "binary" {
                return Err(InputError::UnsupportedContentType(kind.to_string()));
            }
            let part: InputContent =
                serde_json::from_value(item.clone()).map_err(InputError::InvalidContent)?;
            match part {
                InputContent::Text { text } => Ok(ContentPart::text(text)),
                InputContent::Binary { mime_type, url, .. } => {
                    let url = url
                        .filter(|u| !u.is_empty())
                        .ok_or(InputError::MissingBinaryUrl)?;
                    Ok(ContentPart::image_url(url, mime_type))
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use agui_contract::model::Role as EngineRole;
    use serde_json::json;

    fn message(value: Value) -> Message {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn empty_messages_fail() {
        let err = build_input_message(&[]).unwrap_err();
        assert_eq!(err.to_string(), "no messages provided");
    }

    #[test]
    fn assistant_last_message_fails() {
        let err = build_input_message(&[Message::assistant("hi")]).unwrap_err();
        assert_eq!(err.to_string(), "last message role must be user or tool");
    }

    #[test]
    fn tool_message_requires_call_id() {
        let msg = message(json!({"role": "tool", "content": "42"}));
        let err = build_input_message(&[msg]).unwrap_err();
        assert_eq!(err.to_string(), "tool message missing tool call id");
    }

    #[test]
    fn object_content_is_rejected() {
        let msg = message(json!({"role": "user", "content": {"text": "hi"}}));
        let err = build_input_message(&[msg]).unwrap_err();
        assert_eq!(err.to_string(), "last message content is not a string");

        let msg = message(json!({"role": "user"}));
        assert!(matches!(
            build_input_message(&[msg]),
            Err(InputError::ContentNotString)
        ));
    }

    #[test]
    fn user_string_content_passes_through() {
        let built = build_input_message(&[Message::user("hi").with_id("u1")]).unwrap();
        assert_eq!(built.message_id, "u1");
        assert_eq!(built.message.role, EngineRole::User);
        assert_eq!(built.message.content, "hi");
        match built.source {
            InputSource::User(record) => {
                assert_eq!(record.id.as_deref(), Some("u1"));
                assert_eq!(record.text(), Some("hi"));
            }
            other => panic!("unexpected source: {other:?}"),
        }
    }

    #[test]
    fn missing_id_is_generated() {
        let built = build_input_message(&[Message::user("hi")]).unwrap();
        assert!(!built.message_id.is_empty());
        match built.source {
            InputSource::User(record) => assert_eq!(record.id, Some(built.message_id)),
            other => panic!("unexpected source: {other:?}"),
        }
    }

    #[test]
    fn array_content_maps_binary_to_image() {
        let msg = message(json!({
            "role": "user",
            "content": [
                {"type": "text", "text": "describe"},
                {"type": "binary", "mimeType": "image/png", "url": "https://cdn.example/a.png"}
            ]
        }));
        let built = build_input_message(&[msg]).unwrap();
        assert!(built.message.content.is_empty());
        assert_eq!(
            built.message.content_parts,
            vec![
                ContentPart::text("describe"),
                ContentPart::Image {
                    url: "https://cdn.example/a.png".into(),
                    detail: String::new(),
                    mime_type: "image/png".into(),
                },
            ]
        );
    }

    #[test]
    fn unknown_part_type_is_rejected() {
        let msg = message(json!({
            "role": "user",
            "content": [{"type": "video", "url": "x"}]
        }));
        let err = build_input_message(&[msg]).unwrap_err();
        assert_eq!(err.to_string(), "unsupported input content type: video");
    }

    #[test]
    fn tool_name_falls_back_to_message_name() {
        let msg = message(json!({
            "role": "tool",
            "content": "42",
            "toolCallId": "c1",
            "name": "calc"
        }));
        let built = build_input_message(&[msg]).unwrap();
        assert_eq!(built.message.tool_name, "calc");
    }

    #[test]
    fn tool_message_builds_tool_input() {
        let msg = message(json!({
            "id": "tm1",
            "role": "tool",
            "content": "42",
            "toolCallId": "c1",
            "toolName": "calc"
        }));
        let built = build_input_message(&[Message::user("q"), msg]).unwrap();
        assert_eq!(built.message_id, "tm1");
        assert_eq!(built.message.role, EngineRole::Tool);
        assert_eq!(built.message.tool_id, "c1");
        assert_eq!(built.message.tool_name, "calc");
        assert_eq!(
            built.source,
            InputSource::Tool {
                tool_call_id: "c1".into(),
                content: "42".into()
            }
        );
    }
}
