use super::{TranslateError, Translator};
use agui_contract::event::object;
use agui_contract::graph::{
    ModelExecutionMetadata, NodeCustomEventCategory, NodeCustomEventMetadata,
    ToolExecutionMetadata, ToolExecutionPhase, METADATA_KEY_MODEL, METADATA_KEY_NODE_CUSTOM,
    METADATA_KEY_TOOL,
};
use agui_contract::model::Role as EngineRole;
use agui_contract::{AgentEvent, Response};
use agui_protocol::{Event, Role};
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use tracing::error;

/// Text and tool-call framing state machine.
///
/// At most one text message is open at a time; a new message id closes the
/// previous one before it starts.
#[derive(Debug)]
pub struct DefaultTranslator {
    thread_id: String,
    run_id: String,
    last_message_id: String,
    receiving_message: bool,
    seen_response_ids: HashSet<String>,
    seen_tool_call_ids: HashSet<String>,
}

impl DefaultTranslator {
    pub fn new(thread_id: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            run_id: run_id.into(),
            last_message_id: String::new(),
            receiving_message: false,
            seen_response_ids: HashSet::new(),
            seen_tool_call_ids: HashSet::new(),
        }
    }

    fn run_error(&self, message: impl Into<String>) -> Event {
        Event::run_error(message, Some(self.run_id.clone()))
    }

    /// Close the open text message, if any.
    fn close_open_message(&mut self, events: &mut Vec<Event>) {
        if self.receiving_message {
            events.push(Event::text_message_end(self.last_message_id.clone()));
            self.receiving_message = false;
        }
    }

    fn decode_metadata<T: DeserializeOwned>(
        &self,
        event: &AgentEvent,
        key: &str,
        kind: &'static str,
    ) -> Result<Option<T>, Event> {
        let Some(raw) = event.state_delta_value(key) else {
            return Ok(None);
        };
        serde_json::from_slice(raw).map(Some).map_err(|source| {
            self.run_error(TranslateError::InvalidMetadata { kind, source }.to_string())
        })
    }

    // ------------------------------------------------------------------
    // Chat responses
    // ------------------------------------------------------------------

    fn chunk_events(&mut self, rsp: &Response, events: &mut Vec<Event>) {
        let Some(choice) = rsp.choices.first() else {
            return;
        };
        self.seen_response_ids.insert(rsp.id.clone());
        let delta = choice.delta.content.as_str();
        if self.last_message_id == rsp.id {
            if !self.receiving_message {
                // Already closed by a finish reason.
                return;
            }
        } else {
            if delta.is_empty() {
                return;
            }
            self.close_open_message(events);
            self.last_message_id = rsp.id.clone();
            self.receiving_message = true;
            events.push(Event::text_message_start(
                rsp.id.clone(),
                protocol_role(choice.delta.role),
            ));
        }
        if !delta.is_empty() {
            events.push(Event::text_message_content(rsp.id.clone(), delta));
        }
        if choice.finish_reason.as_deref().is_some_and(|r| !r.is_empty()) {
            self.receiving_message = false;
            events.push(Event::text_message_end(rsp.id.clone()));
        }
    }

    fn completion_events(&mut self, rsp: &Response, events: &mut Vec<Event>) {
        let Some(choice) = rsp.choices.first() else {
            return;
        };
        self.seen_response_ids.insert(rsp.id.clone());
        if self.last_message_id == rsp.id {
            // Final aggregate of a streamed message.
            if self.receiving_message {
                self.receiving_message = false;
                events.push(Event::text_message_end(rsp.id.clone()));
            }
            return;
        }
        let content = choice.message.content.as_str();
        if content.is_empty() {
            return;
        }
        self.close_open_message(events);
        self.last_message_id = rsp.id.clone();
        events.push(Event::text_message_start(
            rsp.id.clone(),
            protocol_role(choice.message.role),
        ));
        events.push(Event::text_message_content(rsp.id.clone(), content));
        events.push(Event::text_message_end(rsp.id.clone()));
    }

    fn tool_call_events(&mut self, rsp: &Response, events: &mut Vec<Event>) {
        let parent = (!rsp.id.is_empty()).then(|| rsp.id.clone());
        for choice in &rsp.choices {
            for call in &choice.message.tool_calls {
                if !self.seen_tool_call_ids.insert(call.id.clone()) {
                    continue;
                }
                events.push(Event::tool_call_start(
                    call.id.clone(),
                    call.function.name.clone(),
                    parent.clone(),
                ));
                if !call.function.arguments.is_empty() {
                    events.push(Event::tool_call_args(
                        call.id.clone(),
                        call.function.arguments.clone(),
                    ));
                }
                events.push(Event::tool_call_end(call.id.clone()));
            }
        }
        if !self.receiving_message {
            self.last_message_id = rsp.id.clone();
        }
    }

    fn tool_result_events(&mut self, event: &AgentEvent, rsp: &Response, events: &mut Vec<Event>) {
        let message_id = [event.id.as_str(), rsp.id.as_str()]
            .into_iter()
            .find(|id| !id.is_empty())
            .map_or_else(|| uuid::Uuid::new_v4().to_string(), str::to_string);
        for choice in &rsp.choices {
            let result = &choice.message;
            if result.tool_id.is_empty() {
                continue;
            }
            events.push(Event::tool_call_result(
                message_id.clone(),
                result.tool_id.clone(),
                result.content.clone(),
            ));
        }
        if !self.receiving_message {
            self.last_message_id = message_id;
        }
    }

    // ------------------------------------------------------------------
    // Graph metadata
    // ------------------------------------------------------------------

    fn graph_model_events(&mut self, event: &AgentEvent, events: &mut Vec<Event>) {
        let meta: ModelExecutionMetadata =
            match self.decode_metadata(event, METADATA_KEY_MODEL, "model") {
                Ok(Some(meta)) => meta,
                Ok(None) => return,
                Err(run_error) => return events.push(run_error),
            };
        if meta.output.is_empty() || self.seen_response_ids.contains(&meta.response_id) {
            return;
        }
        if self.last_message_id != meta.response_id {
            self.close_open_message(events);
        }
        let id = meta.response_id;
        events.push(Event::text_message_start(id.clone(), Role::Assistant));
        events.push(Event::text_message_content(id.clone(), meta.output));
        events.push(Event::text_message_end(id.clone()));
        self.receiving_message = false;
        self.seen_response_ids.insert(id.clone());
        self.last_message_id = id;
    }

    fn graph_tool_events(&mut self, event: &AgentEvent, events: &mut Vec<Event>) {
        let meta: ToolExecutionMetadata =
            match self.decode_metadata(event, METADATA_KEY_TOOL, "tool") {
                Ok(Some(meta)) => meta,
                Ok(None) => return,
                Err(run_error) => return events.push(run_error),
            };
        if meta.phase != ToolExecutionPhase::Start || self.seen_tool_call_ids.contains(&meta.tool_id)
        {
            return;
        }
        let parent = (!meta.response_id.is_empty()).then(|| meta.response_id.clone());
        events.push(Event::tool_call_start(
            meta.tool_id.clone(),
            meta.tool_name,
            parent,
        ));
        if !meta.input.trim().is_empty() {
            events.push(Event::tool_call_args(meta.tool_id.clone(), meta.input));
        }
        events.push(Event::tool_call_end(meta.tool_id.clone()));
        self.seen_tool_call_ids.insert(meta.tool_id);
    }

    fn graph_node_custom_events(&mut self, event: &AgentEvent, events: &mut Vec<Event>) {
        let meta: NodeCustomEventMetadata =
            match self.decode_metadata(event, METADATA_KEY_NODE_CUSTOM, "node custom") {
                Ok(Some(meta)) => meta,
                Ok(None) => return,
                Err(run_error) => return events.push(run_error),
            };
        let name = |fallback: &str| {
            if meta.event_type.is_empty() {
                fallback.to_string()
            } else {
                meta.event_type.clone()
            }
        };
        let mut payload = Map::new();
        payload.insert("nodeId".into(), json!(meta.node_id));
        match meta.category {
            NodeCustomEventCategory::Progress => {
                payload.insert("progress".into(), json!(meta.progress));
                payload.insert("message".into(), json!(meta.message));
                insert_step(&mut payload, meta.step_number);
                events.push(Event::custom(name("node.progress"), Value::Object(payload)));
            }
            NodeCustomEventCategory::Text => {
                if self.receiving_message && !meta.message.is_empty() {
                    events.push(Event::text_message_content(
                        self.last_message_id.clone(),
                        meta.message,
                    ));
                    return;
                }
                payload.insert("content".into(), json!(meta.message));
                insert_step(&mut payload, meta.step_number);
                events.push(Event::custom(name("node.text"), Value::Object(payload)));
            }
            NodeCustomEventCategory::Custom => {
                if let Some(value) = meta.payload.clone() {
                    payload.insert("payload".into(), value);
                }
                if !meta.message.is_empty() {
                    payload.insert("message".into(), json!(meta.message));
                }
                insert_step(&mut payload, meta.step_number);
                payload.insert("timestamp".into(), json!(meta.timestamp));
                events.push(Event::custom(name("node.custom"), Value::Object(payload)));
            }
        }
    }
}

fn insert_step(payload: &mut Map<String, Value>, step_number: i64) {
    if step_number > 0 {
        payload.insert("stepNumber".into(), json!(step_number));
    }
}

fn protocol_role(role: EngineRole) -> Role {
    match role {
        EngineRole::System => Role::System,
        EngineRole::User => Role::User,
        EngineRole::Assistant => Role::Assistant,
        EngineRole::Tool => Role::Tool,
    }
}

impl Translator for DefaultTranslator {
    fn translate(&mut self, event: &AgentEvent) -> Result<Vec<Event>, TranslateError> {
        let mut events = Vec::new();
        self.graph_model_events(event, &mut events);
        self.graph_tool_events(event, &mut events);
        self.graph_node_custom_events(event, &mut events);

        let Some(rsp) = event.response.as_ref() else {
            return Ok(events);
        };
        if let Some(err) = rsp.error.as_ref() {
            error!(
                thread_id = %self.thread_id,
                run_id = %self.run_id,
                error = %err.message,
                "engine response carried an error"
            );
            events.push(self.run_error(err.message.clone()));
            return Ok(events);
        }
        match rsp.object.as_str() {
            object::CHAT_COMPLETION_CHUNK => self.chunk_events(rsp, &mut events),
            object::CHAT_COMPLETION => self.completion_events(rsp, &mut events),
            _ => {}
        }
        if rsp.is_tool_call_response() {
            self.tool_call_events(rsp, &mut events);
        }
        if rsp.object == object::TOOL_RESPONSE || rsp.is_tool_result_response() {
            self.tool_result_events(event, rsp, &mut events);
        }
        if event.is_runner_completion() {
            self.close_open_message(&mut events);
            events.push(Event::run_finished(
                self.thread_id.clone(),
                self.run_id.clone(),
            ));
        }
        Ok(events)
    }
}
