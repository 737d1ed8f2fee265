//! Graph activity projection.
//!
//! Node lifecycle and interrupt metadata carried in an engine event's state
//! delta are re-emitted as `ACTIVITY_DELTA` events alongside the translator's
//! output.

use crate::translator::TranslatorOptions;
use agui_contract::graph::{
    Command, NodeExecutionMetadata, PregelStepMetadata, CFG_KEY_CHECKPOINT_ID, CFG_KEY_LINEAGE_ID,
    METADATA_KEY_NODE, METADATA_KEY_PREGEL, RESUME_CHANNEL, STATE_KEY_COMMAND,
    STATE_KEY_RESUME_MAP,
};
use agui_contract::AgentEvent;
use agui_protocol::Event;
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};

pub const ACTIVITY_GRAPH_NODE_LIFECYCLE: &str = "graph.node.lifecycle";
pub const ACTIVITY_GRAPH_NODE_INTERRUPT: &str = "graph.node.interrupt";

fn add_op(path: &str, value: Value) -> Value {
    json!({"op": "add", "path": path, "value": value})
}

fn decode<T: DeserializeOwned>(event: &AgentEvent, key: &str) -> Option<T> {
    let raw = event.state_delta_value(key)?;
    serde_json::from_slice(raw).ok()
}

/// The raw metadata object under `key`, if it also parses as `T`.
fn decode_validated<T: DeserializeOwned>(event: &AgentEvent, key: &str) -> Option<Value> {
    let raw: Value = decode(event, key)?;
    serde_json::from_value::<T>(raw.clone()).ok()?;
    Some(raw)
}

fn activity_message_id(event: &AgentEvent) -> String {
    if event.id.is_empty() {
        uuid::Uuid::new_v4().to_string()
    } else {
        event.id.clone()
    }
}

/// Project the graph activity carried by `event`. Malformed metadata is
/// skipped.
pub fn project_graph_activity(event: &AgentEvent, options: &TranslatorOptions) -> Vec<Event> {
    let mut events = Vec::new();
    if options.graph_node_lifecycle_activity_enabled {
        if let Some(value) = decode_validated::<NodeExecutionMetadata>(event, METADATA_KEY_NODE) {
            events.push(Event::activity_delta(
                activity_message_id(event),
                ACTIVITY_GRAPH_NODE_LIFECYCLE,
                vec![add_op("/node", value)],
            ));
        }
    }
    let interrupt_allowed = options.graph_node_interrupt_activity_enabled
        && (!options.graph_node_interrupt_activity_top_level_only || event.is_top_level());
    if interrupt_allowed {
        if let Some(meta) = decode::<PregelStepMetadata>(event, METADATA_KEY_PREGEL)
            .filter(PregelStepMetadata::has_interrupt)
        {
            if let Ok(value) = serde_json::to_value(&meta) {
                events.push(Event::activity_delta(
                    activity_message_id(event),
                    ACTIVITY_GRAPH_NODE_INTERRUPT,
                    vec![add_op("/interrupt", value)],
                ));
            }
        }
    }
    events
}

/// Acknowledge a resume request found in the run's runtime state.
///
/// Returns `None` when the state carries no resume signal, or when a resume
/// command binds an empty resume map.
pub fn resume_ack(runtime_state: &Map<String, Value>) -> Option<Event> {
    let mut payload = Map::new();
    let command = runtime_state
        .get(STATE_KEY_COMMAND)
        .and_then(|raw| serde_json::from_value::<Command>(raw.clone()).ok());

    match command {
        Some(Command {
            resume_map: Some(map),
            ..
        }) => {
            if map.is_empty() {
                return None;
            }
            payload.insert("resumeMap".into(), Value::Object(map));
        }
        Some(Command {
            resume: Some(value),
            ..
        }) => {
            payload.insert("resume".into(), value);
        }
        _ => {}
    }
    if payload.is_empty() {
        match runtime_state.get(STATE_KEY_RESUME_MAP) {
            Some(Value::Object(map)) if !map.is_empty() => {
                payload.insert("resumeMap".into(), Value::Object(map.clone()));
            }
            _ => {
                if let Some(value) = runtime_state.get(RESUME_CHANNEL) {
                    payload.insert("resume".into(), value.clone());
                }
            }
        }
    }
    if payload.is_empty() {
        return None;
    }
    for (state_key, payload_key) in [
        (CFG_KEY_LINEAGE_ID, "lineageId"),
        (CFG_KEY_CHECKPOINT_ID, "checkpointId"),
    ] {
        if let Some(id) = runtime_state
            .get(state_key)
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
        {
            payload.insert(payload_key.into(), json!(id));
        }
    }
    Some(Event::activity_delta(
        uuid::Uuid::new_v4().to_string(),
        ACTIVITY_GRAPH_NODE_INTERRUPT,
        vec![
            add_op("/interrupt", Value::Null),
            add_op("/resume", Value::Object(payload)),
        ],
    ))
}
