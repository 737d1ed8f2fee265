//! Graph execution metadata carried in [`AgentEvent::state_delta`] and the
//! runtime-state keys that drive checkpoint resume.
//!
//! [`AgentEvent::state_delta`]: crate::event::AgentEvent::state_delta

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ============================================================================
// State Delta Keys
// ============================================================================

pub const METADATA_KEY_NODE: &str = "_node_metadata";
pub const METADATA_KEY_PREGEL: &str = "_pregel_metadata";
pub const METADATA_KEY_MODEL: &str = "_model_metadata";
pub const METADATA_KEY_TOOL: &str = "_tool_metadata";
pub const METADATA_KEY_NODE_CUSTOM: &str = "_node_custom_metadata";

// ============================================================================
// Runtime State Keys
// ============================================================================

pub const CFG_KEY_LINEAGE_ID: &str = "lineage_id";
pub const CFG_KEY_CHECKPOINT_ID: &str = "checkpoint_id";
/// Holds a [`Command`] issued to resume an interrupted graph.
pub const STATE_KEY_COMMAND: &str = "__command__";
/// Holds a map from interrupt key to resume value.
pub const STATE_KEY_RESUME_MAP: &str = "__resume_map__";
/// Holds a single resume value; an explicit `null` still counts as a resume.
pub const RESUME_CHANNEL: &str = "__resume__";

// ============================================================================
// Node Lifecycle
// ============================================================================

pub const NODE_TYPE_FUNCTION: &str = "function";
pub const NODE_TYPE_LLM: &str = "llm";
pub const NODE_TYPE_TOOL: &str = "tool";
pub const NODE_TYPE_JOIN: &str = "join";
pub const NODE_TYPE_ROUTER: &str = "router";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionPhase {
    Start,
    #[serde(alias = "end")]
    Complete,
    Error,
}

/// Node lifecycle metadata. Only the identifying fields are typed; graph
/// engines attach more (timings, keys, tool calls) which consumers should
/// read from the raw payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeExecutionMetadata {
    #[serde(rename = "nodeId")]
    pub node_id: String,
    /// One of the `NODE_TYPE_*` constants, or an engine-defined type.
    #[serde(rename = "nodeType")]
    pub node_type: String,
    pub phase: ExecutionPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,
    #[serde(rename = "stepNumber", default, skip_serializing_if = "Option::is_none")]
    pub step_number: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(rename = "modelName", default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PregelStepMetadata {
    #[serde(rename = "stepNumber")]
    pub step_number: i64,
    #[serde(rename = "nodeId", default, skip_serializing_if = "String::is_empty")]
    pub node_id: String,
    #[serde(
        rename = "interruptValue",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub interrupt_value: Option<Value>,
}

impl PregelStepMetadata {
    /// An interrupt value that is present and not `null` or `""`.
    pub fn has_interrupt(&self) -> bool {
        match &self.interrupt_value {
            None | Some(Value::Null) => false,
            Some(Value::String(s)) => !s.is_empty(),
            Some(_) => true,
        }
    }
}

// ============================================================================
// Model / Tool / Custom Node Output
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ModelExecutionMetadata {
    #[serde(rename = "responseId", default)]
    pub response_id: String,
    #[serde(rename = "nodeId", default)]
    pub node_id: String,
    #[serde(default)]
    pub output: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ToolExecutionPhase {
    Start,
    Complete,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolExecutionMetadata {
    #[serde(rename = "toolId")]
    pub tool_id: String,
    #[serde(rename = "toolName")]
    pub tool_name: String,
    pub phase: ToolExecutionPhase,
    #[serde(default)]
    pub input: String,
    #[serde(rename = "responseId", default)]
    pub response_id: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum NodeCustomEventCategory {
    #[default]
    Custom,
    Progress,
    Text,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct NodeCustomEventMetadata {
    #[serde(default)]
    pub category: NodeCustomEventCategory,
    #[serde(rename = "eventType", default)]
    pub event_type: String,
    #[serde(rename = "nodeId", default)]
    pub node_id: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub progress: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(rename = "stepNumber", default)]
    pub step_number: i64,
    #[serde(default)]
    pub timestamp: i64,
}

// ============================================================================
// Resume Command
// ============================================================================

/// Command stored under [`STATE_KEY_COMMAND`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Command {
    #[serde(rename = "resumeMap", default, skip_serializing_if = "Option::is_none")]
    pub resume_map: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume: Option<Value>,
}
