//! Contract between the AG-UI runner and the agent engine it drives.
#![allow(missing_docs)]

pub mod context;
pub mod event;
pub mod graph;
pub mod model;
pub mod options;
pub mod runner;

pub use context::{DoneReason, RunContext};
pub use event::{object, AgentEvent, Choice, Response, ResponseError, Usage};
pub use model::{ContentPart, FunctionDefinition, Message, Role, ToolCall};
pub use options::{RunOption, RunOptions};
pub use runner::{AgentError, AgentEventStream, AgentRunner};
