//! AG-UI protocol types: the event sum type, conversation messages and the
//! run request payload.
#![allow(missing_docs)]

pub mod events;
pub mod types;

pub use events::{BaseEvent, Event, EventCodecError};
pub use types::{
    Context, FunctionCall, InputContent, Message, Role, RunAgentInput, Tool, ToolCall,
};
