//! Per-run options forwarded to the engine.

use serde_json::{Map, Value};

/// One option contributed by a run-option resolver.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOption {
    /// Correlation id for the run request.
    RequestId(String),
    /// Initial runtime state. A later entry replaces an earlier one.
    RuntimeState(Map<String, Value>),
    /// Free-form engine option.
    Custom { key: String, value: Value },
}

impl RunOption {
    pub fn request_id(id: impl Into<String>) -> Self {
        Self::RequestId(id.into())
    }

    pub fn runtime_state(state: Map<String, Value>) -> Self {
        Self::RuntimeState(state)
    }

    pub fn custom(key: impl Into<String>, value: Value) -> Self {
        Self::Custom {
            key: key.into(),
            value,
        }
    }
}

/// Options resolved for one run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RunOptions {
    pub request_id: Option<String>,
    pub runtime_state: Map<String, Value>,
    pub custom: Map<String, Value>,
}

impl RunOptions {
    pub fn apply(&mut self, option: RunOption) {
        match option {
            RunOption::RequestId(id) => self.request_id = Some(id),
            RunOption::RuntimeState(state) => self.runtime_state = state,
            RunOption::Custom { key, value } => {
                self.custom.insert(key, value);
            }
        }
    }

    /// Overlay `state` on the runtime state; keys in `state` win.
    pub fn merge_runtime_state(&mut self, state: Map<String, Value>) {
        self.runtime_state.extend(state);
    }
}

impl FromIterator<RunOption> for RunOptions {
    fn from_iter<I: IntoIterator<Item = RunOption>>(iter: I) -> Self {
        let mut options = Self::default();
        for option in iter {
            options.apply(option);
        }
        options
    }
}
