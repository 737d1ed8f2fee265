use crate::error::RunnerError;
use crate::session::SessionKey;
use agui_contract::RunContext;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// In-flight runs keyed by session.
///
/// An entry lives until its [`RunGuard`] is dropped by the run task, so a
/// cancelled run keeps its slot until it has fully wound down.
#[derive(Debug, Clone, Default)]
pub(crate) struct RunRegistry {
    runs: Arc<Mutex<HashMap<SessionKey, RunContext>>>,
}

impl RunRegistry {
    fn lock(&self) -> MutexGuard<'_, HashMap<SessionKey, RunContext>> {
        match self.runs.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Admit a run, or fail with [`RunnerError::AlreadyExists`].
    pub(crate) fn register(
        &self,
        key: SessionKey,
        ctx: RunContext,
    ) -> Result<RunGuard, RunnerError> {
        let mut runs = self.lock();
        if runs.contains_key(&key) {
            return Err(RunnerError::AlreadyExists);
        }
        runs.insert(key.clone(), ctx);
        Ok(RunGuard {
            registry: self.clone(),
            key,
        })
    }

    /// Cancel the run context registered under `key`. The entry stays.
    pub(crate) fn cancel(&self, key: &SessionKey) -> Result<(), RunnerError> {
        let ctx = self.lock().get(key).cloned().ok_or(RunnerError::NotFound)?;
        ctx.cancel();
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, key: &SessionKey) -> bool {
        self.lock().contains_key(key)
    }
}

/// Releases a registry slot on drop.
#[derive(Debug)]
pub(crate) struct RunGuard {
    registry: RunRegistry,
    key: SessionKey,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.registry.lock().remove(&self.key);
    }
}
