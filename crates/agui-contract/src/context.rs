//! Cancellation scope handed to an agent engine for one run.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a [`RunContext`] is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DoneReason {
    #[error("context canceled")]
    Canceled,

    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// Request-scoped cancellation, deadline and values.
///
/// A context is done once its token is cancelled (explicitly, through a
/// parent, or by its deadline watchdog) or its deadline has passed. Cloning is
/// cheap and clones observe the same cancellation.
#[derive(Debug, Clone)]
pub struct RunContext {
    token: CancellationToken,
    deadline: Option<Instant>,
    cause: Arc<OnceLock<DoneReason>>,
    parent: Option<Arc<RunContext>>,
    values: Arc<HashMap<String, Value>>,
}

impl Default for RunContext {
    fn default() -> Self {
        Self::background()
    }
}

impl RunContext {
    /// A context that is never done on its own.
    pub fn background() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
            cause: Arc::new(OnceLock::new()),
            parent: None,
            values: Arc::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn with_value(mut self, key: impl Into<String>, value: Value) -> Self {
        Arc::make_mut(&mut self.values).insert(key.into(), value);
        self
    }

    pub fn value(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Derive a context that is cancelled whenever `self` is, and can be
    /// cancelled on its own without affecting `self`.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
            cause: Arc::new(OnceLock::new()),
            parent: Some(Arc::new(self.clone())),
            values: self.values.clone(),
        }
    }

    /// Derive a context that keeps only the values of `self`. Neither the
    /// cancellation nor the deadline of `self` reach it.
    pub fn detached(&self) -> Self {
        Self {
            values: self.values.clone(),
            ..Self::background()
        }
    }

    /// Derive a child whose deadline is the earlier of `deadline` and the
    /// current one.
    ///
    /// When called inside a Tokio runtime, a watchdog task cancels the child's
    /// token at the deadline so engines that only watch the token stop too.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let mut ctx = self.child();
        if matches!(self.deadline, Some(current) if current <= deadline) {
            return ctx;
        }
        ctx.deadline = Some(deadline);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let token = ctx.token.clone();
            let cause = ctx.cause.clone();
            handle.spawn(async move {
                tokio::select! {
                    _ = token.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline) => {
                        let _ = cause.set(DoneReason::DeadlineExceeded);
                        token.cancel();
                    }
                }
            });
        }
        ctx
    }

    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Cancel this context and every context derived from it.
    pub fn cancel(&self) {
        let _ = self.cause.set(DoneReason::Canceled);
        self.token.cancel();
    }

    /// Token that fires when this context is done.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.token
    }

    /// `None` while the context is live.
    pub fn err(&self) -> Option<DoneReason> {
        if self.token.is_cancelled() {
            let reason = self
                .cause
                .get()
                .copied()
                .or_else(|| self.parent.as_ref().and_then(|p| p.err()))
                .unwrap_or(DoneReason::Canceled);
            return Some(reason);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(DoneReason::DeadlineExceeded),
            _ => None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Resolve once the context is done.
    pub async fn done(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => self.token.cancelled().await,
        }
    }
}
