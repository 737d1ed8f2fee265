use crate::session::SessionKey;
use crate::track::Tracker;
use crate::translator::TranslateCallbacks;
use agui_contract::RunContext;
use agui_protocol::Event;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

/// Write side of a run's output stream.
///
/// Every successful write is also appended to the tracker, when one is
/// attached. Once the context is done, nothing more is written.
pub(crate) struct Emitter {
    ctx: RunContext,
    tx: mpsc::Sender<Event>,
    callbacks: TranslateCallbacks,
    run_id: String,
    tracking: Option<(Arc<dyn Tracker>, SessionKey)>,
    terminated: bool,
    stopped: bool,
}

impl Emitter {
    pub(crate) fn new(ctx: RunContext, tx: mpsc::Sender<Event>, run_id: impl Into<String>) -> Self {
        Self {
            ctx,
            tx,
            callbacks: TranslateCallbacks::default(),
            run_id: run_id.into(),
            tracking: None,
            terminated: false,
            stopped: false,
        }
    }

    pub(crate) fn with_callbacks(mut self, callbacks: TranslateCallbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    pub(crate) fn with_tracking(mut self, tracker: Arc<dyn Tracker>, key: SessionKey) -> Self {
        self.tracking = Some((tracker, key));
        self
    }

    /// A terminal event has been written.
    pub(crate) fn terminated(&self) -> bool {
        self.terminated
    }

    /// The context finished or the consumer went away.
    pub(crate) fn stopped(&self) -> bool {
        self.stopped
    }

    pub(crate) fn is_open(&self) -> bool {
        !self.terminated && !self.stopped
    }

    pub(crate) fn run_error(&self, message: impl Into<String>) -> Event {
        Event::run_error(message, Some(self.run_id.clone()))
    }

    /// Pass `event` through the after-translate callbacks and write it.
    /// Returns whether the run may keep emitting.
    pub(crate) async fn emit(&mut self, event: Event) -> bool {
        let event = match self.callbacks.run_after(&self.ctx, &event) {
            Ok(Some(replaced)) => replaced,
            Ok(None) => event,
            Err(err) => {
                let error = self.run_error(format!("after translate: {err}"));
                self.send(error).await;
                self.terminated = true;
                return false;
            }
        };
        self.send(event).await
    }

    /// Write `event` as is. Returns whether the run may keep emitting.
    pub(crate) async fn send(&mut self, event: Event) -> bool {
        if self.stopped {
            return false;
        }
        let delivered = tokio::select! {
            biased;
            _ = self.ctx.done() => false,
            res = self.tx.send(event.clone()) => res.is_ok(),
        };
        if !delivered {
            self.stopped = true;
            return false;
        }
        self.track(&event).await;
        if event.is_run_terminal() {
            self.terminated = true;
        }
        self.is_open()
    }

    /// Append `event` to the tracker without writing it to the stream.
    pub(crate) async fn track(&self, event: &Event) {
        let Some((tracker, key)) = &self.tracking else {
            return;
        };
        if let Err(err) = tracker.append_event(key, event).await {
            warn!(session = %key, event_type = event.event_type(), error = %err, "track event failed");
        }
    }

    pub(crate) async fn flush_tracker(&self) {
        let Some((tracker, key)) = &self.tracking else {
            return;
        };
        if let Err(err) = tracker.flush(key).await {
            warn!(session = %key, error = %err, "flush track failed");
        }
    }
}
