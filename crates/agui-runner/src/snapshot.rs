//! `MESSAGES_SNAPSHOT` replay of a session's track, with optional follow.

use crate::emitter::Emitter;
use crate::error::RunnerError;
use crate::reduce::reduce;
use crate::runner::{EventStream, Runner, RunnerInner};
use crate::session::SessionKey;
use crate::track::{GetEventsOptions, TrackEvent, Tracker};
use agui_contract::RunContext;
use agui_protocol::{Event, RunAgentInput};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{interval_at, sleep_until, Instant};
use tracing::{debug, warn, Instrument};

impl Runner {
    /// Replay the session's tracked events as one `MESSAGES_SNAPSHOT`.
    ///
    /// With follow enabled and no terminal event in the track yet, newly
    /// tracked events are forwarded until the run ends or the follow window
    /// runs out.
    pub fn messages_snapshot(
        &self,
        ctx: &RunContext,
        input: RunAgentInput,
    ) -> Result<EventStream, RunnerError> {
        let inner = &self.inner;
        if inner.config.app_name.is_empty() {
            return Err(RunnerError::MissingConfig("app name is empty"));
        }
        let tracker = inner
            .tracker
            .clone()
            .ok_or(RunnerError::MissingConfig("tracker is not configured"))?;
        let (input, user_id) = inner.prepare(ctx, input)?;
        let key = SessionKey::new(&inner.config.app_name, &user_id, &input.thread_id);

        let snapshot_ctx = ctx.child();
        let (tx, mut rx) = mpsc::channel(1);
        let task = SnapshotTask {
            emitter: Emitter::new(snapshot_ctx.clone(), tx, input.run_id.clone()),
            ctx: snapshot_ctx,
            inner: self.inner.clone(),
            tracker,
            user_id,
            thread_id: input.thread_id,
            run_id: input.run_id,
            key,
        };
        let span = tracing::info_span!("agui.messages_snapshot", session = %task.key);
        tokio::spawn(task.run().instrument(span));

        Ok(Box::pin(async_stream::stream! {
            while let Some(event) = rx.recv().await {
                yield event;
            }
        }))
    }
}

struct SnapshotTask {
    emitter: Emitter,
    ctx: RunContext,
    inner: Arc<RunnerInner>,
    tracker: Arc<dyn Tracker>,
    user_id: String,
    thread_id: String,
    run_id: String,
    key: SessionKey,
}

fn ends_with_terminal(events: &[TrackEvent]) -> bool {
    events
        .last()
        .and_then(|last| last.decode().ok())
        .is_some_and(|event| event.is_run_terminal())
}

impl SnapshotTask {
    async fn run(mut self) {
        if !self
            .emitter
            .send(Event::run_started(&self.thread_id, &self.run_id))
            .await
        {
            return;
        }

        let events = match self
            .tracker
            .get_events(&self.key, GetEventsOptions::default())
            .await
        {
            Ok(events) => events,
            Err(err) => {
                let error = self.emitter.run_error(format!("get track events: {err}"));
                self.emitter.send(error).await;
                return;
            }
        };

        let reduction = reduce(&self.inner.config.app_name, &self.user_id, &events);
        debug!(
            tracked = events.len(),
            messages = reduction.messages.len(),
            "messages snapshot reduced"
        );
        if !self
            .emitter
            .send(Event::messages_snapshot(reduction.messages))
            .await
        {
            return;
        }
        if let Some(err) = reduction.error {
            let error = self.emitter.run_error(format!("reduce track events: {err}"));
            self.emitter.send(error).await;
            return;
        }

        if self.inner.config.messages_snapshot_follow_enabled && !ends_with_terminal(&events) {
            let cursor = events.last().map_or(0, |e| e.timestamp);
            self.follow(cursor).await;
        } else {
            self.emitter
                .send(Event::run_finished(&self.thread_id, &self.run_id))
                .await;
        }
    }

    /// Poll the track after `cursor` and forward what appears, ending on the
    /// first terminal event.
    async fn follow(&mut self, mut cursor: u64) {
        let config = &self.inner.config;
        let Some(interval) = config.flush_interval() else {
            let error = self
                .emitter
                .run_error("messages snapshot follow requires a positive flush interval");
            self.emitter.send(error).await;
            return;
        };
        let deadline = config
            .follow_max_duration()
            .or_else(|| config.timeout())
            .map(|max| Instant::now() + max);
        let mut ticker = interval_at(Instant::now() + interval, interval);

        loop {
            let expired = async {
                match deadline {
                    Some(deadline) => sleep_until(deadline).await,
                    None => std::future::pending().await,
                }
            };
            tokio::select! {
                biased;
                _ = self.ctx.done() => return,
                _ = expired => {
                    let error = self.emitter.run_error("messages snapshot follow timeout");
                    self.emitter.send(error).await;
                    return;
                }
                _ = ticker.tick() => {}
            }

            let events = match self
                .tracker
                .get_events(&self.key, GetEventsOptions::after(cursor))
                .await
            {
                Ok(events) => events,
                Err(err) => {
                    let error = self.emitter.run_error(format!("follow track events: {err}"));
                    self.emitter.send(error).await;
                    return;
                }
            };

            for tracked in events {
                if tracked.timestamp <= cursor {
                    continue;
                }
                cursor = tracked.timestamp;
                if tracked.payload.is_empty() {
                    continue;
                }
                let event = match tracked.decode() {
                    Ok(event) => event,
                    Err(err) => {
                        warn!(session = %self.key, timestamp = tracked.timestamp, error = %err, "skip undecodable track event");
                        continue;
                    }
                };
                let forwarded = match event {
                    Event::RunFinished { .. } => {
                        self.emitter
                            .send(Event::run_finished(&self.thread_id, &self.run_id))
                            .await;
                        return;
                    }
                    Event::RunError { message, .. } => {
                        let error = self.emitter.run_error(message);
                        self.emitter.send(error).await;
                        return;
                    }
                    other => other,
                };
                if !self.emitter.send(forwarded).await {
                    return;
                }
            }
        }
    }
}
