//! Run lifecycle: admission, the per-run event pump, and cancellation.

use crate::activity::{project_graph_activity, resume_ack};
use crate::config::RunnerConfig;
use crate::emitter::Emitter;
use crate::error::{HookStage, RunnerError};
use crate::hooks::{
    apply_input_hooks, default_run_option_resolver, default_start_span, default_state_resolver,
    default_user_id_resolver, RunAgentInputHook, RunOptionResolver, SpanFields, StartSpan,
    StateResolver, UserIdResolver,
};
use crate::input::{build_input_message, InputMessage, InputSource};
use crate::registry::{RunGuard, RunRegistry};
use crate::session::SessionKey;
use crate::track::Tracker;
use crate::translator::{
    default_translator_factory, TranslateCallbacks, Translator, TranslatorFactory,
    TranslatorOptions,
};
use crate::CUSTOM_EVENT_USER_MESSAGE;
use agui_contract::{AgentRunner, RunContext, RunOptions};
use agui_protocol::{Event, RunAgentInput};
use futures::stream::BoxStream;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, Instrument};

/// AG-UI events of one run, closed after the run winds down.
pub type EventStream = BoxStream<'static, Event>;

pub(crate) struct RunnerInner {
    pub(crate) engine: Arc<dyn AgentRunner>,
    pub(crate) config: RunnerConfig,
    pub(crate) tracker: Option<Arc<dyn Tracker>>,
    pub(crate) user_id_resolver: UserIdResolver,
    pub(crate) input_hooks: Vec<RunAgentInputHook>,
    pub(crate) state_resolver: StateResolver,
    pub(crate) run_option_resolver: RunOptionResolver,
    pub(crate) start_span: StartSpan,
    pub(crate) translator_factory: TranslatorFactory,
    pub(crate) callbacks: TranslateCallbacks,
    registry: RunRegistry,
}

impl RunnerInner {
    /// Apply the input hooks, then resolve the session user.
    pub(crate) fn prepare(
        &self,
        ctx: &RunContext,
        input: RunAgentInput,
    ) -> Result<(RunAgentInput, String), RunnerError> {
        let input = apply_input_hooks(&self.input_hooks, ctx, input)
            .map_err(RunnerError::hook(HookStage::RunInputHook))?;
        let user_id = (self.user_id_resolver)(ctx, &input)
            .map_err(RunnerError::hook(HookStage::ResolveUserId))?;
        Ok((input, user_id))
    }

    fn translator_options(&self) -> TranslatorOptions {
        TranslatorOptions {
            graph_node_lifecycle_activity_enabled: self.config.graph_node_lifecycle_activity_enabled,
            graph_node_interrupt_activity_enabled: self.config.graph_node_interrupt_activity_enabled,
            graph_node_interrupt_activity_top_level_only: self
                .config
                .graph_node_interrupt_activity_top_level_only,
        }
    }

    /// The run's context: a child of the caller's, or a detached one that
    /// only keeps the caller's deadline. The backend timeout tightens either.
    fn run_context(&self, ctx: &RunContext) -> RunContext {
        let base = if self.config.cancel_on_context_done_enabled {
            ctx.child()
        } else {
            let detached = ctx.detached();
            match ctx.deadline() {
                Some(deadline) => detached.with_deadline(deadline),
                None => detached,
            }
        };
        match self.config.timeout() {
            Some(timeout) => base.with_timeout(timeout),
            None => base,
        }
    }
}

/// Drives an [`AgentRunner`] and exposes its runs as AG-UI event streams.
///
/// At most one run per `(app, user, thread)` session is in flight. Cloning
/// is cheap and clones share the in-flight set.
#[derive(Clone)]
pub struct Runner {
    pub(crate) inner: Arc<RunnerInner>,
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("config", &self.inner.config)
            .field("tracker", &self.inner.tracker.is_some())
            .field("callbacks", &self.inner.callbacks)
            .finish_non_exhaustive()
    }
}

impl Runner {
    pub fn builder(engine: Arc<dyn AgentRunner>) -> RunnerBuilder {
        RunnerBuilder::new(engine)
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.inner.config
    }

    /// Start a run and return its event stream.
    ///
    /// Hook, validation and admission failures are returned before anything
    /// is spawned. Once admitted, every failure is reported in-stream as
    /// `RUN_ERROR`. Must be called inside a Tokio runtime.
    pub fn run(&self, ctx: &RunContext, input: RunAgentInput) -> Result<EventStream, RunnerError> {
        let inner = &self.inner;
        let (input, user_id) = inner.prepare(ctx, input)?;
        if input.thread_id.is_empty() {
            return Err(RunnerError::InvalidInput("thread id is empty".into()));
        }
        let built = build_input_message(&input.messages)?;

        let state = (inner.state_resolver)(ctx, &input)
            .map_err(RunnerError::hook(HookStage::ResolveState))?;
        let mut options: RunOptions = (inner.run_option_resolver)(ctx, &input)
            .map_err(RunnerError::hook(HookStage::ResolveRunOption))?
            .into_iter()
            .collect();
        if let Some(state) = state {
            options.merge_runtime_state(state);
        }

        let app_name = inner.config.app_name.as_str();
        let span = (inner.start_span)(
            ctx,
            &input,
            &SpanFields {
                app_name,
                user_id: &user_id,
            },
        )
        .map_err(RunnerError::hook(HookStage::StartSpan))?;

        let translator_options = inner.translator_options();
        let translator = (inner.translator_factory)(ctx, &input, &translator_options)
            .map_err(RunnerError::hook(HookStage::CreateTranslator))?;

        let key = SessionKey::new(app_name, &user_id, &input.thread_id);
        let run_ctx = inner.run_context(ctx);
        let guard = inner.registry.register(key.clone(), run_ctx.clone())?;
        debug!(session = %key, run_id = %input.run_id, "run admitted");

        let (tx, mut rx) = mpsc::channel(1);
        let mut emitter = Emitter::new(run_ctx.clone(), tx, input.run_id.clone())
            .with_callbacks(inner.callbacks.clone());
        if let Some(tracker) = inner.tracker.clone().filter(|_| key.is_valid()) {
            emitter = emitter.with_tracking(tracker, key.clone());
        }

        let task = RunTask {
            engine: inner.engine.clone(),
            ctx: run_ctx,
            thread_id: input.thread_id,
            run_id: input.run_id,
            user_id,
            input: built,
            options,
            translator,
            translator_options,
            callbacks: inner.callbacks.clone(),
            emitter,
        };
        tokio::spawn(task.run(guard).instrument(span));

        Ok(Box::pin(async_stream::stream! {
            while let Some(event) = rx.recv().await {
                yield event;
            }
        }))
    }

    /// Cancel the in-flight run of the request's session.
    ///
    /// The run is only signalled; it keeps its slot until it has wound down.
    pub fn cancel(&self, ctx: &RunContext, input: RunAgentInput) -> Result<(), RunnerError> {
        let (input, user_id) = self.inner.prepare(ctx, input)?;
        let key = SessionKey::new(&self.inner.config.app_name, &user_id, &input.thread_id);
        self.inner.registry.cancel(&key)?;
        debug!(session = %key, "run cancel requested");
        Ok(())
    }
}

struct RunTask {
    engine: Arc<dyn AgentRunner>,
    ctx: RunContext,
    thread_id: String,
    run_id: String,
    user_id: String,
    input: InputMessage,
    options: RunOptions,
    translator: Box<dyn Translator>,
    translator_options: TranslatorOptions,
    callbacks: TranslateCallbacks,
    emitter: Emitter,
}

impl RunTask {
    async fn run(mut self, guard: RunGuard) {
        self.execute().await;
        self.emitter.flush_tracker().await;
        debug!(
            terminated = self.emitter.terminated(),
            stopped = self.emitter.stopped(),
            "run ended"
        );
        // Stops the deadline watchdog and anything the engine spawned on ctx.
        self.ctx.cancel();
        drop(guard);
        drop(self);
    }

    async fn execute(&mut self) {
        if !self
            .emitter
            .send(Event::run_started(&self.thread_id, &self.run_id))
            .await
        {
            return;
        }

        match &self.input.source {
            InputSource::Tool {
                tool_call_id,
                content,
            } => {
                let echo =
                    Event::tool_call_result(&self.input.message_id, tool_call_id, content.clone());
                if !self.emitter.send(echo).await {
                    return;
                }
            }
            InputSource::User(record) => {
                let mut record = record.clone();
                if record.name.as_deref().map_or(true, str::is_empty) {
                    record.name = Some(self.user_id.clone());
                }
                match serde_json::to_value(&record) {
                    Ok(value) => {
                        self.emitter
                            .track(&Event::custom(CUSTOM_EVENT_USER_MESSAGE, value))
                            .await;
                    }
                    Err(err) => debug!(error = %err, "encode user message record failed"),
                }
            }
        }

        let stream = self
            .engine
            .run(
                self.ctx.clone(),
                &self.user_id,
                &self.thread_id,
                self.input.message.clone(),
                self.options.clone(),
            )
            .await;
        let mut stream = match stream {
            Ok(stream) => stream,
            Err(err) => {
                let error = self.emitter.run_error(format!("run agent: {err}"));
                self.emitter.send(error).await;
                return;
            }
        };

        if self.translator_options.graph_node_interrupt_activity_enabled {
            if let Some(ack) = resume_ack(&self.options.runtime_state) {
                if !self.emitter.send(ack).await {
                    return;
                }
            }
        }

        loop {
            let next = tokio::select! {
                biased;
                _ = self.ctx.done() => break,
                next = stream.next() => next,
            };
            let Some(event) = next else {
                break;
            };
            let event = match self.callbacks.run_before(&self.ctx, &event) {
                Ok(Some(replaced)) => replaced,
                Ok(None) => event,
                Err(err) => {
                    let error = self.emitter.run_error(format!("before translate: {err}"));
                    self.emitter.send(error).await;
                    return;
                }
            };

            let mut out = project_graph_activity(&event, &self.translator_options);
            match self.translator.translate(&event) {
                Ok(events) => out.extend(events),
                Err(err) => {
                    let error = self.emitter.run_error(format!("translate: {err}"));
                    self.emitter.send(error).await;
                    return;
                }
            }
            for event in out {
                if !self.emitter.emit(event).await {
                    return;
                }
            }
        }

        if self.emitter.is_open() && !self.ctx.is_done() {
            self.emitter
                .send(Event::run_finished(&self.thread_id, &self.run_id))
                .await;
        }
    }
}

/// Builder for [`Runner`].
pub struct RunnerBuilder {
    engine: Arc<dyn AgentRunner>,
    config: RunnerConfig,
    tracker: Option<Arc<dyn Tracker>>,
    user_id_resolver: UserIdResolver,
    input_hooks: Vec<RunAgentInputHook>,
    state_resolver: StateResolver,
    run_option_resolver: RunOptionResolver,
    start_span: StartSpan,
    translator_factory: TranslatorFactory,
    callbacks: TranslateCallbacks,
}

impl RunnerBuilder {
    pub fn new(engine: Arc<dyn AgentRunner>) -> Self {
        Self {
            engine,
            config: RunnerConfig::default(),
            tracker: None,
            user_id_resolver: default_user_id_resolver(),
            input_hooks: Vec::new(),
            state_resolver: default_state_resolver(),
            run_option_resolver: default_run_option_resolver(),
            start_span: default_start_span(),
            translator_factory: default_translator_factory(),
            callbacks: TranslateCallbacks::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
        self.config.app_name = app_name.into();
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout_ms = duration_ms(timeout);
        self
    }

    #[must_use]
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.config.flush_interval_ms = duration_ms(interval);
        self
    }

    #[must_use]
    pub fn with_messages_snapshot_follow(mut self, enabled: bool, max_duration: Duration) -> Self {
        self.config.messages_snapshot_follow_enabled = enabled;
        self.config.messages_snapshot_follow_max_duration_ms = duration_ms(max_duration);
        self
    }

    #[must_use]
    pub fn with_cancel_on_context_done(mut self, enabled: bool) -> Self {
        self.config.cancel_on_context_done_enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_graph_node_lifecycle_activity(mut self, enabled: bool) -> Self {
        self.config.graph_node_lifecycle_activity_enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_graph_node_interrupt_activity(mut self, enabled: bool) -> Self {
        self.config.graph_node_interrupt_activity_enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_graph_node_interrupt_activity_top_level_only(mut self, enabled: bool) -> Self {
        self.config.graph_node_interrupt_activity_top_level_only = enabled;
        self
    }

    #[must_use]
    pub fn with_tracker(mut self, tracker: Arc<dyn Tracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    #[must_use]
    pub fn with_user_id_resolver(mut self, resolver: UserIdResolver) -> Self {
        self.user_id_resolver = resolver;
        self
    }

    /// Append a hook to the input hook chain.
    #[must_use]
    pub fn with_run_agent_input_hook(mut self, hook: RunAgentInputHook) -> Self {
        self.input_hooks.push(hook);
        self
    }

    #[must_use]
    pub fn with_state_resolver(mut self, resolver: StateResolver) -> Self {
        self.state_resolver = resolver;
        self
    }

    #[must_use]
    pub fn with_run_option_resolver(mut self, resolver: RunOptionResolver) -> Self {
        self.run_option_resolver = resolver;
        self
    }

    #[must_use]
    pub fn with_start_span(mut self, start_span: StartSpan) -> Self {
        self.start_span = start_span;
        self
    }

    #[must_use]
    pub fn with_translator_factory(mut self, factory: TranslatorFactory) -> Self {
        self.translator_factory = factory;
        self
    }

    #[must_use]
    pub fn with_translate_callbacks(mut self, callbacks: TranslateCallbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    pub fn build(self) -> Runner {
        Runner {
            inner: Arc::new(RunnerInner {
                engine: self.engine,
                config: self.config,
                tracker: self.tracker,
                user_id_resolver: self.user_id_resolver,
                input_hooks: self.input_hooks,
                state_resolver: self.state_resolver,
                run_option_resolver: self.run_option_resolver,
                start_span: self.start_span,
                translator_factory: self.translator_factory,
                callbacks: self.callbacks,
                registry: RunRegistry::default(),
            }),
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use agui_contract::{AgentError, AgentEventStream, Message as EngineMessage};
    use agui_protocol::Message;
    use async_trait::async_trait;

    struct IdleAgent;

    #[async_trait]
    impl AgentRunner for IdleAgent {
        async fn run(
            &self,
            _ctx: RunContext,
            _user_id: &str,
            _session_id: &str,
            _message: EngineMessage,
            _options: RunOptions,
        ) -> Result<AgentEventStream, AgentError> {
            Ok(Box::pin(futures::stream::empty()))
        }
    }

    fn runner() -> Runner {
        Runner::builder(Arc::new(IdleAgent))
            .with_app_name("app")
            .build()
    }

    #[tokio::test]
    async fn empty_thread_id_is_rejected() {
        let input = RunAgentInput::new("", "r").with_message(Message::user("hi"));
        let err = runner().run(&RunContext::background(), input).err().expect("expected error");
        assert!(matches!(err, RunnerError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn missing_messages_fail_before_spawn() {
        let err = runner()
            .run(&RunContext::background(), RunAgentInput::new("t", "r"))
            .err().expect("expected error");
        assert_eq!(err.to_string(), "build input message: no messages provided");
    }

    #[tokio::test]
    async fn hook_failures_carry_stage() {
        let runner = Runner::builder(Arc::new(IdleAgent))
            .with_state_resolver(Arc::new(|_: &RunContext, _: &RunAgentInput| {
                Err("state unavailable".into())
            }))
            .build();
        let input = RunAgentInput::new("t", "r").with_message(Message::user("hi"));
        let err = runner.run(&RunContext::background(), input).err().expect("expected error");
        assert_eq!(err.to_string(), "resolve state: state unavailable");
    }

    #[tokio::test]
    async fn cancel_without_run_is_not_found() {
        let err = runner()
            .cancel(&RunContext::background(), RunAgentInput::new("t", "r"))
            .unwrap_err();
        assert!(matches!(err, RunnerError::NotFound));
    }

    #[tokio::test(start_paused = true)]
    async fn detached_run_keeps_caller_deadline() {
        let runner = runner();
        let caller = RunContext::background().with_timeout(Duration::from_secs(5));
        let run_ctx = runner.inner.run_context(&caller);
        caller.cancel();
        assert!(!run_ctx.is_done());
        assert_eq!(run_ctx.deadline(), caller.deadline());
    }

    #[test]
    fn builder_overrides_config_fields() {
        let runner = Runner::builder(Arc::new(IdleAgent))
            .with_config(RunnerConfig {
                app_name: "from-config".into(),
                ..RunnerConfig::default()
            })
            .with_timeout(Duration::from_millis(250))
            .with_graph_node_interrupt_activity(true)
            .build();
        assert_eq!(runner.config().app_name, "from-config");
        assert_eq!(runner.config().timeout(), Some(Duration::from_millis(250)));
        assert!(runner.inner.translator_options().graph_node_interrupt_activity_enabled);
    }
}
