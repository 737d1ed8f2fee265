#![allow(missing_docs)]

mod common;

use agui_contract::graph::{
    CFG_KEY_CHECKPOINT_ID, CFG_KEY_LINEAGE_ID, METADATA_KEY_NODE, STATE_KEY_RESUME_MAP,
};
use agui_contract::{AgentEvent, ContentPart, RunContext, RunOption};
use agui_protocol::{Event, Message, Role, RunAgentInput};
use agui_runner::translator::{AfterTranslateCallback, BeforeTranslateCallback};
use agui_runner::{
    GetEventsOptions, HookStage, RunAgentInputHook, Runner, RunnerError, SessionKey,
    TranslateCallbacks, TranslateError, Translator, TranslatorFactory, TranslatorOptions,
    Tracker, CUSTOM_EVENT_USER_MESSAGE,
};
use common::*;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;

fn user_input(thread: &str, run: &str, content: &str) -> RunAgentInput {
    RunAgentInput::new(thread, run).with_message(Message::user(content))
}

fn state(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

#[tokio::test]
async fn text_reply_is_framed_between_run_lifecycle_events() {
    let agent = ScriptedAgent::new(vec![assistant_reply("m1", "ok")]);
    let runner = Runner::builder(agent).with_app_name("demo").build();

    let events = collect(
        runner
            .run(&RunContext::background(), user_input("t", "r", "hi"))
            .unwrap(),
    )
    .await;

    assert_eq!(
        events,
        vec![
            Event::run_started("t", "r"),
            Event::text_message_start("m1", Role::Assistant),
            Event::text_message_content("m1", "ok"),
            Event::text_message_end("m1"),
            Event::run_finished("t", "r"),
        ]
    );
}

#[tokio::test]
async fn runner_completion_finishes_exactly_once() {
    let agent = ScriptedAgent::new(vec![assistant_reply("m1", "ok"), runner_completion()]);
    let runner = Runner::builder(agent).with_app_name("demo").build();

    let events = collect(
        runner
            .run(&RunContext::background(), user_input("t", "r", "hi"))
            .unwrap(),
    )
    .await;

    let terminals = events.iter().filter(|e| e.is_run_terminal()).count();
    assert_eq!(terminals, 1);
    assert_eq!(events.last(), Some(&Event::run_finished("t", "r")));
}

#[tokio::test]
async fn tool_result_input_is_echoed_and_tracked() {
    let agent = ScriptedAgent::new(Vec::new());
    let tracker = memory_tracker();
    let runner = Runner::builder(agent.clone())
        .with_app_name("demo")
        .with_tracker(tracker.clone())
        .build();
    let input = RunAgentInput::new("t", "r").with_message(
        Message::tool("42", "c1")
            .with_tool_name("calc")
            .with_id("tm1"),
    );

    let events = collect(runner.run(&RunContext::background(), input).unwrap()).await;

    let echo = Event::tool_call_result("tm1", "c1", "42");
    assert_eq!(
        events,
        vec![
            Event::run_started("t", "r"),
            echo.clone(),
            Event::run_finished("t", "r"),
        ]
    );

    let message = &agent.calls()[0].message;
    assert_eq!(message.tool_id, "c1");
    assert_eq!(message.tool_name, "calc");
    assert_eq!(message.content, "42");

    let tracked: Vec<Event> = tracker
        .get_events(&SessionKey::new("demo", "user", "t"), GetEventsOptions::default())
        .await
        .unwrap()
        .iter()
        .map(|e| e.decode().unwrap())
        .collect();
    assert!(tracked.contains(&echo));
}

#[tokio::test]
async fn user_turn_is_tracked_but_not_streamed() {
    let agent = ScriptedAgent::new(vec![assistant_reply("m1", "ok")]);
    let tracker = memory_tracker();
    let runner = Runner::builder(agent)
        .with_app_name("demo")
        .with_tracker(tracker.clone())
        .with_user_id_resolver(Arc::new(|_: &RunContext, _: &RunAgentInput| {
            Ok("alice".to_string())
        }))
        .build();
    let input = RunAgentInput::new("t", "r").with_message(Message::user("hi").with_id("u1"));

    let events = collect(runner.run(&RunContext::background(), input).unwrap()).await;
    assert!(events.iter().all(|e| e.event_type() != "CUSTOM"));

    let tracked: Vec<Event> = tracker
        .get_events(&SessionKey::new("demo", "alice", "t"), GetEventsOptions::default())
        .await
        .unwrap()
        .iter()
        .map(|e| e.decode().unwrap())
        .collect();
    assert_eq!(
        event_types(&tracked),
        vec![
            "RUN_STARTED",
            "CUSTOM",
            "TEXT_MESSAGE_START",
            "TEXT_MESSAGE_CONTENT",
            "TEXT_MESSAGE_END",
            "RUN_FINISHED",
        ]
    );
    let Event::Custom { name, value, .. } = &tracked[1] else {
        panic!("expected user message record, got {:?}", tracked[1]);
    };
    assert_eq!(name, CUSTOM_EVENT_USER_MESSAGE);
    assert_eq!(value["id"], json!("u1"));
    assert_eq!(value["name"], json!("alice"));
    assert_eq!(value["content"], json!("hi"));
}

#[tokio::test]
async fn engine_receives_resolved_session_and_options() {
    let agent = ScriptedAgent::new(Vec::new());
    let runner = Runner::builder(agent.clone())
        .with_app_name("demo")
        .with_user_id_resolver(Arc::new(|_: &RunContext, _: &RunAgentInput| {
            Ok("bob".to_string())
        }))
        .with_run_option_resolver(Arc::new(|_: &RunContext, _: &RunAgentInput| {
            Ok(vec![
                RunOption::request_id("req-1"),
                RunOption::runtime_state(state(json!({"k1": "option", "k2": "option"}))),
            ])
        }))
        .with_state_resolver(Arc::new(|_: &RunContext, _: &RunAgentInput| {
            Ok(Some(state(json!({"k1": "resolver"}))))
        }))
        .build();
    let input = RunAgentInput::new("t", "r").with_message(Message::user_parts(vec![
        agui_protocol::InputContent::text("look"),
        agui_protocol::InputContent::binary_url("image/png", "https://example.com/a.png"),
    ]));

    collect(runner.run(&RunContext::background(), input).unwrap()).await;

    let call = &agent.calls()[0];
    assert_eq!(call.user_id, "bob");
    assert_eq!(call.session_id, "t");
    assert_eq!(call.options.request_id.as_deref(), Some("req-1"));
    assert_eq!(
        Value::Object(call.options.runtime_state.clone()),
        json!({"k1": "resolver", "k2": "option"})
    );
    assert_eq!(
        call.message.content_parts,
        vec![
            ContentPart::text("look"),
            ContentPart::image_url("https://example.com/a.png", "image/png"),
        ]
    );
}

#[tokio::test]
async fn input_hooks_rewrite_request_before_admission() {
    let agent = ScriptedAgent::new(Vec::new());
    let hook: RunAgentInputHook = Arc::new(|_: &RunContext, input: &RunAgentInput| {
        let mut next = input.clone();
        next.thread_id = "rewritten".into();
        Ok(Some(next))
    });
    let runner = Runner::builder(agent.clone())
        .with_run_agent_input_hook(hook)
        .build();

    let events = collect(
        runner
            .run(&RunContext::background(), user_input("t", "r", "hi"))
            .unwrap(),
    )
    .await;

    assert_eq!(events[0], Event::run_started("rewritten", "r"));
    assert_eq!(agent.calls()[0].session_id, "rewritten");
}

#[tokio::test]
async fn concurrent_run_for_same_session_is_rejected() {
    let runner = Runner::builder(Arc::new(HangingAgent))
        .with_app_name("demo")
        .build();
    let ctx = RunContext::background();

    let first = runner.run(&ctx, user_input("t", "r1", "hi")).unwrap();
    let err = runner.run(&ctx, user_input("t", "r2", "hi")).err().expect("expected error");
    assert!(matches!(err, RunnerError::AlreadyExists));

    // A different thread is a different session.
    let other = runner.run(&ctx, user_input("t2", "r3", "hi")).unwrap();

    runner.cancel(&ctx, user_input("t", "r1", "hi")).unwrap();
    runner.cancel(&ctx, user_input("t2", "r3", "hi")).unwrap();
    collect(first).await;
    collect(other).await;

    let again = runner.run(&ctx, user_input("t", "r4", "hi")).unwrap();
    runner.cancel(&ctx, user_input("t", "r4", "hi")).unwrap();
    collect(again).await;
}

#[tokio::test]
async fn cancel_stops_run_without_terminal_event() {
    let runner = Runner::builder(Arc::new(HangingAgent))
        .with_app_name("demo")
        .build();
    let ctx = RunContext::background();

    let mut events = runner.run(&ctx, user_input("t", "r", "hi")).unwrap();
    let started = futures::StreamExt::next(&mut events).await;
    assert_eq!(started, Some(Event::run_started("t", "r")));

    runner.cancel(&ctx, user_input("t", "r", "hi")).unwrap();
    let rest = collect(events).await;
    assert!(rest.iter().all(|e| !e.is_run_terminal()));

    let err = runner
        .cancel(&ctx, user_input("t", "r", "hi"))
        .unwrap_err();
    assert!(matches!(err, RunnerError::NotFound));
}

#[tokio::test(start_paused = true)]
async fn backend_timeout_ends_hanging_run() {
    let runner = Runner::builder(Arc::new(HangingAgent))
        .with_app_name("demo")
        .with_timeout(Duration::from_millis(50))
        .build();

    let events = collect(
        runner
            .run(&RunContext::background(), user_input("t", "r", "hi"))
            .unwrap(),
    )
    .await;

    assert_eq!(events, vec![Event::run_started("t", "r")]);
}

#[tokio::test(start_paused = true)]
async fn caller_cancel_is_ignored_unless_propagation_enabled() {
    let runner = Runner::builder(Arc::new(HangingAgent))
        .with_app_name("demo")
        .with_timeout(Duration::from_secs(1))
        .build();
    let caller = RunContext::background();
    let mut events = runner.run(&caller, user_input("t", "r", "hi")).unwrap();
    assert!(futures::StreamExt::next(&mut events).await.is_some());
    caller.cancel();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(matches!(
        runner.run(&RunContext::background(), user_input("t", "r2", "hi")),
        Err(RunnerError::AlreadyExists)
    ));
    collect(events).await;

    let propagating = Runner::builder(Arc::new(HangingAgent))
        .with_app_name("demo")
        .with_cancel_on_context_done(true)
        .build();
    let caller = RunContext::background();
    let events = propagating.run(&caller, user_input("t", "r", "hi")).unwrap();
    caller.cancel();
    assert!(collect(events).await.iter().all(|e| !e.is_run_terminal()));
}

#[tokio::test]
async fn engine_start_failure_is_reported_in_stream() {
    let runner = Runner::builder(Arc::new(FailingAgent)).build();

    let events = collect(
        runner
            .run(&RunContext::background(), user_input("t", "r", "hi"))
            .unwrap(),
    )
    .await;

    assert_eq!(
        events,
        vec![
            Event::run_started("t", "r"),
            Event::run_error("run agent: model unavailable", Some("r".into())),
        ]
    );
}

#[tokio::test]
async fn resume_request_is_acknowledged_before_engine_events() {
    let agent = ScriptedAgent::new(Vec::new());
    let runner = Runner::builder(agent)
        .with_graph_node_interrupt_activity(true)
        .with_state_resolver(Arc::new(|_: &RunContext, _: &RunAgentInput| {
            let mut resolved = Map::new();
            resolved.insert(CFG_KEY_LINEAGE_ID.into(), json!("L"));
            resolved.insert(CFG_KEY_CHECKPOINT_ID.into(), json!("C"));
            resolved.insert(STATE_KEY_RESUME_MAP.into(), json!({"confirm": true}));
            Ok(Some(resolved))
        }))
        .build();

    let events = collect(
        runner
            .run(&RunContext::background(), user_input("t", "r", "hi"))
            .unwrap(),
    )
    .await;

    assert_eq!(
        event_types(&events),
        vec!["RUN_STARTED", "ACTIVITY_DELTA", "RUN_FINISHED"]
    );
    let Event::ActivityDelta {
        activity_type,
        patch,
        ..
    } = &events[1]
    else {
        panic!("expected activity delta, got {:?}", events[1]);
    };
    assert_eq!(activity_type, "graph.node.interrupt");
    assert_eq!(
        patch,
        &vec![
            json!({"op": "add", "path": "/interrupt", "value": null}),
            json!({"op": "add", "path": "/resume", "value": {
                "checkpointId": "C",
                "lineageId": "L",
                "resumeMap": {"confirm": true}
            }}),
        ]
    );
}

#[tokio::test]
async fn node_lifecycle_activity_precedes_translated_output() {
    let meta = json!({"nodeId": "plan", "nodeType": "llm", "phase": "complete", "attempt": 1});
    let event = assistant_reply("m1", "ok")
        .with_state_delta(METADATA_KEY_NODE, serde_json::to_vec(&meta).unwrap());
    let runner = Runner::builder(ScriptedAgent::new(vec![event]))
        .with_graph_node_lifecycle_activity(true)
        .build();

    let events = collect(
        runner
            .run(&RunContext::background(), user_input("t", "r", "hi"))
            .unwrap(),
    )
    .await;

    assert_eq!(
        event_types(&events),
        vec![
            "RUN_STARTED",
            "ACTIVITY_DELTA",
            "TEXT_MESSAGE_START",
            "TEXT_MESSAGE_CONTENT",
            "TEXT_MESSAGE_END",
            "RUN_FINISHED",
        ]
    );
}

#[tokio::test]
async fn node_end_and_error_phases_project_full_metadata() {
    let end = json!({
        "nodeId": "a",
        "nodeType": "function",
        "phase": "end",
        "stepNumber": 4,
        "outputKeys": ["answer"]
    });
    let failed = json!({"nodeId": "b", "nodeType": "agent", "phase": "error", "error": "boom"});
    let node_event = |id: &str, meta: &Value| {
        AgentEvent::new(id, "graph")
            .with_state_delta(METADATA_KEY_NODE, serde_json::to_vec(meta).unwrap())
    };
    let runner = Runner::builder(ScriptedAgent::new(vec![
        node_event("ev-a", &end),
        node_event("ev-b", &failed),
    ]))
    .with_graph_node_lifecycle_activity(true)
    .build();

    let events = collect(
        runner
            .run(&RunContext::background(), user_input("t", "r", "hi"))
            .unwrap(),
    )
    .await;

    assert_eq!(
        events[1..3],
        [
            Event::activity_delta(
                "ev-a",
                "graph.node.lifecycle",
                vec![json!({"op": "add", "path": "/node", "value": end})],
            ),
            Event::activity_delta(
                "ev-b",
                "graph.node.lifecycle",
                vec![json!({"op": "add", "path": "/node", "value": failed})],
            ),
        ]
    );
    assert_eq!(events.last(), Some(&Event::run_finished("t", "r")));
}

#[tokio::test]
async fn run_after_cancel_waits_for_wind_down() {
    let runner = Runner::builder(Arc::new(HangingAgent))
        .with_app_name("demo")
        .build();
    let ctx = RunContext::background();

    let mut events = runner.run(&ctx, user_input("t", "r1", "hi")).unwrap();
    assert!(futures::StreamExt::next(&mut events).await.is_some());

    runner.cancel(&ctx, user_input("t", "r1", "hi")).unwrap();
    assert!(matches!(
        runner.run(&ctx, user_input("t", "r2", "hi")),
        Err(RunnerError::AlreadyExists)
    ));

    collect(events).await;
    let next = runner.run(&ctx, user_input("t", "r3", "hi")).unwrap();
    runner.cancel(&ctx, user_input("t", "r3", "hi")).unwrap();
    collect(next).await;
}

#[tokio::test(start_paused = true)]
async fn run_context_is_cancelled_once_stream_closes() {
    let agent = RecordingAgent::new();
    let runner = Runner::builder(agent.clone())
        .with_app_name("demo")
        .with_timeout(Duration::from_secs(3600))
        .build();

    for i in 0..5 {
        let run_id = format!("r{i}");
        collect(
            runner
                .run(&RunContext::background(), user_input("t", &run_id, "hi"))
                .unwrap(),
        )
        .await;
    }

    let contexts = agent.contexts();
    assert_eq!(contexts.len(), 5);
    assert!(contexts.iter().all(RunContext::is_done));
    assert_eq!(
        contexts[0].err(),
        Some(agui_contract::DoneReason::Canceled)
    );
}

#[tokio::test]
async fn before_translate_error_aborts_run() {
    let failing: BeforeTranslateCallback =
        Arc::new(|_: &RunContext, _: &AgentEvent| Err("blocked".into()));
    let runner = Runner::builder(ScriptedAgent::new(vec![
        assistant_reply("m1", "ok"),
        assistant_reply("m2", "later"),
    ]))
    .with_translate_callbacks(TranslateCallbacks::new().register_before_translate(failing))
    .build();

    let events = collect(
        runner
            .run(&RunContext::background(), user_input("t", "r", "hi"))
            .unwrap(),
    )
    .await;

    assert_eq!(
        events,
        vec![
            Event::run_started("t", "r"),
            Event::run_error("before translate: blocked", Some("r".into())),
        ]
    );
}

#[tokio::test]
async fn after_translate_callback_replaces_events() {
    let shout: AfterTranslateCallback = Arc::new(|_: &RunContext, event: &Event| {
        Ok(match event {
            Event::TextMessageContent {
                message_id, delta, ..
            } => Some(Event::text_message_content(
                message_id.clone(),
                delta.to_uppercase(),
            )),
            _ => None,
        })
    });
    let runner = Runner::builder(ScriptedAgent::new(vec![assistant_reply("m1", "ok")]))
        .with_translate_callbacks(TranslateCallbacks::new().register_after_translate(shout))
        .build();

    let events = collect(
        runner
            .run(&RunContext::background(), user_input("t", "r", "hi"))
            .unwrap(),
    )
    .await;

    assert!(events.contains(&Event::text_message_content("m1", "OK")));
}

struct RejectingTranslator;

impl Translator for RejectingTranslator {
    fn translate(&mut self, _event: &AgentEvent) -> Result<Vec<Event>, TranslateError> {
        Err(TranslateError::Other("unsupported event".into()))
    }
}

#[tokio::test]
async fn translator_error_aborts_run() {
    let factory: TranslatorFactory = Arc::new(
        |_: &RunContext, _: &RunAgentInput, _: &TranslatorOptions| {
            let translator: Box<dyn Translator> = Box::new(RejectingTranslator);
            Ok(translator)
        },
    );
    let runner = Runner::builder(ScriptedAgent::new(vec![assistant_reply("m1", "ok")]))
        .with_translator_factory(factory)
        .build();

    let events = collect(
        runner
            .run(&RunContext::background(), user_input("t", "r", "hi"))
            .unwrap(),
    )
    .await;

    assert_eq!(
        events.last(),
        Some(&Event::run_error("translate: unsupported event", Some("r".into())))
    );
}

#[tokio::test]
async fn translator_factory_failure_rejects_run() {
    let factory: TranslatorFactory = Arc::new(
        |_: &RunContext, _: &RunAgentInput, _: &TranslatorOptions| Err("no translator".into()),
    );
    let runner = Runner::builder(ScriptedAgent::new(Vec::new()))
        .with_translator_factory(factory)
        .build();

    let err = runner
        .run(&RunContext::background(), user_input("t", "r", "hi"))
        .err().expect("expected error");
    assert!(matches!(
        err,
        RunnerError::Hook {
            stage: HookStage::CreateTranslator,
            ..
        }
    ));
}
