use agui_contract::{
    AgentError, AgentEvent, AgentEventStream, AgentRunner, Message as EngineMessage, Response,
    RunContext, RunOptions,
};
use agui_protocol::RunAgentInput;
use agui_runner::{MemoryTrackStore, Runner, RunnerConfig, SessionTracker};
use async_trait::async_trait;
use clap::Parser;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "agui-runner")]
struct Args {
    /// JSON runner config.
    #[arg(long, env = "AGUI_RUNNER_CONFIG")]
    config: Option<PathBuf>,

    /// JSON `RunAgentInput` to run.
    #[arg(long)]
    input: PathBuf,

    /// Replay the session as a messages snapshot after the run.
    #[arg(long, default_value_t = false)]
    snapshot: bool,
}

/// Answers every user turn with its own text.
struct EchoAgent;

#[async_trait]
impl AgentRunner for EchoAgent {
    async fn run(
        &self,
        _ctx: RunContext,
        _user_id: &str,
        session_id: &str,
        message: EngineMessage,
        _options: RunOptions,
    ) -> Result<AgentEventStream, AgentError> {
        let reply = if message.content.is_empty() {
            format!("received {} content part(s)", message.content_parts.len())
        } else {
            message.content
        };
        let id = format!("echo-{session_id}");
        Ok(Box::pin(async_stream::stream! {
            yield AgentEvent::new(id.clone(), "echo")
                .with_response(Response::chat_completion(id.clone(), reply));
            yield AgentEvent::new("", "runner").with_response(Response::runner_completion());
        }))
    }
}

async fn print_stream(mut events: agui_runner::EventStream) {
    while let Some(event) = events.next().await {
        match serde_json::to_string(&event) {
            Ok(line) => println!("{line}"),
            Err(e) => tracing::warn!(error = %e, "encode event failed"),
        }
    }
}

fn read_input(path: &Path) -> Result<RunAgentInput, String> {
    let raw = std::fs::read(path).map_err(|e| format!("read input {}: {e}", path.display()))?;
    serde_json::from_slice(&raw).map_err(|e| format!("parse input: {e}"))
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let mut config = match args.config.as_deref() {
        Some(path) => match RunnerConfig::from_path(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("failed to load config: {e}");
                std::process::exit(2);
            }
        },
        None => RunnerConfig::default(),
    };
    if config.app_name.is_empty() {
        config.app_name = "agui-runner".to_string();
    }
    let input = match read_input(&args.input) {
        Ok(input) => input,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(2);
        }
    };

    let tracker = Arc::new(SessionTracker::new(
        Arc::new(MemoryTrackStore::new()),
        config.tracker_options(),
    ));
    let runner = Runner::builder(Arc::new(EchoAgent))
        .with_config(config)
        .with_tracker(tracker)
        .build();

    let ctx = RunContext::background();
    match runner.run(&ctx, input.clone()) {
        Ok(events) => print_stream(events).await,
        Err(e) => {
            eprintln!("run failed: {e}");
            std::process::exit(1);
        }
    }

    if args.snapshot {
        match runner.messages_snapshot(&ctx, input) {
            Ok(events) => print_stream(events).await,
            Err(e) => {
                eprintln!("messages snapshot failed: {e}");
                std::process::exit(1);
            }
        }
    }
}
