//! Run a remote script and interact with it from the terminal.
//!
//! Run with:
//!   cargo run -p terminal-client -- --ws-url wss://relay.example.com/prod \
//!       --submit-url https://api.example.com/run-script scripts/hello.py
//!
//! Without `--submit-url` the job request is only logged, which is handy when
//! the runner is started by hand. Lines typed on stdin answer input prompts.
//! `:history` dumps received frames as JSON lines, `:clear` clears the output
//! and `:quit` disconnects.

use std::{io::Write, sync::Arc, time::Duration};

use anyhow::Context;
use clap::Parser;
use script_relay_core::{InputPolicy, JobSubmitter, Status, StatusKind, Stream};
use script_relay_session::{
    FrameDisposition, JobDescriptor, RouteOutcome, SessionConfig, SessionEvent, SessionManager,
    submit::{HttpJobSubmitter, RecordingSubmitter},
};
use script_relay_transport::{WebSocketConnector, WsConnectorOptions};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "terminal-client")]
#[command(about = "Stream a remote script run to the terminal")]
struct Args {
    /// Storage key of the script to run
    script_key: String,

    /// Duplex channel URL
    #[arg(long, env = "SCRIPT_RELAY_WS_URL")]
    ws_url: String,

    /// Run-script endpoint. Omit to log the job request instead of sending it
    #[arg(long, env = "SCRIPT_RELAY_SUBMIT_URL")]
    submit_url: Option<String>,

    /// Role announced on the channel
    #[arg(long, default_value = "frontend")]
    role: String,

    /// Client id reported to the job runner
    #[arg(long, default_value = "frontend-client")]
    client_id: String,

    /// Give up after this many seconds without a frame
    #[arg(long)]
    idle_timeout_secs: Option<u64>,

    /// Send a ping every this many seconds
    #[arg(long)]
    ping_interval_secs: Option<u64>,

    /// Refuse input while no prompt is pending
    #[arg(long)]
    require_prompt: bool,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, env = "SCRIPT_RELAY_LOG", default_value = "warn")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .init();

    let mut config = SessionConfig::new(&args.ws_url)
        .with_role(&args.role)
        .with_client_id(&args.client_id);
    if args.require_prompt {
        config = config.with_input_policy(InputPolicy::RequirePrompt);
    }
    if let Some(secs) = args.idle_timeout_secs {
        config = config.with_idle_timeout(Duration::from_secs(secs));
    }

    let mut options = WsConnectorOptions::default();
    if let Some(secs) = args.ping_interval_secs {
        options = options.with_ping_interval(Duration::from_secs(secs));
    }

    let submitter: Arc<dyn JobSubmitter> = match &args.submit_url {
        Some(url) => Arc::new(HttpJobSubmitter::new(url).context("building HTTP client")?),
        None => {
            tracing::warn!("No --submit-url given; the job request will not be sent");
            Arc::new(RecordingSubmitter::new())
        }
    };

    let mut manager = SessionManager::new(
        config,
        Arc::new(WebSocketConnector::new(options)),
        submitter,
    );

    let execution_id = manager
        .start_session(&JobDescriptor::new(&args.script_key))
        .await
        .context("starting session")?;
    eprintln!("execution {execution_id}");

    run(&mut manager).await
}

async fn run(manager: &mut SessionManager) -> anyhow::Result<()> {
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            line = stdin.next_line(), if stdin_open => {
                match line.context("reading stdin")? {
                    Some(line) => {
                        if !handle_command(manager, line.trim_end())? {
                            manager.disconnect();
                            return Ok(());
                        }
                    }
                    None => stdin_open = false,
                }
            }
            event = manager.recv() => {
                let Some(event) = event else {
                    return Ok(());
                };
                render(manager, &event);
                if matches!(event, SessionEvent::Closed { .. } | SessionEvent::Errored(_)) {
                    return Ok(());
                }
            }
        }
    }
}

/// Returns false when the user asked to quit.
fn handle_command(manager: &mut SessionManager, line: &str) -> anyhow::Result<bool> {
    match line {
        ":quit" => return Ok(false),
        ":clear" => manager.clear_output(),
        ":history" => {
            let mut out = std::io::stdout().lock();
            manager.history().write_jsonl(&mut out)?;
            out.flush()?;
        }
        text => {
            if let Err(e) = manager.submit_input(text) {
                eprintln!("! {e}");
            }
        }
    }
    Ok(true)
}

fn render(manager: &SessionManager, event: &SessionEvent) {
    match event {
        SessionEvent::Frame(FrameDisposition::Routed(outcome)) => match outcome {
            RouteOutcome::Output(stream) => {
                if let Some(line) = manager.output().lines(*stream).last() {
                    match stream {
                        Stream::Stdout => println!("{line}"),
                        Stream::Stderr => eprintln!("{line}"),
                    }
                }
            }
            RouteOutcome::PromptRequested => {
                if let Some(prompt) = manager.input_prompt() {
                    println!("? {prompt}");
                }
            }
            RouteOutcome::Status => print_status(manager.status()),
            RouteOutcome::PromptCleared
            | RouteOutcome::ExecutionMismatch
            | RouteOutcome::Ignored => {}
        },
        SessionEvent::Frame(_) => {}
        SessionEvent::Opened | SessionEvent::Closed { .. } | SessionEvent::Errored(_) => {
            print_status(manager.status());
        }
    }
}

fn print_status(status: &Status) {
    let tag = match status.kind {
        StatusKind::Info => "info",
        StatusKind::Success => "ok",
        StatusKind::Warning => "warn",
        StatusKind::Error => "error",
    };
    eprintln!("[{tag}] {}", status.message);
}
