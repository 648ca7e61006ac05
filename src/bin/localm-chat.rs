//! Terminal chat over the loopback engine
//!
//! Runs a full session from the command line: model loads with progress,
//! streamed or single-shot replies, model switching and session reset.

use std::io::Write;
use std::sync::Arc;

use localm_session::inference::LoopbackEngine;
use localm_session::session::{event_channel, ChatEvent, LivenessFailure};
use localm_session::storage::settings::load_settings;
use localm_session::types::{Message, ModelConfig};
use localm_session::{ChatRequest, LlmApi, LocalLlmApi};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

const HELP: &str = "\
/models     list catalog models
/use <id>   switch model
/stream on|off
/clear      reset session
/quit";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("localm_session=info")),
        )
        .init();

    let settings = load_settings();
    let engine = Arc::new(LoopbackEngine::new().with_stream_buffer(settings.stream_buffer));
    let mut api = LocalLlmApi::with_settings(
        engine,
        &settings,
        Arc::new(|failure: LivenessFailure| {
            tracing::error!("Engine crashed: {}. Use /clear to reload.", failure);
        }),
    );

    let mut config = settings.default_model.clone();
    let mut history: Vec<Message> = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("LocaLM chat ({}). Type /help for commands.", config.model);
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match line.split_once(' ').unwrap_or((line, "")) {
            ("/quit", _) => break,
            ("/help", _) => println!("{HELP}"),
            ("/models", _) => {
                for model in api.models().await {
                    println!("  {}", model.name);
                }
            }
            ("/use", id) if !id.trim().is_empty() => {
                config.model = id.trim().to_string();
                println!("Next reply uses {}", config.model);
            }
            ("/stream", mode) => {
                config.stream = mode.trim() != "off";
                println!("Streaming {}", if config.stream { "on" } else { "off" });
            }
            ("/clear", _) => {
                api.clear();
                history.clear();
                println!("Session cleared");
            }
            _ => {
                history.push(Message::user(line));
                if let Some(reply) = run_turn(&api, history.clone(), config.clone()).await {
                    history.push(Message::assistant(reply));
                }
            }
        }
    }

    api.shutdown();
    Ok(())
}

async fn run_turn(
    api: &LocalLlmApi,
    messages: Vec<Message>,
    config: ModelConfig,
) -> Option<String> {
    let (listener, mut rx) = event_channel();
    let request = ChatRequest::new(messages, config);

    let printer = async {
        let mut stdout = std::io::stdout();
        let mut shown = String::new();
        while let Some(event) = rx.recv().await {
            match event {
                ChatEvent::Update { message, chunk } => {
                    // Load stages and the first delta start a fresh line
                    if message == chunk {
                        let _ = write!(stdout, "\n{chunk}");
                    } else {
                        let _ = write!(stdout, "{chunk}");
                    }
                    let _ = stdout.flush();
                    shown = message;
                }
                ChatEvent::Finish { message } => {
                    if shown != message {
                        print!("\n{message}");
                    }
                    println!();
                    return Some(message);
                }
                ChatEvent::Error { error } => {
                    eprintln!("\nerror: {error}");
                    return None;
                }
            }
        }
        None
    };

    let ((), reply) = tokio::join!(api.chat(request, listener), printer);
    reply
}
