//! dmr-relay CLI
//!
//! Run with: cargo run --bin dmr-relay -- models

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dmr_relay::pipe::PIPE_ID;
use dmr_relay::{ChatMessage, Config, Pipe, Reply, Telemetry};
use futures::StreamExt;
use serde_json::{json, Value};
use std::io::{Read, Write};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "dmr-relay")]
#[command(about = "Relay requests to a Docker Model Runner engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Model runner base URL - overrides DMR_BASE_URL
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Engine path suffix - overrides DMR_ENGINE_SUFFIX
    #[arg(long, global = true)]
    engine_suffix: Option<String>,

    /// Retries on connection failures - overrides DMR_RETRY_COUNT
    #[arg(long, global = true)]
    retry_count: Option<u32>,

    /// Also write JSON logs to this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List available models
    Models {
        /// Bypass the model cache
        #[arg(long)]
        refresh: bool,
    },

    /// Send a chat completion
    Chat {
        /// The user message
        prompt: String,

        /// Model to use
        #[arg(short, long)]
        model: String,

        /// Optional system message
        #[arg(long)]
        system: Option<String>,

        /// Print fragments as they arrive
        #[arg(long)]
        stream: bool,
    },

    /// Send a text completion
    Complete {
        prompt: String,

        #[arg(short, long)]
        model: String,
    },

    /// Compute embeddings for the input text
    Embed {
        input: String,

        #[arg(short, long)]
        model: String,
    },

    /// Relay a raw JSON request body read from a file, or stdin when omitted
    Send { file: Option<PathBuf> },
}

fn build_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::from_env()?;
    if let Some(ref base_url) = cli.base_url {
        config = config.with_base_url(base_url.clone());
    }
    if let Some(ref suffix) = cli.engine_suffix {
        config = config.with_engine_suffix(suffix.clone());
    }
    if let Some(retries) = cli.retry_count {
        config = config.with_retry_count(retries);
    }
    Ok(config)
}

fn read_body(file: Option<&PathBuf>) -> Result<Value> {
    let raw = match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut raw = String::new();
            std::io::stdin().read_to_string(&mut raw)?;
            raw
        }
    };
    serde_json::from_str(&raw).context("Request body is not valid JSON")
}

/// Model id as the host would send it, namespaced by the pipe id.
///
/// Shaping strips everything up to the first `.`, so ids like `ai/llama3.2`
/// must carry the prefix to survive.
fn host_model_id(model: &str) -> String {
    format!("{}.{}", PIPE_ID, model)
}

fn chat_body(model: &str, system: Option<String>, prompt: String, stream: bool) -> Value {
    let mut messages = Vec::new();
    if let Some(system) = system {
        messages.push(ChatMessage::system(system));
    }
    messages.push(ChatMessage::user(prompt));

    json!({"model": host_model_id(model), "messages": messages, "stream": stream})
}

fn completion_body(model: &str, prompt: String) -> Value {
    json!({"model": host_model_id(model), "prompt": prompt})
}

fn embedding_body(model: &str, input: String) -> Value {
    json!({"model": host_model_id(model), "input": input})
}

async fn print_reply(reply: Reply) -> Result<()> {
    let mut stdout = std::io::stdout();
    match reply {
        Reply::Text(text) => writeln!(stdout, "{}", text)?,
        Reply::Stream(mut stream) => {
            while let Some(fragment) = stream.next().await {
                write!(stdout, "{}", fragment)?;
                stdout.flush()?;
            }
            writeln!(stdout)?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _telemetry = Telemetry::init(cli.verbose, cli.log_dir.as_deref())?;

    let config = build_config(&cli)?;
    tracing::debug!(endpoint = %config.endpoint_url(), "Loaded configuration");
    let pipe = Pipe::new(config)?;

    match cli.command {
        Commands::Models { refresh } => {
            let models = pipe.catalog().list_models(refresh).await;
            for model in models {
                if model.id == model.display_name {
                    println!("{}", model.id);
                } else {
                    println!("{}\t{}", model.id, model.display_name);
                }
            }
        }
        Commands::Chat {
            prompt,
            model,
            system,
            stream,
        } => {
            let body = chat_body(&model, system, prompt, stream);
            print_reply(pipe.handle(body).await).await?;
        }
        Commands::Complete { prompt, model } => {
            let body = completion_body(&model, prompt);
            print_reply(pipe.handle(body).await).await?;
        }
        Commands::Embed { input, model } => {
            let body = embedding_body(&model, input);
            print_reply(pipe.handle(body).await).await?;
        }
        Commands::Send { file } => {
            let body = read_body(file.as_ref())?;
            print_reply(pipe.handle(body).await).await?;
        }
    }

    Ok(())
}
