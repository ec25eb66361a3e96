//! qbatch - concurrent question answering over an OpenAI-compatible API.
//!
//! Answers a batch of questions by issuing one completion per question at the
//! same time, returning results in submission order. Exposed as an HTTP
//! service, an interactive terminal assistant, and a one-shot CLI.

mod config;
mod context;
mod dispatch;
mod error;
mod llm;
mod protocol;
mod server;
mod terminal;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::Config;
use dispatch::{Dispatcher, Outcome};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "qbatch")]
#[command(author, version, about = "Answer batches of questions concurrently")]
struct Cli {
    /// Path to the config file (defaults to the user config directory)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP service
    Serve {
        /// Port to listen on (overrides PORT and the config file)
        #[arg(short, long)]
        port: Option<u16>,

        /// Address to bind
        #[arg(long)]
        host: Option<String>,

        /// Maximum simultaneous completion calls
        #[arg(long, value_name = "N")]
        max_concurrency: Option<usize>,
    },
    /// Start the interactive terminal assistant
    Terminal,
    /// Answer questions given on the command line and exit
    Ask {
        /// Print the result as JSON
        #[arg(long)]
        json: bool,

        /// Maximum simultaneous completion calls
        #[arg(long, value_name = "N")]
        max_concurrency: Option<usize>,

        /// Questions to answer
        #[arg(required = true, value_name = "QUESTION")]
        questions: Vec<String>,
    },
    /// Print the config file path, creating a default file if missing
    Config,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            port,
            host,
            max_concurrency,
        } => {
            init_logging(cli.verbose, false)?;
            serve(cli.config, port, host, max_concurrency).await?;
        }
        Commands::Terminal => {
            init_logging(cli.verbose, true)?;
            run_terminal(cli.config).await?;
        }
        Commands::Ask {
            json,
            max_concurrency,
            questions,
        } => {
            init_logging(cli.verbose, true)?;
            return ask(cli.config, json, max_concurrency, questions).await;
        }
        Commands::Config => handle_config(cli.config)?,
    }
    Ok(ExitCode::SUCCESS)
}

/// Initialize tracing. Interactive modes log to stderr at warn so log lines
/// do not interleave with answers.
fn init_logging(verbose: bool, interactive: bool) -> Result<()> {
    let rust_log = std::env::var("RUST_LOG").ok();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(rust_log.as_deref(), verbose, interactive)?)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

/// `RUST_LOG`, when set, replaces the built-in directives entirely.
fn log_filter(rust_log: Option<&str>, verbose: bool, interactive: bool) -> Result<EnvFilter> {
    if let Some(directives) = rust_log.filter(|d| !d.trim().is_empty()) {
        return EnvFilter::try_new(directives).context("Invalid RUST_LOG");
    }
    let level = match (verbose, interactive) {
        (true, _) => "debug",
        (false, false) => "info",
        (false, true) => "warn",
    };
    Ok(EnvFilter::try_new(format!("qbatch={},reqwest=warn", level))?)
}

fn load_config(path: Option<PathBuf>) -> Result<Config> {
    Config::load(path.as_deref()).context("Failed to load configuration")
}

/// Build the dispatcher for `serve` and `ask`. Fails if no credential is set.
fn build_dispatcher(config: &Config, max_concurrency: Option<usize>) -> Result<Dispatcher> {
    let api_key = config.resolve_api_key()?;
    let completer = llm::create_completer(&config.completion, api_key, None)?;
    let dispatcher =
        Dispatcher::from_config(completer, &config.dispatch, config.completion.max_tokens);

    Ok(match max_concurrency {
        Some(0) => anyhow::bail!("--max-concurrency must be at least 1"),
        Some(limit) => dispatcher.with_max_concurrency(limit),
        None => dispatcher,
    })
}

async fn serve(
    config_path: Option<PathBuf>,
    port: Option<u16>,
    host: Option<String>,
    max_concurrency: Option<usize>,
) -> Result<()> {
    info!("Starting qbatch server...");

    let mut config = load_config(config_path)?;
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(host) = host {
        config.server.host = host;
    }

    let dispatcher = build_dispatcher(&config, max_concurrency)?;
    info!(
        "Using {} (model: {}, max concurrency: {})",
        config.completion.base_url,
        config.completion.model,
        max_concurrency
            .or(config.dispatch.max_concurrency)
            .map_or_else(|| "unbounded".to_string(), |n| n.to_string())
    );

    server::HttpServer::new(config.server, dispatcher).run().await
}

async fn run_terminal(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path)?;
    let api_key = config.resolve_api_key()?;

    let completer = llm::create_completer(
        &config.completion,
        api_key,
        Some(&config.terminal.model),
    )?;
    let dispatcher = Dispatcher::from_config(
        completer.clone(),
        &config.dispatch,
        config.completion.max_tokens,
    );
    let cwd = std::env::current_dir().context("Failed to get current directory")?;

    let session = terminal::Session::new(
        completer,
        dispatcher,
        config.terminal.history_len,
        config.completion.max_tokens,
        cwd,
    );
    terminal::Repl::new(session)?.run().await
}

async fn ask(
    config_path: Option<PathBuf>,
    json: bool,
    max_concurrency: Option<usize>,
    questions: Vec<String>,
) -> Result<ExitCode> {
    let config = load_config(config_path)?;
    let dispatcher = build_dispatcher(&config, max_concurrency)?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        }
    });

    let outcomes = dispatcher.dispatch(&cancel, &questions).await;
    print!("{}", render_outcomes(&outcomes, json)?);
    Ok(ExitCode::from(exit_status(&outcomes)))
}

/// Format `ask` results: one `[i] ...` line per question, or the HTTP
/// response body as JSON.
fn render_outcomes(outcomes: &[Outcome], json: bool) -> Result<String> {
    if json {
        let body = protocol::QuestionsResponse::from_outcomes(outcomes);
        return Ok(serde_json::to_string_pretty(&body)? + "\n");
    }

    let mut rendered = String::new();
    for (index, outcome) in outcomes.iter().enumerate() {
        let line = match outcome {
            Outcome::Answer(answer) => format!("[{}] {}\n", index + 1, answer.trim_end()),
            Outcome::Failure(e) => format!("[{}] error: {}\n", index + 1, e),
        };
        rendered.push_str(&line);
    }
    Ok(rendered)
}

/// 1 if any question failed.
fn exit_status(outcomes: &[Outcome]) -> u8 {
    u8::from(outcomes.iter().any(Outcome::is_failure))
}

/// Handle the config command.
fn handle_config(path: Option<PathBuf>) -> Result<()> {
    let config_path = match path {
        Some(path) => path,
        None => Config::config_path()?,
    };

    if !config_path.exists() {
        Config::default().save_to(&config_path)?;
        eprintln!("Created default config at {}", config_path.display());
    }

    println!("{}", config_path.display());
    Ok(())
}
