#![forbid(unsafe_code)]

//! `agent-scribe` command-line front end.
//!
//! Loads configuration, then either streams one agent call, summarizes one
//! vault document into an issue, or runs the auto-watch loop until a
//! shutdown signal arrives.

use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use tokio::io::AsyncReadExt;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use agent_scribe::agent::AgentKind;
use agent_scribe::issue::IssueLayout;
use agent_scribe::orchestrator::{GenerateRequest, Orchestrator};
use agent_scribe::process::{Channel, StreamEvent};
use agent_scribe::summarize::{
    build_context, read_vault_file, summarize_file_to_issue, SummarizeOptions, DEFAULT_INSTRUCTION,
};
use agent_scribe::watch::AutoWatcher;
use agent_scribe::{AppError, GlobalConfig, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "agent-scribe", about = "Summarize vault documents with CLI agents", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    /// Override the vault root.
    #[arg(long, global = true)]
    vault: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Stream an agent over a vault file, or over stdin when no file is given.
    Run {
        /// Agent to run (claude or codex).
        #[arg(long, default_value = "claude")]
        agent: AgentKind,
        /// Vault-relative file used as source and context.
        #[arg(long)]
        file: Option<String>,
        /// Instruction placed before the source text.
        #[arg(long)]
        prompt: Option<String>,
        /// Timeout in seconds; defaults to the agent's configured timeout.
        #[arg(long)]
        timeout: Option<u64>,
        /// Print every event as a JSON line instead of raw text.
        #[arg(long)]
        json: bool,
    },
    /// Summarize one vault file into an issue and print the result as JSON.
    Summarize {
        /// Vault-relative file to summarize.
        file: String,
        /// Agent to run (claude or codex).
        #[arg(long, default_value = "claude")]
        agent: AgentKind,
        /// Instruction placed before the source text.
        #[arg(long)]
        prompt: Option<String>,
        /// Timeout in seconds; defaults to the agent's configured timeout.
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Watch the vault and summarize new files until interrupted.
    Watch,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    let config = Arc::new(load_config(args.config.as_ref(), args.vault.as_ref())?);
    info!(vault = %config.vault_root.display(), "configuration loaded");
    let orchestrator = Arc::new(Orchestrator::new(Arc::clone(&config)));

    match args.command {
        Command::Run {
            agent,
            file,
            prompt,
            timeout,
            json,
        } => run_stream(&orchestrator, agent, file, prompt, timeout, json).await,
        Command::Summarize {
            file,
            agent,
            prompt,
            timeout,
        } => {
            let mut options = SummarizeOptions::new(
                agent,
                timeout.map_or_else(|| agent.config(&config).timeout(), Duration::from_secs),
            );
            if let Some(prompt) = prompt {
                options.instruction = prompt;
            }
            let saved =
                summarize_file_to_issue(&orchestrator, &config.vault_settings(), &file, &options)
                    .await?;
            let rendered = serde_json::to_string_pretty(&saved)
                .map_err(|err| AppError::Io(format!("failed to render result: {err}")))?;
            println!("{rendered}");
            Ok(())
        }
        Command::Watch => run_watch(orchestrator, &config).await,
    }
}

fn load_config(path: Option<&PathBuf>, vault: Option<&PathBuf>) -> Result<GlobalConfig> {
    let mut config = match path {
        Some(path) => GlobalConfig::load_from_path(path)?,
        None => GlobalConfig::default(),
    };
    config.apply_env_overrides()?;

    if let Some(vault) = vault {
        config.vault_root = vault
            .canonicalize()
            .map_err(|err| AppError::Config(format!("invalid vault override: {err}")))?;
    }
    Ok(config)
}

async fn run_stream(
    orchestrator: &Orchestrator,
    agent: AgentKind,
    file: Option<String>,
    prompt: Option<String>,
    timeout: Option<u64>,
    json: bool,
) -> Result<()> {
    let config = orchestrator.config();
    let vault = config.vault_root.clone();

    let (source, context) = match &file {
        Some(file) => {
            let (_, content) = read_vault_file(&vault, file).await?;
            let layout = IssueLayout::from(&config.vault_settings());
            (content, Some(build_context(&vault, file, &layout)))
        }
        None => {
            let mut content = String::new();
            tokio::io::stdin().read_to_string(&mut content).await?;
            (content, None)
        }
    };

    let mut request = GenerateRequest::new(
        agent,
        source,
        prompt.unwrap_or_else(|| DEFAULT_INSTRUCTION.to_owned()),
    )
    .with_working_dir(vault);
    if let Some(context) = context {
        request = request.with_context(context);
    }
    if let Some(seconds) = timeout {
        request = request.with_timeout(Duration::from_secs(seconds));
    }

    let mut stream = orchestrator.stream(request).await?;
    while let Some(event) = stream.next().await {
        print_event(&event?, json)?;
    }
    Ok(())
}

fn print_event(event: &StreamEvent, json: bool) -> Result<()> {
    if json {
        let line = serde_json::to_string(event)
            .map_err(|err| AppError::Io(format!("failed to render event: {err}")))?;
        println!("{line}");
        return Ok(());
    }
    match event {
        StreamEvent::Chunk {
            channel: Channel::Stdout,
            text,
        } => {
            let mut out = std::io::stdout().lock();
            out.write_all(text.as_bytes())?;
            out.flush()?;
        }
        StreamEvent::Chunk {
            channel: Channel::Stderr,
            text,
        } => eprint!("{text}"),
        StreamEvent::Eof { .. } | StreamEvent::Done { .. } => {}
    }
    Ok(())
}

async fn run_watch(orchestrator: Arc<Orchestrator>, config: &GlobalConfig) -> Result<()> {
    let settings = Arc::new(RwLock::new(config.vault_settings()));
    let watcher = AutoWatcher::new(orchestrator, settings, config.watch.clone());
    watcher.start().await?;
    let mut last = watcher.set_enabled(true).await?;
    info!(vault = %config.vault_root.display(), "watching vault, press Ctrl-C to stop");

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    let mut ticker = tokio::time::interval(config.watch.poll_interval());
    loop {
        tokio::select! {
            () = &mut shutdown => break,
            _ = ticker.tick() => {}
        }
        let status = watcher.status().await;
        if status.processed_count != last.processed_count {
            info!(
                processed = status.processed_count,
                file = status.last_processed_file.as_deref().unwrap_or("-"),
                saved = status.last_saved_path.as_deref().unwrap_or("-"),
                "auto-watch processed file"
            );
        }
        if status.last_error != last.last_error {
            if let Some(error) = &status.last_error {
                warn!(%error, "auto-watch error");
            }
        }
        last = status;
    }

    info!("shutdown signal received");
    watcher.stop().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // Agent output owns stdout.
    let subscriber = fmt().with_env_filter(env_filter).with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
