//! Lumen CLI - ask a chat-completion model about a page, streamed to the terminal.
//!
//! ```text
//! lumen [--model M] [--page FILE --url URL] [--select TEXT]... [QUESTION...]
//! ```
//!
//! Without a question, reads questions line by line. Interactive commands:
//! `/regen [model]`, `/clear`, `/restore`, `/quit`. Ctrl-C stops the running
//! generation, or exits when nothing is running.

mod sink;

use std::io::IsTerminal;
use std::{
    fs::{self, OpenOptions},
    path::PathBuf,
    sync::{Arc, Mutex},
};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use lumen_config::{LumenConfig, Settings};
use lumen_context::PageSnapshot;
use lumen_engine::{ChatSession, GenerationOutcome, StopHandle};
use lumen_providers::HttpTransport;

use sink::TerminalSink;

#[derive(Debug, Parser)]
#[command(name = "lumen")]
#[command(about = "Stream answers about a web page from a chat-completion model")]
struct Cli {
    /// Chat model; overrides `[chat] model`.
    #[arg(long)]
    model: Option<String>,
    /// Text file holding the page's visible content.
    #[arg(long, value_name = "FILE", requires = "url")]
    page: Option<PathBuf>,
    /// URL the page content came from.
    #[arg(long, requires = "page")]
    url: Option<String>,
    /// Selected text to ask about; repeatable.
    #[arg(long = "select", value_name = "TEXT")]
    selections: Vec<String>,
    question: Vec<String>,
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::try_new("warn").expect("warn filter is valid"));

    let (log_file, init_warnings) = open_log_file();

    if let Some((log_path, file)) = log_file {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(env_filter)
            .init();

        tracing::info!(path = %log_path.display(), "Logging initialized");
        for warning in init_warnings {
            tracing::warn!("{warning}");
        }
        return;
    }

    // Streamed answers own stdout; no log file means no logs.
    tracing_subscriber::registry().with(env_filter).init();
}

fn open_log_file() -> (Option<(PathBuf, std::fs::File)>, Vec<String>) {
    let mut warnings = Vec::new();

    for candidate in log_file_candidates() {
        if let Some(parent) = candidate.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warnings.push(format!(
                "Failed to create log dir {}: {e}",
                parent.display()
            ));
            continue;
        }

        match OpenOptions::new()
            .create(true)
            .append(true)
            .open(&candidate)
        {
            Ok(file) => return (Some((candidate, file)), warnings),
            Err(e) => {
                warnings.push(format!(
                    "Failed to open log file {}: {e}",
                    candidate.display()
                ));
            }
        }
    }

    (None, warnings)
}

fn log_file_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    // Primary: ~/.lumen/logs/lumen.log
    if let Some(config_path) = LumenConfig::path()
        && let Some(config_dir) = config_path.parent()
    {
        candidates.push(config_dir.join("logs").join("lumen.log"));
    }

    candidates.push(PathBuf::from(".lumen").join("logs").join("lumen.log"));
    candidates
}

fn load_settings(model: Option<String>) -> Settings {
    let config = match LumenConfig::load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Warning: {err}; using defaults");
            None
        }
    };
    let mut settings = Settings::resolve(config.as_ref());
    if let Some(model) = model {
        settings.chat.model = model;
    }
    settings
}

fn load_page(cli: &Cli) -> Result<Option<PageSnapshot>> {
    let (Some(path), Some(url)) = (&cli.page, &cli.url) else {
        return Ok(None);
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read page content from {}", path.display()))?;
    Ok(Some(PageSnapshot::new(url.as_str(), text)))
}

fn spawn_interrupt_handler(stop: StopHandle) {
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if !stop.stop() {
                std::process::exit(130);
            }
        }
    });
}

fn sink_for(chat: &ChatSession, model: Option<&str>) -> TerminalSink {
    let settings = chat.settings();
    TerminalSink::new(
        settings.provider.kind,
        model.unwrap_or(&settings.chat.model),
        std::io::stdout().is_terminal(),
    )
}

fn report(outcome: Result<GenerationOutcome, lumen_engine::RequestBuildError>) {
    match outcome {
        Ok(GenerationOutcome::Aborted) => eprintln!("\n[stopped]"),
        Ok(_) => {}
        Err(err) => eprintln!("Error: {err}"),
    }
}

async fn ask(
    chat: &mut ChatSession,
    question: &str,
    selections: &[String],
    page: Option<&PageSnapshot>,
) {
    if let Some(page) = page
        && chat.summary().is_enabled()
        && chat.summary().needs_summary(page)
    {
        eprintln!("Summarizing page...");
    }
    let sink = sink_for(chat, None);
    report(chat.send(question, selections, page, sink).await);
}

/// One line of interactive input.
#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    Quit,
    Clear,
    Restore,
    Select(&'a str),
    SelectUsage,
    Regen(Option<&'a str>),
    Ask(&'a str),
}

fn parse_command(line: &str) -> Option<Command<'_>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let (command, arg) = line
        .split_once(char::is_whitespace)
        .map_or((line, ""), |(c, a)| (c, a.trim()));

    Some(match command {
        "/quit" | "/exit" => Command::Quit,
        "/clear" => Command::Clear,
        "/restore" => Command::Restore,
        "/select" if arg.is_empty() => Command::SelectUsage,
        "/select" => Command::Select(arg),
        "/regen" => Command::Regen((!arg.is_empty()).then_some(arg)),
        _ => Command::Ask(line),
    })
}

async fn interactive(chat: &mut ChatSession, page: Option<&PageSnapshot>) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut selections: Vec<String> = Vec::new();

    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        let Some(command) = parse_command(&line) else {
            continue;
        };
        match command {
            Command::Quit => break,
            Command::Clear => {
                chat.clear_context();
                eprintln!("[context cleared]");
            }
            Command::Restore => {
                chat.restore_context();
                eprintln!("[context restored]");
            }
            Command::Select(text) => selections.push(text.to_string()),
            Command::SelectUsage => eprintln!("Usage: /select TEXT"),
            Command::Regen(model) => {
                let sink = sink_for(chat, model);
                report(chat.regenerate_last(model, sink).await);
            }
            Command::Ask(question) => {
                let pending = std::mem::take(&mut selections);
                ask(chat, question, &pending, page).await;
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let page = load_page(&cli)?;
    let settings = load_settings(cli.model.clone());
    let mut chat = ChatSession::new(settings, Arc::new(HttpTransport::new()));
    spawn_interrupt_handler(chat.stop_handle());

    let question = cli.question.join(" ");
    if question.trim().is_empty() && cli.selections.is_empty() {
        interactive(&mut chat, page.as_ref()).await?;
    } else {
        ask(&mut chat, &question, &cli.selections, page.as_ref()).await;
    }

    Ok(())
}
