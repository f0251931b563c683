mod config;
mod error;

use std::fmt::Display;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use catalog::{Catalog, DEFAULT_PREFERRED_REGION, DedupPolicy};
use chrono::{Local, TimeZone};
use clap::{Parser, Subcommand};
use journal::{ConversationId, Entry, EntryKind, Journal};
use mcp::Session;
use runtime::{
    Conversation, GeminiAdapter, GeminiBackend, ModelBackend, OllamaAdapter, OllamaBackend,
    SchemaAdapter, Turn,
};
use serde_json::Value;
use toolbox::{ToolRegistry, ToolRouter};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

use config::{CONFIG_FILE, Config, ProviderKind};
use error::{Error, Result};

const JOURNAL_FILE: &str = "journal.db";

#[derive(Parser)]
#[command(name = "ganache")]
#[command(about = "Product catalog tools for language models, over MCP", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the catalog tools over stdio
    Serve {
        /// Dataset file (JSON Lines or a JSON array)
        #[arg(short, long, env = "GANACHE_DATA")]
        data: Option<PathBuf>,
        /// Region kept when a SKU is published under several
        #[arg(long, env = "GANACHE_REGION", default_value = DEFAULT_PREFERRED_REGION)]
        preferred_region: String,
    },
    /// Start an interactive chat against the catalog tools
    Chat {
        /// Configuration file
        #[arg(short, long, default_value = CONFIG_FILE)]
        config: PathBuf,
    },
    /// List journaled conversations
    History {
        /// Show only the last N conversations
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
    /// Print one conversation from the journal
    Show {
        /// Conversation ID (prefix match supported)
        prefix: String,
    },
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Logs go to stderr; in `serve` mode stdout carries protocol frames.
fn init_tracing() {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Serve {
            data,
            preferred_region,
        }) => cmd_serve(data, preferred_region).await,
        Some(Commands::Chat { config }) => cmd_chat(&config).await,
        None => cmd_chat(Path::new(CONFIG_FILE)).await,
        Some(Commands::History { limit }) => cmd_history(limit),
        Some(Commands::Show { prefix }) => cmd_show(&prefix),
    }
}

async fn cmd_serve(data: Option<PathBuf>, preferred_region: String) -> Result<()> {
    let catalog = load_catalog(data.as_deref(), preferred_region)?;
    let router = ToolRouter::new(ToolRegistry::builtin(), Arc::new(catalog));
    info!(tools = router.registry().len(), "serving on stdio");
    mcp::serve_stdio(Arc::new(router)).await?;
    Ok(())
}

/// The dataset must load before anything is served.
fn load_catalog(data: Option<&Path>, preferred_region: String) -> Result<Catalog> {
    let path = data.ok_or(Error::NoDataset)?;
    let catalog = Catalog::open(path, &DedupPolicy::new(preferred_region))?;
    Ok(catalog)
}

async fn cmd_chat(config_path: &Path) -> Result<()> {
    let config = Config::load(config_path)?;
    let journal = open_journal(true)?;
    let model = config.model();

    match config.provider.kind {
        ProviderKind::Ollama => {
            let mut builder = OllamaBackend::builder(&model);
            if let Some(endpoint) = &config.provider.endpoint {
                builder = builder.endpoint(endpoint);
            }
            if let Some(temperature) = config.provider.temperature {
                builder = builder.temperature(temperature);
            }
            run_chat(builder.build(), OllamaAdapter, &config, &journal).await
        }
        ProviderKind::Gemini => {
            let mut builder = GeminiBackend::builder(config.api_key()?, &model);
            if let Some(endpoint) = &config.provider.endpoint {
                builder = builder.endpoint(endpoint);
            }
            if let Some(temperature) = config.provider.temperature {
                builder = builder.temperature(temperature);
            }
            run_chat(builder.build(), GeminiAdapter, &config, &journal).await
        }
    }
}

async fn run_chat<B, A>(backend: B, adapter: A, config: &Config, journal: &Journal) -> Result<()>
where
    B: ModelBackend + Display,
    A: SchemaAdapter<Declaration = B::Declaration, Call = B::Call>,
{
    println!("ganache v{}", env!("CARGO_PKG_VERSION"));

    let exe = std::env::current_exe()?;
    let session = Session::spawn(config.server(&exe), config.session_options()).await?;
    println!(
        "Connected to {} {} (protocol {})",
        session.server_info().name,
        session.server_info().version,
        session.protocol_version()
    );
    println!("Tools:");
    for tool in session.tools() {
        let summary = tool.description.lines().next().unwrap_or_default();
        println!("  {} - {summary}", tool.name);
    }

    let label = backend.to_string();
    let mut conversation =
        match Conversation::new(backend, adapter, session.clone(), config.conversation()) {
            Ok(conversation) => conversation,
            Err(e) => {
                session.close().await;
                return Err(e.into());
            }
        };

    let id = ConversationId::new();
    journal.record(
        id,
        EntryKind::Start {
            provider: config.provider.kind.to_string(),
            model: config.model(),
        },
    )?;
    println!("Conversation: {id}");
    println!("Model: {label}");
    println!("Type 'quit' or Ctrl+D to exit.\n");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("> ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }

        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input == "quit" || input == "exit" {
            break;
        }

        let mark = conversation.history().len();
        match conversation.send(input).await {
            Ok(reply) => {
                for turn in &conversation.history()[mark..] {
                    for kind in journal_kinds(turn) {
                        journal.record(id, kind)?;
                    }
                }
                if reply.degraded {
                    journal.record(
                        id,
                        EntryKind::Degraded {
                            reason: reply.text.clone(),
                        },
                    )?;
                }
                println!("\n{}\n", reply.text);
            }
            Err(runtime::Error::ToolService(e)) => {
                journal.append(&Entry::user(id, input))?;
                journal.record(
                    id,
                    EntryKind::Degraded {
                        reason: e.to_string(),
                    },
                )?;
                eprintln!("cannot reach tool service: {e}");
                break;
            }
            Err(e) => {
                journal.append(&Entry::user(id, input))?;
                journal.record(
                    id,
                    EntryKind::Degraded {
                        reason: e.to_string(),
                    },
                )?;
                match &e {
                    runtime::Error::Model(model) if model.is_transient() => {
                        eprintln!("Error: {e}\nThe model may answer if you send that again.\n")
                    }
                    _ => eprintln!("Error: {e}\n"),
                }
            }
        }
    }

    journal.record(id, EntryKind::End)?;
    session.close().await;
    println!("\nConversation ended.");
    Ok(())
}

/// Journal entries for one history turn.
fn journal_kinds(turn: &Turn) -> Vec<EntryKind> {
    match turn {
        Turn::User { text } => vec![EntryKind::User { text: text.clone() }],
        Turn::Model { text, calls } => {
            let mut kinds = Vec::with_capacity(calls.len() + 1);
            if !text.is_empty() || calls.is_empty() {
                kinds.push(EntryKind::Model { text: text.clone() });
            }
            kinds.extend(calls.iter().map(|call| EntryKind::ToolCall {
                call_id: call.id.clone(),
                name: call.name.clone(),
                arguments: Value::Object(call.arguments.clone()),
            }));
            kinds
        }
        Turn::ToolResult {
            call_id,
            name,
            content,
            is_error,
        } => vec![EntryKind::ToolResult {
            call_id: call_id.clone(),
            name: name.clone(),
            content: content.clone(),
            is_error: *is_error,
        }],
    }
}

fn cmd_history(limit: usize) -> Result<()> {
    let journal = open_journal(false)?;
    let conversations = journal.list()?;

    if conversations.is_empty() {
        println!("No conversations found.");
        return Ok(());
    }

    println!(
        "{:<36}  {:<16}  {:<7}  FIRST PROMPT",
        "CONVERSATION ID", "STARTED", "ENTRIES"
    );
    println!("{}", "-".repeat(100));

    for summary in conversations.into_iter().take(limit) {
        let started = Local
            .from_utc_datetime(&summary.started_at.naive_utc())
            .format("%Y-%m-%d %H:%M");
        let prompt = summary
            .first_prompt
            .as_deref()
            .map(|p| clip(p, 40))
            .unwrap_or_default();
        println!(
            "{:<36}  {:<16}  {:<7}  {prompt}",
            summary.id.to_string(),
            started.to_string(),
            summary.entry_count
        );
    }

    Ok(())
}

fn cmd_show(prefix: &str) -> Result<()> {
    let journal = open_journal(false)?;
    let id = journal.resolve(prefix)?;
    let entries = journal.load(id)?;

    println!("Conversation: {id}\n");
    for entry in entries {
        print_entry(&entry);
    }
    Ok(())
}

fn print_entry(entry: &Entry) {
    let time = Local
        .from_utc_datetime(&entry.timestamp.naive_utc())
        .format("%H:%M:%S");

    match &entry.kind {
        EntryKind::Start { provider, model } => {
            println!("[{time}] === Started with {provider}/{model} ===");
        }
        EntryKind::End => {
            println!("[{time}] === Ended ===");
        }
        EntryKind::User { text } => println!("[{time}] USER: {}", clip(text, 200)),
        EntryKind::Model { text } => println!("[{time}] MODEL: {}", clip(text, 200)),
        EntryKind::ToolCall {
            call_id,
            name,
            arguments,
        } => {
            println!("[{time}] TOOL CALL {call_id}: {name} {arguments}");
        }
        EntryKind::ToolResult {
            call_id,
            name,
            content,
            is_error,
        } => {
            let marker = if *is_error { " (error)" } else { "" };
            println!(
                "[{time}] TOOL RESULT {call_id}: {name}{marker} {}",
                clip(content, 200)
            );
        }
        EntryKind::Degraded { reason } => {
            println!("[{time}] DEGRADED: {}", clip(reason, 200));
        }
    }
}

/// First `max` characters of the first line, with an ellipsis when cut.
fn clip(text: &str, max: usize) -> String {
    let line = text.lines().next().unwrap_or_default();
    if line.chars().count() > max || line.len() < text.trim_end().len() {
        let cut: String = line.chars().take(max).collect();
        format!("{cut}...")
    } else {
        line.to_string()
    }
}

fn open_journal(create: bool) -> Result<Journal> {
    let data_dir = dirs_data_dir().unwrap_or_else(|| ".ganache".into());
    let path = data_dir.join(JOURNAL_FILE);

    if create {
        std::fs::create_dir_all(&data_dir)?;
    } else if !path.exists() {
        return Err(Error::JournalNotFound { path });
    }

    Ok(Journal::open(&path)?)
}

fn dirs_data_dir() -> Option<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local/share/ganache"))
    }
    #[cfg(target_os = "linux")]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local/share")))
            .map(|p| p.join("ganache"))
    }
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|h| PathBuf::from(h).join("ganache"))
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runtime::ToolCall;
    use serde_json::{Map, json};

    #[test]
    fn model_turn_with_calls_journals_each_call() {
        let mut arguments = Map::new();
        arguments.insert("fat_value".into(), json!(30));
        let turn = Turn::Model {
            text: String::new(),
            calls: vec![ToolCall {
                id: "call_0_0".into(),
                name: "query_skus_by_fat".into(),
                arguments,
                signature: None,
            }],
        };

        let kinds = journal_kinds(&turn);
        assert_eq!(kinds.len(), 1);
        assert!(matches!(
            &kinds[0],
            EntryKind::ToolCall { name, arguments, .. }
                if name == "query_skus_by_fat" && arguments["fat_value"] == 30
        ));
    }

    #[test]
    fn final_answer_journals_model_text() {
        let turn = Turn::Model {
            text: "Two SKUs.".into(),
            calls: Vec::new(),
        };
        assert_eq!(
            journal_kinds(&turn),
            [EntryKind::Model {
                text: "Two SKUs.".into()
            }]
        );
    }

    #[test]
    fn clip_cuts_long_and_multiline_text() {
        assert_eq!(clip("short", 10), "short");
        assert_eq!(clip("abcdefgh", 4), "abcd...");
        assert_eq!(clip("first\nsecond", 40), "first...");
    }

    #[test]
    fn cli_parses_serve_flags() {
        let cli = Cli::try_parse_from(["ganache", "serve", "--data", "skus.jsonl"]).unwrap();
        match cli.command {
            Some(Commands::Serve {
                data,
                preferred_region,
            }) => {
                assert_eq!(data, Some(PathBuf::from("skus.jsonl")));
                assert!(!preferred_region.is_empty());
            }
            _ => panic!("expected serve"),
        }
    }

    #[tokio::test]
    async fn serve_fails_when_dataset_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("chocolate.jsonl");

        let err = cmd_serve(Some(missing), "EU".into()).await.unwrap_err();
        assert!(matches!(err, Error::Catalog(catalog::Error::Unreadable { .. })), "{err}");

        let err = cmd_serve(None, "EU".into()).await.unwrap_err();
        assert!(matches!(err, Error::NoDataset));
    }

    #[test]
    fn load_catalog_reads_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chocolate.jsonl");
        std::fs::write(
            &path,
            "{\"Material_Code\":\"CHD-A\",\"Base_Type\":\"Dark\",\"Fat\":40}\n",
        )
        .unwrap();

        let catalog = load_catalog(Some(&path), "EU".into()).unwrap();
        assert_eq!(catalog.len(), 1);
    }
}
