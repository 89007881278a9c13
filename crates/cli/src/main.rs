mod config;
mod error;
mod surface;

use std::path::{Path, PathBuf};

use chrono::{Local, TimeZone};
use clap::{Parser, Subcommand};
use registry::{load_units, register_builtins, Registry};
use runtime::{GeminiBackend, Orchestrator, Surface};
use serde_json::{Map, Value};
use store::{SessionId, SessionStore};
use tracing_subscriber::EnvFilter;

use config::{Config, AGENT_DIR};
use error::{Error, Result};
use surface::StdioSurface;

const SYSTEM_INSTRUCTIONS_FILE: &str = "prompts/system_instructions.md";
const FIRST_RUN_FILE: &str = "prompts/first_runs.md";
const UNITS_DIR: &str = "functions";
const DB_FILE: &str = "sessions.db";

#[derive(Parser)]
#[command(name = "tiller")]
#[command(about = "A terminal chat agent with local tools", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive chat session
    Chat {
        /// Resume a stored session (id prefix match supported)
        #[arg(short, long)]
        resume: Option<String>,
    },
    /// List stored sessions
    Sessions {
        /// Show only the last N sessions
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None => cmd_chat(None).await,
        Some(Commands::Chat { resume }) => cmd_chat(resume).await,
        Some(Commands::Sessions { limit }) => cmd_sessions(limit),
    }
}

async fn cmd_chat(resume: Option<String>) -> Result<()> {
    println!("tiller v{}", env!("CARGO_PKG_VERSION"));

    let base_dir = config_dir();
    let agent_dir = std::env::current_dir()?.join(AGENT_DIR);
    let config = Config::load_layered(&base_dir, &agent_dir)?;

    let mut surface = StdioSurface::new();
    let api_key = match config.api_key() {
        Some(key) => key,
        None => prompt_api_key(&mut surface)?,
    };
    let backend = GeminiBackend::builder(api_key, &config.model).build();

    let data_dir = config.data_dir.clone().unwrap_or_else(data_dir);
    std::fs::create_dir_all(&data_dir)?;
    let db_path = data_dir.join(DB_FILE);
    let mut store = SessionStore::open(&db_path)?;

    let mut registry = Registry::new();
    register_builtins(&mut registry);
    load_units(&mut registry, &base_dir.join(UNITS_DIR));
    if agent_dir.exists() {
        load_units(&mut registry, &agent_dir.join(UNITS_DIR));
    }

    let system = load_system_instructions(&base_dir, &agent_dir)? + &system_information();

    println!("Model: {}", config.model);
    println!("Sessions stored at: {}", db_path.display());
    println!("Capabilities: {}", registry.len());

    if store.list()?.is_empty() {
        render_first_run_banner(&base_dir, &agent_dir);
    }

    if let Some(prefix) = resume {
        let id = find_session(&store, &prefix)?;
        store.load(id)?;
        println!("Resumed session {id}");
    }

    println!("Type 'quit' or Ctrl+D to exit.\n");

    let mut orchestrator = Orchestrator::new(&mut store, &registry, &backend, &backend, &system)
        .with_max_rounds(config.max_rounds);

    loop {
        let Some(line) = surface.read_line("> ")? else {
            break;
        };

        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input == "quit" || input == "exit" {
            break;
        }

        // A bare capability name runs directly, without a model round trip.
        if !input.contains(' ') && registry.contains(input) {
            let (_, value, _) = registry.execute(input, Map::new()).await.into_reply();
            surface.render_text(&render_value(&value));
            continue;
        }

        if let Err(e) = orchestrator.user_turn(&mut surface, input).await {
            eprintln!("Error: {e}\n");
        }
    }

    println!("\nBye.");
    Ok(())
}

fn cmd_sessions(limit: usize) -> Result<()> {
    let base_dir = config_dir();
    let agent_dir = std::env::current_dir()?.join(AGENT_DIR);
    let config = Config::load_layered(&base_dir, &agent_dir)?;

    let db_path = config.data_dir.clone().unwrap_or_else(data_dir).join(DB_FILE);
    if !db_path.exists() {
        println!("No sessions found.");
        return Ok(());
    }

    let store = SessionStore::open(&db_path)?;
    let sessions = store.list()?;
    if sessions.is_empty() {
        println!("No sessions found.");
        return Ok(());
    }

    println!("{:<36}  {:<20}  PREVIEW", "SESSION ID", "STARTED");
    println!("{}", "-".repeat(80));

    for summary in sessions.into_iter().take(limit) {
        let started = Local
            .from_utc_datetime(&summary.created_at.naive_utc())
            .format("%Y-%m-%d %H:%M");
        println!(
            "{:<36}  {:<20}  {}",
            summary.id,
            started,
            summary.preview.as_deref().unwrap_or("(empty)")
        );
    }

    Ok(())
}

fn find_session(store: &SessionStore, prefix: &str) -> Result<SessionId> {
    let sessions = store.list()?;
    let matching: Vec<_> = sessions
        .iter()
        .filter(|s| s.id.to_string().starts_with(prefix))
        .collect();

    match matching.len() {
        0 => Err(Error::SessionNotFound {
            prefix: prefix.to_string(),
        }),
        1 => Ok(matching[0].id),
        _ => Err(Error::AmbiguousSession {
            prefix: prefix.to_string(),
            matches: matching.iter().map(|s| s.id.to_string()).collect(),
        }),
    }
}

fn prompt_api_key(surface: &mut StdioSurface) -> Result<String> {
    println!(
        "API key is not set. Visit https://aistudio.google.com/app/apikey to obtain one."
    );
    let key = surface
        .read_line("Enter your GOOGLE_API_KEY: ")?
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .ok_or(Error::MissingApiKey)?;
    Ok(key)
}

fn load_system_instructions(base_dir: &Path, agent_dir: &Path) -> Result<String> {
    for dir in [agent_dir, base_dir] {
        let path = dir.join(SYSTEM_INSTRUCTIONS_FILE);
        if path.exists() {
            return Ok(std::fs::read_to_string(&path)?);
        }
    }
    Err(Error::MissingSystemInstructions(
        base_dir.join(SYSTEM_INSTRUCTIONS_FILE),
    ))
}

fn render_first_run_banner(base_dir: &Path, agent_dir: &Path) {
    for dir in [agent_dir, base_dir] {
        let path = dir.join(FIRST_RUN_FILE);
        if let Ok(text) = std::fs::read_to_string(&path) {
            println!("\n{text}");
            return;
        }
    }
}

/// Host facts appended to the system instructions so the model knows what
/// it is operating on.
fn system_information() -> String {
    format!(
        "\n\n## Host\nos: {}\narch: {}\nfamily: {}\n",
        std::env::consts::OS,
        std::env::consts::ARCH,
        std::env::consts::FAMILY
    )
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

fn config_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(|h| PathBuf::from(h).join("tiller"))
            .unwrap_or_else(|| PathBuf::from(".tiller"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))
            .map(|p| p.join("tiller"))
            .unwrap_or_else(|| PathBuf::from(".tiller"))
    }
}

fn data_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(|h| PathBuf::from(h).join("tiller"))
            .unwrap_or_else(|| PathBuf::from(".tiller"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local/share")))
            .map(|p| p.join("tiller"))
            .unwrap_or_else(|| PathBuf::from(".tiller"))
    }
}
