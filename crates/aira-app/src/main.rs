//! AIRA application binary - composition root.
//!
//! 1. Parse CLI arguments and load configuration from TOML
//! 2. Open the SQLite family store
//! 3. Build the capabilities (network clients, or mocks with `--offline`)
//! 4. Wire the conversation orchestrator and run the requested command

mod cli;
mod session;

use std::sync::Arc;

use clap::Parser;

use aira_chat::{
    ConversationOrchestrator, MockCompletion, MockSearch, MockTranscription, SessionContext,
    VoiceInput,
};
use aira_core::capability::{TextCompletion, Transcriber, WebSearch};
use aira_core::config::AiraConfig;
use aira_core::error::AiraError;
use aira_core::store::FamilyStore;
use aira_core::types::Utterance;
use aira_provider::{OpenAiCompletion, OpenAiTranscriber, TavilySearch};
use aira_storage::{Database, SqliteFamilyStore};

use cli::{CliArgs, Command};

/// External services used by the pipeline.
struct Capabilities {
    completion: Arc<dyn TextCompletion>,
    search: Option<Arc<dyn WebSearch>>,
    transcriber: Arc<dyn Transcriber>,
}

impl Capabilities {
    fn offline() -> Self {
        tracing::info!("Offline mode: using local mock capabilities");
        Self {
            completion: Arc::new(MockCompletion::new()),
            search: Some(Arc::new(MockSearch::new())),
            transcriber: Arc::new(MockTranscription::new()),
        }
    }

    fn online(config: &AiraConfig) -> Result<Self, AiraError> {
        let completion = OpenAiCompletion::from_config(&config.provider)?;
        let transcriber = OpenAiTranscriber::from_config(&config.provider)?;
        let search: Option<Arc<dyn WebSearch>> = if config.search.enabled {
            match TavilySearch::from_config(&config.tavily) {
                Ok(s) => Some(Arc::new(s) as Arc<dyn WebSearch>),
                Err(e) => {
                    tracing::warn!(error = %e, "Web search unavailable");
                    None
                }
            }
        } else {
            None
        };
        tracing::info!(
            model = %config.provider.model,
            search = search.is_some(),
            "Network capabilities ready"
        );
        Ok(Self {
            completion: Arc::new(completion),
            search,
            transcriber: Arc::new(transcriber),
        })
    }
}

fn open_store(config: &AiraConfig) -> Result<Arc<SqliteFamilyStore>, Box<dyn std::error::Error>> {
    let data_dir = config.general.resolved_data_dir();
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        tracing::error!(path = %data_dir.display(), error = %e, "Failed to create data directory");
        return Err(e.into());
    }
    let db_path = data_dir.join("aira.db");
    let db = Database::new(&db_path)?;
    tracing::info!(path = %db_path.display(), "SQLite database opened");
    Ok(Arc::new(SqliteFamilyStore::new(Arc::new(db))))
}

/// Session for `member`, which must exist in the store.
fn session_for(
    store: &dyn FamilyStore,
    member: Option<String>,
) -> Result<SessionContext, Box<dyn std::error::Error>> {
    match member {
        Some(id) => match store.get_member(&id)? {
            Some(m) => {
                tracing::info!(member_id = %m.id, name = %m.name, "Acting member selected");
                Ok(SessionContext::for_member(m.id))
            }
            None => Err(AiraError::NotFound(format!("family member {}", id)).into()),
        },
        None => Ok(SessionContext::shared()),
    }
}

fn print_members(store: &dyn FamilyStore) -> Result<(), AiraError> {
    let members = store.list_members()?;
    if members.is_empty() {
        println!("No family members yet.");
    }
    for m in members {
        let prefs = serde_json::to_string(&m.preferences)?;
        println!("{:>4}  {} ({})  {}", m.id, m.name, m.age, prefs);
    }
    Ok(())
}

fn print_events(store: &dyn FamilyStore) -> Result<(), AiraError> {
    let mut events = store.list_events()?;
    if events.is_empty() {
        println!("No events yet.");
    }
    events.sort_by(|a, b| (&a.date, &a.time).cmp(&(&b.date, &b.time)));
    for e in events {
        let who = if e.participants.is_empty() {
            String::new()
        } else {
            format!("  [{}]", e.participants.join(", "))
        };
        println!("{:>4}  {} {}  {}{}", e.id, e.date, e.time, e.title, who);
    }
    Ok(())
}

fn print_notes(store: &dyn FamilyStore) -> Result<(), AiraError> {
    let notes = store.list_notes()?;
    if notes.is_empty() {
        println!("No notes yet.");
    }
    for n in notes {
        let tags = if n.tags.is_empty() {
            String::new()
        } else {
            format!("  #{}", n.tags.join(" #"))
        };
        println!("{:>4}  {}: {}{}", n.id, n.title, n.content, tags);
    }
    Ok(())
}

fn print_history(store: &dyn FamilyStore, member: &str, limit: usize) -> Result<(), AiraError> {
    let snapshots = store.chat_history(member, limit)?;
    if snapshots.is_empty() {
        println!("No saved conversations for member {}.", member);
    }
    for s in snapshots {
        let summary = if s.summary.is_empty() {
            "(no summary)"
        } else {
            s.summary.as_str()
        };
        println!("{}  {} messages  {}", s.timestamp, s.messages.len(), summary);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let mut config = AiraConfig::load_or_default(&config_file);
    if let Some(dir) = args.resolve_data_dir() {
        config.general.data_dir = dir;
    }

    // Tracing. Logs go to stderr so they never interleave with replies.
    let log_level = args.resolve_log_level(&config.general.log_level);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting AIRA v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(path = %config_file.display(), "Configuration resolved");

    let store = open_store(&config)?;

    match args.command {
        Command::Members => return Ok(print_members(store.as_ref())?),
        Command::Events => return Ok(print_events(store.as_ref())?),
        Command::Notes => return Ok(print_notes(store.as_ref())?),
        Command::History { ref member, limit } => {
            return Ok(print_history(store.as_ref(), member, limit)?)
        }
        _ => {}
    }

    let capabilities = if args.offline {
        Capabilities::offline()
    } else {
        Capabilities::online(&config)?
    };

    let mut orchestrator =
        ConversationOrchestrator::new(&config, capabilities.completion.clone(), store.clone());
    if let Some(search) = capabilities.search.clone() {
        orchestrator = orchestrator.with_search(search);
    }
    let hide_directives = config.assistant.strip_directives;

    match args.command {
        Command::Chat { member } => {
            let session = session_for(store.as_ref(), member)?;
            session::run_chat(&orchestrator, session, hide_directives).await?;
        }
        Command::Transcribe { file, member } => {
            let mut session = session_for(store.as_ref(), member)?;
            let audio = tokio::fs::read(&file).await?;
            let voice = VoiceInput::new(capabilities.transcriber.clone(), config.retry.clone());
            let text = voice.transcribe(&audio).await?;
            println!("You said: {}", text);
            session::run_turn(
                &orchestrator,
                &mut session,
                Utterance::user_text(text),
                hide_directives,
            )
            .await;
        }
        Command::Suggest { member, count } => {
            let suggestions = orchestrator
                .suggested_questions(member.as_deref(), count)
                .await;
            for s in suggestions {
                println!("• {}", s);
            }
        }
        Command::Members | Command::Events | Command::Notes | Command::History { .. } => {}
    }

    Ok(())
}
