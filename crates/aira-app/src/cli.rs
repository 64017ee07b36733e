//! CLI argument definitions for the AIRA binary.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// AIRA: a family assistant that remembers members, events and notes.
#[derive(Parser, Debug)]
#[command(name = "aira", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Data directory for the SQLite database.
    #[arg(short = 'd', long = "data-dir", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    /// Use scripted local capabilities instead of the network services.
    #[arg(long = "offline", global = true)]
    pub offline: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Start an interactive chat session.
    Chat {
        /// Speak as this family member; shared mode when omitted.
        #[arg(short = 'm', long = "member")]
        member: Option<String>,
    },
    /// Transcribe an audio file and submit it as a chat turn.
    Transcribe {
        file: PathBuf,
        #[arg(short = 'm', long = "member")]
        member: Option<String>,
    },
    /// List family members.
    Members,
    /// List events.
    Events,
    /// List notes.
    Notes,
    /// List stored chat summaries for a member.
    History {
        #[arg(short = 'm', long = "member")]
        member: String,
        #[arg(short = 'n', long = "limit", default_value_t = 10)]
        limit: usize,
    },
    /// Print suggested questions.
    Suggest {
        #[arg(short = 'm', long = "member")]
        member: Option<String>,
        #[arg(short = 'n', long = "count", default_value_t = 4)]
        count: usize,
    },
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > AIRA_CONFIG env var > ~/.aira/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("AIRA_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Data directory override, if any.
    pub fn resolve_data_dir(&self) -> Option<String> {
        self.data_dir
            .as_ref()
            .map(|p| p.to_string_lossy().to_string())
    }

    /// Resolve the log level.
    ///
    /// Priority: --log-level flag > AIRA_LOG_LEVEL env var > config file value.
    pub fn resolve_log_level(&self, config_level: &str) -> String {
        if let Some(ref level) = self.log_level {
            return level.clone();
        }
        if let Ok(level) = std::env::var("AIRA_LOG_LEVEL") {
            if !level.trim().is_empty() {
                return level;
            }
        }
        if config_level.is_empty() {
            "info".to_string()
        } else {
            config_level.to_string()
        }
    }
}

fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".aira").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".aira").join("config.toml");
    }
    PathBuf::from("config.toml")
}
