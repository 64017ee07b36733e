use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{AiraError, Result};

/// Top-level configuration for the AIRA assistant.
///
/// Loaded from `~/.aira/config.toml` by default. Secrets never live here;
/// provider sections only name the environment variable holding the key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AiraConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub assistant: AssistantConfig,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub tavily: TavilyConfig,
}

impl AiraConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: AiraConfig = toml::from_str(&content)?;
        config.validate()?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Reject values that cannot be honoured at runtime.
    pub fn validate(&self) -> Result<()> {
        if self.history.retention == 0 {
            return Err(AiraError::Config(
                "history.retention must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| AiraError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory holding the SQLite database.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.aira/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl GeneralConfig {
    /// The data directory with a leading `~` expanded against `$HOME`.
    pub fn resolved_data_dir(&self) -> PathBuf {
        expand_home(&self.data_dir)
    }
}

/// Assistant persona and reply generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    pub name: String,
    /// Language the assistant answers in.
    pub reply_language: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Remove `##KIND:...##` directives from the text shown to the user.
    pub strip_directives: bool,
    /// Time suggested to the model when an event request names none.
    pub default_event_time: String,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            name: "AIRA".to_string(),
            reply_language: "Vietnamese".to_string(),
            temperature: 0.7,
            max_tokens: 2048,
            strip_directives: true,
            default_event_time: "19:00".to_string(),
        }
    }
}

/// Context window limits, in approximate token units.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    pub max_tokens: usize,
    /// Held back for the trailing user utterance.
    pub reserve_tokens: usize,
    /// Above this estimate the latest user utterance is truncated.
    pub latest_message_max_tokens: usize,
    /// Character ceiling applied to each text part when truncating.
    pub latest_message_max_chars: usize,
    pub chars_per_token: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_tokens: 8000,
            reserve_tokens: 500,
            latest_message_max_tokens: 2000,
            latest_message_max_chars: 8000,
            chars_per_token: 4,
        }
    }
}

/// Bounded retry policy shared by every external capability call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryConfig {
    /// Delay before the attempt following `attempt` (0-indexed):
    /// `base * 2^attempt`, capped at `max_delay_ms`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let millis = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(millis)
    }
}

/// Real-time web search augmentation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub enabled: bool,
    /// Search depth passed to the search capability: "basic" or "advanced".
    pub depth: String,
    pub max_results: usize,
    /// How many result URLs get their full content extracted.
    pub extract_limit: usize,
    /// Character ceiling per extracted document.
    pub max_content_chars: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            depth: "advanced".to_string(),
            max_results: 3,
            extract_limit: 3,
            max_content_chars: 8000,
        }
    }
}

/// Chat history persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Snapshots kept per member; older ones are evicted. At least 1, since
    /// the snapshot just saved is always kept.
    pub retention: usize,
    /// Recent summaries fed to the question suggester.
    pub suggestion_topics: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            retention: 10,
            suggestion_topics: 3,
        }
    }
}

/// OpenAI-compatible completion and transcription endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub api_base: String,
    pub model: String,
    pub transcription_model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            transcription_model: "whisper-1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 60,
        }
    }
}

/// Tavily-compatible search endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TavilyConfig {
    pub api_base: String,
    pub api_key_env: String,
}

impl Default for TavilyConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.tavily.com".to_string(),
            api_key_env: "TAVILY_API_KEY".to_string(),
        }
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AiraConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.assistant.name, "AIRA");
        assert!(config.assistant.strip_directives);
        assert_eq!(config.context.max_tokens, 8000);
        assert_eq!(config.context.reserve_tokens, 500);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.search.max_results, 3);
        assert_eq!(config.history.retention, 10);
        assert_eq!(config.provider.model, "gpt-4o-mini");
    }

    #[test]
    fn test_partial_toml_uses_section_defaults() {
        let toml_str = r#"
            [assistant]
            temperature = 0.2

            [history]
            retention = 4
        "#;
        let config: AiraConfig = toml::from_str(toml_str).unwrap();
        assert!((config.assistant.temperature - 0.2).abs() < f32::EPSILON);
        assert_eq!(config.assistant.max_tokens, 2048);
        assert_eq!(config.history.retention, 4);
        assert_eq!(config.history.suggestion_topics, 3);
        assert_eq!(config.context.chars_per_token, 4);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = AiraConfig::default();
        config.search.enabled = false;
        config.save(&path).unwrap();

        let loaded = AiraConfig::load(&path).unwrap();
        assert!(!loaded.search.enabled);
        assert_eq!(loaded.provider.api_base, config.provider.api_base);
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = AiraConfig::load_or_default(&dir.path().join("absent.toml"));
        assert_eq!(config.retry.base_delay_ms, 1000);
    }

    #[test]
    fn test_load_invalid_toml_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "retry = [[[").unwrap();
        assert!(matches!(AiraConfig::load(&path), Err(AiraError::Config(_))));
    }

    #[test]
    fn test_zero_retention_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[history]\nretention = 0\n").unwrap();
        match AiraConfig::load(&path) {
            Err(AiraError::Config(msg)) => assert!(msg.contains("history.retention")),
            other => panic!("expected config error, got {:?}", other.map(|_| ())),
        }

        std::fs::write(&path, "[history]\nretention = 1\n").unwrap();
        assert_eq!(AiraConfig::load(&path).unwrap().history.retention, 1);
    }

    #[test]
    fn test_delay_for_attempt_doubles() {
        let retry = RetryConfig::default();
        assert_eq!(retry.delay_for_attempt(0), Duration::from_millis(1000));
        assert_eq!(retry.delay_for_attempt(1), Duration::from_millis(2000));
        assert_eq!(retry.delay_for_attempt(2), Duration::from_millis(4000));
    }

    #[test]
    fn test_delay_for_attempt_is_capped() {
        let retry = RetryConfig {
            max_attempts: 10,
            base_delay_ms: 1000,
            max_delay_ms: 5000,
        };
        assert_eq!(retry.delay_for_attempt(3), Duration::from_millis(5000));
        assert_eq!(retry.delay_for_attempt(200), Duration::from_millis(5000));
    }

    #[test]
    fn test_expand_home_leaves_plain_paths() {
        assert_eq!(expand_home("/var/lib/aira"), PathBuf::from("/var/lib/aira"));
    }
}
