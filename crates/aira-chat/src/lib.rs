//! Conversation pipeline for AIRA.
//!
//! Parses inline directives out of assistant replies, resolves relative
//! dates, bounds the context window, decides when to search the web, and
//! coordinates a full user turn from utterance to persisted history.

pub mod applier;
pub mod context;
pub mod dates;
pub mod error;
pub mod mock;
pub mod orchestrator;
pub mod parser;
pub mod prompt;
pub mod research;
pub mod retry;
pub mod search_intent;
pub mod suggest;
pub mod summary;
pub mod types;
pub mod voice;

pub use applier::ActionApplier;
pub use context::{ContextLimiter, ContextWindow};
pub use dates::{resolve_relative_date, resolve_relative_date_on, upcoming_events};
pub use error::ChatError;
pub use mock::{MockCompletion, MockSearch, MockTranscription};
pub use orchestrator::ConversationOrchestrator;
pub use parser::{extract_actions, strip_directives};
pub use prompt::{StoreSnapshot, SystemPromptBuilder};
pub use research::WebResearcher;
pub use search_intent::{SearchIntent, SearchIntentClassifier};
pub use suggest::SuggestionService;
pub use summary::ChatSummarizer;
pub use types::{
    ActionKind, ActionOutcome, ActionRequest, ActionSet, ActionStatus, SearchAugmentation,
    SessionContext, TurnEvent, TurnOutcome,
};
pub use voice::VoiceInput;
