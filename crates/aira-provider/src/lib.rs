//! HTTP clients for the external services AIRA depends on.
//!
//! Each client implements one of the capability traits from
//! `aira_core::capability`, so the conversation pipeline never sees
//! transport details.

pub mod http;
pub mod openai;
pub mod tavily;
pub mod transcription;

pub use http::{api_key_from_env, ProviderErrorKind};
pub use openai::OpenAiCompletion;
pub use tavily::TavilySearch;
pub use transcription::OpenAiTranscriber;
