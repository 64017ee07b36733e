//! AIRA core crate - configuration, errors, domain types and the capability
//! traits shared by storage, providers and the conversation pipeline.

pub mod capability;
pub mod config;
pub mod error;
pub mod store;
pub mod types;

pub use capability::{
    CompletionRequest, ResponseFormat, SearchHit, TextCompletion, TextStream, Transcriber,
    WebSearch,
};
pub use config::AiraConfig;
pub use error::{AiraError, Result};
pub use store::FamilyStore;
pub use types::*;
