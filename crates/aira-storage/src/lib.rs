//! AIRA storage crate - SQLite persistence for the family store.
//!
//! Provides a WAL-mode SQLite database with versioned migrations and the
//! [`SqliteFamilyStore`] implementation of the core `FamilyStore` trait,
//! including bounded per-member chat history.

pub mod db;
pub mod family;
pub mod migrations;

pub use db::Database;
pub use family::SqliteFamilyStore;
