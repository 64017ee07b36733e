//! Storage capability consumed by the conversation pipeline.

use serde_json::Value;

use crate::error::Result;
use crate::types::{
    ChatSnapshot, Event, EventPatch, FamilyMember, MemberPatch, NewEvent, NewMember, NewNote,
    Note, Utterance,
};

/// CRUD over the family store, keyed by opaque string ids.
///
/// Implementations must serialize writes per member chat history so that
/// concurrent snapshots cannot interleave their insert and retention trim.
pub trait FamilyStore: Send + Sync {
    fn list_members(&self) -> Result<Vec<FamilyMember>>;
    fn get_member(&self, id: &str) -> Result<Option<FamilyMember>>;
    fn add_member(&self, member: &NewMember) -> Result<String>;
    /// Returns `false` when no member has this id.
    fn update_member(&self, id: &str, patch: &MemberPatch) -> Result<bool>;
    fn delete_member(&self, id: &str) -> Result<bool>;
    /// Atomically merge one key into the member's preference map.
    fn merge_preference(&self, member_id: &str, key: &str, value: &Value) -> Result<bool>;

    fn list_events(&self) -> Result<Vec<Event>>;
    fn get_event(&self, id: &str) -> Result<Option<Event>>;
    fn add_event(&self, event: &NewEvent) -> Result<String>;
    fn update_event(&self, id: &str, patch: &EventPatch) -> Result<bool>;
    fn delete_event(&self, id: &str) -> Result<bool>;
    /// Events created by the member or listing the member's name as participant.
    fn events_for_member(&self, member_id: &str) -> Result<Vec<Event>>;

    fn list_notes(&self) -> Result<Vec<Note>>;
    fn add_note(&self, note: &NewNote) -> Result<String>;
    fn delete_note(&self, id: &str) -> Result<bool>;

    /// Insert a snapshot and evict all but the `retention` most recent for
    /// this member, in one transaction. A `retention` of 0 is treated as 1.
    fn save_chat_snapshot(
        &self,
        member_id: &str,
        messages: &[Utterance],
        summary: &str,
        retention: usize,
    ) -> Result<String>;
    /// Most recent first.
    fn chat_history(&self, member_id: &str, limit: usize) -> Result<Vec<ChatSnapshot>>;
}
