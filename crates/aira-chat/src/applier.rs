//! Applies extracted actions against the family store.
//!
//! Each action is applied independently: a failed or rejected action is
//! logged and reported in its outcome, and the remaining actions still run.

use std::sync::Arc;

use chrono::NaiveDate;
use serde_json::Value;
use tracing::{info, warn};

use aira_core::error::Result;
use aira_core::store::FamilyStore;
use aira_core::types::{
    field_str, EventPatch, NewEvent, NewMember, NewNote, Payload, PreferenceUpdate,
};

use crate::dates::resolve_relative_date_on;
use crate::types::{ActionKind, ActionOutcome, ActionRequest, ActionSet, ActionStatus};

pub struct ActionApplier {
    store: Arc<dyn FamilyStore>,
    default_event_time: String,
}

impl ActionApplier {
    pub fn new(store: Arc<dyn FamilyStore>, default_event_time: impl Into<String>) -> Self {
        Self {
            store,
            default_event_time: default_event_time.into(),
        }
    }

    /// Apply every action in `actions`, in kind order.
    pub fn apply(
        &self,
        actions: ActionSet,
        acting_member_id: Option<&str>,
        today: NaiveDate,
    ) -> Vec<ActionOutcome> {
        actions
            .into_iter()
            .map(|mut request| {
                prepare(&mut request, acting_member_id, today, &self.default_event_time);
                self.apply_one(&request)
            })
            .collect()
    }

    fn apply_one(&self, request: &ActionRequest) -> ActionOutcome {
        let kind = request.kind();
        let label = label_for(request);
        let status = match self.execute(request) {
            Ok(status) => status,
            Err(e) => ActionStatus::Failed {
                error: e.to_string(),
            },
        };
        match &status {
            ActionStatus::Applied { id } => info!(kind = %kind, id = %id, label = %label, "Action applied"),
            ActionStatus::NotFound { id } => warn!(kind = %kind, id = %id, "Action target not found"),
            ActionStatus::Failed { error } => warn!(kind = %kind, error = %error, "Action failed"),
        }
        ActionOutcome {
            kind,
            label,
            status,
        }
    }

    fn execute(&self, request: &ActionRequest) -> Result<ActionStatus> {
        let store = self.store.as_ref();
        match request {
            ActionRequest::AddMember(payload) => {
                let id = store.add_member(&NewMember::from_payload(payload)?)?;
                Ok(ActionStatus::Applied { id })
            }
            ActionRequest::UpdatePreference(payload) => {
                let update = PreferenceUpdate::from_payload(payload)?;
                let found = store.merge_preference(&update.member_id, &update.key, &update.value)?;
                Ok(found_status(found, update.member_id))
            }
            ActionRequest::AddEvent(payload) => {
                let id = store.add_event(&NewEvent::from_payload(payload)?)?;
                Ok(ActionStatus::Applied { id })
            }
            ActionRequest::UpdateEvent(payload) => {
                let (id, patch) = EventPatch::from_payload(payload)?;
                let found = store.update_event(&id, &patch)?;
                Ok(found_status(found, id))
            }
            ActionRequest::DeleteEvent(id) => {
                let found = store.delete_event(id)?;
                Ok(found_status(found, id.clone()))
            }
            ActionRequest::AddNote(payload) => {
                let id = store.add_note(&NewNote::from_payload(payload)?)?;
                Ok(ActionStatus::Applied { id })
            }
        }
    }
}

fn found_status(found: bool, id: String) -> ActionStatus {
    if found {
        ActionStatus::Applied { id }
    } else {
        ActionStatus::NotFound { id }
    }
}

/// Normalize a request before it reaches the store.
///
/// A `date` not starting with a digit is resolved as a relative term; an
/// unresolvable term is left as supplied. New events without a time get
/// `default_event_time`. Creation kinds are stamped with the acting member.
pub fn prepare(
    request: &mut ActionRequest,
    acting_member_id: Option<&str>,
    today: NaiveDate,
    default_event_time: &str,
) {
    let kind = request.kind();
    let Some(payload) = request.payload_mut() else {
        return;
    };

    if matches!(kind, ActionKind::AddEvent | ActionKind::UpdateEvent) {
        resolve_date_field(payload, today);
    }
    if kind == ActionKind::AddEvent
        && field_str(payload, "time").map_or(true, |t| t.trim().is_empty())
        && !default_event_time.is_empty()
    {
        payload.insert("time".to_string(), Value::from(default_event_time));
    }
    if kind.is_creation() {
        if let Some(member_id) = acting_member_id {
            payload.insert("created_by".to_string(), Value::from(member_id));
        }
    }
}

fn resolve_date_field(payload: &mut Payload, today: NaiveDate) {
    let Some(Value::String(date)) = payload.get("date") else {
        return;
    };
    let term = date.trim();
    if term.is_empty() || term.starts_with(|c: char| c.is_ascii_digit()) {
        return;
    }
    match resolve_relative_date_on(term, today) {
        Some(resolved) => {
            let resolved = resolved.format("%Y-%m-%d").to_string();
            payload.insert("date".to_string(), Value::String(resolved));
        }
        None => warn!(date = term, "Unrecognized relative date, keeping as supplied"),
    }
}

fn label_for(request: &ActionRequest) -> String {
    match request {
        ActionRequest::AddMember(p) => field_str(p, "name").unwrap_or_default(),
        ActionRequest::UpdatePreference(p) => field_str(p, "key").unwrap_or_default(),
        ActionRequest::AddEvent(p) | ActionRequest::UpdateEvent(p) | ActionRequest::AddNote(p) => {
            field_str(p, "title")
                .or_else(|| field_str(p, "id"))
                .unwrap_or_default()
        }
        ActionRequest::DeleteEvent(id) => id.clone(),
    }
}

// =============================================================================
// Tests
// =============================================================================
