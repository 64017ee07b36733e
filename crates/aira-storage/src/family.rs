//! SQLite implementation of the family store.

use std::sync::Arc;

use chrono::Local;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::{Map, Value};
use tracing::{debug, info};

use aira_core::error::AiraError;
use aira_core::store::FamilyStore;
use aira_core::types::{
    ChatSnapshot, Event, EventPatch, FamilyMember, MemberPatch, NewEvent, NewMember, NewNote,
    Note, Utterance,
};

type Result<T> = std::result::Result<T, AiraError>;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Family store backed by [`Database`](crate::Database).
pub struct SqliteFamilyStore {
    db: Arc<crate::Database>,
}

impl SqliteFamilyStore {
    pub fn new(db: Arc<crate::Database>) -> Self {
        Self { db }
    }
}

fn now_stamp() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

fn storage_err(context: &str) -> impl Fn(rusqlite::Error) -> AiraError + '_ {
    move |e| AiraError::Storage(format!("{}: {}", context, e))
}

/// Ids are INTEGER primary keys. Anything that is not an integer cannot
/// match a row.
fn parse_id(id: &str) -> Option<i64> {
    id.trim().parse().ok()
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

fn from_json<T: serde::de::DeserializeOwned + Default>(raw: &str) -> T {
    serde_json::from_str(raw).unwrap_or_default()
}

// =============================================================================
// Row mapping
// =============================================================================

const MEMBER_COLUMNS: &str = "id, name, age, preferences, added_on";
const EVENT_COLUMNS: &str =
    "id, title, date, time, description, participants, created_by, created_on";
const NOTE_COLUMNS: &str = "id, title, content, tags, created_by, created_on";

fn row_to_member(row: &Row<'_>) -> rusqlite::Result<FamilyMember> {
    let preferences: String = row.get(3)?;
    Ok(FamilyMember {
        id: row.get::<_, i64>(0)?.to_string(),
        name: row.get(1)?,
        age: row.get(2)?,
        preferences: from_json::<Map<String, Value>>(&preferences),
        added_on: row.get(4)?,
    })
}

fn row_to_event(row: &Row<'_>) -> rusqlite::Result<Event> {
    let participants: String = row.get(5)?;
    Ok(Event {
        id: row.get::<_, i64>(0)?.to_string(),
        title: row.get(1)?,
        date: row.get(2)?,
        time: row.get(3)?,
        description: row.get(4)?,
        participants: from_json(&participants),
        created_by: row.get(6)?,
        created_on: row.get(7)?,
    })
}

fn row_to_note(row: &Row<'_>) -> rusqlite::Result<Note> {
    let tags: String = row.get(3)?;
    Ok(Note {
        id: row.get::<_, i64>(0)?.to_string(),
        title: row.get(1)?,
        content: row.get(2)?,
        tags: from_json(&tags),
        created_by: row.get(4)?,
        created_on: row.get(5)?,
    })
}

fn row_to_snapshot(row: &Row<'_>) -> rusqlite::Result<ChatSnapshot> {
    let messages: String = row.get(3)?;
    Ok(ChatSnapshot {
        id: row.get::<_, i64>(0)?.to_string(),
        member_id: row.get(1)?,
        timestamp: row.get(2)?,
        messages: from_json::<Vec<Utterance>>(&messages),
        summary: row.get(4)?,
    })
}

fn query_all<T>(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
    map: fn(&Row<'_>) -> rusqlite::Result<T>,
) -> Result<Vec<T>> {
    let mut stmt = conn.prepare(sql).map_err(storage_err("prepare"))?;
    let rows = stmt.query_map(params, map).map_err(storage_err("query"))?;
    rows.collect::<rusqlite::Result<Vec<T>>>()
        .map_err(storage_err("read row"))
}

fn load_member(conn: &Connection, id: i64) -> Result<Option<FamilyMember>> {
    conn.query_row(
        &format!("SELECT {} FROM family_members WHERE id = ?1", MEMBER_COLUMNS),
        params![id],
        row_to_member,
    )
    .optional()
    .map_err(storage_err("get member"))
}

// =============================================================================
// FamilyStore
// =============================================================================

impl FamilyStore for SqliteFamilyStore {
    fn list_members(&self) -> Result<Vec<FamilyMember>> {
        self.db.with_conn(|conn| {
            query_all(
                conn,
                &format!("SELECT {} FROM family_members ORDER BY id", MEMBER_COLUMNS),
                [],
                row_to_member,
            )
        })
    }

    fn get_member(&self, id: &str) -> Result<Option<FamilyMember>> {
        let Some(id) = parse_id(id) else {
            return Ok(None);
        };
        self.db.with_conn(|conn| load_member(conn, id))
    }

    fn add_member(&self, member: &NewMember) -> Result<String> {
        let preferences = to_json(&member.preferences)?;
        let id = self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO family_members (name, age, preferences, added_on)
                 VALUES (?1, ?2, ?3, ?4)",
                params![member.name, member.age, preferences, now_stamp()],
            )
            .map_err(storage_err("add member"))?;
            Ok(conn.last_insert_rowid())
        })?;
        info!(member_id = id, name = %member.name, "Family member added");
        Ok(id.to_string())
    }

    fn update_member(&self, id: &str, patch: &MemberPatch) -> Result<bool> {
        let Some(id) = parse_id(id) else {
            return Ok(false);
        };
        self.db.with_transaction(|tx| {
            let Some(mut member) = load_member(tx, id)? else {
                return Ok(false);
            };
            if let Some(name) = &patch.name {
                member.name = name.clone();
            }
            if let Some(age) = &patch.age {
                member.age = age.clone();
            }
            if let Some(preferences) = &patch.preferences {
                member.preferences = preferences.clone();
            }
            tx.execute(
                "UPDATE family_members SET name = ?1, age = ?2, preferences = ?3 WHERE id = ?4",
                params![member.name, member.age, to_json(&member.preferences)?, id],
            )
            .map_err(storage_err("update member"))?;
            Ok(true)
        })
    }

    fn delete_member(&self, id: &str) -> Result<bool> {
        let Some(id) = parse_id(id) else {
            return Ok(false);
        };
        self.db.with_conn(|conn| {
            let n = conn
                .execute("DELETE FROM family_members WHERE id = ?1", params![id])
                .map_err(storage_err("delete member"))?;
            Ok(n > 0)
        })
    }

    fn merge_preference(&self, member_id: &str, key: &str, value: &Value) -> Result<bool> {
        let Some(id) = parse_id(member_id) else {
            return Ok(false);
        };
        self.db.with_transaction(|tx| {
            let Some(mut member) = load_member(tx, id)? else {
                return Ok(false);
            };
            member.preferences.insert(key.to_string(), value.clone());
            tx.execute(
                "UPDATE family_members SET preferences = ?1 WHERE id = ?2",
                params![to_json(&member.preferences)?, id],
            )
            .map_err(storage_err("merge preference"))?;
            debug!(member_id = id, key, "Preference merged");
            Ok(true)
        })
    }

    fn list_events(&self) -> Result<Vec<Event>> {
        self.db.with_conn(|conn| {
            query_all(
                conn,
                &format!("SELECT {} FROM events ORDER BY date, time, id", EVENT_COLUMNS),
                [],
                row_to_event,
            )
        })
    }

    fn get_event(&self, id: &str) -> Result<Option<Event>> {
        let Some(id) = parse_id(id) else {
            return Ok(None);
        };
        self.db.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {} FROM events WHERE id = ?1", EVENT_COLUMNS),
                params![id],
                row_to_event,
            )
            .optional()
            .map_err(storage_err("get event"))
        })
    }

    fn add_event(&self, event: &NewEvent) -> Result<String> {
        let participants = to_json(&event.participants)?;
        let id = self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO events (title, date, time, description, participants, created_by, created_on)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    event.title,
                    event.date,
                    event.time,
                    event.description,
                    participants,
                    event.created_by,
                    now_stamp(),
                ],
            )
            .map_err(storage_err("add event"))?;
            Ok(conn.last_insert_rowid())
        })?;
        info!(event_id = id, title = %event.title, date = %event.date, "Event added");
        Ok(id.to_string())
    }

    fn update_event(&self, id: &str, patch: &EventPatch) -> Result<bool> {
        let Some(id) = parse_id(id) else {
            return Ok(false);
        };
        let participants = patch.participants.as_ref().map(to_json).transpose()?;
        self.db.with_conn(|conn| {
            let n = conn
                .execute(
                    "UPDATE events SET
                        title        = COALESCE(?1, title),
                        date         = COALESCE(?2, date),
                        time         = COALESCE(?3, time),
                        description  = COALESCE(?4, description),
                        participants = COALESCE(?5, participants)
                     WHERE id = ?6",
                    params![
                        patch.title,
                        patch.date,
                        patch.time,
                        patch.description,
                        participants,
                        id,
                    ],
                )
                .map_err(storage_err("update event"))?;
            Ok(n > 0)
        })
    }

    fn delete_event(&self, id: &str) -> Result<bool> {
        let Some(id) = parse_id(id) else {
            return Ok(false);
        };
        self.db.with_conn(|conn| {
            let n = conn
                .execute("DELETE FROM events WHERE id = ?1", params![id])
                .map_err(storage_err("delete event"))?;
            Ok(n > 0)
        })
    }

    fn events_for_member(&self, member_id: &str) -> Result<Vec<Event>> {
        let name = self.get_member(member_id)?.map(|m| m.name);
        let events = self.list_events()?;
        Ok(events
            .into_iter()
            .filter(|e| {
                e.created_by == member_id
                    || name
                        .as_ref()
                        .is_some_and(|n| e.participants.iter().any(|p| p == n))
            })
            .collect())
    }

    fn list_notes(&self) -> Result<Vec<Note>> {
        self.db.with_conn(|conn| {
            query_all(
                conn,
                &format!("SELECT {} FROM notes ORDER BY id", NOTE_COLUMNS),
                [],
                row_to_note,
            )
        })
    }

    fn add_note(&self, note: &NewNote) -> Result<String> {
        let tags = to_json(&note.tags)?;
        let id = self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO notes (title, content, tags, created_by, created_on)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![note.title, note.content, tags, note.created_by, now_stamp()],
            )
            .map_err(storage_err("add note"))?;
            Ok(conn.last_insert_rowid())
        })?;
        info!(note_id = id, title = %note.title, "Note added");
        Ok(id.to_string())
    }

    fn delete_note(&self, id: &str) -> Result<bool> {
        let Some(id) = parse_id(id) else {
            return Ok(false);
        };
        self.db.with_conn(|conn| {
            let n = conn
                .execute("DELETE FROM notes WHERE id = ?1", params![id])
                .map_err(storage_err("delete note"))?;
            Ok(n > 0)
        })
    }

    fn save_chat_snapshot(
        &self,
        member_id: &str,
        messages: &[Utterance],
        summary: &str,
        retention: usize,
    ) -> Result<String> {
        let messages = to_json(&messages)?;
        let retention = retention.max(1) as i64;
        let (id, evicted) = self.db.with_transaction(|tx| {
            tx.execute(
                "INSERT INTO chat_history (member_id, timestamp, messages, summary)
                 VALUES (?1, ?2, ?3, ?4)",
                params![member_id, now_stamp(), messages, summary],
            )
            .map_err(storage_err("save chat snapshot"))?;
            let id = tx.last_insert_rowid();
            let evicted = tx
                .execute(
                    "DELETE FROM chat_history
                     WHERE member_id = ?1 AND id NOT IN (
                         SELECT id FROM chat_history
                         WHERE member_id = ?1
                         ORDER BY id DESC
                         LIMIT ?2
                     )",
                    params![member_id, retention],
                )
                .map_err(storage_err("trim chat history"))?;
            Ok((id, evicted))
        })?;
        debug!(member_id, snapshot_id = id, evicted, "Chat snapshot saved");
        Ok(id.to_string())
    }

    fn chat_history(&self, member_id: &str, limit: usize) -> Result<Vec<ChatSnapshot>> {
        self.db.with_conn(|conn| {
            query_all(
                conn,
                "SELECT id, member_id, timestamp, messages, summary
                 FROM chat_history
                 WHERE member_id = ?1
                 ORDER BY id DESC
                 LIMIT ?2",
                params![member_id, limit as i64],
                row_to_snapshot,
            )
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
