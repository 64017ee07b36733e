//! Database schema migrations.
//!
//! Version 1 creates the family_members, events, notes and chat_history
//! tables. List-valued columns (preferences, participants, tags, messages)
//! hold JSON text.

use rusqlite::Connection;
use tracing::info;

use aira_core::error::AiraError;

/// Run all pending database migrations.
pub fn run_migrations(conn: &Connection) -> Result<(), AiraError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| AiraError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| AiraError::Storage(format!("Failed to query migration version: {}", e)))?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: family_schema");
    }

    Ok(())
}

fn apply_v1(conn: &Connection) -> Result<(), AiraError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS family_members (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            name        TEXT NOT NULL,
            age         TEXT NOT NULL DEFAULT '',
            preferences TEXT NOT NULL DEFAULT '{}',
            added_on    TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS events (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            title        TEXT NOT NULL,
            date         TEXT NOT NULL DEFAULT '',
            time         TEXT NOT NULL DEFAULT '',
            description  TEXT NOT NULL DEFAULT '',
            participants TEXT NOT NULL DEFAULT '[]',
            created_by   TEXT NOT NULL DEFAULT '',
            created_on   TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_events_date
            ON events (date, time);

        CREATE INDEX IF NOT EXISTS idx_events_created_by
            ON events (created_by);

        CREATE TABLE IF NOT EXISTS notes (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            title       TEXT NOT NULL,
            content     TEXT NOT NULL DEFAULT '',
            tags        TEXT NOT NULL DEFAULT '[]',
            created_by  TEXT NOT NULL DEFAULT '',
            created_on  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS chat_history (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            member_id   TEXT NOT NULL,
            timestamp   TEXT NOT NULL,
            messages    TEXT NOT NULL DEFAULT '[]',
            summary     TEXT NOT NULL DEFAULT ''
        );

        CREATE INDEX IF NOT EXISTS idx_chat_history_member
            ON chat_history (member_id, id DESC);

        INSERT INTO schema_migrations (version, name) VALUES (1, 'family_schema');
        ",
    )
    .map_err(|e| AiraError::Storage(format!("Migration v1 failed: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_test_conn() -> Connection {
        Connection::open_in_memory().unwrap()
    }

    fn table_exists(conn: &Connection, name: &str) -> bool {
        conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [name],
            |row| row.get::<_, i64>(0),
        )
        .map(|n| n == 1)
        .unwrap_or(false)
    }

    #[test]
    fn test_migrations_run_once() {
        let conn = open_test_conn();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_all_tables_exist() {
        let conn = open_test_conn();
        run_migrations(&conn).unwrap();
        for table in ["family_members", "events", "notes", "chat_history"] {
            assert!(table_exists(&conn, table), "missing table {}", table);
        }
    }

    #[test]
    fn test_json_columns_default() {
        let conn = open_test_conn();
        run_migrations(&conn).unwrap();
        conn.execute(
            "INSERT INTO events (title, created_on) VALUES ('Picnic', '2024-05-01 10:00:00')",
            [],
        )
        .unwrap();
        let participants: String = conn
            .query_row("SELECT participants FROM events", [], |row| row.get(0))
            .unwrap();
        assert_eq!(participants, "[]");
    }
}
