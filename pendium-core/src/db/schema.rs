//! Database schema and migrations
//!
//! Uses SQLite with embedded migrations managed via PRAGMA user_version.

use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// SQL migrations, indexed by version number
const MIGRATIONS: &[&str] = &[
    // Version 1: Initial schema
    r#"
    -- ============================================
    -- Event collections (populated by the pipeline)
    -- ============================================

    CREATE TABLE IF NOT EXISTS chat_logs (
        id           TEXT PRIMARY KEY,
        email        TEXT NOT NULL,
        thread_uuid  TEXT NOT NULL,
        role         TEXT NOT NULL,
        created_at   DATETIME,
        -- Turn list with per-turn token counters and source citations
        turns        JSON NOT NULL,
        is_deleted   INTEGER NOT NULL DEFAULT 0
    );

    CREATE INDEX IF NOT EXISTS idx_chat_logs_created ON chat_logs(created_at);
    CREATE INDEX IF NOT EXISTS idx_chat_logs_email ON chat_logs(email);
    CREATE INDEX IF NOT EXISTS idx_chat_logs_thread ON chat_logs(thread_uuid);

    CREATE TABLE IF NOT EXISTS feature_interactions (
        id           INTEGER PRIMARY KEY AUTOINCREMENT,
        thread_uuid  TEXT NOT NULL,
        email        TEXT NOT NULL,
        timestamp    DATETIME,
        -- Free-form payload; discriminant at $.interaction
        interaction  JSON NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_feature_interactions_ts ON feature_interactions(timestamp);
    CREATE INDEX IF NOT EXISTS idx_feature_interactions_thread ON feature_interactions(thread_uuid);

    CREATE TABLE IF NOT EXISTS user_feedbacks (
        id           INTEGER PRIMARY KEY AUTOINCREMENT,
        email        TEXT NOT NULL,
        thread_uuid  TEXT NOT NULL,
        turn_uuid    TEXT NOT NULL,
        is_liked     INTEGER NOT NULL DEFAULT 0,
        flags        JSON NOT NULL,
        other        TEXT NOT NULL DEFAULT '',
        created_at   DATETIME,

        UNIQUE(thread_uuid, turn_uuid)
    );

    -- ============================================
    -- Account and roster collections
    -- ============================================

    CREATE TABLE IF NOT EXISTS users (
        email               TEXT PRIMARY KEY,
        name                TEXT,
        signup_date         DATETIME,
        role                TEXT NOT NULL DEFAULT 'user',
        status              TEXT NOT NULL DEFAULT 'active',
        usage               INTEGER NOT NULL DEFAULT 0,
        follow_up_usage     INTEGER NOT NULL DEFAULT 0,
        feedback_count      INTEGER NOT NULL DEFAULT 0,
        source_click_count  INTEGER NOT NULL DEFAULT 0,
        num_logins          INTEGER NOT NULL DEFAULT 0,
        clicked_sources     JSON NOT NULL,
        saved_sources       JSON NOT NULL,
        stripe_customer_id  TEXT
    );

    CREATE INDEX IF NOT EXISTS idx_users_signup ON users(signup_date);
    CREATE INDEX IF NOT EXISTS idx_users_status ON users(status);

    CREATE TABLE IF NOT EXISTS beta_users (
        email        TEXT PRIMARY KEY,
        name         TEXT,
        cohort       TEXT NOT NULL DEFAULT 'none',
        status       TEXT NOT NULL DEFAULT 'signed_up',
        invite_sent  INTEGER NOT NULL DEFAULT 0,
        usage        INTEGER NOT NULL DEFAULT 0,
        date_added   DATETIME
    );

    CREATE INDEX IF NOT EXISTS idx_beta_users_cohort ON beta_users(cohort);
    "#,
];

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> crate::error::Result<()> {
    let current_version: i32 = conn
        .query_row("PRAGMA user_version", [], |r| r.get(0))
        .unwrap_or(0);

    tracing::info!(
        current_version,
        target_version = SCHEMA_VERSION,
        "Checking database migrations"
    );

    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let version = (i + 1) as i32;
        if version > current_version {
            tracing::info!(version, "Running migration");
            conn.execute_batch(migration)?;
            conn.execute(&format!("PRAGMA user_version = {}", version), [])?;
        }
    }

    if current_version < SCHEMA_VERSION {
        tracing::info!(
            from = current_version,
            to = SCHEMA_VERSION,
            "Migrations complete"
        );
    }

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> crate::error::Result<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_idempotent() {
        let conn = Connection::open_in_memory().unwrap();

        // Run migrations twice - should be idempotent
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let version = get_schema_version(&conn).unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_tables_created() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        let tables = [
            "chat_logs",
            "feature_interactions",
            "user_feedbacks",
            "users",
            "beta_users",
        ];

        for table in tables {
            let exists: i32 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?",
                    [table],
                    |r| r.get(0),
                )
                .unwrap();
            assert_eq!(exists, 1, "Table {} should exist", table);
        }
    }
}
