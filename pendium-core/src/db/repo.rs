//! Database repository layer
//!
//! Provides query and insert operations for all collections. In production
//! the event collections are populated by the external ingestion pipeline;
//! the insert functions here exist for seeding, tooling, and tests.

use crate::error::{Error, Result};
use crate::types::*;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

/// Filter for user-directory queries.
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    /// Case-insensitive substring match on email, name or status
    pub search: Option<String>,
    /// Exact status match
    pub status: Option<String>,
    /// Restrict to these emails (cohort restriction); `None` = unrestricted
    pub emails: Option<Vec<String>>,
}

/// Filter for chat-log listing queries.
#[derive(Debug, Clone, Default)]
pub struct ChatLogFilter {
    /// Case-insensitive substring match on email or turn content
    pub search: Option<String>,
    /// Exact email match
    pub email: Option<String>,
    /// Only logs with `created_at` in `[since, until)`
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

/// Lightweight projection of a user-role event: (email, timestamp).
pub type ActivityEvent = (String, DateTime<Utc>);

/// Aggregate counters over a filtered user set.
#[derive(Debug, Clone, Copy, Default)]
pub struct UserTotals {
    pub usage: i64,
    pub feedback: i64,
}

/// Database handle with connection pooling (single connection for now)
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open(path: &PathBuf) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // WAL mode for concurrent readers
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = -64000;  -- 64MB cache
            ",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run migrations on this database
    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        super::schema::run_migrations(&conn)
    }

    // ============================================
    // Chat log operations
    // ============================================

    /// Insert a chat log event
    pub fn insert_chat_log(&self, log: &ChatLog) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO chat_logs (id, email, thread_uuid, role, created_at, turns, is_deleted)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(id) DO UPDATE SET
                turns = excluded.turns,
                is_deleted = excluded.is_deleted
            "#,
            params![
                log.id,
                log.email,
                log.thread_uuid,
                log.role,
                log.created_at.map(|t| t.to_rfc3339()),
                serde_json::to_string(&log.turns)?,
                log.is_deleted as i32,
            ],
        )?;
        Ok(())
    }

    /// Chat logs with a timestamp inside `[start, end)`.
    ///
    /// Records without a timestamp never qualify for windowed computations
    /// and are excluded here.
    pub fn chat_logs_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ChatLog>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"
            SELECT id, email, thread_uuid, role, created_at, turns, is_deleted
            FROM chat_logs
            WHERE created_at IS NOT NULL AND created_at >= ?1 AND created_at < ?2
            ORDER BY created_at ASC
            "#,
        )?;

        let logs = stmt
            .query_map(params![start.to_rfc3339(), end.to_rfc3339()], |row| {
                Self::row_to_chat_log(row)
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(logs)
    }

    /// Every user-role event as an (email, timestamp) projection.
    ///
    /// Backs retention and last-activity computations that look outside any
    /// single window.
    pub fn user_activity_events(&self) -> Result<Vec<ActivityEvent>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"
            SELECT email, created_at
            FROM chat_logs
            WHERE role = 'user' AND created_at IS NOT NULL
            ORDER BY created_at ASC
            "#,
        )?;

        let events = stmt
            .query_map([], |row| {
                let email: String = row.get(0)?;
                let ts: String = row.get(1)?;
                Ok((email, ts))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(events
            .into_iter()
            .filter_map(|(email, ts)| Some((email, parse_ts(&ts)?)))
            .collect())
    }

    /// Most recent user-role event per email, across all time.
    pub fn last_activity_by_user(&self) -> Result<HashMap<String, DateTime<Utc>>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"
            SELECT email, MAX(created_at)
            FROM chat_logs
            WHERE role = 'user' AND created_at IS NOT NULL
            GROUP BY email
            "#,
        )?;

        let rows = stmt
            .query_map([], |row| {
                let email: String = row.get(0)?;
                let ts: String = row.get(1)?;
                Ok((email, ts))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows
            .into_iter()
            .filter_map(|(email, ts)| Some((email, parse_ts(&ts)?)))
            .collect())
    }

    /// Count chat logs matching a listing filter.
    pub fn count_chat_logs(&self, filter: &ChatLogFilter) -> Result<i64> {
        let (clause, args) = Self::chat_log_where(filter);
        let conn = self.conn.lock().unwrap();
        let sql = format!("SELECT COUNT(*) FROM chat_logs {}", clause);
        let count = conn.query_row(&sql, rusqlite::params_from_iter(args.iter()), |r| r.get(0))?;
        Ok(count)
    }

    /// Paginated chat-log listing, newest first. `page` is 1-based.
    pub fn list_chat_logs(
        &self,
        filter: &ChatLogFilter,
        page: usize,
        per_page: usize,
    ) -> Result<Vec<ChatLog>> {
        let (clause, args) = Self::chat_log_where(filter);
        let offset = page.saturating_sub(1) * per_page;

        let conn = self.conn.lock().unwrap();
        let sql = format!(
            r#"
            SELECT id, email, thread_uuid, role, created_at, turns, is_deleted
            FROM chat_logs {}
            ORDER BY created_at DESC
            LIMIT {} OFFSET {}
            "#,
            clause, per_page, offset
        );
        let mut stmt = conn.prepare(&sql)?;
        let logs = stmt
            .query_map(rusqlite::params_from_iter(args.iter()), |row| {
                Self::row_to_chat_log(row)
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(logs)
    }

    /// (email, timestamp) projection of every chat log matching a filter.
    pub fn chat_log_events(&self, filter: &ChatLogFilter) -> Result<Vec<ActivityEvent>> {
        let (clause, args) = Self::chat_log_where(filter);
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT email, created_at FROM chat_logs {} ORDER BY created_at ASC",
            clause
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(args.iter()), |row| {
                let email: String = row.get(0)?;
                let ts: Option<String> = row.get(1)?;
                Ok((email, ts))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows
            .into_iter()
            .filter_map(|(email, ts)| Some((email, parse_ts(&ts?)?)))
            .collect())
    }

    fn chat_log_where(filter: &ChatLogFilter) -> (String, Vec<String>) {
        let mut clauses = Vec::new();
        let mut args = Vec::new();

        if let Some(search) = &filter.search {
            clauses.push("(LOWER(email) LIKE ? OR LOWER(turns) LIKE ?)".to_string());
            let needle = format!("%{}%", search.to_lowercase());
            args.push(needle.clone());
            args.push(needle);
        }
        if let Some(email) = &filter.email {
            clauses.push("email = ?".to_string());
            args.push(email.clone());
        }
        if let Some(since) = filter.since {
            clauses.push("created_at IS NOT NULL AND created_at >= ?".to_string());
            args.push(since.to_rfc3339());
        }
        if let Some(until) = filter.until {
            clauses.push("created_at < ?".to_string());
            args.push(until.to_rfc3339());
        }

        if clauses.is_empty() {
            (String::new(), args)
        } else {
            (format!("WHERE {}", clauses.join(" AND ")), args)
        }
    }

    fn row_to_chat_log(row: &Row) -> rusqlite::Result<ChatLog> {
        let created_at: Option<String> = row.get("created_at")?;
        let turns_str: String = row.get("turns")?;
        let is_deleted: i32 = row.get("is_deleted")?;

        Ok(ChatLog {
            id: row.get("id")?,
            email: row.get("email")?,
            thread_uuid: row.get("thread_uuid")?,
            role: row.get("role")?,
            created_at: created_at.as_deref().and_then(parse_ts),
            turns: serde_json::from_str(&turns_str).unwrap_or_default(),
            is_deleted: is_deleted != 0,
        })
    }

    // ============================================
    // Feature interaction operations
    // ============================================

    /// Insert a feature interaction event
    pub fn insert_feature_interaction(&self, fi: &FeatureInteraction) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO feature_interactions (thread_uuid, email, timestamp, interaction)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![
                fi.thread_uuid,
                fi.email,
                fi.timestamp.map(|t| t.to_rfc3339()),
                fi.interaction.to_string(),
            ],
        )?;
        Ok(())
    }

    /// Feature interactions with a timestamp inside `[start, end)`.
    pub fn feature_interactions_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<FeatureInteraction>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"
            SELECT thread_uuid, email, timestamp, interaction
            FROM feature_interactions
            WHERE timestamp IS NOT NULL AND timestamp >= ?1 AND timestamp < ?2
            ORDER BY timestamp ASC
            "#,
        )?;

        let rows = stmt
            .query_map(params![start.to_rfc3339(), end.to_rfc3339()], |row| {
                Self::row_to_feature_interaction(row)
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Every feature interaction, regardless of timestamp.
    ///
    /// The thread-correlation KPI joins interactions to in-window chat
    /// threads without windowing the interactions themselves.
    pub fn all_feature_interactions(&self) -> Result<Vec<FeatureInteraction>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT thread_uuid, email, timestamp, interaction FROM feature_interactions",
        )?;
        let rows = stmt
            .query_map([], |row| Self::row_to_feature_interaction(row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn row_to_feature_interaction(row: &Row) -> rusqlite::Result<FeatureInteraction> {
        let ts: Option<String> = row.get("timestamp")?;
        let interaction_str: String = row.get("interaction")?;

        Ok(FeatureInteraction {
            thread_uuid: row.get("thread_uuid")?,
            email: row.get("email")?,
            timestamp: ts.as_deref().and_then(parse_ts),
            interaction: serde_json::from_str(&interaction_str)
                .unwrap_or(serde_json::Value::Null),
        })
    }

    // ============================================
    // User feedback operations
    // ============================================

    /// Insert or replace feedback for a (thread, turn) pair
    pub fn upsert_user_feedback(&self, feedback: &UserFeedback) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO user_feedbacks
                (email, thread_uuid, turn_uuid, is_liked, flags, other, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(thread_uuid, turn_uuid) DO UPDATE SET
                is_liked = excluded.is_liked,
                flags = excluded.flags,
                other = excluded.other
            "#,
            params![
                feedback.email,
                feedback.thread_uuid,
                feedback.turn_uuid,
                feedback.is_liked as i32,
                serde_json::to_string(&feedback.flags)?,
                feedback.other,
                feedback.created_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    /// Feedback for one (thread, turn) pair, if any
    pub fn get_user_feedback(&self, thread_uuid: &str, turn_uuid: &str) -> Result<Option<UserFeedback>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            r#"
            SELECT email, thread_uuid, turn_uuid, is_liked, flags, other, created_at
            FROM user_feedbacks
            WHERE thread_uuid = ?1 AND turn_uuid = ?2
            "#,
            params![thread_uuid, turn_uuid],
            Self::row_to_user_feedback,
        )
        .optional()
        .map_err(Error::from)
    }

    fn row_to_user_feedback(row: &Row) -> rusqlite::Result<UserFeedback> {
        let is_liked: i32 = row.get("is_liked")?;
        let flags_str: String = row.get("flags")?;
        let created_at: Option<String> = row.get("created_at")?;

        Ok(UserFeedback {
            email: row.get("email")?,
            thread_uuid: row.get("thread_uuid")?,
            turn_uuid: row.get("turn_uuid")?,
            is_liked: is_liked != 0,
            flags: serde_json::from_str(&flags_str).unwrap_or_default(),
            other: row.get("other")?,
            created_at: created_at.as_deref().and_then(parse_ts),
        })
    }

    // ============================================
    // User operations
    // ============================================

    /// Insert or update an account record
    pub fn upsert_user(&self, user: &User) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO users
                (email, name, signup_date, role, status, usage, follow_up_usage,
                 feedback_count, source_click_count, num_logins, clicked_sources,
                 saved_sources, stripe_customer_id)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            ON CONFLICT(email) DO UPDATE SET
                name = excluded.name,
                status = excluded.status,
                usage = excluded.usage,
                follow_up_usage = excluded.follow_up_usage,
                feedback_count = excluded.feedback_count,
                source_click_count = excluded.source_click_count,
                num_logins = excluded.num_logins,
                clicked_sources = excluded.clicked_sources,
                saved_sources = excluded.saved_sources,
                stripe_customer_id = excluded.stripe_customer_id
            "#,
            params![
                user.email,
                user.name,
                user.signup_date.map(|t| t.to_rfc3339()),
                user.role,
                user.status,
                user.usage,
                user.follow_up_usage,
                user.feedback_count,
                user.source_click_count,
                user.num_logins,
                serde_json::to_string(&user.clicked_sources)?,
                serde_json::to_string(&user.saved_sources)?,
                user.stripe_customer_id,
            ],
        )?;
        Ok(())
    }

    /// Every account record
    pub fn all_users(&self) -> Result<Vec<User>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM users")?;
        let users = stmt
            .query_map([], Self::row_to_user)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(users)
    }

    /// Count users matching a directory filter
    pub fn count_users(&self, filter: &UserFilter) -> Result<i64> {
        let (clause, args) = Self::user_where(filter);
        let conn = self.conn.lock().unwrap();
        let sql = format!("SELECT COUNT(*) FROM users {}", clause);
        let count = conn.query_row(&sql, rusqlite::params_from_iter(args.iter()), |r| r.get(0))?;
        Ok(count)
    }

    /// Paginated user listing ordered by signup date descending. `page` is 1-based.
    pub fn list_users(
        &self,
        filter: &UserFilter,
        page: usize,
        per_page: usize,
    ) -> Result<Vec<User>> {
        let (clause, args) = Self::user_where(filter);
        let offset = page.saturating_sub(1) * per_page;

        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT * FROM users {} ORDER BY signup_date DESC LIMIT {} OFFSET {}",
            clause, per_page, offset
        );
        let mut stmt = conn.prepare(&sql)?;
        let users = stmt
            .query_map(rusqlite::params_from_iter(args.iter()), Self::row_to_user)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(users)
    }

    /// Sum of usage and feedback counters over a filtered user set
    pub fn user_totals(&self, filter: &UserFilter) -> Result<UserTotals> {
        let (clause, args) = Self::user_where(filter);
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT COALESCE(SUM(usage), 0), COALESCE(SUM(feedback_count), 0) FROM users {}",
            clause
        );
        let totals = conn.query_row(&sql, rusqlite::params_from_iter(args.iter()), |r| {
            Ok(UserTotals {
                usage: r.get(0)?,
                feedback: r.get(1)?,
            })
        })?;
        Ok(totals)
    }

    fn user_where(filter: &UserFilter) -> (String, Vec<String>) {
        let mut clauses = Vec::new();
        let mut args = Vec::new();

        if let Some(search) = &filter.search {
            clauses.push(
                "(LOWER(email) LIKE ? OR LOWER(COALESCE(name, '')) LIKE ? OR LOWER(status) LIKE ?)"
                    .to_string(),
            );
            let needle = format!("%{}%", search.to_lowercase());
            args.push(needle.clone());
            args.push(needle.clone());
            args.push(needle);
        }
        if let Some(status) = &filter.status {
            clauses.push("status = ?".to_string());
            args.push(status.clone());
        }
        if let Some(emails) = &filter.emails {
            if emails.is_empty() {
                // Cohort resolved to nobody
                clauses.push("1 = 0".to_string());
            } else {
                let placeholders = vec!["?"; emails.len()].join(", ");
                clauses.push(format!("email IN ({})", placeholders));
                args.extend(emails.iter().cloned());
            }
        }

        if clauses.is_empty() {
            (String::new(), args)
        } else {
            (format!("WHERE {}", clauses.join(" AND ")), args)
        }
    }

    fn row_to_user(row: &Row) -> rusqlite::Result<User> {
        let signup: Option<String> = row.get("signup_date")?;
        let clicked_str: String = row.get("clicked_sources")?;
        let saved_str: String = row.get("saved_sources")?;

        Ok(User {
            email: row.get("email")?,
            name: row.get("name")?,
            signup_date: signup.as_deref().and_then(parse_ts),
            role: row.get("role")?,
            status: row.get("status")?,
            usage: row.get("usage")?,
            follow_up_usage: row.get("follow_up_usage")?,
            feedback_count: row.get("feedback_count")?,
            source_click_count: row.get("source_click_count")?,
            num_logins: row.get("num_logins")?,
            clicked_sources: serde_json::from_str(&clicked_str).unwrap_or_default(),
            saved_sources: serde_json::from_str(&saved_str).unwrap_or_default(),
            stripe_customer_id: row.get("stripe_customer_id")?,
        })
    }

    // ============================================
    // Beta roster operations
    // ============================================

    /// Insert or update a roster entry
    pub fn upsert_beta_user(&self, beta: &BetaUser) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO beta_users (email, name, cohort, status, invite_sent, usage, date_added)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(email) DO UPDATE SET
                name = excluded.name,
                cohort = excluded.cohort,
                status = excluded.status,
                invite_sent = excluded.invite_sent,
                usage = excluded.usage
            "#,
            params![
                beta.email,
                beta.name,
                beta.cohort.as_str(),
                beta.status,
                beta.invite_sent as i32,
                beta.usage,
                beta.date_added.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    /// The full beta roster
    pub fn all_beta_users(&self) -> Result<Vec<BetaUser>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM beta_users")?;
        let entries = stmt
            .query_map([], Self::row_to_beta_user)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    fn row_to_beta_user(row: &Row) -> rusqlite::Result<BetaUser> {
        let cohort_str: String = row.get("cohort")?;
        let invite_sent: i32 = row.get("invite_sent")?;
        let date_added: Option<String> = row.get("date_added")?;

        Ok(BetaUser {
            email: row.get("email")?,
            name: row.get("name")?,
            cohort: cohort_str.parse().unwrap_or(Cohort::None),
            status: row.get("status")?,
            invite_sent: invite_sent != 0,
            usage: row.get("usage")?,
            date_added: date_added.as_deref().and_then(parse_ts),
        })
    }
}

/// Parse an RFC3339 timestamp stored by this repo, tolerating bad data.
fn parse_ts(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
