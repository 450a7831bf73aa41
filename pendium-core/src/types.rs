//! Core domain types for pendium
//!
//! These types are the canonical data model over the collections the product
//! pipeline populates. The admin backend only reads them; the ingestion
//! pipeline (an external service) is the sole writer in production.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **ChatLog** | One chat event: a user (email), a thread, a timestamp and a list of turns |
//! | **Turn** | One query/response exchange inside a chat thread |
//! | **FeatureInteraction** | A product UI interaction (opened a source, submitted the calculator, ...) |
//! | **UserFeedback** | Thumbs up/down plus complaint flags attached to one turn |
//! | **User** | An account record with cumulative usage counters |
//! | **BetaUser** | A beta-roster entry carrying a cohort label |
//! | **Cohort** | A named subgroup of beta users ("A".."D" or "none") |
//!
//! Timestamps on events are `Option<DateTime<Utc>>`: records with a missing
//! or unparseable timestamp survive loading but are excluded from every
//! time-windowed computation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================
// Chat logs
// ============================================

/// Token counters for a single turn, as reported by the pipeline.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenSummary {
    #[serde(default)]
    pub input_tokens: i64,
    #[serde(default)]
    pub output_tokens: i64,
}

impl TokenSummary {
    pub fn total(&self) -> i64 {
        self.input_tokens + self.output_tokens
    }
}

/// A source citation attached to a turn's response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceRef {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    /// Whether the user clicked through to this source
    #[serde(default)]
    pub clicked: bool,
}

/// One query/response exchange within a chat thread.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatTurn {
    pub uuid: String,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub token_summary: Option<TokenSummary>,
    #[serde(default)]
    pub sources: Vec<SourceRef>,
}

/// A chat event from the event store.
///
/// Immutable after ingestion except for feedback attachment; never deleted
/// by this backend (`is_deleted` is a soft flag set elsewhere).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatLog {
    /// Unique identifier
    pub id: String,
    /// User identifier
    pub email: String,
    /// Thread this event belongs to
    pub thread_uuid: String,
    /// Author role ("user" qualifies for analytics; anything else is ignored)
    pub role: String,
    /// Event timestamp; `None` excludes the event from windowed computations
    pub created_at: Option<DateTime<Utc>>,
    /// Turns recorded for this event
    pub turns: Vec<ChatTurn>,
    /// Soft-delete flag
    pub is_deleted: bool,
}

impl ChatLog {
    /// Number of turns in this event.
    pub fn turn_count(&self) -> usize {
        self.turns.len()
    }

    /// Total tokens across all turns (turns without counters contribute 0).
    pub fn total_tokens(&self) -> i64 {
        self.turns
            .iter()
            .filter_map(|t| t.token_summary.as_ref())
            .map(TokenSummary::total)
            .sum()
    }
}

// ============================================
// Feature interactions
// ============================================

/// A product UI interaction event. Append-only.
///
/// The payload shape varies by feature, so it is kept as JSON; the
/// discriminant lives at `interaction.interaction` in the payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureInteraction {
    pub thread_uuid: String,
    pub email: String,
    /// Event timestamp; `None` excludes the event from windowed computations
    pub timestamp: Option<DateTime<Utc>>,
    /// Free-form payload, discriminated by the nested `interaction` field
    pub interaction: serde_json::Value,
}

impl FeatureInteraction {
    /// The interaction discriminant (e.g. "opened_source",
    /// "calculator_submitted"), if present in the payload.
    pub fn kind(&self) -> Option<&str> {
        self.interaction.get("interaction").and_then(|v| v.as_str())
    }
}

// ============================================
// User feedback
// ============================================

/// Named complaint flags a user can attach to a turn.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct FeedbackFlags {
    #[serde(default)]
    pub inaccurate_information: bool,
    #[serde(default)]
    pub inaccurate_sources: bool,
    #[serde(default)]
    pub not_relevant: bool,
    #[serde(default)]
    pub hallucinations: bool,
    #[serde(default)]
    pub outdated: bool,
    #[serde(default)]
    pub too_lengthy: bool,
    #[serde(default)]
    pub formatting: bool,
    #[serde(default)]
    pub missing_sources: bool,
}

/// Feedback attached to one (thread, turn) pair. At most one record per pair;
/// the store upserts on that key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserFeedback {
    pub email: String,
    pub thread_uuid: String,
    /// Turn this feedback refers to
    pub turn_uuid: String,
    pub is_liked: bool,
    #[serde(default)]
    pub flags: FeedbackFlags,
    /// Free-text remarks
    #[serde(default)]
    pub other: String,
    pub created_at: Option<DateTime<Utc>>,
}

// ============================================
// Users
// ============================================

/// A source a user saved to their library.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SavedSource {
    #[serde(default)]
    pub title: Option<String>,
    /// When the source was saved; `None` excludes it from windowed counts
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// An account record. Counters are maintained incrementally by the product;
/// this backend treats them as read-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique key
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    pub signup_date: Option<DateTime<Utc>>,
    /// Account role ("user", "admin", ...)
    pub role: String,
    /// Account status ("active" or otherwise)
    pub status: String,
    /// Primary query count
    pub usage: i64,
    /// Follow-up query count
    pub follow_up_usage: i64,
    pub feedback_count: i64,
    pub source_click_count: i64,
    pub num_logins: i64,
    #[serde(default)]
    pub clicked_sources: Vec<String>,
    #[serde(default)]
    pub saved_sources: Vec<SavedSource>,
    /// External billing reference, when the user has one
    #[serde(default)]
    pub stripe_customer_id: Option<String>,
}

impl User {
    pub fn is_active(&self) -> bool {
        self.status == "active"
    }
}

// ============================================
// Beta roster
// ============================================

/// Cohort label for a beta-roster entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cohort {
    A,
    B,
    C,
    D,
    #[serde(rename = "none")]
    None,
}

impl Cohort {
    pub fn as_str(&self) -> &'static str {
        match self {
            Cohort::A => "A",
            Cohort::B => "B",
            Cohort::C => "C",
            Cohort::D => "D",
            Cohort::None => "none",
        }
    }
}

impl std::fmt::Display for Cohort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Cohort {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "A" => Ok(Cohort::A),
            "B" => Ok(Cohort::B),
            "C" => Ok(Cohort::C),
            "D" => Ok(Cohort::D),
            "none" => Ok(Cohort::None),
            _ => Err(format!("unknown cohort: {}", s)),
        }
    }
}

/// A beta-roster entry. Used to resolve cohort selectors into email sets.
///
/// `status` is the roster lifecycle marker ("signed_up", "logged_in",
/// "used_product", "never_used_product", "never_signed_up").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BetaUser {
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    pub cohort: Cohort,
    pub status: String,
    pub invite_sent: bool,
    pub usage: i64,
    pub date_added: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_interaction_kind_reads_nested_discriminant() {
        let fi = FeatureInteraction {
            thread_uuid: "t-1".to_string(),
            email: "a@example.com".to_string(),
            timestamp: Some(Utc::now()),
            interaction: json!({ "interaction": "opened_source", "source_id": 42 }),
        };
        assert_eq!(fi.kind(), Some("opened_source"));

        let empty = FeatureInteraction {
            interaction: json!({}),
            ..fi
        };
        assert_eq!(empty.kind(), None);
    }

    #[test]
    fn test_chat_log_token_totals() {
        let log = ChatLog {
            id: "c-1".to_string(),
            email: "a@example.com".to_string(),
            thread_uuid: "t-1".to_string(),
            role: "user".to_string(),
            created_at: Some(Utc::now()),
            turns: vec![
                ChatTurn {
                    uuid: "u-1".to_string(),
                    token_summary: Some(TokenSummary {
                        input_tokens: 100,
                        output_tokens: 250,
                    }),
                    ..Default::default()
                },
                ChatTurn {
                    uuid: "u-2".to_string(),
                    token_summary: None,
                    ..Default::default()
                },
            ],
            is_deleted: false,
        };
        assert_eq!(log.turn_count(), 2);
        assert_eq!(log.total_tokens(), 350);
    }

    #[test]
    fn test_cohort_round_trip() {
        for label in ["A", "B", "C", "D", "none"] {
            let cohort: Cohort = label.parse().unwrap();
            assert_eq!(cohort.as_str(), label);
        }
        assert!("E".parse::<Cohort>().is_err());
    }
}
