//! Cohort selector resolution
//!
//! A cohort selector from the query string becomes an explicit filter value.
//! "Match everyone" and "match nobody" are distinct variants rather than
//! being overloaded onto an empty collection, so no caller can confuse an
//! unrestricted query with one that filtered down to zero users.

use std::collections::HashSet;

use crate::types::{BetaUser, Cohort};

/// A resolved cohort filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CohortFilter {
    /// No restriction: every user matches.
    Unfiltered,
    /// Only the listed emails match. May be empty, which matches nobody.
    Members(HashSet<String>),
}

impl CohortFilter {
    /// Whether an email passes the filter.
    pub fn matches(&self, email: &str) -> bool {
        match self {
            CohortFilter::Unfiltered => true,
            CohortFilter::Members(emails) => emails.contains(email),
        }
    }

    pub fn is_unfiltered(&self) -> bool {
        matches!(self, CohortFilter::Unfiltered)
    }
}

/// Resolve a cohort selector against the beta roster.
///
/// - `"all"` and `"beta"` (legacy alias) mean no restriction.
/// - A known cohort label selects every roster entry carrying that tag.
/// - Anything else filters to nobody.
pub fn resolve_cohort(selector: &str, roster: &[BetaUser]) -> CohortFilter {
    match selector {
        "all" | "beta" => CohortFilter::Unfiltered,
        other => match other.parse::<Cohort>() {
            Ok(cohort) => {
                let emails = roster
                    .iter()
                    .filter(|entry| entry.cohort == cohort)
                    .map(|entry| entry.email.clone())
                    .collect();
                CohortFilter::Members(emails)
            }
            Err(_) => {
                tracing::warn!(selector = other, "Unknown cohort selector, matching nobody");
                CohortFilter::Members(HashSet::new())
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster_entry(email: &str, cohort: Cohort) -> BetaUser {
        BetaUser {
            email: email.to_string(),
            name: None,
            cohort,
            status: "signed_up".to_string(),
            invite_sent: true,
            usage: 0,
            date_added: None,
        }
    }

    fn roster() -> Vec<BetaUser> {
        vec![
            roster_entry("a@example.com", Cohort::A),
            roster_entry("b@example.com", Cohort::A),
            roster_entry("c@example.com", Cohort::B),
            roster_entry("d@example.com", Cohort::None),
        ]
    }

    #[test]
    fn test_all_and_beta_are_unfiltered() {
        let roster = roster();
        assert_eq!(resolve_cohort("all", &roster), CohortFilter::Unfiltered);
        assert_eq!(resolve_cohort("beta", &roster), CohortFilter::Unfiltered);
        assert!(resolve_cohort("all", &roster).matches("stranger@example.com"));
    }

    #[test]
    fn test_known_label_selects_roster_subset() {
        let filter = resolve_cohort("A", &roster());
        assert!(filter.matches("a@example.com"));
        assert!(filter.matches("b@example.com"));
        assert!(!filter.matches("c@example.com"));
        assert!(!filter.matches("stranger@example.com"));
    }

    #[test]
    fn test_none_label_is_a_real_cohort() {
        let filter = resolve_cohort("none", &roster());
        assert!(filter.matches("d@example.com"));
        assert!(!filter.matches("a@example.com"));
    }

    #[test]
    fn test_unknown_selector_matches_nobody_but_is_not_unfiltered() {
        let filter = resolve_cohort("platinum", &roster());
        assert_eq!(filter, CohortFilter::Members(HashSet::new()));
        assert!(!filter.is_unfiltered());
        assert!(!filter.matches("a@example.com"));
    }
}
