//! KPI aggregation engine and dispatcher
//!
//! Each KPI is a pure reduction over a typed event slice. The engine resolves
//! nothing itself: the time window and cohort filter arrive fully resolved in
//! [`KpiParams`], so every computation is a value-in/value-out function of the
//! store snapshot.
//!
//! ```text
//! HTTP request -> KpiKind::from_str -> KpiParams (window + cohort resolved once)
//!              -> KpiEngine::evaluate -> load typed slice -> pure reducer
//!              -> KpiReport { kpi, data }
//! ```
//!
//! An unknown KPI name fails before any store access. An empty result set is
//! a success with a zero/empty payload shaped like the non-empty case.

pub mod activity;
pub mod churn;
pub mod distribution;
pub mod features;
pub mod overview;
pub mod registry;
pub mod retention;
pub mod revenue;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::billing::StripeClient;
use crate::cohort::{resolve_cohort, CohortFilter};
use crate::config::{AnalyticsConfig, BillingConfig, Config};
use crate::db::Database;
use crate::error::{Error, Result};
use crate::types::ChatLog;
use crate::window::{TimeWindow, WindowResolver};

pub use overview::{OverviewParams, UserDirectory};
pub use registry::{list_kpis, KpiDescriptor, KpiFamily};

/// The closed set of KPIs the dispatcher serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KpiKind {
    DailyActiveUsers,
    WeeklyActiveUsers,
    AverageDailyQueries,
    TotalQueries,
    WeeklyUserEngagement,
    UserTurnoverRateWeekly,
    ChurnRate,
    InactiveUsers,
    RetentionCohorts,
    QueriesPerUserDistribution,
    TokenUsageDistribution,
    FeatureUseFrequencySaveSources,
    FeatureInteractionRate,
    FeatureInteractionRateCalculator,
    RevenueSnapshot,
}

impl KpiKind {
    pub const ALL: [KpiKind; 15] = [
        KpiKind::DailyActiveUsers,
        KpiKind::WeeklyActiveUsers,
        KpiKind::AverageDailyQueries,
        KpiKind::TotalQueries,
        KpiKind::WeeklyUserEngagement,
        KpiKind::UserTurnoverRateWeekly,
        KpiKind::ChurnRate,
        KpiKind::InactiveUsers,
        KpiKind::RetentionCohorts,
        KpiKind::QueriesPerUserDistribution,
        KpiKind::TokenUsageDistribution,
        KpiKind::FeatureUseFrequencySaveSources,
        KpiKind::FeatureInteractionRate,
        KpiKind::FeatureInteractionRateCalculator,
        KpiKind::RevenueSnapshot,
    ];

    /// Wire name, as accepted by the `kpi` query parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            KpiKind::DailyActiveUsers => "dailyActiveUsers",
            KpiKind::WeeklyActiveUsers => "weeklyActiveUsers",
            KpiKind::AverageDailyQueries => "averageDailyQueries",
            KpiKind::TotalQueries => "totalQueries",
            KpiKind::WeeklyUserEngagement => "weeklyUserEngagement",
            KpiKind::UserTurnoverRateWeekly => "userTurnoverRateWeekly",
            KpiKind::ChurnRate => "churnRate",
            KpiKind::InactiveUsers => "inactiveUsers",
            KpiKind::RetentionCohorts => "retentionCohorts",
            KpiKind::QueriesPerUserDistribution => "queriesPerUserDistribution",
            KpiKind::TokenUsageDistribution => "tokenUsageDistribution",
            KpiKind::FeatureUseFrequencySaveSources => "featureUseFrequencySaveSources",
            KpiKind::FeatureInteractionRate => "featureInteractionRate",
            KpiKind::FeatureInteractionRateCalculator => "featureInteractionRateCalculator",
            KpiKind::RevenueSnapshot => "revenueSnapshot",
        }
    }

    /// Human-facing label, echoed in the report envelope.
    pub fn label(&self) -> &'static str {
        match self {
            KpiKind::DailyActiveUsers => "Daily Active Users",
            KpiKind::WeeklyActiveUsers => "Weekly Active Users",
            KpiKind::AverageDailyQueries => "Average Daily Queries Per User",
            KpiKind::TotalQueries => "Total Queries per Day",
            KpiKind::WeeklyUserEngagement => {
                "Weekly User Engagement (Change in Queries per User)"
            }
            KpiKind::UserTurnoverRateWeekly => "Weekly User Turnover",
            KpiKind::ChurnRate => "Churn Rate",
            KpiKind::InactiveUsers => "Inactive Users",
            KpiKind::RetentionCohorts => "Retention by Signup Month",
            KpiKind::QueriesPerUserDistribution => "Queries per User Distribution",
            KpiKind::TokenUsageDistribution => "Token Usage Distribution",
            KpiKind::FeatureUseFrequencySaveSources => "Feature Use Frequency (Save Sources)",
            KpiKind::FeatureInteractionRate => {
                "Feature Use Frequency (Primary Literature or Source)"
            }
            KpiKind::FeatureInteractionRateCalculator => {
                "Raw Feature Interaction Count (Calculator Submitted)"
            }
            KpiKind::RevenueSnapshot => "Revenue & Subscription Snapshot",
        }
    }
}

impl std::str::FromStr for KpiKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        KpiKind::ALL
            .iter()
            .find(|kind| kind.as_str() == s)
            .copied()
            .ok_or_else(|| Error::UnknownKpi(s.to_string()))
    }
}

/// Fully resolved evaluation parameters, built once at the boundary.
#[derive(Debug, Clone)]
pub struct KpiParams {
    pub window: TimeWindow,
    pub cohort: CohortFilter,
    /// Caller-supplied bin boundaries for histogram KPIs
    pub bins: Option<Vec<f64>>,
    /// Evaluation instant, for trailing-window computations
    pub now: DateTime<Utc>,
}

/// A KPI result envelope: label plus the family-specific payload.
#[derive(Debug, Clone, Serialize)]
pub struct KpiReport {
    pub kpi: String,
    pub data: serde_json::Value,
}

fn report<T: Serialize>(kind: KpiKind, data: &T) -> Result<KpiReport> {
    Ok(KpiReport {
        kpi: kind.label().to_string(),
        data: serde_json::to_value(data)?,
    })
}

/// The aggregation engine.
///
/// Holds the store handle and injected configuration; no mutable state is
/// shared across evaluations, so concurrent requests are independent.
pub struct KpiEngine {
    db: Arc<Database>,
    windows: WindowResolver,
    analytics: AnalyticsConfig,
    billing: Option<StripeClient>,
}

impl KpiEngine {
    pub fn new(
        db: Arc<Database>,
        windows: WindowResolver,
        analytics: AnalyticsConfig,
        billing: Option<StripeClient>,
    ) -> Self {
        Self {
            db,
            windows,
            analytics,
            billing,
        }
    }

    /// Build an engine from loaded configuration.
    pub fn from_config(db: Arc<Database>, config: &Config) -> Result<Self> {
        let windows = WindowResolver::new(&config.analytics.timezone);
        let billing = build_billing_client(&config.billing)?;
        Ok(Self::new(db, windows, config.analytics.clone(), billing))
    }

    /// The window resolver this engine buckets with.
    pub fn window_resolver(&self) -> WindowResolver {
        self.windows
    }

    /// Resolve a cohort selector against the current beta roster.
    pub fn resolve_cohort(&self, selector: &str) -> Result<CohortFilter> {
        let roster = self.db.all_beta_users()?;
        Ok(resolve_cohort(selector, &roster))
    }

    /// Evaluate one KPI.
    pub async fn evaluate(&self, kind: KpiKind, params: &KpiParams) -> Result<KpiReport> {
        tracing::debug!(
            kpi = kind.as_str(),
            start = %params.window.start,
            end = %params.window.end,
            unfiltered_cohort = params.cohort.is_unfiltered(),
            "Evaluating KPI"
        );

        match kind {
            KpiKind::DailyActiveUsers => {
                let logs = self.qualifying_logs(params)?;
                report(kind, &activity::daily_active_users(&logs, &params.window))
            }
            KpiKind::WeeklyActiveUsers => {
                let logs = self.qualifying_logs(params)?;
                report(kind, &activity::weekly_active_users(&logs, &params.window))
            }
            KpiKind::AverageDailyQueries => {
                let logs = self.qualifying_logs(params)?;
                report(kind, &activity::average_daily_queries(&logs, &params.window))
            }
            KpiKind::TotalQueries => {
                let logs = self.qualifying_logs(params)?;
                report(kind, &activity::total_queries(&logs, &params.window))
            }
            KpiKind::WeeklyUserEngagement => {
                let logs = self.qualifying_logs(params)?;
                report(kind, &activity::weekly_user_engagement(&logs, &params.window))
            }
            KpiKind::UserTurnoverRateWeekly => {
                let logs = self.qualifying_logs(params)?;
                report(kind, &activity::weekly_turnover(&logs, &params.window))
            }
            KpiKind::ChurnRate => {
                let logs = self.qualifying_logs(params)?;
                report(kind, &churn::monthly_churn(&logs, &params.window))
            }
            KpiKind::InactiveUsers => {
                let roster: Vec<String> = self
                    .db
                    .all_users()?
                    .into_iter()
                    .filter(|u| u.is_active() && params.cohort.matches(&u.email))
                    .map(|u| u.email)
                    .collect();
                let active: HashSet<String> = self
                    .qualifying_logs(params)?
                    .into_iter()
                    .map(|log| log.email)
                    .collect();
                let last_activity = self.db.last_activity_by_user()?;
                report(
                    kind,
                    &churn::inactive_users(&roster, &active, &last_activity, &params.window),
                )
            }
            KpiKind::RetentionCohorts => {
                let users: Vec<_> = self
                    .db
                    .all_users()?
                    .into_iter()
                    .filter(|u| params.cohort.matches(&u.email))
                    .collect();
                let events: Vec<_> = self
                    .db
                    .user_activity_events()?
                    .into_iter()
                    .filter(|(email, _)| params.cohort.matches(email))
                    .collect();
                report(
                    kind,
                    &retention::retention_cohorts(
                        &users,
                        &events,
                        &params.window,
                        params.now,
                        self.analytics.retention_window_days,
                    ),
                )
            }
            KpiKind::QueriesPerUserDistribution => {
                let logs = self.qualifying_logs(params)?;
                let values = per_user_metric(&logs, |log| log.turn_count() as f64);
                let bins = params
                    .bins
                    .as_deref()
                    .unwrap_or(&self.analytics.query_count_bins);
                report(kind, &distribution::bin_user_metric(&values, bins)?)
            }
            KpiKind::TokenUsageDistribution => {
                let logs = self.qualifying_logs(params)?;
                let values = per_user_metric(&logs, |log| log.total_tokens() as f64);
                let bins = params
                    .bins
                    .as_deref()
                    .unwrap_or(&self.analytics.token_usage_bins);
                report(kind, &distribution::bin_user_metric(&values, bins)?)
            }
            KpiKind::FeatureUseFrequencySaveSources => {
                let users = self.db.all_users()?;
                report(
                    kind,
                    &features::save_sources_frequency(&users, &params.cohort, &params.window),
                )
            }
            KpiKind::FeatureInteractionRate => {
                let logs = self.qualifying_logs(params)?;
                let interactions = self.db.all_feature_interactions()?;
                report(
                    kind,
                    &features::interaction_rate(
                        &logs,
                        &interactions,
                        features::SOURCE_ENGAGEMENT_KINDS,
                        &params.window,
                    ),
                )
            }
            KpiKind::FeatureInteractionRateCalculator => {
                let interactions = self
                    .db
                    .feature_interactions_between(params.window.start, params.window.end)?;
                report(
                    kind,
                    &features::interaction_count(
                        &interactions,
                        features::CALCULATOR_KIND,
                        &params.cohort,
                        &params.window,
                    ),
                )
            }
            KpiKind::RevenueSnapshot => {
                let client = self
                    .billing
                    .as_ref()
                    .ok_or_else(|| Error::Billing("billing provider not configured".to_string()))?;
                let customers = client.list_customers(&params.window).await?;
                let subscriptions = client.list_subscriptions(&params.window).await?;
                report(kind, &revenue::summarize(&customers, &subscriptions))
            }
        }
    }

    /// Chat events that qualify for analytics: user role, timestamp inside
    /// the window, email accepted by the cohort filter.
    fn qualifying_logs(&self, params: &KpiParams) -> Result<Vec<ChatLog>> {
        let logs = self
            .db
            .chat_logs_between(params.window.start, params.window.end)?;
        Ok(logs
            .into_iter()
            .filter(|log| log.role == "user" && params.cohort.matches(&log.email))
            .collect())
    }
}

/// Reduce qualifying events to one scalar per user.
fn per_user_metric<F>(logs: &[ChatLog], metric: F) -> HashMap<String, f64>
where
    F: Fn(&ChatLog) -> f64,
{
    let mut values: HashMap<String, f64> = HashMap::new();
    for log in logs {
        *values.entry(log.email.clone()).or_default() += metric(log);
    }
    values
}

fn build_billing_client(config: &BillingConfig) -> Result<Option<StripeClient>> {
    if config.is_ready() {
        Ok(Some(StripeClient::new(config)?))
    } else {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_every_kind_round_trips_its_name() {
        for kind in KpiKind::ALL {
            assert_eq!(KpiKind::from_str(kind.as_str()).unwrap(), kind);
        }
    }

    #[test]
    fn test_unknown_kpi_is_rejected() {
        let err = KpiKind::from_str("monthlyRecurringRevenue").unwrap_err();
        assert!(matches!(err, Error::UnknownKpi(_)));
        assert!(err.is_client_error());
    }

    #[test]
    fn test_per_user_metric_accumulates_across_events() {
        use crate::types::{ChatLog, ChatTurn};
        use chrono::Utc;

        let log = |email: &str, turns: usize| ChatLog {
            id: format!("{}-{}", email, turns),
            email: email.to_string(),
            thread_uuid: "t".to_string(),
            role: "user".to_string(),
            created_at: Some(Utc::now()),
            turns: (0..turns).map(|_| ChatTurn::default()).collect(),
            is_deleted: false,
        };

        let logs = vec![log("a@x.com", 2), log("a@x.com", 3), log("b@x.com", 1)];
        let values = per_user_metric(&logs, |l| l.turn_count() as f64);
        assert_eq!(values["a@x.com"], 5.0);
        assert_eq!(values["b@x.com"], 1.0);
    }
}
