//! KPI catalog for discovery and documentation.

use serde::Serialize;

/// Result family a KPI belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KpiFamily {
    /// Day- or week-bucketed counts
    TimeSeries,
    /// Per-user metric bucketed over boundaries
    Histogram,
    /// Per-cohort or per-month tables
    CohortTable,
    /// Pass-through summary of an external provider
    ExternalSummary,
}

/// Descriptor for one KPI exposed by the dispatcher.
#[derive(Debug, Clone, Serialize)]
pub struct KpiDescriptor {
    pub name: &'static str,
    pub label: &'static str,
    pub family: KpiFamily,
    pub summary: &'static str,
}

const KPIS: &[KpiDescriptor] = &[
    KpiDescriptor {
        name: "dailyActiveUsers",
        label: "Daily Active Users",
        family: KpiFamily::TimeSeries,
        summary: "Distinct users with at least one query per calendar day.",
    },
    KpiDescriptor {
        name: "weeklyActiveUsers",
        label: "Weekly Active Users",
        family: KpiFamily::TimeSeries,
        summary: "Distinct users per week, weeks anchored at the window start.",
    },
    KpiDescriptor {
        name: "averageDailyQueries",
        label: "Average Daily Queries Per User",
        family: KpiFamily::TimeSeries,
        summary: "Queries per active user per calendar day.",
    },
    KpiDescriptor {
        name: "totalQueries",
        label: "Total Queries per Day",
        family: KpiFamily::TimeSeries,
        summary: "Query totals per calendar day.",
    },
    KpiDescriptor {
        name: "weeklyUserEngagement",
        label: "Weekly User Engagement (Change in Queries per User)",
        family: KpiFamily::TimeSeries,
        summary: "Queries per user per week with week-over-week deltas.",
    },
    KpiDescriptor {
        name: "userTurnoverRateWeekly",
        label: "Weekly User Turnover",
        family: KpiFamily::TimeSeries,
        summary: "Active users per week with new/churned breakdown.",
    },
    KpiDescriptor {
        name: "churnRate",
        label: "Churn Rate",
        family: KpiFamily::CohortTable,
        summary: "Month-over-month net movement of the active-user pool.",
    },
    KpiDescriptor {
        name: "inactiveUsers",
        label: "Inactive Users",
        family: KpiFamily::CohortTable,
        summary: "Cohort members without qualifying events in the window.",
    },
    KpiDescriptor {
        name: "retentionCohorts",
        label: "Retention by Signup Month",
        family: KpiFamily::CohortTable,
        summary: "Retention, active days and lifespan grouped by signup month.",
    },
    KpiDescriptor {
        name: "queriesPerUserDistribution",
        label: "Queries per User Distribution",
        family: KpiFamily::Histogram,
        summary: "Histogram of per-user query counts over the window.",
    },
    KpiDescriptor {
        name: "tokenUsageDistribution",
        label: "Token Usage Distribution",
        family: KpiFamily::Histogram,
        summary: "Histogram of per-user token totals over the window.",
    },
    KpiDescriptor {
        name: "featureUseFrequencySaveSources",
        label: "Feature Use Frequency (Save Sources)",
        family: KpiFamily::TimeSeries,
        summary: "Saved sources per day with per-user averages.",
    },
    KpiDescriptor {
        name: "featureInteractionRate",
        label: "Feature Use Frequency (Primary Literature or Source)",
        family: KpiFamily::TimeSeries,
        summary: "Share of chat threads per day with source engagement.",
    },
    KpiDescriptor {
        name: "featureInteractionRateCalculator",
        label: "Raw Feature Interaction Count (Calculator Submitted)",
        family: KpiFamily::TimeSeries,
        summary: "Calculator submissions per day.",
    },
    KpiDescriptor {
        name: "revenueSnapshot",
        label: "Revenue & Subscription Snapshot",
        family: KpiFamily::ExternalSummary,
        summary: "Stripe customers and subscriptions classified by tier and status.",
    },
];

/// List every KPI the dispatcher knows.
pub fn list_kpis() -> Vec<KpiDescriptor> {
    KPIS.to_vec()
}

/// List KPIs of one family.
pub fn list_kpis_for_family(family: KpiFamily) -> Vec<KpiDescriptor> {
    KPIS.iter().filter(|k| k.family == family).cloned().collect()
}
