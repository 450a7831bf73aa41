//! Time-window resolution and calendar bucketing
//!
//! Every KPI runs over a half-open window `[start, end)`. Callers supply
//! either an explicit date range (inclusive on both ends from their point of
//! view) or a named preset. All calendar math happens in one canonical
//! reporting timezone resolved from configuration, so "daily" buckets line up
//! with the business reporting day instead of drifting with server-local or
//! UTC day boundaries.

use chrono::{DateTime, Datelike, Duration, LocalResult, Months, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::{Error, Result};

/// Named date-range presets accepted by the HTTP surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangePreset {
    LastWeek,
    LastMonth,
    LastYear,
    AllTime,
}

impl RangePreset {
    pub fn as_str(&self) -> &'static str {
        match self {
            RangePreset::LastWeek => "last-week",
            RangePreset::LastMonth => "last-month",
            RangePreset::LastYear => "last-year",
            RangePreset::AllTime => "all-time",
        }
    }

    /// Parse a preset name.
    ///
    /// Unrecognized values resolve to `LastWeek`. That fallback is historical
    /// caller-facing behavior, so it is kept, but it is logged rather than
    /// silent so typos in the caller's preset string stay visible.
    pub fn parse(s: &str) -> Self {
        match s {
            "last-week" | "last_week" => RangePreset::LastWeek,
            "last-month" | "last_month" => RangePreset::LastMonth,
            "last-year" | "last_year" => RangePreset::LastYear,
            "all-time" | "all_time" => RangePreset::AllTime,
            other => {
                tracing::warn!(preset = other, "Unknown date-range preset, defaulting to last-week");
                RangePreset::LastWeek
            }
        }
    }
}

impl std::fmt::Display for RangePreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A half-open time interval `[start, end)` with the reporting timezone it
/// was resolved in.
///
/// Events at exactly `end` are excluded; events at exactly `start` are
/// included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    tz: Tz,
}

impl TimeWindow {
    /// Whether an instant falls inside the window.
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts < self.end
    }

    /// The reporting timezone this window was resolved in.
    pub fn tz(&self) -> Tz {
        self.tz
    }

    /// Calendar day of an instant, in the reporting timezone.
    pub fn day_key(&self, ts: DateTime<Utc>) -> NaiveDate {
        ts.with_timezone(&self.tz).date_naive()
    }

    /// Week bucket of an instant, anchored at the window start.
    ///
    /// `floor((ts - start) / 7 days)` - week boundaries follow the query's
    /// own start instant, not the ISO calendar, so the first bucket is always
    /// week 0 regardless of what weekday the window opens on.
    pub fn week_index(&self, ts: DateTime<Utc>) -> i64 {
        let secs = ts.signed_duration_since(self.start).num_seconds();
        secs.div_euclid(7 * 24 * 3600)
    }

    /// Calendar date on which a week bucket opens, in the reporting timezone.
    pub fn week_start(&self, index: i64) -> NaiveDate {
        (self.start + Duration::weeks(index))
            .with_timezone(&self.tz)
            .date_naive()
    }

    /// Calendar month of an instant, in the reporting timezone.
    pub fn month_key(&self, ts: DateTime<Utc>) -> (i32, u32) {
        let local = ts.with_timezone(&self.tz);
        (local.year(), local.month())
    }

    /// Window length in (fractional) days.
    pub fn days(&self) -> f64 {
        self.end.signed_duration_since(self.start).num_seconds() as f64 / 86_400.0
    }
}

/// Resolves caller-supplied ranges and presets into concrete windows.
#[derive(Debug, Clone, Copy)]
pub struct WindowResolver {
    tz: Tz,
}

impl WindowResolver {
    /// Build a resolver for the configured reporting timezone.
    ///
    /// An unparseable timezone name falls back to UTC with a warning.
    pub fn new(timezone: &str) -> Self {
        let tz = timezone.parse::<Tz>().unwrap_or_else(|_| {
            tracing::warn!(timezone, "Invalid reporting timezone, falling back to UTC");
            Tz::UTC
        });
        Self { tz }
    }

    pub fn tz(&self) -> Tz {
        self.tz
    }

    /// Resolve an explicit calendar-date range.
    ///
    /// The caller's range is inclusive on both ends: the window runs from
    /// local midnight on `start_date` to local midnight on the day after
    /// `end_date`, so every instant of `end_date` is inside.
    pub fn resolve_range(&self, start_date: NaiveDate, end_date: NaiveDate) -> Result<TimeWindow> {
        if end_date < start_date {
            return Err(Error::InvalidParameter(format!(
                "endDate {} precedes startDate {}",
                end_date, start_date
            )));
        }

        Ok(TimeWindow {
            start: self.local_midnight(start_date),
            end: self.local_midnight(end_date + Duration::days(1)),
            tz: self.tz,
        })
    }

    /// Resolve a named preset relative to `now`.
    pub fn resolve_preset(&self, preset: RangePreset, now: DateTime<Utc>) -> TimeWindow {
        let start = match preset {
            RangePreset::LastWeek => now - Duration::days(7),
            RangePreset::LastMonth => now
                .checked_sub_months(Months::new(1))
                .unwrap_or(now - Duration::days(30)),
            RangePreset::LastYear => now
                .checked_sub_months(Months::new(12))
                .unwrap_or(now - Duration::days(365)),
            RangePreset::AllTime => DateTime::<Utc>::UNIX_EPOCH,
        };

        TimeWindow {
            start,
            end: now,
            tz: self.tz,
        }
    }

    /// Parse a `YYYY-MM-DD` calendar date from the query string.
    pub fn parse_date(&self, value: &str) -> Result<NaiveDate> {
        NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .map_err(|_| Error::InvalidParameter(format!("malformed date: {}", value)))
    }

    /// Local midnight of a calendar date, as a UTC instant.
    fn local_midnight(&self, date: NaiveDate) -> DateTime<Utc> {
        let naive = date.and_hms_opt(0, 0, 0).expect("midnight is a valid time");
        match self.tz.from_local_datetime(&naive) {
            LocalResult::Single(dt) => dt.with_timezone(&Utc),
            // Fall backward: the earlier of the two midnights keeps the day fully covered
            LocalResult::Ambiguous(dt, _) => dt.with_timezone(&Utc),
            // Spring forward over midnight: the day starts at the first valid instant
            LocalResult::None => self
                .tz
                .from_local_datetime(&(naive + Duration::hours(1)))
                .earliest()
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|| Utc.from_utc_datetime(&naive)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn utc_resolver() -> WindowResolver {
        WindowResolver::new("UTC")
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_window_is_half_open() {
        let window = utc_resolver()
            .resolve_range(date(2025, 3, 1), date(2025, 3, 2))
            .unwrap();

        assert!(window.contains(window.start));
        assert!(window.contains(window.end - Duration::seconds(1)));
        assert!(!window.contains(window.end));
        assert!(!window.contains(window.start - Duration::seconds(1)));
    }

    #[test]
    fn test_explicit_range_includes_end_date() {
        let window = utc_resolver()
            .resolve_range(date(2025, 3, 1), date(2025, 3, 3))
            .unwrap();

        let late_on_end_date = Utc
            .with_ymd_and_hms(2025, 3, 3, 23, 59, 59)
            .single()
            .unwrap();
        assert!(window.contains(late_on_end_date));
        assert_eq!(window.days(), 3.0);
    }

    #[test]
    fn test_inverted_range_is_client_error() {
        let err = utc_resolver()
            .resolve_range(date(2025, 3, 3), date(2025, 3, 1))
            .unwrap_err();
        assert!(err.is_client_error());
    }

    #[test]
    fn test_unknown_preset_defaults_to_last_week() {
        assert_eq!(RangePreset::parse("last-month"), RangePreset::LastMonth);
        assert_eq!(RangePreset::parse("lsat-week"), RangePreset::LastWeek);
        assert_eq!(RangePreset::parse(""), RangePreset::LastWeek);
    }

    #[test]
    fn test_preset_windows_end_at_now() {
        let now = Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).single().unwrap();
        let resolver = utc_resolver();

        let week = resolver.resolve_preset(RangePreset::LastWeek, now);
        assert_eq!(week.end, now);
        assert_eq!(week.start, now - Duration::days(7));

        let month = resolver.resolve_preset(RangePreset::LastMonth, now);
        assert_eq!(month.start, Utc.with_ymd_and_hms(2025, 5, 15, 12, 0, 0).single().unwrap());

        let all = resolver.resolve_preset(RangePreset::AllTime, now);
        assert_eq!(all.start, DateTime::<Utc>::UNIX_EPOCH);
    }

    #[test]
    fn test_week_index_is_anchored_to_window_start() {
        // Window opens on a Wednesday; week 0 still starts at the window start
        let window = utc_resolver()
            .resolve_range(date(2025, 1, 1), date(2025, 1, 28))
            .unwrap();

        assert_eq!(window.week_index(window.start), 0);
        assert_eq!(window.week_index(window.start + Duration::days(6)), 0);
        assert_eq!(window.week_index(window.start + Duration::days(7)), 1);
        assert_eq!(window.week_index(window.start + Duration::days(20)), 2);
        assert_eq!(window.week_start(1), date(2025, 1, 8));
    }

    #[test]
    fn test_day_key_uses_reporting_timezone() {
        // 2025-03-01T03:00Z is still Feb 28 in New York (UTC-5)
        let resolver = WindowResolver::new("America/New_York");
        let window = resolver
            .resolve_range(date(2025, 2, 1), date(2025, 3, 31))
            .unwrap();

        let ts = Utc.with_ymd_and_hms(2025, 3, 1, 3, 0, 0).single().unwrap();
        assert_eq!(window.day_key(ts), date(2025, 2, 28));
        assert_eq!(window.month_key(ts), (2025, 2));
    }

    #[test]
    fn test_invalid_timezone_falls_back_to_utc() {
        let resolver = WindowResolver::new("Mars/Olympus_Mons");
        assert_eq!(resolver.tz(), Tz::UTC);
    }

    #[test]
    fn test_malformed_date_is_client_error() {
        let err = utc_resolver().parse_date("03/01/2025").unwrap_err();
        assert!(err.is_client_error());
    }
}
