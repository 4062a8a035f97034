//! Natural-language time phrases → absolute lower-bound filters.
//!
//! This is a phrase spotter, not a date parser. Phrases are matched
//! case-insensitively in priority order and the first hit wins:
//!
//! | Phrase | Window |
//! |--------|--------|
//! | `last hour`, `last 1 hour` | 3600 s |
//! | `today`, `last 24 hours`, `last day` | 86400 s |
//! | `last week` | 604800 s |
//!
//! Anything else yields no filter and the search runs unbounded.

use serde::Serialize;

use crate::models::TimeFilter;
use crate::timestamp::now_epoch;

/// A recognised relative time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeWindow {
    LastHour,
    LastDay,
    LastWeek,
}

const PHRASES: &[(TimeWindow, &[&str])] = &[
    (TimeWindow::LastHour, &["last hour", "last 1 hour"]),
    (TimeWindow::LastDay, &["today", "last 24 hours", "last day"]),
    (TimeWindow::LastWeek, &["last week"]),
];

impl TimeWindow {
    pub fn seconds(self) -> f64 {
        match self {
            TimeWindow::LastHour => 3_600.0,
            TimeWindow::LastDay => 86_400.0,
            TimeWindow::LastWeek => 604_800.0,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TimeWindow::LastHour => "last hour",
            TimeWindow::LastDay => "last 24 hours",
            TimeWindow::LastWeek => "last week",
        }
    }

    /// Find the first window whose phrase appears in `query`.
    pub fn detect(query: &str) -> Option<Self> {
        let lowered = query.to_lowercase();
        PHRASES
            .iter()
            .find(|(_, phrases)| phrases.iter().any(|p| lowered.contains(p)))
            .map(|(window, _)| *window)
    }

    /// Lower bound relative to `now` (seconds since epoch).
    pub fn filter_at(self, now: f64) -> TimeFilter {
        TimeFilter::since(now - self.seconds())
    }
}

/// Map a query to a filter relative to an explicit `now`.
pub fn parse_time_intent(query: &str, now: f64) -> Option<TimeFilter> {
    TimeWindow::detect(query).map(|w| w.filter_at(now))
}

/// Map a query to a filter relative to the current wall-clock time.
pub fn time_filter_for(query: &str) -> Option<TimeFilter> {
    parse_time_intent(query, now_epoch())
}
