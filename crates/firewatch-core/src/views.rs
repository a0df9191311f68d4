use crate::error::SyncError;
use crate::model::{Incident, IncidentStatus, RiskLevel};
use chrono::{DateTime, Duration, Local, Utc};
use serde::Serialize;
use std::str::FromStr;

/// Time window for the dashboard filter bar. `Today` is anchored at local
/// midnight of the evaluation instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeWindow {
    All,
    Last30Min,
    LastHour,
    Today,
}

impl FromStr for TimeWindow {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(TimeWindow::All),
            "30min" => Ok(TimeWindow::Last30Min),
            "1h" => Ok(TimeWindow::LastHour),
            "today" => Ok(TimeWindow::Today),
            other => Err(SyncError::Validation(format!(
                "unknown time window '{}'",
                other
            ))),
        }
    }
}

fn window_cutoff(window: TimeWindow, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match window {
        TimeWindow::All => None,
        TimeWindow::Last30Min => Some(now - Duration::minutes(30)),
        TimeWindow::LastHour => Some(now - Duration::hours(1)),
        TimeWindow::Today => Some(local_day_start(now)),
    }
}

/// First valid local instant of `now`'s calendar day. Midnight can be
/// skipped by a DST transition, so later hours are tried until one maps
/// to a real instant; the day must never widen to an unbounded window.
fn local_day_start(now: DateTime<Utc>) -> DateTime<Utc> {
    let date = now.with_timezone(&Local).date_naive();
    (0..24)
        .filter_map(|hour| date.and_hms_opt(hour, 0, 0))
        .find_map(|naive| naive.and_local_timezone(Local).earliest())
        .map(|start| start.with_timezone(&Utc))
        .unwrap_or(now)
}

/// Keep records with `created_at` strictly after the window cutoff
pub fn filter_by_window(
    records: &[Incident],
    window: TimeWindow,
    now: DateTime<Utc>,
) -> Vec<Incident> {
    match window_cutoff(window, now) {
        None => records.to_vec(),
        Some(cutoff) => records
            .iter()
            .filter(|rec| rec.created_at > cutoff)
            .cloned()
            .collect(),
    }
}

/// Optional exact-match constraints, logical AND when both are set
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusRiskFilter {
    pub status: Option<IncidentStatus>,
    pub risk: Option<RiskLevel>,
}

impl StatusRiskFilter {
    pub fn matches(&self, rec: &Incident) -> bool {
        self.status.map_or(true, |s| rec.status == s)
            && self.risk.map_or(true, |r| rec.risk_level == r)
    }
}

pub fn filter_by_status_risk(records: &[Incident], filter: StatusRiskFilter) -> Vec<Incident> {
    records
        .iter()
        .filter(|rec| filter.matches(rec))
        .cloned()
        .collect()
}

/// Records created strictly after the session anchor, used to highlight
/// incidents reported since the viewer opened the application
pub fn session_recent(records: &[Incident], anchor: DateTime<Utc>) -> Vec<Incident> {
    records
        .iter()
        .filter(|rec| rec.created_at > anchor)
        .cloned()
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IncidentStats {
    pub total: usize,
    pub active: usize,
    pub resolved: usize,
    pub today: usize,
}

/// Aggregate counts over an already-filtered set. "Today" compares local
/// calendar dates at the evaluation instant.
pub fn compute_stats(records: &[Incident], now: DateTime<Utc>) -> IncidentStats {
    let today = now.with_timezone(&Local).date_naive();
    IncidentStats {
        total: records.len(),
        active: records.iter().filter(|r| r.status.is_active()).count(),
        resolved: records
            .iter()
            .filter(|r| r.status == IncidentStatus::Resolved)
            .count(),
        today: records
            .iter()
            .filter(|r| r.created_at.with_timezone(&Local).date_naive() == today)
            .count(),
    }
}
