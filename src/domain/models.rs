use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::types::{EventId, VisitorId};

/// One tracked page view. Immutable once appended; the core never updates
/// or deletes rows in the event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisitEvent {
    pub id: EventId,
    pub visitor_id: VisitorId,
    pub ip_address: String,
    pub user_agent: String,
    pub referrer: String,
    pub page_url: String,
    /// Calendar day in the configured reference timezone.
    pub visit_date: NaiveDate,
    pub visited_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewVisitEvent {
    pub visitor_id: VisitorId,
    pub ip_address: String,
    pub user_agent: String,
    pub referrer: String,
    pub page_url: String,
    pub visited_at: DateTime<Utc>,
}

/// Aggregate row for one calendar day. `daily_*` cover that date only;
/// `total_*` are cumulative as of the row's last update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyCounter {
    pub date: NaiveDate,
    pub daily_visits: i64,
    pub daily_unique: i64,
    pub total_visits: i64,
    pub total_unique: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub total_visits: i64,
    pub total_unique_visitors: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PageCount {
    pub page: String,
    pub views: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReferrerCount {
    pub referrer: String,
    pub count: i64,
}
