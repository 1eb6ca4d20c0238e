use chrono::{DateTime, NaiveDate, Utc};
use std::time::Duration;

use crate::domain::{
    DailyCounter, EventId, NewVisitEvent, PageCount, ReferrerCount, Totals, VisitEvent, VisitorId,
};
use crate::error::{Error, Result};

pub type Pool = sqlx::SqlitePool;
pub type PoolOptions = sqlx::sqlite::SqlitePoolOptions;

const RESULTS_LIMIT: i64 = 300;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Create a pool with a bounded acquire wait so a saturated storage layer
/// surfaces as a `Storage` error instead of hanging the request.
pub async fn create_pool(url: &str, max_connections: u32, acquire_timeout: Duration) -> Result<Pool> {
    let pool = PoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(acquire_timeout)
        .connect(url)
        .await?;
    Ok(pool)
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    let sql = include_str!("../../migrations/sqlite/001_initial.sql");
    sqlx::raw_sql(sql).execute(pool).await?;
    Ok(())
}

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

// Event store. Rows are append-only: nothing here updates or deletes.

pub async fn insert_event(
    conn: &mut sqlx::SqliteConnection,
    event: &NewVisitEvent,
    visit_date: NaiveDate,
) -> Result<EventId> {
    sqlx::query(
        r#"INSERT INTO visitors (visitor_id, ip_address, user_agent, referrer, page_url,
           visit_date, visited_at)
           VALUES (?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(event.visitor_id.as_str())
    .bind(&event.ip_address)
    .bind(&event.user_agent)
    .bind(&event.referrer)
    .bind(&event.page_url)
    .bind(format_date(visit_date))
    .bind(event.visited_at.to_rfc3339())
    .execute(&mut *conn)
    .await?;

    let id: i64 = sqlx::query_scalar("SELECT last_insert_rowid()")
        .fetch_one(&mut *conn)
        .await?;

    Ok(EventId(id))
}

pub async fn count_events_on_date<'e, E>(executor: E, date: NaiveDate) -> Result<i64>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM visitors WHERE visit_date = ?")
        .bind(format_date(date))
        .fetch_one(executor)
        .await?;
    Ok(count)
}

pub async fn count_distinct_visitors_on_date<'e, E>(executor: E, date: NaiveDate) -> Result<i64>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(DISTINCT visitor_id) FROM visitors WHERE visit_date = ?")
            .bind(format_date(date))
            .fetch_one(executor)
            .await?;
    Ok(count)
}

pub async fn count_events_total<'e, E>(executor: E) -> Result<i64>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM visitors")
        .fetch_one(executor)
        .await?;
    Ok(count)
}

pub async fn count_distinct_visitors_total<'e, E>(executor: E) -> Result<i64>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let count: i64 = sqlx::query_scalar("SELECT COUNT(DISTINCT visitor_id) FROM visitors")
        .fetch_one(executor)
        .await?;
    Ok(count)
}

pub async fn has_visitor_visited_on_date<'e, E>(
    executor: E,
    visitor_id: &VisitorId,
    date: NaiveDate,
) -> Result<bool>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let exists: i64 = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM visitors WHERE visitor_id = ? AND visit_date = ?)",
    )
    .bind(visitor_id.as_str())
    .bind(format_date(date))
    .fetch_one(executor)
    .await?;
    Ok(exists != 0)
}

/// Raw event list, most recent first, bounded.
pub async fn list_events(pool: &Pool, limit: i64) -> Result<Vec<VisitEvent>> {
    let rows: Vec<VisitorRow> = sqlx::query_as(
        r#"SELECT id, visitor_id, ip_address, user_agent, referrer, page_url,
           visit_date, visited_at
           FROM visitors ORDER BY visited_at DESC, id DESC LIMIT ?"#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(VisitEvent::try_from).collect()
}

// Daily counters

/// Upsert the counter row for `date` within the caller's transaction.
/// A freshly created row starts at 1/1: the first event of a day is
/// definitionally unique that day. Totals are written as passed in,
/// recomputed by the caller from the event log.
pub async fn upsert_daily_counter(
    conn: &mut sqlx::SqliteConnection,
    date: NaiveDate,
    is_new_unique: bool,
    total_visits: i64,
    total_unique: i64,
) -> Result<DailyCounter> {
    sqlx::query(
        r#"INSERT INTO visit_counts (date, daily_visits, daily_unique, total_visits, total_unique)
           VALUES (?, 1, 1, ?, ?)
           ON CONFLICT(date) DO UPDATE SET
               daily_visits = daily_visits + 1,
               daily_unique = daily_unique + ?,
               total_visits = excluded.total_visits,
               total_unique = excluded.total_unique"#,
    )
    .bind(format_date(date))
    .bind(total_visits)
    .bind(total_unique)
    .bind(if is_new_unique { 1i64 } else { 0i64 })
    .execute(&mut *conn)
    .await?;

    let row: CounterRow = sqlx::query_as(
        r#"SELECT date, daily_visits, daily_unique, total_visits, total_unique
           FROM visit_counts WHERE date = ?"#,
    )
    .bind(format_date(date))
    .fetch_one(&mut *conn)
    .await?;

    row.try_into()
}

pub async fn get_daily_counter(pool: &Pool, date: NaiveDate) -> Result<Option<DailyCounter>> {
    let row: Option<CounterRow> = sqlx::query_as(
        r#"SELECT date, daily_visits, daily_unique, total_visits, total_unique
           FROM visit_counts WHERE date = ?"#,
    )
    .bind(format_date(date))
    .fetch_optional(pool)
    .await?;

    row.map(DailyCounter::try_from).transpose()
}

// Stats queries. Read-only projections for the dashboard; stale-by-one-write
// reads are acceptable, so none of these take a transaction.

/// Cumulative totals from the most recent counter row, or zeros when the
/// store is empty.
pub async fn get_totals(pool: &Pool) -> Result<Totals> {
    let row: Option<(i64, i64)> = sqlx::query_as(
        "SELECT total_visits, total_unique FROM visit_counts ORDER BY date DESC LIMIT 1",
    )
    .fetch_optional(pool)
    .await?;

    Ok(row
        .map(|(total_visits, total_unique)| Totals {
            total_visits,
            total_unique_visitors: total_unique,
        })
        .unwrap_or_default())
}

pub async fn get_daily_series(pool: &Pool) -> Result<Vec<DailyCounter>> {
    let rows: Vec<CounterRow> = sqlx::query_as(
        r#"SELECT date, daily_visits, daily_unique, total_visits, total_unique
           FROM visit_counts ORDER BY date DESC"#,
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(DailyCounter::try_from).collect()
}

pub async fn get_page_breakdown(pool: &Pool) -> Result<Vec<PageCount>> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        r#"SELECT page_url, COUNT(*) as views FROM visitors
           GROUP BY page_url ORDER BY views DESC, page_url LIMIT ?"#,
    )
    .bind(RESULTS_LIMIT)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(page, views)| PageCount { page, views })
        .collect())
}

pub async fn get_referrer_breakdown(pool: &Pool, limit: i64) -> Result<Vec<ReferrerCount>> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        r#"SELECT referrer, COUNT(*) as count FROM visitors
           WHERE referrer != ''
           GROUP BY referrer ORDER BY count DESC, referrer LIMIT ?"#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(referrer, count)| ReferrerCount { referrer, count })
        .collect())
}

// Row types for SQLx mapping (dates and timestamps stored as TEXT).
// Parse failures surface as decode errors rather than placeholder values
// so corrupted rows are visible.

fn decode_date(column: &str, text: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(text, DATE_FORMAT).map_err(|e| {
        Error::Storage(sqlx::Error::ColumnDecode {
            index: column.to_string(),
            source: Box::new(e),
        })
    })
}

fn decode_timestamp(column: &str, text: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| {
            Error::Storage(sqlx::Error::ColumnDecode {
                index: column.to_string(),
                source: Box::new(e),
            })
        })
}

#[derive(sqlx::FromRow)]
struct VisitorRow {
    id: i64,
    visitor_id: String,
    ip_address: String,
    user_agent: String,
    referrer: String,
    page_url: String,
    visit_date: String,
    visited_at: String,
}

impl TryFrom<VisitorRow> for VisitEvent {
    type Error = Error;

    fn try_from(row: VisitorRow) -> Result<Self> {
        Ok(Self {
            id: EventId(row.id),
            visitor_id: VisitorId::from(row.visitor_id),
            ip_address: row.ip_address,
            user_agent: row.user_agent,
            referrer: row.referrer,
            page_url: row.page_url,
            visit_date: decode_date("visit_date", &row.visit_date)?,
            visited_at: decode_timestamp("visited_at", &row.visited_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CounterRow {
    date: String,
    daily_visits: i64,
    daily_unique: i64,
    total_visits: i64,
    total_unique: i64,
}

impl TryFrom<CounterRow> for DailyCounter {
    type Error = Error;

    fn try_from(row: CounterRow) -> Result<Self> {
        Ok(Self {
            date: decode_date("date", &row.date)?,
            daily_visits: row.daily_visits,
            daily_unique: row.daily_unique,
            total_visits: row.total_visits,
            total_unique: row.total_unique,
        })
    }
}
