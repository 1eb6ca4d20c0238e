use chrono_tz::Tz;
use tracing::debug;

use crate::db::{self, Pool};
use crate::domain::{DailyCounter, NewVisitEvent};
use crate::error::Result;

/// Append the event and update that day's counter as one atomic unit.
///
/// The uniqueness check, the append, and the counter upsert all run inside
/// a single transaction so two concurrent requests from the same visitor
/// cannot both be credited as the first visit of the day. Cumulative
/// totals are recomputed from the event log on every write rather than
/// carried incrementally, so the counter row can never drift from the
/// authoritative log.
pub async fn record_visit(pool: &Pool, tz: Tz, visit: NewVisitEvent) -> Result<DailyCounter> {
    let date = visit.visited_at.with_timezone(&tz).date_naive();

    // Take the write lock up front: a deferred transaction that reads then
    // writes can deadlock on lock upgrade when two writers race.
    let mut tx = pool.begin_with("BEGIN IMMEDIATE").await?;

    let seen_today = db::has_visitor_visited_on_date(&mut *tx, &visit.visitor_id, date).await?;
    let event_id = db::insert_event(&mut tx, &visit, date).await?;

    let total_visits = db::count_events_total(&mut *tx).await?;
    let total_unique = db::count_distinct_visitors_total(&mut *tx).await?;

    let counter =
        db::upsert_daily_counter(&mut tx, date, !seen_today, total_visits, total_unique).await?;

    tx.commit().await?;

    debug!(
        event_id = %event_id,
        date = %counter.date,
        daily_visits = counter.daily_visits,
        daily_unique = counter.daily_unique,
        "recorded visit"
    );

    Ok(counter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::VisitorId;
    use chrono::{TimeZone, Utc};
    use chrono_tz::Tz;
    use std::time::Duration;

    const TZ: Tz = chrono_tz::UTC;

    // Single connection: pooled `sqlite::memory:` databases are
    // per-connection.
    async fn test_pool() -> Pool {
        let pool = db::create_pool("sqlite::memory:", 1, Duration::from_secs(5))
            .await
            .unwrap();
        db::run_migrations(&pool).await.unwrap();
        pool
    }

    fn visit_at(ip: &str, ua: &str, y: i32, m: u32, d: u32, hour: u32) -> NewVisitEvent {
        NewVisitEvent {
            visitor_id: VisitorId::derive(ip, ua),
            ip_address: ip.to_string(),
            user_agent: ua.to_string(),
            referrer: String::new(),
            page_url: "/".to_string(),
            visited_at: Utc.with_ymd_and_hms(y, m, d, hour, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_first_visit_of_day_creates_counter_at_one_one() {
        let pool = test_pool().await;

        let counter = record_visit(&pool, TZ, visit_at("1.1.1.1", "ua", 2024, 6, 1, 10))
            .await
            .unwrap();

        assert_eq!(counter.daily_visits, 1);
        assert_eq!(counter.daily_unique, 1);
        assert_eq!(counter.total_visits, 1);
        assert_eq!(counter.total_unique, 1);
    }

    #[tokio::test]
    async fn test_repeat_visitor_same_day_not_double_credited() {
        let pool = test_pool().await;

        record_visit(&pool, TZ, visit_at("1.1.1.1", "ua", 2024, 6, 1, 9))
            .await
            .unwrap();
        let counter = record_visit(&pool, TZ, visit_at("1.1.1.1", "ua", 2024, 6, 1, 17))
            .await
            .unwrap();

        assert_eq!(counter.daily_visits, 2);
        assert_eq!(counter.daily_unique, 1);
        assert_eq!(counter.total_visits, 2);
        assert_eq!(counter.total_unique, 1);
    }

    #[tokio::test]
    async fn test_three_visits_two_visitors() {
        let pool = test_pool().await;

        record_visit(&pool, TZ, visit_at("1.1.1.1", "firefox", 2024, 6, 1, 9))
            .await
            .unwrap();
        record_visit(&pool, TZ, visit_at("1.1.1.1", "firefox", 2024, 6, 1, 12))
            .await
            .unwrap();
        let counter = record_visit(&pool, TZ, visit_at("2.2.2.2", "chrome", 2024, 6, 1, 15))
            .await
            .unwrap();

        assert_eq!(counter.daily_visits, 3);
        assert_eq!(counter.daily_unique, 2);
    }

    #[tokio::test]
    async fn test_unique_never_exceeds_visits() {
        let pool = test_pool().await;

        let ips = ["1.1.1.1", "1.1.1.1", "2.2.2.2", "3.3.3.3", "2.2.2.2"];
        for (i, ip) in ips.iter().enumerate() {
            let counter = record_visit(&pool, TZ, visit_at(ip, "ua", 2024, 6, 1, i as u32))
                .await
                .unwrap();
            assert!(counter.daily_unique <= counter.daily_visits);
            assert!(counter.total_unique <= counter.total_visits);
        }
    }

    #[tokio::test]
    async fn test_next_day_leaves_previous_counter_untouched() {
        let pool = test_pool().await;

        record_visit(&pool, TZ, visit_at("1.1.1.1", "ua", 2024, 6, 1, 9))
            .await
            .unwrap();
        record_visit(&pool, TZ, visit_at("2.2.2.2", "ua", 2024, 6, 1, 10))
            .await
            .unwrap();

        let day1 = chrono::NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let before = db::get_daily_counter(&pool, day1).await.unwrap().unwrap();

        let day2_counter = record_visit(&pool, TZ, visit_at("1.1.1.1", "ua", 2024, 6, 2, 9))
            .await
            .unwrap();

        let after = db::get_daily_counter(&pool, day1).await.unwrap().unwrap();
        assert_eq!(before, after, "day D row frozen after D+1 writes");

        // totals monotonically non-decreasing in date order
        assert!(day2_counter.total_visits >= after.total_visits);
        assert_eq!(day2_counter.daily_visits, 1);
        assert_eq!(
            day2_counter.daily_unique, 1,
            "a returning visitor is new again for the new day"
        );
        assert_eq!(day2_counter.total_visits, 3);
        assert_eq!(day2_counter.total_unique, 2);
    }

    #[tokio::test]
    async fn test_daily_visits_matches_event_count() {
        let pool = test_pool().await;

        for hour in 0..4 {
            record_visit(&pool, TZ, visit_at("9.9.9.9", "ua", 2024, 6, 1, hour))
                .await
                .unwrap();
        }

        let date = chrono::NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let counter = db::get_daily_counter(&pool, date).await.unwrap().unwrap();
        let events = db::count_events_on_date(&pool, date).await.unwrap();
        assert_eq!(counter.daily_visits, events);
    }

    #[tokio::test]
    async fn test_date_bucketing_follows_reference_timezone() {
        let pool = test_pool().await;
        let tz: Tz = chrono_tz::America::New_York;

        // 2024-06-02 03:00 UTC is still 2024-06-01 in New York
        record_visit(&pool, tz, visit_at("1.1.1.1", "ua", 2024, 6, 2, 3))
            .await
            .unwrap();

        let june1 = chrono::NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let june2 = chrono::NaiveDate::from_ymd_opt(2024, 6, 2).unwrap();
        assert!(db::get_daily_counter(&pool, june1).await.unwrap().is_some());
        assert!(db::get_daily_counter(&pool, june2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_same_visitor_single_unique_credit() {
        // File-backed database so concurrent writers really contend.
        let dir = tempfile::tempdir().unwrap();
        let url = format!(
            "sqlite:{}?mode=rwc",
            dir.path().join("visits.db").display()
        );
        let pool = db::create_pool(&url, 5, Duration::from_secs(5))
            .await
            .unwrap();
        db::run_migrations(&pool).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let pool = pool.clone();
            handles.push(tokio::spawn(async move {
                record_visit(&pool, TZ, visit_at("1.1.1.1", "ua", 2024, 6, 1, 12)).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let date = chrono::NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let counter = db::get_daily_counter(&pool, date).await.unwrap().unwrap();
        assert_eq!(counter.daily_visits, 8);
        assert_eq!(counter.daily_unique, 1, "no double-credit under concurrency");
    }
}
