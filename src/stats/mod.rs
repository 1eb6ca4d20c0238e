use axum::{extract::State, Json};
use serde::Serialize;

use crate::db;
use crate::domain::{DailyCounter, PageCount, ReferrerCount, VisitEvent};
use crate::state::AppState;
use crate::Result;

const REFERRER_LIMIT: i64 = 10;

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub total_visits: i64,
    pub total_unique_visitors: i64,
    pub daily_stats: Vec<DailyCounter>,
    pub page_stats: Vec<PageCount>,
    pub referrer_stats: Vec<ReferrerCount>,
}

#[derive(Debug, Serialize)]
pub struct VisitorsResponse {
    pub visitors: Vec<VisitEvent>,
}

/// GET /stats/api
pub async fn stats_handler(State(state): State<AppState>) -> Result<Json<StatsResponse>> {
    let totals = db::get_totals(&state.pool).await?;
    let daily_stats = db::get_daily_series(&state.pool).await?;
    let page_stats = db::get_page_breakdown(&state.pool).await?;
    let referrer_stats = db::get_referrer_breakdown(&state.pool, REFERRER_LIMIT).await?;

    Ok(Json(StatsResponse {
        total_visits: totals.total_visits,
        total_unique_visitors: totals.total_unique_visitors,
        daily_stats,
        page_stats,
        referrer_stats,
    }))
}

/// GET /stats/visitors
///
/// Raw event log, newest first, capped by `visitor_list_limit`.
pub async fn visitors_handler(State(state): State<AppState>) -> Result<Json<VisitorsResponse>> {
    let visitors = db::list_events(&state.pool, state.settings.visitor_list_limit).await?;
    Ok(Json(VisitorsResponse { visitors }))
}

/// GET /health
///
/// Liveness only; does not touch storage.
pub async fn health_handler() -> &'static str {
    "OK"
}
