use axum::{
    extract::{rejection::QueryRejection, ConnectInfo, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::Deserialize;
use std::net::SocketAddr;
use tracing::{debug, error};

use crate::domain::{NewVisitEvent, VisitorId};
use crate::privacy::{get_client_ip, get_referrer, get_user_agent};
use crate::state::AppState;

use super::record_visit;

// 1x1 transparent GIF
const PIXEL_GIF: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0xff, 0x00, 0xff, 0xff, 0xff,
    0x00, 0x00, 0x00, 0x21, 0xf9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00, 0x00, 0x00,
    0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x44, 0x01, 0x00, 0x3b,
];

#[derive(Debug, Deserialize)]
pub struct TrackQuery {
    pub page: Option<String>,
}

fn coerce_page(page: Option<String>) -> String {
    page.map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

/// GET /track?page=<string>
///
/// Always answers 200 with the pixel, even when the write fails; failures
/// are visible server-side only. The query extractor is fallible so a
/// malformed query string (duplicate keys, stray pairs) coerces to the
/// unknown page instead of rejecting the request.
pub async fn pixel_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    query: Result<Query<TrackQuery>, QueryRejection>,
    headers: HeaderMap,
) -> Response {
    let page = coerce_page(query.ok().and_then(|Query(q)| q.page));
    let ip = get_client_ip(&headers, Some(peer));
    let user_agent = get_user_agent(&headers);
    let referrer = get_referrer(&headers);

    debug!(page = %page, "tracking request");

    let visit = NewVisitEvent {
        visitor_id: VisitorId::derive(&ip, &user_agent),
        ip_address: ip,
        user_agent,
        referrer,
        page_url: page,
        visited_at: Utc::now(),
    };

    if let Err(e) = record_visit(&state.pool, state.tz, visit).await {
        error!("Failed to record visit: {}", e);
    }

    pixel_response()
}

fn pixel_response() -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "image/gif"),
            (header::CACHE_CONTROL, "no-cache, no-store, must-revalidate"),
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
        ],
        PIXEL_GIF,
    )
        .into_response()
}
