use std::sync::Arc;

use chrono_tz::Tz;

use crate::config::Settings;
use crate::db::Pool;

#[derive(Clone)]
pub struct AppState {
    pub pool: Pool,
    pub settings: Arc<Settings>,
    /// Reference timezone for daily bucketing, parsed once at startup.
    pub tz: Tz,
    /// HMAC secret for session cookies (configured or generated at boot).
    pub session_secret: Arc<String>,
}

impl AppState {
    pub fn new(pool: Pool, settings: Settings, tz: Tz, session_secret: String) -> Self {
        Self {
            pool,
            settings: Arc::new(settings),
            tz,
            session_secret: Arc::new(session_secret),
        }
    }
}
