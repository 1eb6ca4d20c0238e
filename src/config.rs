use chrono_tz::Tz;
use config::{Config, Environment};
use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    pub database_url: Option<String>,
    pub database_path: Option<String>,

    /// Reference timezone for daily bucketing (chrono-tz name).
    /// Fixed at startup; never the host-local zone.
    #[serde(default = "default_timezone")]
    pub timezone: String,

    #[serde(default = "default_admin_username")]
    pub admin_username: String,

    #[serde(default)]
    pub admin_password: String,

    /// HMAC secret for the session cookie. When unset a random secret is
    /// generated at startup and sessions do not survive a restart.
    pub session_secret: Option<String>,

    #[serde(default = "default_session_days")]
    pub session_days: u32,

    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    #[serde(default = "default_db_acquire_timeout")]
    pub db_acquire_timeout_secs: u64,

    #[serde(default = "default_visitor_list_limit")]
    pub visitor_list_limit: i64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_admin_username() -> String {
    "admin".to_string()
}

fn default_session_days() -> u32 {
    7
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_db_acquire_timeout() -> u64 {
    5
}

fn default_visitor_list_limit() -> i64 {
    300
}

impl Settings {
    pub fn new() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let config = Config::builder()
            .add_source(
                Environment::with_prefix("PIXELLOG")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Parse the configured timezone name into a chrono-tz `Tz`.
    pub fn reference_timezone(&self) -> Result<Tz> {
        self.timezone
            .parse()
            .map_err(|_| Error::Timezone(self.timezone.clone()))
    }

    /// Parse the configured bind address. A host that does not parse is a
    /// startup error; it never falls back to binding all interfaces.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self.host.parse().map_err(|_| {
            Error::Config(config::ConfigError::Message(format!(
                "invalid bind host: {}",
                self.host
            )))
        })?;
        Ok(SocketAddr::new(ip, self.port))
    }

    pub fn database_url(&self) -> String {
        self.database_url
            .clone()
            .or_else(|| {
                self.database_path
                    .as_ref()
                    .map(|p| format!("sqlite:{}", p))
            })
            .unwrap_or_else(|| "sqlite:pixellog.db?mode=rwc".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_settings() -> Settings {
        Settings {
            host: "127.0.0.1".to_string(),
            port: 3000,
            database_url: None,
            database_path: Some("test.db".to_string()),
            timezone: "America/New_York".to_string(),
            admin_username: "admin".to_string(),
            admin_password: "hunter2".to_string(),
            session_secret: Some("secret".to_string()),
            session_days: 7,
            db_max_connections: 10,
            db_acquire_timeout_secs: 5,
            visitor_list_limit: 300,
        }
    }

    #[test]
    fn test_default_host() {
        assert_eq!(default_host(), "0.0.0.0");
    }

    #[test]
    fn test_default_port() {
        assert_eq!(default_port(), 8080);
    }

    #[test]
    fn test_default_timezone_is_utc() {
        assert_eq!(default_timezone(), "UTC");
    }

    #[test]
    fn test_default_session_days() {
        assert_eq!(default_session_days(), 7);
    }

    #[test]
    fn test_reference_timezone_parses() {
        let settings = test_settings();
        let tz = settings.reference_timezone().unwrap();
        assert_eq!(tz, chrono_tz::America::New_York);
    }

    #[test]
    fn test_reference_timezone_rejects_unknown() {
        let mut settings = test_settings();
        settings.timezone = "Mars/Olympus".to_string();
        assert!(settings.reference_timezone().is_err());
    }

    #[test]
    fn test_bind_addr_parses_host_and_port() {
        let settings = test_settings();
        let addr = settings.bind_addr().unwrap();
        assert_eq!(addr.to_string(), "127.0.0.1:3000");
    }

    #[test]
    fn test_bind_addr_rejects_bad_host() {
        let mut settings = test_settings();
        settings.host = "0.0.0,0".to_string();
        assert!(settings.bind_addr().is_err());
    }

    #[test]
    fn test_database_url_from_path() {
        let settings = test_settings();
        assert_eq!(settings.database_url(), "sqlite:test.db");
    }

    #[test]
    fn test_database_url_prefers_explicit_url() {
        let mut settings = test_settings();
        settings.database_url = Some("sqlite::memory:".to_string());
        assert_eq!(settings.database_url(), "sqlite::memory:");
    }

    #[test]
    fn test_database_url_fallback() {
        let mut settings = test_settings();
        settings.database_url = None;
        settings.database_path = None;
        assert_eq!(settings.database_url(), "sqlite:pixellog.db?mode=rwc");
    }
}
