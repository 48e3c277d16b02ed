use std::{env, net::SocketAddr, time::Duration};

use url::Url;

use crate::error::AppError;

const DEFAULT_CORS_ORIGINS: &str = "http://localhost,http://localhost:5173";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub listen_addr: SocketAddr,
    pub session_ttl: chrono::Duration,
    pub cors_origins: Vec<String>,
    pub update_timeout: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://trips.db".to_string());
        let listen_addr: SocketAddr = env::var("APP_LISTEN_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8000".to_string())
            .parse()
            .map_err(|err| AppError::Config(format!("invalid APP_LISTEN_ADDR: {err}")))?;

        let ttl_hours: i64 = env::var("SESSION_TTL_HOURS")
            .unwrap_or_else(|_| "3".to_string())
            .parse()
            .map_err(|err| AppError::Config(format!("invalid SESSION_TTL_HOURS: {err}")))?;
        if ttl_hours <= 0 {
            return Err(AppError::Config(
                "SESSION_TTL_HOURS must be positive".to_string(),
            ));
        }

        let cors_origins = parse_origins(
            &env::var("CORS_ORIGINS").unwrap_or_else(|_| DEFAULT_CORS_ORIGINS.to_string()),
        )?;

        let timeout_ms: u64 = env::var("UPDATE_TIMEOUT_MS")
            .unwrap_or_else(|_| "5000".to_string())
            .parse()
            .map_err(|err| AppError::Config(format!("invalid UPDATE_TIMEOUT_MS: {err}")))?;

        Ok(Self {
            database_url,
            listen_addr,
            session_ttl: chrono::Duration::hours(ttl_hours),
            cors_origins,
            update_timeout: Duration::from_millis(timeout_ms),
        })
    }
}

/// Splits a comma-separated origin list. Each entry must be an absolute
/// http(s) URL; the trailing slash `Url` adds is stripped again so the value
/// matches the browser's `Origin` header.
pub fn parse_origins(raw: &str) -> Result<Vec<String>, AppError> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(|origin| {
            let url = Url::parse(origin)
                .map_err(|err| AppError::Config(format!("invalid CORS origin {origin}: {err}")))?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(AppError::Config(format!(
                    "CORS origin {origin} must be http or https"
                )));
            }
            Ok(url.origin().ascii_serialization())
        })
        .collect()
}
