use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use thiserror::Error;
use tracing::Level;

use crate::finnhub::QuoteConfig;

pub const DEFAULT_STARTING_CASH: Decimal = dec!(10000.00);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub database_path: PathBuf,
    pub session_db_path: PathBuf,
    pub frontend_url: String,
    pub starting_cash: Decimal,
    pub session_expiry: time::Duration,
    pub quotes: QuoteConfig,
}

impl AppConfig {
    /// Read configuration from the process environment, honouring a `.env` file.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let starting_cash = match lookup("STARTING_CASH") {
            Some(raw) => parse::<Decimal>("STARTING_CASH", &raw)?,
            None => DEFAULT_STARTING_CASH,
        };
        if starting_cash < Decimal::ZERO {
            return Err(ConfigError::Invalid {
                key: "STARTING_CASH",
                reason: "must not be negative".to_string(),
            });
        }

        let expiry_days: i64 = parse("SESSION_EXPIRY_DAYS", &get("SESSION_EXPIRY_DAYS", "7"))?;
        let timeout_secs: u64 = parse("QUOTE_TIMEOUT_SECS", &get("QUOTE_TIMEOUT_SECS", "5"))?;

        Ok(Self {
            bind_addr: parse("BIND_ADDR", &get("BIND_ADDR", "0.0.0.0:3000"))?,
            database_path: PathBuf::from(get("DATABASE_PATH", "finance.db")),
            session_db_path: PathBuf::from(get("SESSION_DB_PATH", "sessions.db")),
            frontend_url: get("FRONTEND_URL", "http://localhost:5173"),
            starting_cash,
            session_expiry: time::Duration::days(expiry_days),
            quotes: QuoteConfig {
                api_url: get("QUOTE_API_URL", "https://finnhub.io/api/v1"),
                api_key: lookup("FINNHUB_API_KEY").ok_or(ConfigError::Missing("FINNHUB_API_KEY"))?,
                timeout: std::time::Duration::from_secs(timeout_secs),
            },
        })
    }
}

fn parse<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        reason: e.to_string(),
    })
}

/// Log level chosen by the first command line argument; anything unknown means info.
pub fn log_level(arg: Option<&str>) -> Level {
    match arg {
        Some("debug") => Level::DEBUG,
        Some("warn") => Level::WARN,
        Some("error") => Level::ERROR,
        _ => Level::INFO,
    }
}
