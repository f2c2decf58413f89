// src/config.rs

use std::env;
use std::fmt::Display;
use std::net::SocketAddr;
use std::ops::RangeInclusive;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_JWT_EXPIRATION_HOURS: i64 = 24;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_DB_ACQUIRE_TIMEOUT_SECS: u64 = 10;
const DEFAULT_CATALOG_CACHE_TTL_MINUTES: u64 = 5;
const DEFAULT_PUBLIC_BASE_URL: &str = "http://localhost:3000";
const DEFAULT_STATIC_DIR: &str = "static";

const JWT_EXPIRATION_HOURS_RANGE: RangeInclusive<i64> = 1..=24 * 365;
const CATALOG_CACHE_TTL_MINUTES_RANGE: RangeInclusive<u64> = 1..=24 * 60;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: '{value}'")]
    Invalid { name: &'static str, value: String },
}

/// Optional credentials used to create the first administrator.
#[derive(Debug, Clone)]
pub struct AdminBootstrap {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    pub jwt_expiration_hours: i64,
    pub db_max_connections: u32,
    pub db_acquire_timeout: Duration,
    pub catalog_cache_ttl_minutes: u64,
    pub whatsapp_number: String,
    pub public_base_url: String,
    pub static_dir: String,
    pub cors_allowed_origin: Option<String>,
    pub admin_bootstrap: Option<AdminBootstrap>,
}

impl AppConfig {
    /// Reads the process environment. Call `dotenvy::dotenv()` first to pick up `.env`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(name))
        };

        let admin_bootstrap = match (lookup("ADMIN_EMAIL"), lookup("ADMIN_PASSWORD")) {
            (Some(email), Some(password)) if !email.is_empty() && !password.is_empty() => {
                Some(AdminBootstrap { email, password })
            }
            _ => None,
        };

        Ok(AppConfig {
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            whatsapp_number: normalize_phone(&required("WHATSAPP_NUMBER")?),
            bind_addr: parse_or(&lookup, "BIND_ADDR", DEFAULT_BIND_ADDR.parse().ok())?,
            jwt_expiration_hours: parse_in_range(
                &lookup,
                "JWT_EXPIRATION_HOURS",
                DEFAULT_JWT_EXPIRATION_HOURS,
                JWT_EXPIRATION_HOURS_RANGE,
            )?,
            db_max_connections: parse_or(
                &lookup,
                "DB_MAX_CONNECTIONS",
                Some(DEFAULT_DB_MAX_CONNECTIONS),
            )?,
            db_acquire_timeout: Duration::from_secs(parse_or(
                &lookup,
                "DB_ACQUIRE_TIMEOUT_SECS",
                Some(DEFAULT_DB_ACQUIRE_TIMEOUT_SECS),
            )?),
            catalog_cache_ttl_minutes: parse_in_range(
                &lookup,
                "CATALOG_CACHE_TTL_MINUTES",
                DEFAULT_CATALOG_CACHE_TTL_MINUTES,
                CATALOG_CACHE_TTL_MINUTES_RANGE,
            )?,
            public_base_url: lookup("PUBLIC_BASE_URL")
                .unwrap_or_else(|| DEFAULT_PUBLIC_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            static_dir: lookup("STATIC_DIR").unwrap_or_else(|| DEFAULT_STATIC_DIR.to_string()),
            cors_allowed_origin: lookup("CORS_ALLOWED_ORIGIN").filter(|v| !v.is_empty()),
            admin_bootstrap,
        })
    }
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: Option<T>) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        Some(raw) => raw.trim().parse::<T>().map_err(|_| ConfigError::Invalid {
            name,
            value: raw,
        }),
        None => default.ok_or(ConfigError::Missing(name)),
    }
}

fn parse_in_range<F, T>(
    lookup: &F,
    name: &'static str,
    default: T,
    range: RangeInclusive<T>,
) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + PartialOrd + Display,
{
    let value = parse_or(lookup, name, Some(default))?;
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(ConfigError::Invalid {
            name,
            value: value.to_string(),
        })
    }
}

// wa.me expects digits only, no '+', spaces or dashes
fn normalize_phone(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    const REQUIRED: [(&str, &str); 3] = [
        ("DATABASE_URL", "postgres://localhost/coffee"),
        ("JWT_SECRET", "sekret"),
        ("WHATSAPP_NUMBER", "+57 300-123-4567"),
    ];

    #[test]
    fn defaults_apply_when_optional_vars_missing() {
        let config = AppConfig::from_lookup(lookup_from(&REQUIRED)).unwrap();
        assert_eq!(config.jwt_expiration_hours, 24);
        assert_eq!(config.db_max_connections, 5);
        assert_eq!(config.db_acquire_timeout, Duration::from_secs(10));
        assert_eq!(config.catalog_cache_ttl_minutes, 5);
        assert_eq!(config.bind_addr.port(), 3000);
        assert_eq!(config.whatsapp_number, "573001234567");
        assert!(config.admin_bootstrap.is_none());
    }

    #[test]
    fn missing_required_var_is_reported() {
        let err = AppConfig::from_lookup(lookup_from(&REQUIRED[..2])).unwrap_err();
        assert_eq!(err, ConfigError::Missing("WHATSAPP_NUMBER"));
    }

    #[test]
    fn invalid_number_is_rejected() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("DB_MAX_CONNECTIONS", "many"));
        let err = AppConfig::from_lookup(lookup_from(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "DB_MAX_CONNECTIONS", .. }));
    }

    #[test]
    fn out_of_range_durations_are_rejected() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("JWT_EXPIRATION_HOURS", "9223372036854775807"));
        let err = AppConfig::from_lookup(lookup_from(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "JWT_EXPIRATION_HOURS", .. }));

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("CATALOG_CACHE_TTL_MINUTES", "18446744073709551615"));
        let err = AppConfig::from_lookup(lookup_from(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "CATALOG_CACHE_TTL_MINUTES", .. }));

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("JWT_EXPIRATION_HOURS", "0"));
        assert!(AppConfig::from_lookup(lookup_from(&pairs)).is_err());

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("JWT_EXPIRATION_HOURS", "720"));
        pairs.push(("CATALOG_CACHE_TTL_MINUTES", "60"));
        let config = AppConfig::from_lookup(lookup_from(&pairs)).unwrap();
        assert_eq!(config.jwt_expiration_hours, 720);
        assert_eq!(config.catalog_cache_ttl_minutes, 60);
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("PUBLIC_BASE_URL", "https://cafe.example.co/"));
        pairs.push(("ADMIN_EMAIL", "admin@cafe.example.co"));
        pairs.push(("ADMIN_PASSWORD", "cambiar123"));
        let config = AppConfig::from_lookup(lookup_from(&pairs)).unwrap();
        assert_eq!(config.public_base_url, "https://cafe.example.co");
        assert!(config.admin_bootstrap.is_some());
    }
}
