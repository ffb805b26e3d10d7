//! Application configuration loaded from environment variables.

use std::time::Duration;

use auth::AuthConfig;
use sales::SaleConfig;

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT` — `json` for JSON log lines (default: human-readable)
/// - `DATABASE_URL` — PostgreSQL connection string (unset: in-memory store)
/// - `DATABASE_MAX_CONNECTIONS` — pool size (default: `10`)
/// - `JWT_SECRET`, `JWT_ISSUER`, `JWT_AUDIENCE` — access token signing
/// - `ACCESS_TOKEN_TTL_MINUTES` — access token lifetime (default: `10080`)
/// - `REFRESH_TOKEN_TTL_DAYS` — refresh token lifetime (default: `7`)
/// - `SALE_TIMEOUT_MS` — per-attempt sale timeout (default: `5000`)
/// - `SALE_MAX_ATTEMPTS` — attempts on concurrent conflicts (default: `3`)
/// - `SEED_ADMIN_EMAIL`, `SEED_ADMIN_PASSWORD` — optional user created at startup
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_json: bool,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub jwt_secret: Option<String>,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    pub access_token_ttl_minutes: i64,
    pub refresh_token_ttl_days: i64,
    pub sale_timeout_ms: u64,
    pub sale_max_attempts: u32,
    pub seed_admin: Option<(String, String)>,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let seed_admin = match (var("SEED_ADMIN_EMAIL"), var("SEED_ADMIN_PASSWORD")) {
            (Some(email), Some(password)) => Some((email, password)),
            _ => None,
        };

        Self {
            host: var("HOST").unwrap_or(defaults.host),
            port: parsed("PORT").unwrap_or(defaults.port),
            log_level: var("RUST_LOG").unwrap_or(defaults.log_level),
            log_json: var("LOG_FORMAT").is_some_and(|f| f.eq_ignore_ascii_case("json")),
            database_url: var("DATABASE_URL"),
            database_max_connections: parsed("DATABASE_MAX_CONNECTIONS")
                .unwrap_or(defaults.database_max_connections),
            jwt_secret: var("JWT_SECRET"),
            jwt_issuer: var("JWT_ISSUER").unwrap_or(defaults.jwt_issuer),
            jwt_audience: var("JWT_AUDIENCE").unwrap_or(defaults.jwt_audience),
            access_token_ttl_minutes: parsed("ACCESS_TOKEN_TTL_MINUTES")
                .unwrap_or(defaults.access_token_ttl_minutes),
            refresh_token_ttl_days: parsed("REFRESH_TOKEN_TTL_DAYS")
                .unwrap_or(defaults.refresh_token_ttl_days),
            sale_timeout_ms: parsed("SALE_TIMEOUT_MS").unwrap_or(defaults.sale_timeout_ms),
            sale_max_attempts: parsed("SALE_MAX_ATTEMPTS").unwrap_or(defaults.sale_max_attempts),
            seed_admin,
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn auth_config(&self) -> AuthConfig {
        let defaults = AuthConfig::default();
        AuthConfig {
            jwt_secret: self.jwt_secret.clone().unwrap_or(defaults.jwt_secret),
            issuer: self.jwt_issuer.clone(),
            audience: self.jwt_audience.clone(),
            access_ttl: chrono::Duration::minutes(self.access_token_ttl_minutes),
            refresh_ttl: chrono::Duration::days(self.refresh_token_ttl_days),
        }
    }

    pub fn sale_config(&self) -> SaleConfig {
        SaleConfig {
            max_attempts: self.sale_max_attempts.max(1),
            timeout: Duration::from_millis(self.sale_timeout_ms),
            ..SaleConfig::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let auth = AuthConfig::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_json: false,
            database_url: None,
            database_max_connections: 10,
            jwt_secret: None,
            jwt_issuer: auth.issuer,
            jwt_audience: auth.audience,
            access_token_ttl_minutes: 7 * 24 * 60,
            refresh_token_ttl_days: 7,
            sale_timeout_ms: 5000,
            sale_max_attempts: 3,
            seed_admin: None,
        }
    }
}

fn var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    var(key).and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert!(config.database_url.is_none());
        assert_eq!(config.database_max_connections, 10);
        assert_eq!(config.access_token_ttl_minutes, 10080);
        assert_eq!(config.sale_max_attempts, 3);
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_token_lifetimes_default_to_seven_days() {
        let auth = Config::default().auth_config();
        assert_eq!(auth.access_ttl, chrono::Duration::days(7));
        assert_eq!(auth.refresh_ttl, chrono::Duration::days(7));
    }

    #[test]
    fn test_sale_config_never_drops_below_one_attempt() {
        let config = Config {
            sale_max_attempts: 0,
            sale_timeout_ms: 250,
            ..Config::default()
        };
        let sale = config.sale_config();
        assert_eq!(sale.max_attempts, 1);
        assert_eq!(sale.timeout, Duration::from_millis(250));
    }
}
