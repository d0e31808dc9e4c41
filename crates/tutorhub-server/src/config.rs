//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use rust_decimal::Decimal;

use tutorhub_shared::constants::{
    DEFAULT_HTTP_PORT, MAX_ATTACHMENT_SIZE, OFFERING_CACHE_TTL_SECS,
};
use tutorhub_shared::money::default_fee_rate;

/// Server configuration.
#[derive(Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) API server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// SQLite database file.
    /// Env: `DATABASE_PATH`
    /// Default: none (the platform data directory is used).
    pub database_path: Option<PathBuf>,

    /// Filesystem path where uploaded attachments are stored.
    /// Env: `BLOB_STORAGE_PATH`
    /// Default: `./uploads`
    pub blob_storage_path: PathBuf,

    /// Maximum size of one uploaded file in bytes (10 MiB).
    pub max_attachment_size: u64,

    /// Platform commission as a fraction of the budget.
    /// Env: `PLATFORM_FEE_RATE` (between 0 and 1)
    /// Default: `0.10`
    pub fee_rate: Decimal,

    /// Lifetime of a cached offering page.
    /// Env: `CACHE_TTL_SECS`
    /// Default: `300`
    pub cache_ttl: Duration,

    /// Root of the links placed in notifications.
    /// Env: `PUBLIC_BASE_URL`
    /// Default: `http://localhost:8080`
    pub public_base_url: String,

    /// Bearer token for the internal settlement endpoint.
    /// Env: `SETTLEMENT_TOKEN`
    /// Default: empty (endpoint disabled).
    pub settlement_token: Option<String>,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("http_addr", &self.http_addr)
            .field("database_path", &self.database_path)
            .field("blob_storage_path", &self.blob_storage_path)
            .field("max_attachment_size", &self.max_attachment_size)
            .field("fee_rate", &self.fee_rate)
            .field("cache_ttl", &self.cache_ttl)
            .field("public_base_url", &self.public_base_url)
            .field(
                "settlement_token",
                &self.settlement_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            database_path: None,
            blob_storage_path: PathBuf::from("./uploads"),
            max_attachment_size: MAX_ATTACHMENT_SIZE,
            fee_rate: default_fee_rate(),
            cache_ttl: Duration::from_secs(OFFERING_CACHE_TTL_SECS),
            public_base_url: format!("http://localhost:{DEFAULT_HTTP_PORT}"),
            settlement_token: None,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from any key lookup.  Invalid values are logged
    /// and the default is kept.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = lookup("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(
                    value = %addr,
                    "Invalid HTTP_ADDR, using default"
                );
            }
        }

        if let Some(path) = lookup("DATABASE_PATH") {
            if !path.is_empty() {
                config.database_path = Some(PathBuf::from(path));
            }
        }

        if let Some(path) = lookup("BLOB_STORAGE_PATH") {
            config.blob_storage_path = PathBuf::from(path);
        }

        if let Some(val) = lookup("PLATFORM_FEE_RATE") {
            match parse_fee_rate(&val) {
                Ok(rate) => config.fee_rate = rate,
                Err(e) => {
                    tracing::warn!(
                        value = %val,
                        error = %e,
                        "Invalid PLATFORM_FEE_RATE, using default"
                    );
                }
            }
        }

        if let Some(val) = lookup("CACHE_TTL_SECS") {
            if let Ok(secs) = val.parse::<u64>() {
                config.cache_ttl = Duration::from_secs(secs);
            } else {
                tracing::warn!(value = %val, "Invalid CACHE_TTL_SECS, using default");
            }
        }

        if let Some(url) = lookup("PUBLIC_BASE_URL") {
            if !url.is_empty() {
                config.public_base_url = url.trim_end_matches('/').to_string();
            }
        }

        if let Some(token) = lookup("SETTLEMENT_TOKEN") {
            if !token.is_empty() {
                config.settlement_token = Some(token);
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}

/// Parse a commission fraction in `[0, 1]`.
fn parse_fee_rate(raw: &str) -> Result<Decimal, String> {
    let rate: Decimal = raw
        .trim()
        .parse()
        .map_err(|e| format!("not a decimal: {e}"))?;
    if rate < Decimal::ZERO || rate > Decimal::ONE {
        return Err(format!("{rate} is outside 0..=1"));
    }
    Ok(rate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn from_map(vars: &[(&str, &str)]) -> ServerConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 8080).into());
        assert_eq!(config.fee_rate, dec!(0.10));
        assert_eq!(config.cache_ttl, Duration::from_secs(300));
        assert!(config.settlement_token.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = from_map(&[
            ("HTTP_ADDR", "127.0.0.1:9000"),
            ("PLATFORM_FEE_RATE", "0.15"),
            ("CACHE_TTL_SECS", "60"),
            ("PUBLIC_BASE_URL", "https://tutorhub.test/"),
            ("SETTLEMENT_TOKEN", "s3cret"),
        ]);
        assert_eq!(config.http_addr, ([127, 0, 0, 1], 9000).into());
        assert_eq!(config.fee_rate, dec!(0.15));
        assert_eq!(config.cache_ttl, Duration::from_secs(60));
        assert_eq!(config.public_base_url, "https://tutorhub.test");
        assert_eq!(config.settlement_token.as_deref(), Some("s3cret"));
    }

    #[test]
    fn test_invalid_values_keep_defaults() {
        let config = from_map(&[
            ("HTTP_ADDR", "not-an-addr"),
            ("PLATFORM_FEE_RATE", "1.5"),
            ("CACHE_TTL_SECS", "-1"),
            ("SETTLEMENT_TOKEN", ""),
        ]);
        assert_eq!(config.http_addr, ServerConfig::default().http_addr);
        assert_eq!(config.fee_rate, dec!(0.10));
        assert_eq!(config.cache_ttl, Duration::from_secs(300));
        assert!(config.settlement_token.is_none());
    }

    #[test]
    fn test_settlement_token_is_redacted() {
        let config = from_map(&[("SETTLEMENT_TOKEN", "s3cret")]);
        assert!(!format!("{config:?}").contains("s3cret"));
    }
}
