use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    // Tradier (quotes)
    pub tradier_api_token: String,
    pub tradier_base_url: String,
    pub tradier_rate_limit: f64, // req/s

    // Alpaca (bars, trades, news)
    pub alpaca_api_key: String,
    pub alpaca_secret_key: String,
    pub alpaca_data_url: String,
    pub alpaca_rate_limit: f64, // req/s

    pub http_timeout_secs: u64,
    pub volume_cache_ttl_secs: u64, // clamped to 10-60 by the service
    pub market_timezone: String,
    pub max_concurrent_fetches: usize,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let first_of = |keys: &[&str]| keys.iter().find_map(|key| var(*key));

        let config = Self {
            tradier_api_token: var("TRADIER_API_TOKEN")
                .context("TRADIER_API_TOKEN not set")?,
            tradier_base_url: var("TRADIER_BASE_URL")
                .unwrap_or_else(|| "https://api.tradier.com/v1".to_string()),
            tradier_rate_limit: var("TRADIER_RATE_LIMIT")
                .unwrap_or_else(|| "2".to_string())
                .parse()
                .context("TRADIER_RATE_LIMIT must be a number")?,

            alpaca_api_key: first_of(&["ALPACA_API_KEY", "APCA_API_KEY_ID"])
                .context("ALPACA_API_KEY not set")?,
            alpaca_secret_key: first_of(&["ALPACA_SECRET_KEY", "APCA_API_SECRET_KEY"])
                .context("ALPACA_SECRET_KEY not set")?,
            alpaca_data_url: var("ALPACA_DATA_URL")
                .unwrap_or_else(|| "https://data.alpaca.markets".to_string()),
            alpaca_rate_limit: var("ALPACA_RATE_LIMIT")
                .unwrap_or_else(|| "3.33".to_string())
                .parse()
                .context("ALPACA_RATE_LIMIT must be a number")?,

            http_timeout_secs: var("HTTP_TIMEOUT_SECS")
                .unwrap_or_else(|| "10".to_string())
                .parse()?,
            volume_cache_ttl_secs: var("VOLUME_CACHE_TTL_SECS")
                .unwrap_or_else(|| "10".to_string())
                .parse()?,
            market_timezone: var("MARKET_TIMEZONE")
                .unwrap_or_else(|| "America/New_York".to_string()),
            max_concurrent_fetches: var("MAX_CONCURRENT_FETCHES")
                .unwrap_or_else(|| "8".to_string())
                .parse()?,
        };

        if !(config.tradier_rate_limit > 0.0 && config.alpaca_rate_limit > 0.0) {
            anyhow::bail!("rate limits must be positive");
        }

        Ok(config)
    }
}
