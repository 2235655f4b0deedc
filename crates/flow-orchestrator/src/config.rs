use std::time::Duration;
use trade_classifier::ClassifierConfig;

/// Bounds accepted for the buy/sell cache TTL.
const MIN_VOLUME_TTL: Duration = Duration::from_secs(10);
const MAX_VOLUME_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub quote_ttl: Duration,
    pub volume_ttl: Duration,
    /// Largest symbol list accepted per call
    pub max_symbols: usize,
    /// Per-symbol fetch tasks allowed in flight at once
    pub max_concurrent_fetches: usize,
    /// Half-width of the synthetic spread, as a fraction of last price
    pub synthetic_half_spread: f64,
    /// Length of the trade window
    pub lookback: chrono::Duration,
    /// How far behind real time the trade feed is
    pub reporting_delay: chrono::Duration,
    /// History used for the trend signal, ending at the window end
    pub trend_history: chrono::Duration,
    pub sentiment_window: chrono::Duration,
    pub max_articles: usize,
    pub classifier: ClassifierConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            quote_ttl: Duration::from_secs(10),
            volume_ttl: MIN_VOLUME_TTL,
            max_symbols: 50,
            max_concurrent_fetches: 8,
            synthetic_half_spread: 0.005,
            lookback: chrono::Duration::minutes(15),
            reporting_delay: chrono::Duration::minutes(30),
            trend_history: chrono::Duration::minutes(60),
            sentiment_window: chrono::Duration::days(7),
            max_articles: 10,
            classifier: ClassifierConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Buy/sell TTL, clamped to 10-60 s.
    pub fn with_volume_ttl(mut self, ttl: Duration) -> Self {
        self.volume_ttl = ttl.clamp(MIN_VOLUME_TTL, MAX_VOLUME_TTL);
        self
    }

    pub fn with_max_concurrent_fetches(mut self, permits: usize) -> Self {
        self.max_concurrent_fetches = permits.max(1);
        self
    }
}
