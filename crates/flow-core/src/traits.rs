use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{MarketDataError, NewsArticle, Quote, Timeframe, TradeBar};

/// Batched quote snapshots
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    async fn quotes(&self, symbols: &[String]) -> Result<Vec<Quote>, MarketDataError>;
}

/// Aggregated bars, oldest first
#[async_trait]
pub trait BarsProvider: Send + Sync {
    async fn bars(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<TradeBar>, MarketDataError>;
}

/// Tick-level trade prints, oldest first
#[async_trait]
pub trait TradesProvider: Send + Sync {
    async fn trades(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<TradeBar>, MarketDataError>;
}

/// One news query covering a whole symbol set
#[async_trait]
pub trait NewsProvider: Send + Sync {
    async fn news(
        &self,
        symbols: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<NewsArticle>, MarketDataError>;
}
