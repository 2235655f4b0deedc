use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::symbol::normalize_symbol;

/// Quote snapshot for one symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub last: f64,
    pub prev_close: f64,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub volume: u64,
    pub change: f64,
    pub change_percentage: f64,
    /// Market capitalization in millions of USD
    pub market_cap: Option<f64>,
}

impl Quote {
    /// Build a quote, normalizing the symbol and deriving the change fields.
    pub fn new(
        symbol: &str,
        last: f64,
        prev_close: f64,
        bid: Option<f64>,
        ask: Option<f64>,
        volume: u64,
    ) -> Self {
        let change = last - prev_close;
        let change_percentage = if prev_close != 0.0 {
            change / prev_close * 100.0
        } else {
            0.0
        };

        Self {
            symbol: normalize_symbol(symbol),
            last,
            prev_close,
            bid,
            ask,
            volume,
            change,
            change_percentage,
            market_cap: None,
        }
    }

    pub fn with_market_cap(mut self, market_cap: Option<f64>) -> Self {
        self.market_cap = market_cap;
        self
    }

    /// Provider-reported bid/ask, if both sides are usable.
    pub fn bid_ask(&self) -> Option<BidAsk> {
        BidAsk::new(self.bid?, self.ask?)
    }
}

/// Prevailing bid/ask pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BidAsk {
    pub bid: f64,
    pub ask: f64,
}

impl BidAsk {
    /// Returns `None` unless both sides are positive and not crossed.
    pub fn new(bid: f64, ask: f64) -> Option<Self> {
        if bid > 0.0 && ask > 0.0 && bid <= ask && bid.is_finite() && ask.is_finite() {
            Some(Self { bid, ask })
        } else {
            None
        }
    }

    /// Synthetic spread of `last * (1 -/+ half_spread)`.
    pub fn synthetic(last: f64, half_spread: f64) -> Option<Self> {
        if last <= 0.0 {
            return None;
        }
        Self::new(last * (1.0 - half_spread), last * (1.0 + half_spread))
    }
}

/// A trade print or an aggregated bar. For ticks `close` is the trade price
/// and `volume` the trade size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeBar {
    pub timestamp: DateTime<Utc>,
    pub close: f64,
    pub volume: u64,
}

impl TradeBar {
    pub fn new(timestamp: DateTime<Utc>, close: f64, volume: u64) -> Self {
        Self {
            timestamp,
            close,
            volume,
        }
    }
}

/// News article as returned by a news provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsArticle {
    pub id: String,
    pub headline: String,
    pub summary: String,
    pub symbols: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl NewsArticle {
    /// Text fed to the sentiment model.
    pub fn text(&self) -> String {
        format!("{} {}", self.headline, self.summary)
    }
}

/// Short-term price direction from a moving-average crossover
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trend {
    Down,
    Flat,
    Up,
}

/// Which rung of the degradation ladder produced a split
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassificationTier {
    /// Per-trade classification of tick data
    TickLevel,
    /// Per-bar classification of aggregated bars
    BarLevel,
    /// Trend-skewed split of the reported total volume
    TrendOnly,
}

/// Buyer- vs seller-initiated volume for one symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeSplit {
    pub buy_volume: u64,
    pub sell_volume: u64,
    pub tier: ClassificationTier,
}

impl VolumeSplit {
    pub fn new(buy_volume: u64, sell_volume: u64, tier: ClassificationTier) -> Self {
        Self {
            buy_volume,
            sell_volume,
            tier,
        }
    }

    pub fn total(&self) -> u64 {
        self.buy_volume + self.sell_volume
    }

    /// Buy share of the total (0.5 for an empty split).
    pub fn buy_ratio(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.5
        } else {
            self.buy_volume as f64 / total as f64
        }
    }
}

/// Regular session of one trading date, in UTC
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketSession {
    pub date: NaiveDate,
    pub open: DateTime<Utc>,
    pub close: DateTime<Utc>,
}

impl MarketSession {
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.open && instant < self.close
    }
}

/// Half-open `[start, end)` time range used for upstream queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }
}

/// Bar size for bar queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Timeframe {
    Minute1,
    Minute5,
}
