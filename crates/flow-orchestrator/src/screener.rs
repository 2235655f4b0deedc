use flow_core::{normalize_symbol, Quote};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// $2B and $10B, in millions
const SMALL_CAP_CEILING: f64 = 2_000.0;
const LARGE_CAP_FLOOR: f64 = 10_000.0;

/// Market-capitalization bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MarketCapFilter {
    #[default]
    Any,
    /// Below $2B
    Small,
    /// $2B to $10B inclusive
    Mid,
    /// Above $10B
    Large,
}

impl MarketCapFilter {
    pub fn label(&self) -> &'static str {
        match self {
            MarketCapFilter::Any => "Any",
            MarketCapFilter::Small => "< $2B",
            MarketCapFilter::Mid => "$2B - $10B",
            MarketCapFilter::Large => "> $10B",
        }
    }

    /// Accepts the display labels as well as `any`/`small`/`mid`/`large`.
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_lowercase().as_str() {
            "any" => Some(MarketCapFilter::Any),
            "< $2b" | "small" => Some(MarketCapFilter::Small),
            "$2b - $10b" | "mid" => Some(MarketCapFilter::Mid),
            "> $10b" | "large" => Some(MarketCapFilter::Large),
            _ => None,
        }
    }

    /// `market_cap` in millions. An unknown cap only passes `Any`.
    pub fn matches(&self, market_cap: Option<f64>) -> bool {
        match (self, market_cap) {
            (MarketCapFilter::Any, _) => true,
            (_, None) => false,
            (MarketCapFilter::Small, Some(cap)) => cap < SMALL_CAP_CEILING,
            (MarketCapFilter::Mid, Some(cap)) => (SMALL_CAP_CEILING..=LARGE_CAP_FLOOR).contains(&cap),
            (MarketCapFilter::Large, Some(cap)) => cap > LARGE_CAP_FLOOR,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenFilters {
    pub min_price: f64,
    pub max_price: f64,
    pub min_volume: u64,
    pub market_cap: MarketCapFilter,
}

impl Default for ScreenFilters {
    fn default() -> Self {
        Self {
            min_price: 0.0,
            max_price: f64::INFINITY,
            min_volume: 0,
            market_cap: MarketCapFilter::Any,
        }
    }
}

impl ScreenFilters {
    pub fn matches(&self, quote: &Quote) -> bool {
        quote.last >= self.min_price
            && quote.last <= self.max_price
            && quote.volume >= self.min_volume
            && self.market_cap.matches(quote.market_cap)
    }
}

/// Approximate market capitalizations in millions of USD, keyed by
/// normalized symbol.
#[derive(Debug, Clone)]
pub struct MarketCapTable {
    caps: HashMap<String, f64>,
}

impl Default for MarketCapTable {
    fn default() -> Self {
        let caps = [
            ("AAPL", 3_000_000.0),
            ("MSFT", 2_500_000.0),
            ("GOOGL", 1_800_000.0),
            ("AMZN", 1_700_000.0),
            ("TSLA", 800_000.0),
            ("NVDA", 600_000.0),
            ("JPM", 500_000.0),
            ("BAC", 300_000.0),
            ("WMT", 400_000.0),
            ("KO", 250_000.0),
        ]
        .iter()
        .map(|(s, c)| (s.to_string(), *c))
        .collect();

        Self { caps }
    }
}

impl MarketCapTable {
    pub fn empty() -> Self {
        Self {
            caps: HashMap::new(),
        }
    }

    pub fn with_cap(mut self, symbol: &str, millions: f64) -> Self {
        self.caps.insert(normalize_symbol(symbol), millions);
        self
    }

    pub fn get(&self, symbol: &str) -> Option<f64> {
        self.caps.get(symbol).copied()
    }
}
