use async_trait::async_trait;
use flow_core::{MarketDataError, Quote, QuoteProvider};
use serde::Deserialize;
use std::sync::Arc;

use crate::client::ResilientApiClient;

pub const UPSTREAM: &str = "tradier";
const DEFAULT_BASE_URL: &str = "https://api.tradier.com/v1";

/// Headers Tradier expects on every call.
pub fn auth_headers(token: &str) -> Vec<(String, String)> {
    vec![
        ("Authorization".to_string(), format!("Bearer {}", token)),
        ("Accept".to_string(), "application/json".to_string()),
    ]
}

/// Quote snapshots from Tradier's `/markets/quotes`.
#[derive(Clone)]
pub struct TradierClient {
    api: Arc<ResilientApiClient>,
    base_url: String,
}

impl TradierClient {
    /// `api` must have the `tradier` upstream registered.
    pub fn new(api: Arc<ResilientApiClient>) -> Self {
        Self::with_base_url(api, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api: Arc<ResilientApiClient>, base_url: &str) -> Self {
        Self {
            api,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl QuoteProvider for TradierClient {
    async fn quotes(&self, symbols: &[String]) -> Result<Vec<Quote>, MarketDataError> {
        if symbols.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/markets/quotes", self.base_url);
        let body = self
            .api
            .request(UPSTREAM, &url, &[("symbols", symbols.join(","))])
            .await?;

        let quotes = parse_quotes(body)?;
        tracing::debug!("Tradier returned {} quotes for {} symbols", quotes.len(), symbols.len());
        Ok(quotes)
    }
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct QuotesEnvelope {
    quotes: Option<QuotesBody>,
}

#[derive(Debug, Deserialize)]
struct QuotesBody {
    quote: Option<OneOrMany<TradierQuote>>,
}

/// Tradier sends a bare object for a single symbol and an array otherwise.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(item) => vec![item],
            OneOrMany::Many(items) => items,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TradierQuote {
    symbol: String,
    last: Option<f64>,
    prevclose: Option<f64>,
    bid: Option<f64>,
    ask: Option<f64>,
    volume: Option<f64>,
}

fn parse_quotes(body: serde_json::Value) -> Result<Vec<Quote>, MarketDataError> {
    let envelope: QuotesEnvelope = serde_json::from_value(body)
        .map_err(|e| MarketDataError::Decode(format!("tradier quotes: {}", e)))?;

    let raw = envelope
        .quotes
        .and_then(|q| q.quote)
        .map(OneOrMany::into_vec)
        .unwrap_or_default();

    if raw.is_empty() {
        return Err(MarketDataError::NoData("tradier returned no quotes".to_string()));
    }

    Ok(raw
        .into_iter()
        .map(|q| {
            let last = q.last.unwrap_or(0.0);
            Quote::new(
                &q.symbol,
                last,
                q.prevclose.unwrap_or(last),
                q.bid.filter(|b| *b > 0.0),
                q.ask.filter(|a| *a > 0.0),
                q.volume.unwrap_or(0.0).max(0.0) as u64,
            )
        })
        .collect())
}
