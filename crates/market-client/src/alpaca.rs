use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use flow_core::{
    normalize_symbol, BarsProvider, MarketDataError, NewsArticle, NewsProvider, Timeframe,
    TradeBar, TradesProvider,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::client::ResilientApiClient;

pub const UPSTREAM: &str = "alpaca";
const DEFAULT_DATA_URL: &str = "https://data.alpaca.markets";
const PAGE_LIMIT: usize = 10_000;

pub fn auth_headers(key_id: &str, secret_key: &str) -> Vec<(String, String)> {
    vec![
        ("APCA-API-KEY-ID".to_string(), key_id.to_string()),
        ("APCA-API-SECRET-KEY".to_string(), secret_key.to_string()),
    ]
}

/// Alpaca market-data v2 (bars, trades) and v1beta1 news.
///
/// Only the first page of each response is read; `next_page_token` is ignored.
#[derive(Clone)]
pub struct AlpacaClient {
    api: Arc<ResilientApiClient>,
    data_url: String,
}

impl AlpacaClient {
    /// `api` must have the `alpaca` upstream registered.
    pub fn new(api: Arc<ResilientApiClient>) -> Self {
        Self::with_data_url(api, DEFAULT_DATA_URL)
    }

    pub fn with_data_url(api: Arc<ResilientApiClient>, data_url: &str) -> Self {
        Self {
            api,
            data_url: data_url.trim_end_matches('/').to_string(),
        }
    }
}

fn timeframe_param(timeframe: Timeframe) -> &'static str {
    match timeframe {
        Timeframe::Minute1 => "1Min",
        Timeframe::Minute5 => "5Min",
    }
}

fn rfc3339(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[async_trait]
impl BarsProvider for AlpacaClient {
    async fn bars(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<TradeBar>, MarketDataError> {
        let url = format!("{}/v2/stocks/{}/bars", self.data_url, symbol);
        let body = self
            .api
            .request(
                UPSTREAM,
                &url,
                &[
                    ("timeframe", timeframe_param(timeframe).to_string()),
                    ("start", rfc3339(start)),
                    ("end", rfc3339(end)),
                    ("limit", PAGE_LIMIT.to_string()),
                ],
            )
            .await?;

        parse_bars(body)
    }
}

#[async_trait]
impl TradesProvider for AlpacaClient {
    async fn trades(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<TradeBar>, MarketDataError> {
        let url = format!("{}/v2/stocks/{}/trades", self.data_url, symbol);
        let body = self
            .api
            .request(
                UPSTREAM,
                &url,
                &[
                    ("start", rfc3339(start)),
                    ("end", rfc3339(end)),
                    ("limit", PAGE_LIMIT.to_string()),
                ],
            )
            .await?;

        parse_trades(body)
    }
}

#[async_trait]
impl NewsProvider for AlpacaClient {
    async fn news(
        &self,
        symbols: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<NewsArticle>, MarketDataError> {
        if symbols.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/v1beta1/news", self.data_url);
        let body = self
            .api
            .request(
                UPSTREAM,
                &url,
                &[
                    ("symbols", symbols.join(",")),
                    ("start", rfc3339(start)),
                    ("end", rfc3339(end)),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;

        parse_news(body)
    }
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct BarsResponse {
    #[serde(default)]
    bars: Option<Vec<AlpacaBar>>,
}

#[derive(Debug, Deserialize)]
struct AlpacaBar {
    t: DateTime<Utc>,
    c: f64,
    v: f64,
}

#[derive(Debug, Deserialize)]
struct TradesResponse {
    #[serde(default)]
    trades: Option<Vec<AlpacaTrade>>,
}

#[derive(Debug, Deserialize)]
struct AlpacaTrade {
    t: DateTime<Utc>,
    p: f64,
    s: f64,
}

#[derive(Debug, Deserialize)]
struct NewsResponse {
    #[serde(default)]
    news: Option<Vec<AlpacaNews>>,
}

#[derive(Debug, Deserialize)]
struct AlpacaNews {
    id: serde_json::Value,
    #[serde(default)]
    headline: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    symbols: Vec<String>,
    created_at: DateTime<Utc>,
}

fn decode<T: serde::de::DeserializeOwned>(
    body: serde_json::Value,
    what: &str,
) -> Result<T, MarketDataError> {
    serde_json::from_value(body).map_err(|e| MarketDataError::Decode(format!("alpaca {}: {}", what, e)))
}

fn parse_bars(body: serde_json::Value) -> Result<Vec<TradeBar>, MarketDataError> {
    let response: BarsResponse = decode(body, "bars")?;
    Ok(response
        .bars
        .unwrap_or_default()
        .into_iter()
        .map(|b| TradeBar::new(b.t, b.c, b.v.max(0.0) as u64))
        .collect())
}

fn parse_trades(body: serde_json::Value) -> Result<Vec<TradeBar>, MarketDataError> {
    let response: TradesResponse = decode(body, "trades")?;
    Ok(response
        .trades
        .unwrap_or_default()
        .into_iter()
        .map(|t| TradeBar::new(t.t, t.p, t.s.max(0.0) as u64))
        .collect())
}

fn parse_news(body: serde_json::Value) -> Result<Vec<NewsArticle>, MarketDataError> {
    let response: NewsResponse = decode(body, "news")?;
    Ok(response
        .news
        .unwrap_or_default()
        .into_iter()
        .map(|n| NewsArticle {
            id: match n.id {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            },
            headline: n.headline,
            summary: n.summary,
            symbols: n.symbols.iter().map(|s| normalize_symbol(s)).collect(),
            created_at: n.created_at,
        })
        .collect())
}
