use chrono::{DateTime, Utc};
use flow_core::{
    normalize_symbol, partition_symbols, BarsProvider, BidAsk, ClassificationTier, MarketDataError,
    Quote, QuoteProvider, TimeWindow, Timeframe, TradeBar, TradesProvider, VolumeSplit,
};
use market_calendar::MarketCalendar;
use sentiment_analysis::SentimentScorer;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use trade_classifier::{Granularity, TradeClassifier};

pub mod cache;
pub mod config;
pub mod screener;

#[cfg(test)]
mod tests;

pub use cache::{CacheLookup, TtlCache};
pub use config::ServiceConfig;
pub use screener::{MarketCapFilter, MarketCapTable, ScreenFilters};

/// Quote joined with its inferred buy/sell split
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowQuote {
    pub symbol: String,
    pub price: f64,
    pub volume: u64,
    pub change_percentage: f64,
    pub market_cap: Option<f64>,
    pub volume_bought: u64,
    pub volume_sold: u64,
    pub tier: ClassificationTier,
}

/// Trades and trend history fetched for one symbol
struct SymbolTape {
    trades: Vec<TradeBar>,
    granularity: Granularity,
    trend_bars: Vec<TradeBar>,
}

impl Default for SymbolTape {
    fn default() -> Self {
        Self {
            trades: Vec::new(),
            granularity: Granularity::Bar,
            trend_bars: Vec::new(),
        }
    }
}

/// Cache miss awaiting classification
struct PendingSplit {
    symbol: String,
    bid_ask: Option<BidAsk>,
    quote: Option<Quote>,
}

impl PendingSplit {
    /// The trend split only needs the quote's total volume.
    fn needs_tape(&self) -> bool {
        self.bid_ask.is_some() || self.quote.is_none()
    }
}

/// Quote screening and buy/sell volume inference over pluggable providers.
///
/// Owns the quote and buy/sell caches; cheap to share behind an `Arc`.
pub struct MarketDataService {
    quotes: Arc<dyn QuoteProvider>,
    bars: Arc<dyn BarsProvider>,
    trades: Option<Arc<dyn TradesProvider>>,
    sentiment: Option<Arc<SentimentScorer>>,
    calendar: MarketCalendar,
    classifier: TradeClassifier,
    market_caps: MarketCapTable,
    quote_cache: TtlCache<String, Quote>,
    volume_cache: TtlCache<String, VolumeSplit>,
    fetch_permits: Arc<Semaphore>,
    config: ServiceConfig,
}

impl MarketDataService {
    pub fn new(
        quotes: Arc<dyn QuoteProvider>,
        bars: Arc<dyn BarsProvider>,
        config: ServiceConfig,
    ) -> Self {
        Self {
            quotes,
            bars,
            trades: None,
            sentiment: None,
            calendar: MarketCalendar::new_york(),
            classifier: TradeClassifier::new(config.classifier.clone()),
            market_caps: MarketCapTable::default(),
            quote_cache: TtlCache::new(config.quote_ttl),
            volume_cache: TtlCache::new(config.volume_ttl),
            fetch_permits: Arc::new(Semaphore::new(config.max_concurrent_fetches.max(1))),
            config,
        }
    }

    /// Tick-level trades, tried before falling back to 1-minute bars.
    pub fn with_trades(mut self, trades: Arc<dyn TradesProvider>) -> Self {
        self.trades = Some(trades);
        self
    }

    /// Without a scorer, classification uses the sentiment-free weights.
    pub fn with_sentiment(mut self, scorer: Arc<SentimentScorer>) -> Self {
        self.sentiment = Some(scorer);
        self
    }

    pub fn with_calendar(mut self, calendar: MarketCalendar) -> Self {
        self.calendar = calendar;
        self
    }

    pub fn with_market_caps(mut self, market_caps: MarketCapTable) -> Self {
        self.market_caps = market_caps;
        self
    }

    /// Quote snapshot per valid symbol. Invalid symbols are logged and skipped;
    /// a failed quote batch yields an empty map.
    pub async fn screen_stocks(
        &self,
        symbols: &[String],
    ) -> Result<HashMap<String, Quote>, MarketDataError> {
        self.check_batch_size(symbols)?;
        let valid = self.valid_symbols(symbols);

        let quotes = self.load_quotes(&valid, false).await;
        self.sweep_caches();

        tracing::info!("Screened {} of {} requested symbols", quotes.len(), symbols.len());
        Ok(quotes)
    }

    /// [`screen_stocks`](Self::screen_stocks) narrowed by price, volume and
    /// market-cap filters.
    pub async fn screen_with_filters(
        &self,
        symbols: &[String],
        filters: &ScreenFilters,
    ) -> Result<HashMap<String, Quote>, MarketDataError> {
        let mut quotes = self.screen_stocks(symbols).await?;
        quotes.retain(|_, quote| filters.matches(quote));
        Ok(quotes)
    }

    /// Buy/sell split per valid symbol.
    ///
    /// `bid_ask` overrides the quoted book per symbol; an unusable pair such
    /// as `(0, 0)` counts as no book. `force_refresh` recomputes even when a
    /// fresh split is cached.
    pub async fn get_buy_sell_volume(
        &self,
        symbols: &[String],
        bid_ask: Option<&HashMap<String, BidAsk>>,
        force_refresh: bool,
    ) -> Result<HashMap<String, VolumeSplit>, MarketDataError> {
        self.check_batch_size(symbols)?;
        let valid = self.valid_symbols(symbols);

        let mut result = HashMap::with_capacity(valid.len());
        let mut misses = Vec::new();

        for symbol in valid {
            if force_refresh {
                self.volume_cache.force_invalidate(&symbol);
            } else if let Some(split) = self.volume_cache.get_fresh(&symbol) {
                tracing::debug!("Buy/sell cache hit for {}", symbol);
                result.insert(symbol, split);
                continue;
            }
            misses.push(symbol);
        }

        let cached = result.len();
        if !misses.is_empty() {
            let computed = self.compute_splits(&misses, bid_ask).await;
            for (symbol, split) in computed {
                self.volume_cache.put(symbol.clone(), split);
                result.insert(symbol, split);
            }
        }

        self.sweep_caches();

        tracing::info!(
            "Buy/sell volume for {} symbols ({} cached, {} computed)",
            result.len(),
            cached,
            misses.len()
        );
        Ok(result)
    }

    /// Screen and split in one pass: the quote view with bought/sold volume.
    pub async fn update_quotes(
        &self,
        symbols: &[String],
        force_refresh: bool,
    ) -> Result<HashMap<String, FlowQuote>, MarketDataError> {
        self.check_batch_size(symbols)?;
        let valid = self.valid_symbols(symbols);

        let quotes = self.load_quotes(&valid, force_refresh).await;
        if quotes.is_empty() {
            return Ok(HashMap::new());
        }

        let quoted: Vec<String> = quotes.keys().cloned().collect();
        let splits = self.get_buy_sell_volume(&quoted, None, force_refresh).await?;

        Ok(quotes
            .into_iter()
            .map(|(symbol, quote)| {
                let split = splits
                    .get(&symbol)
                    .copied()
                    .unwrap_or_else(|| VolumeSplit::new(0, 0, ClassificationTier::TrendOnly));
                let flow = FlowQuote {
                    symbol: symbol.clone(),
                    price: quote.last,
                    volume: quote.volume,
                    change_percentage: quote.change_percentage,
                    market_cap: quote.market_cap,
                    volume_bought: split.buy_volume,
                    volume_sold: split.sell_volume,
                    tier: split.tier,
                };
                (symbol, flow)
            })
            .collect())
    }

    fn check_batch_size(&self, symbols: &[String]) -> Result<(), MarketDataError> {
        if symbols.len() > self.config.max_symbols {
            tracing::warn!("Too many symbols requested: {}", symbols.len());
            return Err(MarketDataError::Validation(format!(
                "too many symbols: {} (maximum {})",
                symbols.len(),
                self.config.max_symbols
            )));
        }
        Ok(())
    }

    fn valid_symbols(&self, symbols: &[String]) -> Vec<String> {
        let (valid, rejected) = partition_symbols(symbols);
        for e in rejected {
            tracing::warn!("Skipping symbol: {}", e);
        }
        valid
    }

    /// Fresh cached quotes plus one batched fetch for the rest.
    async fn load_quotes(&self, symbols: &[String], force_refresh: bool) -> HashMap<String, Quote> {
        let mut found = HashMap::with_capacity(symbols.len());
        let mut missing = Vec::new();

        for symbol in symbols {
            if force_refresh {
                self.quote_cache.force_invalidate(symbol);
            } else if let Some(quote) = self.quote_cache.get_fresh(symbol) {
                found.insert(symbol.clone(), quote);
                continue;
            }
            missing.push(symbol.clone());
        }

        if missing.is_empty() {
            tracing::debug!("All {} quotes served from cache", found.len());
            return found;
        }

        match self.quotes.quotes(&missing).await {
            Ok(quotes) => {
                let requested: HashSet<&str> = missing.iter().map(String::as_str).collect();
                for quote in quotes {
                    let symbol = normalize_symbol(&quote.symbol);
                    if !requested.contains(symbol.as_str()) {
                        continue;
                    }
                    let market_cap = quote.market_cap.or_else(|| self.market_caps.get(&symbol));
                    let quote = quote.with_market_cap(market_cap);
                    self.quote_cache.put(symbol.clone(), quote.clone());
                    found.insert(symbol, quote);
                }

                for symbol in &missing {
                    if !found.contains_key(symbol) {
                        tracing::warn!("No quote returned for {}", symbol);
                    }
                }
            }
            Err(e) => {
                tracing::error!("Quote batch for {} symbols failed: {}", missing.len(), e);
            }
        }

        found
    }

    async fn compute_splits(
        &self,
        misses: &[String],
        supplied: Option<&HashMap<String, BidAsk>>,
    ) -> Vec<(String, VolumeSplit)> {
        let supplied: HashMap<String, Option<BidAsk>> = supplied
            .map(|pairs| {
                pairs
                    .iter()
                    .map(|(symbol, pair)| (normalize_symbol(symbol), BidAsk::new(pair.bid, pair.ask)))
                    .collect()
            })
            .unwrap_or_default();

        let quotes = self.load_quotes(misses, false).await;

        let pending: Vec<PendingSplit> = misses
            .iter()
            .map(|symbol| {
                let quote = quotes.get(symbol).cloned();
                let bid_ask = match supplied.get(symbol) {
                    Some(pair) => *pair,
                    None => quote.as_ref().and_then(|q| self.quoted_book(q)),
                };
                PendingSplit {
                    symbol: symbol.clone(),
                    bid_ask,
                    quote,
                }
            })
            .collect();

        let window = self.calendar.lookback_window(
            Utc::now(),
            self.config.lookback,
            self.config.reporting_delay,
        );
        tracing::debug!("Trade window {} - {}", window.start, window.end);

        let (mut tapes, sentiment) =
            tokio::join!(self.fetch_tapes(&pending, window), self.load_sentiment(misses));

        pending
            .into_iter()
            .map(|p| {
                let tape = tapes.remove(&p.symbol).unwrap_or_default();
                let trend = self.classifier.trend(&tape.trend_bars);
                let total_volume = p
                    .quote
                    .as_ref()
                    .map(|q| q.volume)
                    .unwrap_or_else(|| tape.trades.iter().map(|t| t.volume).sum());
                let score = sentiment
                    .as_ref()
                    .map(|scores| scores.get(&p.symbol).copied().unwrap_or(0.0));

                let split = self.classifier.classify(
                    &tape.trades,
                    p.bid_ask,
                    trend,
                    score,
                    total_volume,
                    tape.granularity,
                );

                if split.tier == ClassificationTier::TrendOnly {
                    tracing::warn!(
                        "{}: {}, using trend split ({:?})",
                        p.symbol,
                        if p.bid_ask.is_none() { "no bid/ask" } else { "no trades in window" },
                        trend
                    );
                }

                (p.symbol, split)
            })
            .collect()
    }

    /// Provider book, or a synthetic spread around `last` when the provider
    /// left a side out. A zero or negative side counts as left out; an
    /// inverted book of two real prices gets no substitute.
    fn quoted_book(&self, quote: &Quote) -> Option<BidAsk> {
        if let Some(book) = quote.bid_ask() {
            return Some(book);
        }
        let reported = |side: Option<f64>| side.filter(|p| *p > 0.0);
        if reported(quote.bid).is_none() || reported(quote.ask).is_none() {
            return BidAsk::synthetic(quote.last, self.config.synthetic_half_spread);
        }
        None
    }

    async fn fetch_tapes(
        &self,
        pending: &[PendingSplit],
        window: TimeWindow,
    ) -> HashMap<String, SymbolTape> {
        let trend_start = window.end - self.config.trend_history;
        let mut tasks = JoinSet::new();

        for p in pending {
            let symbol = p.symbol.clone();
            let needs_tape = p.needs_tape();
            let bars = Arc::clone(&self.bars);
            let trades = self.trades.clone();
            let permits = Arc::clone(&self.fetch_permits);

            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                let tape = fetch_tape(
                    &symbol,
                    bars.as_ref(),
                    trades.as_deref(),
                    window,
                    trend_start,
                    needs_tape,
                )
                .await;
                (symbol, tape)
            });
        }

        let mut tapes = HashMap::with_capacity(pending.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((symbol, tape)) => {
                    tapes.insert(symbol, tape);
                }
                Err(e) => {
                    tracing::error!("Tape fetch task error: {}", e);
                }
            }
        }
        tapes
    }

    /// `None` when sentiment is not configured or the news call failed.
    async fn load_sentiment(&self, symbols: &[String]) -> Option<HashMap<String, f64>> {
        let scorer = self.sentiment.as_ref()?;
        match scorer
            .try_score_batch(symbols, self.config.sentiment_window, self.config.max_articles)
            .await
        {
            Ok(scores) => Some(scores),
            Err(e) => {
                tracing::warn!("Sentiment unavailable, classifying without it: {}", e);
                None
            }
        }
    }

    fn sweep_caches(&self) {
        let removed = self.quote_cache.sweep() + self.volume_cache.sweep();
        if removed > 0 {
            tracing::debug!("Swept {} expired cache entries", removed);
        }
    }
}

/// Tick trades first, then 1-minute bars; plus 5-minute bars for the trend.
async fn fetch_tape(
    symbol: &str,
    bars: &dyn BarsProvider,
    trades: Option<&dyn TradesProvider>,
    window: TimeWindow,
    trend_start: DateTime<Utc>,
    needs_tape: bool,
) -> SymbolTape {
    let trend = async {
        match bars.bars(symbol, Timeframe::Minute5, trend_start, window.end).await {
            Ok(history) => history,
            Err(e) => {
                tracing::warn!("Trend history unavailable for {}: {}", symbol, e);
                Vec::new()
            }
        }
    };

    let tape = async {
        if !needs_tape {
            return (Vec::new(), Granularity::Bar);
        }

        if let Some(trades) = trades {
            match trades.trades(symbol, window.start, window.end).await {
                Ok(ticks) if !ticks.is_empty() => return (ticks, Granularity::Tick),
                Ok(_) => tracing::debug!("No tick trades for {}, trying bars", symbol),
                Err(e) => tracing::warn!("Tick trades unavailable for {}: {}", symbol, e),
            }
        }

        match bars.bars(symbol, Timeframe::Minute1, window.start, window.end).await {
            Ok(minute_bars) => (minute_bars, Granularity::Bar),
            Err(e) => {
                tracing::warn!("Bars unavailable for {}: {}", symbol, e);
                (Vec::new(), Granularity::Bar)
            }
        }
    };

    let (trend_bars, (trades, granularity)) = tokio::join!(trend, tape);
    SymbolTape {
        trades,
        granularity,
        trend_bars,
    }
}
