use super::*;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, TimeZone};
use flow_core::{NewsArticle, NewsProvider};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Counting fakes
// ---------------------------------------------------------------------------

#[derive(Default)]
struct FakeQuotes {
    quotes: Vec<Quote>,
    fail: bool,
    calls: AtomicUsize,
    requested: Mutex<Vec<Vec<String>>>,
}

impl FakeQuotes {
    fn with(quotes: Vec<Quote>) -> Arc<Self> {
        Arc::new(Self {
            quotes,
            ..Self::default()
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Self::default()
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuoteProvider for FakeQuotes {
    async fn quotes(&self, symbols: &[String]) -> Result<Vec<Quote>, MarketDataError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requested.lock().unwrap().push(symbols.to_vec());
        if self.fail {
            return Err(MarketDataError::Upstream {
                upstream: "tradier".to_string(),
                status: Some(502),
                body: "bad gateway".to_string(),
            });
        }
        Ok(self
            .quotes
            .iter()
            .filter(|q| symbols.contains(&q.symbol))
            .cloned()
            .collect())
    }
}

#[derive(Default)]
struct FakeBars {
    minute: HashMap<String, Vec<TradeBar>>,
    five_minute: HashMap<String, Vec<TradeBar>>,
    calls: Mutex<Vec<(String, Timeframe)>>,
}

impl FakeBars {
    fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn calls_for(&self, symbol: &str, timeframe: Timeframe) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, t)| s == symbol && *t == timeframe)
            .count()
    }
}

#[async_trait]
impl BarsProvider for FakeBars {
    async fn bars(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<Vec<TradeBar>, MarketDataError> {
        self.calls.lock().unwrap().push((symbol.to_string(), timeframe));
        let source = match timeframe {
            Timeframe::Minute5 => &self.five_minute,
            _ => &self.minute,
        };
        Ok(source.get(symbol).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
struct FakeTrades {
    ticks: HashMap<String, Vec<TradeBar>>,
    calls: AtomicUsize,
}

#[async_trait]
impl TradesProvider for FakeTrades {
    async fn trades(
        &self,
        symbol: &str,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<Vec<TradeBar>, MarketDataError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.ticks.get(symbol).cloned().unwrap_or_default())
    }
}

struct FakeNews {
    result: Result<Vec<NewsArticle>, MarketDataError>,
    calls: AtomicUsize,
}

#[async_trait]
impl NewsProvider for FakeNews {
    async fn news(
        &self,
        _symbols: &[String],
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
        _limit: usize,
    ) -> Result<Vec<NewsArticle>, MarketDataError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone()
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn series(points: &[(f64, u64)]) -> Vec<TradeBar> {
    let start = Utc.with_ymd_and_hms(2025, 1, 15, 15, 0, 0).unwrap();
    points
        .iter()
        .enumerate()
        .map(|(i, (price, volume))| {
            TradeBar::new(start + ChronoDuration::minutes(i as i64), *price, *volume)
        })
        .collect()
}

fn symbols(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn aapl_quote() -> Quote {
    Quote::new("AAPL", 190.0, 188.0, Some(189.95), Some(190.05), 350)
}

fn msft_quote() -> Quote {
    Quote::new("MSFT", 400.0, 400.0, None, None, 1001)
}

fn aapl_bars() -> FakeBars {
    let mut bars = FakeBars::default();
    bars.minute.insert(
        "AAPL".to_string(),
        series(&[(190.10, 100), (189.90, 50), (190.20, 200)]),
    );
    bars
}

fn service(quotes: Arc<FakeQuotes>, bars: Arc<FakeBars>) -> MarketDataService {
    MarketDataService::new(quotes, bars, ServiceConfig::default())
}

// ---------------------------------------------------------------------------
// Screening
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_screen_returns_quotes_with_market_cap() {
    let quotes = FakeQuotes::with(vec![aapl_quote(), Quote::new("ZZZ", 5.0, 0.0, None, None, 10)]);
    let svc = service(quotes.clone(), Arc::new(FakeBars::default()));

    let result = svc.screen_stocks(&symbols(&["aapl", "ZZZ"])).await.unwrap();

    assert_eq!(result.len(), 2);
    let aapl = &result["AAPL"];
    assert!((aapl.change - 2.0).abs() < 1e-9);
    assert_eq!(aapl.market_cap, Some(3_000_000.0));
    assert_eq!(result["ZZZ"].change_percentage, 0.0);
    assert_eq!(result["ZZZ"].market_cap, None);
    assert_eq!(quotes.calls(), 1);
}

#[tokio::test]
async fn test_custom_market_caps_drive_the_cap_filter() {
    let quotes = FakeQuotes::with(vec![Quote::new("ZZZ", 5.0, 5.0, None, None, 10)]);
    let svc = service(quotes, Arc::new(FakeBars::default()))
        .with_market_caps(MarketCapTable::empty().with_cap("ZZZ", 1_500.0));
    let list = symbols(&["ZZZ"]);

    let small = ScreenFilters {
        market_cap: MarketCapFilter::Small,
        ..ScreenFilters::default()
    };
    let large = ScreenFilters {
        market_cap: MarketCapFilter::Large,
        ..ScreenFilters::default()
    };

    assert_eq!(svc.screen_with_filters(&list, &small).await.unwrap()["ZZZ"].market_cap, Some(1_500.0));
    assert!(svc.screen_with_filters(&list, &large).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_screen_skips_invalid_symbols() {
    let quotes = FakeQuotes::with(vec![aapl_quote()]);
    let svc = service(quotes.clone(), Arc::new(FakeBars::default()));

    let result = svc
        .screen_stocks(&symbols(&["AAPL", "bad$", "TOOLONGX", "12"]))
        .await
        .unwrap();

    assert_eq!(result.keys().collect::<Vec<_>>(), vec!["AAPL"]);
    assert_eq!(quotes.requested.lock().unwrap()[0], symbols(&["AAPL"]));
}

#[tokio::test]
async fn test_screen_with_only_invalid_symbols_is_empty() {
    let quotes = FakeQuotes::with(vec![]);
    let svc = service(quotes.clone(), Arc::new(FakeBars::default()));

    let result = svc.screen_stocks(&symbols(&["???", ""])).await.unwrap();

    assert!(result.is_empty());
    assert_eq!(quotes.calls(), 0);
}

#[tokio::test]
async fn test_screen_quote_failure_is_empty_result() {
    let svc = service(FakeQuotes::failing(), Arc::new(FakeBars::default()));

    let result = svc.screen_stocks(&symbols(&["AAPL", "MSFT"])).await.unwrap();
    assert!(result.is_empty());
}

#[tokio::test]
async fn test_too_many_symbols_is_rejected() {
    let svc = service(FakeQuotes::with(vec![]), Arc::new(FakeBars::default()));
    let many: Vec<String> = (0..51).map(|i| format!("S{}", i)).collect();

    assert!(matches!(
        svc.screen_stocks(&many).await,
        Err(MarketDataError::Validation(_))
    ));
    assert!(matches!(
        svc.get_buy_sell_volume(&many, None, false).await,
        Err(MarketDataError::Validation(_))
    ));
}

#[tokio::test]
async fn test_screen_reuses_fresh_quotes() {
    let quotes = FakeQuotes::with(vec![aapl_quote(), msft_quote()]);
    let svc = service(quotes.clone(), Arc::new(FakeBars::default()));

    svc.screen_stocks(&symbols(&["AAPL"])).await.unwrap();
    let result = svc.screen_stocks(&symbols(&["AAPL", "MSFT"])).await.unwrap();

    assert_eq!(result.len(), 2);
    let requested = quotes.requested.lock().unwrap();
    assert_eq!(requested.len(), 2);
    assert_eq!(requested[1], symbols(&["MSFT"]));
}

#[tokio::test]
async fn test_screen_with_filters() {
    let quotes = FakeQuotes::with(vec![
        aapl_quote(),
        msft_quote(),
        Quote::new("KO", 60.0, 59.0, None, None, 5_000),
    ]);
    let svc = service(quotes, Arc::new(FakeBars::default()));

    let filters = ScreenFilters {
        min_price: 50.0,
        max_price: 300.0,
        min_volume: 300,
        market_cap: MarketCapFilter::Large,
    };
    let result = svc
        .screen_with_filters(&symbols(&["AAPL", "MSFT", "KO"]), &filters)
        .await
        .unwrap();

    let mut kept: Vec<&String> = result.keys().collect();
    kept.sort();
    assert_eq!(kept, vec!["AAPL", "KO"]);
}

// ---------------------------------------------------------------------------
// Buy/sell volume
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_caller_book_scenario() {
    let quotes = FakeQuotes::with(vec![aapl_quote(), msft_quote()]);
    let bars = Arc::new(aapl_bars());
    let svc = service(quotes, bars.clone());

    let book: HashMap<String, BidAsk> = [
        ("AAPL".to_string(), BidAsk { bid: 189.95, ask: 190.05 }),
        ("MSFT".to_string(), BidAsk { bid: 0.0, ask: 0.0 }),
    ]
    .into_iter()
    .collect();

    let result = svc
        .get_buy_sell_volume(&symbols(&["AAPL", "MSFT"]), Some(&book), false)
        .await
        .unwrap();

    let aapl = result["AAPL"];
    assert_eq!((aapl.buy_volume, aapl.sell_volume), (300, 50));
    assert_eq!(aapl.total(), 350);
    assert_eq!(aapl.tier, ClassificationTier::BarLevel);

    // no usable book: flat trend split of the quoted 1001 shares
    let msft = result["MSFT"];
    assert_eq!((msft.buy_volume, msft.sell_volume), (500, 501));
    assert_eq!(msft.tier, ClassificationTier::TrendOnly);
    assert_eq!(bars.calls_for("MSFT", Timeframe::Minute1), 0);
}

#[tokio::test]
async fn test_cache_idempotence() {
    let quotes = FakeQuotes::with(vec![aapl_quote(), msft_quote()]);
    let bars = Arc::new(aapl_bars());
    let svc = service(quotes.clone(), bars.clone());
    let list = symbols(&["AAPL", "MSFT"]);

    let first = svc.get_buy_sell_volume(&list, None, false).await.unwrap();
    let quote_calls = quotes.calls();
    let bar_calls = bars.calls();

    let second = svc.get_buy_sell_volume(&list, None, false).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(quotes.calls(), quote_calls);
    assert_eq!(bars.calls(), bar_calls);
}

#[tokio::test]
async fn test_force_refresh_bypasses_and_repopulates() {
    let quotes = FakeQuotes::with(vec![aapl_quote()]);
    let bars = Arc::new(aapl_bars());
    let svc = service(quotes, bars.clone());
    let list = symbols(&["AAPL"]);

    svc.get_buy_sell_volume(&list, None, false).await.unwrap();
    let bar_calls = bars.calls();

    let refreshed = svc.get_buy_sell_volume(&list, None, true).await.unwrap();
    assert!(bars.calls() > bar_calls);

    let after = bars.calls();
    let cached = svc.get_buy_sell_volume(&list, None, false).await.unwrap();
    assert_eq!(bars.calls(), after);
    assert_eq!(cached, refreshed);
}

#[tokio::test(start_paused = true)]
async fn test_expired_split_is_recomputed() {
    let quotes = FakeQuotes::with(vec![aapl_quote()]);
    let bars = Arc::new(aapl_bars());
    let svc = service(quotes.clone(), bars.clone());
    let list = symbols(&["AAPL"]);

    svc.get_buy_sell_volume(&list, None, false).await.unwrap();
    tokio::time::advance(Duration::from_secs(11)).await;
    svc.get_buy_sell_volume(&list, None, false).await.unwrap();

    assert_eq!(quotes.calls(), 2);
    assert_eq!(bars.calls_for("AAPL", Timeframe::Minute1), 2);
}

#[tokio::test]
async fn test_synthetic_spread_when_provider_omits_book() {
    // last 100.0 -> synthetic 99.5 / 100.5
    let quotes = FakeQuotes::with(vec![Quote::new("XYZ", 100.0, 99.0, None, None, 30)]);
    let mut bars = FakeBars::default();
    bars.minute.insert("XYZ".to_string(), series(&[(101.0, 10), (99.0, 20)]));
    let svc = service(quotes, Arc::new(bars));

    let result = svc
        .get_buy_sell_volume(&symbols(&["XYZ"]), None, false)
        .await
        .unwrap();

    let split = result["XYZ"];
    assert_eq!((split.buy_volume, split.sell_volume), (10, 20));
    assert_eq!(split.tier, ClassificationTier::BarLevel);
}

#[tokio::test]
async fn test_zero_bid_gets_synthetic_spread() {
    let quotes = FakeQuotes::with(vec![Quote::new("XYZ", 100.0, 99.0, Some(0.0), Some(100.2), 30)]);
    let mut bars = FakeBars::default();
    bars.minute.insert("XYZ".to_string(), series(&[(101.0, 10), (99.0, 20)]));
    let svc = service(quotes, Arc::new(bars));

    let result = svc
        .get_buy_sell_volume(&symbols(&["XYZ"]), None, false)
        .await
        .unwrap();

    // 99.5 / 100.5, not the reported 100.2 ask
    let split = result["XYZ"];
    assert_eq!((split.buy_volume, split.sell_volume), (10, 20));
    assert_eq!(split.tier, ClassificationTier::BarLevel);
}

#[tokio::test]
async fn test_inverted_book_gets_no_substitute() {
    let quotes = FakeQuotes::with(vec![Quote::new("XYZ", 100.0, 100.0, Some(100.5), Some(99.5), 31)]);
    let bars = Arc::new(FakeBars::default());
    let svc = service(quotes, bars.clone());

    let result = svc
        .get_buy_sell_volume(&symbols(&["XYZ"]), None, false)
        .await
        .unwrap();

    let split = result["XYZ"];
    assert_eq!((split.buy_volume, split.sell_volume), (15, 16));
    assert_eq!(split.tier, ClassificationTier::TrendOnly);
    assert_eq!(bars.calls_for("XYZ", Timeframe::Minute1), 0);
}

#[tokio::test]
async fn test_book_without_trades_uses_trend_split() {
    let quotes = FakeQuotes::with(vec![aapl_quote()]);
    let mut bars = FakeBars::default();
    bars.five_minute.insert(
        "AAPL".to_string(),
        series(&[(185.0, 1), (186.0, 1), (187.0, 1), (188.0, 1), (189.0, 1), (190.0, 1)]),
    );
    let svc = service(quotes, Arc::new(bars));

    let result = svc
        .get_buy_sell_volume(&symbols(&["AAPL"]), None, false)
        .await
        .unwrap();

    // uptrend: floor(350 * 0.6)
    let split = result["AAPL"];
    assert_eq!((split.buy_volume, split.sell_volume), (210, 140));
    assert_eq!(split.tier, ClassificationTier::TrendOnly);
}

#[tokio::test]
async fn test_tick_trades_preferred_over_bars() {
    let quotes = FakeQuotes::with(vec![aapl_quote(), msft_quote()]);
    let bars = Arc::new(aapl_bars());
    let mut trades = FakeTrades::default();
    trades
        .ticks
        .insert("AAPL".to_string(), series(&[(190.05, 7), (189.95, 3)]));
    let trades = Arc::new(trades);

    let svc = service(quotes, bars.clone()).with_trades(trades.clone());
    let book: HashMap<String, BidAsk> = [("MSFT".to_string(), BidAsk { bid: 399.9, ask: 400.1 })]
        .into_iter()
        .collect();

    let result = svc
        .get_buy_sell_volume(&symbols(&["AAPL", "MSFT"]), Some(&book), false)
        .await
        .unwrap();

    let aapl = result["AAPL"];
    assert_eq!((aapl.buy_volume, aapl.sell_volume), (7, 3));
    assert_eq!(aapl.tier, ClassificationTier::TickLevel);
    assert_eq!(bars.calls_for("AAPL", Timeframe::Minute1), 0);

    // no ticks for MSFT: falls back to (empty) bars, then the trend split
    assert_eq!(bars.calls_for("MSFT", Timeframe::Minute1), 1);
    assert_eq!(result["MSFT"].tier, ClassificationTier::TrendOnly);
    assert_eq!(trades.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_quote_failure_still_classifies_from_caller_book() {
    let bars = Arc::new(aapl_bars());
    let svc = service(FakeQuotes::failing(), bars);
    let book: HashMap<String, BidAsk> = [("AAPL".to_string(), BidAsk { bid: 189.95, ask: 190.05 })]
        .into_iter()
        .collect();

    let result = svc
        .get_buy_sell_volume(&symbols(&["AAPL"]), Some(&book), false)
        .await
        .unwrap();

    let aapl = result["AAPL"];
    assert_eq!((aapl.buy_volume, aapl.sell_volume), (300, 50));
}

// ---------------------------------------------------------------------------
// Sentiment
// ---------------------------------------------------------------------------

fn mid_spread_setup() -> (Arc<FakeQuotes>, Arc<FakeBars>) {
    let quotes = FakeQuotes::with(vec![Quote::new("AAPL", 190.0, 188.0, Some(189.95), Some(190.05), 100)]);
    let mut bars = FakeBars::default();
    bars.minute.insert("AAPL".to_string(), series(&[(190.0, 100)]));
    bars.five_minute.insert(
        "AAPL".to_string(),
        series(&[(185.0, 1), (186.0, 1), (187.0, 1), (188.0, 1)]),
    );
    (quotes, Arc::new(bars))
}

#[tokio::test]
async fn test_sentiment_failure_switches_weights() {
    let (quotes, bars) = mid_spread_setup();
    let news = Arc::new(FakeNews {
        result: Err(MarketDataError::NoData("news".to_string())),
        calls: AtomicUsize::new(0),
    });
    let svc = service(quotes, bars).with_sentiment(Arc::new(SentimentScorer::new(news.clone())));

    let result = svc
        .get_buy_sell_volume(&symbols(&["AAPL"]), None, false)
        .await
        .unwrap();

    // momentum 0.5, uptrend 0.6, no sentiment term
    let expected = (100.0_f64 * (0.5 * 0.5 + 0.5 * 0.6 + 0.0 * 0.5)).floor() as u64;
    assert_eq!(result["AAPL"].buy_volume, expected);
    assert_eq!(news.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_sentiment_fetched_once_per_batch() {
    let (quotes, bars) = mid_spread_setup();
    let news = Arc::new(FakeNews {
        result: Ok(Vec::new()),
        calls: AtomicUsize::new(0),
    });
    let svc = service(quotes, bars).with_sentiment(Arc::new(SentimentScorer::new(news.clone())));

    let result = svc
        .get_buy_sell_volume(&symbols(&["AAPL", "MSFT", "KO"]), None, false)
        .await
        .unwrap();

    // neutral sentiment keeps its 0.2 weight
    let expected = (100.0_f64 * (0.5 * 0.5 + 0.3 * 0.6 + 0.2 * 0.5)).floor() as u64;
    assert_eq!(result["AAPL"].buy_volume, expected);
    assert_eq!(news.calls.load(Ordering::SeqCst), 1);
}

// ---------------------------------------------------------------------------
// Combined view
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_update_quotes_joins_quote_and_split() {
    let quotes = FakeQuotes::with(vec![aapl_quote(), msft_quote()]);
    let svc = service(quotes.clone(), Arc::new(aapl_bars()));

    let result = svc
        .update_quotes(&symbols(&["AAPL", "MSFT"]), false)
        .await
        .unwrap();

    let aapl = &result["AAPL"];
    assert_eq!(aapl.price, 190.0);
    assert_eq!(aapl.market_cap, Some(3_000_000.0));
    assert_eq!((aapl.volume_bought, aapl.volume_sold), (300, 50));

    // provider omitted MSFT's book, so a synthetic spread applies; no bars
    // means the trend split of the quoted volume
    let msft = &result["MSFT"];
    assert_eq!(msft.volume_bought + msft.volume_sold, 1001);

    // the split reused the quotes fetched for the screen
    assert_eq!(quotes.calls(), 1);
}

#[tokio::test]
async fn test_update_quotes_force_refresh_refetches_quotes() {
    let quotes = FakeQuotes::with(vec![aapl_quote()]);
    let svc = service(quotes.clone(), Arc::new(aapl_bars()));
    let list = symbols(&["AAPL"]);

    svc.update_quotes(&list, false).await.unwrap();
    svc.update_quotes(&list, true).await.unwrap();

    assert_eq!(quotes.calls(), 2);
}
