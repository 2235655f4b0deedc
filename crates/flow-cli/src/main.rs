//! flow-cli: screen symbols and estimate bought/sold volume from live market data.
//!
//! Quotes come from Tradier; bars, trades and news from Alpaca. Credentials and
//! tuning are read from the environment (or `.env`), see `config.rs`.
//!
//! Usage:
//!   cargo run -p flow-cli -- screen --symbols AAPL MSFT GOOGL
//!   cargo run -p flow-cli -- screen --symbols AAPL TSLA --min-price 50 --market-cap large
//!   cargo run -p flow-cli -- volume --symbols AAPL MSFT --book AAPL=189.95/190.05
//!   cargo run -p flow-cli -- update --symbols AAPL MSFT --force

mod config;

use anyhow::{bail, Context, Result};
use config::AppConfig;
use flow_core::BidAsk;
use flow_orchestrator::{MarketCapFilter, MarketDataService, ScreenFilters, ServiceConfig};
use market_calendar::MarketCalendar;
use market_client::{alpaca, tradier, AlpacaClient, ResilientApiClient, TradierClient};
use sentiment_analysis::SentimentScorer;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Screen,
    Volume,
    Update,
}

#[derive(Debug)]
struct CliArgs {
    command: Command,
    symbols: Vec<String>,
    force_refresh: bool,
    filters: ScreenFilters,
    books: HashMap<String, BidAsk>,
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  flow-cli screen --symbols AAPL MSFT ...   Quote snapshot per symbol");
    eprintln!("  flow-cli volume --symbols AAPL MSFT ...   Estimated bought/sold volume");
    eprintln!("  flow-cli update --symbols AAPL MSFT ...   Quotes joined with bought/sold volume");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --min-price N           screen: lowest last price");
    eprintln!("  --max-price N           screen: highest last price");
    eprintln!("  --min-volume N          screen: lowest session volume");
    eprintln!("  --market-cap BUCKET     screen: any | small | mid | large");
    eprintln!("  --book SYM=BID/ASK      volume: caller-supplied bid/ask (repeatable)");
    eprintln!("  --force                 volume/update: bypass cached results");
}

fn values_after<'a>(args: &'a [String], flag: &str) -> Vec<&'a String> {
    args.iter()
        .enumerate()
        .filter(|(_, a)| *a == flag)
        .filter_map(|(i, _)| args.get(i + 1))
        .collect()
}

fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
}

fn parse_book(text: &str) -> Result<(String, BidAsk)> {
    let (symbol, prices) = text
        .split_once('=')
        .with_context(|| format!("--book expects SYM=BID/ASK, got '{}'", text))?;
    let (bid, ask) = prices
        .split_once('/')
        .with_context(|| format!("--book expects SYM=BID/ASK, got '{}'", text))?;

    // Kept as given; the service treats an unusable pair as no book.
    let book = BidAsk {
        bid: bid.trim().parse().context("--book bid")?,
        ask: ask.trim().parse().context("--book ask")?,
    };
    Ok((flow_core::normalize_symbol(symbol), book))
}

fn parse_args(args: &[String]) -> Result<CliArgs> {
    let command = match args.get(1).map(String::as_str) {
        Some("screen") => Command::Screen,
        Some("volume") => Command::Volume,
        Some("update") => Command::Update,
        other => bail!("unknown command {:?}", other),
    };

    let symbols: Vec<String> = match args.iter().position(|a| a == "--symbols") {
        Some(idx) => args[idx + 1..]
            .iter()
            .take_while(|a| !a.starts_with("--"))
            .cloned()
            .collect(),
        None => Vec::new(),
    };
    if symbols.is_empty() {
        bail!("--symbols requires at least one symbol");
    }

    let mut filters = ScreenFilters::default();
    if let Some(v) = value_after(args, "--min-price") {
        filters.min_price = v.parse().context("--min-price")?;
    }
    if let Some(v) = value_after(args, "--max-price") {
        filters.max_price = v.parse().context("--max-price")?;
    }
    if let Some(v) = value_after(args, "--min-volume") {
        filters.min_volume = v.parse().context("--min-volume")?;
    }
    if let Some(v) = value_after(args, "--market-cap") {
        filters.market_cap = MarketCapFilter::parse(v)
            .with_context(|| format!("unknown market-cap bucket '{}'", v))?;
    }

    let books = values_after(args, "--book")
        .into_iter()
        .map(|b| parse_book(b.as_str()))
        .collect::<Result<HashMap<_, _>>>()?;

    Ok(CliArgs {
        command,
        symbols,
        force_refresh: args.iter().any(|a| a == "--force"),
        filters,
        books,
    })
}

fn build_service(config: &AppConfig) -> Result<MarketDataService> {
    let api = Arc::new(
        ResilientApiClient::with_reqwest()
            .with_timeout(Duration::from_secs(config.http_timeout_secs))
            .with_upstream(
                tradier::UPSTREAM,
                config.tradier_rate_limit,
                tradier::auth_headers(&config.tradier_api_token),
            )
            .with_upstream(
                alpaca::UPSTREAM,
                config.alpaca_rate_limit,
                alpaca::auth_headers(&config.alpaca_api_key, &config.alpaca_secret_key),
            ),
    );

    let quotes = Arc::new(TradierClient::with_base_url(Arc::clone(&api), &config.tradier_base_url));
    let alpaca = Arc::new(AlpacaClient::with_data_url(Arc::clone(&api), &config.alpaca_data_url));
    let calendar = MarketCalendar::from_timezone_name(&config.market_timezone)
        .context("MARKET_TIMEZONE")?;

    let service_config = ServiceConfig::default()
        .with_volume_ttl(Duration::from_secs(config.volume_cache_ttl_secs))
        .with_max_concurrent_fetches(config.max_concurrent_fetches);

    Ok(MarketDataService::new(quotes, alpaca.clone(), service_config)
        .with_trades(alpaca.clone())
        .with_sentiment(Arc::new(SentimentScorer::new(alpaca)))
        .with_calendar(calendar))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "flow_cli=info,flow_orchestrator=info,market_client=warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let cli = match parse_args(&args) {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("{:#}", e);
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    };

    let config = AppConfig::from_env()?;
    let service = build_service(&config)?;

    tracing::info!(
        "flow-cli: {:?} for {} symbols (timezone {}, force={})",
        cli.command,
        cli.symbols.len(),
        config.market_timezone,
        cli.force_refresh
    );

    let output = match cli.command {
        Command::Screen => {
            let quotes = service.screen_with_filters(&cli.symbols, &cli.filters).await?;
            serde_json::to_string_pretty(&quotes)?
        }
        Command::Volume => {
            let books = (!cli.books.is_empty()).then_some(&cli.books);
            let splits = service
                .get_buy_sell_volume(&cli.symbols, books, cli.force_refresh)
                .await?;
            serde_json::to_string_pretty(&splits)?
        }
        Command::Update => {
            let flows = service.update_quotes(&cli.symbols, cli.force_refresh).await?;
            serde_json::to_string_pretty(&flows)?
        }
    };

    println!("{}", output);
    Ok(())
}
