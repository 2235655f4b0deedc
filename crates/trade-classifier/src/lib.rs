pub mod config;

pub use config::{BlendWeights, ClassifierConfig};

use flow_core::{BidAsk, ClassificationTier, TradeBar, Trend, VolumeSplit};

/// Granularity of the trade series handed to [`TradeClassifier::classify`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Tick,
    Bar,
}

/// How a trade printed relative to the prevailing quote
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    AtAsk,
    AtBid,
    Inside,
}

/// Moving-average crossover over the most recent `trend_lookback` bars.
pub fn trend_signal(bars: &[TradeBar], config: &ClassifierConfig) -> Trend {
    let window = &bars[bars.len().saturating_sub(config.trend_lookback)..];
    if window.len() < 2 {
        return Trend::Flat;
    }

    let period = config.sma_period.clamp(1, window.len());
    let mean = |slice: &[TradeBar]| slice.iter().map(|b| b.close).sum::<f64>() / slice.len() as f64;

    let sma_short = mean(&window[window.len() - period..]);
    let sma_long = mean(&window[..period]);

    if sma_short > sma_long {
        Trend::Up
    } else if sma_short < sma_long {
        Trend::Down
    } else {
        Trend::Flat
    }
}

/// Infers buyer- vs seller-initiated volume from trades, the quote, the
/// price trend and news sentiment.
#[derive(Debug, Clone, Default)]
pub struct TradeClassifier {
    config: ClassifierConfig,
}

impl TradeClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn trend(&self, bars: &[TradeBar]) -> Trend {
        trend_signal(bars, &self.config)
    }

    /// Split volume using the best evidence available:
    ///
    /// 1. no bid/ask: trend-skewed split of `total_volume`
    /// 2. bid/ask but no trades: the same trend split
    /// 3. both: per-trade quote rule, with mid-spread trades blended from
    ///    window momentum, trend and sentiment
    pub fn classify(
        &self,
        trades: &[TradeBar],
        bid_ask: Option<BidAsk>,
        trend: Trend,
        sentiment: Option<f64>,
        total_volume: u64,
        granularity: Granularity,
    ) -> VolumeSplit {
        match bid_ask {
            Some(quote) if !trades.is_empty() => {
                self.classify_trades(trades, quote, trend, sentiment, granularity)
            }
            _ => self.trend_split(total_volume, trend),
        }
    }

    /// Split `total_volume` by trend alone; the remainder goes to sell.
    pub fn trend_split(&self, total_volume: u64, trend: Trend) -> VolumeSplit {
        let buy = split_floor(total_volume, self.trend_ratio(trend));
        VolumeSplit::new(buy, total_volume - buy, ClassificationTier::TrendOnly)
    }

    fn trend_ratio(&self, trend: Trend) -> f64 {
        match trend {
            Trend::Up => self.config.up_ratio,
            Trend::Down => self.config.down_ratio,
            Trend::Flat => self.config.flat_ratio,
        }
    }

    fn classify_trades(
        &self,
        trades: &[TradeBar],
        quote: BidAsk,
        trend: Trend,
        sentiment: Option<f64>,
        granularity: Granularity,
    ) -> VolumeSplit {
        let (window, tier) = match granularity {
            Granularity::Tick => (self.config.tick_window, ClassificationTier::TickLevel),
            Granularity::Bar => (self.config.bar_window, ClassificationTier::BarLevel),
        };

        let weights = match sentiment {
            Some(_) => self.config.weights,
            None => self.config.weights_without_sentiment,
        };
        let trend_adj = self.trend_ratio(trend);
        let sentiment_adj = sentiment.map_or(0.5, |s| (s.clamp(-1.0, 1.0) + 1.0) / 2.0);

        let sides: Vec<Side> = trades.iter().map(|t| side_of(t.close, quote)).collect();

        let mut at_ask = 0usize;
        let mut at_bid = 0usize;
        let mut buy_volume = 0u64;
        let mut sell_volume = 0u64;

        for (i, trade) in trades.iter().enumerate() {
            // tally covers sides[i - window..i]
            if window > 0 && i > window {
                match sides[i - window - 1] {
                    Side::AtAsk => at_ask -= 1,
                    Side::AtBid => at_bid -= 1,
                    Side::Inside => {}
                }
            }

            match sides[i] {
                Side::AtAsk => buy_volume += trade.volume,
                Side::AtBid => sell_volume += trade.volume,
                Side::Inside => {
                    let qualifying = at_ask + at_bid;
                    let momentum = if qualifying == 0 {
                        0.5
                    } else {
                        at_ask as f64 / qualifying as f64
                    };

                    let ratio = weights.momentum * momentum
                        + weights.trend * trend_adj
                        + weights.sentiment * sentiment_adj;
                    let buy = split_floor(trade.volume, ratio);
                    buy_volume += buy;
                    sell_volume += trade.volume - buy;
                }
            }

            if window > 0 {
                match sides[i] {
                    Side::AtAsk => at_ask += 1,
                    Side::AtBid => at_bid += 1,
                    Side::Inside => {}
                }
            }
        }

        tracing::trace!(
            "Classified {} trades: buy={} sell={} ({:?})",
            trades.len(),
            buy_volume,
            sell_volume,
            tier
        );

        VolumeSplit::new(buy_volume, sell_volume, tier)
    }
}

fn side_of(price: f64, quote: BidAsk) -> Side {
    if price >= quote.ask {
        Side::AtAsk
    } else if price <= quote.bid {
        Side::AtBid
    } else {
        Side::Inside
    }
}

/// `floor(volume * ratio)` with the ratio clamped to [0, 1].
fn split_floor(volume: u64, ratio: f64) -> u64 {
    let ratio = if ratio.is_nan() { 0.5 } else { ratio.clamp(0.0, 1.0) };
    ((volume as f64 * ratio).floor() as u64).min(volume)
}
