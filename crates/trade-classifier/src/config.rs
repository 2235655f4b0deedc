use serde::{Deserialize, Serialize};

/// Blend weights for a mid-spread trade. Expected to sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlendWeights {
    pub momentum: f64,
    pub trend: f64,
    pub sentiment: f64,
}

impl BlendWeights {
    pub const fn new(momentum: f64, trend: f64, sentiment: f64) -> Self {
        Self {
            momentum,
            trend,
            sentiment,
        }
    }
}

/// Heuristic constants of the classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Momentum window over tick-level trades
    pub tick_window: usize,
    /// Momentum window over aggregated bars
    pub bar_window: usize,
    pub weights: BlendWeights,
    /// Used when no sentiment score is available
    pub weights_without_sentiment: BlendWeights,
    /// Buy share assigned by an up/down/flat trend
    pub up_ratio: f64,
    pub down_ratio: f64,
    pub flat_ratio: f64,
    /// Most recent bars considered by the trend signal
    pub trend_lookback: usize,
    /// Bars averaged at each end of the trend window
    pub sma_period: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            tick_window: 20,
            bar_window: 5,
            weights: BlendWeights::new(0.5, 0.3, 0.2),
            weights_without_sentiment: BlendWeights::new(0.5, 0.5, 0.0),
            up_ratio: 0.6,
            down_ratio: 0.4,
            flat_ratio: 0.5,
            trend_lookback: 12,
            sma_period: 3,
        }
    }
}
