use chrono::{Duration, Utc};
use flow_core::{normalize_symbol, MarketDataError, NewsArticle, NewsProvider};
use std::collections::HashMap;
use std::sync::Arc;

pub mod lexicon;
pub use lexicon::ValenceModel;

/// Upper bound on the article count requested in one news call.
const MAX_REQUEST_LIMIT: usize = 50;

/// Per-symbol news sentiment over a trailing window.
///
/// One news request covers the whole symbol set; articles are attributed to
/// every requested symbol they are tagged with.
pub struct SentimentScorer {
    provider: Arc<dyn NewsProvider>,
    model: ValenceModel,
}

impl SentimentScorer {
    pub fn new(provider: Arc<dyn NewsProvider>) -> Self {
        Self {
            provider,
            model: ValenceModel::new(),
        }
    }

    pub fn score_text(&self, text: &str) -> f64 {
        self.model.polarity(text)
    }

    pub fn score_article(&self, article: &NewsArticle) -> f64 {
        self.score_text(&article.text())
    }

    /// Mean article polarity per symbol (0.0 for symbols without news).
    /// A failed news call is returned as an error.
    pub async fn try_score_batch(
        &self,
        symbols: &[String],
        window: Duration,
        max_articles: usize,
    ) -> Result<HashMap<String, f64>, MarketDataError> {
        let requested: Vec<String> = symbols.iter().map(|s| normalize_symbol(s)).collect();
        if requested.is_empty() {
            return Ok(HashMap::new());
        }

        let end = Utc::now();
        let start = end - window;
        let limit = max_articles
            .saturating_mul(requested.len())
            .clamp(1, MAX_REQUEST_LIMIT);

        let articles = self.provider.news(&requested, start, end, limit).await?;

        let mut per_symbol: HashMap<&str, Vec<f64>> = HashMap::new();
        for article in &articles {
            let text = article.text();
            if text.trim().is_empty() {
                continue;
            }

            let tagged: Vec<&String> = requested
                .iter()
                .filter(|s| article.symbols.iter().any(|t| normalize_symbol(t) == **s))
                .collect();
            if tagged.is_empty() {
                continue;
            }

            let score = self.score_text(&text);
            for symbol in tagged {
                let scores = per_symbol.entry(symbol.as_str()).or_default();
                if scores.len() < max_articles.max(1) {
                    scores.push(score);
                }
            }
        }

        let result: HashMap<String, f64> = requested
            .iter()
            .map(|symbol| {
                let score = per_symbol
                    .get(symbol.as_str())
                    .filter(|scores| !scores.is_empty())
                    .map(|scores| scores.iter().sum::<f64>() / scores.len() as f64)
                    .unwrap_or(0.0);
                (symbol.clone(), score)
            })
            .collect();

        tracing::debug!(
            "Scored sentiment for {} symbols from {} articles",
            result.len(),
            articles.len()
        );

        Ok(result)
    }

    /// Like [`try_score_batch`](Self::try_score_batch), but a failed news
    /// call yields 0.0 for every symbol.
    pub async fn score_batch(
        &self,
        symbols: &[String],
        window: Duration,
        max_articles: usize,
    ) -> HashMap<String, f64> {
        match self.try_score_batch(symbols, window, max_articles).await {
            Ok(scores) => scores,
            Err(e) => {
                tracing::warn!("News sentiment unavailable, defaulting to neutral: {}", e);
                symbols
                    .iter()
                    .map(|s| (normalize_symbol(s), 0.0))
                    .collect()
            }
        }
    }
}
