use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::MarketDataError;

/// 1-5 letters with an optional single-letter share class (e.g. `BRK.B`).
static TICKER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Z]{1,5}(\.[A-Z])?$").expect("ticker pattern is a valid regex")
});

/// Canonical form used for every cache and map key.
///
/// Uppercases, drops an exchange prefix (`XNAS:AAPL`), unifies share-class
/// separators (`BRK/B`, `BRK-B` -> `BRK.B`) and strips trailing market codes
/// of two or more characters (`AAPL.US`). Idempotent.
pub fn normalize_symbol(raw: &str) -> String {
    let upper = raw.trim().to_ascii_uppercase();
    let bare = match upper.rsplit_once(':') {
        Some((_, ticker)) => ticker,
        None => upper.as_str(),
    };

    let mut symbol: String = bare
        .chars()
        .map(|c| if c == '/' || c == '-' { '.' } else { c })
        .collect();

    while let Some((head, suffix)) = symbol.rsplit_once('.') {
        if suffix.len() < 2 {
            break;
        }
        symbol = head.to_string();
    }

    symbol
}

pub fn is_valid_ticker(symbol: &str) -> bool {
    TICKER_PATTERN.is_match(symbol)
}

/// Normalize and validate a raw symbol.
pub fn parse_symbol(raw: &str) -> Result<String, MarketDataError> {
    let symbol = normalize_symbol(raw);
    if is_valid_ticker(&symbol) {
        Ok(symbol)
    } else {
        Err(MarketDataError::Validation(format!(
            "invalid ticker symbol: {:?}",
            raw
        )))
    }
}

/// Split raw input into unique normalized tickers (input order kept) and
/// the rejected entries.
pub fn partition_symbols(raw: &[String]) -> (Vec<String>, Vec<MarketDataError>) {
    let mut seen = HashSet::new();
    let mut valid = Vec::with_capacity(raw.len());
    let mut rejected = Vec::new();

    for input in raw {
        match parse_symbol(input) {
            Ok(symbol) => {
                if seen.insert(symbol.clone()) {
                    valid.push(symbol);
                }
            }
            Err(e) => rejected.push(e),
        }
    }

    (valid, rejected)
}
