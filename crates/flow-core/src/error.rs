use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MarketDataError {
    #[error("Validation error: {0}")]
    Validation(String),

    /// Retryable failure. Only seen inside the retry loop; callers receive
    /// `Upstream` once attempts are exhausted.
    #[error("Transient error from {upstream} (status {status:?}): {body}")]
    UpstreamTransient {
        upstream: String,
        status: Option<u16>,
        body: String,
    },

    #[error("Upstream error from {upstream} (status {status:?}): {body}")]
    Upstream {
        upstream: String,
        status: Option<u16>,
        body: String,
    },

    #[error("No data: {0}")]
    NoData(String),

    #[error("Decode error: {0}")]
    Decode(String),
}

impl MarketDataError {
    pub fn is_transient(&self) -> bool {
        matches!(self, MarketDataError::UpstreamTransient { .. })
    }

    /// HTTP status of the failed call, when there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            MarketDataError::UpstreamTransient { status, .. }
            | MarketDataError::Upstream { status, .. } => *status,
            _ => None,
        }
    }

    /// Collapse a transient failure into the terminal form surfaced after retries.
    pub fn into_terminal(self) -> Self {
        match self {
            MarketDataError::UpstreamTransient {
                upstream,
                status,
                body,
            } => MarketDataError::Upstream {
                upstream,
                status,
                body,
            },
            other => other,
        }
    }
}
