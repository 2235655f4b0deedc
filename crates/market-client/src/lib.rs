pub mod alpaca;
pub mod client;
pub mod rate_limiter;
pub mod retry;
pub mod tradier;
pub mod transport;

pub use alpaca::AlpacaClient;
pub use client::ResilientApiClient;
pub use rate_limiter::RateLimiter;
pub use retry::RetryPolicy;
pub use tradier::TradierClient;
pub use transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, TransportError};
