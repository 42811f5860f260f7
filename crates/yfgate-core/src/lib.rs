//! # yfgate Core
//!
//! Cached, rate-limited Yahoo Finance client behind the yfgate HTTP facade.
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapters`] | Yahoo Finance adapter and cookie/crumb auth |
//! | [`cache`] | In-memory TTL response cache |
//! | [`config`] | Environment-driven service configuration |
//! | [`data_source`] | Data source trait and request/error types |
//! | [`domain`] | Request parameters and response payloads |
//! | [`error`] | Request validation errors |
//! | [`http_client`] | HTTP client abstraction |
//! | [`retry`] | Rate-limit retry with exponential backoff |
//! | [`session`] | Cached, throttled transport wrapper |
//! | [`throttling`] | Per-second/minute/hour rate limiting |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use yfgate_core::{
//!     CacheStore, DataSource, MultiWindowLimiter, ReqwestHttpClient, ServiceConfig, Symbol,
//!     UpstreamSession, YahooClient,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServiceConfig::from_env();
//!     let session = Arc::new(UpstreamSession::new(
//!         Arc::new(ReqwestHttpClient::new()),
//!         CacheStore::new(config.cache_ttl),
//!         MultiWindowLimiter::new(config.rate_limits),
//!     ));
//!     let yahoo = YahooClient::from_config(&config, session);
//!
//!     let info = yahoo.ticker_info(&Symbol::parse("AAPL")?).await?;
//!     println!("{}", info.field_or_na("longName"));
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  REST handlers  │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │  YahooClient    │────▶│ Retry (429 only) │
//! └────────┬────────┘     └──────────────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ UpstreamSession │────▶│ Cache + Limiter  │
//! └────────┬────────┘     └──────────────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ reqwest client  │
//! └─────────────────┘
//! ```
//!
//! ## Error Handling
//!
//! ```rust
//! use yfgate_core::{SourceError, SourceErrorKind};
//!
//! fn status_for(error: &SourceError) -> u16 {
//!     match error.kind() {
//!         SourceErrorKind::RateLimited => 429,
//!         _ => 500,
//!     }
//! }
//!
//! assert_eq!(status_for(&SourceError::rate_limited("slow down")), 429);
//! ```

pub mod adapters;
pub mod cache;
pub mod config;
pub mod data_source;
pub mod domain;
pub mod error;
pub mod http_client;
pub mod retry;
pub mod session;
pub mod throttling;

// Adapter implementations
pub use adapters::{YahooAuthManager, YahooClient, SEARCH_QUOTES_COUNT};

// Caching
pub use cache::{CacheStore, CachedResponse, DEFAULT_CACHE_TTL};

// Configuration
pub use config::{get_env_or_default, ServiceConfig, UpstreamUrls};

// Data source trait and types
pub use data_source::{DataSource, HistoryRequest, SourceError, SourceErrorKind, SourceFuture};

// Domain models
pub use domain::{
    field_or_na, Bar, Financials, Interval, MarketSnapshot, Period, PriceHistory, SearchQuote,
    StatementKind, StatementTable, Symbol, TickerInfo, AVAILABLE_MARKETS, NOT_AVAILABLE,
};

// Error types
pub use error::ValidationError;

// HTTP client types
pub use http_client::{
    HttpClient, HttpError, HttpFuture, HttpRequest, HttpResponse, ReqwestHttpClient,
};

// Retry logic
pub use retry::{retry_rate_limited, Backoff, RetryConfig};

// Session and throttling
pub use session::UpstreamSession;
pub use throttling::{MultiWindowLimiter, RateLimits};
