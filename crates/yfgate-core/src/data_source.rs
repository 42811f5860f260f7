//! Data source trait and its error type.
//!
//! [`DataSource`] is the seam between the HTTP facade and the upstream client.
//! The production implementation is [`YahooClient`](crate::YahooClient).
//!
//! | Operation | Request | Response |
//! |-----------|---------|----------|
//! | Ticker info | [`Symbol`] | [`TickerInfo`] |
//! | History | [`HistoryRequest`] | [`PriceHistory`] |
//! | Financials | [`Symbol`] | [`Financials`] |
//! | Market | market key | [`MarketSnapshot`] |
//! | Search | query | [`SearchQuote`] list |

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use crate::{
    Financials, Interval, MarketSnapshot, Period, PriceHistory, SearchQuote, Symbol, TickerInfo,
    ValidationError,
};

/// Boxed future returned by [`DataSource`] operations.
pub type SourceFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, SourceError>> + Send + 'a>>;

/// Upstream error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceErrorKind {
    RateLimited,
    Unavailable,
    InvalidRequest,
    NotFound,
    Internal,
}

/// Structured error produced by upstream calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError {
    kind: SourceErrorKind,
    message: String,
    retryable: bool,
}

impl SourceError {
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::RateLimited,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Unavailable,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::InvalidRequest,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::NotFound,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Internal,
            message: message.into(),
            retryable: false,
        }
    }

    pub const fn kind(&self) -> SourceErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Only rate-limit errors are retried.
    pub const fn retryable(&self) -> bool {
        self.retryable
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            SourceErrorKind::RateLimited => "source.rate_limited",
            SourceErrorKind::Unavailable => "source.unavailable",
            SourceErrorKind::InvalidRequest => "source.invalid_request",
            SourceErrorKind::NotFound => "source.not_found",
            SourceErrorKind::Internal => "source.internal",
        }
    }
}

impl Display for SourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for SourceError {}

impl From<ValidationError> for SourceError {
    fn from(error: ValidationError) -> Self {
        Self::invalid_request(error.to_string())
    }
}

/// Request payload for price history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRequest {
    pub symbol: Symbol,
    pub period: Period,
    pub interval: Interval,
}

impl HistoryRequest {
    pub fn new(symbol: Symbol, period: Period, interval: Interval) -> Self {
        Self {
            symbol,
            period,
            interval,
        }
    }

    /// Parse raw query parameters, applying the `1mo` / `1d` defaults when absent.
    pub fn parse(
        symbol: &str,
        period: Option<&str>,
        interval: Option<&str>,
    ) -> Result<Self, ValidationError> {
        let symbol = Symbol::parse(symbol)?;
        let period = period.map(str::parse::<Period>).transpose()?.unwrap_or_default();
        let interval = interval.map(str::parse::<Interval>).transpose()?.unwrap_or_default();
        Ok(Self::new(symbol, period, interval))
    }
}

/// Financial data source behind the REST routes.
///
/// Implementations must be `Send + Sync`; one instance is shared by every request.
pub trait DataSource: Send + Sync {
    /// Flattened metadata for a ticker.
    fn ticker_info<'a>(&'a self, symbol: &'a Symbol) -> SourceFuture<'a, TickerInfo>;

    /// OHLCV history over a period at an interval.
    fn history<'a>(&'a self, req: &'a HistoryRequest) -> SourceFuture<'a, PriceHistory>;

    /// Annual income statement, balance sheet and cash flow.
    fn financials<'a>(&'a self, symbol: &'a Symbol) -> SourceFuture<'a, Financials>;

    /// Trading status and summary quotes for a market key such as `US`.
    fn market<'a>(&'a self, market: &'a str) -> SourceFuture<'a, MarketSnapshot>;

    /// Quotes matching a free-text query.
    fn search<'a>(&'a self, query: &'a str) -> SourceFuture<'a, Vec<SearchQuote>>;
}
