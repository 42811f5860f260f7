//! # Domain Models
//!
//! Request parameters and the reshaped upstream payloads served by the facade.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Symbol`] | Validated Yahoo ticker |
//! | [`Period`] | History lookback (`1mo`, `ytd`, `max`, ...) |
//! | [`Interval`] | History granularity (`1m`, `1d`, `1wk`, ...) |
//! | [`Bar`] / [`PriceHistory`] | OHLCV rows |
//! | [`StatementTable`] / [`Financials`] | Annual statements, one row per line item |
//! | [`TickerInfo`] | Flattened ticker metadata |
//! | [`MarketSnapshot`] | Market status and per-exchange summary |
//! | [`SearchQuote`] | One search hit |
//!
//! Payload types carry no invariants of their own beyond what the upstream
//! returns; only request parameters are validated.

mod interval;
mod models;
mod period;
mod symbol;

pub use interval::Interval;
pub use models::{
    field_or_na, Bar, Financials, MarketSnapshot, PriceHistory, SearchQuote, StatementKind,
    StatementTable, TickerInfo, AVAILABLE_MARKETS, NOT_AVAILABLE,
};
pub use period::Period;
pub use symbol::Symbol;
