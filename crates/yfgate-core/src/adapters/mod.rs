//! Upstream adapters implementing [`DataSource`](crate::DataSource).

mod yahoo;

pub use yahoo::{YahooAuthManager, YahooClient, SEARCH_QUOTES_COUNT};
