//! # yfgate Web
//!
//! JSON REST facade over [`yfgate_core`].
//!
//! | Route | Handler |
//! |-------|---------|
//! | `GET /` | index page |
//! | `GET /api/ticker/:symbol` | ticker summary |
//! | `GET /api/ticker/:symbol/history` | OHLCV bars (`period`, `interval` query) |
//! | `GET /api/ticker/:symbol/financials` | annual statements |
//! | `GET /api/market/markets` | supported market keys |
//! | `GET /api/market/:market` | market status and summary |
//! | `GET /api/market/search/:query` | symbol search |
//! | `GET /api/cache` | cached response count |
//! | `DELETE /api/cache` | drop cached responses |

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use yfgate_core::{DataSource, UpstreamSession};

mod error;
mod extract;
mod handlers;

pub use error::{ApiError, RATE_LIMITED_MESSAGE};
pub use extract::{ApiPath, ApiQuery};
pub use handlers::{SearchResult, TickerSummary};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    source: Arc<dyn DataSource>,
    session: Arc<UpstreamSession>,
}

impl AppState {
    /// `session` is the transport behind `source`; the cache routes act on it.
    pub fn new(source: Arc<dyn DataSource>, session: Arc<UpstreamSession>) -> Self {
        Self { source, session }
    }
}

/// Build the application router with permissive CORS and request tracing.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/ticker/:symbol", get(handlers::ticker_info))
        .route("/ticker/:symbol/history", get(handlers::ticker_history))
        .route("/ticker/:symbol/financials", get(handlers::ticker_financials))
        .route("/market/markets", get(handlers::available_markets))
        .route("/market/search/:query", get(handlers::search))
        .route("/market/:market", get(handlers::market_info))
        .route(
            "/cache",
            get(handlers::cache_status).delete(handlers::clear_cache),
        );

    Router::new()
        .route("/", get(handlers::index))
        .nest("/api", api)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
