//! Route handlers: call the data source, keep the fields the API exposes.

use axum::extract::State;
use axum::response::Html;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use yfgate_core::{
    Financials, HistoryRequest, MarketSnapshot, PriceHistory, SearchQuote, Symbol, TickerInfo,
    AVAILABLE_MARKETS,
};

use crate::error::ApiError;
use crate::extract::{ApiPath, ApiQuery};
use crate::AppState;

const INDEX_HTML: &str = include_str!("../assets/index.html");

type ApiResult<T> = Result<Json<T>, ApiError>;

pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// Ticker fields exposed by `GET /api/ticker/{symbol}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickerSummary {
    pub symbol: Symbol,
    pub name: Value,
    pub current_price: Value,
    pub market_cap: Value,
    pub sector: Value,
    pub industry: Value,
    pub country: Value,
    pub website: Value,
    pub description: Value,
    pub previous_close: Value,
    pub open: Value,
    pub day_low: Value,
    pub day_high: Value,
    pub year_low: Value,
    pub year_high: Value,
    pub dividend_yield: Value,
    pub pe_ratio: Value,
    pub beta: Value,
}

impl TickerSummary {
    pub fn from_info(symbol: Symbol, info: &TickerInfo) -> Self {
        Self {
            symbol,
            name: info.field_or_na("longName"),
            current_price: info.field_or_na("currentPrice"),
            market_cap: info.field_or_na("marketCap"),
            sector: info.field_or_na("sector"),
            industry: info.field_or_na("industry"),
            country: info.field_or_na("country"),
            website: info.field_or_na("website"),
            description: info.field_or_na("longBusinessSummary"),
            previous_close: info.field_or_na("previousClose"),
            open: info.field_or_na("open"),
            day_low: info.field_or_na("dayLow"),
            day_high: info.field_or_na("dayHigh"),
            year_low: info.field_or_na("fiftyTwoWeekLow"),
            year_high: info.field_or_na("fiftyTwoWeekHigh"),
            dividend_yield: info.field_or_na("dividendYield"),
            pe_ratio: info.field_or_na("trailingPE"),
            beta: info.field_or_na("beta"),
        }
    }
}

pub async fn ticker_info(
    State(state): State<AppState>,
    ApiPath(symbol): ApiPath<String>,
) -> ApiResult<TickerSummary> {
    let symbol = Symbol::parse(&symbol)?;
    let info = state.source.ticker_info(&symbol).await?;
    Ok(Json(TickerSummary::from_info(symbol, &info)))
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryParams {
    pub period: Option<String>,
    pub interval: Option<String>,
}

pub async fn ticker_history(
    State(state): State<AppState>,
    ApiPath(symbol): ApiPath<String>,
    ApiQuery(params): ApiQuery<HistoryParams>,
) -> ApiResult<PriceHistory> {
    let request = HistoryRequest::parse(
        &symbol,
        params.period.as_deref(),
        params.interval.as_deref(),
    )?;
    Ok(Json(state.source.history(&request).await?))
}

#[derive(Debug, Serialize)]
pub struct FinancialsResponse {
    pub symbol: Symbol,
    #[serde(flatten)]
    pub statements: Financials,
}

pub async fn ticker_financials(
    State(state): State<AppState>,
    ApiPath(symbol): ApiPath<String>,
) -> ApiResult<FinancialsResponse> {
    let symbol = Symbol::parse(&symbol)?;
    let statements = state.source.financials(&symbol).await?;
    Ok(Json(FinancialsResponse { symbol, statements }))
}

#[derive(Debug, Serialize)]
pub struct MarketsResponse {
    pub markets: &'static [&'static str],
}

pub async fn available_markets() -> Json<MarketsResponse> {
    Json(MarketsResponse {
        markets: &AVAILABLE_MARKETS,
    })
}

#[derive(Debug, Serialize)]
pub struct MarketResponse {
    pub market: String,
    #[serde(flatten)]
    pub snapshot: MarketSnapshot,
}

pub async fn market_info(
    State(state): State<AppState>,
    ApiPath(market): ApiPath<String>,
) -> ApiResult<MarketResponse> {
    let snapshot = state.source.market(&market).await?;
    Ok(Json(MarketResponse { market, snapshot }))
}

/// One hit of `GET /api/market/search/{query}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub symbol: Value,
    pub name: Value,
    #[serde(rename = "type")]
    pub quote_type: Value,
    pub exchange: Value,
    pub price: Value,
}

impl From<&SearchQuote> for SearchResult {
    fn from(quote: &SearchQuote) -> Self {
        Self {
            symbol: quote.field_or_na("symbol"),
            name: quote.field_or_na("shortname"),
            quote_type: quote.field_or_na("quoteType"),
            exchange: quote.field_or_na("exchange"),
            price: quote.field_or_na("regularMarketPrice"),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<SearchResult>,
}

pub async fn search(
    State(state): State<AppState>,
    ApiPath(query): ApiPath<String>,
) -> ApiResult<SearchResponse> {
    let quotes = state.source.search(&query).await?;
    let results = quotes.iter().map(SearchResult::from).collect();
    Ok(Json(SearchResponse { query, results }))
}

#[derive(Debug, Serialize)]
pub struct CacheStatus {
    pub size: usize,
}

#[derive(Debug, Serialize)]
pub struct CacheCleared {
    pub cleared: bool,
    pub size: usize,
}

pub async fn cache_status(State(state): State<AppState>) -> Json<CacheStatus> {
    Json(CacheStatus {
        size: state.session.cache_size().await,
    })
}

pub async fn clear_cache(State(state): State<AppState>) -> Json<CacheCleared> {
    state.session.clear_cache().await;
    let size = state.session.cache_size().await;
    info!(size, "response cache cleared via API");
    Json(CacheCleared {
        cleared: true,
        size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    #[test]
    fn ticker_summary_renames_and_defaults_fields() {
        let mut fields = Map::new();
        fields.insert("longName".into(), json!("Apple Inc."));
        fields.insert("trailingPE".into(), json!(29.1));
        fields.insert("beta".into(), Value::Null);

        let summary = TickerSummary::from_info(
            Symbol::parse("aapl").expect("valid"),
            &TickerInfo(fields),
        );
        let value = serde_json::to_value(&summary).expect("serializes");

        assert_eq!(value["symbol"], json!("AAPL"));
        assert_eq!(value["name"], json!("Apple Inc."));
        assert_eq!(value["peRatio"], json!(29.1));
        assert_eq!(value["beta"], Value::Null);
        assert_eq!(value["yearHigh"], json!("N/A"));
        assert_eq!(value.as_object().map(Map::len), Some(18));
    }

    #[test]
    fn search_result_uses_type_key() {
        let mut fields = Map::new();
        fields.insert("symbol".into(), json!("BTC-USD"));
        fields.insert("quoteType".into(), json!("CRYPTOCURRENCY"));

        let value = serde_json::to_value(SearchResult::from(&SearchQuote(fields)))
            .expect("serializes");
        assert_eq!(value["type"], json!("CRYPTOCURRENCY"));
        assert_eq!(value["price"], json!("N/A"));
    }
}
