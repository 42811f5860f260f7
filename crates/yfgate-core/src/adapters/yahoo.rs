use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::{Map, Value};
use time::macros::format_description;
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::config::{ServiceConfig, UpstreamUrls};
use crate::data_source::{DataSource, HistoryRequest, SourceError, SourceFuture};
use crate::http_client::{HttpClient, HttpRequest, HttpResponse};
use crate::retry::{retry_rate_limited, RetryConfig};
use crate::{
    Bar, Financials, MarketSnapshot, PriceHistory, SearchQuote, StatementKind, StatementTable,
    Symbol, TickerInfo, ValidationError,
};

const REFERER: &str = "https://finance.yahoo.com/";

/// Modules merged into [`TickerInfo`], highest priority first.
const INFO_MODULES: [&str; 6] = [
    "financialData",
    "summaryDetail",
    "defaultKeyStatistics",
    "price",
    "quoteType",
    "assetProfile",
];

/// Search results returned per query.
pub const SEARCH_QUOTES_COUNT: usize = 8;

/// Earliest statement date requested from the time-series endpoint (1985-08-22).
const TIMESERIES_PERIOD_START: i64 = 493_590_046;

// ============================================================================
// Yahoo Auth Manager - Handles cookie/crumb authentication
// ============================================================================

/// Manages Yahoo Finance cookie/crumb authentication.
///
/// Yahoo's unofficial API requires:
/// 1. Session cookie from fc.yahoo.com (kept by the transport's cookie jar)
/// 2. Crumb token from `/v1/test/getcrumb`, passed as a query parameter
#[derive(Debug)]
pub struct YahooAuthManager {
    crumb: Mutex<Option<(String, Instant)>>,
    /// Serializes refreshes so concurrent requests share one handshake.
    refresh: tokio::sync::Mutex<()>,
    ttl: Duration,
}

impl Default for YahooAuthManager {
    fn default() -> Self {
        Self::new(Duration::from_secs(3600))
    }
}

impl YahooAuthManager {
    pub fn new(ttl: Duration) -> Self {
        Self {
            crumb: Mutex::new(None),
            refresh: tokio::sync::Mutex::new(()),
            ttl,
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<(String, Instant)>> {
        self.crumb.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cached_crumb(&self) -> Option<String> {
        self.slot()
            .as_ref()
            .filter(|(_, fetched_at)| fetched_at.elapsed() < self.ttl)
            .map(|(value, _)| value.clone())
    }

    /// Current crumb, running the cookie/crumb handshake when none is cached.
    pub async fn crumb(
        &self,
        http: &dyn HttpClient,
        urls: &UpstreamUrls,
        timeout_ms: u64,
    ) -> Result<String, SourceError> {
        if let Some(crumb) = self.cached_crumb() {
            return Ok(crumb);
        }

        let _guard = self.refresh.lock().await;
        // Another request may have refreshed while we waited.
        if let Some(crumb) = self.cached_crumb() {
            return Ok(crumb);
        }

        let crumb = fetch_crumb(http, urls, timeout_ms).await?;
        *self.slot() = Some((crumb.clone(), Instant::now()));
        Ok(crumb)
    }

    /// Invalidate cached auth (triggers refresh on next call)
    pub fn invalidate(&self) {
        *self.slot() = None;
    }
}

async fn fetch_crumb(
    http: &dyn HttpClient,
    urls: &UpstreamUrls,
    timeout_ms: u64,
) -> Result<String, SourceError> {
    // The cookie host answers 404 but still sets the session cookie.
    let cookie_request = HttpRequest::get(urls.cookie.clone())
        .with_header("referer", REFERER)
        .with_timeout_ms(timeout_ms)
        .uncached();
    http.execute(cookie_request).await.map_err(|e| {
        SourceError::unavailable(format!("failed to fetch Yahoo cookie: {}", e.message()))
    })?;

    for host in [&urls.query1, &urls.query2] {
        let crumb_request = HttpRequest::get(format!("{host}/v1/test/getcrumb"))
            .with_header("referer", REFERER)
            .with_timeout_ms(timeout_ms)
            .uncached();

        let response = match http.execute(crumb_request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(host = %host, error = %e, "crumb request failed");
                continue;
            }
        };

        if response.is_rate_limited() {
            return Err(SourceError::rate_limited(
                "Too Many Requests. Rate limited while fetching Yahoo crumb.",
            ));
        }

        let body = response.body.trim();
        if !response.is_success() || body.is_empty() {
            continue;
        }
        if body.contains("<html") || body.contains("<!DOCTYPE") {
            continue;
        }
        if body.len() < 100 && !body.contains(char::is_whitespace) {
            debug!(host = %host, "obtained Yahoo crumb");
            return Ok(body.to_owned());
        }
    }

    Err(SourceError::unavailable(
        "failed to fetch Yahoo crumb from all endpoints",
    ))
}

// ============================================================================
// Yahoo Client
// ============================================================================

/// Yahoo Finance client; every operation runs inside the rate-limit retry loop.
#[derive(Clone)]
pub struct YahooClient {
    http: Arc<dyn HttpClient>,
    urls: UpstreamUrls,
    retry: RetryConfig,
    timeout_ms: u64,
    auth: Arc<YahooAuthManager>,
}

impl YahooClient {
    pub fn new(
        http: Arc<dyn HttpClient>,
        urls: UpstreamUrls,
        retry: RetryConfig,
        timeout_ms: u64,
    ) -> Self {
        Self {
            http,
            urls,
            retry,
            timeout_ms,
            auth: Arc::new(YahooAuthManager::default()),
        }
    }

    pub fn from_config(config: &ServiceConfig, http: Arc<dyn HttpClient>) -> Self {
        Self::new(http, config.urls.clone(), config.retry, config.timeout_ms)
    }

    /// GET `url` with the crumb appended, refreshing the crumb once on 401.
    async fn get_body(&self, url: &str) -> Result<String, SourceError> {
        let crumb = self.crumb().await?;
        let response = self.send(&with_crumb(url, &crumb)).await?;

        let response = if response.status == 401 {
            debug!(url, "crumb rejected, refreshing auth");
            self.auth.invalidate();
            let crumb = self.crumb().await?;
            self.send(&with_crumb(url, &crumb)).await?
        } else {
            response
        };

        check_status(response)
    }

    async fn crumb(&self) -> Result<String, SourceError> {
        self.auth
            .crumb(self.http.as_ref(), &self.urls, self.timeout_ms)
            .await
    }

    async fn send(&self, url: &str) -> Result<HttpResponse, SourceError> {
        debug!(url, "upstream request");
        let request = HttpRequest::get(url)
            .with_header("referer", REFERER)
            .with_timeout_ms(self.timeout_ms);

        self.http
            .execute(request)
            .await
            .map_err(|e| SourceError::unavailable(format!("yahoo transport error: {}", e.message())))
    }

    async fn fetch_ticker_info(&self, symbol: &Symbol) -> Result<TickerInfo, SourceError> {
        let encoded = urlencoding::encode(symbol.as_str());
        let url = format!(
            "{}/v10/finance/quoteSummary/{encoded}?modules={}&corsDomain=finance.yahoo.com&formatted=false&symbol={encoded}",
            self.urls.query2,
            INFO_MODULES.join(","),
        );

        let body = self.get_body(&url).await?;
        parse_ticker_info(&body, symbol)
    }

    async fn fetch_history(&self, req: &HistoryRequest) -> Result<PriceHistory, SourceError> {
        let url = format!(
            "{}/v8/finance/chart/{}?range={}&interval={}&includePrePost=false&events=div%2Csplits",
            self.urls.query2,
            urlencoding::encode(req.symbol.as_str()),
            req.period,
            req.interval,
        );

        let body = self.get_body(&url).await?;
        let bars = parse_chart(&body)?;
        Ok(PriceHistory::new(
            req.symbol.clone(),
            req.period,
            req.interval,
            bars,
        ))
    }

    async fn fetch_statement(
        &self,
        symbol: &Symbol,
        kind: StatementKind,
        period_end: i64,
    ) -> Result<StatementTable, SourceError> {
        let encoded = urlencoding::encode(symbol.as_str());
        let types = kind
            .line_items()
            .iter()
            .map(|item| format!("annual{item}"))
            .collect::<Vec<_>>()
            .join(",");
        let url = format!(
            "{}/ws/fundamentals-timeseries/v1/finance/timeseries/{encoded}?symbol={encoded}&type={types}&period1={TIMESERIES_PERIOD_START}&period2={period_end}",
            self.urls.query2,
        );

        let body = self.get_body(&url).await?;
        parse_timeseries(&body, kind)
    }

    async fn fetch_financials(&self, symbol: &Symbol) -> Result<Financials, SourceError> {
        let period_end = statement_period_end(OffsetDateTime::now_utc());
        let mut financials = Financials::default();
        for kind in StatementKind::ALL {
            *financials.statement_mut(kind) = self.fetch_statement(symbol, kind, period_end).await?;
        }
        Ok(financials)
    }

    async fn fetch_market(&self, market: &str) -> Result<MarketSnapshot, SourceError> {
        let encoded = urlencoding::encode(market);
        let status_url = format!(
            "{}/v6/finance/markettime?formatted=true&key=finance&lang=en-US&region={encoded}",
            self.urls.query1,
        );
        let summary_url = format!(
            "{}/v6/finance/quote/marketSummary?fields=shortName,regularMarketPrice,regularMarketChange,regularMarketChangePercent&formatted=false&lang=en-US&market={encoded}",
            self.urls.query1,
        );

        let status = parse_market_status(&self.get_body(&status_url).await?)?;
        let summary = parse_market_summary(&self.get_body(&summary_url).await?)?;
        Ok(MarketSnapshot { status, summary })
    }

    async fn fetch_search(&self, query: &str) -> Result<Vec<SearchQuote>, SourceError> {
        let url = format!(
            "{}/v1/finance/search?q={}&quotesCount={SEARCH_QUOTES_COUNT}&newsCount=0&enableFuzzyQuery=false&quotesQueryId=tss_match_phrase_query",
            self.urls.query2,
            urlencoding::encode(query),
        );

        let body = self.get_body(&url).await?;
        parse_search(&body)
    }
}

impl DataSource for YahooClient {
    fn ticker_info<'a>(&'a self, symbol: &'a Symbol) -> SourceFuture<'a, TickerInfo> {
        Box::pin(async move {
            retry_rate_limited(&self.retry, || self.fetch_ticker_info(symbol)).await
        })
    }

    fn history<'a>(&'a self, req: &'a HistoryRequest) -> SourceFuture<'a, PriceHistory> {
        Box::pin(async move { retry_rate_limited(&self.retry, || self.fetch_history(req)).await })
    }

    fn financials<'a>(&'a self, symbol: &'a Symbol) -> SourceFuture<'a, Financials> {
        Box::pin(async move {
            retry_rate_limited(&self.retry, || self.fetch_financials(symbol)).await
        })
    }

    fn market<'a>(&'a self, market: &'a str) -> SourceFuture<'a, MarketSnapshot> {
        Box::pin(async move {
            let market = market.trim();
            if market.is_empty() {
                return Err(ValidationError::EmptyMarket.into());
            }
            retry_rate_limited(&self.retry, || self.fetch_market(market)).await
        })
    }

    fn search<'a>(&'a self, query: &'a str) -> SourceFuture<'a, Vec<SearchQuote>> {
        Box::pin(async move {
            let query = query.trim();
            if query.is_empty() {
                return Err(ValidationError::EmptyQuery.into());
            }
            retry_rate_limited(&self.retry, || self.fetch_search(query)).await
        })
    }
}

// ============================================================================
// Response handling
// ============================================================================

fn with_crumb(url: &str, crumb: &str) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}crumb={}", urlencoding::encode(crumb))
}

/// Map an upstream response to its body or a classified error.
fn check_status(response: HttpResponse) -> Result<String, SourceError> {
    if response.is_rate_limited() {
        return Err(SourceError::rate_limited(
            "Too Many Requests. Rate limited. Try after a while.",
        ));
    }
    if response.is_success() {
        return Ok(response.body);
    }

    let description = upstream_error_description(&response.body);
    match response.status {
        404 => Err(SourceError::not_found(
            description.unwrap_or_else(|| String::from("yahoo returned status 404")),
        )),
        status => Err(SourceError::unavailable(match description {
            Some(description) => format!("yahoo returned status {status}: {description}"),
            None => format!("yahoo returned status {status}"),
        })),
    }
}

/// Yahoo wraps errors as `{"<root>": {"error": {"code": .., "description": ..}}}`.
fn upstream_error_description(body: &str) -> Option<String> {
    let value = serde_json::from_str::<Value>(body).ok()?;
    value
        .as_object()?
        .values()
        .filter_map(|root| root.get("error"))
        .find_map(error_description)
}

fn error_description(error: &Value) -> Option<String> {
    match error {
        Value::Null => None,
        Value::String(message) if !message.is_empty() => Some(message.clone()),
        Value::Object(fields) => fields
            .get("description")
            .or_else(|| fields.get("code"))
            .and_then(Value::as_str)
            .map(str::to_owned),
        _ => None,
    }
}

fn parse_json<'de, T: Deserialize<'de>>(body: &'de str, what: &str) -> Result<T, SourceError> {
    serde_json::from_str(body)
        .map_err(|e| SourceError::internal(format!("failed to parse yahoo {what}: {e}")))
}

/// Fail with the embedded upstream error, if any.
fn check_embedded_error(error: &Option<Value>) -> Result<(), SourceError> {
    match error.as_ref().and_then(error_description) {
        Some(description) => Err(SourceError::not_found(description)),
        None => Ok(()),
    }
}

/// Replace `{raw, fmt}` wrappers with their raw value and drop empty objects.
fn flatten_value(value: &Value) -> Option<Value> {
    match value {
        Value::Object(fields) if fields.contains_key("raw") => fields.get("raw").cloned(),
        Value::Object(fields) if fields.is_empty() => None,
        other => Some(other.clone()),
    }
}

#[derive(Debug, Deserialize)]
struct QuoteSummaryResponse {
    #[serde(rename = "quoteSummary")]
    quote_summary: QuoteSummaryData,
}

#[derive(Debug, Deserialize)]
struct QuoteSummaryData {
    #[serde(default)]
    result: Option<Vec<Map<String, Value>>>,
    #[serde(default)]
    error: Option<Value>,
}

fn parse_ticker_info(body: &str, symbol: &Symbol) -> Result<TickerInfo, SourceError> {
    let response: QuoteSummaryResponse = parse_json(body, "quote summary")?;
    check_embedded_error(&response.quote_summary.error)?;

    let modules = response
        .quote_summary
        .result
        .and_then(|results| results.into_iter().next())
        .ok_or_else(|| SourceError::not_found(format!("no info found for symbol {symbol}")))?;

    let mut info = Map::new();
    for module in INFO_MODULES {
        let Some(Value::Object(fields)) = modules.get(module) else {
            continue;
        };
        for (key, value) in fields {
            if key == "maxAge" || info.contains_key(key) {
                continue;
            }
            if let Some(flat) = flatten_value(value) {
                info.insert(key.clone(), flat);
            }
        }
    }

    Ok(TickerInfo(info))
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartData,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Option<Vec<i64>>,
    indicators: ChartIndicators,
}

#[derive(Debug, Default, Deserialize)]
struct ChartMeta {
    /// Exchange offset from UTC in seconds.
    #[serde(default)]
    gmtoffset: i64,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<ChartQuote>,
}

#[derive(Debug, Default, Deserialize)]
struct ChartQuote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<i64>>,
}

fn parse_chart(body: &str) -> Result<Vec<Bar>, SourceError> {
    let response: ChartResponse = parse_json(body, "chart")?;
    check_embedded_error(&response.chart.error)?;

    let result = response
        .chart
        .result
        .and_then(|results| results.into_iter().next())
        .ok_or_else(|| SourceError::not_found("no chart data in response"))?;

    let Some(timestamps) = result.timestamp else {
        return Ok(Vec::new());
    };
    let quote = result.indicators.quote.into_iter().next().unwrap_or_default();

    let mut bars = Vec::with_capacity(timestamps.len());
    for (i, ts) in timestamps.into_iter().enumerate() {
        let cell = |series: &[Option<f64>]| series.get(i).copied().flatten().filter(|v| v.is_finite());
        let (Some(open), Some(high), Some(low), Some(close)) = (
            cell(&quote.open),
            cell(&quote.high),
            cell(&quote.low),
            cell(&quote.close),
        ) else {
            continue;
        };

        let volume = quote
            .volume
            .get(i)
            .copied()
            .flatten()
            .map_or(0, |v| v.max(0) as u64);

        bars.push(Bar {
            date: local_date(ts, result.meta.gmtoffset)?,
            open,
            high,
            low,
            close,
            volume,
        });
    }

    Ok(bars)
}

fn local_date(unix_ts: i64, gmtoffset: i64) -> Result<String, SourceError> {
    let local = OffsetDateTime::from_unix_timestamp(unix_ts.saturating_add(gmtoffset))
        .map_err(|e| SourceError::internal(format!("invalid timestamp {unix_ts}: {e}")))?;
    format_date(local)
}

fn format_date(value: OffsetDateTime) -> Result<String, SourceError> {
    value
        .format(format_description!("[year]-[month]-[day]"))
        .map_err(|e| SourceError::internal(format!("failed to format date: {e}")))
}

/// Unix timestamp of the start of today (UTC), so statement URLs stay stable within a day.
fn statement_period_end(now: OffsetDateTime) -> i64 {
    now.replace_time(time::Time::MIDNIGHT).unix_timestamp()
}

#[derive(Debug, Deserialize)]
struct TimeseriesResponse {
    timeseries: TimeseriesData,
}

#[derive(Debug, Deserialize)]
struct TimeseriesData {
    #[serde(default)]
    result: Option<Vec<Map<String, Value>>>,
    #[serde(default)]
    error: Option<Value>,
}

fn parse_timeseries(body: &str, kind: StatementKind) -> Result<StatementTable, SourceError> {
    let response: TimeseriesResponse = parse_json(body, "fundamentals time series")?;
    check_embedded_error(&response.timeseries.error)?;

    let mut cells = Vec::new();
    for series in response.timeseries.result.unwrap_or_default() {
        let Some(series_type) = series
            .get("meta")
            .and_then(|meta| meta.get("type"))
            .and_then(|types| types.get(0))
            .and_then(Value::as_str)
        else {
            continue;
        };
        let item = series_type.strip_prefix("annual").unwrap_or(series_type);
        let Some(rank) = kind.line_items().iter().position(|known| *known == item) else {
            continue;
        };

        let entries = series
            .get(series_type)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for entry in entries {
            let Some(date) = entry.get("asOfDate").and_then(Value::as_str) else {
                continue;
            };
            let value = entry
                .get("reportedValue")
                .and_then(|reported| reported.get("raw"))
                .and_then(Value::as_f64);
            cells.push((rank, item.to_owned(), date.to_owned(), value));
        }
    }

    cells.sort_by_key(|(rank, ..)| *rank);
    Ok(StatementTable::from_cells(
        cells
            .into_iter()
            .map(|(_, item, date, value)| (item, date, value)),
    ))
}

#[derive(Debug, Deserialize)]
struct MarketTimeResponse {
    finance: MarketTimeFinance,
}

#[derive(Debug, Deserialize)]
struct MarketTimeFinance {
    #[serde(default, rename = "marketTimes")]
    market_times: Vec<MarketTimes>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct MarketTimes {
    #[serde(default, rename = "marketTime")]
    market_time: Vec<Map<String, Value>>,
}

fn parse_market_status(body: &str) -> Result<Value, SourceError> {
    let response: MarketTimeResponse = parse_json(body, "market time")?;
    check_embedded_error(&response.finance.error)?;

    let mut status = response
        .finance
        .market_times
        .into_iter()
        .next()
        .and_then(|times| times.market_time.into_iter().next())
        .ok_or_else(|| SourceError::not_found("no market status in response"))?;

    // Timezone arrives as a one-element list.
    let zone = match status.get("timezone") {
        Some(Value::Array(zones)) => zones.first().cloned(),
        _ => None,
    };
    if let Some(zone) = zone {
        status.insert(String::from("timezone"), zone);
    }
    status.remove("time");

    Ok(Value::Object(status))
}

#[derive(Debug, Deserialize)]
struct MarketSummaryResponse {
    #[serde(rename = "marketSummaryResponse")]
    market_summary: MarketSummaryData,
}

#[derive(Debug, Deserialize)]
struct MarketSummaryData {
    #[serde(default)]
    result: Option<Vec<Map<String, Value>>>,
    #[serde(default)]
    error: Option<Value>,
}

fn parse_market_summary(body: &str) -> Result<Map<String, Value>, SourceError> {
    let response: MarketSummaryResponse = parse_json(body, "market summary")?;
    check_embedded_error(&response.market_summary.error)?;

    let mut summary = Map::new();
    for quote in response.market_summary.result.unwrap_or_default() {
        let Some(exchange) = quote
            .get("exchange")
            .and_then(Value::as_str)
            .map(str::to_owned)
        else {
            continue;
        };
        summary.insert(exchange, Value::Object(quote));
    }
    Ok(summary)
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    quotes: Vec<Value>,
}

fn parse_search(body: &str) -> Result<Vec<SearchQuote>, SourceError> {
    let response: SearchResponse = parse_json(body, "search")?;
    Ok(response
        .quotes
        .into_iter()
        .filter_map(|quote| match quote {
            Value::Object(fields) if fields.contains_key("symbol") => Some(SearchQuote(fields)),
            _ => None,
        })
        .take(SEARCH_QUOTES_COUNT)
        .collect())
}
