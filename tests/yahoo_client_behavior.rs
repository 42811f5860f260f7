//! Behavior-driven tests for the Yahoo Finance client
//!
//! A scripted transport stands in for the network; each test checks what a
//! caller observes (payloads, errors, request counts), not parser internals.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use yfgate_core::{
    CacheStore, DataSource, HistoryRequest, HttpClient, HttpFuture, HttpRequest, HttpResponse,
    MultiWindowLimiter, RateLimits, RetryConfig, SourceErrorKind, Symbol, UpstreamSession,
    UpstreamUrls, YahooClient,
};

// =============================================================================
// Scripted transport
// =============================================================================

/// Answers requests by URL substring. Each route replays its responses in
/// order and keeps repeating the last one.
#[derive(Default)]
struct ScriptedHttpClient {
    routes: Mutex<Vec<(&'static str, VecDeque<HttpResponse>)>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedHttpClient {
    fn with_crumb(crumb: &str) -> Self {
        Self::default().route("getcrumb", vec![HttpResponse::new(200, crumb)])
    }

    fn route(self, pattern: &'static str, responses: Vec<HttpResponse>) -> Self {
        self.routes
            .lock()
            .expect("routes lock")
            .push((pattern, responses.into()));
        self
    }

    fn urls_matching(&self, pattern: &str) -> Vec<String> {
        self.requests
            .lock()
            .expect("requests lock")
            .iter()
            .filter(|request| request.url.contains(pattern))
            .map(|request| request.url.clone())
            .collect()
    }

    fn request_count(&self) -> usize {
        self.requests.lock().expect("requests lock").len()
    }
}

impl HttpClient for ScriptedHttpClient {
    fn execute<'a>(&'a self, request: HttpRequest) -> HttpFuture<'a> {
        Box::pin(async move {
            let mut routes = self.routes.lock().expect("routes lock");
            let response = routes
                .iter_mut()
                .find(|(pattern, _)| request.url.contains(pattern))
                .and_then(|(_, responses)| {
                    if responses.len() > 1 {
                        responses.pop_front()
                    } else {
                        responses.front().cloned()
                    }
                })
                .unwrap_or_else(|| HttpResponse::new(404, ""));
            drop(routes);

            self.requests.lock().expect("requests lock").push(request);
            Ok(response)
        })
    }
}

fn urls() -> UpstreamUrls {
    UpstreamUrls {
        query1: String::from("https://query1.test"),
        query2: String::from("https://query2.test"),
        cookie: String::from("https://cookie.test"),
    }
}

fn client(http: &Arc<ScriptedHttpClient>) -> YahooClient {
    YahooClient::new(
        http.clone(),
        urls(),
        RetryConfig::new(3, Duration::from_secs(2)),
        1_000,
    )
}

fn json_ok(value: serde_json::Value) -> HttpResponse {
    HttpResponse::ok_json(value.to_string())
}

fn quote_summary() -> HttpResponse {
    json_ok(json!({
        "quoteSummary": {
            "result": [{
                "price": { "longName": "Apple Inc.", "regularMarketPrice": { "raw": 189.5, "fmt": "189.50" } },
                "summaryDetail": { "previousClose": 187.0, "trailingPE": 29.1 },
                "assetProfile": { "sector": "Technology", "country": "United States" }
            }],
            "error": null
        }
    }))
}

fn chart() -> HttpResponse {
    json_ok(json!({
        "chart": {
            "result": [{
                "meta": { "gmtoffset": -18000 },
                "timestamp": [1704205800, 1704292200],
                "indicators": { "quote": [{
                    "open": [187.15, 184.22],
                    "high": [188.44, 185.88],
                    "low": [183.89, 183.43],
                    "close": [185.64, 184.25],
                    "volume": [82488700, 58414500]
                }]}
            }],
            "error": null
        }
    }))
}

fn rate_limited() -> HttpResponse {
    HttpResponse::new(429, "Too Many Requests")
}

fn aapl() -> Symbol {
    Symbol::parse("AAPL").expect("AAPL is valid")
}

// =============================================================================
// Auth handshake
// =============================================================================

#[tokio::test]
async fn user_gets_ticker_info_after_cookie_and_crumb_handshake() {
    // Given: Yahoo hands out a crumb and answers quote summaries
    let http = Arc::new(
        ScriptedHttpClient::with_crumb("crumb-1").route("quoteSummary", vec![quote_summary()]),
    );
    let yahoo = client(&http);

    // When: The user asks for ticker info
    let info = yahoo.ticker_info(&aapl()).await.expect("info should load");

    // Then: Flattened fields come back
    assert_eq!(info.get("longName"), Some(&json!("Apple Inc.")));
    assert_eq!(info.get("regularMarketPrice"), Some(&json!(189.5)));
    assert_eq!(info.field_or_na("website"), json!("N/A"));

    // And: The cookie was fetched before the crumb, and the crumb rode on the data call
    let order: Vec<String> = http
        .requests
        .lock()
        .expect("requests lock")
        .iter()
        .map(|request| request.url.clone())
        .collect();
    assert!(order[0].starts_with("https://cookie.test"));
    assert_eq!(order[1], "https://query1.test/v1/test/getcrumb");
    assert!(order[2].starts_with("https://query2.test/v10/finance/quoteSummary/AAPL?"));
    assert!(order[2].ends_with("&crumb=crumb-1"));
}

#[tokio::test]
async fn auth_requests_bypass_the_response_cache() {
    let http = Arc::new(ScriptedHttpClient::with_crumb("crumb-1").route("chart", vec![chart()]));
    let yahoo = client(&http);

    yahoo
        .history(&HistoryRequest::new(aapl(), Default::default(), Default::default()))
        .await
        .expect("history should load");

    let requests = http.requests.lock().expect("requests lock");
    assert!(requests[0].url.contains("cookie.test") && !requests[0].cacheable);
    assert!(requests[1].url.contains("getcrumb") && !requests[1].cacheable);
    assert!(requests[2].url.contains("/v8/finance/chart/") && requests[2].cacheable);
}

#[tokio::test]
async fn crumb_is_reused_across_calls() {
    let http = Arc::new(
        ScriptedHttpClient::with_crumb("crumb-1")
            .route("quoteSummary", vec![quote_summary()])
            .route("chart", vec![chart()]),
    );
    let yahoo = client(&http);

    yahoo.ticker_info(&aapl()).await.expect("info should load");
    yahoo
        .history(&HistoryRequest::new(aapl(), Default::default(), Default::default()))
        .await
        .expect("history should load");

    assert_eq!(http.urls_matching("getcrumb").len(), 1);
    assert_eq!(http.urls_matching("cookie.test").len(), 1);
}

#[tokio::test]
async fn query2_crumb_endpoint_is_tried_when_query1_fails() {
    let http = Arc::new(
        ScriptedHttpClient::default()
            .route("query1.test/v1/test/getcrumb", vec![HttpResponse::new(500, "")])
            .route("query2.test/v1/test/getcrumb", vec![HttpResponse::new(200, "crumb-2")])
            .route("quoteSummary", vec![quote_summary()]),
    );
    let yahoo = client(&http);

    yahoo.ticker_info(&aapl()).await.expect("info should load");

    assert_eq!(http.urls_matching("getcrumb").len(), 2);
    assert!(http.urls_matching("quoteSummary")[0].ends_with("crumb=crumb-2"));
}

#[tokio::test]
async fn rejected_crumb_is_refreshed_once() {
    // Given: The first crumb has gone stale upstream
    let http = Arc::new(
        ScriptedHttpClient::default()
            .route(
                "getcrumb",
                vec![HttpResponse::new(200, "stale"), HttpResponse::new(200, "fresh")],
            )
            .route(
                "quoteSummary",
                vec![HttpResponse::new(401, r#"{"finance":{"error":{"code":"Unauthorized","description":"Invalid Crumb"}}}"#), quote_summary()],
            ),
    );
    let yahoo = client(&http);

    // When: The user asks for ticker info
    let info = yahoo.ticker_info(&aapl()).await.expect("info should load after refresh");

    // Then: A new crumb was fetched and used for the second attempt
    assert_eq!(info.get("sector"), Some(&json!("Technology")));
    let summaries = http.urls_matching("quoteSummary");
    assert_eq!(summaries.len(), 2);
    assert!(summaries[0].ends_with("crumb=stale"));
    assert!(summaries[1].ends_with("crumb=fresh"));
}

// =============================================================================
// Rate limits and errors
// =============================================================================

#[tokio::test(start_paused = true)]
async fn rate_limited_calls_are_retried_with_backoff() {
    // Given: Yahoo rate limits the first two chart requests
    let http = Arc::new(
        ScriptedHttpClient::with_crumb("crumb-1")
            .route("chart", vec![rate_limited(), rate_limited(), chart()]),
    );
    let yahoo = client(&http);
    let started = tokio::time::Instant::now();

    // When: The user asks for history
    let history = yahoo
        .history(&HistoryRequest::new(aapl(), Default::default(), Default::default()))
        .await
        .expect("third attempt succeeds");

    // Then: The call waited 2s then 4s and succeeded
    assert_eq!(history.bars.len(), 2);
    assert_eq!(http.urls_matching("/v8/finance/chart/").len(), 3);
    assert!(started.elapsed() >= Duration::from_secs(6));
}

#[tokio::test(start_paused = true)]
async fn persistent_rate_limit_surfaces_after_three_attempts() {
    let http = Arc::new(
        ScriptedHttpClient::with_crumb("crumb-1").route("search", vec![rate_limited()]),
    );
    let yahoo = client(&http);

    let err = yahoo.search("apple").await.expect_err("stays rate limited");

    assert_eq!(err.kind(), SourceErrorKind::RateLimited);
    assert!(err.retryable());
    assert_eq!(http.urls_matching("/v1/finance/search").len(), 3);
}

#[tokio::test(start_paused = true)]
async fn throttling_page_served_as_200_is_retried_past_the_cache() {
    // Given: The edge answers the first chart request with a 200 throttling page,
    // and the client goes through a caching session
    let http = Arc::new(ScriptedHttpClient::with_crumb("crumb-1").route(
        "chart",
        vec![HttpResponse::new(200, "Edge: Too Many Requests"), chart()],
    ));
    let session = Arc::new(UpstreamSession::new(
        http.clone(),
        CacheStore::default(),
        MultiWindowLimiter::new(RateLimits {
            per_second: 100,
            per_minute: 1000,
            per_hour: 10_000,
        }),
    ));
    let yahoo = YahooClient::new(
        session.clone(),
        urls(),
        RetryConfig::new(3, Duration::from_secs(2)),
        1_000,
    );
    let request = HistoryRequest::new(aapl(), Default::default(), Default::default());

    // When: The user asks for history
    let history = yahoo.history(&request).await.expect("retry reaches the upstream");

    // Then: The throttling page was not cached, and only the real chart was
    assert_eq!(history.bars.len(), 2);
    assert_eq!(http.urls_matching("/v8/finance/chart/").len(), 2);
    assert_eq!(session.cache_size().await, 1);

    // And: A repeat is answered from cache
    yahoo.history(&request).await.expect("cached history");
    assert_eq!(http.urls_matching("/v8/finance/chart/").len(), 2);
}

#[tokio::test]
async fn json_mentioning_too_many_requests_is_not_a_rate_limit() {
    let http = Arc::new(ScriptedHttpClient::with_crumb("crumb-1").route(
        "search",
        vec![json_ok(json!({
            "quotes": [{
                "symbol": "TMR",
                "shortname": "Too Many Requests Inc.",
                "exchange": "NMS",
                "quoteType": "EQUITY"
            }]
        }))],
    ));
    let yahoo = client(&http);

    let quotes = yahoo.search("too many").await.expect("payload is accepted");

    assert_eq!(quotes.len(), 1);
    assert_eq!(http.urls_matching("/v1/finance/search").len(), 1);
}

#[tokio::test]
async fn unknown_symbol_fails_without_retry() {
    let http = Arc::new(ScriptedHttpClient::with_crumb("crumb-1").route(
        "quoteSummary",
        vec![HttpResponse::new(
            404,
            r#"{"quoteSummary":{"result":null,"error":{"code":"Not Found","description":"Quote not found for symbol: NOPE"}}}"#,
        )],
    ));
    let yahoo = client(&http);

    let err = yahoo
        .ticker_info(&Symbol::parse("NOPE").expect("valid"))
        .await
        .expect_err("unknown symbol");

    assert_eq!(err.kind(), SourceErrorKind::NotFound);
    assert_eq!(err.to_string(), "Quote not found for symbol: NOPE");
    assert_eq!(http.urls_matching("quoteSummary").len(), 1);
}

#[tokio::test]
async fn malformed_payload_is_an_internal_error() {
    let http = Arc::new(
        ScriptedHttpClient::with_crumb("crumb-1")
            .route("chart", vec![HttpResponse::ok_json("<html>maintenance</html>")]),
    );
    let yahoo = client(&http);

    let err = yahoo
        .history(&HistoryRequest::new(aapl(), Default::default(), Default::default()))
        .await
        .expect_err("not json");

    assert_eq!(err.kind(), SourceErrorKind::Internal);
}

#[tokio::test]
async fn empty_search_and_market_are_rejected_before_any_request() {
    let http = Arc::new(ScriptedHttpClient::with_crumb("crumb-1"));
    let yahoo = client(&http);

    let search = yahoo.search("   ").await.expect_err("empty query");
    let market = yahoo.market("").await.expect_err("empty market");

    assert_eq!(search.kind(), SourceErrorKind::InvalidRequest);
    assert_eq!(market.kind(), SourceErrorKind::InvalidRequest);
    assert_eq!(http.request_count(), 0);
}

// =============================================================================
// Payloads
// =============================================================================

#[tokio::test]
async fn history_request_carries_period_and_interval() {
    let http = Arc::new(ScriptedHttpClient::with_crumb("crumb-1").route("chart", vec![chart()]));
    let yahoo = client(&http);
    let request = HistoryRequest::parse("msft", Some("5d"), Some("1h")).expect("valid request");

    let history = yahoo.history(&request).await.expect("history should load");

    let url = &http.urls_matching("/v8/finance/chart/")[0];
    assert!(url.starts_with("https://query2.test/v8/finance/chart/MSFT?range=5d&interval=1h"));

    let body = serde_json::to_value(&history).expect("serializes");
    assert_eq!(body["symbol"], json!("MSFT"));
    assert_eq!(body["period"], json!("5d"));
    assert_eq!(body["interval"], json!("1h"));
    assert_eq!(
        body["data"][0],
        json!({
            "date": "2024-01-02",
            "open": 187.15,
            "high": 188.44,
            "low": 183.89,
            "close": 185.64,
            "volume": 82488700
        })
    );
}

#[tokio::test]
async fn financials_fetch_each_statement() {
    let timeseries = |item: &str, raw: f64| {
        json_ok(json!({
            "timeseries": {
                "result": [{
                    "meta": { "symbol": ["AAPL"], "type": [format!("annual{item}")] },
                    format!("annual{item}"): [
                        { "asOfDate": "2023-09-30", "reportedValue": { "raw": raw } }
                    ]
                }],
                "error": null
            }
        }))
    };
    let http = Arc::new(
        ScriptedHttpClient::with_crumb("crumb-1")
            .route("annualTotalRevenue", vec![timeseries("TotalRevenue", 383.0)])
            .route("annualTotalAssets", vec![timeseries("TotalAssets", 352.0)])
            .route("annualOperatingCashFlow", vec![timeseries("OperatingCashFlow", 110.0)]),
    );
    let yahoo = client(&http);

    let financials = yahoo.financials(&aapl()).await.expect("financials should load");

    assert_eq!(http.urls_matching("/fundamentals-timeseries/").len(), 3);
    let body = serde_json::to_value(&financials).expect("serializes");
    assert_eq!(
        body["income_statement"],
        json!([{ "item": "TotalRevenue", "2023-09-30": 383.0 }])
    );
    assert_eq!(
        body["balance_sheet"],
        json!([{ "item": "TotalAssets", "2023-09-30": 352.0 }])
    );
    assert_eq!(
        body["cash_flow"],
        json!([{ "item": "OperatingCashFlow", "2023-09-30": 110.0 }])
    );
}

#[tokio::test]
async fn market_snapshot_combines_status_and_summary() {
    let http = Arc::new(
        ScriptedHttpClient::with_crumb("crumb-1")
            .route(
                "markettime",
                vec![json_ok(json!({
                    "finance": {
                        "marketTimes": [{ "marketTime": [{
                            "id": "us", "status": "open",
                            "timezone": [{ "short": "EST" }]
                        }]}],
                        "error": null
                    }
                }))],
            )
            .route(
                "marketSummary",
                vec![json_ok(json!({
                    "marketSummaryResponse": {
                        "result": [
                            { "exchange": "SNP", "shortName": "S&P 500", "regularMarketPrice": 4697.24 },
                            { "exchange": "DJI", "shortName": "Dow 30", "regularMarketPrice": 37440.34 }
                        ],
                        "error": null
                    }
                }))],
            ),
    );
    let yahoo = client(&http);

    let snapshot = yahoo.market("US").await.expect("market should load");

    assert_eq!(snapshot.status["status"], json!("open"));
    assert_eq!(snapshot.status["timezone"], json!({ "short": "EST" }));
    assert_eq!(snapshot.summary.len(), 2);
    assert_eq!(snapshot.summary["DJI"]["shortName"], json!("Dow 30"));
    assert!(http.urls_matching("markettime")[0].contains("region=US"));
    assert!(http.urls_matching("marketSummary")[0].contains("market=US"));
}

#[tokio::test]
async fn search_encodes_query_and_returns_quotes() {
    let http = Arc::new(ScriptedHttpClient::with_crumb("crumb-1").route(
        "/v1/finance/search",
        vec![json_ok(json!({
            "quotes": [
                { "symbol": "BRK-B", "shortname": "Berkshire Hathaway Inc. New", "quoteType": "EQUITY", "exchange": "NYQ" }
            ],
            "news": []
        }))],
    ));
    let yahoo = client(&http);

    let quotes = yahoo.search("berkshire b").await.expect("search should load");

    assert_eq!(quotes.len(), 1);
    assert_eq!(quotes[0].field_or_na("symbol"), json!("BRK-B"));
    assert!(http.urls_matching("/v1/finance/search")[0].contains("q=berkshire%20b&quotesCount=8"));
}
