//! Service configuration loaded from `.env` and the process environment.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `YFGATE_BIND` | `127.0.0.1:5000` |
//! | `YFGATE_CACHE_TTL_SECS` | `3600` |
//! | `YFGATE_RATE_PER_SECOND` | `2` |
//! | `YFGATE_RATE_PER_MINUTE` | `60` |
//! | `YFGATE_RATE_PER_HOUR` | `1000` |
//! | `YFGATE_MAX_RETRIES` | `3` |
//! | `YFGATE_RETRY_DELAY_SECS` | `2` |
//! | `YFGATE_TIMEOUT_MS` | `10000` |
//! | `YFGATE_QUERY1_URL` | `https://query1.finance.yahoo.com` |
//! | `YFGATE_QUERY2_URL` | `https://query2.finance.yahoo.com` |
//! | `YFGATE_COOKIE_URL` | `https://fc.yahoo.com` |

use std::env;
use std::fmt::Debug;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use tracing::{debug, error};

use crate::cache::DEFAULT_CACHE_TTL;
use crate::retry::RetryConfig;
use crate::throttling::RateLimits;

pub const DEFAULT_BIND: &str = "127.0.0.1:5000";
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Gets an environment variable or returns `default` if it is unset or unparsable.
pub fn get_env_or_default<T: FromStr>(env_var: &str, default: T) -> T
where
    <T as FromStr>::Err: Debug,
{
    match env::var(env_var) {
        Ok(val) => val.parse::<T>().unwrap_or_else(|_| {
            error!("Failed to parse {}: {}, using default", env_var, val);
            default
        }),
        Err(_) => default,
    }
}

/// Base URLs of the upstream hosts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamUrls {
    pub query1: String,
    pub query2: String,
    pub cookie: String,
}

impl Default for UpstreamUrls {
    fn default() -> Self {
        Self {
            query1: String::from("https://query1.finance.yahoo.com"),
            query2: String::from("https://query2.finance.yahoo.com"),
            cookie: String::from("https://fc.yahoo.com"),
        }
    }
}

impl UpstreamUrls {
    /// Point every host at one base URL; used to run against a local fake.
    pub fn single(base: impl Into<String>) -> Self {
        let base = base.into().trim_end_matches('/').to_owned();
        Self {
            query1: base.clone(),
            query2: base.clone(),
            cookie: base,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub bind: SocketAddr,
    pub cache_ttl: Duration,
    pub rate_limits: RateLimits,
    pub retry: RetryConfig,
    pub timeout_ms: u64,
    pub urls: UpstreamUrls,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 5000)),
            cache_ttl: DEFAULT_CACHE_TTL,
            rate_limits: RateLimits::default(),
            retry: RetryConfig::default(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            urls: UpstreamUrls::default(),
        }
    }
}

impl ServiceConfig {
    /// Load `.env` if present, then read overrides from the environment.
    ///
    /// Unparsable values are logged and replaced by their defaults, as are
    /// zero rate-limit budgets and zero retry attempts.
    pub fn from_env() -> Self {
        match dotenv::dotenv() {
            Ok(path) => debug!("loaded environment from {}", path.display()),
            Err(e) => debug!("no .env file loaded: {e}"),
        }

        let defaults = Self::default();
        Self {
            bind: get_env_or_default("YFGATE_BIND", defaults.bind),
            cache_ttl: Duration::from_secs(get_env_or_default(
                "YFGATE_CACHE_TTL_SECS",
                defaults.cache_ttl.as_secs(),
            )),
            rate_limits: RateLimits {
                per_second: non_zero_env_or_default(
                    "YFGATE_RATE_PER_SECOND",
                    defaults.rate_limits.per_second,
                ),
                per_minute: non_zero_env_or_default(
                    "YFGATE_RATE_PER_MINUTE",
                    defaults.rate_limits.per_minute,
                ),
                per_hour: non_zero_env_or_default(
                    "YFGATE_RATE_PER_HOUR",
                    defaults.rate_limits.per_hour,
                ),
            },
            retry: RetryConfig::new(
                non_zero_env_or_default("YFGATE_MAX_RETRIES", defaults.retry.max_attempts),
                Duration::from_secs(get_env_or_default(
                    "YFGATE_RETRY_DELAY_SECS",
                    defaults.retry.backoff.base.as_secs(),
                )),
            ),
            timeout_ms: get_env_or_default("YFGATE_TIMEOUT_MS", defaults.timeout_ms),
            urls: UpstreamUrls {
                query1: get_env_or_default("YFGATE_QUERY1_URL", defaults.urls.query1),
                query2: get_env_or_default("YFGATE_QUERY2_URL", defaults.urls.query2),
                cookie: get_env_or_default("YFGATE_COOKIE_URL", defaults.urls.cookie),
            },
        }
    }
}

/// Like [`get_env_or_default`], but a zero value is also rejected.
fn non_zero_env_or_default(env_var: &str, default: u32) -> u32 {
    match get_env_or_default(env_var, default) {
        0 => {
            error!("{} must be greater than zero, using default {}", env_var, default);
            default
        }
        value => value,
    }
}
