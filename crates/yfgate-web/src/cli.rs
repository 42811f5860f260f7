//! Command-line overrides for the environment configuration.
//!
//! | Option | Overrides |
//! |--------|-----------|
//! | `--bind` | `YFGATE_BIND` |
//! | `--cache-ttl-secs` | `YFGATE_CACHE_TTL_SECS` |
//! | `--max-retries` | `YFGATE_MAX_RETRIES` |
//! | `--timeout-ms` | `YFGATE_TIMEOUT_MS` |

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use yfgate_core::{RetryConfig, ServiceConfig};

/// Yahoo Finance JSON gateway
#[derive(Debug, Parser)]
#[command(name = "yfgate", version, about)]
pub struct Cli {
    /// Address to listen on
    #[arg(long)]
    pub bind: Option<SocketAddr>,

    /// Upstream response cache lifetime; 0 disables caching
    #[arg(long)]
    pub cache_ttl_secs: Option<u64>,

    /// Attempts per call when the upstream rate limits
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_retries: Option<u32>,

    /// Upstream request timeout in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,
}

impl Cli {
    pub fn apply(&self, config: &mut ServiceConfig) {
        if let Some(bind) = self.bind {
            config.bind = bind;
        }
        if let Some(secs) = self.cache_ttl_secs {
            config.cache_ttl = Duration::from_secs(secs);
        }
        if let Some(max_attempts) = self.max_retries {
            config.retry = RetryConfig::new(max_attempts, config.retry.backoff.base);
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.timeout_ms = timeout_ms;
        }
    }
}
