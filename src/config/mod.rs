use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::time::Duration;

use crate::errors::FetchError;
use crate::ingest::{BatchCap, MAX_BATCH_CAP};

const DEFAULT_IDLE_BACKOFF_MS: u64 = 200;

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct Config {
    pub redis_url: String,
    pub queue_key: String,
    pub batch_cap: usize,
    pub fetch_timeout_ms: Option<u64>,
    pub idle_backoff_ms: u64,
}

impl Config {
    /// Parse from any variable source; `load_config` uses the process env.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, FetchError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| FetchError::ConfigError(format!("{name} is not set")))
        };

        let redis_url = required("REDIS_URL")?;
        let queue_key = required("FETCH_QUEUE_KEY")?;

        let batch_cap = match parse_u64(&lookup, "FETCH_BATCH_CAP")? {
            Some(0) => {
                return Err(FetchError::ConfigError(
                    "FETCH_BATCH_CAP must be positive".into(),
                ))
            }
            Some(n) => BatchCap::new(usize::try_from(n).unwrap_or(MAX_BATCH_CAP)).get(),
            None => MAX_BATCH_CAP,
        };
        let fetch_timeout_ms = parse_u64(&lookup, "FETCH_TIMEOUT_MS")?;
        let idle_backoff_ms =
            parse_u64(&lookup, "FETCH_IDLE_BACKOFF_MS")?.unwrap_or(DEFAULT_IDLE_BACKOFF_MS);

        Ok(Config {
            redis_url,
            queue_key,
            batch_cap,
            fetch_timeout_ms,
            idle_backoff_ms,
        })
    }

    pub fn cap(&self) -> BatchCap {
        BatchCap::new(self.batch_cap)
    }

    pub fn fetch_timeout(&self) -> Option<Duration> {
        self.fetch_timeout_ms.map(Duration::from_millis)
    }

    pub fn idle_backoff(&self) -> Duration {
        Duration::from_millis(self.idle_backoff_ms)
    }
}

fn parse_u64<F>(lookup: &F, name: &str) -> Result<Option<u64>, FetchError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|e| FetchError::ConfigError(format!("{name}={raw:?}: {e}"))),
    }
}

pub fn load_config() -> Result<Config, FetchError> {
    dotenv().ok();
    Config::from_lookup(|name| env::var(name).ok())
}
