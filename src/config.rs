//! Service configuration, read from the environment.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use crate::sync::RetryPolicy;

#[derive(Debug, Clone)]
pub struct Config {
    /// sqlx SQLite URL, e.g. `sqlite:storefront.db` or `sqlite::memory:`
    pub database_url: String,
    pub port: u16,
    /// Base URL of the remote order service. Sync is disabled without it.
    pub remote_orders_url: Option<String>,
    pub sync_interval: Duration,
    pub sync_timeout: Duration,
    pub sync_max_retries: u32,
    pub sync_queue_capacity: usize,
    pub low_stock_threshold: u32,
    /// JSON array of products loaded into an empty catalog on startup
    pub catalog_seed_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite:storefront.db".into(),
            port: 8083,
            remote_orders_url: None,
            sync_interval: Duration::from_secs(300),
            sync_timeout: Duration::from_millis(5000),
            sync_max_retries: 2,
            sync_queue_capacity: 256,
            low_stock_threshold: 5,
            catalog_seed_path: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Unset or empty variables fall back to defaults; malformed ones are errors.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        Ok(Self {
            database_url: var("DATABASE_URL").unwrap_or(defaults.database_url),
            port: parse(&var, "PORT")?.unwrap_or(defaults.port),
            remote_orders_url: var("REMOTE_ORDERS_URL"),
            sync_interval: parse(&var, "SYNC_INTERVAL_SECS")?.map(Duration::from_secs).unwrap_or(defaults.sync_interval),
            sync_timeout: parse(&var, "SYNC_TIMEOUT_MS")?.map(Duration::from_millis).unwrap_or(defaults.sync_timeout),
            sync_max_retries: parse(&var, "SYNC_MAX_RETRIES")?.unwrap_or(defaults.sync_max_retries),
            sync_queue_capacity: parse(&var, "SYNC_QUEUE_CAPACITY")?.unwrap_or(defaults.sync_queue_capacity),
            low_stock_threshold: parse(&var, "LOW_STOCK_THRESHOLD")?.unwrap_or(defaults.low_stock_threshold),
            catalog_seed_path: var("CATALOG_SEED_PATH").map(PathBuf::from),
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.sync_max_retries, self.sync_timeout)
    }
}

fn parse<T>(var: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    var(name)
        .map(|raw| raw.trim().parse::<T>().with_context(|| format!("{name} has an invalid value: {raw:?}")))
        .transpose()
}
