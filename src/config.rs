//! Runtime configuration read from environment variables.

use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::calendar::CALENDAR_URL;
use crate::dispatch::DispatcherConfig;
use crate::proxy::{
    GetProxyListSource, PoolConfig, ProxySource, PubProxySource, StaticProxySource,
    ValidatorConfig, DEFAULT_HEALTH_URL, DEFAULT_SNAPSHOT_PATH,
};
use crate::{CollectorError, Result};

/// Where fresh proxy candidates come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceKind {
    #[default]
    GetProxyList,
    PubProxy,
    Static,
}

impl FromStr for SourceKind {
    type Err = CollectorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "getproxylist" => Ok(SourceKind::GetProxyList),
            "pubproxy" => Ok(SourceKind::PubProxy),
            "static" => Ok(SourceKind::Static),
            other => Err(CollectorError::Config(format!(
                "PROXY_SOURCE must be getproxylist, pubproxy or static, got '{}'",
                other
            ))),
        }
    }
}

/// Everything the binary needs to wire the collector together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub pool: PoolConfig,
    pub validator: ValidatorConfig,
    pub dispatcher: DispatcherConfig,
    pub probe_timeout: Duration,
    pub health_url: String,
    pub source: SourceKind,
    pub source_url: Option<String>,
    pub static_list: Vec<String>,
    pub snapshot_path: PathBuf,
    pub failure_threshold: u32,
    pub sink_url: Option<String>,
    pub collect_dir: PathBuf,
    pub calendar_url: String,
    /// Hosts event links may point at; empty means the calendar's own host.
    pub allowed_hosts: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pool: PoolConfig::default(),
            validator: ValidatorConfig::default(),
            dispatcher: DispatcherConfig::default(),
            probe_timeout: Duration::from_secs(15),
            health_url: DEFAULT_HEALTH_URL.to_string(),
            source: SourceKind::default(),
            source_url: None,
            static_list: Vec::new(),
            snapshot_path: PathBuf::from(DEFAULT_SNAPSHOT_PATH),
            failure_threshold: 2,
            sink_url: None,
            collect_dir: PathBuf::from("collect"),
            calendar_url: CALENDAR_URL.to_string(),
            allowed_hosts: Vec::new(),
        }
    }
}

impl Config {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`. Unset or blank variables
    /// keep their defaults; malformed ones are a [`CollectorError::Config`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Config::default();

        let pool = PoolConfig {
            target_size: parse_var(&get, "MAX_PROXY_URLS", defaults.pool.target_size)?,
            max_batch: parse_var(&get, "MAX_PROXY_BATCH", defaults.pool.max_batch)?,
        };

        let scan_minutes: u64 = parse_var(&get, "PROXY_VALIDATOR_SCAN_MIN", 1)?;
        let freshness_secs: u64 = parse_var(
            &get,
            "PROXY_FRESHNESS_SECS",
            defaults.validator.freshness.as_secs(),
        )?;
        if scan_minutes == 0 {
            return Err(CollectorError::Config(
                "PROXY_VALIDATOR_SCAN_MIN must be at least 1".to_string(),
            ));
        }
        let validator = ValidatorConfig {
            period: Duration::from_secs(scan_minutes * 60),
            freshness: Duration::from_secs(freshness_secs),
        };

        let dispatcher = DispatcherConfig {
            workers: parse_var(&get, "MAX_WORKERS", defaults.dispatcher.workers)?,
            queue_size: parse_var(&get, "MAX_QUEUE", defaults.dispatcher.queue_size)?,
        };
        if dispatcher.workers == 0 {
            return Err(CollectorError::Config(
                "MAX_WORKERS must be at least 1".to_string(),
            ));
        }

        let probe_timeout = Duration::from_secs(parse_var(
            &get,
            "PROXY_PROBE_TIMEOUT_SECS",
            defaults.probe_timeout.as_secs(),
        )?);

        let source = match get("PROXY_SOURCE") {
            Some(raw) => raw.parse()?,
            None => defaults.source,
        };

        let static_list = get("PROXY_STATIC_LIST")
            .map(|raw| split_list(&raw))
            .unwrap_or_default();

        Ok(Self {
            pool,
            validator,
            dispatcher,
            probe_timeout,
            health_url: get("PROXY_HEALTH_URL").unwrap_or(defaults.health_url),
            source,
            source_url: get("PROXY_SOURCE_URL"),
            static_list,
            snapshot_path: get("PROXY_SNAPSHOT_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.snapshot_path),
            failure_threshold: parse_var(
                &get,
                "PROXY_FAILURE_THRESHOLD",
                defaults.failure_threshold,
            )?,
            sink_url: get("EVENT_SINK_URL"),
            collect_dir: get("COLLECT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.collect_dir),
            calendar_url: defaults.calendar_url,
            allowed_hosts: get("CRAWL_ALLOWED_HOSTS")
                .map(|raw| split_list(&raw))
                .unwrap_or_default(),
        })
    }

    /// Builds the configured proxy source.
    pub fn build_source(&self) -> Result<Arc<dyn ProxySource>> {
        let timeout = self.probe_timeout;
        let source: Arc<dyn ProxySource> = match (self.source, &self.source_url) {
            (SourceKind::GetProxyList, Some(url)) => {
                Arc::new(GetProxyListSource::with_base_url(url.as_str(), timeout)?)
            }
            (SourceKind::GetProxyList, None) => Arc::new(GetProxyListSource::new(timeout)?),
            (SourceKind::PubProxy, Some(url)) => {
                Arc::new(PubProxySource::with_base_url(url.as_str(), timeout)?)
            }
            (SourceKind::PubProxy, None) => Arc::new(PubProxySource::new(timeout)?),
            (SourceKind::Static, _) => {
                if self.static_list.is_empty() {
                    return Err(CollectorError::Config(
                        "PROXY_SOURCE=static needs PROXY_STATIC_LIST".to_string(),
                    ));
                }
                Arc::new(StaticProxySource::new(self.static_list.clone()))
            }
        };
        Ok(source)
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn parse_var<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .parse()
            .map_err(|e| CollectorError::Config(format!("{} = '{}': {}", key, raw, e))),
        None => Ok(default),
    }
}
