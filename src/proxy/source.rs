//! Sources of fresh candidate proxy addresses.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::{CollectorError, Result};

/// Default base URL of the getproxylist.com API.
pub const GETPROXYLIST_URL: &str = "https://api.getproxylist.com";

/// Default base URL of the pubproxy.com API.
pub const PUBPROXY_URL: &str = "http://pubproxy.com";

/// Trait for supplying raw candidate proxy addresses on demand.
///
/// Failures are reported as [`CollectorError::SourceUnavailable`] and are
/// always retryable from the pool's point of view.
#[async_trait]
pub trait ProxySource: Send + Sync {
    /// Requests up to `count` raw candidate addresses.
    async fn request(&self, count: usize) -> Result<Vec<String>>;

    /// Returns a short name for logging.
    fn name(&self) -> &str {
        "proxy-source"
    }
}

/// A source that hands out a fixed list of addresses, cycling through it.
pub struct StaticProxySource {
    addresses: Vec<String>,
    cursor: AtomicUsize,
}

impl StaticProxySource {
    /// Creates a new static source.
    pub fn new(addresses: Vec<String>) -> Self {
        Self {
            addresses,
            cursor: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ProxySource for StaticProxySource {
    async fn request(&self, count: usize) -> Result<Vec<String>> {
        if self.addresses.is_empty() {
            return Err(CollectorError::SourceUnavailable(
                "static proxy list is empty".to_string(),
            ));
        }

        let taken = (0..count.min(self.addresses.len()))
            .map(|_| {
                let index = self.cursor.fetch_add(1, Ordering::SeqCst) % self.addresses.len();
                self.addresses[index].clone()
            })
            .collect();
        Ok(taken)
    }

    fn name(&self) -> &str {
        "static"
    }
}

fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .connect_timeout(timeout)
        .timeout(timeout)
        .build()
        .map_err(CollectorError::from)
}

fn unavailable(err: reqwest::Error) -> CollectorError {
    CollectorError::SourceUnavailable(err.to_string())
}

#[derive(Debug, Deserialize)]
struct GetProxyListItem {
    protocol: String,
    ip: String,
    port: u16,
}

/// Source backed by the getproxylist.com API, which returns one proxy per call.
pub struct GetProxyListSource {
    client: Client,
    base_url: String,
}

impl GetProxyListSource {
    /// Creates a source against the public API.
    pub fn new(timeout: Duration) -> Result<Self> {
        Self::with_base_url(GETPROXYLIST_URL, timeout)
    }

    /// Creates a source against a custom base URL.
    pub fn with_base_url(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn request_one(&self) -> Result<String> {
        let url = format!("{}/proxy?allowsHttps=1&country[]=US", self.base_url);
        let item: GetProxyListItem = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(unavailable)?
            .json()
            .await
            .map_err(unavailable)?;

        Ok(format!("{}://{}:{}", item.protocol, item.ip, item.port))
    }
}

#[async_trait]
impl ProxySource for GetProxyListSource {
    async fn request(&self, count: usize) -> Result<Vec<String>> {
        let mut found = Vec::with_capacity(count);
        for _ in 0..count {
            match self.request_one().await {
                Ok(address) => found.push(address),
                Err(e) if found.is_empty() => return Err(e),
                Err(e) => {
                    warn!("getproxylist stopped early after {} proxies: {}", found.len(), e);
                    break;
                }
            }
        }
        debug!("getproxylist returned {} proxies", found.len());
        Ok(found)
    }

    fn name(&self) -> &str {
        "getproxylist"
    }
}

#[derive(Debug, Deserialize)]
struct PubProxyList {
    #[serde(default)]
    data: Vec<PubProxyItem>,
}

#[derive(Debug, Deserialize)]
struct PubProxyItem {
    #[serde(rename = "type")]
    protocol: String,
    #[serde(rename = "ipPort")]
    ip_port: String,
}

/// Source backed by the pubproxy.com API, which supports batch requests.
pub struct PubProxySource {
    client: Client,
    base_url: String,
}

impl PubProxySource {
    /// Creates a source against the public API.
    pub fn new(timeout: Duration) -> Result<Self> {
        Self::with_base_url(PUBPROXY_URL, timeout)
    }

    /// Creates a source against a custom base URL.
    pub fn with_base_url(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ProxySource for PubProxySource {
    async fn request(&self, count: usize) -> Result<Vec<String>> {
        let url = format!(
            "{}/api/proxy?type=https,socks4,socks5&country=US&limit={}",
            self.base_url, count
        );
        let list: PubProxyList = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(unavailable)?
            .json()
            .await
            .map_err(unavailable)?;

        Ok(list
            .data
            .into_iter()
            .map(|item| format!("{}://{}", item.protocol, item.ip_port))
            .collect())
    }

    fn name(&self) -> &str {
        "pubproxy"
    }
}
