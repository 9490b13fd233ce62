//! HTTP page fetcher that routes every request through the proxy pool.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use reqwest::{Client, StatusCode};
use tracing::{debug, info, warn};

use crate::fetcher::PageFetcher;
use crate::proxy::{FailureTracker, ProxyAddress, ProxyPool};
use crate::{CollectorError, Result};

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_4) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_4) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36",
];

fn random_user_agent() -> &'static str {
    USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(USER_AGENTS[0])
}

/// Retry and timeout settings for [`ProxiedFetcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchPolicy {
    /// Per-request timeout.
    pub timeout: Duration,
    /// Attempts per URL, across proxies.
    pub max_attempts: u32,
    /// Sleep before retrying when the pool is empty.
    pub empty_pool_backoff: Duration,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_attempts: 5,
            empty_pool_backoff: Duration::from_secs(2),
        }
    }
}

enum Attempt {
    Done(String),
    ProxyFailed(CollectorError),
    Failed(CollectorError),
}

/// Fetches pages through a proxy picked per request.
///
/// Transport failures (and responses a proxy produces on its own behalf:
/// 407 and 5xx gateway errors) count against the proxy; once an address
/// exceeds the failure threshold it is removed from the pool. Other HTTP
/// status errors are returned as they are.
pub struct ProxiedFetcher {
    pool: Arc<ProxyPool>,
    failures: Arc<FailureTracker>,
    policy: FetchPolicy,
}

impl ProxiedFetcher {
    pub fn new(pool: Arc<ProxyPool>, failures: Arc<FailureTracker>) -> Self {
        Self {
            pool,
            failures,
            policy: FetchPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: FetchPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Creates a reqwest Client configured with the given proxy.
    fn client_for(&self, proxy: &ProxyAddress) -> Result<Client> {
        Client::builder()
            .user_agent(random_user_agent())
            .proxy(proxy.to_reqwest()?)
            .connect_timeout(self.policy.timeout)
            .timeout(self.policy.timeout)
            .build()
            .map_err(|e| CollectorError::Parse(format!("Failed to create HTTP client: {}", e)))
    }

    async fn attempt(&self, proxy: &ProxyAddress, url: &str) -> Result<Attempt> {
        let client = self.client_for(proxy)?;

        let response = match client.get(url).send().await {
            Ok(response) => response,
            Err(e) => return Ok(Attempt::ProxyFailed(e.into())),
        };

        let status = response.status();
        if status == StatusCode::PROXY_AUTHENTICATION_REQUIRED
            || status == StatusCode::BAD_GATEWAY
            || status == StatusCode::GATEWAY_TIMEOUT
        {
            return Ok(Attempt::ProxyFailed(CollectorError::Probe(
                proxy.to_string(),
                format!("answered {} for {}", status, url),
            )));
        }

        let response = match response.error_for_status() {
            Ok(response) => response,
            Err(e) => return Ok(Attempt::Failed(e.into())),
        };

        match response.text().await {
            Ok(body) => Ok(Attempt::Done(body)),
            Err(e) => Ok(Attempt::ProxyFailed(e.into())),
        }
    }

    async fn report_failure(&self, proxy: &ProxyAddress) {
        if self.failures.record_failure(proxy) {
            info!(
                "Proxy {} failed more than {} times in a row, removing",
                proxy,
                self.failures.threshold()
            );
            self.pool.remove(proxy).await;
        }
        // Members may also leave through the validator.
        self.failures.retain(&self.pool.addresses().await);
    }
}

#[async_trait]
impl PageFetcher for ProxiedFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        let mut last_error = CollectorError::PoolEmpty;

        for attempt in 1..=self.policy.max_attempts.max(1) {
            let proxy = match self.pool.pick().await {
                Ok(proxy) => proxy,
                Err(e) => {
                    warn!("No proxy available for {} (attempt {}), backing off", url, attempt);
                    last_error = e;
                    tokio::time::sleep(self.policy.empty_pool_backoff).await;
                    continue;
                }
            };

            debug!("visiting {} via {}", url, proxy);
            match self.attempt(&proxy, url).await? {
                Attempt::Done(body) => {
                    self.failures.record_success(&proxy);
                    return Ok(body);
                }
                Attempt::Failed(e) => {
                    self.failures.record_success(&proxy);
                    return Err(e);
                }
                Attempt::ProxyFailed(e) => {
                    warn!("Request {} via {} failed: {}", url, proxy, e);
                    self.report_failure(&proxy).await;
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }
}
