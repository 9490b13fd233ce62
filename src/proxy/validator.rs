//! Periodic health checking of pool members.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::address::ProxyAddress;
use super::pool::{ProxyEntry, ProxyPool};
use crate::clock::Clock;
use crate::{CollectorError, Result};

/// Default health-check endpoint.
pub const DEFAULT_HEALTH_URL: &str = "http://free.timeanddate.com/ts.php";

/// Trait for a live check that a proxy currently works.
#[async_trait]
pub trait HealthCheck: Send + Sync {
    /// Probes through `proxy`. Any error means the proxy is unusable.
    async fn probe(&self, proxy: &ProxyAddress) -> Result<()>;
}

/// Health check that fetches a fixed URL through the proxy.
pub struct HttpHealthCheck {
    endpoint: String,
    timeout: Duration,
}

impl HttpHealthCheck {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout,
        }
    }
}

impl Default for HttpHealthCheck {
    fn default() -> Self {
        Self::new(DEFAULT_HEALTH_URL, Duration::from_secs(15))
    }
}

#[async_trait]
impl HealthCheck for HttpHealthCheck {
    async fn probe(&self, proxy: &ProxyAddress) -> Result<()> {
        let probe_failed = |e: reqwest::Error| CollectorError::Probe(proxy.to_string(), e.to_string());

        let client = Client::builder()
            .proxy(proxy.to_reqwest()?)
            .connect_timeout(self.timeout)
            .timeout(self.timeout)
            .build()
            .map_err(probe_failed)?;

        client
            .get(&self.endpoint)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(probe_failed)?;
        Ok(())
    }
}

/// Timing for a [`ProxyValidator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatorConfig {
    /// Time between passes, measured from the end of the previous pass.
    pub period: Duration,
    /// Entries validated more recently than this are skipped.
    pub freshness: Duration,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(60),
            freshness: Duration::from_secs(60),
        }
    }
}

/// Outcome of one validation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    pub probed: Vec<ProxyAddress>,
    pub evicted: Vec<ProxyAddress>,
}

/// Re-verifies pool members and evicts the ones that stop working.
pub struct ProxyValidator {
    pool: Arc<ProxyPool>,
    check: Arc<dyn HealthCheck>,
    clock: Arc<dyn Clock>,
    config: ValidatorConfig,
}

impl ProxyValidator {
    pub fn new(
        pool: Arc<ProxyPool>,
        check: Arc<dyn HealthCheck>,
        clock: Arc<dyn Clock>,
        config: ValidatorConfig,
    ) -> Self {
        Self {
            pool,
            check,
            clock,
            config,
        }
    }

    fn is_stale(&self, entry: &ProxyEntry, now: DateTime<Utc>) -> bool {
        let freshness = chrono::Duration::from_std(self.config.freshness)
            .unwrap_or_else(|_| chrono::Duration::days(36_500));
        match entry.last_validated_at {
            None => true,
            Some(at) => now.signed_duration_since(at) > freshness,
        }
    }

    /// Probes every stale member once, in order.
    ///
    /// Members that pass are stamped with the current time; members that fail
    /// are evicted. If anything was evicted, a single replenishment is
    /// requested after the last probe.
    pub async fn run_pass(&self) -> PassReport {
        let now = self.clock.now();
        let due: Vec<ProxyAddress> = self
            .pool
            .entries()
            .await
            .into_iter()
            .filter(|e| self.is_stale(e, now))
            .map(|e| e.address)
            .collect();

        let mut report = PassReport::default();
        for address in due {
            match self.check.probe(&address).await {
                Ok(()) => {
                    self.pool.mark_validated(&address, self.clock.now()).await;
                    info!("[ProxyValidatorService]: Proxy validated: {}", address);
                }
                Err(e) => {
                    debug!("[ProxyValidatorService]: {}", e);
                    if self.pool.evict(&address).await {
                        report.evicted.push(address.clone());
                    }
                }
            }
            report.probed.push(address);
        }

        if !report.evicted.is_empty() {
            self.pool.request_replenish();
        }
        report
    }

    /// Runs passes on the timer or on demand until `cancel` fires.
    ///
    /// The timer is re-armed only after a pass finishes, so passes never
    /// overlap however slow the probes are.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        info!("[ProxyValidatorService]: Starting");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.period) => {}
                _ = self.pool.validation_requested() => {}
            }

            let report = self.run_pass().await;
            debug!(
                probed = report.probed.len(),
                evicted = report.evicted.len(),
                "[ProxyValidatorService]: Resetting timer"
            );
        }
        info!("[ProxyValidatorService]: Exiting");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::proxy::{PoolConfig, StaticProxySource};
    use std::collections::HashSet;
    use std::sync::Mutex;

    struct ScriptedCheck {
        failing: HashSet<String>,
        probed: Mutex<Vec<String>>,
    }

    impl ScriptedCheck {
        fn failing(addresses: &[&str]) -> Self {
            Self {
                failing: addresses.iter().map(|a| a.to_string()).collect(),
                probed: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl HealthCheck for ScriptedCheck {
        async fn probe(&self, proxy: &ProxyAddress) -> Result<()> {
            self.probed.lock().unwrap().push(proxy.to_string());
            if self.failing.contains(proxy.as_str()) {
                Err(CollectorError::Probe(proxy.to_string(), "refused".into()))
            } else {
                Ok(())
            }
        }
    }

    async fn setup(members: &[&str], check: Arc<ScriptedCheck>) -> (Arc<ProxyPool>, ProxyValidator) {
        let pool = Arc::new(ProxyPool::new(
            PoolConfig::default(),
            Arc::new(StaticProxySource::new(vec![])),
        ));
        for m in members {
            pool.add(m).await.unwrap();
        }
        let validator = ProxyValidator::new(
            Arc::clone(&pool),
            check,
            Arc::new(ManualClock::default()),
            ValidatorConfig::default(),
        );
        (pool, validator)
    }

    #[test]
    fn test_validator_config_default() {
        let config = ValidatorConfig::default();
        assert_eq!(config.period, Duration::from_secs(60));
        assert_eq!(config.freshness, Duration::from_secs(60));
    }

    #[test]
    fn test_http_health_check_default_endpoint() {
        let check = HttpHealthCheck::default();
        assert_eq!(check.endpoint, DEFAULT_HEALTH_URL);
        assert_eq!(check.timeout, Duration::from_secs(15));
    }

    #[tokio::test]
    async fn test_pass_marks_success() {
        let check = Arc::new(ScriptedCheck::failing(&[]));
        let (pool, validator) = setup(&["http://a:1"], check).await;

        let report = validator.run_pass().await;
        assert_eq!(report.probed.len(), 1);
        assert!(report.evicted.is_empty());
        assert!(pool.entries().await[0].last_validated_at.is_some());
    }

    #[tokio::test]
    async fn test_pass_evicts_failures() {
        let check = Arc::new(ScriptedCheck::failing(&["http://b:2"]));
        let (pool, validator) = setup(&["http://a:1", "http://b:2"], check).await;

        let report = validator.run_pass().await;
        assert_eq!(report.evicted, vec![ProxyAddress::parse("http://b:2").unwrap()]);
        assert_eq!(pool.size().await, 1);
    }

    #[tokio::test]
    async fn test_second_pass_skips_fresh_members() {
        let check = Arc::new(ScriptedCheck::failing(&[]));
        let (_pool, validator) = setup(&["http://a:1"], Arc::clone(&check)).await;

        validator.run_pass().await;
        let report = validator.run_pass().await;
        assert!(report.probed.is_empty());
        assert_eq!(check.probed.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_pool_pass() {
        let check = Arc::new(ScriptedCheck::failing(&[]));
        let (_pool, validator) = setup(&[], check).await;
        assert_eq!(validator.run_pass().await, PassReport::default());
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let check = Arc::new(ScriptedCheck::failing(&[]));
        let (_pool, validator) = setup(&[], check).await;
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(Arc::new(validator).run(cancel.clone()));
        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_run_reacts_to_validation_request() {
        let check = Arc::new(ScriptedCheck::failing(&[]));
        let (pool, validator) = setup(&["http://a:1"], Arc::clone(&check)).await;
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(Arc::new(validator).run(cancel.clone()));

        pool.request_validation();
        for _ in 0..100 {
            if pool.entries().await[0].last_validated_at.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(pool.entries().await[0].last_validated_at.is_some());

        cancel.cancel();
        handle.await.unwrap();
    }
}
