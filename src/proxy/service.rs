//! Lifecycle of the proxy subsystem: startup barrier, background loops, stop.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::pool::ProxyPool;
use super::validator::ProxyValidator;

/// Owns the replenishment and validation loops around a [`ProxyPool`].
pub struct ProxyService {
    pool: Arc<ProxyPool>,
    validator: Arc<ProxyValidator>,
    ready_poll: Duration,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl ProxyService {
    pub fn new(pool: Arc<ProxyPool>, validator: ProxyValidator) -> Self {
        Self {
            pool,
            validator: Arc::new(validator),
            ready_poll: Duration::from_secs(2),
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
        }
    }

    /// Sets how often startup re-checks the pool size.
    pub fn with_ready_poll(mut self, ready_poll: Duration) -> Self {
        self.ready_poll = ready_poll;
        self
    }

    /// Loads the snapshot, starts the background loops and blocks until the
    /// pool reaches its target size.
    pub async fn start(&mut self) {
        info!("[ProxyService]: Starting");
        let loaded = self.pool.load().await;
        info!("[ProxyService]: Loaded {} proxies from snapshot", loaded);

        self.tasks.push(tokio::spawn(replenish_loop(
            Arc::clone(&self.pool),
            self.cancel.clone(),
        )));
        self.tasks.push(tokio::spawn(
            Arc::clone(&self.validator).run(self.cancel.clone()),
        ));

        if self.pool.is_full().await {
            self.pool.request_validation();
        } else {
            self.pool.request_replenish();
        }

        self.wait_until_ready().await;
        info!("[ProxyService]: Ready with {} proxies", self.pool.size().await);
    }

    async fn wait_until_ready(&self) {
        loop {
            let size = self.pool.size().await;
            let target = self.pool.target_size();
            if size >= target {
                return;
            }

            info!(
                "[ProxyService]: Waiting for full proxy list to start... ({}/{})",
                size, target
            );
            self.pool.request_replenish();
            tokio::time::sleep(self.ready_poll).await;
        }
    }

    /// Stops both loops and waits for them. The snapshot stays on disk.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!("[ProxyService]: Background task ended abnormally: {}", e);
            }
        }
        info!("[ProxyService]: Exiting");
    }
}

async fn replenish_loop(pool: Arc<ProxyPool>, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = pool.replenish_requested() => {
                if let Err(e) = pool.replenish().await {
                    warn!("[ProxyService]: Replenishment failed, will retry on next trigger: {}", e);
                }
            }
        }
    }
}
