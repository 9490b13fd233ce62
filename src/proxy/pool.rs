//! Self-healing pool of proxy addresses.

use std::sync::{Arc, Mutex as StdMutex};

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::{Mutex, Notify, RwLock};
use tracing::{debug, info, warn};

use super::address::ProxyAddress;
use super::snapshot::SnapshotStore;
use super::source::ProxySource;
use crate::{CollectorError, Result};

/// Sizing for a [`ProxyPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Number of members the pool tries to keep.
    pub target_size: usize,
    /// Upper bound on candidates requested per replenishment.
    pub max_batch: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            target_size: 2,
            max_batch: 20,
        }
    }
}

/// One pool member and the last time it passed a health check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyEntry {
    pub address: ProxyAddress,
    pub last_validated_at: Option<DateTime<Utc>>,
}

impl ProxyEntry {
    pub fn new(address: ProxyAddress) -> Self {
        Self {
            address,
            last_validated_at: None,
        }
    }
}

/// The managed set of usable proxy addresses.
///
/// Membership lives behind a reader/writer lock and is persisted after every
/// change while the write lock is held. Replenishment runs under a second,
/// dedicated lock so at most one call to the [`ProxySource`] is outstanding.
/// No lock is held across a source call.
pub struct ProxyPool {
    entries: RwLock<Vec<ProxyEntry>>,
    config: PoolConfig,
    source: Arc<dyn ProxySource>,
    snapshot: Option<SnapshotStore>,
    replenish_lock: Mutex<()>,
    rng: StdMutex<StdRng>,
    replenish_signal: Notify,
    validate_signal: Notify,
}

impl ProxyPool {
    /// Creates an empty pool fed by `source`.
    pub fn new(config: PoolConfig, source: Arc<dyn ProxySource>) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            config,
            source,
            snapshot: None,
            replenish_lock: Mutex::new(()),
            rng: StdMutex::new(StdRng::from_entropy()),
            replenish_signal: Notify::new(),
            validate_signal: Notify::new(),
        }
    }

    /// Persists membership to `store` after every change.
    pub fn with_snapshot(mut self, store: SnapshotStore) -> Self {
        self.snapshot = Some(store);
        self
    }

    /// Seeds the random generator used by [`ProxyPool::pick`].
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdMutex::new(StdRng::seed_from_u64(seed));
        self
    }

    pub fn target_size(&self) -> usize {
        self.config.target_size
    }

    /// Returns the number of members.
    pub async fn size(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Returns whether the pool has reached its target size.
    pub async fn is_full(&self) -> bool {
        self.size().await >= self.config.target_size
    }

    /// Returns whether `address` is a member.
    pub async fn contains(&self, address: &ProxyAddress) -> bool {
        self.entries
            .read()
            .await
            .iter()
            .any(|e| &e.address == address)
    }

    /// Returns the member addresses in pool order.
    pub async fn addresses(&self) -> Vec<ProxyAddress> {
        self.entries
            .read()
            .await
            .iter()
            .map(|e| e.address.clone())
            .collect()
    }

    /// Returns a copy of every entry in pool order.
    pub async fn entries(&self) -> Vec<ProxyEntry> {
        self.entries.read().await.clone()
    }

    /// Picks a member uniformly at random.
    pub async fn pick(&self) -> Result<ProxyAddress> {
        let entries = self.entries.read().await;
        match entries.len() {
            0 => Err(CollectorError::PoolEmpty),
            1 => Ok(entries[0].address.clone()),
            len => {
                let index = {
                    let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
                    rng.gen_range(0..len)
                };
                Ok(entries[index].address.clone())
            }
        }
    }

    /// Parses `raw` and adds it. Returns `false` when it was already a member.
    pub async fn add(&self, raw: &str) -> Result<bool> {
        let address = ProxyAddress::parse(raw)?;
        Ok(self.insert(address).await)
    }

    /// Adds an already parsed address. Returns `false` when it was already a member.
    pub async fn insert(&self, address: ProxyAddress) -> bool {
        let mut entries = self.entries.write().await;
        if entries.iter().any(|e| e.address == address) {
            debug!("Proxy {} already in pool", address);
            return false;
        }

        debug!("Adding proxy {}", address);
        entries.push(ProxyEntry::new(address));
        self.persist_entries(&entries).await;
        true
    }

    /// Removes `address` and asks for the pool to be topped up again.
    ///
    /// Removing an absent address is a no-op apart from the replenishment
    /// request.
    pub async fn remove(&self, address: &ProxyAddress) -> bool {
        let removed = self.evict(address).await;
        self.request_replenish();
        removed
    }

    /// Removes `address` without requesting replenishment.
    pub async fn evict(&self, address: &ProxyAddress) -> bool {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|e| &e.address != address);

        if entries.len() == before {
            return false;
        }

        info!("[ProxyService]: Removing proxy {}", address);
        self.persist_entries(&entries).await;
        true
    }

    /// Records a successful health check. A no-op for absent addresses.
    pub async fn mark_validated(&self, address: &ProxyAddress, at: DateTime<Utc>) -> bool {
        let mut entries = self.entries.write().await;
        match entries.iter_mut().find(|e| &e.address == address) {
            Some(entry) => {
                entry.last_validated_at = Some(at);
                true
            }
            None => false,
        }
    }

    /// Requests candidates from the source to cover the deficit against the
    /// target size, then asks for a validation pass.
    ///
    /// Returns the number of members added. Concurrent callers queue on the
    /// replenishment lock and recompute the deficit once inside it, so a
    /// burst of triggers results in a single source call.
    pub async fn replenish(&self) -> Result<usize> {
        let _guard = self.replenish_lock.lock().await;

        let deficit = self
            .config
            .target_size
            .saturating_sub(self.size().await)
            .min(self.config.max_batch);
        if deficit == 0 {
            return Ok(0);
        }

        info!(
            "[ProxyService]: Obtaining {} new proxies from {}",
            deficit,
            self.source.name()
        );
        let candidates = self.source.request(deficit).await?;

        let mut added = 0;
        for raw in candidates.iter().take(deficit) {
            match self.add(raw).await {
                Ok(true) => added += 1,
                Ok(false) => {}
                Err(e) => warn!("[ProxyService]: Skipping candidate: {}", e),
            }
        }

        debug!("[ProxyService]: Added {} of {} candidates", added, candidates.len());
        self.request_validation();
        Ok(added)
    }

    /// Replaces membership with the persisted snapshot.
    ///
    /// Unreadable snapshots and bad entries are logged and skipped. Returns
    /// the number of members loaded.
    pub async fn load(&self) -> usize {
        let Some(store) = &self.snapshot else {
            return 0;
        };

        let raw = match store.load().await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(
                    "[ProxyService]: Ignoring unreadable snapshot {}: {}",
                    store.path().display(),
                    e
                );
                Vec::new()
            }
        };

        let mut loaded: Vec<ProxyEntry> = Vec::with_capacity(raw.len());
        for candidate in raw {
            match ProxyAddress::parse(&candidate) {
                Ok(address) if loaded.iter().any(|e| e.address == address) => {
                    warn!("[ProxyService]: Duplicate proxy {} in snapshot", address);
                }
                Ok(address) => loaded.push(ProxyEntry::new(address)),
                Err(e) => warn!("[ProxyService]: Skipping snapshot entry: {}", e),
            }
        }

        let count = loaded.len();
        *self.entries.write().await = loaded;
        count
    }

    /// Writes the current membership to the snapshot.
    pub async fn persist(&self) {
        let entries = self.entries.write().await;
        self.persist_entries(&entries).await;
    }

    async fn persist_entries(&self, entries: &[ProxyEntry]) {
        let Some(store) = &self.snapshot else {
            return;
        };

        let addresses: Vec<String> = entries.iter().map(|e| e.address.to_string()).collect();
        if let Err(e) = store.save(&addresses).await {
            warn!(
                "[ProxyService]: Failed to persist proxy snapshot {}: {}",
                store.path().display(),
                e
            );
        }
    }

    /// Signals the replenishment loop. Signals coalesce while one is pending.
    pub fn request_replenish(&self) {
        self.replenish_signal.notify_one();
    }

    /// Signals the validator loop. Signals coalesce while one is pending.
    pub fn request_validation(&self) {
        self.validate_signal.notify_one();
    }

    pub(crate) async fn replenish_requested(&self) {
        self.replenish_signal.notified().await;
    }

    pub(crate) async fn validation_requested(&self) {
        self.validate_signal.notified().await;
    }
}
