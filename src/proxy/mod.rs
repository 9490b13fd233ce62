//! Self-healing proxy pool.
//!
//! Every outbound page request is routed through a pool of health-checked
//! proxy addresses. The pool keeps itself at a target size: members that fail
//! a probe or keep failing real requests are evicted, and every eviction
//! triggers replenishment from a [`ProxySource`].
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use offline_collector::clock::SystemClock;
//! use offline_collector::proxy::{
//!     HttpHealthCheck, PoolConfig, ProxyPool, ProxyService, ProxyValidator,
//!     SnapshotStore, StaticProxySource, ValidatorConfig,
//! };
//!
//! # async fn example() {
//! let source = StaticProxySource::new(vec!["http://127.0.0.1:8080".into()]);
//! let pool = Arc::new(
//!     ProxyPool::new(PoolConfig::default(), Arc::new(source))
//!         .with_snapshot(SnapshotStore::default()),
//! );
//! let validator = ProxyValidator::new(
//!     Arc::clone(&pool),
//!     Arc::new(HttpHealthCheck::default()),
//!     Arc::new(SystemClock),
//!     ValidatorConfig::default(),
//! );
//!
//! let mut service = ProxyService::new(Arc::clone(&pool), validator);
//! service.start().await;
//! let proxy = pool.pick().await;
//! service.stop().await;
//! # }
//! ```

mod address;
mod failures;
mod pool;
mod service;
mod snapshot;
mod source;
mod validator;

pub use address::{ProxyAddress, ProxyScheme};
pub use failures::FailureTracker;
pub use pool::{PoolConfig, ProxyEntry, ProxyPool};
pub use service::ProxyService;
pub use snapshot::{SnapshotStore, DEFAULT_SNAPSHOT_PATH};
pub use source::{
    GetProxyListSource, ProxySource, PubProxySource, StaticProxySource, GETPROXYLIST_URL,
    PUBPROXY_URL,
};
pub use validator::{
    HealthCheck, HttpHealthCheck, PassReport, ProxyValidator, ValidatorConfig, DEFAULT_HEALTH_URL,
};
