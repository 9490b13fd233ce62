//! # offline-collector
//!
//! A crawler for the get-offline.com event calendar that routes every
//! request through a self-healing pool of health-checked proxies.
//!
//! The library provides:
//!
//! - A proxy pool that persists its membership, replenishes itself from a
//!   [`proxy::ProxySource`] and evicts members that fail a health check
//! - A fixed-size worker pool ([`dispatch::Dispatcher`]) for detail-page jobs
//! - Calendar and detail page extraction
//! - Sinks for the collected event records
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use offline_collector::crawl::CrawlEngine;
//! use offline_collector::detail::DetailCollector;
//! use offline_collector::dispatch::{Dispatcher, DispatcherConfig};
//! use offline_collector::fetcher_http::ProxiedFetcher;
//! use offline_collector::proxy::{FailureTracker, PoolConfig, ProxyPool, StaticProxySource};
//! use offline_collector::sink::CollectionSink;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let source = Arc::new(StaticProxySource::new(vec!["http://127.0.0.1:8080".into()]));
//!     let pool = Arc::new(ProxyPool::new(PoolConfig::default(), source));
//!     pool.replenish().await?;
//!
//!     let fetcher = Arc::new(ProxiedFetcher::new(pool, Arc::new(FailureTracker::default())));
//!     let sink = Arc::new(CollectionSink::new());
//!     let collector = DetailCollector::new(fetcher.clone()).with_sink(sink.clone());
//!
//!     let dispatcher = Dispatcher::start(DispatcherConfig::default(), Arc::new(collector));
//!     let today = chrono::Local::now().date_naive();
//!     CrawlEngine::new(fetcher, dispatcher.submitter())
//!         .run(today, today)
//!         .await?;
//!     dispatcher.stop().await;
//!
//!     sink.dump("collect").await?;
//!     Ok(())
//! }
//! ```

mod error;

pub mod calendar;
pub mod clock;
pub mod config;
pub mod crawl;
pub mod detail;
pub mod dispatch;
pub mod event;
pub mod fetcher;
pub mod fetcher_http;
pub mod proxy;
pub mod sink;

pub use error::{CollectorError, Result};
