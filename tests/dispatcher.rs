//! Integration tests for the dispatcher and its workers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use offline_collector::dispatch::{Dispatcher, DispatcherConfig, Job, JobHandler};
use offline_collector::event::EventListing;
use offline_collector::{CollectorError, Result};

/// Handler that records every job it sees and the peak concurrency.
struct TrackingHandler {
    delay: Duration,
    running: AtomicUsize,
    peak: AtomicUsize,
    seen: Mutex<HashMap<String, usize>>,
}

impl TrackingHandler {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            seen: Mutex::new(HashMap::new()),
        }
    }

    fn seen(&self) -> HashMap<String, usize> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobHandler for TrackingHandler {
    async fn handle(&self, job: Job) -> Result<()> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;

        let Job::EventDetail(listing) = job;
        *self.seen.lock().unwrap().entry(listing.url).or_default() += 1;
        self.running.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Fails every odd job and panics on every fifth.
struct UnrulyHandler {
    handled: AtomicUsize,
}

#[async_trait]
impl JobHandler for UnrulyHandler {
    async fn handle(&self, job: Job) -> Result<()> {
        let Job::EventDetail(listing) = job;
        let n: usize = listing.title.parse().unwrap();
        self.handled.fetch_add(1, Ordering::SeqCst);
        if n % 5 == 0 {
            panic!("job {} exploded", n);
        }
        if n % 2 == 1 {
            return Err(CollectorError::Parse(format!("job {} failed", n)));
        }
        Ok(())
    }
}

fn job(n: usize) -> Job {
    Job::EventDetail(EventListing::new(
        NaiveDate::from_ymd_opt(2024, 3, 9).unwrap(),
        n.to_string(),
        "",
        format!("https://www.get-offline.com/raleigh/events/{}", n),
    ))
}

#[tokio::test]
async fn test_two_workers_five_jobs() {
    let handler = Arc::new(TrackingHandler::new(Duration::from_millis(30)));
    let dispatcher = Dispatcher::start(
        DispatcherConfig {
            workers: 2,
            queue_size: 100,
        },
        handler.clone(),
    );
    assert_eq!(dispatcher.worker_count(), 2);

    for n in 0..5 {
        dispatcher.submit(job(n)).unwrap();
    }

    // Sample concurrency while the jobs run.
    for _ in 0..20 {
        assert!(handler.running.load(Ordering::SeqCst) <= 2);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let stats = dispatcher.stop().await;
    let seen = handler.seen();
    assert_eq!(seen.len(), 5);
    assert!(seen.values().all(|count| *count == 1));
    assert!(handler.peak.load(Ordering::SeqCst) <= 2);
    assert_eq!(stats.submitted, 5);
    assert_eq!(stats.completed, 5);
    assert!(stats.peak_in_flight <= 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_burst_larger_than_pool() {
    let workers = 4;
    let jobs = 200;
    let handler = Arc::new(TrackingHandler::new(Duration::from_millis(1)));
    let dispatcher = Dispatcher::start(
        DispatcherConfig {
            workers,
            queue_size: 8,
        },
        handler.clone(),
    );

    let mut submitters = Vec::new();
    for chunk in 0..4 {
        let submitter = dispatcher.submitter();
        submitters.push(tokio::spawn(async move {
            for n in (chunk * 50)..(chunk * 50 + 50) {
                submitter.submit(job(n)).unwrap();
            }
        }));
    }
    for s in submitters {
        s.await.unwrap();
    }

    let stats = dispatcher.stop().await;
    let seen = handler.seen();
    assert_eq!(seen.len(), jobs);
    assert!(seen.values().all(|count| *count == 1));
    assert!(handler.peak.load(Ordering::SeqCst) <= workers);
    assert_eq!(stats.finished(), jobs as u64);
    assert_eq!(stats.in_flight, 0);
}

#[tokio::test]
async fn test_stop_runs_every_job_submitted_before_it() {
    let handler = Arc::new(TrackingHandler::new(Duration::from_millis(10)));
    let dispatcher = Dispatcher::start(
        DispatcherConfig {
            workers: 2,
            queue_size: 1,
        },
        handler.clone(),
    );

    for n in 0..20 {
        dispatcher.submit(job(n)).unwrap();
    }
    let stats = dispatcher.stop().await;

    assert_eq!(handler.seen().len(), 20);
    assert_eq!(stats.completed, 20);
}

#[tokio::test]
async fn test_stop_waits_for_running_job() {
    let handler = Arc::new(TrackingHandler::new(Duration::from_millis(200)));
    let dispatcher = Dispatcher::start(
        DispatcherConfig {
            workers: 1,
            queue_size: 10,
        },
        handler.clone(),
    );

    dispatcher.submit(job(1)).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(handler.running.load(Ordering::SeqCst), 1);

    dispatcher.stop().await;
    assert_eq!(handler.running.load(Ordering::SeqCst), 0);
    assert_eq!(handler.seen().len(), 1);
}

#[tokio::test]
async fn test_failures_and_panics_do_not_kill_workers() {
    let handler = Arc::new(UnrulyHandler {
        handled: AtomicUsize::new(0),
    });
    let dispatcher = Dispatcher::start(
        DispatcherConfig {
            workers: 2,
            queue_size: 10,
        },
        handler.clone(),
    );

    for n in 1..=20 {
        dispatcher.submit(job(n)).unwrap();
    }
    let stats = dispatcher.stop().await;

    assert_eq!(handler.handled.load(Ordering::SeqCst), 20);
    // Multiples of five panic (4); the remaining odd numbers fail (8).
    assert_eq!(stats.failed, 12);
    assert_eq!(stats.completed, 8);
}

#[tokio::test]
async fn test_submit_after_stop_is_rejected() {
    let dispatcher = Dispatcher::start(
        DispatcherConfig::default(),
        Arc::new(TrackingHandler::new(Duration::ZERO)),
    );
    let submitter = dispatcher.submitter();
    dispatcher.stop().await;

    assert!(matches!(
        submitter.submit(job(1)),
        Err(CollectorError::DispatcherStopped)
    ));
}
