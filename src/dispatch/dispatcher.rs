//! Fixed-size worker pool with cooperative shutdown.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::job::{Job, JobHandler};
use super::worker::Worker;
use crate::{CollectorError, Result};

/// Sizing for a [`Dispatcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Number of workers. Fixed for the dispatcher's lifetime.
    pub workers: usize,
    /// Capacity of the ready queue between the dispatch loop and the workers.
    pub queue_size: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers: 10,
            queue_size: 100,
        }
    }
}

/// Job counters (thread-safe).
#[derive(Debug, Default)]
pub struct DispatcherStats {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    in_flight: AtomicU64,
    peak_in_flight: AtomicU64,
}

impl DispatcherStats {
    fn job_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn job_started(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
    }

    pub(crate) fn job_completed(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn job_failed(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of current stats
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::SeqCst),
            peak_in_flight: self.peak_in_flight.load(Ordering::SeqCst),
        }
    }
}

/// Snapshot of dispatcher statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub in_flight: u64,
    pub peak_in_flight: u64,
}

impl StatsSnapshot {
    /// Jobs that have finished, successfully or not.
    pub fn finished(&self) -> u64 {
        self.completed + self.failed
    }
}

/// Cloneable handle for submitting jobs to a running [`Dispatcher`].
#[derive(Clone)]
pub struct JobSubmitter {
    intake: mpsc::UnboundedSender<Job>,
    stats: Arc<DispatcherStats>,
}

impl JobSubmitter {
    /// Queues a job. Never blocks; fails only once the dispatcher has stopped.
    pub fn submit(&self, job: Job) -> Result<()> {
        self.intake
            .send(job)
            .map_err(|_| CollectorError::DispatcherStopped)?;
        self.stats.job_submitted();
        Ok(())
    }
}

/// Balances submitted jobs across a fixed set of workers.
///
/// Submissions land on an unbounded intake. A single dispatch loop forwards
/// them into a bounded ready queue that idle workers pop from, so each job is
/// received by exactly one worker and at most `workers` jobs run at once.
/// Completion order is not submission order.
///
/// The intake itself is unbounded: a caller that can outrun the workers
/// indefinitely must bound its own submission rate.
pub struct Dispatcher {
    submitter: JobSubmitter,
    cancel: CancellationToken,
    dispatch_loop: JoinHandle<()>,
    workers: Vec<JoinHandle<()>>,
    stats: Arc<DispatcherStats>,
}

impl Dispatcher {
    /// Spawns the workers and the dispatch loop. Must be called inside a
    /// Tokio runtime.
    pub fn start(config: DispatcherConfig, handler: Arc<dyn JobHandler>) -> Self {
        let worker_count = config.workers.max(1);
        info!("[Dispatcher]: Starting {} Workers", worker_count);

        let stats = Arc::new(DispatcherStats::default());
        let (intake_tx, intake_rx) = mpsc::unbounded_channel();
        let (queue_tx, queue_rx) = mpsc::channel(config.queue_size.max(1));
        let queue = Arc::new(Mutex::new(queue_rx));

        let workers = (0..worker_count)
            .map(|id| {
                let worker = Worker::new(
                    id,
                    Arc::clone(&queue),
                    Arc::clone(&handler),
                    Arc::clone(&stats),
                );
                tokio::spawn(worker.run())
            })
            .collect();

        let cancel = CancellationToken::new();
        let dispatch_loop = tokio::spawn(dispatch(intake_rx, queue_tx, cancel.clone()));

        Self {
            submitter: JobSubmitter {
                intake: intake_tx,
                stats: Arc::clone(&stats),
            },
            cancel,
            dispatch_loop,
            workers,
            stats,
        }
    }

    /// Queues a job.
    pub fn submit(&self, job: Job) -> Result<()> {
        self.submitter.submit(job)
    }

    /// Returns a cloneable submission handle.
    pub fn submitter(&self) -> JobSubmitter {
        self.submitter.clone()
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Stops accepting jobs, lets every job submitted so far run, and returns
    /// once every worker has exited.
    ///
    /// Running jobs are never interrupted, so this waits for the longest one.
    pub async fn stop(self) -> StatsSnapshot {
        info!("[Dispatcher]: Received request to stop");
        self.cancel.cancel();

        if let Err(e) = self.dispatch_loop.await {
            warn!("[Dispatcher]: Dispatch loop ended abnormally: {}", e);
        }

        info!("[Dispatcher]: Closing all Workers");
        for worker in self.workers {
            if let Err(e) = worker.await {
                warn!("[Dispatcher]: Worker ended abnormally: {}", e);
            }
        }

        let stats = self.stats.snapshot();
        info!(
            completed = stats.completed,
            failed = stats.failed,
            "[Dispatcher]: Quitting"
        );
        stats
    }
}

async fn dispatch(
    mut intake: mpsc::UnboundedReceiver<Job>,
    queue: mpsc::Sender<Job>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            job = intake.recv() => match job {
                Some(job) => {
                    debug!("[Dispatcher]: Dispatching job {}", job.describe());
                    if queue.send(job).await.is_err() {
                        return;
                    }
                }
                None => return,
            },
        }
    }

    // Refuse new submissions, then hand over everything already accepted.
    intake.close();
    while let Some(job) = intake.recv().await {
        if queue.send(job).await.is_err() {
            break;
        }
    }
}
