//! A single pool worker.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::dispatcher::DispatcherStats;
use super::job::{Job, JobHandler};
use crate::CollectorError;

/// Ready queue shared by every worker of a dispatcher.
pub(crate) type JobQueue = Arc<Mutex<mpsc::Receiver<Job>>>;

/// Runs one job at a time until the ready queue is closed and drained.
///
/// A worker only looks at the queue between jobs, so closing the queue stops
/// it cooperatively: the job in hand always runs to completion first.
pub struct Worker {
    id: usize,
    queue: JobQueue,
    handler: Arc<dyn JobHandler>,
    stats: Arc<DispatcherStats>,
}

impl Worker {
    pub(crate) fn new(
        id: usize,
        queue: JobQueue,
        handler: Arc<dyn JobHandler>,
        stats: Arc<DispatcherStats>,
    ) -> Self {
        Self {
            id,
            queue,
            handler,
            stats,
        }
    }

    pub async fn run(self) {
        let span = info_span!("worker", id = self.id);
        async move {
            info!("Started");
            loop {
                let next = {
                    let mut queue = self.queue.lock().await;
                    queue.recv().await
                };

                match next {
                    Some(job) => self.execute(job).await,
                    None => break,
                }
            }
            info!("Quitting");
        }
        .instrument(span)
        .await
    }

    async fn execute(&self, job: Job) {
        let label = job.describe();
        debug!("Processing job {}", label);

        self.stats.job_started();
        let outcome = AssertUnwindSafe(self.handler.handle(job))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(())) => {
                self.stats.job_completed();
                debug!("Finished job {}", label);
            }
            Ok(Err(e)) => {
                self.stats.job_failed();
                warn!("Job {} failed: {}", label, e);
            }
            Err(panic) => {
                self.stats.job_failed();
                let err = CollectorError::JobHandler(panic_message(panic.as_ref()));
                error!("Job {} panicked: {}", label, err);
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
