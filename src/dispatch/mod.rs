//! Bounded worker pool for detail-page jobs.

mod dispatcher;
mod job;
mod worker;

pub use dispatcher::{Dispatcher, DispatcherConfig, DispatcherStats, JobSubmitter, StatsSnapshot};
pub use job::{Job, JobHandler, JobKind};
pub use worker::Worker;
