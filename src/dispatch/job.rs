//! Jobs and the capability that executes them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::event::EventListing;
use crate::Result;

/// Discriminant of a [`Job`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    EventDetail,
}

/// A unit of work for the worker pool. Immutable once submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum Job {
    /// Fetch and extract one event's detail page.
    EventDetail(EventListing),
}

impl Job {
    pub fn kind(&self) -> JobKind {
        match self {
            Job::EventDetail(_) => JobKind::EventDetail,
        }
    }

    /// Short label for log lines.
    pub fn describe(&self) -> String {
        match self {
            Job::EventDetail(listing) => format!("event-detail {}", listing.url),
        }
    }
}

/// Trait for executing jobs on a worker.
///
/// Errors and panics are contained per job by the worker; they never stop the
/// worker loop.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: Job) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn job() -> Job {
        Job::EventDetail(EventListing::new(
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            "Title",
            "Details",
            "https://example.com/e/1",
        ))
    }

    #[test]
    fn test_job_kind() {
        assert_eq!(job().kind(), JobKind::EventDetail);
    }

    #[test]
    fn test_job_describe() {
        assert_eq!(job().describe(), "event-detail https://example.com/e/1");
    }

    #[test]
    fn test_job_serializes_kind_and_payload() {
        let value = serde_json::to_value(job()).unwrap();
        assert_eq!(value["kind"], "event_detail");
        assert_eq!(value["payload"]["url"], "https://example.com/e/1");
    }
}
