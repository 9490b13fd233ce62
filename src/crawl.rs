//! Calendar crawl orchestration.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::calendar::{
    calendar_url, default_allowed_hosts, is_allowed_host, parse_listings, parse_slider_dates,
    CALENDAR_URL,
};
use crate::dispatch::{Job, JobSubmitter};
use crate::fetcher::PageFetcher;
use crate::{CollectorError, Result};

/// Totals of one crawl.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlReport {
    pub dates_visited: usize,
    pub failed_dates: Vec<NaiveDate>,
    pub listings: usize,
    pub submitted: usize,
    pub duplicates: usize,
    pub off_site: usize,
}

/// Walks the calendar and queues a detail job per event.
pub struct CrawlEngine {
    fetcher: Arc<dyn PageFetcher>,
    submitter: JobSubmitter,
    base_url: String,
    allowed_hosts: Option<Vec<String>>,
}

impl CrawlEngine {
    pub fn new(fetcher: Arc<dyn PageFetcher>, submitter: JobSubmitter) -> Self {
        Self {
            fetcher,
            submitter,
            base_url: CALENDAR_URL.to_string(),
            allowed_hosts: None,
        }
    }

    /// Uses a different calendar base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Restricts queued events to `hosts`. Defaults to the calendar host
    /// with and without `www.`.
    pub fn with_allowed_hosts(mut self, hosts: Vec<String>) -> Self {
        self.allowed_hosts = Some(hosts);
        self
    }

    /// Walks the calendar from `start` up to and including `end`.
    ///
    /// Each page's date slider decides which later dates are visited next,
    /// so days the calendar does not offer are never requested. A page
    /// without a slider, or one that fails, moves the walk on by one day.
    /// Every date is visited at most once. Event URLs seen on an earlier
    /// date, or on a host outside the allowed set, are not queued. Fails
    /// only on a bad calendar URL or when the dispatcher stops accepting
    /// jobs.
    pub async fn run(&self, start: NaiveDate, end: NaiveDate) -> Result<CrawlReport> {
        if end < start {
            return Err(CollectorError::Config(format!(
                "end date {} is before start date {}",
                end, start
            )));
        }
        let allowed = match &self.allowed_hosts {
            Some(hosts) => hosts.clone(),
            None => default_allowed_hosts(&self.base_url)?,
        };

        info!("Collecting offline events between {} and {}", start, end);

        let mut report = CrawlReport::default();
        let mut seen = HashSet::new();
        let mut visited = HashSet::new();
        let mut pending = BTreeSet::from([start]);

        while let Some(date) = pending.pop_first() {
            if !visited.insert(date) {
                continue;
            }
            report.dates_visited += 1;

            let offered = match self.crawl_date(date, &allowed, &mut seen, &mut report).await {
                Ok(offered) => offered,
                Err(CollectorError::DispatcherStopped) => {
                    return Err(CollectorError::DispatcherStopped)
                }
                Err(e) => {
                    warn!("Calendar page for {} failed: {}", date, e);
                    report.failed_dates.push(date);
                    Vec::new()
                }
            };

            if offered.is_empty() {
                if let Some(next) = date.succ_opt().filter(|next| *next <= end) {
                    pending.insert(next);
                }
                continue;
            }
            pending.extend(
                offered
                    .into_iter()
                    .filter(|d| *d > start && *d <= end && !visited.contains(d)),
            );
        }

        info!(
            dates = report.dates_visited,
            failed = report.failed_dates.len(),
            submitted = report.submitted,
            duplicates = report.duplicates,
            off_site = report.off_site,
            "Calendar crawl finished"
        );
        Ok(report)
    }

    /// Queues the events of one date and returns the dates its slider offers.
    async fn crawl_date(
        &self,
        date: NaiveDate,
        allowed: &[String],
        seen: &mut HashSet<String>,
        report: &mut CrawlReport,
    ) -> Result<Vec<NaiveDate>> {
        let url = calendar_url(&self.base_url, date);
        info!("visiting {}", url);

        let html = self.fetcher.fetch(&url).await?;
        let listings = parse_listings(&html, &url, date)?;
        let offered = parse_slider_dates(&html)?;

        report.listings += listings.len();
        for listing in listings {
            if !is_allowed_host(&listing.url, allowed) {
                debug!("Skipping off-site event {}", listing.url);
                report.off_site += 1;
                continue;
            }
            if !seen.insert(listing.url.clone()) {
                report.duplicates += 1;
                continue;
            }
            self.submitter.submit(Job::EventDetail(listing))?;
            report.submitted += 1;
        }
        Ok(offered)
    }
}
