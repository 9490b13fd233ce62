//! Event detail pages: extraction and the job handler that drives it.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, warn};

use crate::dispatch::{Job, JobHandler};
use crate::event::{EventDetail, EventListing, EventRecord};
use crate::fetcher::PageFetcher;
use crate::sink::EventSink;
use crate::{CollectorError, Result};

const ADDRESS_SELECTOR: &str = "div.show__address address";
const TIME_SELECTOR: &str = "div.show__time";
const PRICE_SELECTOR: &str = "div.show__price";

fn whitespace() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\s{2,}|[\r\n]+)").expect("whitespace pattern is valid"))
}

/// Trims `value` and collapses runs of whitespace and line breaks to a
/// single space.
pub fn collapse_whitespace(value: &str) -> String {
    whitespace().replace_all(value.trim(), " ").into_owned()
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css)
        .map_err(|e| CollectorError::Parse(format!("Failed to parse selector: {:?}", e)))
}

/// Text of every block matching `selector`, joined with `"; "`.
fn block_text(document: &Html, selector: &Selector) -> Option<String> {
    let blocks: Vec<String> = document
        .select(selector)
        .map(|e: ElementRef<'_>| collapse_whitespace(&e.text().collect::<String>()))
        .filter(|text| !text.is_empty())
        .collect();
    Some(blocks.join("; ")).filter(|text| !text.is_empty())
}

/// Extracts address, time and price from a detail page. Missing blocks are
/// left as `None`; repeated blocks are all kept.
pub fn parse_detail(html: &str) -> Result<EventDetail> {
    let document = Html::parse_document(html);
    Ok(EventDetail {
        address: block_text(&document, &selector(ADDRESS_SELECTOR)?),
        time: block_text(&document, &selector(TIME_SELECTOR)?),
        price: block_text(&document, &selector(PRICE_SELECTOR)?),
    })
}

/// Job handler that fetches an event's detail page and emits the merged
/// record to every sink.
pub struct DetailCollector {
    fetcher: Arc<dyn PageFetcher>,
    sinks: Vec<Arc<dyn EventSink>>,
}

impl DetailCollector {
    pub fn new(fetcher: Arc<dyn PageFetcher>) -> Self {
        Self {
            fetcher,
            sinks: Vec::new(),
        }
    }

    /// Adds a sink.
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    /// Fetches and extracts one listing's detail page.
    pub async fn collect(&self, listing: EventListing) -> Result<EventRecord> {
        info!("visiting: {}", listing.url);
        let html = self.fetcher.fetch(&listing.url).await?;
        let detail = parse_detail(&html)?;
        if detail.is_empty() {
            debug!("No detail blocks found on {}", listing.url);
        }
        Ok(EventRecord { listing, detail })
    }
}

#[async_trait]
impl JobHandler for DetailCollector {
    async fn handle(&self, job: Job) -> Result<()> {
        let Job::EventDetail(listing) = job;
        let record = self.collect(listing).await?;

        // Every sink gets the record even if an earlier one fails.
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.emit(&record).await {
                warn!("Sink rejected {}: {}", record.listing.url, e);
                first_error.get_or_insert(e);
            }
        }

        info!("Finished visiting {}", record.listing.url);
        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::CollectionSink;
    use chrono::NaiveDate;
    use std::collections::HashMap;

    const DETAIL_PAGE: &str = r#"
        <html><body>
          <div class="show__address">
            <h3>Where</h3>
            <address>
              123 Fayetteville St
              Raleigh,   NC
            </address>
          </div>
          <div class="show__time">
            Sat, Mar 9
            8:00 PM
          </div>
          <div class="show__price">  $15  </div>
        </body></html>
    "#;

    struct MapFetcher(HashMap<String, String>);

    #[async_trait]
    impl PageFetcher for MapFetcher {
        async fn fetch(&self, url: &str) -> Result<String> {
            self.0
                .get(url)
                .cloned()
                .ok_or_else(|| CollectorError::Parse(format!("no page for {}", url)))
        }
    }

    struct FailingSink;

    #[async_trait]
    impl EventSink for FailingSink {
        async fn emit(&self, _record: &EventRecord) -> Result<()> {
            Err(CollectorError::Parse("sink down".into()))
        }
    }

    fn listing(url: &str) -> EventListing {
        EventListing::new(
            NaiveDate::from_ymd_opt(2024, 3, 9).unwrap(),
            "Jazz Night",
            "Downtown",
            url,
        )
    }

    fn fetcher() -> Arc<dyn PageFetcher> {
        let mut pages = HashMap::new();
        pages.insert("https://e.test/jazz".to_string(), DETAIL_PAGE.to_string());
        Arc::new(MapFetcher(pages))
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  a  b\n\nc\r\nd e "), "a b c d e");
        assert_eq!(collapse_whitespace(""), "");
    }

    #[test]
    fn test_parse_detail() {
        let detail = parse_detail(DETAIL_PAGE).unwrap();
        assert_eq!(
            detail.address.as_deref(),
            Some("123 Fayetteville St Raleigh, NC")
        );
        assert_eq!(detail.time.as_deref(), Some("Sat, Mar 9 8:00 PM"));
        assert_eq!(detail.price.as_deref(), Some("$15"));
    }

    #[test]
    fn test_parse_detail_missing_blocks() {
        let detail = parse_detail("<div class=\"show__price\">Free</div>").unwrap();
        assert!(detail.address.is_none());
        assert!(detail.time.is_none());
        assert_eq!(detail.price.as_deref(), Some("Free"));

        assert!(parse_detail("<p>nothing</p>").unwrap().is_empty());
    }

    #[test]
    fn test_parse_detail_keeps_repeated_blocks() {
        let html = r#"
            <div class="show__time">Fri 7 PM</div>
            <div class="show__time">
              Sat   9 PM
            </div>
            <div class="show__time">   </div>
        "#;
        let detail = parse_detail(html).unwrap();
        assert_eq!(detail.time.as_deref(), Some("Fri 7 PM; Sat 9 PM"));
    }

    #[test]
    fn test_collect_outside_async_context() {
        let collector = DetailCollector::new(fetcher());
        let record =
            tokio_test::block_on(collector.collect(listing("https://e.test/jazz"))).unwrap();
        assert_eq!(record.listing.title, "Jazz Night");
        assert_eq!(record.detail.price.as_deref(), Some("$15"));
    }

    #[tokio::test]
    async fn test_handle_emits_record() {
        let sink = Arc::new(CollectionSink::new());
        let collector = DetailCollector::new(fetcher()).with_sink(sink.clone());

        collector
            .handle(Job::EventDetail(listing("https://e.test/jazz")))
            .await
            .unwrap();
        assert_eq!(sink.counts(), (1, 1, 1));
    }

    #[tokio::test]
    async fn test_handle_fetch_failure() {
        let sink = Arc::new(CollectionSink::new());
        let collector = DetailCollector::new(fetcher()).with_sink(sink.clone());

        let result = collector
            .handle(Job::EventDetail(listing("https://e.test/missing")))
            .await;
        assert!(result.is_err());
        assert_eq!(sink.counts(), (0, 0, 0));
    }

    #[tokio::test]
    async fn test_failing_sink_does_not_starve_others() {
        let sink = Arc::new(CollectionSink::new());
        let collector = DetailCollector::new(fetcher())
            .with_sink(Arc::new(FailingSink))
            .with_sink(sink.clone());
        assert_eq!(collector.sink_count(), 2);

        let result = collector
            .handle(Job::EventDetail(listing("https://e.test/jazz")))
            .await;
        assert!(result.is_err());
        assert_eq!(sink.counts(), (1, 1, 1));
    }
}
