//! Calendar page URLs and listing extraction.

use chrono::NaiveDate;
use scraper::{Html, Selector};
use tracing::{debug, warn};
use url::Url;

use crate::event::EventListing;
use crate::{CollectorError, Result};

/// Calendar of the Raleigh edition of get-offline.com.
pub const CALENDAR_URL: &str = "https://www.get-offline.com/raleigh/calendar";

/// Date format used in calendar query strings and slider ids.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

const LISTING_SELECTOR: &str = ".experience-thumb--calendar > a[href]";
const TITLE_SELECTOR: &str = r#"div[class$="_title"]"#;
const DETAILS_SELECTOR: &str = r#"div[class$="_details"]"#;
const SLIDER_SELECTOR: &str = ".calender-sliders__date";

/// Builds the URL of the calendar page for `date`.
pub fn calendar_url(base: &str, date: NaiveDate) -> String {
    format!("{}?date={}", base, date.format(DATE_FORMAT))
}

/// Parses a `YYYY-MM-DD` date.
pub fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|_| {
        CollectorError::Parse(format!(
            "Unable to parse '{}' as a date. Format YYYY-MM-DD",
            value
        ))
    })
}

/// Hosts a crawl rooted at `base` may follow: the base host with and
/// without its `www.` prefix.
pub fn default_allowed_hosts(base: &str) -> Result<Vec<String>> {
    let url = Url::parse(base)?;
    let host = url
        .host_str()
        .ok_or_else(|| CollectorError::Config(format!("calendar URL '{}' has no host", base)))?
        .to_ascii_lowercase();

    let alternate = match host.strip_prefix("www.") {
        Some(bare) => bare.to_string(),
        None => format!("www.{}", host),
    };
    Ok(vec![host, alternate])
}

/// Returns whether `url` points at one of `allowed` hosts. Matching is exact
/// and case-insensitive.
pub fn is_allowed_host(url: &str, allowed: &[String]) -> bool {
    let Ok(url) = Url::parse(url) else {
        return false;
    };
    url.host_str()
        .is_some_and(|host| allowed.iter().any(|a| a.eq_ignore_ascii_case(host)))
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css)
        .map_err(|e| CollectorError::Parse(format!("Failed to parse selector: {:?}", e)))
}

fn element_text(element: scraper::ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Extracts the event listings of one calendar page.
///
/// Relative links are resolved against `page_url`. Listings whose link
/// cannot be resolved are skipped.
pub fn parse_listings(html: &str, page_url: &str, date: NaiveDate) -> Result<Vec<EventListing>> {
    let base = Url::parse(page_url)?;
    let document = Html::parse_document(html);
    let listing_selector = selector(LISTING_SELECTOR)?;
    let title_selector = selector(TITLE_SELECTOR)?;
    let details_selector = selector(DETAILS_SELECTOR)?;

    let mut listings = Vec::new();

    for anchor in document.select(&listing_selector) {
        let href = anchor.value().attr("href").unwrap_or_default();
        let url = match base.join(href) {
            Ok(url) => url,
            Err(e) => {
                warn!("Skipping listing with bad link '{}': {}", href, e);
                continue;
            }
        };

        let title = anchor
            .select(&title_selector)
            .next()
            .map(element_text)
            .unwrap_or_default();
        let details = anchor
            .select(&details_selector)
            .next()
            .map(element_text)
            .unwrap_or_default();

        listings.push(EventListing::new(date, title, details, url.to_string()));
    }

    debug!("Found {} listings for {}", listings.len(), date);
    Ok(listings)
}

/// Extracts the dates offered by the page's date slider, in page order.
///
/// Ids that are not dates are logged and skipped.
pub fn parse_slider_dates(html: &str) -> Result<Vec<NaiveDate>> {
    let document = Html::parse_document(html);
    let slider_selector = selector(SLIDER_SELECTOR)?;

    let dates = document
        .select(&slider_selector)
        .filter_map(|element| element.value().attr("id"))
        .filter_map(|id| match parse_date(id) {
            Ok(date) => Some(date),
            Err(e) => {
                warn!("Unable to parse date id as date: {}", e);
                None
            }
        })
        .collect();

    Ok(dates)
}
