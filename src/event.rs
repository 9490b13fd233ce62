//! Event value types.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One event as listed on a calendar page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventListing {
    /// Calendar day the event was listed under.
    pub date: NaiveDate,
    /// Event title.
    pub title: String,
    /// Short listing details (venue, time teaser).
    pub details: String,
    /// Absolute URL of the detail page.
    pub url: String,
}

impl EventListing {
    /// Creates a new listing.
    pub fn new(
        date: NaiveDate,
        title: impl Into<String>,
        details: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            date,
            title: title.into(),
            details: details.into(),
            url: url.into(),
        }
    }
}

/// Fields extracted from an event's detail page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDetail {
    pub address: Option<String>,
    pub time: Option<String>,
    pub price: Option<String>,
}

impl EventDetail {
    /// Returns whether nothing was extracted.
    pub fn is_empty(&self) -> bool {
        self.address.is_none() && self.time.is_none() && self.price.is_none()
    }
}

/// A listing merged with its detail page, as sent downstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    #[serde(flatten)]
    pub listing: EventListing,
    #[serde(flatten)]
    pub detail: EventDetail,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing() -> EventListing {
        EventListing::new(
            NaiveDate::from_ymd_opt(2024, 3, 9).unwrap(),
            "Jazz Night",
            "Downtown",
            "https://www.get-offline.com/raleigh/events/jazz",
        )
    }

    #[test]
    fn test_event_detail_default_is_empty() {
        assert!(EventDetail::default().is_empty());
        let detail = EventDetail {
            price: Some("$10".into()),
            ..Default::default()
        };
        assert!(!detail.is_empty());
    }

    #[test]
    fn test_listing_serialization() {
        let json = serde_json::to_string(&listing()).unwrap();
        assert!(json.contains("\"date\":\"2024-03-09\""));
        assert!(json.contains("\"title\":\"Jazz Night\""));
    }

    #[test]
    fn test_record_is_flat() {
        let record = EventRecord {
            listing: listing(),
            detail: EventDetail {
                address: Some("1 Main St".into()),
                time: None,
                price: Some("Free".into()),
            },
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["title"], "Jazz Night");
        assert_eq!(value["address"], "1 Main St");
        assert_eq!(value["price"], "Free");
        assert!(value["time"].is_null());

        let back: EventRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, record);
    }
}
