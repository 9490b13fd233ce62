//! Destinations for collected event records.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info};

use crate::event::EventRecord;
use crate::{CollectorError, Result};

/// Trait for receiving finished event records.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, record: &EventRecord) -> Result<()>;
}

/// POSTs each record as JSON to an HTTP endpoint.
pub struct HttpEventSink {
    client: Client,
    url: String,
}

impl HttpEventSink {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| CollectorError::Parse(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl EventSink for HttpEventSink {
    async fn emit(&self, record: &EventRecord) -> Result<()> {
        self.client
            .post(&self.url)
            .json(record)
            .send()
            .await?
            .error_for_status()?;
        debug!("Posted event {}", record.listing.url);
        Ok(())
    }
}

#[derive(Default)]
struct Columns {
    address: Vec<String>,
    time: Vec<String>,
    price: Vec<String>,
}

/// Accumulates detail fields in memory and dumps them as line files.
#[derive(Default)]
pub struct CollectionSink {
    columns: Mutex<Columns>,
}

impl CollectionSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of collected (address, time, price) lines.
    pub fn counts(&self) -> (usize, usize, usize) {
        let columns = self.columns.lock().unwrap_or_else(|e| e.into_inner());
        (
            columns.address.len(),
            columns.time.len(),
            columns.price.len(),
        )
    }

    /// Writes `address.out`, `time.out` and `price.out` into `dir`, one
    /// value per line. Creates `dir` if needed.
    pub async fn dump(&self, dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir).await?;

        let files = {
            let columns = self.columns.lock().unwrap_or_else(|e| e.into_inner());
            [
                ("address", columns.address.join("\n")),
                ("time", columns.time.join("\n")),
                ("price", columns.price.join("\n")),
            ]
        };

        let mut written = Vec::with_capacity(files.len());
        for (name, contents) in files {
            let path = dir.join(format!("{}.out", name));
            tokio::fs::write(&path, contents).await?;
            written.push(path);
        }

        info!("Dumped collections to {}", dir.display());
        Ok(written)
    }
}

#[async_trait]
impl EventSink for CollectionSink {
    async fn emit(&self, record: &EventRecord) -> Result<()> {
        let mut columns = self.columns.lock().unwrap_or_else(|e| e.into_inner());
        let detail = &record.detail;
        if let Some(address) = &detail.address {
            columns.address.push(address.clone());
        }
        if let Some(time) = &detail.time {
            columns.time.push(time.clone());
        }
        if let Some(price) = &detail.price {
            columns.price.push(price.clone());
        }
        Ok(())
    }
}
