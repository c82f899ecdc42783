//! Pickup store feed.
//!
//! Pickup locations come from the eBuy sites API. A background task pulls
//! the feed at startup and then on a fixed interval, keeping only sites that
//! accept local trade. Failed refreshes are logged and the previous list
//! stays in place.

use std::time::Duration;

use serde::Deserialize;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use crate::config::PickupStoreConfig;
use crate::db::{PickupStoreRepository, RepositoryError};
use crate::models::PickupStore;

/// Errors from a feed refresh.
#[derive(Debug, Error)]
pub enum StoreFeedError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("feed returned status {0}")]
    Status(u16),

    #[error("malformed feed: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

#[derive(Debug, Deserialize)]
struct FeedResponse {
    data: FeedData,
}

#[derive(Debug, Deserialize)]
struct FeedData {
    #[serde(default)]
    items: Vec<FeedSite>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FeedSite {
    id: String,
    #[serde(rename = "type", default)]
    site_type: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    office_hours: Option<String>,
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    address_en: Option<String>,
    #[serde(default)]
    gps: Vec<f64>,
    #[serde(default)]
    local_trade: bool,
}

impl FeedSite {
    fn into_store(self) -> Option<PickupStore> {
        if !self.local_trade || self.id.trim().is_empty() {
            return None;
        }
        let (latitude, longitude) = match self.gps.as_slice() {
            [lat, lng, ..] => (Some(*lat), Some(*lng)),
            _ => (None, None),
        };
        let name = self
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| self.id.clone());

        Some(PickupStore {
            id: self.id,
            name,
            store_type: self.site_type,
            office_hours: self.office_hours,
            address: self.address,
            address_en: self.address_en,
            latitude,
            longitude,
        })
    }
}

/// Parse a feed body into the stores worth offering.
fn parse_feed(body: &str) -> Result<Vec<PickupStore>, serde_json::Error> {
    let response: FeedResponse = serde_json::from_str(body)?;
    Ok(response
        .data
        .items
        .into_iter()
        .filter_map(FeedSite::into_store)
        .collect())
}

/// Pulls the feed and upserts it.
pub struct StoreFeed {
    client: reqwest::Client,
    source_url: String,
}

impl StoreFeed {
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &PickupStoreConfig) -> Result<Self, StoreFeedError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            source_url: config.source_url.clone(),
        })
    }

    /// Fetch the feed and upsert every local-trade site.
    ///
    /// # Errors
    ///
    /// Returns `StoreFeedError` if the fetch, parse, or upsert fails; the
    /// stored list is unchanged in that case.
    #[instrument(skip(self, pool), fields(url = %self.source_url))]
    pub async fn refresh(&self, pool: &PgPool) -> Result<usize, StoreFeedError> {
        let response = self.client.get(&self.source_url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(StoreFeedError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        let stores = parse_feed(&body)?;
        if stores.is_empty() {
            warn!("Pickup store feed had no local-trade sites");
        }

        let count = PickupStoreRepository::new(pool).upsert_all(&stores).await?;
        info!(count, "Pickup stores refreshed");
        Ok(count)
    }
}

/// Spawn the background refresher. Does nothing when no interval is configured.
pub fn spawn_refresher(pool: PgPool, config: &PickupStoreConfig) {
    let Some(period) = config.refresh_interval else {
        info!("Pickup store refresher disabled");
        return;
    };

    let feed = match StoreFeed::new(config) {
        Ok(feed) => feed,
        Err(e) => {
            error!(error = %e, "Failed to build pickup store feed client");
            return;
        }
    };

    info!(period_secs = period.as_secs(), "Spawning pickup store refresher");
    tokio::spawn(async move {
        // first tick fires immediately
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = feed.refresh(&pool).await {
                error!(error = %e, "Pickup store refresh failed");
            }
        }
    });
}
