//! Content store seam: previously admitted items from every source, queried
//! by a trailing time window.

#[cfg(feature = "postgres-store")]
pub mod postgres;
#[cfg(feature = "postgres-store")]
pub use postgres::PgContentStore;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::ScoutError;
use crate::dedup::canonical_url;

/// An item already present in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredItem {
    pub url: String,
    pub source_type: String,
    pub source_name: String,
    pub created_at: DateTime<Utc>,
    pub title: String,
}

/// An item to be inserted. `url` is the uniqueness key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewContentItem {
    pub url: String,
    pub source_type: String,
    pub source_name: String,
    pub title: String,
    pub summary: String,
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    AlreadyPresent,
}

#[async_trait]
pub trait ContentStore: Send + Sync {
    /// All items created within the last `since_days` days, measured from now.
    async fn recent_items(&self, since_days: i64) -> Result<Vec<StoredItem>, ScoutError>;

    /// Insert an item; inserting a URL that already exists is a no-op.
    async fn insert(&self, item: NewContentItem) -> Result<InsertOutcome, ScoutError>;
}

pub type DynContentStore = Arc<dyn ContentStore>;

/// Start of a trailing window of `since_days` days ending at `now`.
pub fn lookback_cutoff(now: DateTime<Utc>, since_days: i64) -> Result<DateTime<Utc>, ScoutError> {
    TimeDelta::try_days(since_days)
        .and_then(|window| now.checked_sub_signed(window))
        .ok_or_else(|| {
            ScoutError::InvalidConfiguration(format!("a {since_days}-day window is out of range"))
        })
}

/// In-memory store for tests and offline runs. Keys are canonical URLs.
#[derive(Default)]
pub struct InMemoryContentStore {
    items: DashMap<String, StoredItem>,
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place an item with an explicit creation time, bypassing `insert`.
    pub fn seed(&self, item: StoredItem) {
        self.items.insert(canonical_url(&item.url), item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, url: &str) -> Option<StoredItem> {
        self.items
            .get(&canonical_url(url))
            .map(|entry| entry.value().clone())
    }
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    async fn recent_items(&self, since_days: i64) -> Result<Vec<StoredItem>, ScoutError> {
        let cutoff = lookback_cutoff(Utc::now(), since_days)?;
        let mut items: Vec<StoredItem> = self
            .items
            .iter()
            .filter(|entry| entry.created_at >= cutoff)
            .map(|entry| entry.value().clone())
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(items)
    }

    async fn insert(&self, item: NewContentItem) -> Result<InsertOutcome, ScoutError> {
        let key = canonical_url(&item.url);
        let mut inserted = false;
        self.items.entry(key).or_insert_with(|| {
            inserted = true;
            StoredItem {
                url: item.url,
                source_type: item.source_type,
                source_name: item.source_name,
                created_at: Utc::now(),
                title: item.title,
            }
        });
        Ok(if inserted {
            InsertOutcome::Inserted
        } else {
            InsertOutcome::AlreadyPresent
        })
    }
}
