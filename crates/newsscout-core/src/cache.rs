//! Per-category, per-day result cache so repeated runs on the same day do not
//! spend provider calls again.

use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::AdmittedArticle;
use crate::{Category, ScoutError};

#[derive(Debug, Serialize, Deserialize)]
struct CacheRecord {
    date: NaiveDate,
    written_at: DateTime<Utc>,
    articles: Vec<AdmittedArticle>,
}

#[derive(Debug, Clone)]
pub struct ResultCache {
    dir: PathBuf,
}

impl ResultCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, category: Category, date: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("{}_{}.json", category.slug(), date.format("%Y-%m-%d")))
    }

    /// Cached articles for `date`, or `None` when nothing was written that day.
    pub async fn load(
        &self,
        category: Category,
        date: NaiveDate,
    ) -> Result<Option<Vec<AdmittedArticle>>, ScoutError> {
        let path = self.path_for(category, date);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(ScoutError::Cache(format!(
                    "failed to read {}: {err}",
                    path.display()
                )));
            }
        };

        let record: CacheRecord = serde_json::from_slice(&raw).map_err(|err| {
            ScoutError::Cache(format!("corrupt cache file {}: {err}", path.display()))
        })?;
        if record.date != date {
            return Ok(None);
        }
        debug!(%category, written_at = %record.written_at, "loaded cached articles");
        Ok(Some(record.articles))
    }

    pub async fn store(
        &self,
        category: Category,
        date: NaiveDate,
        articles: &[AdmittedArticle],
    ) -> Result<PathBuf, ScoutError> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|err| {
            ScoutError::Cache(format!("failed to create {}: {err}", self.dir.display()))
        })?;

        let path = self.path_for(category, date);
        let record = CacheRecord {
            date,
            written_at: Utc::now(),
            articles: articles.to_vec(),
        };
        let bytes = serde_json::to_vec_pretty(&record)
            .map_err(|err| ScoutError::Cache(err.to_string()))?;
        tokio::fs::write(&path, bytes).await.map_err(|err| {
            ScoutError::Cache(format!("failed to write {}: {err}", path.display()))
        })?;
        Ok(path)
    }
}
