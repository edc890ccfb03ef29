use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, Pool, Postgres, Row};

use super::{ContentStore, InsertOutcome, NewContentItem, StoredItem, lookback_cutoff};
use crate::ScoutError;

/// Postgres-backed content store over a `content_items` table with a unique
/// `item_url` column.
#[derive(Clone)]
pub struct PgContentStore {
    pool: Pool<Postgres>,
}

impl PgContentStore {
    pub async fn connect(database_url: &str) -> Result<Self, ScoutError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(|err| ScoutError::Store(format!("connect failed: {err}")))?;

        pool.execute(
            r#"
            CREATE TABLE IF NOT EXISTS content_items (
                id BIGSERIAL PRIMARY KEY,
                source_type TEXT NOT NULL,
                source_name TEXT NOT NULL,
                item_url TEXT NOT NULL UNIQUE,
                title TEXT NOT NULL,
                description TEXT,
                published_date TIMESTAMPTZ,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            );
            CREATE INDEX IF NOT EXISTS content_items_created_at_idx
                ON content_items (created_at);
            "#,
        )
        .await
        .map_err(|err| ScoutError::Store(format!("schema setup failed: {err}")))?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl ContentStore for PgContentStore {
    async fn recent_items(&self, since_days: i64) -> Result<Vec<StoredItem>, ScoutError> {
        let cutoff = lookback_cutoff(Utc::now(), since_days)?;
        let rows = sqlx::query(
            r#"
            SELECT item_url, source_type, source_name, created_at, title
            FROM content_items
            WHERE created_at >= $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(|err| ScoutError::Store(err.to_string()))?;

        rows.into_iter()
            .map(|row| {
                Ok(StoredItem {
                    url: row.try_get("item_url")?,
                    source_type: row.try_get("source_type")?,
                    source_name: row.try_get("source_name")?,
                    created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
                    title: row.try_get("title")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(|err| ScoutError::Store(err.to_string()))
    }

    async fn insert(&self, item: NewContentItem) -> Result<InsertOutcome, ScoutError> {
        let result = sqlx::query(
            r#"
            INSERT INTO content_items (
                source_type,
                source_name,
                item_url,
                title,
                description,
                published_date
            ) VALUES ($1,$2,$3,$4,$5,$6)
            ON CONFLICT (item_url) DO NOTHING
            "#,
        )
        .bind(&item.source_type)
        .bind(&item.source_name)
        .bind(&item.url)
        .bind(&item.title)
        .bind(&item.summary)
        .bind(item.published_at)
        .execute(&self.pool)
        .await
        .map_err(|err| ScoutError::Store(err.to_string()))?;

        Ok(if result.rows_affected() == 0 {
            InsertOutcome::AlreadyPresent
        } else {
            InsertOutcome::Inserted
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn duplicate_insert_is_a_no_op() -> Result<(), ScoutError> {
        let Some(url) = std::env::var("NEWSSCOUT_TEST_DATABASE_URL").ok() else {
            // Skip when a test database is not provisioned.
            return Ok(());
        };
        let store = PgContentStore::connect(&url).await?;
        let item = NewContentItem {
            url: format!("https://example.test/{}", uuid::Uuid::new_v4()),
            source_type: "agent_search".into(),
            source_name: "general_ai|manual".into(),
            title: "Test".into(),
            summary: String::new(),
            published_at: None,
        };
        assert_eq!(store.insert(item.clone()).await?, InsertOutcome::Inserted);
        assert_eq!(store.insert(item.clone()).await?, InsertOutcome::AlreadyPresent);
        let recent = store.recent_items(1).await?;
        assert_eq!(recent.iter().filter(|row| row.url == item.url).count(), 1);
        Ok(())
    }
}
