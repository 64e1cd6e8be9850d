use anyhow::Result;
use chrono::Utc;
use ingest_core::{ContentRecord, UrlFingerprint};

use crate::Storage;

impl Storage {
    /// Inserts or replaces the content row for `record.url`'s fingerprint.
    pub async fn upsert_content(&self, record: &ContentRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO content (url, title, content, content_type, metadata, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (url) DO UPDATE SET
                title = EXCLUDED.title,
                content = EXCLUDED.content,
                content_type = EXCLUDED.content_type,
                metadata = EXCLUDED.metadata,
                updated_at = EXCLUDED.updated_at",
        )
        .bind(&record.url)
        .bind(&record.title)
        .bind(&record.content)
        .bind(&record.content_type)
        .bind(&record.metadata)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Dedup lookup keyed by normalized URL fingerprint rather than the raw
    /// submitted URL, so tracking-param variants of the same page collide.
    pub async fn content_by_fingerprint(&self, fingerprint: &UrlFingerprint) -> Result<Option<ContentRecord>> {
        let row: Option<(String, Option<String>, String, String, serde_json::Value, chrono::DateTime<Utc>, chrono::DateTime<Utc>)> =
            sqlx::query_as(
                "SELECT url, title, content, content_type, metadata, created_at, updated_at
                 FROM content WHERE url = $1",
            )
            .bind(fingerprint.to_string())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|(url, title, content, content_type, metadata, created_at, updated_at)| ContentRecord {
            url,
            title,
            content,
            content_type,
            metadata,
            created_at,
            updated_at,
        }))
    }

    pub async fn content_count(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM content")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }
}
