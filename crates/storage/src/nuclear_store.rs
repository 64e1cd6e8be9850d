use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::Storage;

#[derive(Debug, Clone)]
pub struct NuclearFailureRow {
    pub id: i64,
    pub failure_type: String,
    pub original_url: String,
    pub content_title: Option<String>,
    pub error_message: String,
    pub retry_status: String,
    pub retry_count: i32,
    pub next_retry_at: DateTime<Utc>,
}

impl Storage {
    pub async fn insert_nuclear_failure(
        &self,
        failure_type: &str,
        original_url: &str,
        content_title: Option<&str>,
        error_message: &str,
    ) -> Result<i64> {
        let row: (i64,) = sqlx::query_as(
            "INSERT INTO nuclear_failures
                (failure_type, original_url, content_title, error_message, retry_status, retry_count, first_failed_at, next_retry_at)
             VALUES ($1, $2, $3, $4, 'pending', 0, NOW(), NOW())
             RETURNING id",
        )
        .bind(failure_type)
        .bind(original_url)
        .bind(content_title)
        .bind(error_message)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    /// Records due for another pass: `status = pending`, `next_retry_at <= now`,
    /// and under the configured max retry attempts.
    pub async fn due_nuclear_failures(&self, max_retry_attempts: u32) -> Result<Vec<NuclearFailureRow>> {
        let rows: Vec<(i64, String, String, Option<String>, String, String, i32, DateTime<Utc>)> = sqlx::query_as(
            "SELECT id, failure_type, original_url, content_title, error_message, retry_status, retry_count, next_retry_at
             FROM nuclear_failures
             WHERE retry_status = 'pending' AND next_retry_at <= NOW() AND retry_count < $1
             ORDER BY next_retry_at ASC",
        )
        .bind(max_retry_attempts as i32)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, failure_type, original_url, content_title, error_message, retry_status, retry_count, next_retry_at)| NuclearFailureRow {
                id,
                failure_type,
                original_url,
                content_title,
                error_message,
                retry_status,
                retry_count,
                next_retry_at,
            })
            .collect())
    }

    pub async fn mark_nuclear_success(&self, id: i64, success_url: Option<&str>) -> Result<()> {
        sqlx::query(
            "UPDATE nuclear_failures SET retry_status = 'success', last_retry_at = NOW(), success_url = $2 WHERE id = $1",
        )
        .bind(id)
        .bind(success_url)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Bumps `retry_count` and schedules the next attempt with exponential
    /// backoff capped at `max_backoff`; crosses into
    /// `human-intervention-required` once `human_intervention_threshold` is hit.
    pub async fn reschedule_nuclear_failure(
        &self,
        id: i64,
        retry_count: i32,
        error_message: &str,
        base_backoff: chrono::Duration,
        max_backoff: chrono::Duration,
        human_intervention_threshold: u32,
    ) -> Result<()> {
        let next_count = retry_count + 1;

        if (next_count as u32) >= human_intervention_threshold {
            sqlx::query(
                "UPDATE nuclear_failures
                 SET retry_status = 'human-intervention-required', retry_count = $2, last_retry_at = NOW(), error_message = $3
                 WHERE id = $1",
            )
            .bind(id)
            .bind(next_count)
            .bind(error_message)
            .execute(&self.pool)
            .await?;
            return Ok(());
        }

        let backoff_secs = base_backoff.num_seconds().saturating_mul(1i64 << next_count.min(30));
        let clamped_secs = backoff_secs.min(max_backoff.num_seconds());
        let next_retry_at = Utc::now() + chrono::Duration::seconds(clamped_secs);

        sqlx::query(
            "UPDATE nuclear_failures
             SET retry_count = $2, last_retry_at = NOW(), next_retry_at = $3, error_message = $4
             WHERE id = $1",
        )
        .bind(id)
        .bind(next_count)
        .bind(next_retry_at)
        .bind(error_message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn nuclear_failure_counts(&self) -> Result<Vec<(String, i64)>> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT retry_status, COUNT(*) FROM nuclear_failures GROUP BY retry_status")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows)
    }
}
