use anyhow::Result;
use chrono::Utc;
use ingest_core::{JobStatus, UrlJob};
use sqlx::Row;

use crate::Storage;

fn parse_status(raw: &str) -> JobStatus {
    match raw {
        "running" => JobStatus::Running,
        "completed" => JobStatus::Completed,
        "failed" => JobStatus::Failed,
        _ => JobStatus::Pending,
    }
}

impl Storage {
    /// Normalizes and inserts one pending job, returning its id.
    pub async fn submit_job(&self, url: &str, priority: i32, source: &str) -> Result<String> {
        let normalized = ingest_core::normalize::submitted_url(url);
        let id = uuid::Uuid::new_v4().to_string();
        let data = serde_json::json!({
            "url": normalized,
            "source": source,
            "submitted_at": Utc::now(),
        });

        sqlx::query(
            "INSERT INTO worker_jobs (id, job_type, data, priority, status, created_at)
             VALUES ($1, 'url_fetch', $2, $3, 'pending', NOW())",
        )
        .bind(&id)
        .bind(&data)
        .bind(priority)
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    /// Inserts many jobs in one transaction, returning their ids in order.
    pub async fn submit_jobs_bulk(&self, urls: &[String], priority: i32, source: &str) -> Result<Vec<String>> {
        let mut tx = self.pool.begin().await?;
        let mut ids = Vec::with_capacity(urls.len());

        for url in urls {
            let normalized = ingest_core::normalize::submitted_url(url);
            let id = uuid::Uuid::new_v4().to_string();
            let data = serde_json::json!({
                "url": normalized,
                "source": source,
                "submitted_at": Utc::now(),
            });

            sqlx::query(
                "INSERT INTO worker_jobs (id, job_type, data, priority, status, created_at)
                 VALUES ($1, 'url_fetch', $2, $3, 'pending', NOW())",
            )
            .bind(&id)
            .bind(&data)
            .bind(priority)
            .execute(&mut *tx)
            .await?;

            ids.push(id);
        }

        tx.commit().await?;
        Ok(ids)
    }

    /// Atomically claims the highest-priority, oldest pending job for `worker_id`.
    pub async fn dequeue_job(&self, worker_id: &str) -> Result<Option<UrlJob>> {
        let row = sqlx::query(
            "UPDATE worker_jobs
             SET status = 'running', assigned_worker = $1, assigned_at = NOW()
             WHERE id = (
                 SELECT id FROM worker_jobs
                 WHERE status = 'pending'
                 ORDER BY priority DESC, created_at ASC
                 LIMIT 1
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING id, data, priority, status, created_at, assigned_at, completed_at, assigned_worker, retry_count, result",
        )
        .bind(worker_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(row_to_job))
    }

    pub async fn mark_job_completed(&self, id: &str, result: serde_json::Value) -> Result<()> {
        sqlx::query(
            "UPDATE worker_jobs SET status = 'completed', completed_at = NOW(), result = $2 WHERE id = $1",
        )
        .bind(id)
        .bind(result)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Increments the retry counter; if `max_retries` has been reached the job
    /// is marked `failed`, otherwise it's returned to `pending` for another pass.
    pub async fn mark_job_failed(&self, id: &str, error: &str, max_retries: u32) -> Result<()> {
        let row = sqlx::query("SELECT retry_count FROM worker_jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        let retry_count: i32 = row.map(|r| r.get::<i32, _>("retry_count")).unwrap_or(0);
        let next_retry = retry_count + 1;

        if (next_retry as u32) >= max_retries {
            sqlx::query(
                "UPDATE worker_jobs SET status = 'failed', retry_count = $2, completed_at = NOW(), result = $3 WHERE id = $1",
            )
            .bind(id)
            .bind(next_retry)
            .bind(serde_json::json!({"error": error}))
            .execute(&self.pool)
            .await?;
        } else {
            sqlx::query(
                "UPDATE worker_jobs SET status = 'pending', retry_count = $2, assigned_worker = NULL, assigned_at = NULL WHERE id = $1",
            )
            .bind(id)
            .bind(next_retry)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    /// Worker-crash recovery: jobs left `running` past `stale_after` return to `pending`.
    pub async fn reset_stale_running_jobs(&self, stale_after: chrono::Duration) -> Result<u64> {
        let cutoff = Utc::now() - stale_after;
        let result = sqlx::query(
            "UPDATE worker_jobs SET status = 'pending', assigned_worker = NULL, assigned_at = NULL
             WHERE status = 'running' AND assigned_at < $1",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn job_counts_by_status(&self) -> Result<Vec<(String, i64)>> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM worker_jobs GROUP BY status")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows)
    }
}

fn row_to_job(row: sqlx::postgres::PgRow) -> UrlJob {
    let data: serde_json::Value = row.get("data");
    let url = data.get("url").and_then(|v| v.as_str()).unwrap_or_default().to_string();
    let source = data.get("source").and_then(|v| v.as_str()).unwrap_or_default().to_string();
    let status: String = row.get("status");

    UrlJob {
        id: row.get("id"),
        url,
        source,
        priority: row.get("priority"),
        status: parse_status(&status),
        created_at: row.get("created_at"),
        assigned_at: row.get("assigned_at"),
        completed_at: row.get("completed_at"),
        assigned_worker: row.get("assigned_worker"),
        retry_count: row.get::<i32, _>("retry_count") as u32,
        result: row.get("result"),
    }
}

