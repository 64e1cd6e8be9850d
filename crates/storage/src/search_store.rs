use anyhow::Result;
use chrono::{NaiveDate, Utc};

use crate::Storage;

#[derive(Debug, Clone)]
pub struct SearchRequestRow {
    pub id: i64,
    pub query: String,
    pub priority: i32,
    pub status: String,
    pub attempts: i32,
    pub max_attempts: i32,
    pub result_url: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct DailySearchStats {
    pub searches_performed: i64,
    pub successful_searches: i64,
    pub failed_searches: i64,
    pub quota_used: i64,
}

impl Storage {
    pub async fn enqueue_search(&self, query: &str, priority: i32, max_attempts: i32) -> Result<i64> {
        let row: (i64,) = sqlx::query_as(
            "INSERT INTO search_queue (query, priority, status, attempts, max_attempts, created_at)
             VALUES ($1, $2, 'pending', 0, $3, NOW())
             RETURNING id",
        )
        .bind(query)
        .bind(priority)
        .bind(max_attempts)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    /// Returns a cached completed result for `query`, if one exists.
    pub async fn completed_search_result(&self, query: &str) -> Result<Option<String>> {
        let row: Option<(Option<String>,)> = sqlx::query_as(
            "SELECT result_url FROM search_queue WHERE query = $1 AND status = 'completed' ORDER BY created_at DESC LIMIT 1",
        )
        .bind(query)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.and_then(|(url,)| url))
    }

    /// Atomically claims the next pending request in priority-then-FIFO order.
    pub async fn dequeue_search(&self) -> Result<Option<SearchRequestRow>> {
        let row: Option<(i64, String, i32, String, i32, i32, Option<String>)> = sqlx::query_as(
            "UPDATE search_queue
             SET status = 'in-progress', last_attempt = NOW()
             WHERE id = (
                 SELECT id FROM search_queue
                 WHERE status = 'pending' AND attempts < max_attempts
                 ORDER BY priority ASC, created_at ASC
                 LIMIT 1
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING id, query, priority, status, attempts, max_attempts, result_url",
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(id, query, priority, status, attempts, max_attempts, result_url)| SearchRequestRow {
            id,
            query,
            priority,
            status,
            attempts,
            max_attempts,
            result_url,
        }))
    }

    pub async fn mark_search_completed(&self, id: i64, result_url: &str) -> Result<()> {
        sqlx::query("UPDATE search_queue SET status = 'completed', result_url = $2 WHERE id = $1")
            .bind(id)
            .bind(result_url)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn mark_search_failed(&self, id: i64, error: &str, increment: bool) -> Result<()> {
        if increment {
            sqlx::query(
                "UPDATE search_queue SET status = 'failed', attempts = attempts + 1, error_message = $2 WHERE id = $1",
            )
            .bind(id)
            .bind(error)
            .execute(&self.pool)
            .await?;
        } else {
            sqlx::query("UPDATE search_queue SET status = 'failed', error_message = $2 WHERE id = $1")
                .bind(id)
                .bind(error)
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    /// Leaves the request `pending` so the next dequeue retries it later.
    pub async fn mark_search_rate_limited(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE search_queue SET status = 'pending', attempts = attempts + 1 WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Resets every failed request to pending/zero-attempts for a full re-run.
    pub async fn reset_all_failed_searches(&self) -> Result<u64> {
        let result = sqlx::query("UPDATE search_queue SET status = 'pending', attempts = 0 WHERE status = 'failed'")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn today_search_stats(&self) -> Result<DailySearchStats> {
        let today = Utc::now().date_naive();
        self.search_stats_for(today).await
    }

    pub async fn search_stats_for(&self, date: NaiveDate) -> Result<DailySearchStats> {
        let row: Option<(i32, i32, i32, i32)> = sqlx::query_as(
            "SELECT searches_performed, successful_searches, failed_searches, quota_used
             FROM search_stats WHERE date = $1",
        )
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row
            .map(|(performed, successful, failed, quota)| DailySearchStats {
                searches_performed: performed as i64,
                successful_searches: successful as i64,
                failed_searches: failed as i64,
                quota_used: quota as i64,
            })
            .unwrap_or_default())
    }

    pub async fn record_search_outcome(&self, successful: bool) -> Result<()> {
        let today = Utc::now().date_naive();
        let (success_inc, fail_inc) = if successful { (1, 0) } else { (0, 1) };

        sqlx::query(
            "INSERT INTO search_stats (date, searches_performed, successful_searches, failed_searches, quota_used)
             VALUES ($1, 1, $2, $3, 1)
             ON CONFLICT (date) DO UPDATE SET
                searches_performed = search_stats.searches_performed + 1,
                successful_searches = search_stats.successful_searches + $2,
                failed_searches = search_stats.failed_searches + $3,
                quota_used = search_stats.quota_used + 1",
        )
        .bind(today)
        .bind(success_inc)
        .bind(fail_inc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
