use ingest_core::IngestError;
use ingest_storage::search_store::SearchRequestRow;
use ingest_storage::Storage;

/// Priority urgent requests get dequeued first (lowest numeric value wins,
/// matching the `ORDER BY priority ASC` in the persisted queue). Values
/// match the Search Request data model's literal `urgent=1, normal=2,
/// background=3`.
pub const PRIORITY_URGENT: i32 = 1;
pub const PRIORITY_NORMAL: i32 = 2;
pub const PRIORITY_BACKGROUND: i32 = 3;

const DEFAULT_MAX_ATTEMPTS: i32 = 5;

/// Thin wrapper over the persisted `search_queue` table. All ordering and
/// atomicity live in SQL (`FOR UPDATE SKIP LOCKED`); this type exists only
/// to give the fallback service a typed, storage-agnostic surface.
pub struct SearchQueue {
    storage: Storage,
}

impl SearchQueue {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    pub async fn cached_result(&self, query: &str) -> Result<Option<String>, IngestError> {
        self.storage
            .completed_search_result(query)
            .await
            .map_err(IngestError::Other)
    }

    pub async fn enqueue(&self, query: &str, priority: i32) -> Result<i64, IngestError> {
        self.storage
            .enqueue_search(query, priority, DEFAULT_MAX_ATTEMPTS)
            .await
            .map_err(IngestError::Other)
    }

    pub async fn dequeue(&self) -> Result<Option<SearchRequestRow>, IngestError> {
        self.storage.dequeue_search().await.map_err(IngestError::Other)
    }

    pub async fn mark_completed(&self, id: i64, url: &str) -> Result<(), IngestError> {
        self.storage.mark_search_completed(id, url).await.map_err(IngestError::Other)
    }

    pub async fn mark_failed(&self, id: i64, error: &str, increment: bool) -> Result<(), IngestError> {
        self.storage.mark_search_failed(id, error, increment).await.map_err(IngestError::Other)
    }

    pub async fn mark_rate_limited(&self, id: i64) -> Result<(), IngestError> {
        self.storage.mark_search_rate_limited(id).await.map_err(IngestError::Other)
    }

    /// Resets every failed request to pending/zero-attempts for a full re-run.
    pub async fn reset_all_failed(&self) -> Result<u64, IngestError> {
        self.storage.reset_all_failed_searches().await.map_err(IngestError::Other)
    }

    pub async fn record_outcome(&self, successful: bool) -> Result<(), IngestError> {
        self.storage.record_search_outcome(successful).await.map_err(IngestError::Other)
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }
}
