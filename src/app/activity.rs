use anyhow::Result;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::domain::activity::{ActivityEntry, ActivityLog};
use crate::infra::documents::DocumentStore;

const ACTIVITY_LOGS: &str = "activity_logs";

/// Buffers activity entries in memory and writes them to the document store
/// in batches. A batch is written as soon as `batch_size` entries are
/// queued; the periodic flusher and shutdown drain whatever is left.
///
/// Writes are best-effort: a failed batch is logged and dropped.
#[derive(Clone)]
pub struct ActivityLogger {
    documents: DocumentStore,
    queue: Arc<Mutex<Vec<ActivityEntry>>>,
    batch_size: usize,
}

impl ActivityLogger {
    pub fn new(documents: DocumentStore, batch_size: usize) -> Self {
        Self {
            documents,
            queue: Arc::new(Mutex::new(Vec::with_capacity(batch_size))),
            batch_size: batch_size.max(1),
        }
    }

    pub async fn record(&self, entry: ActivityEntry) {
        let batch = {
            let mut queue = self.queue.lock().await;
            queue.push(entry);
            if queue.len() < self.batch_size {
                return;
            }
            std::mem::take(&mut *queue)
        };
        self.write_batch(batch).await;
    }

    /// Writes every queued entry. Returns how many entries were drained.
    pub async fn flush(&self) -> usize {
        let batch = std::mem::take(&mut *self.queue.lock().await);
        let drained = batch.len();
        if drained > 0 {
            self.write_batch(batch).await;
        }
        drained
    }

    pub async fn pending(&self) -> usize {
        self.queue.lock().await.len()
    }

    /// Persisted entries, newest first, with the total count.
    pub async fn list_logs(&self, offset: i64, limit: i64) -> Result<(Vec<ActivityLog>, i64)> {
        let documents = self
            .documents
            .list::<ActivityEntry>(ACTIVITY_LOGS, offset, Some(limit))
            .await?;
        let total = self.documents.count(ACTIVITY_LOGS).await?;

        let logs = documents
            .into_iter()
            .map(|document| ActivityLog {
                id: document.id,
                entry: document.body,
            })
            .collect();
        Ok((logs, total))
    }

    async fn write_batch(&self, batch: Vec<ActivityEntry>) {
        let rows: Vec<_> = batch
            .into_iter()
            .map(|entry| (entry.timestamp, entry))
            .collect();

        match self.documents.insert_many(ACTIVITY_LOGS, &rows).await {
            Ok(written) => tracing::debug!(written = written, "flushed activity logs"),
            Err(err) => {
                tracing::error!(error = ?err, dropped = rows.len(), "failed to flush activity logs")
            }
        }
    }
}
