//! Analytics aggregation: a background consumer-group reader that folds the
//! raw event stream into per-endpoint and global hash counters.

use crate::error::Result;
use crate::store::Store;
use std::sync::Arc;
use std::time::Duration;

const GROUP_NAME: &str = "flux-analytics";
const BATCH_SIZE: usize = 100;
const READ_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// One decoded analytics event, matching the `{ts, key, ep, p, d, r, a}`
/// shape appended by [`crate::limiter::Limiter`].
#[derive(Debug, Clone)]
pub struct AnalyticsEvent {
    pub endpoint: String,
    pub allowed: bool,
}

impl AnalyticsEvent {
    fn from_fields(fields: &std::collections::HashMap<String, String>) -> Option<Self> {
        let endpoint = fields.get("ep")?.clone();
        let allowed = fields.get("d")?.as_str() == "1";
        Some(Self { endpoint, allowed })
    }
}

/// Drains `stream` via a named consumer group, aggregating into
/// `stats:ep:{endpoint}` and `stats:global` hash counters.
pub struct AnalyticsWorker {
    store: Arc<dyn Store>,
    stream: String,
    key_prefix: String,
    pub group_name: String,
    pub consumer_name: String,
}

impl AnalyticsWorker {
    pub fn new(store: Arc<dyn Store>, stream: String, key_prefix: String) -> Self {
        let consumer_name = format!("worker-{}", uuid::Uuid::new_v4());
        Self { store, stream, key_prefix, group_name: GROUP_NAME.to_string(), consumer_name }
    }

    async fn ensure_group(&self) -> Result<()> {
        self.store.xgroup_create(&self.stream, &self.group_name).await
    }

    /// Runs until cancelled. Intended to be spawned as its own task.
    pub async fn run(&self) -> Result<()> {
        self.ensure_group().await?;
        loop {
            match self.process_batch().await {
                Ok(0) => tokio::time::sleep(Duration::from_millis(100)).await,
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!("analytics worker read error, backing off: {err}");
                    tokio::time::sleep(READ_ERROR_BACKOFF).await;
                }
            }
        }
    }

    /// Reads and folds one batch, returning the number of events processed.
    /// Exposed separately from [`Self::run`] so tests can drive it directly.
    pub async fn process_batch(&self) -> Result<usize> {
        let entries = self
            .store
            .xreadgroup(&self.stream, &self.group_name, &self.consumer_name, BATCH_SIZE)
            .await?;
        if entries.is_empty() {
            return Ok(0);
        }
        self.process_messages(&entries).await
    }

    async fn process_messages(&self, entries: &[crate::store::StreamEntry]) -> Result<usize> {
        let mut ids = Vec::with_capacity(entries.len());
        for entry in entries {
            ids.push(entry.id.clone());
            if let Some(event) = AnalyticsEvent::from_fields(&entry.fields) {
                self.fold(&event).await?;
            }
        }
        self.store.xack(&self.stream, &self.group_name, &ids).await?;
        Ok(entries.len())
    }

    async fn fold(&self, event: &AnalyticsEvent) -> Result<()> {
        let per_endpoint = format!("{}stats:ep:{}", self.key_prefix, event.endpoint);
        let global = format!("{}stats:global", self.key_prefix);
        let now_ms = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("system clock before epoch")
            .as_millis()
            .to_string();

        let counter = if event.allowed { "c:allowed" } else { "c:blocked" };
        self.store.hincrby(&per_endpoint, counter, 1).await?;
        self.store.hset(&per_endpoint, "m:last_updated", &now_ms).await?;
        self.store.hincrby(&global, "l:count", 1).await?;
        Ok(())
    }
}
