use super::TrackEvent;
use crate::session::SessionKey;
use async_trait::async_trait;
use std::collections::HashMap;

#[derive(Debug, thiserror::Error)]
pub enum TrackStoreError {
    #[error("track store: {0}")]
    Backend(String),
}

/// Storage backend of a [`SessionTracker`](super::SessionTracker).
#[async_trait]
pub trait TrackStore: Send + Sync {
    async fn append(&self, key: &SessionKey, event: TrackEvent) -> Result<(), TrackStoreError>;

    /// Events of `key` in append order, optionally only those after a cursor.
    async fn list(
        &self,
        key: &SessionKey,
        after: Option<u64>,
    ) -> Result<Vec<TrackEvent>, TrackStoreError>;

    async fn flush(&self, _key: &SessionKey) -> Result<(), TrackStoreError> {
        Ok(())
    }
}

/// In-memory storage for testing and local development.
#[derive(Debug, Default)]
pub struct MemoryTrackStore {
    entries: tokio::sync::RwLock<HashMap<SessionKey, Vec<TrackEvent>>>,
}

impl MemoryTrackStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TrackStore for MemoryTrackStore {
    async fn append(&self, key: &SessionKey, event: TrackEvent) -> Result<(), TrackStoreError> {
        let mut entries = self.entries.write().await;
        entries.entry(key.clone()).or_default().push(event);
        Ok(())
    }

    async fn list(
        &self,
        key: &SessionKey,
        after: Option<u64>,
    ) -> Result<Vec<TrackEvent>, TrackStoreError> {
        let entries = self.entries.read().await;
        let Some(events) = entries.get(key) else {
            return Ok(Vec::new());
        };
        Ok(events
            .iter()
            .filter(|e| after.map_or(true, |cursor| e.timestamp > cursor))
            .cloned()
            .collect())
    }
}
