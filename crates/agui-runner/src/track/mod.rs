//! Per-session append-only log of emitted AG-UI events.

mod aggregate;
mod session;
mod store;

pub use aggregate::TextAggregator;
pub use session::{SessionTracker, SessionTrackerOptions};
pub use store::{MemoryTrackStore, TrackStore, TrackStoreError};

use crate::session::SessionKey;
use agui_protocol::{Event, EventCodecError};
use async_trait::async_trait;
use bytes::Bytes;

/// One persisted event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackEvent {
    /// Unix time in nanoseconds, strictly increasing within a session.
    pub timestamp: u64,
    /// JSON encoding of the event.
    pub payload: Bytes,
}

impl TrackEvent {
    pub fn decode(&self) -> Result<Event, EventCodecError> {
        Event::from_json_slice(&self.payload)
    }
}

/// Filters for [`Tracker::get_events`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GetEventsOptions {
    /// Only events with a timestamp strictly greater than this cursor.
    pub after: Option<u64>,
}

impl GetEventsOptions {
    pub fn after(timestamp: u64) -> Self {
        Self {
            after: Some(timestamp),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TrackError {
    #[error("invalid session key: {0}")]
    InvalidSessionKey(SessionKey),

    #[error("marshal event: {0}")]
    Encode(#[from] EventCodecError),

    #[error(transparent)]
    Store(#[from] TrackStoreError),
}

/// Event log keyed by session.
///
/// Implementations must keep call order per key and be safe to use from
/// concurrent runs on different keys.
#[async_trait]
pub trait Tracker: Send + Sync {
    async fn append_event(&self, key: &SessionKey, event: &Event) -> Result<(), TrackError>;

    async fn get_events(
        &self,
        key: &SessionKey,
        options: GetEventsOptions,
    ) -> Result<Vec<TrackEvent>, TrackError>;

    /// Persist everything appended so far for `key`.
    async fn flush(&self, key: &SessionKey) -> Result<(), TrackError>;
}
