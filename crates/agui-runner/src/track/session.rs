use super::{GetEventsOptions, TextAggregator, TrackError, TrackEvent, TrackStore, Tracker};
use crate::session::SessionKey;
use agui_protocol::Event;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTrackerOptions {
    pub aggregation_enabled: bool,
    /// Period of the background flush of pending aggregates.
    pub flush_interval: Option<Duration>,
}

impl Default for SessionTrackerOptions {
    fn default() -> Self {
        Self {
            aggregation_enabled: true,
            flush_interval: None,
        }
    }
}

#[derive(Debug)]
struct SessionState {
    aggregator: TextAggregator,
    flusher_running: bool,
}

type SharedState = Arc<tokio::sync::Mutex<SessionState>>;

struct Inner {
    store: Arc<dyn TrackStore>,
    options: SessionTrackerOptions,
    sessions: Mutex<HashMap<SessionKey, SharedState>>,
    /// Last timestamp handed out, across all sessions.
    last_timestamp: AtomicU64,
}

/// [`Tracker`] over a [`TrackStore`], with text delta aggregation.
///
/// Appends for one key are serialized; different keys proceed in parallel.
#[derive(Clone)]
pub struct SessionTracker {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SessionTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTracker")
            .field("options", &self.inner.options)
            .finish_non_exhaustive()
    }
}

fn unix_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

fn validate(key: &SessionKey) -> Result<(), TrackError> {
    if key.is_valid() {
        Ok(())
    } else {
        Err(TrackError::InvalidSessionKey(key.clone()))
    }
}

impl SessionTracker {
    pub fn new(store: Arc<dyn TrackStore>, options: SessionTrackerOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                options,
                sessions: Mutex::new(HashMap::new()),
                last_timestamp: AtomicU64::new(0),
            }),
        }
    }
}

impl Inner {
    fn sessions(&self) -> std::sync::MutexGuard<'_, HashMap<SessionKey, SharedState>> {
        match self.sessions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn state(&self, key: &SessionKey) -> SharedState {
        self.sessions()
            .entry(key.clone())
            .or_insert_with(|| {
                Arc::new(tokio::sync::Mutex::new(SessionState {
                    aggregator: TextAggregator::new(self.options.aggregation_enabled),
                    flusher_running: false,
                }))
            })
            .clone()
    }

    /// Strictly increasing nanosecond timestamp.
    fn next_timestamp(&self) -> u64 {
        let now = unix_nanos();
        let prev = self
            .last_timestamp
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
                Some(now.max(last.saturating_add(1)))
            })
            .unwrap_or_else(|last| last);
        now.max(prev.saturating_add(1))
    }

    async fn persist(&self, key: &SessionKey, events: Vec<Event>) -> Result<(), TrackError> {
        for event in events {
            let payload = Bytes::from(event.to_json_bytes()?);
            let timestamp = self.next_timestamp();
            self.store
                .append(key, TrackEvent { timestamp, payload })
                .await?;
        }
        Ok(())
    }

    async fn flush_locked(&self, key: &SessionKey, state: &mut SessionState) -> Result<(), TrackError> {
        let pending = state.aggregator.flush();
        self.persist(key, pending).await?;
        self.store.flush(key).await?;
        Ok(())
    }

    /// Drop the idle state of `key`. Kept while another task holds it.
    fn evict_idle(&self, key: &SessionKey, state: &SharedState, current: &SessionState) {
        if current.aggregator.has_pending() || current.flusher_running {
            return;
        }
        let mut sessions = self.sessions();
        if let Some(held) = sessions.get(key) {
            // The map and the caller are the only owners.
            if Arc::ptr_eq(held, state) && Arc::strong_count(state) == 2 {
                sessions.remove(key);
            }
        }
    }

    #[cfg(test)]
    fn tracked_sessions(&self) -> usize {
        self.sessions().len()
    }
}

/// Flush pending aggregates of `key` every `interval` until none are left or
/// the tracker is dropped.
fn spawn_flusher(inner: Weak<Inner>, key: SessionKey, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        loop {
            ticker.tick().await;
            let Some(inner) = inner.upgrade() else {
                break;
            };
            let state = inner.state(&key);
            let mut guard = state.lock().await;
            if let Err(err) = inner.flush_locked(&key, &mut guard).await {
                warn!(session = %key, error = %err, "periodic track flush failed");
            }
            if !guard.aggregator.has_pending() {
                guard.flusher_running = false;
                inner.evict_idle(&key, &state, &guard);
                debug!(session = %key, "track flusher stopped");
                break;
            }
        }
    });
}

#[async_trait]
impl Tracker for SessionTracker {
    async fn append_event(&self, key: &SessionKey, event: &Event) -> Result<(), TrackError> {
        validate(key)?;
        let state = self.inner.state(key);
        let mut guard = state.lock().await;
        let ready = guard.aggregator.push(event.clone());
        self.inner.persist(key, ready).await?;

        if let Some(interval) = self.inner.options.flush_interval {
            if guard.aggregator.has_pending() && !guard.flusher_running {
                guard.flusher_running = true;
                spawn_flusher(Arc::downgrade(&self.inner), key.clone(), interval);
            }
        }
        Ok(())
    }

    async fn get_events(
        &self,
        key: &SessionKey,
        options: GetEventsOptions,
    ) -> Result<Vec<TrackEvent>, TrackError> {
        validate(key)?;
        Ok(self.inner.store.list(key, options.after).await?)
    }

    async fn flush(&self, key: &SessionKey) -> Result<(), TrackError> {
        validate(key)?;
        let state = self.inner.state(key);
        let mut guard = state.lock().await;
        self.inner.flush_locked(key, &mut guard).await?;
        self.inner.evict_idle(key, &state, &guard);
        Ok(())
    }
}
