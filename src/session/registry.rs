//! Generation session registry
//!
//! Maps opaque session ids to one pending task each. A task is handed out to
//! the first consumer that attaches and removed at that point; a second attach
//! to the same id finds nothing. Unattached entries expire after a TTL.

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Lifecycle of one generation request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Task registered, nobody attached yet
    Created,
    /// A consumer is draining fragments
    Attached,
    /// Completion sentinel emitted
    Completed,
    /// Consumer went away before completion
    Abandoned,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Attached => write!(f, "attached"),
            Self::Completed => write!(f, "completed"),
            Self::Abandoned => write!(f, "abandoned"),
        }
    }
}

struct PendingSession<T> {
    task: T,
    created_at: i64,
}

/// Registry of pending generation tasks
pub struct SessionRegistry<T> {
    sessions: Arc<RwLock<HashMap<String, PendingSession<T>>>>,
    ttl: Duration,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl<T> SessionRegistry<T>
where
    T: Send + Sync + 'static,
{
    /// Create an empty registry whose entries expire after `ttl`
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            ttl,
            sweeper: Mutex::new(None),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn is_expired(&self, created_at: i64, now: i64) -> bool {
        let ttl_ms = i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX);
        now.saturating_sub(created_at) > ttl_ms
    }

    /// Store a task under a fresh id and return the id
    pub async fn create(&self, task: T) -> String {
        let mut sessions = self.sessions.write().await;
        let mut id = Uuid::new_v4().to_string();
        while sessions.contains_key(&id) {
            id = Uuid::new_v4().to_string();
        }

        sessions.insert(
            id.clone(),
            PendingSession {
                task,
                created_at: chrono::Utc::now().timestamp_millis(),
            },
        );

        tracing::info!(session = %id, state = %SessionState::Created, "Registered generation session");
        id
    }

    /// Take the task for `id`. The entry is removed; expired entries count as absent.
    pub async fn consume(&self, id: &str) -> Result<T> {
        let pending = self
            .sessions
            .write()
            .await
            .remove(id)
            .ok_or_else(|| Error::session_not_found(id))?;

        if self.is_expired(pending.created_at, chrono::Utc::now().timestamp_millis()) {
            tracing::debug!(session = %id, "Session expired before attach");
            return Err(Error::session_not_found(id));
        }

        tracing::info!(session = %id, state = %SessionState::Attached, "Session attached");
        Ok(pending.task)
    }

    /// Whether `id` is pending and not expired
    pub async fn contains(&self, id: &str) -> bool {
        let now = chrono::Utc::now().timestamp_millis();
        self.sessions
            .read()
            .await
            .get(id)
            .is_some_and(|p| !self.is_expired(p.created_at, now))
    }

    /// Number of pending entries, including expired ones not yet swept
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Drop every expired entry, returning how many were removed
    pub async fn purge_expired(&self) -> usize {
        let now = chrono::Utc::now().timestamp_millis();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, p| !self.is_expired(p.created_at, now));
        let purged = before - sessions.len();

        if purged > 0 {
            tracing::info!("Purged {} expired generation sessions", purged);
        }
        purged
    }

    /// Run [`purge_expired`](Self::purge_expired) every `interval` until
    /// [`shutdown`](Self::shutdown) or until the registry is dropped.
    pub async fn spawn_sweeper(self: &Arc<Self>, interval: Duration) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(registry) = weak.upgrade() else {
                    break;
                };
                registry.purge_expired().await;
            }
        });

        if let Some(previous) = self.sweeper.lock().await.replace(handle) {
            previous.abort();
        }
    }

    /// Stop the sweeper and discard all pending sessions
    pub async fn shutdown(&self) -> usize {
        if let Some(handle) = self.sweeper.lock().await.take() {
            handle.abort();
        }

        let mut sessions = self.sessions.write().await;
        let dropped = sessions.len();
        sessions.clear();

        tracing::info!(dropped, "Session registry shut down");
        dropped
    }
}
