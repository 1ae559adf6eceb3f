//! Chat session management.
//!
//! A chat session correlates the turns of one conversation. Sessions are
//! handed out as [`ScopedSession`] guards: while a guard is alive no other
//! caller can hold a session for the same conversation ID, and dropping the
//! guard releases it on every exit path.

use crate::config::SessionConfig;
use crate::error::SessionError;
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use hearth_core::{ConversationId, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

/// A chat session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSession {
    /// The conversation this session belongs to.
    pub conversation_id: ConversationId,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    /// When the session was last released.
    pub last_updated: DateTime<Utc>,
}

impl ChatSession {
    /// Creates a new session for a conversation.
    #[must_use]
    pub fn new(conversation_id: ConversationId) -> Self {
        let now = Utc::now();
        Self {
            conversation_id,
            created_at: now,
            last_updated: now,
        }
    }

    /// Returns true if the session has been idle longer than `timeout`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>, timeout: TimeDelta) -> bool {
        now - self.last_updated > timeout
    }
}

type ReleaseFn = Box<dyn FnOnce(&ChatSession) + Send + Sync>;

/// Exclusive hold on a chat session, released on drop.
pub struct ScopedSession {
    session: ChatSession,
    on_release: Option<ReleaseFn>,
    _permit: Option<OwnedMutexGuard<()>>,
}

impl ScopedSession {
    /// Wraps a session with a release callback.
    ///
    /// Session managers that serialize access per conversation pass the
    /// guard they hold so it is dropped after the callback ran.
    #[must_use]
    pub fn new(
        session: ChatSession,
        permit: Option<OwnedMutexGuard<()>>,
        on_release: impl FnOnce(&ChatSession) + Send + Sync + 'static,
    ) -> Self {
        Self {
            session,
            on_release: Some(Box::new(on_release)),
            _permit: permit,
        }
    }
}

impl Deref for ScopedSession {
    type Target = ChatSession;

    fn deref(&self) -> &Self::Target {
        &self.session
    }
}

impl std::fmt::Debug for ScopedSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedSession")
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl Drop for ScopedSession {
    fn drop(&mut self) {
        if let Some(release) = self.on_release.take() {
            release(&self.session);
        }
    }
}

/// Trait for chat session storage.
#[async_trait]
pub trait SessionManager: Send + Sync {
    /// Acquires the session for a conversation, creating one if needed.
    ///
    /// Waits while another caller holds the same conversation.
    async fn acquire(
        &self,
        conversation_id: Option<&ConversationId>,
    ) -> Result<ScopedSession, SessionError>;

    /// Drops sessions idle since before `now - timeout` that nobody holds.
    ///
    /// Returns the IDs of the dropped sessions.
    async fn cleanup_expired(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ConversationId>, SessionError>;
}

struct SessionEntry {
    session: ChatSession,
    lock: Arc<AsyncMutex<()>>,
}

type SessionMap = Arc<Mutex<HashMap<ConversationId, SessionEntry>>>;

fn lock_map(sessions: &SessionMap) -> MutexGuard<'_, HashMap<ConversationId, SessionEntry>> {
    sessions.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-process session manager.
#[derive(Clone)]
pub struct InMemorySessionManager {
    timeout: TimeDelta,
    sessions: SessionMap,
}

impl InMemorySessionManager {
    /// Creates a manager dropping sessions idle longer than `timeout`.
    #[must_use]
    pub fn new(timeout: TimeDelta) -> Self {
        Self {
            timeout,
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Creates a manager from configuration.
    #[must_use]
    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.timeout())
    }

    /// Returns a snapshot of a stored session.
    #[must_use]
    pub fn session(&self, conversation_id: &ConversationId) -> Option<ChatSession> {
        lock_map(&self.sessions)
            .get(conversation_id)
            .map(|entry| entry.session.clone())
    }

    /// Returns the number of stored sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        lock_map(&self.sessions).len()
    }

    /// Returns true if no sessions are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Picks the ID a request should run under.
    ///
    /// An unknown ULID was minted by us for a conversation that has since
    /// expired, so a fresh one marks the start of a new conversation. IDs the
    /// caller chose are kept.
    fn resolve_id(
        sessions: &HashMap<ConversationId, SessionEntry>,
        requested: Option<&ConversationId>,
    ) -> ConversationId {
        match requested {
            None => ConversationId::generate(),
            Some(id) if sessions.contains_key(id) => id.clone(),
            Some(id) if id.is_ulid() => {
                let fresh = ConversationId::generate();
                debug!(stale = %id, conversation_id = %fresh, "unknown conversation, starting new one");
                fresh
            }
            Some(id) => id.clone(),
        }
    }

    fn entry<'a>(
        sessions: &'a mut HashMap<ConversationId, SessionEntry>,
        conversation_id: &ConversationId,
    ) -> &'a mut SessionEntry {
        sessions
            .entry(conversation_id.clone())
            .or_insert_with(|| SessionEntry {
                session: ChatSession::new(conversation_id.clone()),
                lock: Arc::new(AsyncMutex::new(())),
            })
    }
}

impl Default for InMemorySessionManager {
    fn default() -> Self {
        Self::from_config(&SessionConfig::default())
    }
}

#[async_trait]
impl SessionManager for InMemorySessionManager {
    async fn acquire(
        &self,
        conversation_id: Option<&ConversationId>,
    ) -> Result<ScopedSession, SessionError> {
        let (resolved, lock) = {
            let mut sessions = lock_map(&self.sessions);
            let resolved = Self::resolve_id(&sessions, conversation_id);
            let lock = Arc::clone(&Self::entry(&mut sessions, &resolved).lock);
            (resolved, lock)
        };

        let permit = lock.lock_owned().await;

        let session = {
            let mut sessions = lock_map(&self.sessions);
            Self::entry(&mut sessions, &resolved).session.clone()
        };
        debug!(conversation_id = %session.conversation_id, "chat session acquired");

        let sessions = Arc::clone(&self.sessions);
        Ok(ScopedSession::new(session, Some(permit), move |session| {
            let mut sessions = lock_map(&sessions);
            if let Some(entry) = sessions.get_mut(&session.conversation_id) {
                entry.session.last_updated = Utc::now();
            }
            debug!(conversation_id = %session.conversation_id, "chat session released");
        }))
    }

    async fn cleanup_expired(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ConversationId>, SessionError> {
        let mut sessions = lock_map(&self.sessions);
        // The map's own reference is the only one when nobody holds or
        // waits for the session.
        let expired: Vec<ConversationId> = sessions
            .iter()
            .filter(|(_, entry)| {
                Arc::strong_count(&entry.lock) == 1
                    && entry.session.is_expired(now, self.timeout)
            })
            .map(|(id, _)| id.clone())
            .collect();

        for id in &expired {
            sessions.remove(id);
            debug!(conversation_id = %id, "expired chat session removed");
        }
        Ok(expired)
    }
}
