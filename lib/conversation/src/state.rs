//! Persisted entity state.
//!
//! Conversation entities publish their last activity timestamp as state and
//! read the previously published value back once at startup.

use crate::error::StateStoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hearth_core::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// State value of an entity that is not available.
pub const STATE_UNAVAILABLE: &str = "unavailable";

/// State value of an entity whose state is not known.
pub const STATE_UNKNOWN: &str = "unknown";

/// A previously written entity state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredState {
    /// The state value.
    pub state: String,
    /// When the value was written.
    pub last_updated: DateTime<Utc>,
}

impl StoredState {
    /// Creates a state written now.
    #[must_use]
    pub fn new(state: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            last_updated: Utc::now(),
        }
    }

    /// Returns true if the value is one of the unavailable/unknown sentinels.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        self.state == STATE_UNAVAILABLE || self.state == STATE_UNKNOWN
    }
}

/// Trait for entity state storage.
#[async_trait]
pub trait EntityStateStore: Send + Sync {
    /// Returns the last state written for an entity.
    async fn get_last_state(
        &self,
        entity_id: &str,
    ) -> Result<Option<StoredState>, StateStoreError>;

    /// Writes the current state of an entity. `None` means unknown.
    async fn write_state(
        &self,
        entity_id: &str,
        state: Option<&str>,
    ) -> Result<(), StateStoreError>;
}

type StateMap = Arc<Mutex<HashMap<String, StoredState>>>;

/// In-process entity state store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStateStore {
    states: StateMap,
}

impl InMemoryStateStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the store with a previously written state.
    #[must_use]
    pub fn with_state(self, entity_id: impl Into<String>, state: impl Into<String>) -> Self {
        self.lock().insert(entity_id.into(), StoredState::new(state));
        self
    }

    /// Returns the current state of an entity.
    #[must_use]
    pub fn current(&self, entity_id: &str) -> Option<StoredState> {
        self.lock().get(entity_id).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, StoredState>> {
        self.states.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl EntityStateStore for InMemoryStateStore {
    async fn get_last_state(
        &self,
        entity_id: &str,
    ) -> Result<Option<StoredState>, StateStoreError> {
        Ok(self.current(entity_id))
    }

    async fn write_state(
        &self,
        entity_id: &str,
        state: Option<&str>,
    ) -> Result<(), StateStoreError> {
        let value = state.unwrap_or(STATE_UNKNOWN);
        self.lock()
            .insert(entity_id.to_string(), StoredState::new(value));
        Ok(())
    }
}
