//! Conversation entities.
//!
//! A [`ConversationEntity`] runs the processing protocol around a
//! [`MessageHandler`]:
//!
//! 1. Record and publish the last activity timestamp
//! 2. Acquire the chat session for the conversation
//! 3. Acquire the chat log for the session and input
//! 4. Let the handler produce content and a result
//! 5. Release the chat log, then the session
//!
//! Releases happen through scope guards, so they run on success, on error
//! and when the processing future is dropped.

use crate::chat_log::ChatLogStore;
use crate::error::ConversationError;
use crate::handler::{HandlerContext, MessageHandler, SupportedLanguages};
use crate::input::ConversationInput;
use crate::result::ConversationResult;
use crate::session::SessionManager;
use crate::state::EntityStateStore;
use chrono::{SecondsFormat, Utc};
use hearth_core::Result;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, instrument, warn};

/// Optional capabilities of a conversation entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConversationEntityFeature(u32);

impl ConversationEntityFeature {
    /// No optional capabilities.
    pub const NONE: Self = Self(0);
    /// The entity can control devices.
    pub const CONTROL: Self = Self(1);

    /// Returns true if all features in `other` are set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns the raw bits.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }
}

impl std::ops::BitOr for ConversationEntityFeature {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// Collaborators a conversation entity runs against.
#[derive(Clone)]
pub struct EntityBackends {
    /// Chat session storage.
    pub sessions: Arc<dyn SessionManager>,
    /// Chat log storage.
    pub chat_logs: Arc<dyn ChatLogStore>,
    /// Persisted entity state.
    pub state_store: Arc<dyn EntityStateStore>,
}

/// An entity that answers utterances through a message handler.
pub struct ConversationEntity {
    entity_id: String,
    handler: Arc<dyn MessageHandler>,
    backends: EntityBackends,
    supported_features: ConversationEntityFeature,
    supports_streaming: bool,
    last_activity: RwLock<Option<String>>,
}

impl ConversationEntity {
    /// Creates an entity. Its state stays `None` until it processes a
    /// request or [`ConversationEntity::restore_state`] finds a stored value.
    #[must_use]
    pub fn new(
        entity_id: impl Into<String>,
        handler: Arc<dyn MessageHandler>,
        backends: EntityBackends,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            handler,
            backends,
            supported_features: ConversationEntityFeature::NONE,
            supports_streaming: false,
            last_activity: RwLock::new(None),
        }
    }

    /// Sets the supported features.
    #[must_use]
    pub fn with_supported_features(mut self, features: ConversationEntityFeature) -> Self {
        self.supported_features = features;
        self
    }

    /// Marks the entity as streaming its responses.
    #[must_use]
    pub fn with_streaming(mut self, supports_streaming: bool) -> Self {
        self.supports_streaming = supports_streaming;
        self
    }

    /// Returns the entity ID.
    #[must_use]
    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    /// Returns the supported features.
    #[must_use]
    pub fn supported_features(&self) -> ConversationEntityFeature {
        self.supported_features
    }

    /// Returns true if the entity streams its responses.
    #[must_use]
    pub fn supports_streaming(&self) -> bool {
        self.supports_streaming
    }

    /// Returns the languages the handler understands.
    #[must_use]
    pub fn supported_languages(&self) -> SupportedLanguages {
        self.handler.supported_languages()
    }

    /// Returns the entity state: the time of the last processed request.
    #[must_use]
    pub fn state(&self) -> Option<String> {
        self.last_activity
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Restores the last activity from the state store.
    ///
    /// Sentinel values (`unavailable`, `unknown`) leave the state unset.
    ///
    /// # Errors
    ///
    /// Returns an error if the state store cannot be read.
    pub async fn restore_state(&self) -> Result<(), ConversationError> {
        let stored = self
            .backends
            .state_store
            .get_last_state(&self.entity_id)
            .await
            .map_err(|e| ConversationError::StateRestoreFailed {
                entity_id: self.entity_id.clone(),
                reason: e.to_string(),
            })?;

        if let Some(stored) = stored.filter(|stored| !stored.is_unavailable()) {
            debug!(entity_id = %self.entity_id, state = %stored.state, "restored last activity");
            self.set_last_activity(stored.state);
        }
        Ok(())
    }

    /// Processes one utterance.
    ///
    /// The last activity is recorded before anything else, so it reflects the
    /// attempt even when handling fails.
    ///
    /// # Errors
    ///
    /// Returns an error if the session or chat log cannot be acquired or the
    /// handler fails.
    #[instrument(skip(self, input), fields(entity_id = %self.entity_id, language = %input.language))]
    pub async fn process(
        &self,
        input: ConversationInput,
    ) -> Result<ConversationResult, ConversationError> {
        self.record_activity().await;

        let session = self
            .backends
            .sessions
            .acquire(input.conversation_id.as_ref())
            .await
            .map_err(|e| ConversationError::SessionUnavailable {
                reason: e.to_string(),
            })?;

        let mut chat_log = self
            .backends
            .chat_logs
            .acquire(&session, Some(&input))
            .await
            .map_err(|e| ConversationError::ChatLogUnavailable {
                reason: e.to_string(),
            })?;

        debug!(conversation_id = %session.conversation_id, "handling message");
        let ctx = HandlerContext {
            entity_id: &self.entity_id,
        };
        let result = self
            .handler
            .handle_message(ctx, &input, &mut chat_log)
            .await;

        match &result {
            Ok(_) => chat_log.commit(),
            Err(err) => {
                debug!(conversation_id = %session.conversation_id, error = %err, "message handling failed");
            }
        }
        result
    }

    /// Lets the handler warm up resources for a language.
    pub async fn prepare(&self, language: Option<&str>) {
        self.handler.prepare(language).await;
    }

    async fn record_activity(&self) {
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false);
        self.set_last_activity(now.clone());

        if let Err(err) = self
            .backends
            .state_store
            .write_state(&self.entity_id, Some(&now))
            .await
        {
            warn!(entity_id = %self.entity_id, error = %err, "failed to write entity state");
        }
    }

    fn set_last_activity(&self, value: String) {
        *self
            .last_activity
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(value);
    }
}

impl std::fmt::Debug for ConversationEntity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationEntity")
            .field("entity_id", &self.entity_id)
            .field("supported_features", &self.supported_features)
            .field("supports_streaming", &self.supports_streaming)
            .field("last_activity", &self.state())
            .finish_non_exhaustive()
    }
}
