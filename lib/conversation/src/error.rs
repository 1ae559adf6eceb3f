//! Error types for the conversation crate.
//!
//! Errors are reported through rootcause:
//! - `SessionError`: Errors from chat session operations
//! - `ChatLogError`: Errors from chat log operations
//! - `StateStoreError`: Errors from the persisted entity state store
//! - `ConversationError`: Errors surfaced to callers of an entity

use hearth_core::ConversationId;
use std::fmt;

/// Errors from chat session operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The session store could not be used.
    StorageFailed { reason: String },
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StorageFailed { reason } => {
                write!(f, "session storage failed: {reason}")
            }
        }
    }
}

impl std::error::Error for SessionError {}

/// Errors from chat log operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatLogError {
    /// Assistant content carrying tool calls was added where tools are not
    /// executed.
    UnexpectedToolCalls { agent_id: String },
    /// The chat log store could not be used.
    StorageFailed {
        conversation_id: ConversationId,
        reason: String,
    },
}

impl fmt::Display for ChatLogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedToolCalls { agent_id } => {
                write!(f, "assistant content from '{agent_id}' has unexecuted tool calls")
            }
            Self::StorageFailed {
                conversation_id,
                reason,
            } => {
                write!(f, "chat log storage failed for {conversation_id}: {reason}")
            }
        }
    }
}

impl std::error::Error for ChatLogError {}

/// Errors from the persisted entity state store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateStoreError {
    /// Reading the last state failed.
    ReadFailed { entity_id: String, reason: String },
    /// Writing the state failed.
    WriteFailed { entity_id: String, reason: String },
}

impl fmt::Display for StateStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFailed { entity_id, reason } => {
                write!(f, "failed to read state of {entity_id}: {reason}")
            }
            Self::WriteFailed { entity_id, reason } => {
                write!(f, "failed to write state of {entity_id}: {reason}")
            }
        }
    }
}

impl std::error::Error for StateStoreError {}

/// Errors surfaced by conversation entities and the conversation service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationError {
    /// The entity's handler does not implement message handling.
    HandlerNotImplemented { entity_id: String },
    /// The chat log did not end with assistant content.
    MalformedChatLog { entity_id: String },
    /// The handler failed while producing a response.
    HandlerFailed { entity_id: String, reason: String },
    /// A chat session could not be acquired.
    SessionUnavailable { reason: String },
    /// A chat log could not be acquired or updated.
    ChatLogUnavailable { reason: String },
    /// The persisted entity state could not be restored.
    StateRestoreFailed { entity_id: String, reason: String },
    /// No entity is registered under the requested agent ID.
    UnknownAgent { agent_id: String },
}

impl ConversationError {
    /// Returns true for failures that indicate an integration bug rather
    /// than a failed answer.
    #[must_use]
    pub fn is_programming_error(&self) -> bool {
        matches!(
            self,
            Self::HandlerNotImplemented { .. } | Self::UnknownAgent { .. }
        )
    }
}

impl fmt::Display for ConversationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HandlerNotImplemented { entity_id } => {
                write!(f, "message handling is not implemented for {entity_id}")
            }
            Self::MalformedChatLog { .. } => write!(f, "Unable to get response"),
            Self::HandlerFailed { entity_id, reason } => {
                write!(f, "handler for {entity_id} failed: {reason}")
            }
            Self::SessionUnavailable { reason } => {
                write!(f, "chat session unavailable: {reason}")
            }
            Self::ChatLogUnavailable { reason } => {
                write!(f, "chat log unavailable: {reason}")
            }
            Self::StateRestoreFailed { entity_id, reason } => {
                write!(f, "failed to restore state of {entity_id}: {reason}")
            }
            Self::UnknownAgent { agent_id } => {
                write!(f, "no conversation agent registered as {agent_id}")
            }
        }
    }
}

impl std::error::Error for ConversationError {}
