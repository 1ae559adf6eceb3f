//! Conversation processing for the hearth platform.
//!
//! This crate provides:
//!
//! - **Conversation Entity**: runs a message handler inside a scoped chat
//!   session and chat log, and tracks the entity's last activity
//! - **Session Manager**: conversation ID resolution and per-conversation
//!   serialization
//! - **Chat Log Store**: turn history with commit-on-success semantics
//! - **Result Extraction**: turns a finished chat log into an intent response
//! - **Conversation Service**: routes inputs to registered entities

pub mod chat_log;
pub mod config;
pub mod entity;
pub mod error;
pub mod handler;
pub mod input;
pub mod intent;
pub mod result;
pub mod service;
pub mod session;
pub mod state;

pub use chat_log::{
    AssistantContent, ChatLog, ChatLogStore, Content, InMemoryChatLogStore, ScopedChatLog,
    ToolInput, ToolResult, ToolResultContent,
};
pub use config::SessionConfig;
pub use entity::{ConversationEntity, ConversationEntityFeature, EntityBackends};
pub use error::{ChatLogError, ConversationError, SessionError, StateStoreError};
pub use handler::{HandlerContext, MessageHandler, SupportedLanguages};
pub use input::ConversationInput;
pub use intent::{IntentResponse, IntentResponseDict, IntentResponseErrorCode, IntentResponseType};
pub use result::{ConversationResult, extract_result};
pub use service::ConversationService;
pub use session::{ChatSession, InMemorySessionManager, ScopedSession, SessionManager};
pub use state::{EntityStateStore, InMemoryStateStore, StoredState};
