//! The pluggable message handler behind a conversation entity.
//!
//! Concrete backends (LLM-backed agents, rule-based intent matchers)
//! implement [`MessageHandler`]. The entity owns the surrounding protocol:
//! activity tracking, session and chat log scoping.

use crate::chat_log::ChatLog;
use crate::error::ConversationError;
use crate::input::ConversationInput;
use crate::result::{ConversationResult, extract_result};
use async_trait::async_trait;
use hearth_core::Result;

/// Languages a handler understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupportedLanguages {
    /// Any language ("*").
    All,
    /// Only the listed language tags.
    Only(Vec<String>),
}

impl SupportedLanguages {
    /// Returns true if `language` is supported.
    ///
    /// Matching ignores case and accepts a region-qualified tag when its
    /// base language is listed ("en-US" matches "en").
    #[must_use]
    pub fn supports(&self, language: &str) -> bool {
        match self {
            Self::All => true,
            Self::Only(languages) => {
                let base = language.split(['-', '_']).next().unwrap_or(language);
                languages.iter().any(|supported| {
                    supported.eq_ignore_ascii_case(language) || supported.eq_ignore_ascii_case(base)
                })
            }
        }
    }
}

/// Per-call information handed to a handler.
#[derive(Debug, Clone, Copy)]
pub struct HandlerContext<'a> {
    /// The entity the call is running on.
    pub entity_id: &'a str,
}

impl HandlerContext<'_> {
    /// Builds the call's result from a finished chat log.
    ///
    /// # Errors
    ///
    /// Returns [`ConversationError::MalformedChatLog`] if the log does not
    /// end with assistant content.
    pub fn result_from_chat_log(
        &self,
        input: &ConversationInput,
        chat_log: &ChatLog,
    ) -> Result<ConversationResult, ConversationError> {
        extract_result(self.entity_id, input, chat_log)
    }
}

/// Trait for conversation message handlers.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Returns the languages this handler understands.
    fn supported_languages(&self) -> SupportedLanguages;

    /// Produces chat log content for one utterance and returns the result.
    ///
    /// The default implementation fails with
    /// [`ConversationError::HandlerNotImplemented`].
    ///
    /// # Errors
    ///
    /// Returns an error if the utterance could not be answered.
    async fn handle_message(
        &self,
        ctx: HandlerContext<'_>,
        _input: &ConversationInput,
        _chat_log: &mut ChatLog,
    ) -> Result<ConversationResult, ConversationError> {
        Err(ConversationError::HandlerNotImplemented {
            entity_id: ctx.entity_id.to_string(),
        }
        .into())
    }

    /// Warms up language-specific resources. Must be idempotent.
    async fn prepare(&self, _language: Option<&str>) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Unimplemented;

    impl MessageHandler for Unimplemented {
        fn supported_languages(&self) -> SupportedLanguages {
            SupportedLanguages::All
        }
    }

    #[test]
    fn all_supports_everything() {
        assert!(SupportedLanguages::All.supports("nl"));
    }

    #[test]
    fn explicit_list_matches_base_language() {
        let languages = SupportedLanguages::Only(vec!["en".to_string(), "de-CH".to_string()]);
        assert!(languages.supports("en"));
        assert!(languages.supports("en-US"));
        assert!(languages.supports("DE-ch"));
        assert!(!languages.supports("de"));
        assert!(!languages.supports("fr"));
    }

    #[tokio::test]
    async fn default_handle_message_is_unimplemented() {
        let handler = Unimplemented;
        let input = ConversationInput::new("hello", "en");
        let mut chat_log = ChatLog::new(hearth_core::ConversationId::generate());

        let err = handler
            .handle_message(
                HandlerContext {
                    entity_id: "conversation.test",
                },
                &input,
                &mut chat_log,
            )
            .await
            .unwrap_err();

        assert_eq!(
            err.current_context(),
            &ConversationError::HandlerNotImplemented {
                entity_id: "conversation.test".to_string()
            }
        );
    }

    #[tokio::test]
    async fn default_prepare_is_noop() {
        let handler = Unimplemented;
        handler.prepare(None).await;
        handler.prepare(Some("en")).await;
        handler.prepare(Some("en")).await;
    }
}
