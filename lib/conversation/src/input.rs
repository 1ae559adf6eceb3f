//! The request value handed to a conversation entity.

use hearth_core::ConversationId;
use serde::{Deserialize, Serialize};

/// One user utterance to process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationInput {
    /// The utterance text.
    pub text: String,
    /// Language tag of the utterance (e.g. "en").
    pub language: String,
    /// Conversation to continue. A new one is started when absent.
    pub conversation_id: Option<ConversationId>,
    /// Device the utterance came from.
    pub device_id: Option<String>,
    /// Satellite the utterance came from.
    pub satellite_id: Option<String>,
    /// Agent that should answer. The service default is used when absent.
    pub agent_id: Option<String>,
    /// Extra instructions appended to the model prompt.
    pub extra_system_prompt: Option<String>,
}

impl ConversationInput {
    /// Creates an input for a new conversation.
    #[must_use]
    pub fn new(text: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            language: language.into(),
            conversation_id: None,
            device_id: None,
            satellite_id: None,
            agent_id: None,
            extra_system_prompt: None,
        }
    }

    /// Continues an existing conversation.
    #[must_use]
    pub fn with_conversation_id(mut self, conversation_id: ConversationId) -> Self {
        self.conversation_id = Some(conversation_id);
        self
    }

    /// Sets the originating device.
    #[must_use]
    pub fn with_device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    /// Sets the originating satellite.
    #[must_use]
    pub fn with_satellite_id(mut self, satellite_id: impl Into<String>) -> Self {
        self.satellite_id = Some(satellite_id.into());
        self
    }

    /// Routes the input to a specific agent.
    #[must_use]
    pub fn with_agent_id(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    /// Sets extra system prompt instructions.
    #[must_use]
    pub fn with_extra_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.extra_system_prompt = Some(prompt.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_input_starts_a_conversation() {
        let input = ConversationInput::new("turn on the lights", "en");
        assert_eq!(input.text, "turn on the lights");
        assert_eq!(input.language, "en");
        assert!(input.conversation_id.is_none());
        assert!(input.agent_id.is_none());
    }

    #[test]
    fn builder_sets_optional_fields() {
        let id = ConversationId::generate();
        let input = ConversationInput::new("hi", "de")
            .with_conversation_id(id.clone())
            .with_device_id("kitchen_speaker")
            .with_satellite_id("assist_satellite.kitchen")
            .with_agent_id("conversation.llm")
            .with_extra_system_prompt("Answer briefly.");

        assert_eq!(input.conversation_id, Some(id));
        assert_eq!(input.device_id.as_deref(), Some("kitchen_speaker"));
        assert_eq!(
            input.satellite_id.as_deref(),
            Some("assist_satellite.kitchen")
        );
        assert_eq!(input.agent_id.as_deref(), Some("conversation.llm"));
        assert_eq!(input.extra_system_prompt.as_deref(), Some("Answer briefly."));
    }
}
