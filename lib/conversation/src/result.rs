//! Conversation results and their extraction from a finished chat log.

use crate::chat_log::{ChatLog, Content};
use crate::error::ConversationError;
use crate::input::ConversationInput;
use crate::intent::{IntentResponse, IntentResponseErrorCode};
use hearth_core::{ConversationId, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::error;

/// The answer to one utterance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationResult {
    /// The structured response.
    pub response: IntentResponse,
    /// The conversation the answer belongs to.
    pub conversation_id: Option<ConversationId>,
    /// Whether the device should keep listening for a follow-up.
    pub continue_conversation: bool,
}

impl ConversationResult {
    /// Creates a result that ends the conversation.
    #[must_use]
    pub fn new(response: IntentResponse, conversation_id: Option<ConversationId>) -> Self {
        Self {
            response,
            conversation_id,
            continue_conversation: false,
        }
    }

    /// Creates an error result with `message` as speech.
    #[must_use]
    pub fn error(
        language: impl Into<String>,
        message: impl Into<String>,
        conversation_id: Option<ConversationId>,
    ) -> Self {
        let mut response = IntentResponse::new(language);
        response.set_error(IntentResponseErrorCode::Unknown, message);
        Self::new(response, conversation_id)
    }

    /// Renders the result as JSON.
    #[must_use]
    pub fn as_dict(&self) -> JsonValue {
        serde_json::json!({
            "response": self.response.as_dict(),
            "conversation_id": self.conversation_id,
            "continue_conversation": self.continue_conversation,
        })
    }
}

/// Builds the result of a turn from its chat log.
///
/// The intent response of the last tool result produced since model input
/// was provided becomes the base response; without one a fresh response in
/// the input's language is used. The speech is the text of the final
/// assistant content.
///
/// # Errors
///
/// Returns [`ConversationError::MalformedChatLog`] if the log does not end
/// with assistant content.
pub fn extract_result(
    entity_id: &str,
    input: &ConversationInput,
    chat_log: &ChatLog,
) -> Result<ConversationResult, ConversationError> {
    let mut response = chat_log
        .tool_results_since_llm_input()
        .filter_map(|content| content.tool_result.as_intent_response())
        .last()
        .map(|dict| dict.original.clone())
        .unwrap_or_else(|| IntentResponse::new(input.language.clone()));

    let Some(Content::Assistant(last_content)) = chat_log.last_content() else {
        error!(
            entity_id,
            last_content = ?chat_log.last_content(),
            "Last content in chat log is not an AssistantContent. \
             This could be due to the model not returning a valid response"
        );
        return Err(ConversationError::MalformedChatLog {
            entity_id: entity_id.to_string(),
        }
        .into());
    };

    response.set_speech(last_content.content.clone().unwrap_or_default());

    Ok(ConversationResult {
        response,
        conversation_id: Some(chat_log.conversation_id.clone()),
        continue_conversation: chat_log.continue_conversation(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat_log::{AssistantContent, ToolInput, ToolResult, ToolResultContent};
    use crate::intent::IntentResponseType;
    use serde_json::json;

    const ENTITY: &str = "conversation.test";

    fn input() -> ConversationInput {
        ConversationInput::new("turn on the lights", "en")
    }

    fn chat_log() -> ChatLog {
        let mut chat_log = ChatLog::new(ConversationId::generate());
        chat_log.add_user_content("turn on the lights");
        chat_log
    }

    fn intent_result(speech: &str) -> ToolResultContent {
        intent_result_of(IntentResponseType::QueryAnswer, speech)
    }

    fn intent_result_of(response_type: IntentResponseType, reprompt: &str) -> ToolResultContent {
        let mut response = IntentResponse::new("en");
        response.response_type = response_type;
        response.set_speech(reprompt);
        response.set_reprompt(reprompt);
        let call = ToolInput::new("HassTurnOn", json!({"area": "kitchen"}));
        ToolResultContent::for_call(ENTITY, &call, ToolResult::intent_response(response))
    }

    #[test]
    fn assistant_text_becomes_speech_of_fresh_response() {
        let mut log = chat_log();
        log.add_assistant_content(AssistantContent::new(ENTITY, "Turning on the lights"));

        let result = extract_result(ENTITY, &input(), &log).unwrap();

        assert_eq!(result.response.plain_speech(), Some("Turning on the lights"));
        assert_eq!(result.response.response_type, IntentResponseType::ActionDone);
        assert_eq!(result.response.language, "en");
        assert_eq!(result.conversation_id, Some(log.conversation_id.clone()));
        assert!(!result.continue_conversation);
    }

    #[test]
    fn last_intent_tool_result_wins() {
        let mut log = chat_log();
        log.provide_llm_data("prompt");
        log.add_tool_result_content(intent_result_of(IntentResponseType::QueryAnswer, "first"));
        log.add_tool_result_content(intent_result_of(
            IntentResponseType::PartialActionDone,
            "second",
        ));
        let call = ToolInput::new("GetWeather", json!({}));
        log.add_tool_result_content(ToolResultContent::for_call(
            ENTITY,
            &call,
            ToolResult::Json(json!({"temp": 21})),
        ));
        log.add_assistant_content(AssistantContent::new(ENTITY, "Done"));

        let result = extract_result(ENTITY, &input(), &log).unwrap();

        assert_eq!(
            result.response.response_type,
            IntentResponseType::PartialActionDone
        );
        assert_eq!(result.response.as_dict()["reprompt"]["plain"]["speech"], "second");
        assert_eq!(result.response.plain_speech(), Some("Done"));
    }

    #[test]
    fn tool_results_from_earlier_turns_are_ignored() {
        let mut log = chat_log();
        log.add_tool_result_content(intent_result("old"));
        log.provide_llm_data("prompt");
        log.add_assistant_content(AssistantContent::new(ENTITY, "Hello"));

        let result = extract_result(ENTITY, &input(), &log).unwrap();

        assert_eq!(result.response.response_type, IntentResponseType::ActionDone);
    }

    #[test]
    fn tool_result_as_last_item_is_malformed() {
        let mut log = chat_log();
        log.provide_llm_data("prompt");
        log.add_tool_result_content(intent_result("pending"));

        let err = extract_result(ENTITY, &input(), &log).unwrap_err();

        assert_eq!(
            err.current_context(),
            &ConversationError::MalformedChatLog {
                entity_id: ENTITY.to_string()
            }
        );
        assert_eq!(err.current_context().to_string(), "Unable to get response");
    }

    #[test]
    fn user_content_as_last_item_is_malformed() {
        let err = extract_result(ENTITY, &input(), &chat_log()).unwrap_err();
        assert!(matches!(
            err.current_context(),
            ConversationError::MalformedChatLog { .. }
        ));
    }

    #[test]
    fn missing_assistant_text_becomes_empty_speech() {
        let mut log = chat_log();
        log.add_assistant_content(AssistantContent::empty(ENTITY));

        let result = extract_result(ENTITY, &input(), &log).unwrap();

        assert_eq!(result.response.plain_speech(), Some(""));
    }

    #[test]
    fn question_continues_conversation() {
        let mut log = chat_log();
        log.add_assistant_content(AssistantContent::new(ENTITY, "Which room?"));

        let result = extract_result(ENTITY, &input(), &log).unwrap();

        assert!(result.continue_conversation);
    }

    #[test]
    fn error_result_shape() {
        let result = ConversationResult::error("en", "Unable to get response", None);
        let dict = result.as_dict();

        assert_eq!(dict["response"]["response_type"], "error");
        assert_eq!(dict["response"]["speech"]["plain"]["speech"], "Unable to get response");
        assert_eq!(dict["conversation_id"], JsonValue::Null);
        assert_eq!(dict["continue_conversation"], false);
    }
}
