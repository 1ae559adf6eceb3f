//! A rule-based agent for trying the conversation stack from a terminal.
//!
//! Utterances starting with "turn on" or "turn off" run a simulated device
//! tool and confirm the action. Anything else is echoed back.

use async_trait::async_trait;
use hearth_conversation::{
    AssistantContent, ChatLog, ConversationError, ConversationInput, ConversationResult,
    HandlerContext, IntentResponse, MessageHandler, SupportedLanguages, ToolInput, ToolResult,
    ToolResultContent,
};
use hearth_core::Result;
use tracing::debug;

const SYSTEM_PROMPT: &str = "You are a console assistant that can switch devices on and off.";

/// Echoes utterances and switches simulated devices.
#[derive(Debug, Default)]
pub struct ConsoleHandler;

impl ConsoleHandler {
    fn parse_command(text: &str) -> Option<(&'static str, &'static str, String)> {
        let lowered = text.trim().to_lowercase();
        let (tool, verb, rest) = if let Some(rest) = lowered.strip_prefix("turn on ") {
            ("HassTurnOn", "on", rest)
        } else if let Some(rest) = lowered.strip_prefix("turn off ") {
            ("HassTurnOff", "off", rest)
        } else {
            return None;
        };
        let target = rest
            .strip_prefix("the")
            .filter(|after| after.is_empty() || after.starts_with(' '))
            .unwrap_or(rest)
            .trim();
        (!target.is_empty()).then(|| (tool, verb, target.to_string()))
    }
}

#[async_trait]
impl MessageHandler for ConsoleHandler {
    fn supported_languages(&self) -> SupportedLanguages {
        SupportedLanguages::Only(vec!["en".to_string()])
    }

    async fn handle_message(
        &self,
        ctx: HandlerContext<'_>,
        input: &ConversationInput,
        chat_log: &mut ChatLog,
    ) -> Result<ConversationResult, ConversationError> {
        chat_log.provide_llm_data(SYSTEM_PROMPT);

        let reply = match Self::parse_command(&input.text) {
            Some((tool, verb, target)) => {
                debug!(tool, target, "running device tool");
                let call = ToolInput::new(tool, serde_json::json!({ "name": target }));
                chat_log.add_assistant_content(
                    AssistantContent::empty(ctx.entity_id).with_tool_call(call.clone()),
                );

                let mut response = IntentResponse::new(input.language.clone());
                response.set_speech(format!("Turned {verb} {target}"));
                chat_log.add_tool_result_content(ToolResultContent::for_call(
                    ctx.entity_id,
                    &call,
                    ToolResult::intent_response(response),
                ));
                format!("Turning {verb} the {target}")
            }
            None if input.text.trim().is_empty() => "What would you like me to do?".to_string(),
            None => format!("You said: {}", input.text.trim()),
        };

        chat_log
            .add_assistant_content_without_tools(AssistantContent::new(ctx.entity_id, reply))
            .map_err(|e| ConversationError::HandlerFailed {
                entity_id: ctx.entity_id.to_string(),
                reason: e.to_string(),
            })?;
        ctx.result_from_chat_log(input, chat_log)
    }
}
