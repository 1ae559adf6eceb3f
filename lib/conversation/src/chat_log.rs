//! Chat logs: the ordered record of content produced while answering.
//!
//! A chat log lives as long as its conversation. Each turn acquires a
//! [`ScopedChatLog`] from a [`ChatLogStore`], appends to it, and either
//! commits it (successful turn) or drops it (failed turn, changes discarded).

use crate::error::ChatLogError;
use crate::input::ConversationInput;
use crate::intent::{IntentResponse, IntentResponseDict};
use crate::session::ChatSession;
use async_trait::async_trait;
use hearth_core::{ConversationId, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;
use ulid::Ulid;

/// Endings that mark assistant text as a question back to the user.
const CONTINUE_MARKERS: [char; 4] = ['?', ';', '？', '；'];

/// System prompt content.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SystemContent {
    /// The prompt text.
    pub content: String,
}

/// Content the user said.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserContent {
    /// The utterance.
    pub content: String,
}

/// A tool call requested by the assistant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInput {
    /// Unique identifier for this tool call.
    pub id: String,
    /// The tool name.
    pub tool_name: String,
    /// Arguments for the tool.
    pub tool_args: JsonValue,
}

impl ToolInput {
    /// Creates a tool call with a generated ID.
    #[must_use]
    pub fn new(tool_name: impl Into<String>, tool_args: JsonValue) -> Self {
        Self {
            id: Ulid::new().to_string(),
            tool_name: tool_name.into(),
            tool_args,
        }
    }
}

/// Content produced by the backing model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantContent {
    /// The agent that produced the content.
    pub agent_id: String,
    /// Natural-language text, if any.
    pub content: Option<String>,
    /// Tool calls requested alongside the text.
    pub tool_calls: Vec<ToolInput>,
}

impl AssistantContent {
    /// Creates text-only assistant content.
    #[must_use]
    pub fn new(agent_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    /// Creates assistant content without text.
    #[must_use]
    pub fn empty(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            content: None,
            tool_calls: Vec::new(),
        }
    }

    /// Adds a tool call.
    #[must_use]
    pub fn with_tool_call(mut self, tool_call: ToolInput) -> Self {
        self.tool_calls.push(tool_call);
        self
    }
}

/// Payload returned by a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolResult {
    /// An intent was executed and produced a structured response.
    IntentResponse(IntentResponseDict),
    /// Any other JSON result.
    Json(JsonValue),
}

impl ToolResult {
    /// Wraps an intent response.
    #[must_use]
    pub fn intent_response(response: IntentResponse) -> Self {
        Self::IntentResponse(IntentResponseDict::new(response))
    }

    /// Returns the intent response payload, if this is one.
    #[must_use]
    pub fn as_intent_response(&self) -> Option<&IntentResponseDict> {
        match self {
            Self::IntentResponse(dict) => Some(dict),
            Self::Json(_) => None,
        }
    }
}

/// The result of an invoked tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultContent {
    /// The agent that invoked the tool.
    pub agent_id: String,
    /// The tool call this result answers.
    pub tool_call_id: String,
    /// The tool name.
    pub tool_name: String,
    /// The result payload.
    pub tool_result: ToolResult,
}

impl ToolResultContent {
    /// Creates a tool result answering `tool_call`.
    #[must_use]
    pub fn for_call(
        agent_id: impl Into<String>,
        tool_call: &ToolInput,
        tool_result: ToolResult,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            tool_call_id: tool_call.id.clone(),
            tool_name: tool_call.tool_name.clone(),
            tool_result,
        }
    }
}

/// One item in a chat log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Content {
    /// System prompt.
    System(SystemContent),
    /// User utterance.
    User(UserContent),
    /// Assistant output.
    Assistant(AssistantContent),
    /// Tool result.
    ToolResult(ToolResultContent),
}

impl Content {
    /// Returns the assistant content, if this is one.
    #[must_use]
    pub fn as_assistant(&self) -> Option<&AssistantContent> {
        match self {
            Self::Assistant(content) => Some(content),
            _ => None,
        }
    }

    /// Returns the tool result content, if this is one.
    #[must_use]
    pub fn as_tool_result(&self) -> Option<&ToolResultContent> {
        match self {
            Self::ToolResult(content) => Some(content),
            _ => None,
        }
    }
}

/// Ordered record of everything said during a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatLog {
    /// The conversation this log belongs to.
    pub conversation_id: ConversationId,
    /// Content in the order it was produced.
    pub content: Vec<Content>,
    /// Extra system prompt instructions for this conversation.
    pub extra_system_prompt: Option<String>,
    /// Position where model-visible input of the current turn begins.
    pub llm_input_provided_index: usize,
}

impl ChatLog {
    /// Creates a log holding an empty system prompt.
    #[must_use]
    pub fn new(conversation_id: ConversationId) -> Self {
        Self {
            conversation_id,
            content: vec![Content::System(SystemContent::default())],
            extra_system_prompt: None,
            llm_input_provided_index: 0,
        }
    }

    /// Appends what the user said.
    pub fn add_user_content(&mut self, content: impl Into<String>) {
        self.content.push(Content::User(UserContent {
            content: content.into(),
        }));
    }

    /// Appends assistant content, including any tool calls it carries.
    ///
    /// Callers that execute tools themselves add the results with
    /// [`ChatLog::add_tool_result_content`].
    pub fn add_assistant_content(&mut self, content: AssistantContent) {
        self.content.push(Content::Assistant(content));
    }

    /// Appends assistant content that must not request tool calls.
    ///
    /// # Errors
    ///
    /// Returns an error if the content carries tool calls.
    pub fn add_assistant_content_without_tools(
        &mut self,
        content: AssistantContent,
    ) -> Result<(), ChatLogError> {
        if !content.tool_calls.is_empty() {
            return Err(ChatLogError::UnexpectedToolCalls {
                agent_id: content.agent_id,
            }
            .into());
        }
        self.add_assistant_content(content);
        Ok(())
    }

    /// Appends a tool result.
    pub fn add_tool_result_content(&mut self, content: ToolResultContent) {
        self.content.push(Content::ToolResult(content));
    }

    /// Installs the system prompt for this turn and marks everything after
    /// it as model-visible input.
    pub fn provide_llm_data(&mut self, system_prompt: impl Into<String>) {
        let mut prompt = system_prompt.into();
        if let Some(extra) = &self.extra_system_prompt {
            prompt.push('\n');
            prompt.push_str(extra);
        }
        let system = Content::System(SystemContent { content: prompt });
        if matches!(self.content.first(), Some(Content::System(_))) {
            self.content[0] = system;
        } else {
            self.content.insert(0, system);
        }
        self.llm_input_provided_index = self.content.len();
    }

    /// Returns the most recent content item.
    #[must_use]
    pub fn last_content(&self) -> Option<&Content> {
        self.content.last()
    }

    /// Returns tool results produced since model input was provided.
    pub fn tool_results_since_llm_input(&self) -> impl Iterator<Item = &ToolResultContent> {
        let start = self.llm_input_provided_index.min(self.content.len());
        self.content[start..].iter().filter_map(Content::as_tool_result)
    }

    /// Returns true if the assistant's last words ask the user something.
    #[must_use]
    pub fn continue_conversation(&self) -> bool {
        self.last_content()
            .and_then(Content::as_assistant)
            .and_then(|assistant| assistant.content.as_deref())
            .is_some_and(|text| text.trim().ends_with(CONTINUE_MARKERS))
    }
}

type CommitFn = Box<dyn FnOnce(ChatLog) + Send + Sync>;

/// Chat log held for the duration of one turn.
///
/// Dereferences to the underlying [`ChatLog`]. Call [`ScopedChatLog::commit`]
/// after a successful turn; dropping the guard without committing discards
/// the turn's changes.
pub struct ScopedChatLog {
    chat_log: ChatLog,
    acquired_len: usize,
    on_commit: Option<CommitFn>,
}

impl ScopedChatLog {
    /// Wraps a log with the callback that stores it on commit.
    #[must_use]
    pub fn new(
        chat_log: ChatLog,
        on_commit: impl FnOnce(ChatLog) + Send + Sync + 'static,
    ) -> Self {
        let acquired_len = chat_log.content.len();
        Self {
            chat_log,
            acquired_len,
            on_commit: Some(Box::new(on_commit)),
        }
    }

    /// Returns true if content was added since acquisition.
    #[must_use]
    pub fn has_new_content(&self) -> bool {
        self.chat_log.content.len() > self.acquired_len
    }

    /// Ends the scope, storing the log if the turn added content.
    pub fn commit(mut self) {
        let Some(store) = self.on_commit.take() else {
            return;
        };
        if !self.has_new_content() {
            debug!(
                conversation_id = %self.chat_log.conversation_id,
                "chat log opened but no content was added, ignoring update"
            );
            return;
        }
        store(self.chat_log.clone());
    }
}

impl Deref for ScopedChatLog {
    type Target = ChatLog;

    fn deref(&self) -> &Self::Target {
        &self.chat_log
    }
}

impl DerefMut for ScopedChatLog {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.chat_log
    }
}

impl std::fmt::Debug for ScopedChatLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedChatLog")
            .field("chat_log", &self.chat_log)
            .field("acquired_len", &self.acquired_len)
            .finish_non_exhaustive()
    }
}

impl Drop for ScopedChatLog {
    fn drop(&mut self) {
        if self.on_commit.take().is_some() {
            debug!(
                conversation_id = %self.chat_log.conversation_id,
                "chat log released without commit, discarding changes"
            );
        }
    }
}

/// Trait for chat log storage.
#[async_trait]
pub trait ChatLogStore: Send + Sync {
    /// Acquires the log for a session, appending the input's text as user
    /// content when an input is given.
    async fn acquire(
        &self,
        session: &ChatSession,
        input: Option<&ConversationInput>,
    ) -> Result<ScopedChatLog, ChatLogError>;

    /// Drops the stored log of a conversation.
    async fn forget(&self, conversation_id: &ConversationId) -> Result<(), ChatLogError>;
}

type LogMap = Arc<Mutex<HashMap<ConversationId, ChatLog>>>;

fn lock_logs(logs: &LogMap) -> MutexGuard<'_, HashMap<ConversationId, ChatLog>> {
    logs.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-process chat log store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryChatLogStore {
    logs: LogMap,
}

impl InMemoryChatLogStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the stored log of a conversation.
    #[must_use]
    pub fn get(&self, conversation_id: &ConversationId) -> Option<ChatLog> {
        lock_logs(&self.logs).get(conversation_id).cloned()
    }
}

#[async_trait]
impl ChatLogStore for InMemoryChatLogStore {
    async fn acquire(
        &self,
        session: &ChatSession,
        input: Option<&ConversationInput>,
    ) -> Result<ScopedChatLog, ChatLogError> {
        let conversation_id = session.conversation_id.clone();
        let mut chat_log = lock_logs(&self.logs)
            .get(&conversation_id)
            .cloned()
            .unwrap_or_else(|| ChatLog::new(conversation_id.clone()));

        if let Some(input) = input {
            if input.extra_system_prompt.is_some() {
                chat_log.extra_system_prompt = input.extra_system_prompt.clone();
            }
            chat_log.add_user_content(input.text.clone());
        }

        let logs = Arc::clone(&self.logs);
        Ok(ScopedChatLog::new(chat_log, move |chat_log| {
            debug!(conversation_id = %chat_log.conversation_id, "chat log stored");
            lock_logs(&logs).insert(chat_log.conversation_id.clone(), chat_log);
        }))
    }

    async fn forget(&self, conversation_id: &ConversationId) -> Result<(), ChatLogError> {
        lock_logs(&self.logs).remove(conversation_id);
        Ok(())
    }
}
