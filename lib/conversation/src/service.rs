//! Front-end routing across registered conversation entities.

use crate::entity::ConversationEntity;
use crate::error::ConversationError;
use crate::input::ConversationInput;
use crate::result::ConversationResult;
use hearth_core::Result;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Routes inputs to conversation entities by agent ID.
#[derive(Debug, Default)]
pub struct ConversationService {
    agents: BTreeMap<String, Arc<ConversationEntity>>,
    default_agent: Option<String>,
}

impl ConversationService {
    /// Creates a service without agents.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an entity under its entity ID.
    ///
    /// The first registered entity becomes the default agent.
    pub fn register(&mut self, entity: ConversationEntity) -> Arc<ConversationEntity> {
        let entity = Arc::new(entity);
        let agent_id = entity.entity_id().to_string();
        if self.default_agent.is_none() {
            self.default_agent = Some(agent_id.clone());
        }
        debug!(agent_id, "registered conversation agent");
        self.agents.insert(agent_id, Arc::clone(&entity));
        entity
    }

    /// Makes a registered entity the default agent.
    ///
    /// # Errors
    ///
    /// Returns [`ConversationError::UnknownAgent`] if no entity has that ID.
    pub fn set_default_agent(&mut self, agent_id: &str) -> Result<(), ConversationError> {
        if !self.agents.contains_key(agent_id) {
            return Err(ConversationError::UnknownAgent {
                agent_id: agent_id.to_string(),
            }
            .into());
        }
        self.default_agent = Some(agent_id.to_string());
        Ok(())
    }

    /// Returns the default agent ID.
    #[must_use]
    pub fn default_agent(&self) -> Option<&str> {
        self.default_agent.as_deref()
    }

    /// Looks up an agent by ID, falling back to the default agent.
    ///
    /// # Errors
    ///
    /// Returns [`ConversationError::UnknownAgent`] if no matching entity is
    /// registered.
    pub fn agent(&self, agent_id: Option<&str>) -> Result<Arc<ConversationEntity>, ConversationError> {
        let agent_id = agent_id.or(self.default_agent.as_deref()).unwrap_or_default();
        self.agents.get(agent_id).cloned().ok_or_else(|| {
            ConversationError::UnknownAgent {
                agent_id: agent_id.to_string(),
            }
            .into()
        })
    }

    /// Returns the IDs of agents that understand `language`.
    #[must_use]
    pub fn agents_for_language(&self, language: &str) -> Vec<&str> {
        self.agents
            .iter()
            .filter(|(_, entity)| entity.supported_languages().supports(language))
            .map(|(agent_id, _)| agent_id.as_str())
            .collect()
    }

    /// Processes an input on the selected agent.
    ///
    /// Handling failures are answered with an error intent response.
    ///
    /// # Errors
    ///
    /// Returns an error if the agent is unknown or its handler does not
    /// implement message handling.
    #[instrument(skip(self, input), fields(agent_id = ?input.agent_id))]
    pub async fn converse(
        &self,
        input: ConversationInput,
    ) -> Result<ConversationResult, ConversationError> {
        let entity = self.agent(input.agent_id.as_deref())?;
        let language = input.language.clone();
        let conversation_id = input.conversation_id.clone();

        match entity.process(input).await {
            Ok(result) => Ok(result),
            Err(err) if err.current_context().is_programming_error() => Err(err),
            Err(err) => {
                warn!(entity_id = entity.entity_id(), error = %err, "conversation failed");
                Ok(ConversationResult::error(
                    language,
                    err.current_context().to_string(),
                    conversation_id,
                ))
            }
        }
    }

    /// Lets agents warm up resources for a language.
    ///
    /// Prepares only `agent_id` when given, otherwise every agent.
    ///
    /// # Errors
    ///
    /// Returns [`ConversationError::UnknownAgent`] if `agent_id` is unknown.
    pub async fn prepare(
        &self,
        agent_id: Option<&str>,
        language: Option<&str>,
    ) -> Result<(), ConversationError> {
        match agent_id {
            Some(agent_id) => self.agent(Some(agent_id))?.prepare(language).await,
            None => {
                for entity in self.agents.values() {
                    entity.prepare(language).await;
                }
            }
        }
        Ok(())
    }

    /// Restores the persisted state of every agent.
    ///
    /// Failures are logged and leave that agent's state unset.
    pub async fn restore_states(&self) {
        for entity in self.agents.values() {
            if let Err(err) = entity.restore_state().await {
                warn!(entity_id = entity.entity_id(), error = %err, "failed to restore state");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat_log::{AssistantContent, ChatLog, InMemoryChatLogStore};
    use crate::entity::EntityBackends;
    use crate::handler::{HandlerContext, MessageHandler, SupportedLanguages};
    use crate::intent::{IntentResponseErrorCode, IntentResponseType};
    use crate::session::InMemorySessionManager;
    use crate::state::InMemoryStateStore;
    use async_trait::async_trait;
    use hearth_core::ConversationId;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Echo {
        languages: SupportedLanguages,
        prepared: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl MessageHandler for Echo {
        fn supported_languages(&self) -> SupportedLanguages {
            self.languages.clone()
        }

        async fn handle_message(
            &self,
            ctx: HandlerContext<'_>,
            input: &ConversationInput,
            chat_log: &mut ChatLog,
        ) -> Result<ConversationResult, ConversationError> {
            chat_log.add_assistant_content(AssistantContent::new(ctx.entity_id, input.text.clone()));
            ctx.result_from_chat_log(input, chat_log)
        }

        async fn prepare(&self, _language: Option<&str>) {
            self.prepared.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Silent;

    #[async_trait]
    impl MessageHandler for Silent {
        fn supported_languages(&self) -> SupportedLanguages {
            SupportedLanguages::All
        }

        async fn handle_message(
            &self,
            ctx: HandlerContext<'_>,
            input: &ConversationInput,
            chat_log: &mut ChatLog,
        ) -> Result<ConversationResult, ConversationError> {
            ctx.result_from_chat_log(input, chat_log)
        }
    }

    struct Unimplemented;

    impl MessageHandler for Unimplemented {
        fn supported_languages(&self) -> SupportedLanguages {
            SupportedLanguages::All
        }
    }

    fn backends() -> EntityBackends {
        EntityBackends {
            sessions: Arc::new(InMemorySessionManager::default()),
            chat_logs: Arc::new(InMemoryChatLogStore::new()),
            state_store: Arc::new(InMemoryStateStore::new()),
        }
    }

    fn echo(languages: SupportedLanguages) -> (Echo, Arc<AtomicUsize>) {
        let prepared = Arc::new(AtomicUsize::new(0));
        let handler = Echo {
            languages,
            prepared: Arc::clone(&prepared),
        };
        (handler, prepared)
    }

    fn entity(entity_id: &str, handler: impl MessageHandler + 'static) -> ConversationEntity {
        ConversationEntity::new(entity_id, Arc::new(handler), backends())
    }

    #[tokio::test]
    async fn routes_to_default_agent() {
        let mut service = ConversationService::new();
        service.register(entity("conversation.echo", echo(SupportedLanguages::All).0));
        service.register(entity("conversation.silent", Silent));

        let result = service
            .converse(ConversationInput::new("hello there", "en"))
            .await
            .unwrap();

        assert_eq!(service.default_agent(), Some("conversation.echo"));
        assert_eq!(result.response.plain_speech(), Some("hello there"));
    }

    #[tokio::test]
    async fn routes_by_agent_id() {
        let mut service = ConversationService::new();
        service.register(entity("conversation.silent", Silent));
        service.register(entity("conversation.echo", echo(SupportedLanguages::All).0));

        let result = service
            .converse(ConversationInput::new("hi", "en").with_agent_id("conversation.echo"))
            .await
            .unwrap();

        assert_eq!(result.response.plain_speech(), Some("hi"));
    }

    #[tokio::test]
    async fn unknown_agent_is_an_error() {
        let service = ConversationService::new();

        let err = service
            .converse(ConversationInput::new("hi", "en").with_agent_id("conversation.nope"))
            .await
            .unwrap_err();

        assert_eq!(
            err.current_context(),
            &ConversationError::UnknownAgent {
                agent_id: "conversation.nope".to_string()
            }
        );
    }

    #[tokio::test]
    async fn unimplemented_handler_propagates() {
        let mut service = ConversationService::new();
        service.register(entity("conversation.stub", Unimplemented));

        let err = service
            .converse(ConversationInput::new("hi", "en"))
            .await
            .unwrap_err();

        assert!(matches!(
            err.current_context(),
            ConversationError::HandlerNotImplemented { .. }
        ));
    }

    #[tokio::test]
    async fn handling_failure_becomes_error_response() {
        let mut service = ConversationService::new();
        service.register(entity("conversation.silent", Silent));
        let conversation_id: ConversationId = "living-room".parse().unwrap();

        let result = service
            .converse(
                ConversationInput::new("hi", "de").with_conversation_id(conversation_id.clone()),
            )
            .await
            .unwrap();

        assert_eq!(result.response.response_type, IntentResponseType::Error);
        assert_eq!(
            result.response.error_code,
            Some(IntentResponseErrorCode::Unknown)
        );
        assert_eq!(result.response.language, "de");
        assert_eq!(result.response.plain_speech(), Some("Unable to get response"));
        assert_eq!(result.conversation_id, Some(conversation_id));
        assert!(!result.continue_conversation);
    }

    #[test]
    fn explicit_default_agent() {
        let mut service = ConversationService::new();
        service.register(entity("conversation.a", Silent));
        service.register(entity("conversation.b", Silent));

        service.set_default_agent("conversation.b").unwrap();
        assert_eq!(service.default_agent(), Some("conversation.b"));
        assert!(service.set_default_agent("conversation.c").is_err());
        assert_eq!(service.default_agent(), Some("conversation.b"));
    }

    #[test]
    fn filters_agents_by_language() {
        let mut service = ConversationService::new();
        service.register(entity(
            "conversation.english",
            echo(SupportedLanguages::Only(vec!["en".to_string()])).0,
        ));
        service.register(entity("conversation.any", Silent));

        assert_eq!(
            service.agents_for_language("en-GB"),
            vec!["conversation.any", "conversation.english"]
        );
        assert_eq!(service.agents_for_language("fr"), vec!["conversation.any"]);
    }

    #[tokio::test]
    async fn prepare_all_or_one() {
        let mut service = ConversationService::new();
        let (first, first_prepared) = echo(SupportedLanguages::All);
        let (second, second_prepared) = echo(SupportedLanguages::All);
        service.register(entity("conversation.first", first));
        service.register(entity("conversation.second", second));

        service.prepare(None, Some("en")).await.unwrap();
        service
            .prepare(Some("conversation.second"), Some("en"))
            .await
            .unwrap();

        assert_eq!(first_prepared.load(Ordering::SeqCst), 1);
        assert_eq!(second_prepared.load(Ordering::SeqCst), 2);
        assert!(service.prepare(Some("conversation.none"), None).await.is_err());
    }

    #[tokio::test]
    async fn restore_states_tolerates_missing_values() {
        let mut service = ConversationService::new();
        let agent = service.register(entity("conversation.silent", Silent));

        service.restore_states().await;

        assert_eq!(agent.state(), None);
    }
}
