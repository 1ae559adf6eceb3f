//! Interactive console for hearth conversation agents.
//!
//! Reads one utterance per line from stdin and prints the agent's speech.
//! The conversation ID returned by each turn is sent with the next one.

mod config;
mod handler;

use crate::config::ConsoleConfig;
use crate::handler::ConsoleHandler;
use chrono::Utc;
use hearth_conversation::{
    ChatLogStore, ConversationEntity, ConversationEntityFeature, ConversationInput,
    ConversationService, EntityBackends, InMemoryChatLogStore, InMemorySessionManager,
    InMemoryStateStore, SessionManager,
};
use hearth_core::ConversationId;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = ConsoleConfig::from_env().expect("failed to load configuration");
    tracing::info!(entity_id = %config.entity_id, language = %config.language, "Loaded configuration");

    let sessions = Arc::new(InMemorySessionManager::from_config(&config.session));
    let chat_logs = Arc::new(InMemoryChatLogStore::new());
    let entity = ConversationEntity::new(
        config.entity_id.clone(),
        Arc::new(ConsoleHandler),
        EntityBackends {
            sessions: sessions.clone(),
            chat_logs: chat_logs.clone(),
            state_store: Arc::new(InMemoryStateStore::new()),
        },
    )
    .with_supported_features(ConversationEntityFeature::CONTROL);

    let mut service = ConversationService::new();
    service.register(entity);
    service.restore_states().await;
    if let Err(e) = service.prepare(None, Some(&config.language)).await {
        tracing::warn!(error = %e, "Failed to prepare agents");
    }

    spawn_session_cleanup(
        sessions,
        chat_logs,
        Duration::from_secs(config.session.cleanup_interval_seconds),
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut conversation_id: Option<ConversationId> = None;

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
        };

        let text = match line {
            Ok(Some(text)) => text,
            Ok(None) => break,
            Err(e) => {
                tracing::error!(error = %e, "Failed to read from stdin");
                break;
            }
        };

        let mut input = ConversationInput::new(text, config.language.clone());
        if let Some(id) = &conversation_id {
            input = input.with_conversation_id(id.clone());
        }

        match service.converse(input).await {
            Ok(result) => {
                println!("{}", result.response.plain_speech().unwrap_or_default());
                if result.conversation_id.is_some() {
                    conversation_id = result.conversation_id;
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Conversation agent failed");
            }
        }
    }
}

/// Periodically drops idle sessions and their chat logs.
fn spawn_session_cleanup(
    sessions: Arc<InMemorySessionManager>,
    chat_logs: Arc<InMemoryChatLogStore>,
    interval: Duration,
) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(interval);
        loop {
            interval.tick().await;
            let expired = match sessions.cleanup_expired(Utc::now()).await {
                Ok(expired) => expired,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to cleanup expired sessions");
                    continue;
                }
            };
            for conversation_id in &expired {
                if let Err(e) = chat_logs.forget(conversation_id).await {
                    tracing::warn!(%conversation_id, error = %e, "Failed to forget chat log");
                }
            }
            if !expired.is_empty() {
                tracing::debug!(expired_sessions = expired.len(), "Periodic session cleanup");
            }
        }
    });
}
