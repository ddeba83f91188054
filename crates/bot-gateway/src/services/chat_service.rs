use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use super::bots::{BotError, BotRegistry};
use super::conversation::{ChatMessage, ConversationSession, LedgerError, Role, SessionLedger};
use super::llm_service::{ChatResponder, LlmError};
use crate::config::ChatConfig;

const MAX_SESSION_ID_LEN: usize = 128;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Message is empty")]
    EmptyMessage,

    #[error("Message exceeds {max} characters")]
    MessageTooLong { max: usize },

    #[error("Invalid session id")]
    InvalidSessionId,

    #[error("Bot not found: {0}")]
    BotNotFound(String),

    #[error(transparent)]
    Bots(#[from] BotError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

#[derive(Debug, Clone)]
pub struct ChatTurnOutcome {
    pub session_id: String,
    pub reply: String,
    pub session: ConversationSession,
}

/// Any never-seen id starts a new session, but widgets must stick to
/// `[A-Za-z0-9_-]` and at most 128 characters. UUIDs always qualify.
pub fn is_valid_session_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_SESSION_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// One chat turn: prompt the responder, then record user + reply together.
pub struct ChatService {
    bots: Arc<dyn BotRegistry>,
    ledger: Arc<SessionLedger>,
    responder: Arc<dyn ChatResponder>,
    config: ChatConfig,
}

impl ChatService {
    pub fn new(
        bots: Arc<dyn BotRegistry>,
        ledger: Arc<SessionLedger>,
        responder: Arc<dyn ChatResponder>,
        config: ChatConfig,
    ) -> Self {
        Self {
            bots,
            ledger,
            responder,
            config,
        }
    }

    pub async fn handle_turn(
        &self,
        bot_id: &str,
        session_id: Option<String>,
        message: &str,
    ) -> Result<ChatTurnOutcome, ChatError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if message.chars().count() > self.config.max_message_chars {
            return Err(ChatError::MessageTooLong {
                max: self.config.max_message_chars,
            });
        }

        let session_id = match session_id.map(|s| s.trim().to_string()) {
            Some(id) if is_valid_session_id(&id) => id,
            Some(_) => return Err(ChatError::InvalidSessionId),
            None => {
                let minted = Uuid::new_v4().to_string();
                debug!("No session id supplied, minted {}", minted);
                minted
            }
        };

        let bot = self
            .bots
            .get(bot_id)
            .await?
            .ok_or_else(|| ChatError::BotNotFound(bot_id.to_string()))?;

        let history = self.ledger.get_session(&bot.id, &session_id).await?;

        let mut prompt = Vec::with_capacity(self.config.history_messages + 2);
        if !bot.system_prompt.trim().is_empty() {
            prompt.push(ChatMessage::system(bot.system_prompt.clone()));
        }
        if let Some(history) = &history {
            prompt.extend(
                history
                    .recent(self.config.history_messages)
                    .iter()
                    .filter(|m| m.role != Role::System)
                    .cloned(),
            );
        }
        let user_message = ChatMessage::user(message);
        prompt.push(user_message.clone());

        let reply = self.responder.respond(&prompt).await?;

        let session = self
            .ledger
            .append_turn(
                &bot.id,
                &session_id,
                vec![user_message, ChatMessage::assistant(reply.clone())],
            )
            .await?;

        info!(
            "Chat turn recorded for bot={} session={} (messages={})",
            bot.id,
            session_id,
            session.messages.len()
        );

        Ok(ChatTurnOutcome {
            session_id,
            reply,
            session,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::bots::InMemoryBotRegistry;
    use crate::services::conversation::InMemorySessionStore;
    use crate::services::llm_service::MockChatResponder;

    struct Fixture {
        service: ChatService,
        ledger: Arc<SessionLedger>,
        bot_id: String,
    }

    async fn fixture(responder: MockChatResponder) -> Fixture {
        let bots = Arc::new(InMemoryBotRegistry::new());
        let bot = bots.create("owner", "Helper", "You are terse.").await.unwrap();
        let ledger = Arc::new(SessionLedger::new(Arc::new(InMemorySessionStore::new())));
        let service = ChatService::new(
            bots,
            ledger.clone(),
            Arc::new(responder),
            ChatConfig {
                max_message_chars: 20,
                history_messages: 2,
            },
        );
        Fixture {
            service,
            ledger,
            bot_id: bot.id,
        }
    }

    fn echo() -> MockChatResponder {
        let mut responder = MockChatResponder::new();
        responder.expect_respond().returning(|prompt| {
            Ok(format!("echo:{}", prompt.last().unwrap().content))
        });
        responder
    }

    #[tokio::test]
    async fn test_turn_records_user_and_reply() {
        let f = fixture(echo()).await;
        let outcome = f
            .service
            .handle_turn(&f.bot_id, Some("abc-123".to_string()), "  hi  ")
            .await
            .unwrap();

        assert_eq!(outcome.session_id, "abc-123");
        assert_eq!(outcome.reply, "echo:hi");
        let roles: Vec<Role> = outcome.session.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant]);

        let stored = f.ledger.get_session(&f.bot_id, "abc-123").await.unwrap().unwrap();
        assert_eq!(stored.messages.len(), 2);
    }

    #[tokio::test]
    async fn test_mints_session_id_when_missing() {
        let f = fixture(echo()).await;
        let outcome = f.service.handle_turn(&f.bot_id, None, "hi").await.unwrap();
        assert!(Uuid::parse_str(&outcome.session_id).is_ok());
    }

    #[tokio::test]
    async fn test_prompt_carries_system_and_recent_history() {
        let mut responder = MockChatResponder::new();
        let mut calls = 0;
        responder.expect_respond().times(3).returning(move |prompt| {
            calls += 1;
            if calls == 3 {
                let contents: Vec<&str> = prompt.iter().map(|m| m.content.as_str()).collect();
                assert_eq!(contents, vec!["You are terse.", "two", "r2", "three"]);
                assert_eq!(prompt[0].role, Role::System);
            }
            Ok(format!("r{}", calls))
        });
        let f = fixture(responder).await;

        for text in ["one", "two", "three"] {
            f.service
                .handle_turn(&f.bot_id, Some("s".to_string()), text)
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_validation_errors() {
        let f = fixture(MockChatResponder::new()).await;

        assert!(matches!(
            f.service.handle_turn(&f.bot_id, None, "   ").await,
            Err(ChatError::EmptyMessage)
        ));
        assert!(matches!(
            f.service
                .handle_turn(&f.bot_id, None, "this message is far too long")
                .await,
            Err(ChatError::MessageTooLong { max: 20 })
        ));
        assert!(matches!(
            f.service
                .handle_turn(&f.bot_id, Some("../etc".to_string()), "hi")
                .await,
            Err(ChatError::InvalidSessionId)
        ));
        assert!(matches!(
            f.service.handle_turn("nope", None, "hi").await,
            Err(ChatError::BotNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_reply_records_nothing() {
        let mut responder = MockChatResponder::new();
        responder
            .expect_respond()
            .returning(|_| Err(LlmError::EmptyResponse));
        let f = fixture(responder).await;

        assert!(matches!(
            f.service
                .handle_turn(&f.bot_id, Some("s".to_string()), "hi")
                .await,
            Err(ChatError::Llm(_))
        ));
        assert!(f.ledger.get_session(&f.bot_id, "s").await.unwrap().is_none());
    }

    #[test]
    fn test_session_id_charset() {
        assert!(is_valid_session_id("0f8e2c1a-1b2c-4d5e-8f90-123456789abc"));
        assert!(is_valid_session_id("widget_42"));
        assert!(!is_valid_session_id(""));
        assert!(!is_valid_session_id("a b"));
        assert!(!is_valid_session_id(&"x".repeat(129)));
    }
}
