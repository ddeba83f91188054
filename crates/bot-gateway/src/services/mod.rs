pub mod bots;
pub mod chat_service;
pub mod conversation;
pub mod llm_service;

pub use bots::{Bot, BotError, BotRegistry, InMemoryBotRegistry};
pub use chat_service::{ChatError, ChatService, ChatTurnOutcome};
pub use conversation::SessionLedger;
pub use llm_service::{ChatResponder, LlmError, LlmService};
