//! Conversation transcripts
//!
//! - `types`: sessions, messages, keys
//! - `store`: keyed document store port with conditional writes (DashMap impl)
//! - `ledger`: find-or-create + ordered append on top of the store

pub mod ledger;
pub mod store;
pub mod types;

pub use ledger::{LedgerError, SessionLedger};
pub use store::{InMemorySessionStore, SessionStore, StoreError, Versioned, WriteOutcome};
pub use types::{ChatMessage, ConversationSession, Role, SessionKey, SessionSummary};
