//! Session ledger: find-or-create plus ordered append for transcripts keyed
//! by caller-supplied session ids.
//!
//! Appends are conditional writes. Creation only succeeds while the key is
//! absent and an update only succeeds against the revision that was read, so
//! two concurrent turns on one session cannot overwrite each other; the
//! loser re-reads and appends on top of the winner.

use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::store::{SessionStore, StoreError, WriteOutcome};
use super::types::{ChatMessage, ConversationSession, SessionKey, SessionSummary};

pub const DEFAULT_MAX_ATTEMPTS: usize = 8;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Gave up appending to {bot_id}/{session_id} after {attempts} conflicting writes")]
    Contention {
        bot_id: String,
        session_id: String,
        attempts: usize,
    },

    #[error("Invalid session key: {0}")]
    InvalidKey(String),
}

pub struct SessionLedger {
    store: Arc<dyn SessionStore>,
    max_attempts: usize,
}

impl SessionLedger {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            store,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    fn key(bot_id: &str, session_id: &str) -> Result<SessionKey, LedgerError> {
        if bot_id.trim().is_empty() {
            return Err(LedgerError::InvalidKey("bot id is empty".to_string()));
        }
        if session_id.trim().is_empty() {
            return Err(LedgerError::InvalidKey("session id is empty".to_string()));
        }
        Ok(SessionKey::new(bot_id, session_id))
    }

    /// Extend the transcript of `(bot_id, session_id)` with `new_messages`,
    /// creating it on first contact. Existing messages keep their order and
    /// new ones follow in the order given.
    ///
    /// Not exactly-once: retrying a call that timed out after its write
    /// committed appends the messages again.
    pub async fn append_turn(
        &self,
        bot_id: &str,
        session_id: &str,
        new_messages: Vec<ChatMessage>,
    ) -> Result<ConversationSession, LedgerError> {
        let key = Self::key(bot_id, session_id)?;

        for attempt in 1..=self.max_attempts {
            let now = Utc::now();

            let outcome = match self.store.get(&key).await? {
                None => {
                    let session = ConversationSession {
                        bot_id: key.bot_id.clone(),
                        session_id: key.session_id.clone(),
                        messages: new_messages.clone(),
                        started_at: now,
                        last_updated_at: now,
                    };
                    match self.store.insert(session.clone()).await? {
                        WriteOutcome::Written { .. } => {
                            info!(
                                "Session {}/{} created with {} message(s)",
                                key.bot_id,
                                key.session_id,
                                session.messages.len()
                            );
                            return Ok(session);
                        }
                        conflict => conflict,
                    }
                }
                Some(current) => {
                    if new_messages.is_empty() {
                        return Ok(current.value);
                    }

                    let mut session = current.value;
                    session.messages.extend(new_messages.iter().cloned());
                    session.last_updated_at = now;

                    match self.store.replace(current.revision, session.clone()).await? {
                        WriteOutcome::Written { revision } => {
                            debug!(
                                "Session {}/{} now at revision {} ({} messages)",
                                key.bot_id,
                                key.session_id,
                                revision,
                                session.messages.len()
                            );
                            return Ok(session);
                        }
                        conflict => conflict,
                    }
                }
            };

            debug!(
                "Write conflict on {}/{} (attempt {}): {:?}",
                key.bot_id, key.session_id, attempt, outcome
            );
            tokio::task::yield_now().await;
        }

        warn!(
            "Session {}/{} still contended after {} attempts",
            key.bot_id, key.session_id, self.max_attempts
        );
        Err(LedgerError::Contention {
            bot_id: key.bot_id,
            session_id: key.session_id,
            attempts: self.max_attempts,
        })
    }

    pub async fn get_session(
        &self,
        bot_id: &str,
        session_id: &str,
    ) -> Result<Option<ConversationSession>, LedgerError> {
        let key = Self::key(bot_id, session_id)?;
        Ok(self.store.get(&key).await?.map(|v| v.value))
    }

    /// Hard delete. `false` when nothing matched.
    pub async fn delete_session(&self, bot_id: &str, session_id: &str) -> Result<bool, LedgerError> {
        let key = Self::key(bot_id, session_id)?;
        let deleted = self.store.delete(&key).await?;
        if deleted {
            info!("Session {}/{} deleted", key.bot_id, key.session_id);
        }
        Ok(deleted)
    }

    /// Sessions of one bot, most recently updated first.
    pub async fn list_sessions(&self, bot_id: &str) -> Result<Vec<SessionSummary>, LedgerError> {
        let mut summaries: Vec<SessionSummary> = self
            .store
            .list_by_bot(bot_id)
            .await?
            .iter()
            .map(ConversationSession::summary)
            .collect();
        summaries.sort_by(|a, b| b.last_updated_at.cmp(&a.last_updated_at));
        Ok(summaries)
    }
}
