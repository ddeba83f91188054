use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use thiserror::Error;
use tracing::debug;

use super::types::{ConversationSession, SessionKey};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Session store unavailable: {0}")]
    Unavailable(String),
}

/// Stored document plus the revision used for conditional writes.
#[derive(Debug, Clone)]
pub struct Versioned<T> {
    pub revision: u64,
    pub value: T,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written { revision: u64 },
    /// Key state changed since it was read; re-read and retry
    Conflict,
}

/// Keyed document store for transcripts (port).
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(
        &self,
        key: &SessionKey,
    ) -> Result<Option<Versioned<ConversationSession>>, StoreError>;

    /// Insert only if no record exists for the session's key.
    async fn insert(&self, session: ConversationSession) -> Result<WriteOutcome, StoreError>;

    /// Replace only if the stored revision still equals `expected_revision`.
    async fn replace(
        &self,
        expected_revision: u64,
        session: ConversationSession,
    ) -> Result<WriteOutcome, StoreError>;

    async fn delete(&self, key: &SessionKey) -> Result<bool, StoreError>;

    async fn list_by_bot(&self, bot_id: &str) -> Result<Vec<ConversationSession>, StoreError>;
}

#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: DashMap<SessionKey, Versioned<ConversationSession>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(
        &self,
        key: &SessionKey,
    ) -> Result<Option<Versioned<ConversationSession>>, StoreError> {
        Ok(self.sessions.get(key).map(|entry| entry.value().clone()))
    }

    async fn insert(&self, session: ConversationSession) -> Result<WriteOutcome, StoreError> {
        match self.sessions.entry(session.key()) {
            Entry::Occupied(_) => Ok(WriteOutcome::Conflict),
            Entry::Vacant(vacant) => {
                vacant.insert(Versioned {
                    revision: 1,
                    value: session,
                });
                Ok(WriteOutcome::Written { revision: 1 })
            }
        }
    }

    async fn replace(
        &self,
        expected_revision: u64,
        session: ConversationSession,
    ) -> Result<WriteOutcome, StoreError> {
        let key = session.key();
        let Some(mut current) = self.sessions.get_mut(&key) else {
            debug!("Replace on missing session {}/{}", key.bot_id, key.session_id);
            return Ok(WriteOutcome::Conflict);
        };

        if current.revision != expected_revision {
            return Ok(WriteOutcome::Conflict);
        }

        current.revision += 1;
        current.value = session;
        Ok(WriteOutcome::Written {
            revision: current.revision,
        })
    }

    async fn delete(&self, key: &SessionKey) -> Result<bool, StoreError> {
        Ok(self.sessions.remove(key).is_some())
    }

    async fn list_by_bot(&self, bot_id: &str) -> Result<Vec<ConversationSession>, StoreError> {
        Ok(self
            .sessions
            .iter()
            .filter(|entry| entry.key().bot_id == bot_id)
            .map(|entry| entry.value().value.clone())
            .collect())
    }
}
