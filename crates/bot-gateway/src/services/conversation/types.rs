use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

/// One transcript entry. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }
}

/// Storage key: session ids are unique per bot, not globally.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub bot_id: String,
    pub session_id: String,
}

impl SessionKey {
    pub fn new(bot_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            bot_id: bot_id.into(),
            session_id: session_id.into(),
        }
    }
}

/// Conversation transcript for one (bot, session) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSession {
    pub bot_id: String,
    pub session_id: String,
    /// Append-only, in arrival order
    pub messages: Vec<ChatMessage>,
    pub started_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

impl ConversationSession {
    pub fn key(&self) -> SessionKey {
        SessionKey::new(self.bot_id.clone(), self.session_id.clone())
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.session_id.clone(),
            message_count: self.messages.len(),
            started_at: self.started_at,
            last_updated_at: self.last_updated_at,
        }
    }

    /// Last `n` messages, oldest first.
    pub fn recent(&self, n: usize) -> &[ChatMessage] {
        let start = self.messages.len().saturating_sub(n);
        &self.messages[start..]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: String,
    pub message_count: usize,
    pub started_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recent_window() {
        let now = Utc::now();
        let session = ConversationSession {
            bot_id: "b".to_string(),
            session_id: "s".to_string(),
            messages: (0..5).map(|i| ChatMessage::user(i.to_string())).collect(),
            started_at: now,
            last_updated_at: now,
        };
        let recent: Vec<_> = session.recent(2).iter().map(|m| m.content.as_str()).collect();
        assert_eq!(recent, vec!["3", "4"]);
        assert_eq!(session.recent(50).len(), 5);
    }

    #[test]
    fn test_role_serialization() {
        let json = serde_json::to_string(&ChatMessage::assistant("hi")).unwrap();
        assert!(json.contains("\"role\":\"assistant\""));
    }
}
