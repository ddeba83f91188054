use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum BotError {
    #[error("Bot store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Bot {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub system_prompt: String,
    pub created_at: DateTime<Utc>,
}

impl Bot {
    pub fn is_owned_by(&self, principal_id: &str) -> bool {
        self.owner_id == principal_id
    }
}

#[async_trait]
pub trait BotRegistry: Send + Sync {
    async fn create(
        &self,
        owner_id: &str,
        name: &str,
        system_prompt: &str,
    ) -> Result<Bot, BotError>;

    async fn get(&self, bot_id: &str) -> Result<Option<Bot>, BotError>;

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Bot>, BotError>;
}

#[derive(Default)]
pub struct InMemoryBotRegistry {
    bots: DashMap<String, Bot>,
}

impl InMemoryBotRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BotRegistry for InMemoryBotRegistry {
    async fn create(
        &self,
        owner_id: &str,
        name: &str,
        system_prompt: &str,
    ) -> Result<Bot, BotError> {
        let bot = Bot {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            name: name.to_string(),
            system_prompt: system_prompt.to_string(),
            created_at: Utc::now(),
        };
        self.bots.insert(bot.id.clone(), bot.clone());
        info!("Bot {} created for {}", bot.id, owner_id);
        Ok(bot)
    }

    async fn get(&self, bot_id: &str) -> Result<Option<Bot>, BotError> {
        Ok(self.bots.get(bot_id).map(|b| b.value().clone()))
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Bot>, BotError> {
        let mut bots: Vec<Bot> = self
            .bots
            .iter()
            .filter(|b| b.owner_id == owner_id)
            .map(|b| b.value().clone())
            .collect();
        bots.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(bots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_get_list() {
        let registry = InMemoryBotRegistry::new();
        let bot = registry.create("u-1", "Helper", "Be helpful").await.unwrap();
        registry.create("u-2", "Other", "").await.unwrap();

        assert_eq!(registry.get(&bot.id).await.unwrap(), Some(bot.clone()));
        assert!(registry.get("missing").await.unwrap().is_none());

        let mine = registry.list_by_owner("u-1").await.unwrap();
        assert_eq!(mine, vec![bot.clone()]);
        assert!(bot.is_owned_by("u-1"));
        assert!(!bot.is_owned_by("u-2"));
    }
}
