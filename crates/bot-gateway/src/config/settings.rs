use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub security: SecurityConfig,
    #[serde(default)]
    pub rate_limits: RateLimitConfig,
    pub llm: LlmConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout_seconds: u64,
    pub body_limit_bytes: usize,
    /// Take the client IP from `X-Forwarded-For` (only behind a trusted proxy)
    #[serde(default)]
    pub trust_proxy: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SecurityConfig {
    /// Deployment environment name ("production", "staging", "development", ...)
    pub environment: String,
    /// HS256 signing secret. Startup fails when this is missing.
    #[serde(default)]
    pub jwt_secret: Option<String>,
    pub token_ttl_seconds: u64,
    #[serde(default)]
    pub accounts: Vec<AccountSeed>,
}

/// Principal seeded into the in-process directory at startup.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AccountSeed {
    pub id: String,
    pub email: String,
    pub display_name: String,
    /// Argon2 PHC string
    pub password_hash: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RateLimitConfig {
    /// Per-policy overrides keyed by policy name (e.g. "chat-turn")
    #[serde(default)]
    pub overrides: HashMap<String, PolicyOverride>,
    pub sweep_interval_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            overrides: HashMap::new(),
            sweep_interval_seconds: 60,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy)]
pub struct PolicyOverride {
    pub window_ms: Option<u64>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub timeout_seconds: u64,
    pub max_tokens: usize,
    pub temperature: f32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ChatConfig {
    pub max_message_chars: usize,
    /// Number of prior transcript messages forwarded to the responder
    pub history_messages: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_message_chars: 4_000,
            history_messages: 10,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct LoggingConfig {
    /// Write daily-rolled JSON logs here in addition to stdout
    pub directory: Option<String>,
    pub file_prefix: Option<String>,
}

impl SecurityConfig {
    /// Production-like deployments enforce every admission policy.
    pub fn is_production_like(&self) -> bool {
        matches!(
            self.environment.trim().to_ascii_lowercase().as_str(),
            "production" | "prod" | "staging"
        )
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("server.request_timeout_seconds", 60)?
            .set_default("server.body_limit_bytes", 10 * 1024 * 1024)?
            .set_default("security.environment", "development")?
            .set_default("security.token_ttl_seconds", 3600)?
            .set_default("llm.base_url", "http://127.0.0.1:8081")?
            .set_default("llm.model", "default")?
            .set_default("llm.timeout_seconds", 60)?
            .set_default("llm.max_tokens", 512)?
            .set_default("llm.temperature", 0.7)?
            .add_source(File::with_name("config/settings").required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn security(environment: &str) -> SecurityConfig {
        SecurityConfig {
            environment: environment.to_string(),
            jwt_secret: None,
            token_ttl_seconds: 60,
            accounts: Vec::new(),
        }
    }

    #[test]
    fn test_production_like_environments() {
        assert!(security("production").is_production_like());
        assert!(security(" Staging ").is_production_like());
        assert!(!security("development").is_production_like());
        assert!(!security("test").is_production_like());
    }
}
