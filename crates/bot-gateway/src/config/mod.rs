pub mod settings;

pub use settings::{
    AccountSeed, ChatConfig, LlmConfig, LoggingConfig, PolicyOverride, RateLimitConfig,
    SecurityConfig, ServerConfig, Settings,
};
