pub mod auth;
pub mod bots;
pub mod chat;
pub mod health;
pub mod sessions;
pub mod upload;
