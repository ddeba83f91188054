pub mod auth;
pub mod bot;
pub mod chat;
pub mod session;
pub mod upload;

pub use auth::TokenRequest;
pub use bot::CreateBotRequest;
pub use chat::{ChatRequest, ChatResponse};
pub use session::DeleteSessionResponse;
pub use upload::UploadReceipt;
