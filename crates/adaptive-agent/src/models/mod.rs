pub mod api;
pub mod chat;

pub use chat::ChatMessage;
