pub mod chat;
pub mod config;
pub mod error;
pub mod types;

pub use chat::{ChatHistory, Message, NativeMessage, Role};
pub use error::{CoreError, Result};
