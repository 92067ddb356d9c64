pub mod error;
pub mod http;
pub mod sqlite;
pub mod store;

pub use error::{Result, StoreError};
pub use http::HttpStore;
pub use sqlite::SqliteStore;
pub use store::{effective_sources, OutcomeStore, ALLOWED_NOTIFICATION_SOURCES};
