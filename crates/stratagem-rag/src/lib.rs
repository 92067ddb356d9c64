pub mod embedder;
pub mod error;
pub mod http;
pub mod index;

pub use embedder::{Embedder, HashEmbedder, OpenAiEmbedder};
pub use error::{RagError, Result};
pub use http::HttpIndex;
pub use index::{StrategyIndex, StrategyRag, VectorInsert, VectorMatch};
