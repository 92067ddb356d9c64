use thiserror::Error;

#[derive(Debug, Error)]
pub enum SensorError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("missing credentials: {0}")]
    MissingCredentials(&'static str),
}

pub type Result<T> = std::result::Result<T, SensorError>;
