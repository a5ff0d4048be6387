use thiserror::Error;

#[derive(Error, Debug)]
pub enum ViewerError {
    #[error("Session endpoint error: {code} - {message}")]
    Endpoint { code: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Session expired: {0}")]
    SessionExpired(String),

    #[error("Session limit reached: {limit} concurrent sessions")]
    SessionLimitReached { limit: usize },

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

pub type Result<T> = std::result::Result<T, ViewerError>;
