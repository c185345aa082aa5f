use thiserror::Error;

/// Errors that are worth surfacing to a caller. Transient oracle failures,
/// malformed store rows, and cycle rejections are absorbed where they occur
/// and never reach this type.
#[derive(Debug, Error)]
pub enum CraftError {
    #[error("target element not found in recipe graph: {0}")]
    UnknownTarget(String),

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CraftError>;
