use std::error::Error as StdError;

use thiserror::Error;

/// vidscope's crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// vidscope's crate-wide error type.
///
/// Intentionally decoupled from `anyhow` so downstream consumers aren't forced
/// to adopt `anyhow` in their own public APIs. Components build up context with
/// `anyhow` internally and convert at the boundary via `From<anyhow::Error>`.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Message(String),

    /// A stage failed in a way that should fail the whole job.
    #[error("job failed: {0}")]
    JobFailed(String),

    /// The job was cancelled cooperatively between stages.
    #[error("cancelled")]
    Cancelled,

    /// A required external dependency (ffmpeg binary, credentials, ...) is missing.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Other(#[from] Box<dyn StdError + Send + Sync>),
}

impl Error {
    pub(crate) fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Message(format!("{err:#}"))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Other(Box::new(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Other(Box::new(err))
    }
}

impl From<std::str::Utf8Error> for Error {
    fn from(err: std::str::Utf8Error) -> Self {
        Self::Other(Box::new(err))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::Other(Box::new(err))
    }
}
