use crate::util::UrlValidationError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by [`Server`](super::Server).
///
/// Construction and start-up errors are fatal and never retried. `Serialize`
/// and `Io` describe a single failed publish attempt and reach callers only
/// through [`UpdateEvent::WriteFailed`](super::UpdateEvent::WriteFailed).
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("missing system id")]
    MissingSystemId,
    #[error("missing root directory")]
    MissingRootDir,
    #[error("missing base url")]
    MissingBaseUrl,
    #[error("invalid base url: {0}")]
    InvalidBaseUrl(#[source] UrlValidationError),
    #[error("invalid default ttl")]
    InvalidDefaultTtl,
    #[error("missing feed handlers")]
    MissingFeedHandlers,
    #[error("failed to serialize {feed}: {source}")]
    Serialize {
        feed: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ServerError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ServerError::Io {
            path: path.into(),
            source,
        }
    }
}
