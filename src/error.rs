/// Error types shared by the loader, the query engine and the tool facade.
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Errors that abort a whole corpus load.
///
/// Per-file problems never surface here; they become [`LoadWarning`]s.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("channel directory not found: {}", .0.display())]
    ChannelNotFound(PathBuf),

    #[error("failed to scan {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("load cancelled by a newer refresh")]
    Cancelled,
}

/// A single file that was skipped while building the corpus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadWarning {
    pub path: String,
    pub reason: String,
}

/// Wire names of the error kinds reported by the tool facade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    NotFound,
    InvalidArgument,
    InternalError,
}

/// Failures surfaced to callers of the query engine and the tools.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RetrievalError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    Internal(String),
}

impl RetrievalError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::Internal(_) => ErrorKind::InternalError,
        }
    }

    /// Structured payload returned in place of a protocol fault.
    ///
    /// Internal details are replaced by a generic message so nothing about
    /// the implementation leaks to the calling model.
    #[must_use]
    pub fn to_payload(&self) -> serde_json::Value {
        let message = match self {
            Self::Internal(_) => "internal retrieval error".to_string(),
            other => other.to_string(),
        };
        serde_json::json!({
            "error": {
                "kind": self.kind(),
                "message": message,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_shape() {
        let err = RetrievalError::NotFound("no section 'x' in a.md".into());
        let payload = err.to_payload();
        assert_eq!(payload["error"]["kind"], "NotFound");
        assert_eq!(payload["error"]["message"], "no section 'x' in a.md");
    }

    #[test]
    fn test_internal_message_is_generic() {
        let err = RetrievalError::Internal("join error: task panicked at src/x.rs".into());
        let payload = err.to_payload();
        assert_eq!(payload["error"]["kind"], "InternalError");
        assert_eq!(payload["error"]["message"], "internal retrieval error");
    }
}
