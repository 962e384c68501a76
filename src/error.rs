//! Error types for feed aggregation
//!
//! Errors are classified by blast radius:
//! - Branch-local: one collector or joiner failed or timed out. The branch
//!   resolves to an empty result and the feed still ships.
//! - Feed-level: orchestration failed before or around the branches. The
//!   caller gets an empty envelope carrying the message.

use thiserror::Error;

use crate::db::DbError;

/// Failure of a single collector or joiner branch.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Store error: {0}")]
    Db(#[from] DbError),

    #[error("Timed out after {0} seconds")]
    Timeout(u64),

    #[error("Worker task failed: {0}")]
    Worker(String),

    #[error("Source unavailable: {0}")]
    Unavailable(String),
}

impl SourceError {
    pub fn kind(&self) -> FailureKind {
        match self {
            SourceError::Timeout(_) => FailureKind::Timeout,
            SourceError::Db(_) | SourceError::Worker(_) | SourceError::Unavailable(_) => {
                FailureKind::Unavailable
            }
        }
    }
}

impl From<tokio::task::JoinError> for SourceError {
    fn from(err: tokio::task::JoinError) -> Self {
        SourceError::Worker(err.to_string())
    }
}

/// Failure of a whole aggregate request.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Feed aggregation timed out after {0} seconds")]
    Timeout(u64),

    #[error("Operations store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("No sources registered for this feed")]
    NoSources,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    Timeout,
    Unavailable,
}

/// Serializable per-branch error flag carried in the feed envelope.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceFailure {
    /// Source type (`stale_relationship`) or context type (`relationship_health`).
    pub source: String,
    pub kind: FailureKind,
    pub message: String,
}

impl SourceFailure {
    pub fn new(source: impl Into<String>, err: &SourceError) -> Self {
        SourceFailure {
            source: source.into(),
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_is_classified_separately() {
        assert_eq!(SourceError::Timeout(3).kind(), FailureKind::Timeout);
        assert_eq!(
            SourceError::Unavailable("down".into()).kind(),
            FailureKind::Unavailable
        );
        assert_eq!(
            SourceError::Db(DbError::HomeDirNotFound).kind(),
            FailureKind::Unavailable
        );
    }

    #[test]
    fn failure_serializes_for_the_wire() {
        let failure = SourceFailure::new("stale_relationship", &SourceError::Timeout(3));
        let json = serde_json::to_value(&failure).expect("serialize");
        assert_eq!(json["source"], "stale_relationship");
        assert_eq!(json["kind"], "timeout");
        assert_eq!(json["message"], "Timed out after 3 seconds");
    }
}
