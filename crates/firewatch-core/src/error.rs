use thiserror::Error;

/// Typed failures surfaced by the sync engine.
///
/// Validation errors are rejected before any store or remote call is made.
/// Remote write failures always come with a local rollback already applied.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("incident {0} not found")]
    NotFound(String),

    #[error("remote write failed: {0}")]
    RemoteWrite(String),

    #[error("change feed disrupted: {0}")]
    FeedDisruption(String),
}
