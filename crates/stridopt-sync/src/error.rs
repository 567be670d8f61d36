use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// The retry bound was reached; the subscription waits for a manual retry.
    #[error("Subscription to '{collection}' failed after {attempts} attempts: {last_error}")]
    Exhausted {
        collection: String,
        attempts: u32,
        last_error: String,
    },

    /// The backend refused the subscription with a non-transient error.
    #[error("Subscription to '{collection}' rejected: {reason}")]
    Rejected { collection: String, reason: String },

    #[error("Subscription closed")]
    Closed,
}

impl SyncError {
    pub fn is_closed(&self) -> bool {
        matches!(self, SyncError::Closed)
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
