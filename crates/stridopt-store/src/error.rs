use thiserror::Error;

/// Error codes reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthErrorCode {
    UserNotFound,
    WrongPassword,
    EmailAlreadyInUse,
    InvalidEmail,
    WeakPassword,
    TooManyRequests,
    /// Sensitive account changes need a fresh sign-in.
    RequiresRecentLogin,
    NotSignedIn,
    Other(String),
}

impl std::fmt::Display for AuthErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthErrorCode::UserNotFound => f.write_str("auth/user-not-found"),
            AuthErrorCode::WrongPassword => f.write_str("auth/wrong-password"),
            AuthErrorCode::EmailAlreadyInUse => f.write_str("auth/email-already-in-use"),
            AuthErrorCode::InvalidEmail => f.write_str("auth/invalid-email"),
            AuthErrorCode::WeakPassword => f.write_str("auth/weak-password"),
            AuthErrorCode::TooManyRequests => f.write_str("auth/too-many-requests"),
            AuthErrorCode::RequiresRecentLogin => f.write_str("auth/requires-recent-login"),
            AuthErrorCode::NotSignedIn => f.write_str("auth/no-current-user"),
            AuthErrorCode::Other(code) => write!(f, "auth/{code}"),
        }
    }
}

/// Errors produced at the backend boundary.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Network loss or backend unavailable. The only retryable class.
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// A document addressed by id does not exist.
    #[error("Document not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Auth error: {0}")]
    Auth(AuthErrorCode),

    /// A document did not match the expected model shape.
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid blob path: {0}")]
    InvalidPath(String),

    #[error("Blob storage error: {0}")]
    Blob(String),

    /// SQLite error from the local key-value cache.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Failed to determine a platform data directory.
    #[error("Could not determine application data directory")]
    NoDataDir,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Migration error: {0}")]
    Migration(String),
}

impl StoreError {
    pub fn not_found(collection: &str, id: &str) -> Self {
        StoreError::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }

    pub fn auth_code(&self) -> Option<&AuthErrorCode> {
        match self {
            StoreError::Auth(code) => Some(code),
            _ => None,
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
