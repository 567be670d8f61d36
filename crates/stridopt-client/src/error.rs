use thiserror::Error;

use stridopt_shared::error::Field;
use stridopt_shared::validation::PASSWORD_REQUIREMENTS;
use stridopt_shared::{SharedError, ValidationError};
use stridopt_store::{AuthErrorCode, StoreError};
use stridopt_sync::SyncError;

pub const GENERIC_RETRY_MESSAGE: &str = "An unexpected error occurred. Please try again.";

#[derive(Debug, Error)]
pub enum ClientError {
    /// Local input checks failed; nothing was sent.
    #[error("Invalid input: {}", summarize(.0))]
    Validation(Vec<ValidationError>),

    #[error("Not signed in")]
    NotSignedIn,

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Not allowed: {0}")]
    Forbidden(&'static str),

    #[error("Invalid operation: {0}")]
    Invalid(&'static str),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Shared(#[from] SharedError),
}

fn summarize(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<ValidationError> for ClientError {
    fn from(e: ValidationError) -> Self {
        ClientError::Validation(vec![e])
    }
}

impl From<Vec<ValidationError>> for ClientError {
    fn from(errors: Vec<ValidationError>) -> Self {
        ClientError::Validation(errors)
    }
}

impl ClientError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        ClientError::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn auth_code(&self) -> Option<&AuthErrorCode> {
        match self {
            ClientError::Store(e) => e.auth_code(),
            _ => None,
        }
    }

    /// The backend rejected a sensitive change until the user signs in again.
    pub fn requires_reauth(&self) -> bool {
        matches!(self.auth_code(), Some(AuthErrorCode::RequiresRecentLogin))
    }

    /// Form field the error should be shown under. `None` means a modal.
    pub fn field(&self) -> Option<Field> {
        match self {
            ClientError::Validation(errors) => errors.first().map(|e| e.field),
            _ => match self.auth_code()? {
                AuthErrorCode::UserNotFound
                | AuthErrorCode::EmailAlreadyInUse
                | AuthErrorCode::InvalidEmail => Some(Field::Email),
                AuthErrorCode::WrongPassword | AuthErrorCode::WeakPassword => Some(Field::Password),
                _ => None,
            },
        }
    }

    /// Per-field messages for form rendering.
    pub fn field_errors(&self) -> Vec<(Field, String)> {
        match self {
            ClientError::Validation(errors) => errors
                .iter()
                .map(|e| (e.field, e.message.clone()))
                .collect(),
            _ => self
                .field()
                .map(|f| vec![(f, self.user_message())])
                .unwrap_or_default(),
        }
    }

    /// Text safe to show to the user.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Validation(errors) => errors
                .first()
                .map(|e| e.message.clone())
                .unwrap_or_else(|| GENERIC_RETRY_MESSAGE.to_string()),
            ClientError::NotSignedIn => "You must be logged in to do that".to_string(),
            ClientError::Store(StoreError::Auth(code)) => auth_message(code),
            ClientError::Store(StoreError::Unavailable(_)) | ClientError::Sync(_) => {
                "Connection problem. Please try again.".to_string()
            }
            _ => GENERIC_RETRY_MESSAGE.to_string(),
        }
    }
}

fn auth_message(code: &AuthErrorCode) -> String {
    match code {
        AuthErrorCode::UserNotFound => "No account found with this email",
        AuthErrorCode::WrongPassword => "Incorrect password",
        AuthErrorCode::EmailAlreadyInUse => "This email is already in use",
        AuthErrorCode::InvalidEmail => "Please enter a valid email address",
        AuthErrorCode::WeakPassword => PASSWORD_REQUIREMENTS,
        AuthErrorCode::TooManyRequests => "Too many failed attempts. Please try again later.",
        AuthErrorCode::RequiresRecentLogin => "Please sign in again to continue",
        AuthErrorCode::NotSignedIn => "You must be logged in to do that",
        AuthErrorCode::Other(_) => GENERIC_RETRY_MESSAGE,
    }
    .to_string()
}

pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_codes_map_to_fields() {
        let err = ClientError::from(StoreError::Auth(AuthErrorCode::UserNotFound));
        assert_eq!(err.field(), Some(Field::Email));
        assert_eq!(err.user_message(), "No account found with this email");

        let err = ClientError::from(StoreError::Auth(AuthErrorCode::WrongPassword));
        assert_eq!(err.field(), Some(Field::Password));

        let err = ClientError::from(StoreError::Auth(AuthErrorCode::TooManyRequests));
        assert_eq!(err.field(), None);
        assert!(err.user_message().starts_with("Too many failed attempts"));
    }

    #[test]
    fn recent_login_forces_reauth() {
        let err = ClientError::from(StoreError::Auth(AuthErrorCode::RequiresRecentLogin));
        assert!(err.requires_reauth());
        assert!(!ClientError::NotSignedIn.requires_reauth());
    }

    #[test]
    fn unknown_errors_are_generic() {
        let err = ClientError::from(StoreError::Blob("disk full".into()));
        assert_eq!(err.user_message(), GENERIC_RETRY_MESSAGE);
    }

    #[test]
    fn validation_lists_every_field() {
        let err = ClientError::from(vec![
            ValidationError::new(Field::Email, "Email is required"),
            ValidationError::new(Field::Password, "Password is required"),
        ]);
        assert_eq!(err.field(), Some(Field::Email));
        assert_eq!(err.field_errors().len(), 2);
    }
}
