use thiserror::Error;

#[derive(Error, Debug)]
pub enum SharedError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Invalid color descriptor: {0}")]
    InvalidColor(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Form field a validation failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Email,
    Password,
    ConfirmPassword,
    FullName,
    BirthDate,
    Title,
    Date,
    Text,
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Field::Email => "email",
            Field::Password => "password",
            Field::ConfirmPassword => "confirmPassword",
            Field::FullName => "fullName",
            Field::BirthDate => "birthDate",
            Field::Title => "title",
            Field::Date => "date",
            Field::Text => "text",
        };
        f.write_str(name)
    }
}

/// A locally detected input problem. Never sent to the backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: Field,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: Field, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}
