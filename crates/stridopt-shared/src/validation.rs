//! Local input sanitizing and validation.
//!
//! Everything here runs before any backend call. A failing field produces a
//! [`ValidationError`] that the form shows inline; the request is never sent.

use std::sync::OnceLock;

use chrono::{Months, NaiveDate};
use regex::Regex;

use crate::constants::{MAX_EMAIL_LENGTH, MAX_PASSWORD_LENGTH, MIN_AGE_YEARS, MIN_NAME_LENGTH};
use crate::error::{Field, ValidationError};

const PASSWORD_SPECIALS: &str = "@$!%*?&";

pub const PASSWORD_REQUIREMENTS: &str = "Password must contain at least 8 characters, one uppercase letter, one lowercase letter, one number, and one special character (@$!%*?&)";

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("valid email regex")
    })
}

fn script_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<script\b.*?</script\s*>").expect("valid script regex"))
}

fn tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]*>").expect("valid tag regex"))
}

fn sanitize(input: &str, max_len: usize) -> String {
    let without_scripts = script_regex().replace_all(input, "");
    let without_tags = tag_regex().replace_all(&without_scripts, "");
    let cleaned: String = without_tags
        .chars()
        .filter(|c| !matches!(c, '\'' | '"' | ';' | '\\'))
        .collect();
    cleaned.trim().chars().take(max_len).collect()
}

pub fn sanitize_email(email: &str) -> String {
    sanitize(email, MAX_EMAIL_LENGTH)
}

pub fn sanitize_password(password: &str) -> String {
    sanitize(password, MAX_PASSWORD_LENGTH)
}

pub fn is_valid_email(email: &str) -> bool {
    email_regex().is_match(email)
}

pub fn is_strong_password(password: &str) -> bool {
    let allowed = |c: char| c.is_ascii_alphanumeric() || PASSWORD_SPECIALS.contains(c);
    password.chars().count() >= 8
        && password.chars().all(allowed)
        && password.chars().any(|c| c.is_ascii_lowercase())
        && password.chars().any(|c| c.is_ascii_uppercase())
        && password.chars().any(|c| c.is_ascii_digit())
        && password.chars().any(|c| PASSWORD_SPECIALS.contains(c))
}

pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    if email.trim().is_empty() {
        return Err(ValidationError::new(Field::Email, "Email is required"));
    }
    if !is_valid_email(email) {
        return Err(ValidationError::new(
            Field::Email,
            "Please enter a valid email address",
        ));
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.is_empty() {
        return Err(ValidationError::new(Field::Password, "Password is required"));
    }
    if !is_strong_password(password) {
        return Err(ValidationError::new(Field::Password, PASSWORD_REQUIREMENTS));
    }
    Ok(())
}

pub fn validate_confirmation(password: &str, confirmation: &str) -> Result<(), ValidationError> {
    if confirmation.is_empty() {
        return Err(ValidationError::new(
            Field::ConfirmPassword,
            "Please confirm your password",
        ));
    }
    if password != confirmation {
        return Err(ValidationError::new(
            Field::ConfirmPassword,
            "Passwords do not match",
        ));
    }
    Ok(())
}

pub fn validate_full_name(name: &str) -> Result<(), ValidationError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationError::new(Field::FullName, "Full name is required"));
    }
    if name.chars().count() < MIN_NAME_LENGTH {
        return Err(ValidationError::new(
            Field::FullName,
            "Name must be at least 2 characters",
        ));
    }
    Ok(())
}

pub fn validate_birth_date(birth: NaiveDate, today: NaiveDate) -> Result<(), ValidationError> {
    let too_young = || {
        ValidationError::new(
            Field::BirthDate,
            format!("You must be at least {MIN_AGE_YEARS} years old"),
        )
    };
    let cutoff = today
        .checked_sub_months(Months::new(12 * MIN_AGE_YEARS as u32))
        .ok_or_else(too_young)?;
    if birth > cutoff {
        return Err(too_young());
    }
    Ok(())
}

/// Collects every failing check instead of stopping at the first one.
fn collect(checks: impl IntoIterator<Item = Result<(), ValidationError>>) -> Result<(), Vec<ValidationError>> {
    let errors: Vec<ValidationError> = checks.into_iter().filter_map(Result::err).collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RegistrationForm {
    pub full_name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    pub birth_date: Option<NaiveDate>,
}

impl RegistrationForm {
    /// Copy with email and password passed through the sanitizers.
    pub fn sanitized(&self) -> Self {
        Self {
            full_name: self.full_name.trim().to_string(),
            email: sanitize_email(&self.email),
            password: sanitize_password(&self.password),
            confirm_password: sanitize_password(&self.confirm_password),
            birth_date: self.birth_date,
        }
    }

    pub fn validate(&self, today: NaiveDate) -> Result<(), Vec<ValidationError>> {
        let birth = self.birth_date.map(|b| validate_birth_date(b, today));
        collect(
            [
                validate_full_name(&self.full_name),
                validate_email(&self.email),
                validate_password(&self.password),
                validate_confirmation(&self.password, &self.confirm_password),
            ]
            .into_iter()
            .chain(birth),
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct SignInForm {
    pub email: String,
    pub password: String,
}

impl SignInForm {
    pub fn sanitized(&self) -> Self {
        Self {
            email: sanitize_email(&self.email),
            password: sanitize_password(&self.password),
        }
    }

    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        collect([validate_email(&self.email), validate_password(&self.password)])
    }
}
