use validator::{ValidateEmail, ValidationError};

pub const THEMES: [&str; 3] = ["light", "dark", "system"];

/// Validates that the input looks like a valid email address
pub fn is_valid_email(email: &str) -> bool {
    let email = email.trim();
    !email.is_empty() && email.validate_email()
}

/// Emails are compared case-insensitively and stored trimmed and lowercased.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// `#[validate(custom)]` hook for the profile theme preference.
pub fn validate_theme(theme: &str) -> Result<(), ValidationError> {
    if THEMES.contains(&theme) {
        Ok(())
    } else {
        let mut err = ValidationError::new("theme");
        err.message = Some("Theme must be one of light, dark or system".into());
        Err(err)
    }
}

/// `#[validate(custom)]` hook rejecting names that are only whitespace.
pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("Must not be blank".into());
        Err(err)
    } else {
        Ok(())
    }
}
