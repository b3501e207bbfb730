use regex::Regex;

use crate::types::ValidationError;

lazy_static! {
    static ref EMAIL_RE: Regex = {
        let pattern = r"(?i)\A[a-z0-9!#$%&'*+/=?^_`{|}~-]+(?:\.[a-z0-9!#$%&'*+/=?^_`{|}~-]+)*@(?:[a-z0-9](?:[a-z0-9-]*[a-z0-9])?\.)+[a-z0-9](?:[a-z0-9-]*[a-z0-9])?\z";
        Regex::new(pattern).unwrap()
    };
}

pub const MIN_USERNAME_LEN: usize = 3;
pub const MAX_USERNAME_LEN: usize = 30;
pub const MIN_PASSWORD_LEN: usize = 5;

pub fn validate_email_re(email: &str) -> Result<(), ValidationError> {
    if !EMAIL_RE.is_match(email) {
        Err(ValidationError::from(
            "email",
            format!("Email invalide : {}", email),
        ))
    } else {
        Ok(())
    }
}

pub fn validate_username_re(username: &str) -> Result<(), ValidationError> {
    let len = username.chars().count();
    if len < MIN_USERNAME_LEN {
        Err(ValidationError::from(
            "username",
            format!(
                "Le nom d'utilisateur doit contenir au moins {} caractères",
                MIN_USERNAME_LEN
            ),
        ))
    } else if len > MAX_USERNAME_LEN {
        Err(ValidationError::from(
            "username",
            format!(
                "Le nom d'utilisateur doit contenir au plus {} caractères",
                MAX_USERNAME_LEN
            ),
        ))
    } else {
        Ok(())
    }
}

pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        Err(ValidationError::from(
            "password",
            format!(
                "Le mot de passe doit contenir au moins {} caractères",
                MIN_PASSWORD_LEN
            ),
        ))
    } else {
        Ok(())
    }
}

/// Emails are compared case-insensitively everywhere, so they are stored
/// lowercased.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Extracts the token from an `Authorization` header value. The `Bearer `
/// prefix is optional; a blank value means no token.
pub fn bearer_token(header: Option<&str>) -> Option<&str> {
    let value = header?.trim();
    let token = match value.strip_prefix("Bearer") {
        Some(rest) if rest.is_empty() || rest.starts_with(' ') => rest.trim(),
        _ => value,
    };
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}
