//! Shared helper functions for Rocket route handlers.

use crate::error::ApiError;

/// Trim `value` and reject it when nothing is left.
pub fn require_text(field: &str, value: &str) -> Result<String, ApiError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApiError::BadRequest(format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}

/// Trimmed, non-empty address containing an `@`.
pub fn require_email(value: &str) -> Result<String, ApiError> {
    let email = require_text("email", value)?;
    if !email.contains('@') {
        return Err(ApiError::BadRequest("email must contain '@'".to_string()));
    }
    Ok(email)
}
