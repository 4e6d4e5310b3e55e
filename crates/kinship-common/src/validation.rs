//! Input validation utilities.
//!
//! Shared by the stores (message length, names) and the transport adapters
//! (request bodies derived with `validator`).

use validator::Validate;

use crate::error::{KinshipError, KinshipResult};

pub const MIN_PASSWORD_LEN: usize = 4;
const MAX_EMOJI_LEN: usize = 16;

/// Validate a request body, returning a `KinshipError::Validation` on failure.
pub fn validate_request<T: Validate>(body: &T) -> KinshipResult<()> {
    body.validate()
        .map_err(|e| KinshipError::validation(format_validation_errors(e)))
}

/// Format validation errors into a human-readable string.
fn format_validation_errors(errors: validator::ValidationErrors) -> String {
    errors
        .field_errors()
        .iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| {
                e.message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("Invalid value for '{field}'"))
            })
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// Group names: 3-32 characters of letters, digits, underscores and spaces.
pub fn validate_group_name(name: &str) -> KinshipResult<()> {
    let len = name.chars().count();
    if name.trim().is_empty() || !(3..=32).contains(&len) {
        return Err(KinshipError::validation(
            "Group name must be 3-32 characters",
        ));
    }

    let valid = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ' ');
    if !valid {
        return Err(KinshipError::validation(
            "Group name can only contain letters, numbers, underscores, and spaces",
        ));
    }

    Ok(())
}

/// Chat content must be non-blank and within the configured length.
pub fn validate_message(content: &str, max_len: u32) -> KinshipResult<()> {
    if content.trim().is_empty() {
        return Err(KinshipError::validation("Message cannot be empty"));
    }
    if content.chars().count() > max_len as usize {
        return Err(KinshipError::validation(format!(
            "Message is too long (max {max_len} characters)"
        )));
    }
    Ok(())
}

pub fn validate_password(password: &str) -> KinshipResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(KinshipError::validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

pub fn validate_emoji(emoji: &str) -> KinshipResult<()> {
    if emoji.trim().is_empty() || emoji.chars().count() > MAX_EMOJI_LEN {
        return Err(KinshipError::validation("Invalid reaction"));
    }
    Ok(())
}
