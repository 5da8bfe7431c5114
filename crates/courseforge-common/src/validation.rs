//! Input validation utilities.
//!
//! Centralized validation helpers used across API routes.

use validator::Validate;

use crate::error::ForgeError;

/// Validate a request body, returning a ForgeError::Validation on failure.
pub fn validate_request<T: Validate>(body: &T) -> Result<(), ForgeError> {
    body.validate().map_err(|e| ForgeError::Validation {
        message: format_validation_errors(e),
    })
}

/// Format validation errors into a human-readable string.
fn format_validation_errors(errors: validator::ValidationErrors) -> String {
    let mut messages: Vec<String> = errors
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
        .collect();
    messages.sort();
    messages.join("; ")
}

/// Validate a URL slug: lowercase ASCII letters, digits, and single hyphens.
pub fn validate_slug(slug: &str) -> Result<(), ForgeError> {
    if slug.is_empty() || slug.len() > 80 {
        return Err(ForgeError::validation("Slug must be 1-80 characters"));
    }

    let valid_chars = slug
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if !valid_chars || slug.starts_with('-') || slug.ends_with('-') || slug.contains("--") {
        return Err(ForgeError::validation(
            "Slug can only contain lowercase letters, numbers, and single hyphens",
        ));
    }

    Ok(())
}

/// Validate an ISO-4217 style currency code ("usd", "EUR").
pub fn validate_currency(code: &str) -> Result<(), ForgeError> {
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(())
    } else {
        Err(ForgeError::validation("Currency must be a three-letter code"))
    }
}

/// Clamp a client-supplied page size into `1..=max`, defaulting when absent.
pub fn page_limit(requested: Option<i64>, default: i64, max: i64) -> i64 {
    requested.unwrap_or(default).clamp(1, max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugs() {
        assert!(validate_slug("rust-for-creators").is_ok());
        assert!(validate_slug("course101").is_ok());
        assert!(validate_slug("").is_err());
        assert!(validate_slug("Upper-Case").is_err());
        assert!(validate_slug("-leading").is_err());
        assert!(validate_slug("double--hyphen").is_err());
        assert!(validate_slug("spaces not ok").is_err());
    }

    #[test]
    fn currencies() {
        assert!(validate_currency("usd").is_ok());
        assert!(validate_currency("EUR").is_ok());
        assert!(validate_currency("us").is_err());
        assert!(validate_currency("u5d").is_err());
    }

    #[test]
    fn page_limit_clamps() {
        assert_eq!(page_limit(None, 50, 100), 50);
        assert_eq!(page_limit(Some(500), 50, 100), 100);
        assert_eq!(page_limit(Some(0), 50, 100), 1);
        assert_eq!(page_limit(Some(-4), 50, 100), 1);
    }
}
