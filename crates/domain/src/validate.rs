use classroom_core::{DomainError, DomainResult};

/// Reject blank (empty or whitespace-only) text fields.
pub fn validate_non_empty(field: &str, value: &str) -> DomainResult<()> {
    if value.trim().is_empty() {
        return Err(DomainError::validation(format!("{field} must not be empty")));
    }
    Ok(())
}

/// Self-reported confidence is a 1..=5 scale.
pub fn validate_confidence(confidence: Option<i16>) -> DomainResult<()> {
    match confidence {
        Some(c) if !(1..=5).contains(&c) => Err(DomainError::validation(
            "confidence must be between 1 and 5",
        )),
        _ => Ok(()),
    }
}
