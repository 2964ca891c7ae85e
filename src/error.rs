//! Errors surfaced to clients
//!
//! External-service failures never show up here; they degrade to fallback
//! text inside the handlers.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CouncilError {
    #[error("Unknown persona: {0}")]
    UnknownPersona(String),

    #[error("No active session for user {0}")]
    NoActiveSession(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub type CouncilResult<T> = std::result::Result<T, CouncilError>;

/// Reject empty or whitespace-only text
pub fn require_text(field: &str, value: &str) -> CouncilResult<()> {
    if value.trim().is_empty() {
        return Err(CouncilError::InvalidInput(format!("{} must not be empty", field)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_text() {
        assert!(require_text("message", "hi").is_ok());
        let err = require_text("message", "  \n").unwrap_err();
        assert_eq!(err.to_string(), "Invalid input: message must not be empty");
    }

    #[test]
    fn test_anyhow_converts_to_internal() {
        let err: CouncilError = anyhow::anyhow!("disk full").into();
        assert!(matches!(err, CouncilError::Internal(_)));
    }
}
