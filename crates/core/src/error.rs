use crate::token::TokenError;
use crate::validation::ValidationError;

/// Domain error taxonomy shared by every layer above the store.
///
/// Repositories translate driver errors into these kinds; applications pass
/// them through unchanged so the protocol layer can map each kind to its own
/// status codes.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Field-level input violations. Returned before any persistence attempt.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("username already exists")]
    UsernameAlreadyExists,

    #[error("email already exists")]
    EmailAlreadyExists,

    #[error("invalid credentials")]
    InvalidCredentials,

    /// Wrong code, already used, or expired. The three causes are merged.
    #[error("email verification failed")]
    VerificationFailed,

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Store or queue unreachable, pool exhausted, deadline elapsed.
    #[error("Transient infrastructure error: {0}")]
    Transient(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn user_not_found(username: impl Into<String>) -> Self {
        Self::NotFound {
            entity: "user",
            key: username.into(),
        }
    }

    pub fn session_not_found(id: impl ToString) -> Self {
        Self::NotFound {
            entity: "session",
            key: id.to_string(),
        }
    }

    /// `true` for unique-constraint violations on username or email.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::UsernameAlreadyExists | Self::EmailAlreadyExists)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Whether retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn conflict_kinds() {
        assert!(CoreError::UsernameAlreadyExists.is_conflict());
        assert!(CoreError::EmailAlreadyExists.is_conflict());
        assert!(!CoreError::InvalidCredentials.is_conflict());
    }

    #[test]
    fn not_found_display_names_entity_and_key() {
        let err = CoreError::user_not_found("alice");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "user not found: alice");
    }

    #[test]
    fn token_errors_convert() {
        let err: CoreError = TokenError::Expired.into();
        assert_matches!(err, CoreError::Token(TokenError::Expired));
    }
}
