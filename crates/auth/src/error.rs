use common::ErrorClass;
use store::StoreError;
use thiserror::Error;

/// Errors raised while authenticating or rotating tokens.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Unknown email, deleted user or wrong password.
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// The refresh token is unknown, expired, revoked or owned by a deleted user.
    #[error("Refresh token is invalid, expired or revoked")]
    InvalidRefreshToken,

    #[error("Access token is invalid: {0}")]
    InvalidAccessToken(String),

    #[error("Token signing failed: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("Password hashing failed: {0}")]
    PasswordHash(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl AuthError {
    pub fn class(&self) -> ErrorClass {
        match self {
            AuthError::InvalidCredentials
            | AuthError::InvalidRefreshToken
            | AuthError::InvalidAccessToken(_) => ErrorClass::Validation,
            AuthError::Jwt(_) | AuthError::PasswordHash(_) | AuthError::Store(_) => {
                ErrorClass::System
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::InvalidRefreshToken => "invalid_refresh_token",
            AuthError::InvalidAccessToken(_) => "invalid_access_token",
            AuthError::Jwt(_) | AuthError::PasswordHash(_) | AuthError::Store(_) => "internal",
        }
    }

    /// Returns true for failures caused by the caller's credentials.
    pub fn is_unauthorized(&self) -> bool {
        self.class() == ErrorClass::Validation
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_failures_are_unauthorized() {
        assert!(AuthError::InvalidCredentials.is_unauthorized());
        assert!(AuthError::InvalidRefreshToken.is_unauthorized());
        assert!(!AuthError::PasswordHash("x".into()).is_unauthorized());
        assert_eq!(
            AuthError::Store(StoreError::InvalidData("x".into())).code(),
            "internal"
        );
    }
}
