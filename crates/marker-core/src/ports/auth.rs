//! Authentication ports.

use crate::domain::AuthClass;

/// Identity carried by an access token.
#[derive(Debug, Clone)]
pub struct TokenClaims {
    pub subject_id: i64,
    pub auth_class: AuthClass,
    pub exp: i64,
}

/// Token service trait for issuing and validating access tokens.
pub trait TokenService: Send + Sync {
    /// Issue an access token for a subject.
    fn generate_token(&self, subject_id: i64, auth_class: AuthClass) -> Result<String, AuthError>;

    /// Validate and decode a token.
    fn validate_token(&self, token: &str) -> Result<TokenClaims, AuthError>;

    /// Lifetime of issued tokens in seconds.
    fn expiration_seconds(&self) -> i64;
}

/// Authentication errors.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Missing authorization header")]
    MissingAuth,
}
