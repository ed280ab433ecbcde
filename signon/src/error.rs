use thiserror::Error;

/// Closed error set surfaced to callers.
///
/// Backend-native codes are mapped into this set at the backend
/// boundary; unmapped codes collapse to `AuthFailed` rather than leaking
/// provider-specific identifiers. No operation is retried automatically.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// The email is already registered with the backend
    #[error("email is already registered")]
    EmailInUse,
    /// The email address is malformed
    #[error("invalid email address")]
    InvalidEmail,
    /// The password does not meet the backend's strength requirements
    #[error("password is too weak")]
    WeakPassword,
    /// No account matches the given email
    #[error("account not found")]
    NotFound,
    /// The password does not match the account
    #[error("wrong password")]
    WrongPassword,
    /// The account has been disabled by an administrator
    #[error("account is disabled")]
    Disabled,
    /// Sign-in throttled after repeated failures
    #[error("too many attempts, try again later")]
    TooManyAttempts,
    /// Image upload failed; the remote object was not created
    #[error("image upload failed: {0}")]
    UploadFailed(String),
    /// The backend could not be reached or returned a server error
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    /// Catch-all for backend codes outside the closed set
    #[error("authentication failed: {0}")]
    AuthFailed(String),
}

pub type AuthResult<T> = Result<T, AuthError>;

impl AuthError {
    /// Map a backend error code to the closed taxonomy.
    ///
    /// Codes may carry a trailing explanation, e.g.
    /// `WEAK_PASSWORD : Password should be at least 6 characters`; the
    /// match is on the leading token.
    pub fn from_backend_code(message: &str) -> AuthError {
        let code = message.split_whitespace().next().unwrap_or(message);
        match code {
            "EMAIL_EXISTS" => AuthError::EmailInUse,
            "INVALID_EMAIL" | "MISSING_EMAIL" => AuthError::InvalidEmail,
            "WEAK_PASSWORD" => AuthError::WeakPassword,
            "EMAIL_NOT_FOUND" => AuthError::NotFound,
            "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" => AuthError::WrongPassword,
            "USER_DISABLED" => AuthError::Disabled,
            "TOO_MANY_ATTEMPTS_TRY_LATER" => AuthError::TooManyAttempts,
            _ => AuthError::AuthFailed(code.to_string()),
        }
    }
}
