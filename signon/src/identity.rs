use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The authenticated principal as reported by the backend.
///
/// Replaced wholesale whenever the backend reports a session change;
/// nothing in this crate mutates an `Identity` field-by-field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    /// Unique account id assigned by the backend
    pub uid: String,
    /// Email the account was created with
    pub email: String,
    /// Optional display name
    pub display_name: Option<String>,
    /// Profile image URL, set after a successful upload
    pub photo_url: Option<String>,
    /// Whether the backend has verified the email address
    pub email_verified: bool,
    /// When the account was created (backend-assigned)
    pub created_at: DateTime<Utc>,
}

/// Current authentication state.
///
/// `Unknown` is the constructed state, before the backend has reported
/// anything. It is never re-entered once the first notification lands.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SessionState {
    #[default]
    Unknown,
    Authenticated(Identity),
    Unauthenticated,
}

impl SessionState {
    /// Whether the first backend notification has been applied.
    pub fn is_known(&self) -> bool {
        !matches!(self, SessionState::Unknown)
    }

    /// The signed-in identity, if any.
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            SessionState::Authenticated(identity) => Some(identity),
            _ => None,
        }
    }
}

/// Partial profile patch applied to an account. Absent fields are left
/// untouched by the backend.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileChanges {
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
}
