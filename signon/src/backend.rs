use async_trait::async_trait;
use tokio::sync::watch;

use crate::error::AuthResult;
use crate::identity::{Identity, ProfileChanges};

/// Stream of session-change notifications from a backend.
///
/// Backed by a watch channel: only the latest value is retained, so a
/// burst of notifications always resolves to the last one. Dropping the
/// receiver releases the subscription.
pub type SessionEvents = watch::Receiver<Option<Identity>>;

/// Contract every identity/storage provider must satisfy.
///
/// Implementations publish `Some(identity)` on their session-change
/// channel after a successful create-account, sign-in, or profile
/// update, and `None` after sign-out.
#[async_trait]
pub trait IdentityBackend: Send + Sync {
    /// Create an account with email and password and establish a session
    /// for it.
    async fn create_account(&self, email: &str, password: &str) -> AuthResult<Identity>;

    /// Authenticate an existing account.
    async fn sign_in(&self, email: &str, password: &str) -> AuthResult<Identity>;

    /// End the current session. Idempotent: signing out with no active
    /// session is a successful no-op.
    async fn sign_out(&self) -> AuthResult<()>;

    /// Apply a partial profile patch to the account identified by `uid`
    /// and return the refreshed identity.
    async fn update_profile(&self, uid: &str, changes: ProfileChanges) -> AuthResult<Identity>;

    /// Store a blob at `path` and return its durable URL. The remote
    /// object exists only once this reports success.
    async fn upload_blob(
        &self,
        data: Vec<u8>,
        content_type: &str,
        path: &str,
    ) -> AuthResult<String>;

    /// Subscribe to session-change notifications. The receiver's current
    /// value reflects the backend's present knowledge of the session.
    fn subscribe(&self) -> SessionEvents;
}
