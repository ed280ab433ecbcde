use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::watch;
use tracing::info;
use uuid::Uuid;

use crate::backend::{IdentityBackend, SessionEvents};
use crate::error::{AuthError, AuthResult};
use crate::identity::{Identity, ProfileChanges};

/// Consecutive wrong-password attempts tolerated before sign-in is
/// throttled. The counter resets on a successful sign-in.
const MAX_FAILED_ATTEMPTS: u32 = 5;

/// Minimum accepted password length, matching the hosted service
const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone)]
struct StoredAccount {
    identity: Identity,
    password: String,
    disabled: bool,
    failed_attempts: u32,
}

/// In-process [`IdentityBackend`] for tests and local development.
///
/// Implements the full contract over an in-memory account table,
/// including the validation the hosted service performs: duplicate
/// emails, malformed emails, short passwords, disabled accounts, and
/// sign-in throttling. Failure injection hooks cover the paths a live
/// backend fails on.
pub struct MemoryBackend {
    /// Accounts keyed by lowercase email
    accounts: Mutex<HashMap<String, StoredAccount>>,
    /// uid of the signed-in account, if any
    current: Mutex<Option<String>>,
    events: watch::Sender<Option<Identity>>,
    uploads: Mutex<HashMap<String, (Vec<u8>, String)>>,
    fail_uploads: AtomicBool,
    fail_profile_updates: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        let (events, _) = watch::channel(None);
        Self {
            accounts: Mutex::new(HashMap::new()),
            current: Mutex::new(None),
            events,
            uploads: Mutex::new(HashMap::new()),
            fail_uploads: AtomicBool::new(false),
            fail_profile_updates: AtomicBool::new(false),
        }
    }

    /// Make every `upload_blob` call fail with `UploadFailed`.
    pub fn fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    /// Make every `update_profile` call fail with `Unavailable`.
    pub fn fail_profile_updates(&self, fail: bool) {
        self.fail_profile_updates.store(fail, Ordering::SeqCst);
    }

    /// Disable or re-enable an account. Unknown emails are ignored.
    pub fn set_disabled(&self, email: &str, disabled: bool) {
        let mut accounts = self.accounts.lock().expect("accounts lock poisoned");
        if let Some(account) = accounts.get_mut(&email.to_lowercase()) {
            account.disabled = disabled;
        }
    }

    /// Push an out-of-band session notification, as a backend does when
    /// a session is invalidated elsewhere (e.g. a password change on
    /// another device).
    pub fn emit(&self, identity: Option<Identity>) {
        *self.current.lock().expect("current lock poisoned") =
            identity.as_ref().map(|i| i.uid.clone());
        self.events.send_replace(identity);
    }

    /// Stored blob and content type for a path, for test inspection.
    pub fn blob(&self, path: &str) -> Option<(Vec<u8>, String)> {
        self.uploads
            .lock()
            .expect("uploads lock poisoned")
            .get(path)
            .cloned()
    }

    fn notify(&self, identity: Option<Identity>) {
        *self.current.lock().expect("current lock poisoned") =
            identity.as_ref().map(|i| i.uid.clone());
        self.events.send_replace(identity);
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityBackend for MemoryBackend {
    async fn create_account(&self, email: &str, password: &str) -> AuthResult<Identity> {
        if email.is_empty() || !email.contains('@') {
            return Err(AuthError::InvalidEmail);
        }
        if password.len() < MIN_PASSWORD_LEN {
            return Err(AuthError::WeakPassword);
        }

        let key = email.to_lowercase();
        let identity = {
            let mut accounts = self.accounts.lock().expect("accounts lock poisoned");
            if accounts.contains_key(&key) {
                return Err(AuthError::EmailInUse);
            }

            let identity = Identity {
                uid: Uuid::new_v4().to_string(),
                email: email.to_string(),
                display_name: None,
                photo_url: None,
                email_verified: false,
                created_at: Utc::now(),
            };
            accounts.insert(
                key,
                StoredAccount {
                    identity: identity.clone(),
                    password: password.to_string(),
                    disabled: false,
                    failed_attempts: 0,
                },
            );
            identity
        };

        info!(uid = %identity.uid, "memory backend account created");
        self.notify(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_in(&self, email: &str, password: &str) -> AuthResult<Identity> {
        let identity = {
            let mut accounts = self.accounts.lock().expect("accounts lock poisoned");
            let account = accounts
                .get_mut(&email.to_lowercase())
                .ok_or(AuthError::NotFound)?;

            if account.disabled {
                return Err(AuthError::Disabled);
            }
            if account.failed_attempts >= MAX_FAILED_ATTEMPTS {
                return Err(AuthError::TooManyAttempts);
            }
            if account.password != password {
                account.failed_attempts += 1;
                return Err(AuthError::WrongPassword);
            }

            account.failed_attempts = 0;
            account.identity.clone()
        };

        self.notify(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_out(&self) -> AuthResult<()> {
        self.notify(None);
        Ok(())
    }

    async fn update_profile(&self, uid: &str, changes: ProfileChanges) -> AuthResult<Identity> {
        if self.fail_profile_updates.load(Ordering::SeqCst) {
            return Err(AuthError::Unavailable("injected profile update failure".into()));
        }

        let updated = {
            let mut accounts = self.accounts.lock().expect("accounts lock poisoned");
            let account = accounts
                .values_mut()
                .find(|account| account.identity.uid == uid)
                .ok_or(AuthError::NotFound)?;

            let mut identity = account.identity.clone();
            if let Some(display_name) = changes.display_name {
                identity.display_name = Some(display_name);
            }
            if let Some(photo_url) = changes.photo_url {
                identity.photo_url = Some(photo_url);
            }
            account.identity = identity.clone();
            identity
        };

        let is_current = self
            .current
            .lock()
            .expect("current lock poisoned")
            .as_deref()
            == Some(uid);
        if is_current {
            self.events.send_replace(Some(updated.clone()));
        }
        Ok(updated)
    }

    async fn upload_blob(
        &self,
        data: Vec<u8>,
        content_type: &str,
        path: &str,
    ) -> AuthResult<String> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(AuthError::UploadFailed("injected upload failure".into()));
        }

        self.uploads
            .lock()
            .expect("uploads lock poisoned")
            .insert(path.to_string(), (data, content_type.to_string()));
        Ok(format!("memory://{path}"))
    }

    fn subscribe(&self) -> SessionEvents {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_then_sign_in_round_trips() {
        let backend = MemoryBackend::new();
        let created = backend
            .create_account("ann@example.com", "secret1")
            .await
            .unwrap();

        backend.sign_out().await.unwrap();
        let signed_in = backend.sign_in("ann@example.com", "secret1").await.unwrap();
        assert_eq!(signed_in.uid, created.uid);
        assert_eq!(signed_in.email, "ann@example.com");
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let backend = MemoryBackend::new();
        backend
            .create_account("ann@example.com", "secret1")
            .await
            .unwrap();
        let result = backend.create_account("Ann@Example.com", "secret2").await;
        assert_eq!(result.unwrap_err(), AuthError::EmailInUse);
    }

    #[tokio::test]
    async fn short_password_is_weak() {
        let backend = MemoryBackend::new();
        let result = backend.create_account("ann@example.com", "abc").await;
        assert_eq!(result.unwrap_err(), AuthError::WeakPassword);
    }

    #[tokio::test]
    async fn sign_in_throttles_after_repeated_failures() {
        let backend = MemoryBackend::new();
        backend
            .create_account("ann@example.com", "secret1")
            .await
            .unwrap();

        for _ in 0..MAX_FAILED_ATTEMPTS {
            let result = backend.sign_in("ann@example.com", "wrong").await;
            assert_eq!(result.unwrap_err(), AuthError::WrongPassword);
        }
        let result = backend.sign_in("ann@example.com", "secret1").await;
        assert_eq!(result.unwrap_err(), AuthError::TooManyAttempts);
    }

    #[tokio::test]
    async fn disabled_account_cannot_sign_in() {
        let backend = MemoryBackend::new();
        backend
            .create_account("ann@example.com", "secret1")
            .await
            .unwrap();
        backend.set_disabled("ann@example.com", true);

        let result = backend.sign_in("ann@example.com", "secret1").await;
        assert_eq!(result.unwrap_err(), AuthError::Disabled);
    }

    #[tokio::test]
    async fn profile_update_is_wholesale() {
        let backend = MemoryBackend::new();
        let created = backend
            .create_account("ann@example.com", "secret1")
            .await
            .unwrap();

        let updated = backend
            .update_profile(
                &created.uid,
                ProfileChanges {
                    display_name: Some("Ann".to_string()),
                    photo_url: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.display_name.as_deref(), Some("Ann"));
        assert_eq!(updated.photo_url, None);

        // Subscription observed the refreshed identity
        let events = backend.subscribe();
        let current = events.borrow().clone().unwrap();
        assert_eq!(current.display_name.as_deref(), Some("Ann"));
    }
}
