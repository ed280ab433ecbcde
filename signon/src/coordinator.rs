use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::backend::IdentityBackend;
use crate::error::AuthResult;
use crate::identity::{Identity, ProfileChanges, SessionState};
use crate::upload::ImageSource;

/// Storage prefix under which profile images are keyed by account id
const PROFILE_IMAGE_PREFIX: &str = "profileImages";

/// Parameters for creating a new account.
#[derive(Debug)]
pub struct NewAccount {
    pub email: String,
    pub password: String,
    pub display_name: String,
    /// Optional profile image uploaded during registration
    pub image: Option<ImageSource>,
}

/// Bridges UI-initiated actions to the identity backend and owns the
/// single current [`SessionState`].
///
/// Constructed explicitly and handed by reference to whatever owns the
/// UI tree; there is no ambient singleton. The coordinator's watch
/// channel has exactly one writer: the subscription pump spawned by
/// [`initialize`](Self::initialize). `register`, `login`, and `logout`
/// only trigger backend calls, so an in-flight operation can never race
/// a notification into a half-written state.
pub struct SessionCoordinator {
    backend: Arc<dyn IdentityBackend>,
    state_tx: watch::Sender<SessionState>,
    state_rx: watch::Receiver<SessionState>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl SessionCoordinator {
    /// Create a coordinator in the `Unknown` state. No backend traffic
    /// happens until [`initialize`](Self::initialize).
    pub fn new(backend: Arc<dyn IdentityBackend>) -> Self {
        let (state_tx, state_rx) = watch::channel(SessionState::Unknown);
        Self {
            backend,
            state_tx,
            state_rx,
            pump: Mutex::new(None),
        }
    }

    /// Subscribe to the backend's session-change stream.
    ///
    /// Spawns the pump task that replaces the held state on every
    /// notification. Subscribes exactly once; repeat calls are no-ops.
    pub fn initialize(&self) {
        let mut pump = self.pump.lock().expect("pump lock poisoned");
        if pump.is_some() {
            return;
        }

        let mut events = self.backend.subscribe();
        let state_tx = self.state_tx.clone();
        *pump = Some(tokio::spawn(async move {
            loop {
                let next = match &*events.borrow_and_update() {
                    Some(identity) => SessionState::Authenticated(identity.clone()),
                    None => SessionState::Unauthenticated,
                };
                state_tx.send_replace(next);
                if events.changed().await.is_err() {
                    break;
                }
            }
        }));
        info!("session subscription established");
    }

    /// Wait until the first backend notification has been applied and
    /// return the resulting state. Dependent UI must not render before
    /// this resolves. Hangs forever if `initialize` was never called.
    pub async fn ready(&self) -> SessionState {
        let mut rx = self.state_rx.clone();
        let result = match rx.wait_for(SessionState::is_known).await {
            Ok(state) => state.clone(),
            // The sender lives as long as the coordinator
            Err(_) => self.state(),
        };
        result
    }

    /// The current session state. Consumers should re-read this rather
    /// than caching the identity across render passes.
    pub fn state(&self) -> SessionState {
        self.state_rx.borrow().clone()
    }

    /// A receiver following every session-state replacement.
    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    /// Create an account, upload the profile image when one was
    /// supplied, and apply the display name and photo URL to the
    /// profile.
    ///
    /// Account creation failures stop the sequence immediately. An
    /// upload failure after that point does not roll the account back:
    /// registration continues without a photo and the profile update is
    /// still attempted. A profile-update failure likewise leaves the
    /// account in place.
    pub async fn register(&self, new_account: NewAccount) -> AuthResult<Identity> {
        let NewAccount {
            email,
            password,
            display_name,
            image,
        } = new_account;

        let created = self.backend.create_account(&email, &password).await?;
        info!(uid = %created.uid, "account created");

        let photo_url = match image {
            Some(image) => match self.upload_image(image, &created.uid).await {
                Ok(url) => Some(url),
                Err(error) => {
                    warn!(uid = %created.uid, %error, "profile image upload failed, continuing without a photo");
                    None
                }
            },
            None => None,
        };

        let changes = ProfileChanges {
            display_name: Some(display_name),
            photo_url,
        };
        let identity = self.backend.update_profile(&created.uid, changes).await?;
        info!(uid = %identity.uid, "registration complete");
        Ok(identity)
    }

    /// Authenticate with email and password.
    ///
    /// On success the session-change subscription is what updates the
    /// held state; this call only triggers the backend request and
    /// propagates its mapped error.
    pub async fn login(&self, email: &str, password: &str) -> AuthResult<Identity> {
        let identity = self.backend.sign_in(email, password).await?;
        info!(uid = %identity.uid, "signed in");
        Ok(identity)
    }

    /// End the backend session. Calling this with no active session is a
    /// no-op success.
    pub async fn logout(&self) -> AuthResult<()> {
        self.backend.sign_out().await?;
        info!("signed out");
        Ok(())
    }

    /// Upload a local image to the profile-image location for
    /// `owner_uid` and return the durable URL.
    pub async fn upload_image(&self, image: ImageSource, owner_uid: &str) -> AuthResult<String> {
        let (data, content_type) = image.read().await?;
        let path = format!("{PROFILE_IMAGE_PREFIX}/{owner_uid}");
        let url = self.backend.upload_blob(data, &content_type, &path).await?;
        info!(%path, %content_type, "profile image uploaded");
        Ok(url)
    }

    /// Release the session subscription. Idempotent; further backend
    /// notifications are no longer applied.
    pub fn close(&self) {
        if let Some(pump) = self.pump.lock().expect("pump lock poisoned").take() {
            pump.abort();
            info!("session subscription released");
        }
    }
}

impl Drop for SessionCoordinator {
    fn drop(&mut self) {
        self.close();
    }
}
