use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, timeout};

use signon::{
    AuthError, IdentityBackend, ImageSource, MemoryBackend, NewAccount, SessionCoordinator,
    SessionState,
};

// 1x1 PNG
const PNG_PIXEL: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x02, 0x00, 0x00, 0x00, 0x90,
    0x77, 0x53, 0xDE, 0x00, 0x00, 0x00, 0x0C, 0x49, 0x44, 0x41, 0x54, 0x08, 0xD7, 0x63, 0x00,
    0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49,
    0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
];

fn coordinator_with_backend() -> (Arc<MemoryBackend>, SessionCoordinator) {
    let backend = Arc::new(MemoryBackend::new());
    let coordinator = SessionCoordinator::new(backend.clone());
    (backend, coordinator)
}

async fn wait_for_state(
    coordinator: &SessionCoordinator,
    mut predicate: impl FnMut(&SessionState) -> bool,
) -> SessionState {
    let mut rx = coordinator.watch();
    let state = timeout(Duration::from_secs(5), rx.wait_for(|state| predicate(state)))
        .await
        .expect("timed out waiting for session state")
        .expect("coordinator state channel closed")
        .clone();
    state
}

#[tokio::test]
async fn state_is_unknown_before_initialize() {
    let (_backend, coordinator) = coordinator_with_backend();
    assert_eq!(coordinator.state(), SessionState::Unknown);
}

#[tokio::test]
async fn first_notification_resolves_ready() {
    let (_backend, coordinator) = coordinator_with_backend();
    coordinator.initialize();

    let state = timeout(Duration::from_secs(5), coordinator.ready())
        .await
        .expect("ready did not resolve");
    assert_eq!(state, SessionState::Unauthenticated);
    assert!(coordinator.state().is_known());
}

#[tokio::test]
async fn register_transitions_to_authenticated_with_matching_email() {
    let (_backend, coordinator) = coordinator_with_backend();
    coordinator.initialize();
    coordinator.ready().await;

    coordinator
        .register(NewAccount {
            email: "ann@example.com".to_string(),
            password: "Aa1!aaaa".to_string(),
            display_name: "Ann".to_string(),
            image: None,
        })
        .await
        .unwrap();

    let state = wait_for_state(&coordinator, |state| {
        matches!(state, SessionState::Authenticated(_))
    })
    .await;
    assert_eq!(state.identity().unwrap().email, "ann@example.com");
}

#[tokio::test]
async fn registered_identity_round_trips_through_subscription() {
    let (_backend, coordinator) = coordinator_with_backend();
    coordinator.initialize();
    coordinator.ready().await;

    coordinator
        .register(NewAccount {
            email: "a@b.com".to_string(),
            password: "Aa1!aaaa".to_string(),
            display_name: "Ann".to_string(),
            image: None,
        })
        .await
        .unwrap();

    let state = wait_for_state(&coordinator, |state| {
        state
            .identity()
            .is_some_and(|identity| identity.display_name.is_some())
    })
    .await;
    let identity = state.identity().unwrap();
    assert_eq!(identity.email, "a@b.com");
    assert_eq!(identity.display_name.as_deref(), Some("Ann"));
    assert_eq!(identity.photo_url, None);
}

#[tokio::test]
async fn logout_without_session_is_a_noop_success() {
    let (_backend, coordinator) = coordinator_with_backend();
    coordinator.initialize();
    coordinator.ready().await;

    coordinator.logout().await.unwrap();
    assert_eq!(coordinator.state(), SessionState::Unauthenticated);
}

#[tokio::test]
async fn duplicate_email_surfaces_email_in_use_and_leaves_state_alone() {
    let (_backend, coordinator) = coordinator_with_backend();
    coordinator.initialize();
    coordinator.ready().await;

    coordinator
        .register(NewAccount {
            email: "ann@example.com".to_string(),
            password: "Aa1!aaaa".to_string(),
            display_name: "Ann".to_string(),
            image: None,
        })
        .await
        .unwrap();
    coordinator.logout().await.unwrap();
    wait_for_state(&coordinator, |state| {
        matches!(state, SessionState::Unauthenticated)
    })
    .await;

    let result = coordinator
        .register(NewAccount {
            email: "ann@example.com".to_string(),
            password: "Bb2!bbbb".to_string(),
            display_name: "Another Ann".to_string(),
            image: None,
        })
        .await;
    assert_eq!(result.unwrap_err(), AuthError::EmailInUse);

    // No Authenticated transition happened
    assert_eq!(coordinator.state(), SessionState::Unauthenticated);
}

#[tokio::test]
async fn upload_failure_does_not_block_profile_update() {
    let (backend, coordinator) = coordinator_with_backend();
    backend.fail_uploads(true);
    coordinator.initialize();
    coordinator.ready().await;

    let identity = coordinator
        .register(NewAccount {
            email: "ann@example.com".to_string(),
            password: "Aa1!aaaa".to_string(),
            display_name: "Ann".to_string(),
            image: Some(ImageSource::Bytes {
                data: PNG_PIXEL.to_vec(),
                content_type: None,
            }),
        })
        .await
        .unwrap();

    // The account exists with the display name applied and no photo
    assert_eq!(identity.display_name.as_deref(), Some("Ann"));
    assert_eq!(identity.photo_url, None);
}

#[tokio::test]
async fn register_with_image_sets_the_photo_url() {
    let (backend, coordinator) = coordinator_with_backend();
    coordinator.initialize();
    coordinator.ready().await;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("avatar.png");
    std::fs::write(&path, PNG_PIXEL).unwrap();

    let identity = coordinator
        .register(NewAccount {
            email: "ann@example.com".to_string(),
            password: "Aa1!aaaa".to_string(),
            display_name: "Ann".to_string(),
            image: Some(ImageSource::Path(path)),
        })
        .await
        .unwrap();

    let expected_path = format!("profileImages/{}", identity.uid);
    assert_eq!(
        identity.photo_url.as_deref(),
        Some(format!("memory://{expected_path}").as_str())
    );

    let (stored, content_type) = backend.blob(&expected_path).unwrap();
    assert_eq!(stored, PNG_PIXEL);
    assert_eq!(content_type, "image/png");
}

#[tokio::test]
async fn standalone_upload_failure_surfaces_upload_failed() {
    let (backend, coordinator) = coordinator_with_backend();
    backend.fail_uploads(true);

    let result = coordinator
        .upload_image(
            ImageSource::Bytes {
                data: PNG_PIXEL.to_vec(),
                content_type: None,
            },
            "some-uid",
        )
        .await;
    assert!(matches!(result, Err(AuthError::UploadFailed(_))));
}

#[tokio::test]
async fn concurrent_logins_settle_on_the_last_notification() {
    let (backend, coordinator) = coordinator_with_backend();
    backend
        .create_account("one@example.com", "secret1")
        .await
        .unwrap();
    backend
        .create_account("two@example.com", "secret2")
        .await
        .unwrap();
    backend.sign_out().await.unwrap();

    coordinator.initialize();
    coordinator.ready().await;

    let (first, second) = tokio::join!(
        coordinator.login("one@example.com", "secret1"),
        coordinator.login("two@example.com", "secret2"),
    );
    let first = first.unwrap();
    let second = second.unwrap();

    // Whichever backend notification was published last wins
    let expected = backend
        .subscribe()
        .borrow()
        .clone()
        .expect("a session should be established");
    let state = wait_for_state(&coordinator, |state| {
        state
            .identity()
            .is_some_and(|identity| identity.uid == expected.uid)
    })
    .await;

    // The final identity is exactly one of the two, never a mix
    let winner = state.identity().unwrap();
    assert!(
        (winner.uid == first.uid && winner.email == first.email)
            || (winner.uid == second.uid && winner.email == second.email)
    );
}

#[tokio::test]
async fn out_of_band_invalidation_transitions_to_unauthenticated() {
    let (backend, coordinator) = coordinator_with_backend();
    coordinator.initialize();
    coordinator.ready().await;

    coordinator
        .register(NewAccount {
            email: "ann@example.com".to_string(),
            password: "Aa1!aaaa".to_string(),
            display_name: "Ann".to_string(),
            image: None,
        })
        .await
        .unwrap();
    wait_for_state(&coordinator, |state| {
        matches!(state, SessionState::Authenticated(_))
    })
    .await;

    // Backend invalidates the session out-of-band, e.g. a password
    // change on another device
    backend.emit(None);
    let state = wait_for_state(&coordinator, |state| {
        matches!(state, SessionState::Unauthenticated)
    })
    .await;
    assert_eq!(state, SessionState::Unauthenticated);
}

#[tokio::test]
async fn close_releases_the_subscription_and_is_idempotent() {
    let (backend, coordinator) = coordinator_with_backend();
    coordinator.initialize();
    coordinator.ready().await;

    let identity = coordinator
        .register(NewAccount {
            email: "ann@example.com".to_string(),
            password: "Aa1!aaaa".to_string(),
            display_name: "Ann".to_string(),
            image: None,
        })
        .await
        .unwrap();
    wait_for_state(&coordinator, |state| {
        matches!(state, SessionState::Authenticated(_))
    })
    .await;

    coordinator.close();
    coordinator.close();

    // Notifications after teardown are no longer applied
    backend.emit(None);
    sleep(Duration::from_millis(50)).await;
    assert_eq!(
        coordinator.state().identity().map(|i| i.uid.clone()),
        Some(identity.uid)
    );
}

#[tokio::test]
async fn initialize_subscribes_only_once() {
    let (_backend, coordinator) = coordinator_with_backend();
    coordinator.initialize();
    coordinator.initialize();
    coordinator.ready().await;
    assert_eq!(coordinator.state(), SessionState::Unauthenticated);
}
