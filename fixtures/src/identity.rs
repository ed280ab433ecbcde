//! Identity fixture server: the account REST surface the cloud backend
//! talks to, backed by an in-memory account table.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

/// Consecutive wrong-password attempts tolerated before sign-in is
/// throttled, matching the hosted service
const MAX_FAILED_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone)]
struct FixtureAccount {
    uid: String,
    email: String,
    password: String,
    display_name: Option<String>,
    photo_url: Option<String>,
    email_verified: bool,
    disabled: bool,
    failed_attempts: u32,
    created_at_ms: i64,
    id_token: String,
}

/// Shared state behind the identity fixture router
#[derive(Clone, Default)]
pub struct IdentityState {
    /// Accounts keyed by lowercase email
    accounts: Arc<Mutex<HashMap<String, FixtureAccount>>>,
}

impl IdentityState {
    pub fn new() -> Self {
        Self::default()
    }

    /// State pre-seeded with the canned accounts tests rely on: a
    /// disabled account at `disabled@fixture.test` (password `hunter22`).
    pub fn seeded() -> Self {
        let state = Self::new();
        state
            .accounts
            .lock()
            .expect("accounts lock poisoned")
            .insert(
                "disabled@fixture.test".to_string(),
                FixtureAccount {
                    uid: "fixture-uid-disabled".to_string(),
                    email: "disabled@fixture.test".to_string(),
                    password: "hunter22".to_string(),
                    display_name: Some("Disabled Fixture User".to_string()),
                    photo_url: None,
                    email_verified: true,
                    disabled: true,
                    failed_attempts: 0,
                    created_at_ms: 1_700_000_000_000,
                    id_token: "fixture-token-disabled".to_string(),
                },
            );
        state
    }
}

pub fn identity_router(state: IdentityState) -> Router {
    Router::new()
        .route("/v1/accounts:signUp", post(sign_up))
        .route("/v1/accounts:signInWithPassword", post(sign_in))
        .route("/v1/accounts:update", post(update))
        .route("/v1/accounts:lookup", post(lookup))
        .with_state(state)
}

// Handler implementations

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PasswordRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(json!({
            "error": {"code": status.as_u16(), "message": message}
        })),
    )
        .into_response()
}

fn token_response(account: &FixtureAccount) -> Response {
    Json(json!({
        "localId": account.uid,
        "email": account.email,
        "idToken": account.id_token,
        "refreshToken": format!("refresh-{}", account.id_token),
        "expiresIn": "3600"
    }))
    .into_response()
}

async fn sign_up(
    State(state): State<IdentityState>,
    Json(request): Json<PasswordRequest>,
) -> Response {
    if request.email.is_empty() || !request.email.contains('@') {
        return error_response(StatusCode::BAD_REQUEST, "INVALID_EMAIL");
    }
    if request.password.len() < 6 {
        return error_response(
            StatusCode::BAD_REQUEST,
            "WEAK_PASSWORD : Password should be at least 6 characters",
        );
    }

    let mut accounts = state.accounts.lock().expect("accounts lock poisoned");
    let key = request.email.to_lowercase();
    if accounts.contains_key(&key) {
        return error_response(StatusCode::BAD_REQUEST, "EMAIL_EXISTS");
    }

    let uid = format!("fixture-uid-{}", Uuid::new_v4());
    let id_token = format!("fixture-token-{uid}");
    let account = FixtureAccount {
        uid: uid.clone(),
        email: request.email.clone(),
        password: request.password,
        display_name: None,
        photo_url: None,
        email_verified: false,
        disabled: false,
        failed_attempts: 0,
        created_at_ms: Utc::now().timestamp_millis(),
        id_token,
    };
    info!(%uid, email = %request.email, "fixture account created");

    let response = token_response(&account);
    accounts.insert(key, account);
    response
}

async fn sign_in(
    State(state): State<IdentityState>,
    Json(request): Json<PasswordRequest>,
) -> Response {
    let mut accounts = state.accounts.lock().expect("accounts lock poisoned");
    let Some(account) = accounts.get_mut(&request.email.to_lowercase()) else {
        return error_response(StatusCode::BAD_REQUEST, "EMAIL_NOT_FOUND");
    };

    if account.disabled {
        return error_response(StatusCode::BAD_REQUEST, "USER_DISABLED");
    }
    if account.failed_attempts >= MAX_FAILED_ATTEMPTS {
        return error_response(
            StatusCode::BAD_REQUEST,
            "TOO_MANY_ATTEMPTS_TRY_LATER : Access to this account has been temporarily disabled due to many failed login attempts.",
        );
    }
    if account.password != request.password {
        account.failed_attempts += 1;
        return error_response(StatusCode::BAD_REQUEST, "INVALID_PASSWORD");
    }

    account.failed_attempts = 0;
    info!(uid = %account.uid, "fixture sign-in");
    token_response(account)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateRequest {
    #[serde(default)]
    id_token: String,
    display_name: Option<String>,
    photo_url: Option<String>,
}

async fn update(
    State(state): State<IdentityState>,
    Json(request): Json<UpdateRequest>,
) -> Response {
    let mut accounts = state.accounts.lock().expect("accounts lock poisoned");
    let Some(account) = accounts
        .values_mut()
        .find(|account| account.id_token == request.id_token)
    else {
        return error_response(StatusCode::BAD_REQUEST, "INVALID_ID_TOKEN");
    };

    if let Some(display_name) = request.display_name {
        account.display_name = Some(display_name);
    }
    if let Some(photo_url) = request.photo_url {
        account.photo_url = Some(photo_url);
    }
    info!(uid = %account.uid, "fixture profile updated");

    Json(json!({
        "localId": account.uid,
        "email": account.email,
        "displayName": account.display_name,
        "photoUrl": account.photo_url,
    }))
    .into_response()
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupRequest {
    #[serde(default)]
    id_token: String,
}

async fn lookup(
    State(state): State<IdentityState>,
    Json(request): Json<LookupRequest>,
) -> Response {
    let accounts = state.accounts.lock().expect("accounts lock poisoned");
    let Some(account) = accounts
        .values()
        .find(|account| account.id_token == request.id_token)
    else {
        return error_response(StatusCode::BAD_REQUEST, "INVALID_ID_TOKEN");
    };

    Json(json!({
        "users": [{
            "localId": account.uid,
            "email": account.email,
            "displayName": account.display_name,
            "photoUrl": account.photo_url,
            "emailVerified": account.email_verified,
            "createdAt": account.created_at_ms.to_string(),
        }]
    }))
    .into_response()
}
