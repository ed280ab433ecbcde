//! Blob-storage fixture server: media upload and `alt=media` download,
//! held entirely in memory.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    content_type: String,
    token: String,
}

/// Shared state behind the storage fixture router
#[derive(Clone, Default)]
pub struct StorageState {
    /// Objects keyed by `{bucket}/{name}`
    objects: Arc<Mutex<HashMap<String, StoredObject>>>,
}

impl StorageState {
    pub fn new() -> Self {
        Self::default()
    }
}

pub fn storage_router(state: StorageState) -> Router {
    Router::new()
        .route("/v0/b/{bucket}/o", post(upload))
        .route("/v0/b/{bucket}/o/{object}", get(download))
        .with_state(state)
}

fn object_key(bucket: &str, name: &str) -> String {
    format!("{bucket}/{name}")
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

#[derive(Deserialize)]
struct UploadParams {
    name: String,
}

async fn upload(
    State(state): State<StorageState>,
    Path(bucket): Path<String>,
    Query(params): Query<UploadParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let authorized = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("Bearer "));
    if !authorized {
        return error_response(StatusCode::UNAUTHORIZED, "Missing bearer token");
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();

    let token = Uuid::new_v4().to_string();
    let size = body.len();
    state
        .objects
        .lock()
        .expect("objects lock poisoned")
        .insert(
            object_key(&bucket, &params.name),
            StoredObject {
                data: body.to_vec(),
                content_type: content_type.clone(),
                token: token.clone(),
            },
        );
    info!(%bucket, name = %params.name, size, "fixture blob stored");

    Json(json!({
        "name": params.name,
        "bucket": bucket,
        "contentType": content_type,
        "size": size.to_string(),
        "downloadTokens": token,
    }))
    .into_response()
}

#[derive(Deserialize)]
struct DownloadParams {
    #[serde(default)]
    alt: Option<String>,
    #[serde(default)]
    token: Option<String>,
}

async fn download(
    State(state): State<StorageState>,
    Path((bucket, object)): Path<(String, String)>,
    Query(params): Query<DownloadParams>,
) -> Response {
    if params.alt.as_deref() != Some("media") {
        return error_response(StatusCode::BAD_REQUEST, "Only alt=media is supported");
    }

    let objects = state.objects.lock().expect("objects lock poisoned");
    let Some(stored) = objects.get(&object_key(&bucket, &object)) else {
        return error_response(StatusCode::NOT_FOUND, "No such object");
    };
    if params.token.as_deref() != Some(stored.token.as_str()) {
        return error_response(StatusCode::FORBIDDEN, "Invalid download token");
    }

    (
        [(header::CONTENT_TYPE, stored.content_type.clone())],
        stored.data.clone(),
    )
        .into_response()
}
