use std::sync::Mutex;

use chrono::{TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::info;

use async_trait::async_trait;

use crate::backend::{IdentityBackend, SessionEvents};
use crate::config::CloudConfig;
use crate::error::{AuthError, AuthResult};
use crate::identity::{Identity, ProfileChanges};

/// Credential for the currently signed-in account. Held until sign-out
/// or until a later sign-in replaces it.
#[derive(Debug, Clone)]
struct Credential {
    uid: String,
    id_token: String,
}

/// [`IdentityBackend`] implementation over the hosted REST services.
///
/// One shared HTTP client with a request timeout serves every call. The
/// backend keeps the credential from the last successful sign-up or
/// sign-in and publishes session-change notifications on its watch
/// channel after each state-changing call succeeds.
pub struct CloudBackend {
    http: reqwest::Client,
    config: CloudConfig,
    credential: Mutex<Option<Credential>>,
    events: watch::Sender<Option<Identity>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    local_id: String,
    id_token: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateRequest<'a> {
    id_token: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    display_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    photo_url: Option<&'a str>,
    return_secure_token: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LookupRequest<'a> {
    id_token: &'a str,
}

#[derive(Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<AccountRecord>,
}

/// Account snapshot as the identity service reports it
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountRecord {
    local_id: String,
    email: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    photo_url: Option<String>,
    #[serde(default)]
    email_verified: bool,
    /// Epoch milliseconds as a decimal string
    #[serde(default)]
    created_at: Option<String>,
}

impl AccountRecord {
    fn into_identity(self) -> Identity {
        let created_at = self
            .created_at
            .and_then(|ms| ms.parse::<i64>().ok())
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .unwrap_or_else(Utc::now);
        Identity {
            uid: self.local_id,
            email: self.email,
            display_name: self.display_name,
            photo_url: self.photo_url,
            email_verified: self.email_verified,
            created_at,
        }
    }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    name: String,
    download_tokens: String,
}

impl CloudBackend {
    pub fn new(config: CloudConfig) -> AuthResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .use_rustls_tls()
            .build()
            .map_err(|e| AuthError::Unavailable(format!("failed to build http client: {e}")))?;
        let (events, _) = watch::channel(None);

        Ok(Self {
            http,
            config,
            credential: Mutex::new(None),
            events,
        })
    }

    fn identity_endpoint(&self, op: &str) -> String {
        format!(
            "{}/v1/accounts:{}?key={}",
            self.config.identity_url, op, self.config.api_key
        )
    }

    async fn call_identity<Req, Resp>(&self, op: &str, body: &Req) -> AuthResult<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let response = self
            .http
            .post(self.identity_endpoint(op))
            .json(body)
            .send()
            .await
            .map_err(|e| AuthError::Unavailable(format!("identity request failed: {e}")))?;

        if response.status().is_success() {
            response
                .json::<Resp>()
                .await
                .map_err(|e| AuthError::Unavailable(format!("malformed identity response: {e}")))
        } else {
            Err(map_error_response(response).await)
        }
    }

    async fn lookup(&self, id_token: &str) -> AuthResult<Identity> {
        let response: LookupResponse = self
            .call_identity("lookup", &LookupRequest { id_token })
            .await?;
        response
            .users
            .into_iter()
            .next()
            .map(AccountRecord::into_identity)
            .ok_or_else(|| AuthError::AuthFailed("account lookup returned no users".to_string()))
    }

    /// Shared by sign-up and sign-in: exchange credentials for a token,
    /// fetch the full account snapshot, then store the credential and
    /// notify subscribers.
    async fn authenticate(&self, op: &str, email: &str, password: &str) -> AuthResult<Identity> {
        let token: TokenResponse = self
            .call_identity(
                op,
                &PasswordRequest {
                    email,
                    password,
                    return_secure_token: true,
                },
            )
            .await?;
        let identity = self.lookup(&token.id_token).await?;

        *self.credential.lock().expect("credential lock poisoned") = Some(Credential {
            uid: token.local_id,
            id_token: token.id_token,
        });
        self.events.send_replace(Some(identity.clone()));
        info!(uid = %identity.uid, "backend session established");
        Ok(identity)
    }

    fn current_credential(&self) -> Option<Credential> {
        self.credential
            .lock()
            .expect("credential lock poisoned")
            .clone()
    }
}

/// Parse an identity-service error payload into the closed taxonomy.
/// Bodies that are not the expected envelope map to `Unavailable` for
/// server errors and `AuthFailed` otherwise.
async fn map_error_response(response: reqwest::Response) -> AuthError {
    let status = response.status();
    match response.json::<ErrorEnvelope>().await {
        Ok(envelope) => AuthError::from_backend_code(&envelope.error.message),
        Err(_) if status.is_server_error() => {
            AuthError::Unavailable(format!("identity service returned {status}"))
        }
        Err(_) => AuthError::AuthFailed(format!("identity service returned {status}")),
    }
}

#[async_trait]
impl IdentityBackend for CloudBackend {
    async fn create_account(&self, email: &str, password: &str) -> AuthResult<Identity> {
        self.authenticate("signUp", email, password).await
    }

    async fn sign_in(&self, email: &str, password: &str) -> AuthResult<Identity> {
        self.authenticate("signInWithPassword", email, password)
            .await
    }

    async fn sign_out(&self) -> AuthResult<()> {
        let had_session = self
            .credential
            .lock()
            .expect("credential lock poisoned")
            .take()
            .is_some();
        if had_session {
            info!("backend session cleared");
        }
        self.events.send_replace(None);
        Ok(())
    }

    async fn update_profile(&self, uid: &str, changes: ProfileChanges) -> AuthResult<Identity> {
        let credential = self
            .current_credential()
            .ok_or_else(|| AuthError::AuthFailed("no active session for profile update".to_string()))?;
        if credential.uid != uid {
            return Err(AuthError::AuthFailed(
                "profile update for an account other than the signed-in one".to_string(),
            ));
        }

        let _applied: serde_json::Value = self
            .call_identity(
                "update",
                &UpdateRequest {
                    id_token: &credential.id_token,
                    display_name: changes.display_name.as_deref(),
                    photo_url: changes.photo_url.as_deref(),
                    return_secure_token: false,
                },
            )
            .await?;

        let identity = self.lookup(&credential.id_token).await?;
        self.events.send_replace(Some(identity.clone()));
        info!(uid = %identity.uid, "profile updated");
        Ok(identity)
    }

    async fn upload_blob(
        &self,
        data: Vec<u8>,
        content_type: &str,
        path: &str,
    ) -> AuthResult<String> {
        let credential = self
            .current_credential()
            .ok_or_else(|| AuthError::UploadFailed("no active session for upload".to_string()))?;

        let upload_url = format!(
            "{}/v0/b/{}/o?uploadType=media&name={}",
            self.config.storage_url,
            self.config.bucket,
            urlencoding::encode(path)
        );
        let response = self
            .http
            .post(&upload_url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Bearer {}", credential.id_token),
            )
            .body(data)
            .send()
            .await
            .map_err(|e| AuthError::UploadFailed(format!("storage request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read error response".to_string());
            return Err(AuthError::UploadFailed(format!(
                "storage service returned {status}: {error_text}"
            )));
        }

        let upload: UploadResponse = response
            .json()
            .await
            .map_err(|e| AuthError::UploadFailed(format!("malformed storage response: {e}")))?;

        let url = format!(
            "{}/v0/b/{}/o/{}?alt=media&token={}",
            self.config.storage_url,
            self.config.bucket,
            urlencoding::encode(&upload.name),
            upload.download_tokens
        );
        info!(%path, "blob uploaded");
        Ok(url)
    }

    fn subscribe(&self) -> SessionEvents {
        self.events.subscribe()
    }
}
