use std::path::PathBuf;

use crate::error::{AuthError, AuthResult};

/// A local image handle selected by the caller, consumed by a single
/// upload. Not persisted anywhere.
#[derive(Debug, Clone)]
pub enum ImageSource {
    /// Image file on the local filesystem
    Path(PathBuf),
    /// Raw bytes already in memory, with an optional content type
    Bytes {
        data: Vec<u8>,
        content_type: Option<String>,
    },
}

impl ImageSource {
    /// Load the bytes and determine a content type.
    ///
    /// Sniffing the bytes wins over the filename extension; when neither
    /// yields anything the type falls back to `application/octet-stream`.
    pub async fn read(self) -> AuthResult<(Vec<u8>, String)> {
        match self {
            ImageSource::Path(path) => {
                let data = tokio::fs::read(&path).await.map_err(|e| {
                    AuthError::UploadFailed(format!("failed to read {}: {e}", path.display()))
                })?;
                let content_type = infer::get(&data)
                    .map(|kind| kind.mime_type().to_string())
                    .unwrap_or_else(|| {
                        mime_guess::from_path(&path)
                            .first_or_octet_stream()
                            .essence_str()
                            .to_string()
                    });
                Ok((data, content_type))
            }
            ImageSource::Bytes { data, content_type } => {
                let content_type = content_type
                    .or_else(|| infer::get(&data).map(|kind| kind.mime_type().to_string()))
                    .unwrap_or_else(|| "application/octet-stream".to_string());
                Ok((data, content_type))
            }
        }
    }
}
