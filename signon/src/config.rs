use std::time::Duration;

use thiserror::Error;

/// Default per-request timeout for backend calls
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} environment variable not set")]
    MissingVar(&'static str),
}

/// Connection settings for the hosted identity and storage services.
#[derive(Debug, Clone)]
pub struct CloudConfig {
    /// Base URL of the identity service
    pub identity_url: String,
    /// Base URL of the blob storage service
    pub storage_url: String,
    /// API key appended to every identity request
    pub api_key: String,
    /// Storage bucket holding profile images
    pub bucket: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl CloudConfig {
    pub fn new(
        identity_url: impl Into<String>,
        storage_url: impl Into<String>,
        api_key: impl Into<String>,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            identity_url: trim_trailing_slash(identity_url.into()),
            storage_url: trim_trailing_slash(storage_url.into()),
            api_key: api_key.into(),
            bucket: bucket.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let identity_url =
            std::env::var("IDENTITY_URL").map_err(|_| ConfigError::MissingVar("IDENTITY_URL"))?;
        let storage_url =
            std::env::var("STORAGE_URL").map_err(|_| ConfigError::MissingVar("STORAGE_URL"))?;
        let api_key = std::env::var("IDENTITY_API_KEY")
            .map_err(|_| ConfigError::MissingVar("IDENTITY_API_KEY"))?;
        let bucket =
            std::env::var("STORAGE_BUCKET").map_err(|_| ConfigError::MissingVar("STORAGE_BUCKET"))?;

        Ok(Self::new(identity_url, storage_url, api_key, bucket))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

fn trim_trailing_slash(mut url: String) -> String {
    while url.ends_with('/') {
        url.pop();
    }
    url
}
