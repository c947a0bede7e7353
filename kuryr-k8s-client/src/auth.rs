//! Credential material derived from [`crate::config::AuthConfig`].
//!
//! A bearer token is re-read from disk lazily rather than cached for the
//! process lifetime, since the kubelet rotates a mounted service-account
//! token in place without restarting anything that reads it.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use secrecy::{ExposeSecret, SecretString};
use tokio::sync::Mutex;

use crate::error::ClientError;

/// How long a cached bearer token is trusted before it's re-read from disk.
const TOKEN_CACHE_TTL: Duration = Duration::from_secs(60);

/// A bearer token lazily re-read from a file, cached for [`TOKEN_CACHE_TTL`].
pub struct TokenFile {
    path: PathBuf,
    cached: Mutex<Option<(SecretString, Instant)>>,
}

impl TokenFile {
    /// Builds a reader for the token at `path`. Does not read the file yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cached: Mutex::new(None),
        }
    }

    /// Returns the current token, re-reading the file if the cached value
    /// has expired or none has been read yet.
    pub async fn get(&self) -> Result<SecretString, ClientError> {
        let mut cached = self.cached.lock().await;
        if let Some((token, read_at)) = cached.as_ref() {
            if read_at.elapsed() < TOKEN_CACHE_TTL {
                return Ok(token.clone());
            }
        }
        let token = read_token(&self.path).await?;
        *cached = Some((token.clone(), Instant::now()));
        Ok(token)
    }
}

async fn read_token(path: &Path) -> Result<SecretString, ClientError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ClientError::Credentials {
            path: path.display().to_string(),
            source: Box::new(e),
        })?;
    Ok(SecretString::from(text.trim().to_string()))
}

/// Renders the `Authorization` header value for a bearer token.
pub fn bearer_header_value(token: &SecretString) -> String {
    format!("Bearer {}", token.expose_secret())
}
