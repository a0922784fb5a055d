//! Blob Store Facade (C5): folder creation, retried upload, best-effort
//! permissioning, and the deterministic thumbnail URL template.
//!
//! Retry/backoff with jitter ports `drive_service.py:upload_file`'s
//! `random.uniform(0, 1)` jitter term (base 1s, factor 2, 5 attempts); a
//! 401/403 mid-retry triggers one re-authentication attempt before the
//! remaining retries resume, matching the same function's credential-expiry
//! handling. Upload calls throttle to at least 0.5s apart via a
//! `tokio::sync::Mutex<Option<Instant>>`, the async analogue of a
//! rate-limiting lock around a blocking client.

use std::path::Path;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::{Error, Result};

const MAX_UPLOAD_ATTEMPTS: u32 = 5;
const BASE_BACKOFF: Duration = Duration::from_secs(1);
const MIN_UPLOAD_INTERVAL: Duration = Duration::from_millis(500);

/// Result of a successful upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResult {
    pub id: String,
    pub public_url: String,
}

/// The blob store boundary: folder/file lifecycle against whatever object
/// store backs it. Kept generic per the scope boundary — the core only
/// needs these four operations, never the specifics of any one provider.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn ensure_folder(&self, name: &str, parent: Option<&str>) -> Result<String>;
    async fn upload(
        &self,
        local_path: &Path,
        folder_id: &str,
        remote_name: &str,
    ) -> Result<UploadResult>;
    /// Best effort: failures are logged, never raised.
    async fn publicize(&self, id: &str);
    fn thumbnail_url(&self, id: &str) -> String;
}

/// `reqwest`-backed blob store against a configurable base URL.
pub struct HttpBlobStore {
    client: reqwest::Client,
    base_url: String,
    credentials: Mutex<String>,
    last_upload: Mutex<Option<Instant>>,
}

impl HttpBlobStore {
    pub fn new(base_url: impl Into<String>, credentials: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| Error::msg(format!("failed to build blob HTTP client: {err}")))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            credentials: Mutex::new(credentials.into()),
            last_upload: Mutex::new(None),
        })
    }

    async fn throttle(&self) {
        let mut last = self.last_upload.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < MIN_UPLOAD_INTERVAL {
                tokio::time::sleep(MIN_UPLOAD_INTERVAL - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    async fn reauthenticate(&self) -> Result<()> {
        let credentials = self.credentials.lock().await.clone();
        let response = self
            .client
            .post(format!("{}/v1/auth/refresh", self.base_url))
            .json(&serde_json::json!({ "credentials": credentials }))
            .send()
            .await
            .map_err(|err| Error::msg(format!("blob store re-authentication failed: {err}")))?;

        if !response.status().is_success() {
            return Err(Error::msg(format!(
                "blob store re-authentication rejected with status {}",
                response.status()
            )));
        }
        #[derive(Deserialize)]
        struct RefreshResponse {
            credentials: String,
        }
        let refreshed: RefreshResponse = response
            .json()
            .await
            .map_err(|err| Error::msg(format!("malformed re-authentication response: {err}")))?;
        *self.credentials.lock().await = refreshed.credentials;
        Ok(())
    }

    fn backoff_delay(attempt: u32) -> Duration {
        let exponential = BASE_BACKOFF * 2u32.pow(attempt);
        let jitter_ms = rand::thread_rng().gen_range(0..1000);
        exponential + Duration::from_millis(jitter_ms)
    }
}

#[derive(Serialize)]
struct EnsureFolderPayload<'a> {
    name: &'a str,
    parent: Option<&'a str>,
}

#[derive(Deserialize)]
struct EnsureFolderResponse {
    folder_id: String,
}

#[derive(Deserialize)]
struct UploadResponse {
    id: String,
    public_url: String,
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn ensure_folder(&self, name: &str, parent: Option<&str>) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/v1/folders", self.base_url))
            .json(&EnsureFolderPayload { name, parent })
            .send()
            .await
            .map_err(|err| Error::msg(format!("ensure_folder request failed: {err}")))?;

        let response = response
            .error_for_status()
            .map_err(|err| Error::msg(format!("ensure_folder rejected: {err}")))?;
        let body: EnsureFolderResponse = response
            .json()
            .await
            .map_err(|err| Error::msg(format!("malformed ensure_folder response: {err}")))?;
        Ok(body.folder_id)
    }

    async fn upload(
        &self,
        local_path: &Path,
        folder_id: &str,
        remote_name: &str,
    ) -> Result<UploadResult> {
        self.throttle().await;

        let mut reauthenticated_once = false;
        let mut last_error = None;

        for attempt in 0..MAX_UPLOAD_ATTEMPTS {
            let bytes = tokio::fs::read(local_path)
                .await
                .map_err(|err| Error::msg(format!("failed to read {local_path:?} for upload: {err}")))?;
            let part = reqwest::multipart::Part::bytes(bytes).file_name(remote_name.to_string());
            let form = reqwest::multipart::Form::new()
                .text("folder_id", folder_id.to_string())
                .part("file", part);

            let result = self
                .client
                .post(format!("{}/v1/upload", self.base_url))
                .multipart(form)
                .send()
                .await;

            match result {
                Ok(response) if response.status().is_success() => {
                    let body: UploadResponse = response
                        .json()
                        .await
                        .map_err(|err| Error::msg(format!("malformed upload response: {err}")))?;
                    return Ok(UploadResult {
                        id: body.id,
                        public_url: body.public_url,
                    });
                }
                Ok(response) => {
                    let status = response.status();
                    if (status.as_u16() == 401 || status.as_u16() == 403) && !reauthenticated_once
                    {
                        warn!(%status, "upload credentials expired, re-authenticating once");
                        reauthenticated_once = true;
                        if let Err(err) = self.reauthenticate().await {
                            last_error = Some(err.to_string());
                            continue;
                        }
                        continue;
                    }
                    last_error = Some(format!("upload rejected with status {status}"));
                }
                Err(err) => {
                    last_error = Some(err.to_string());
                }
            }

            if attempt + 1 < MAX_UPLOAD_ATTEMPTS {
                let delay = Self::backoff_delay(attempt);
                warn!(attempt, delay = ?delay, "upload attempt failed, retrying");
                tokio::time::sleep(delay).await;
            }
        }

        Err(Error::msg(format!(
            "upload of {local_path:?} failed after {MAX_UPLOAD_ATTEMPTS} attempts: {}",
            last_error.unwrap_or_default()
        )))
    }

    async fn publicize(&self, id: &str) {
        let result = self
            .client
            .post(format!("{}/v1/publicize/{id}", self.base_url))
            .send()
            .await;
        match result {
            Ok(response) if response.status().is_success() => {
                info!(id, "publicized blob");
            }
            Ok(response) => {
                warn!(id, status = %response.status(), "publicize rejected, proceeding anyway");
            }
            Err(err) => {
                warn!(id, %err, "publicize request failed, proceeding anyway");
            }
        }
    }

    fn thumbnail_url(&self, id: &str) -> String {
        format!("{}/thumbnail?id={id}&sz=w800", self.base_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thumbnail_url_matches_deterministic_template() {
        let store = HttpBlobStore::new("https://blobs.example.com", "creds").unwrap();
        assert_eq!(
            store.thumbnail_url("abc123"),
            "https://blobs.example.com/thumbnail?id=abc123&sz=w800"
        );
    }

    #[test]
    fn backoff_delay_grows_exponentially_before_jitter() {
        let zero = HttpBlobStore::backoff_delay(0);
        let one = HttpBlobStore::backoff_delay(1);
        assert!(zero >= Duration::from_secs(1) && zero < Duration::from_secs(2));
        assert!(one >= Duration::from_secs(2) && one < Duration::from_secs(3));
    }
}
