//! The `LmTransport` trait boundary: JSON-over-HTTPS request/response
//! against a remote endpoint that accepts mixed text+image+audio payloads
//! (spec §6, "LM Transport"). Letting this be a trait is what lets
//! `LmClient` be exercised in tests against a fake, without network access —
//! mirroring how `scribble::Backend` lets `Scribble<B>` be tested with a
//! `DummyBackend`.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::{Error, Result};

/// A single request to the LM: a text prompt plus optional media payloads.
/// Exactly one of `image_paths`/`audio_path` is populated per call site
/// (vision calls vs. the transcription call); most calls carry neither.
#[derive(Debug, Clone, Serialize)]
pub struct LmRequest {
    pub model_id: String,
    pub prompt: String,
    #[serde(skip)]
    pub image_paths: Vec<PathBuf>,
    #[serde(skip)]
    pub audio_path: Option<PathBuf>,
}

impl LmRequest {
    pub fn text(model_id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            prompt: prompt.into(),
            image_paths: Vec::new(),
            audio_path: None,
        }
    }

    pub fn with_images(mut self, paths: Vec<PathBuf>) -> Self {
        self.image_paths = paths;
        self
    }

    pub fn with_audio(mut self, path: PathBuf) -> Self {
        self.audio_path = Some(path);
        self
    }
}

/// The LM transport boundary: send a request, get raw text back. JSON
/// parsing/repair lives in `LmClient`, one layer up — the transport only
/// knows about bytes over the wire.
#[async_trait]
pub trait LmTransport: Send + Sync {
    async fn generate(&self, request: LmRequest) -> anyhow::Result<String>;
}

/// `reqwest`-backed transport against a configurable base URL.
pub struct HttpLmTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpLmTransport {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|err| Error::msg(format!("failed to build LM HTTP client: {err}")))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[derive(Serialize)]
struct GeneratePayload {
    model: String,
    prompt: String,
    images_b64: Vec<String>,
    audio_b64: Option<String>,
}

#[derive(serde::Deserialize)]
struct GenerateResponse {
    text: String,
}

#[async_trait]
impl LmTransport for HttpLmTransport {
    async fn generate(&self, request: LmRequest) -> anyhow::Result<String> {
        use base64::Engine;
        let encoder = base64::engine::general_purpose::STANDARD;

        let mut images_b64 = Vec::with_capacity(request.image_paths.len());
        for path in &request.image_paths {
            let bytes = tokio::fs::read(path)
                .await
                .map_err(|err| anyhow::anyhow!("failed to read image {path:?}: {err}"))?;
            images_b64.push(encoder.encode(bytes));
        }
        let audio_b64 = match &request.audio_path {
            Some(path) => {
                let bytes = tokio::fs::read(path)
                    .await
                    .map_err(|err| anyhow::anyhow!("failed to read audio {path:?}: {err}"))?;
                Some(encoder.encode(bytes))
            }
            None => None,
        };

        let payload = GeneratePayload {
            model: request.model_id,
            prompt: request.prompt,
            images_b64,
            audio_b64,
        };

        let response = self
            .client
            .post(format!("{}/v1/generate", self.base_url))
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;

        let body: GenerateResponse = response.json().await?;
        Ok(body.text)
    }
}
