//! Process-wide configuration.
//!
//! Every knob enumerated in the external-interfaces section of the system this
//! crate implements lives here. Defaults mirror the reference service's
//! configuration defaults (chunk/overlap/keyframe timings, sample rate,
//! concurrency caps).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Process-wide configuration for the pipeline.
///
/// Deserializable from JSON (or any serde-compatible format) via [`Config::from_json`],
/// or built programmatically and passed to [`crate::orchestrator::Orchestrator::new`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Cap on concurrent chunk transcriptions.
    pub max_concurrent_transcribes: usize,
    /// Cap on concurrent vision calls (gatekeeper + cluster description).
    pub max_concurrent_vision_tasks: usize,
    /// Cap on concurrent blob uploads.
    pub max_concurrent_uploads: usize,

    /// Length of each audio chunk fed to the transcriber, in seconds.
    pub max_audio_chunk_duration_s: f64,
    /// Overlap between consecutive audio chunks, in seconds.
    pub audio_overlap_duration_s: f64,
    /// Interval for `extract_keyframes`'s uniform sampling, in seconds.
    ///
    /// The orchestrator's coarse-sampling stage uses a fixed 30s interval at
    /// its call site regardless of this value; see
    /// [`crate::orchestrator::COARSE_SAMPLE_INTERVAL_S`].
    pub keyframe_interval_s: f64,
    /// Target sample rate for extracted audio, in Hz.
    pub audio_sample_rate_hz: u32,

    /// Directory for transient on-disk artifacts (downloaded video, audio,
    /// chunks, frame JPEGs).
    pub temp_dir: PathBuf,

    /// Identifier of the LM model to request from the transport.
    pub lm_model_id: String,
    /// Base URL the `LmTransport` implementation talks to.
    pub lm_base_url: String,

    /// Base URL the `BlobStore` implementation talks to.
    pub blob_base_url: String,

    /// Allowed CORS origins for the HTTP surface (carried here, consumed only
    /// by the optional `server` binary).
    pub cors_origins: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrent_transcribes: 2,
            max_concurrent_vision_tasks: 2,
            max_concurrent_uploads: 3,
            max_audio_chunk_duration_s: 300.0,
            audio_overlap_duration_s: 30.0,
            keyframe_interval_s: 60.0,
            audio_sample_rate_hz: 16_000,
            temp_dir: PathBuf::from("temp"),
            lm_model_id: String::new(),
            lm_base_url: String::new(),
            blob_base_url: String::new(),
            cors_origins: Vec::new(),
        }
    }
}

impl Config {
    /// Parse a `Config` from a JSON document, falling back to defaults for
    /// any field the document omits.
    pub fn from_json(data: &str) -> crate::error::Result<Self> {
        Ok(serde_json::from_str(data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_service() {
        let cfg = Config::default();
        assert_eq!(cfg.max_concurrent_transcribes, 2);
        assert_eq!(cfg.max_concurrent_vision_tasks, 2);
        assert_eq!(cfg.max_concurrent_uploads, 3);
        assert_eq!(cfg.max_audio_chunk_duration_s, 300.0);
        assert_eq!(cfg.audio_overlap_duration_s, 30.0);
        assert_eq!(cfg.keyframe_interval_s, 60.0);
        assert_eq!(cfg.audio_sample_rate_hz, 16_000);
    }

    #[test]
    fn partial_json_fills_remaining_defaults() {
        let cfg = Config::from_json(r#"{"max_concurrent_uploads": 7}"#).unwrap();
        assert_eq!(cfg.max_concurrent_uploads, 7);
        assert_eq!(cfg.max_concurrent_transcribes, 2);
    }
}
