//! Ingest Adapter boundary: the core depends only on `acquire`, which
//! resolves a `Job` to a locally available video file. Drive/site adapters
//! stay external per scope; the core ships one concrete adapter for
//! `SourceKind::Upload`, the only source kind fully specifiable without an
//! external account or API.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::job::Job;

#[async_trait]
pub trait IngestAdapter: Send + Sync {
    async fn acquire(&self, job: &Job) -> Result<PathBuf>;
}

/// Resolves `job.source_ref` as a path to an already-local file, copying it
/// into the configured temp directory under the job's id so the
/// orchestrator's cleanup pass can own it independently of the original.
pub struct LocalFileIngestAdapter {
    temp_dir: PathBuf,
}

impl LocalFileIngestAdapter {
    pub fn new(temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            temp_dir: temp_dir.into(),
        }
    }
}

#[async_trait]
impl IngestAdapter for LocalFileIngestAdapter {
    async fn acquire(&self, job: &Job) -> Result<PathBuf> {
        let source = Path::new(&job.source_ref);
        if !source.is_file() {
            return Err(Error::msg(format!(
                "uploaded source {source:?} does not exist or is not a file"
            )));
        }

        tokio::fs::create_dir_all(&self.temp_dir)
            .await
            .map_err(|err| Error::msg(format!("failed to create temp dir: {err}")))?;

        let extension = source
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("mp4");
        let dest = self.temp_dir.join(format!("{}_video.{extension}", job.id));

        tokio::fs::copy(source, &dest)
            .await
            .map_err(|err| Error::msg(format!("failed to stage uploaded video: {err}")))?;

        Ok(dest)
    }
}
