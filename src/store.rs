//! Job Store Facade (C6): create/read/update job records with an atomic
//! log-append + field-set patch, mirroring a document store's `$set` +
//! `$push` semantics over a single document keyed by `id`.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::job::{Job, JobPatch, LogEntry};

/// The persistence boundary: job documents keyed by `id`. The core ships
/// only `InMemoryJobStore`; a real document database is external per scope.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create(&self, job: Job) -> Result<Uuid>;
    async fn read(&self, id: Uuid) -> Result<Job>;
    /// Apply `patch` atomically: every `Some` field overwrites, `log_entry`
    /// appends rather than replaces, and `updated_at` is always refreshed
    /// regardless of what the patch carries.
    async fn update(&self, id: Uuid, patch: JobPatch) -> Result<()>;
}

/// A `tokio::sync::Mutex`-guarded in-memory map, idempotent under retry
/// since every write is keyed by `id` and replaces the stored value wholesale.
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: tokio::sync::Mutex<HashMap<Uuid, Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, job: Job) -> Result<Uuid> {
        let id = job.id;
        self.jobs.lock().await.insert(id, job);
        Ok(id)
    }

    async fn read(&self, id: Uuid) -> Result<Job> {
        self.jobs
            .lock()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::msg(format!("no job found for id {id}")))
    }

    async fn update(&self, id: Uuid, patch: JobPatch) -> Result<()> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs
            .get_mut(&id)
            .ok_or_else(|| Error::msg(format!("no job found for id {id}")))?;

        if let Some(status) = patch.status {
            job.status = status;
        }
        if let Some(progress) = patch.progress {
            job.progress = progress;
        }
        if let Some(current_action) = patch.current_action {
            job.current_action = current_action;
        }
        if let Some(message) = patch.log_entry {
            job.log.push(LogEntry {
                message,
                time: Utc::now(),
            });
        }
        if let Some(duration_seconds) = patch.duration_seconds {
            job.duration_seconds = duration_seconds;
        }
        if let Some(transcript) = patch.transcript {
            job.transcript = transcript;
        }
        if let Some(topics) = patch.topics {
            job.topics = topics;
        }
        if let Some(frames) = patch.frames {
            job.frames = frames;
        }
        if let Some(entities) = patch.entities {
            job.entities = entities;
        }
        if let Some(executive_summary) = patch.executive_summary {
            job.executive_summary = Some(executive_summary);
        }
        if let Some(key_takeaways) = patch.key_takeaways {
            job.key_takeaways = key_takeaways;
        }
        if let Some(slide_summary) = patch.slide_summary {
            job.slide_summary = slide_summary;
        }
        if let Some(genre) = patch.genre {
            job.genre = Some(genre);
        }
        if let Some(genre_confidence) = patch.genre_confidence {
            job.genre_confidence = Some(genre_confidence);
        }
        if let Some(genre_reason) = patch.genre_reason {
            job.genre_reason = Some(genre_reason);
        }
        if let Some(error_message) = patch.error_message {
            job.error_message = Some(error_message);
        }

        job.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::SourceKind;

    #[tokio::test]
    async fn create_then_read_round_trips() {
        let store = InMemoryJobStore::new();
        let job = Job::new(SourceKind::Upload, "video.mp4");
        let id = store.create(job.clone()).await.unwrap();
        let read_back = store.read(id).await.unwrap();
        assert_eq!(read_back.id, job.id);
    }

    #[tokio::test]
    async fn update_appends_log_and_sets_fields_atomically() {
        let store = InMemoryJobStore::new();
        let job = Job::new(SourceKind::Upload, "video.mp4");
        let id = store.create(job).await.unwrap();

        let patch = JobPatch::new().with_action("extracting", "starting audio extraction");
        store.update(id, patch).await.unwrap();

        let updated = store.read(id).await.unwrap();
        assert_eq!(updated.current_action, "extracting");
        assert_eq!(updated.log.len(), 1);
        assert_eq!(updated.log[0].message, "starting audio extraction");
    }

    #[tokio::test]
    async fn update_always_refreshes_updated_at() {
        let store = InMemoryJobStore::new();
        let job = Job::new(SourceKind::Upload, "video.mp4");
        let created_at = job.updated_at;
        let id = store.create(job).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store.update(id, JobPatch::new().with_progress(0.5)).await.unwrap();

        let updated = store.read(id).await.unwrap();
        assert!(updated.updated_at > created_at);
    }

    #[tokio::test]
    async fn update_on_unknown_id_errors() {
        let store = InMemoryJobStore::new();
        let result = store.update(Uuid::new_v4(), JobPatch::new()).await;
        assert!(result.is_err());
    }
}
