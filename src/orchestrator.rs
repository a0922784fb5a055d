//! Pipeline Orchestrator (C7): the stage machine driving a single job
//! end-to-end through the four-phase filter cascade, interleaved with
//! transcription, synthesis, and the bounded-concurrency upload fan-out.
//!
//! The orchestrator is the only component that owns a mutable `Job`; every
//! other component (`MediaToolkit`, `LmClient`, `BlobStore`, `JobStore`,
//! `IngestAdapter`) is stateless and receives only the slices it needs, the
//! same separation `scribble::Scribble<B>` keeps from its `Backend`.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::blob::BlobStore;
use crate::concurrency::{Cancellation, Pools, fan_out_ordered};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::image_utils;
use crate::ingest::IngestAdapter;
use crate::job::{FrameKind, HeroFrame, Job, JobPatch, JobStatus, SubTopic};
use crate::lm::LmClient;
use crate::lm::types::{TopicRange, TopicVisualMapping, VisualSubTopicInput};
use crate::media::{MediaToolkit, format_timestamp};
use crate::reconcile;
use crate::roi;
use crate::store::JobStore;

/// The coarse-sampling call site's authoritative interval; see
/// `Config::keyframe_interval_s`'s doc comment for why this isn't that field.
pub const COARSE_SAMPLE_INTERVAL_S: f64 = 30.0;
const CLUSTER_HAMMING_THRESHOLD: u32 = 12;
const DENSE_FPS: f64 = 1.0;
const SYNTHESIS_PRESERVATION_RATIO: f64 = 0.8;

pub struct Orchestrator {
    config: Config,
    media: MediaToolkit,
    lm: LmClient,
    blob: Arc<dyn BlobStore>,
    store: Arc<dyn JobStore>,
    ingest: Arc<dyn IngestAdapter>,
    pools: Pools,
}

impl Orchestrator {
    pub fn new(
        config: Config,
        media: MediaToolkit,
        lm: LmClient,
        blob: Arc<dyn BlobStore>,
        store: Arc<dyn JobStore>,
        ingest: Arc<dyn IngestAdapter>,
    ) -> Self {
        let pools = Pools::new(&config);
        Self {
            config,
            media,
            lm,
            blob,
            store,
            ingest,
            pools,
        }
    }

    /// Run a job to completion. On any failure (including cancellation),
    /// the job transitions to `Failed` with `error_message` set; the
    /// stage-level error is also returned to the caller.
    pub async fn run(&self, job_id: Uuid, cancellation: &Cancellation) -> Result<()> {
        match self.run_stages(job_id, cancellation).await {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!(%job_id, %err, "job failed");
                let failure_message = err.to_string();
                let _ = self
                    .store
                    .update(
                        job_id,
                        JobPatch {
                            status: Some(JobStatus::Failed),
                            error_message: Some(failure_message.clone()),
                            ..JobPatch::new()
                                .with_action("failed", failure_message)
                                .with_progress(1.0)
                        },
                    )
                    .await;
                Err(err)
            }
        }
    }

    fn checkpoint(&self, cancellation: &Cancellation) -> Result<()> {
        if cancellation.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    async fn patch(&self, job_id: Uuid, patch: JobPatch) -> Result<()> {
        self.store.update(job_id, patch).await
    }

    async fn run_stages(&self, job_id: Uuid, cancellation: &Cancellation) -> Result<()> {
        let frames_dir = self.config.temp_dir.join(format!("{job_id}_frames"));
        let audio_path = self.config.temp_dir.join(format!("{job_id}_audio.wav"));

        // 1. Download/acquire (0.05 -> 0.10).
        self.checkpoint(cancellation)?;
        let job = self.store.read(job_id).await?;
        let video_path = self.ingest.acquire(&job).await?;
        let duration = self.media.probe_duration(&video_path).await;
        info!(%job_id, duration, "acquired source video");
        self.patch(
            job_id,
            JobPatch {
                status: Some(JobStatus::Downloading),
                duration_seconds: Some(duration),
                ..JobPatch::new().with_action("acquired", "resolved source video").with_progress(0.10)
            },
        )
        .await?;

        // 2. Extract audio (0.15 -> 0.25).
        self.checkpoint(cancellation)?;
        self.patch(
            job_id,
            JobPatch {
                status: Some(JobStatus::Extracting),
                ..JobPatch::new().with_action("extracting", "extracting audio track").with_progress(0.15)
            },
        )
        .await?;
        self.media
            .extract_audio(&video_path, &audio_path, self.config.audio_sample_rate_hz)
            .await?;
        self.patch(job_id, JobPatch::new().with_progress(0.25)).await?;

        // 3. Transcribe (0.30 -> 0.50).
        self.checkpoint(cancellation)?;
        self.patch(
            job_id,
            JobPatch {
                status: Some(JobStatus::Transcribing),
                ..JobPatch::new().with_action("transcribing", "splitting audio into chunks").with_progress(0.30)
            },
        )
        .await?;
        let chunks = self
            .media
            .split_audio(
                &audio_path,
                self.config.max_audio_chunk_duration_s,
                self.config.audio_overlap_duration_s,
            )
            .await?;

        let lm = self.lm.clone();
        let transcribe_pool = self.pools.transcribe.clone();
        let chunk_segments = fan_out_ordered(chunks, &transcribe_pool, move |_idx, (path, start, end)| {
            let lm = lm.clone();
            async move { lm.transcribe_chunk(&path, start, end - start).await }
        })
        .await;

        let transcript = reconcile::dedup_segments(chunk_segments.into_iter().flatten().collect());
        self.patch(
            job_id,
            JobPatch::new()
                .with_transcript(transcript.clone())
                .with_progress(0.50),
        )
        .await?;

        // 4. Audio-cue scout + transcript analysis + genre (0.50 -> 0.60).
        self.checkpoint(cancellation)?;
        self.patch(
            job_id,
            JobPatch {
                status: Some(JobStatus::Analyzing),
                ..JobPatch::new().with_action("analyzing", "classifying genre and analyzing transcript")
            },
        )
        .await?;
        let transcript_text: String = transcript
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        let genre_result = self.lm.classify_genre(&transcript_text, duration).await;
        let (analysis, audio_cues) = tokio::join!(
            self.lm.analyze_transcript(&transcript_text, duration, genre_result.genre),
            self.lm.audio_cue_scout(&transcript),
        );
        let analyzed_topics = reconcile::ad_filter(analysis.topics);

        self.patch(
            job_id,
            JobPatch {
                genre: Some(genre_result.genre.key().to_string()),
                genre_confidence: Some(genre_result.confidence),
                genre_reason: Some(genre_result.reason),
                ..JobPatch::new()
                    .with_topics(analyzed_topics.clone())
                    .with_entities(analysis.entities)
                    .with_key_takeaways(analysis.key_takeaways)
                    .with_progress(0.60)
            },
        )
        .await?;

        // 5. Coarse visual sampling + parallel gatekeeper (0.65 -> 0.70).
        self.checkpoint(cancellation)?;
        let coarse_frames = self
            .media
            .extract_keyframes(&video_path, &frames_dir, COARSE_SAMPLE_INTERVAL_S)
            .await?;

        let lm = self.lm.clone();
        let vision_pool = self.pools.vision.clone();
        let verdicts = fan_out_ordered(coarse_frames, &vision_pool, move |_idx, (path, ts)| {
            let lm = lm.clone();
            async move {
                let verdict = lm.gatekeeper_frame(&path).await;
                (path, ts, verdict)
            }
        })
        .await;

        let useful_frames: Vec<(PathBuf, f64)> = verdicts
            .into_iter()
            .filter(|(_, _, verdict)| verdict.is_useful)
            .map(|(path, ts, _)| (path, ts))
            .collect();
        self.patch(job_id, JobPatch::new().with_progress(0.70)).await?;

        // 6. ROI fusion + dense resample inside merged windows at 1 fps.
        self.checkpoint(cancellation)?;
        let mut events: Vec<f64> = audio_cues.iter().map(|cue| cue.timestamp_s).collect();
        events.extend(useful_frames.iter().map(|(_, ts)| *ts));
        let windows = roi::merge_time_windows(&events, duration, roi::DEFAULT_BUFFER_S, roi::DEFAULT_MIN_GAP);

        let dense_frames = if windows.is_empty() {
            Vec::new()
        } else {
            self.media
                .extract_dense_frames(&video_path, &frames_dir, &windows, DENSE_FPS)
                .await?
        };

        // 7. Clustering over the union, deduplicated by integer second (dense wins).
        self.checkpoint(cancellation)?;
        let mut by_second: BTreeMap<i64, (PathBuf, f64)> = BTreeMap::new();
        for (path, ts) in useful_frames {
            by_second.insert(ts.round() as i64, (path, ts));
        }
        for (path, ts) in dense_frames {
            by_second.insert(ts.round() as i64, (path, ts));
        }
        let mut combined: Vec<(PathBuf, f64)> = by_second.into_values().collect();
        combined.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap());
        let clusters = image_utils::cluster(&combined, CLUSTER_HAMMING_THRESHOLD);

        // 8. Hero selection per cluster via C4 (vision pool).
        self.checkpoint(cancellation)?;
        let lm = self.lm.clone();
        let vision_pool = self.pools.vision.clone();
        let descriptions = fan_out_ordered(clusters.clone(), &vision_pool, move |_idx, cluster| {
            let lm = lm.clone();
            async move {
                let candidate_paths: Vec<PathBuf> =
                    cluster.candidates.iter().map(|c| c.path.clone()).collect();
                lm.describe_cluster(&candidate_paths, cluster.start_s, cluster.end_s).await
            }
        })
        .await;

        // 9. Parallel hero upload (0.70 -> 0.85): one folder per job, upload pool.
        let folder_id = self.blob.ensure_folder(&job_id.to_string(), None).await?;
        let blob = Arc::clone(&self.blob);
        let upload_pool = self.pools.upload.clone();
        let upload_items: Vec<_> = clusters.into_iter().zip(descriptions.iter().cloned()).collect();
        let hero_frames = fan_out_ordered(upload_items, &upload_pool, move |idx, (cluster, desc)| {
            let blob = Arc::clone(&blob);
            let folder_id = folder_id.clone();
            async move {
                let hero_index = desc.hero_index.min(cluster.candidates.len().saturating_sub(1));
                let candidate = &cluster.candidates[hero_index];
                let remote_name = format!("frame_{idx}.jpg");
                match blob.upload(&candidate.path, &folder_id, &remote_name).await {
                    Ok(uploaded) => {
                        blob.publicize(&uploaded.id).await;
                        HeroFrame {
                            timestamp_s: candidate.timestamp_s,
                            local_path: Some(candidate.path.clone()),
                            blob_url: uploaded.public_url,
                            description: desc.visual_summary.clone(),
                            ocr_text: desc.ocr_keywords.join(", "),
                            kind: FrameKind::Other,
                        }
                    }
                    Err(err) => {
                        warn!(idx, %err, "hero upload failed, keeping placeholder frame");
                        HeroFrame {
                            timestamp_s: candidate.timestamp_s,
                            local_path: Some(candidate.path.clone()),
                            blob_url: String::new(),
                            description: "Analysis failed".to_string(),
                            ocr_text: String::new(),
                            kind: FrameKind::Other,
                        }
                    }
                }
            }
        })
        .await;

        self.patch(
            job_id,
            JobPatch::new().with_frames(hero_frames.clone()).with_progress(0.85),
        )
        .await?;

        // 10. Synthesis + ad-refilter (0.85 -> 0.90).
        self.checkpoint(cancellation)?;
        self.patch(
            job_id,
            JobPatch {
                status: Some(JobStatus::Synthesizing),
                ..JobPatch::new().with_action("synthesizing", "producing final report")
            },
        )
        .await?;
        let frame_summary: String = hero_frames
            .iter()
            .map(|f| format!("[{}] {}", format_timestamp(f.timestamp_s), f.description))
            .collect::<Vec<_>>()
            .join("\n");

        let mut final_topics = analyzed_topics;
        let mut executive_summary = None;
        let mut key_takeaways = Vec::new();
        let mut entities = crate::job::Entities::default();

        if let Some(synthesis) = self
            .lm
            .synthesize(&transcript_text, &frame_summary, duration, genre_result.genre)
            .await
        {
            let input_topic_count = final_topics.len();
            let filtered = reconcile::ad_filter(synthesis.topics);
            let preserved_enough =
                input_topic_count == 0 || filtered.len() as f64 >= SYNTHESIS_PRESERVATION_RATIO * input_topic_count as f64;
            if preserved_enough {
                final_topics = filtered;
            } else {
                warn!(
                    input_topic_count,
                    synthesized = filtered.len(),
                    "synthesis dropped too many topics, keeping analyzer's topics"
                );
            }
            executive_summary = Some(synthesis.executive_summary);
            key_takeaways = synthesis.key_takeaways;
            entities = synthesis.entities;
        }

        self.patch(
            job_id,
            JobPatch::new()
                .with_topics(final_topics.clone())
                .with_entities(entities)
                .with_key_takeaways(key_takeaways.clone())
                .with_progress(0.90)
                .maybe_executive_summary(executive_summary.clone()),
        )
        .await?;

        // 11. Topic<->visual mapping.
        self.checkpoint(cancellation)?;
        let topic_ranges: Vec<TopicRange> = final_topics
            .iter()
            .map(|t| TopicRange {
                title: t.title.clone(),
                start_s: t.start_s,
                end_s: t.end_s,
            })
            .collect();
        let visual_sub_topics: Vec<VisualSubTopicInput> = descriptions
            .iter()
            .zip(hero_frames.iter())
            .enumerate()
            .map(|(idx, (desc, frame))| VisualSubTopicInput {
                title: desc.sub_topic_title.clone(),
                summary: desc.visual_summary.clone(),
                timestamp_s: frame.timestamp_s,
                original_index: idx,
            })
            .collect();

        let mappings = match self.lm.map_topics_to_visuals(&topic_ranges, &visual_sub_topics).await {
            Some(mappings) => mappings,
            None => reconcile::fallback_map_topics(&topic_ranges, &visual_sub_topics),
        };

        let mappings_by_title: std::collections::HashMap<&str, &TopicVisualMapping> =
            mappings.iter().map(|m| (m.topic_title.as_str(), m)).collect();

        for topic in final_topics.iter_mut() {
            let Some(&mapping) = mappings_by_title.get(topic.title.as_str()) else { continue };
            for &sub_idx in &mapping.sub_topic_indices {
                let Some(input) = visual_sub_topics.get(sub_idx) else { continue };
                let Some(frame) = hero_frames.get(input.original_index) else { continue };
                topic.sub_topics.push(SubTopic {
                    title: input.title.clone(),
                    visual_summary: input.summary.clone(),
                    timestamp: format_timestamp(input.timestamp_s),
                    image_url: Some(frame.blob_url.clone()),
                    frame_timestamp_s: input.timestamp_s,
                });
                // The owning topic per the LM's (or fallback's) mapping may
                // differ from whichever topic merely contains `input.timestamp_s`,
                // so the frame is pushed here rather than left to the
                // containment-based binding below; dedup by blob URL keeps it
                // out exactly once even if two sub-topics share a hero frame.
                if !topic.frames.iter().any(|f| f.blob_url == frame.blob_url) {
                    topic.frames.push(frame.clone());
                }
            }
        }

        // 12. Frame binding (sub-topic images into their owning topic's frames[]).
        self.checkpoint(cancellation)?;
        reconcile::bind_frames_to_topics(&mut final_topics, &hero_frames);
        self.patch(job_id, JobPatch::new().with_topics(final_topics.clone())).await?;

        // 13. Slide deck (0.90 -> 0.95).
        self.checkpoint(cancellation)?;
        let slides = self
            .lm
            .slide_deck(
                &transcript_text,
                executive_summary.as_deref().unwrap_or_default(),
                &key_takeaways,
            )
            .await;
        self.patch(
            job_id,
            JobPatch::new().with_slide_summary(slides).with_progress(0.95),
        )
        .await?;

        // 14. Persist final job + cleanup temp video/frames (keep audio).
        self.checkpoint(cancellation)?;
        self.patch(
            job_id,
            JobPatch {
                status: Some(JobStatus::Completed),
                ..JobPatch::new().with_action("completed", "pipeline finished").with_progress(1.0)
            },
        )
        .await?;

        self.cleanup(&video_path, &frames_dir).await;
        Ok(())
    }

    async fn cleanup(&self, video_path: &std::path::Path, frames_dir: &std::path::Path) {
        if let Err(err) = tokio::fs::remove_file(video_path).await {
            warn!(%err, path = ?video_path, "failed to remove temporary video file");
        }
        if let Err(err) = tokio::fs::remove_dir_all(frames_dir).await {
            warn!(%err, path = ?frames_dir, "failed to remove temporary frames directory");
        }
    }
}

/// Small ergonomic extensions over `JobPatch`'s builder so orchestrator call
/// sites stay close to the stage table above instead of repeating
/// `Some(...)` everywhere.
trait JobPatchExt {
    fn with_transcript(self, transcript: Vec<crate::job::Segment>) -> Self;
    fn with_topics(self, topics: Vec<crate::job::Topic>) -> Self;
    fn with_frames(self, frames: Vec<HeroFrame>) -> Self;
    fn with_entities(self, entities: crate::job::Entities) -> Self;
    fn with_key_takeaways(self, key_takeaways: Vec<String>) -> Self;
    fn with_slide_summary(self, slides: Vec<crate::job::Slide>) -> Self;
    fn maybe_executive_summary(self, summary: Option<String>) -> Self;
}

impl JobPatchExt for JobPatch {
    fn with_transcript(mut self, transcript: Vec<crate::job::Segment>) -> Self {
        self.transcript = Some(transcript);
        self
    }
    fn with_topics(mut self, topics: Vec<crate::job::Topic>) -> Self {
        self.topics = Some(topics);
        self
    }
    fn with_frames(mut self, frames: Vec<HeroFrame>) -> Self {
        self.frames = Some(frames);
        self
    }
    fn with_entities(mut self, entities: crate::job::Entities) -> Self {
        self.entities = Some(entities);
        self
    }
    fn with_key_takeaways(mut self, key_takeaways: Vec<String>) -> Self {
        self.key_takeaways = Some(key_takeaways);
        self
    }
    fn with_slide_summary(mut self, slides: Vec<crate::job::Slide>) -> Self {
        self.slide_summary = Some(slides);
        self
    }
    fn maybe_executive_summary(mut self, summary: Option<String>) -> Self {
        if summary.is_some() {
            self.executive_summary = summary;
        }
        self
    }
}
