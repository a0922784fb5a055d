//! The data model: `Job` and the values it owns.
//!
//! The orchestrator exclusively owns the mutable `Job`; every other component
//! is stateless and receives only the slices it needs.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a job's source video came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Drive,
    Site,
    Upload,
}

/// Where a job currently sits in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Downloading,
    Extracting,
    Transcribing,
    Analyzing,
    Synthesizing,
    Completed,
    Failed,
}

/// One append-only progress log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub message: String,
    pub time: DateTime<Utc>,
}

/// A transcript segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub text: String,
    pub start_s: f64,
    pub end_s: f64,
    #[serde(default)]
    pub speaker: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

impl Segment {
    pub fn len_s(&self) -> f64 {
        (self.end_s - self.start_s).max(0.0)
    }
}

/// A nested visual sub-topic, bound to at most one `HeroFrame` by `image_url`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubTopic {
    pub title: String,
    pub visual_summary: String,
    pub timestamp: String,
    pub image_url: Option<String>,
    pub frame_timestamp_s: f64,
}

/// One slide of the closing slide-deck summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Slide {
    pub title: String,
    pub bullets: Vec<String>,
}

/// A chronological topic with key points, bound frames, and quotes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topic {
    pub title: String,
    pub start_s: f64,
    pub end_s: f64,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub key_points: Vec<String>,
    /// Populated by frame binding, never by an LM response.
    #[serde(default)]
    pub frames: Vec<HeroFrame>,
    /// Populated by topic-visual mapping, never by an LM response.
    #[serde(default)]
    pub sub_topics: Vec<SubTopic>,
    #[serde(default)]
    pub quotes: Vec<String>,
    #[serde(default)]
    pub visual_cues: Vec<String>,
}

impl Topic {
    pub fn len_s(&self) -> f64 {
        (self.end_s - self.start_s).max(0.0)
    }

    pub fn contains(&self, t: f64) -> bool {
        self.start_s <= t && t <= self.end_s
    }
}

/// What kind of visual a published hero frame depicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameKind {
    Slide,
    Diagram,
    Chart,
    Demo,
    Person,
    Other,
}

/// A published, canonical visual for a cluster. `local_path` is transient:
/// produced by C1, consumed by C2/C4/C5, then discarded once `blob_url` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeroFrame {
    pub timestamp_s: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_path: Option<std::path::PathBuf>,
    pub blob_url: String,
    pub description: String,
    pub ocr_text: String,
    pub kind: FrameKind,
}

/// A candidate member of a `Cluster`, ranked by sharpness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterCandidate {
    pub path: std::path::PathBuf,
    pub timestamp_s: f64,
    pub blur_score: f64,
}

/// A contiguous run of near-duplicate frames by perceptual hash. Transient:
/// produced by C2, consumed by C4/C5, then dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    pub start_s: f64,
    pub end_s: f64,
    pub frame_count: usize,
    pub candidates: Vec<ClusterCandidate>,
}

/// Named entity categories extracted from the transcript.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Entities {
    pub people: Vec<String>,
    pub companies: Vec<String>,
    pub concepts: Vec<String>,
    pub tools: Vec<String>,
}

/// The job record. Created by external submission, mutated only by the
/// orchestrator, terminal in `Completed` or `Failed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub source_kind: SourceKind,
    pub source_ref: String,
    pub local_path: Option<std::path::PathBuf>,

    pub status: JobStatus,
    pub progress: f64,
    pub current_action: String,
    pub log: Vec<LogEntry>,

    pub duration_seconds: f64,
    pub transcript: Vec<Segment>,
    pub topics: Vec<Topic>,
    pub frames: Vec<HeroFrame>,
    pub entities: Entities,
    pub executive_summary: Option<String>,
    pub key_takeaways: Vec<String>,
    pub slide_summary: Vec<Slide>,
    pub genre: Option<String>,
    pub genre_confidence: Option<f64>,
    pub genre_reason: Option<String>,
    pub error_message: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Build a fresh, pending job for the given source.
    pub fn new(source_kind: SourceKind, source_ref: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            source_kind,
            source_ref: source_ref.into(),
            local_path: None,
            status: JobStatus::Pending,
            progress: 0.0,
            current_action: "queued".to_string(),
            log: Vec::new(),
            duration_seconds: 0.0,
            transcript: Vec::new(),
            topics: Vec::new(),
            frames: Vec::new(),
            entities: Entities::default(),
            executive_summary: None,
            key_takeaways: Vec::new(),
            slide_summary: Vec::new(),
            genre: None,
            genre_confidence: None,
            genre_reason: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A field-level patch applied atomically to a stored job, mirroring a
/// document store's `$set` + `$push` semantics: `log_entry` appends, every
/// other field (when `Some`) overwrites. `updated_at` is always stamped fresh
/// by the store regardless of what the patch carries.
#[derive(Debug, Clone, Default)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub progress: Option<f64>,
    pub current_action: Option<String>,
    pub log_entry: Option<String>,
    pub duration_seconds: Option<f64>,
    pub transcript: Option<Vec<Segment>>,
    pub topics: Option<Vec<Topic>>,
    pub frames: Option<Vec<HeroFrame>>,
    pub entities: Option<Entities>,
    pub executive_summary: Option<String>,
    pub key_takeaways: Option<Vec<String>>,
    pub slide_summary: Option<Vec<Slide>>,
    pub genre: Option<String>,
    pub genre_confidence: Option<f64>,
    pub genre_reason: Option<String>,
    pub error_message: Option<String>,
}

impl JobPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_action(mut self, action: impl Into<String>, log_entry: impl Into<String>) -> Self {
        self.current_action = Some(action.into());
        self.log_entry = Some(log_entry.into());
        self
    }

    pub fn with_progress(mut self, progress: f64) -> Self {
        self.progress = Some(progress);
        self
    }
}

/// Entities merged across transcript-analysis chunks, deduplicated by string
/// equality within each category.
pub fn merge_entities(parts: impl IntoIterator<Item = Entities>) -> Entities {
    fn dedup(mut v: Vec<String>) -> Vec<String> {
        let mut seen = BTreeMap::new();
        v.retain(|s| seen.insert(s.clone(), ()).is_none());
        v
    }

    let mut people = Vec::new();
    let mut companies = Vec::new();
    let mut concepts = Vec::new();
    let mut tools = Vec::new();
    for e in parts {
        people.extend(e.people);
        companies.extend(e.companies);
        concepts.extend(e.concepts);
        tools.extend(e.tools);
    }
    Entities {
        people: dedup(people),
        companies: dedup(companies),
        concepts: dedup(concepts),
        tools: dedup(tools),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_entities_dedups_by_string_equality_within_each_category() {
        let a = Entities {
            people: vec!["Alice".to_string(), "Bob".to_string()],
            companies: vec!["Acme".to_string()],
            concepts: vec![],
            tools: vec!["Rust".to_string()],
        };
        let b = Entities {
            people: vec!["Bob".to_string(), "Carol".to_string()],
            companies: vec!["Acme".to_string(), "Globex".to_string()],
            concepts: vec!["entropy".to_string()],
            tools: vec!["Rust".to_string(), "Cargo".to_string()],
        };

        let merged = merge_entities([a, b]);
        assert_eq!(merged.people, vec!["Alice", "Bob", "Carol"]);
        assert_eq!(merged.companies, vec!["Acme", "Globex"]);
        assert_eq!(merged.concepts, vec!["entropy"]);
        assert_eq!(merged.tools, vec!["Rust", "Cargo"]);
    }

    #[test]
    fn merge_entities_of_no_parts_is_empty() {
        let merged = merge_entities(std::iter::empty());
        assert!(merged.people.is_empty());
        assert!(merged.companies.is_empty());
        assert!(merged.concepts.is_empty());
        assert!(merged.tools.is_empty());
    }

    #[test]
    fn job_new_starts_pending_with_zero_progress() {
        let job = Job::new(SourceKind::Upload, "video.mp4");
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.progress, 0.0);
        assert!(job.transcript.is_empty());
        assert!(job.topics.is_empty());
    }

    #[test]
    fn segment_len_s_is_never_negative() {
        let segment = Segment {
            text: String::new(),
            start_s: 10.0,
            end_s: 5.0,
            speaker: None,
            confidence: None,
        };
        assert_eq!(segment.len_s(), 0.0);
    }

    #[test]
    fn topic_contains_is_inclusive_of_both_endpoints() {
        let topic = Topic {
            title: "t".to_string(),
            start_s: 10.0,
            end_s: 20.0,
            summary: None,
            key_points: Vec::new(),
            frames: Vec::new(),
            sub_topics: Vec::new(),
            quotes: Vec::new(),
            visual_cues: Vec::new(),
        };
        assert!(topic.contains(10.0));
        assert!(topic.contains(20.0));
        assert!(!topic.contains(9.9));
        assert!(!topic.contains(20.1));
    }
}
