//! JSON contract types for the LM Client's typed operations (§4.4).

use serde::{Deserialize, Serialize};

use crate::job::{Entities, Segment, Topic};

/// A transcript analysis pass's output, always emitted in this shape even
/// when a chunk/part fails (callers substitute empty collections).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub topics: Vec<Topic>,
    pub visual_cues: Vec<String>,
    pub entities: Entities,
    pub key_takeaways: Vec<String>,
}

/// Confidence band for an audio-cue hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CueConfidence {
    High,
    Medium,
    Low,
}

/// What kind of visual an audio cue phrase likely references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpectedVisualType {
    Slide,
    Demo,
    Code,
    Diagram,
    Chart,
    Unknown,
}

/// One hit from the audio-cue scout: a transcript phrase that likely
/// references an on-screen visual ("as shown on this slide...").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioCue {
    pub timestamp_s: f64,
    pub cue_phrase: String,
    pub confidence: CueConfidence,
    pub expected_visual_type: ExpectedVisualType,
}

/// Per-frame gatekeeper category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameCategory {
    SlidePresentation,
    SoftwareDemo,
    TechnicalDiagram,
    TalkingHead,
    Other,
    /// Sentinel used when the LM call itself errored; always `is_useful = false`.
    Error,
}

/// How much information a frame appears to carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InformationDensity {
    High,
    Medium,
    Low,
    None,
}

/// Per-frame gatekeeper verdict (§4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatekeeperVerdict {
    pub category: FrameCategory,
    pub information_density: InformationDensity,
    pub contains_text: bool,
    pub is_useful: bool,
}

impl GatekeeperVerdict {
    /// The dropped/error placeholder: always filtered out downstream.
    pub fn error() -> Self {
        Self {
            category: FrameCategory::Error,
            information_density: InformationDensity::None,
            contains_text: false,
            is_useful: false,
        }
    }
}

/// Hero-cluster description output. `hero_index` is clamped to the
/// candidate count by the caller before use (never trusted raw).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterDescription {
    pub hero_index: usize,
    pub sub_topic_title: String,
    pub visual_summary: String,
    pub ocr_keywords: Vec<String>,
}

/// Final synthesis output (§4.4's "Final synthesis").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SynthesisResult {
    pub executive_summary: String,
    pub topics: Vec<Topic>,
    pub key_takeaways: Vec<String>,
    pub entities: Entities,
}

/// Genre classification output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenreResult {
    pub genre: crate::lm::genre::Genre,
    pub confidence: f64,
    pub reason: String,
}

/// A bare title+range projection of a main topic, used as input to
/// topic↔visual mapping so the LM only sees what it needs to align.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicRange {
    pub title: String,
    pub start_s: f64,
    pub end_s: f64,
}

/// A visual sub-topic projection used as input to topic↔visual mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisualSubTopicInput {
    pub title: String,
    pub summary: String,
    pub timestamp_s: f64,
    pub original_index: usize,
}

/// Topic↔visual mapping output: each main topic title paired with the
/// indices (into the original `VisualSubTopicInput` slice) of at most 3
/// sub-topics the LM judged distinct and relevant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicVisualMapping {
    pub topic_title: String,
    pub sub_topic_indices: Vec<usize>,
}

/// Slide-deck output: always exactly the ordered list, possibly empty on
/// non-blocking failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlideDeckResult {
    pub slides: Vec<crate::job::Slide>,
}

/// Internal carrier for a transcription pass before rebasing by chunk offset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscribeResult {
    pub segments: Vec<Segment>,
}
