//! LM Client (C4): a typed wrapper over the LM transport covering
//! transcription, transcript analysis, audio-cue scouting, per-frame
//! gatekeeping, cluster description, topic↔visual mapping, final synthesis,
//! slide-deck generation, and genre classification.
//!
//! Every operation here is logically a pure function of its input plus
//! three transport-level concerns: JSON repair (`json_repair`), retry with
//! backoff, and never mutating caller state. Prompts are ported loosely
//! from `original_source/Backend/services/gemini_service.py`'s prompt
//! templates; schemas are authoritative from spec §4.4.

pub mod genre;
pub mod json_repair;
pub mod transport;
pub mod types;

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::job::{Segment, Slide};
use crate::media::format_timestamp;
use genre::{Genre, SnippetKind, guidance_snippet, normalize_genre};
use transport::{LmRequest, LmTransport};
use types::*;

/// Base delay for the exponential backoff (`base=2s, factor=2`), per §4.4.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(2);
/// Default max attempts; individual callers may reduce to 2.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Retry `f` with exponential backoff: delay doubles each attempt starting
/// from `base_delay`. Exhausting `max_retries` propagates the last error.
pub async fn retry_with_backoff<F, Fut, R>(
    mut f: F,
    max_retries: u32,
    base_delay: Duration,
) -> anyhow::Result<R>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<R>>,
{
    let mut attempt = 0u32;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt + 1 >= max_retries.max(1) => return Err(err),
            Err(err) => {
                warn!(attempt, %err, "LM call failed, retrying after backoff");
                tokio::time::sleep(base_delay * 2u32.pow(attempt)).await;
                attempt += 1;
            }
        }
    }
}

/// The character threshold above which a transcript is split for analysis.
const TRANSCRIPT_SPLIT_THRESHOLD: usize = 50_000;

#[derive(Clone)]
pub struct LmClient {
    transport: Arc<dyn LmTransport>,
    model_id: String,
}

impl LmClient {
    pub fn new(transport: Arc<dyn LmTransport>, model_id: impl Into<String>) -> Self {
        Self {
            transport,
            model_id: model_id.into(),
        }
    }

    async fn call(&self, prompt: String) -> anyhow::Result<String> {
        let model_id = self.model_id.clone();
        retry_with_backoff(
            move || {
                let transport = Arc::clone(&self.transport);
                let request = LmRequest::text(model_id.clone(), prompt.clone());
                async move { transport.generate(request).await }
            },
            DEFAULT_MAX_RETRIES,
            DEFAULT_BASE_DELAY,
        )
        .await
    }

    async fn call_with_images(
        &self,
        prompt: String,
        images: Vec<std::path::PathBuf>,
    ) -> anyhow::Result<String> {
        let model_id = self.model_id.clone();
        retry_with_backoff(
            move || {
                let transport = Arc::clone(&self.transport);
                let request =
                    LmRequest::text(model_id.clone(), prompt.clone()).with_images(images.clone());
                async move { transport.generate(request).await }
            },
            DEFAULT_MAX_RETRIES,
            DEFAULT_BASE_DELAY,
        )
        .await
    }

    /// Transcribe one chunk, rebasing every returned segment's timestamps
    /// by `start_offset_s`. On total LM failure, emits a single coarse
    /// segment spanning the whole chunk so downstream stages never see an
    /// empty chunk.
    pub async fn transcribe_chunk(
        &self,
        audio_path: &Path,
        start_offset_s: f64,
        chunk_duration_s: f64,
    ) -> Vec<Segment> {
        let model_id = self.model_id.clone();
        let prompt = "Transcribe this audio. Return ONLY JSON: \
            {\"segments\": [{\"text\": str, \"start_s\": number, \"end_s\": number, \
            \"speaker\": str|null, \"confidence\": number|null}]} with timestamps relative to \
            the start of this audio chunk."
            .to_string();
        let audio_path = audio_path.to_path_buf();

        let result = retry_with_backoff(
            move || {
                let transport = Arc::clone(&self.transport);
                let request = LmRequest::text(model_id.clone(), prompt.clone())
                    .with_audio(audio_path.clone());
                async move { transport.generate(request).await }
            },
            DEFAULT_MAX_RETRIES,
            DEFAULT_BASE_DELAY,
        )
        .await;

        let raw = match result {
            Ok(raw) => raw,
            Err(err) => {
                warn!(%err, "transcription failed after retries, emitting coarse segment");
                return vec![coarse_segment(start_offset_s, chunk_duration_s)];
            }
        };

        let parsed: Option<TranscribeResult> =
            json_repair::repair_json(&raw).and_then(|v| serde_json::from_value(v).ok());

        match parsed {
            Some(result) if !result.segments.is_empty() => result
                .segments
                .into_iter()
                .map(|mut seg| {
                    seg.start_s += start_offset_s;
                    seg.end_s += start_offset_s;
                    seg
                })
                .collect(),
            _ => vec![coarse_segment(start_offset_s, chunk_duration_s)],
        }
    }

    /// Analyze a transcript, splitting into token-balanced parts above the
    /// 50kB threshold and merging the results. Always returns a populated
    /// `AnalysisResult` (empty collections on total failure).
    pub async fn analyze_transcript(
        &self,
        transcript_text: &str,
        duration_s: f64,
        genre: Genre,
    ) -> AnalysisResult {
        if transcript_text.len() <= TRANSCRIPT_SPLIT_THRESHOLD {
            return self
                .analyze_transcript_part(transcript_text, duration_s, genre, 0, 1)
                .await;
        }

        let parts = split_into_parts(transcript_text, 3);
        let total = parts.len();
        let mut topics = Vec::new();
        let mut visual_cues = Vec::new();
        let mut entities_parts = Vec::new();
        let mut key_takeaways = Vec::new();

        for (idx, part) in parts.iter().enumerate() {
            let result = self
                .analyze_transcript_part(part, duration_s, genre, idx, total)
                .await;
            topics.extend(result.topics);
            visual_cues.extend(result.visual_cues);
            entities_parts.push(result.entities);
            key_takeaways.extend(result.key_takeaways);
        }

        let topics = crate::reconcile::dedup_topics(topics);
        AnalysisResult {
            topics,
            visual_cues,
            entities: crate::job::merge_entities(entities_parts),
            key_takeaways,
        }
    }

    async fn analyze_transcript_part(
        &self,
        transcript_text: &str,
        duration_s: f64,
        genre: Genre,
        part_idx: usize,
        total_parts: usize,
    ) -> AnalysisResult {
        let chunk_info = if total_parts > 1 {
            format!(" (part {}/{})", part_idx + 1, total_parts)
        } else {
            String::new()
        };
        let genre_snippet = guidance_snippet(genre, SnippetKind::Analysis);
        let prompt = format!(
            "Analyze this video transcript{chunk_info} (total duration {}) and extract topics \
             spanning the ENTIRE video duration from 00:00:00 to {}.\n\n{genre_snippet}\n\n\
             Transcript:\n{transcript_text}\n\n\
             Return ONLY JSON: {{\"topics\": [{{\"title\": str, \"start_s\": number, \
             \"end_s\": number, \"summary\": str, \"key_points\": [str]}}], \
             \"visual_cues\": [str], \"entities\": {{\"people\": [str], \"companies\": [str], \
             \"concepts\": [str], \"tools\": [str]}}, \"key_takeaways\": [str]}}",
            format_timestamp(duration_s),
            format_timestamp(duration_s),
        );

        let raw = match self.call(prompt).await {
            Ok(raw) => raw,
            Err(err) => {
                warn!(%err, "transcript analysis failed after retries");
                return AnalysisResult::default();
            }
        };

        json_repair::repair_json(&raw)
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default()
    }

    /// Find transcript phrases likely referencing a visual. Missing/failed
    /// outputs return the empty list (never fatal).
    pub async fn audio_cue_scout(&self, transcript: &[Segment]) -> Vec<AudioCue> {
        let rendered: String = transcript
            .iter()
            .map(|seg| format!("[{}] {}", format_timestamp(seg.start_s), seg.text))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "Find phrases in this transcript that likely reference an on-screen visual \
             (\"as you can see on this slide\", \"this diagram shows\", etc). For each, give \
             a timestamp, the cue phrase, a confidence, and the expected visual type.\n\n\
             Transcript:\n{rendered}\n\n\
             Return ONLY JSON: {{\"cues\": [{{\"timestamp_s\": number, \"cue_phrase\": str, \
             \"confidence\": \"high\"|\"medium\"|\"low\", \
             \"expected_visual_type\": \"slide\"|\"demo\"|\"code\"|\"diagram\"|\"chart\"|\"unknown\"}}]}}"
        );

        let raw = match self.call(prompt).await {
            Ok(raw) => raw,
            Err(err) => {
                warn!(%err, "audio cue scout failed after retries");
                return Vec::new();
            }
        };

        #[derive(serde::Deserialize)]
        struct Wrapper {
            cues: Vec<AudioCue>,
        }
        json_repair::repair_json(&raw)
            .and_then(|v| serde_json::from_value::<Wrapper>(v).ok())
            .map(|w| w.cues)
            .unwrap_or_default()
    }

    /// Classify one frame. On error, returns the dropped sentinel so the
    /// caller filters the frame out.
    pub async fn gatekeeper_frame(&self, image_path: &Path) -> GatekeeperVerdict {
        let prompt = "Classify this video frame. Return ONLY JSON: {\"category\": \
            \"slide_presentation\"|\"software_demo\"|\"technical_diagram\"|\"talking_head\"|\
            \"other\", \"information_density\": \"high\"|\"medium\"|\"low\"|\"none\", \
            \"contains_text\": bool, \"is_useful\": bool}"
            .to_string();

        let raw = match self
            .call_with_images(prompt, vec![image_path.to_path_buf()])
            .await
        {
            Ok(raw) => raw,
            Err(err) => {
                warn!(%err, path = ?image_path, "gatekeeper call failed after retries");
                return GatekeeperVerdict::error();
            }
        };

        json_repair::repair_json(&raw)
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_else(GatekeeperVerdict::error)
    }

    /// Describe a cluster's candidates and pick the hero. `hero_index` is
    /// clamped to the candidate count, never trusted raw from the LM.
    pub async fn describe_cluster(
        &self,
        candidate_paths: &[std::path::PathBuf],
        start_s: f64,
        end_s: f64,
    ) -> ClusterDescription {
        let prompt = format!(
            "These {} images are candidate frames from one visual scene spanning {} to {}. \
             Pick the clearest/sharpest as the hero and describe the scene.\n\n\
             Return ONLY JSON: {{\"hero_index\": number, \"sub_topic_title\": str, \
             \"visual_summary\": str, \"ocr_keywords\": [str]}}",
            candidate_paths.len(),
            format_timestamp(start_s),
            format_timestamp(end_s),
        );

        let raw = match self
            .call_with_images(prompt, candidate_paths.to_vec())
            .await
        {
            Ok(raw) => raw,
            Err(err) => {
                warn!(%err, "cluster description failed after retries");
                return placeholder_cluster_description();
            }
        };

        let parsed: Option<ClusterDescription> =
            json_repair::repair_json(&raw).and_then(|v| serde_json::from_value(v).ok());

        match parsed {
            Some(mut desc) => {
                let max_index = candidate_paths.len().saturating_sub(1);
                if desc.hero_index > max_index {
                    desc.hero_index = 0;
                }
                desc
            }
            None => placeholder_cluster_description(),
        }
    }

    /// Align main topics with visual sub-topics, at most 3 per topic. On
    /// total LM failure returns `None`; the caller applies the
    /// nearest-window fallback from `reconcile::fallback_map_topics`.
    pub async fn map_topics_to_visuals(
        &self,
        topics: &[TopicRange],
        sub_topics: &[VisualSubTopicInput],
    ) -> Option<Vec<TopicVisualMapping>> {
        let topics_json = serde_json::to_string(topics).ok()?;
        let sub_topics_json = serde_json::to_string(sub_topics).ok()?;
        let prompt = format!(
            "Assign each visual sub-topic to the main topic it illustrates, at most 3 distinct \
             sub-topics per topic.\n\nTopics: {topics_json}\n\nVisual sub-topics: {sub_topics_json}\n\n\
             Return ONLY JSON: {{\"mappings\": [{{\"topic_title\": str, \"sub_topic_indices\": [number]}}]}}"
        );

        let raw = self.call(prompt).await.ok()?;

        #[derive(serde::Deserialize)]
        struct Wrapper {
            mappings: Vec<TopicVisualMapping>,
        }
        json_repair::repair_json(&raw)
            .and_then(|v| serde_json::from_value::<Wrapper>(v).ok())
            .map(|w| w.mappings)
    }

    /// Final synthesis: executive summary, topics, key takeaways, entities.
    /// Returns `None` on total failure so the caller keeps the analyzer's
    /// topics (the preservation rule, applied by the orchestrator since it
    /// needs the original topic count).
    pub async fn synthesize(
        &self,
        transcript_text: &str,
        frame_summary: &str,
        duration_s: f64,
        genre: Genre,
    ) -> Option<SynthesisResult> {
        let genre_snippet = guidance_snippet(genre, SnippetKind::Synthesis);
        let prompt = format!(
            "Synthesize a final report for this {} video.\n\n{genre_snippet}\n\n\
             Transcript:\n{transcript_text}\n\nFrame analyses:\n{frame_summary}\n\n\
             Return ONLY JSON: {{\"executive_summary\": str, \"topics\": [{{\"title\": str, \
             \"start_s\": number, \"end_s\": number, \"summary\": str, \"key_points\": [str]}}], \
             \"key_takeaways\": [str], \"entities\": {{\"people\": [str], \"companies\": [str], \
             \"concepts\": [str], \"tools\": [str]}}}}",
            format_timestamp(duration_s),
        );

        let raw = self.call(prompt).await.ok()?;
        json_repair::repair_json(&raw).and_then(|v| serde_json::from_value(v).ok())
    }

    /// Slide-deck generation. Failure is non-blocking: returns an empty deck.
    pub async fn slide_deck(
        &self,
        transcript_text: &str,
        executive_summary: &str,
        key_takeaways: &[String],
    ) -> Vec<Slide> {
        let takeaways = key_takeaways.join("; ");
        let prompt = format!(
            "Produce a 5-slide deck summarizing this video.\n\nTranscript:\n{transcript_text}\n\n\
             Summary: {executive_summary}\n\nKey takeaways: {takeaways}\n\n\
             Return ONLY JSON: {{\"slides\": [{{\"title\": str, \"bullets\": [str]}}]}}"
        );

        let raw = match self.call(prompt).await {
            Ok(raw) => raw,
            Err(err) => {
                warn!(%err, "slide deck generation failed, proceeding with empty deck");
                return Vec::new();
            }
        };

        json_repair::repair_json(&raw)
            .and_then(|v| serde_json::from_value::<SlideDeckResult>(v).ok())
            .map(|r| r.slides)
            .unwrap_or_default()
    }

    /// Classify genre from a transcript prefix. Failure degrades to
    /// `Unknown` with zero confidence.
    pub async fn classify_genre(&self, transcript_text: &str, duration_s: f64) -> GenreResult {
        let sample: String = transcript_text.chars().take(8_000).collect();
        let prompt = format!(
            "Classify the genre of this video (duration {}) from a transcript sample. Pick one \
             of: podcast_panel, educational_lecture, interview_qna, vlog, meeting_presentation, \
             single_speaker_general, unknown.\n\nSample:\n{sample}\n\n\
             Return ONLY JSON: {{\"genre\": str, \"confidence\": number, \"reason\": str}}",
            format_timestamp(duration_s),
        );

        let raw = match self.call(prompt).await {
            Ok(raw) => raw,
            Err(err) => {
                warn!(%err, "genre classification failed after retries");
                return GenreResult {
                    genre: Genre::Unknown,
                    confidence: 0.0,
                    reason: String::new(),
                };
            }
        };

        #[derive(serde::Deserialize, Default)]
        struct RawGenre {
            #[serde(default)]
            genre: String,
            #[serde(default)]
            confidence: f64,
            #[serde(default)]
            reason: String,
        }
        let parsed: RawGenre = json_repair::repair_json(&raw)
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();

        GenreResult {
            genre: normalize_genre(&parsed.genre),
            confidence: parsed.confidence.clamp(0.0, 1.0),
            reason: parsed.reason,
        }
    }
}

fn coarse_segment(start_offset_s: f64, chunk_duration_s: f64) -> Segment {
    Segment {
        text: String::new(),
        start_s: start_offset_s,
        end_s: start_offset_s + chunk_duration_s,
        speaker: None,
        confidence: None,
    }
}

fn placeholder_cluster_description() -> ClusterDescription {
    ClusterDescription {
        hero_index: 0,
        sub_topic_title: "Untitled visual".to_string(),
        visual_summary: "Analysis failed".to_string(),
        ocr_keywords: Vec::new(),
    }
}

/// Split `text` into `n` roughly-equal parts on whitespace boundaries
/// closest to the even split points, so no word is torn mid-token.
fn split_into_parts(text: &str, n: usize) -> Vec<String> {
    if n <= 1 || text.is_empty() {
        return vec![text.to_string()];
    }
    let chars: Vec<char> = text.chars().collect();
    let target_len = chars.len() / n;

    let mut parts = Vec::with_capacity(n);
    let mut start = 0usize;
    for i in 0..n {
        if i == n - 1 {
            parts.push(chars[start..].iter().collect());
            break;
        }
        let mut end = (start + target_len).min(chars.len());
        while end < chars.len() && !chars[end].is_whitespace() {
            end += 1;
        }
        parts.push(chars[start..end].iter().collect());
        start = end;
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FakeTransport {
        responses: Mutex<Vec<anyhow::Result<String>>>,
    }

    impl FakeTransport {
        fn with_responses(responses: Vec<anyhow::Result<String>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses),
            })
        }

        fn always_ok(text: &str) -> Arc<Self> {
            Self::with_responses(vec![Ok(text.to_string())])
        }

        fn always_err() -> Arc<Self> {
            Self::with_responses(vec![Err(anyhow::anyhow!("boom"))])
        }
    }

    #[async_trait::async_trait]
    impl LmTransport for FakeTransport {
        async fn generate(&self, _request: LmRequest) -> anyhow::Result<String> {
            let mut responses = self.responses.lock().unwrap();
            if responses.len() > 1 {
                responses.remove(0)
            } else {
                match &responses[0] {
                    Ok(text) => Ok(text.clone()),
                    Err(_) => Err(anyhow::anyhow!("boom")),
                }
            }
        }
    }

    #[tokio::test]
    async fn transcribe_chunk_rebases_timestamps() {
        let transport = FakeTransport::always_ok(
            r#"{"segments": [{"text": "hi", "start_s": 0, "end_s": 5, "speaker": null, "confidence": null}]}"#,
        );
        let client = LmClient::new(transport, "test-model");
        let segments = client
            .transcribe_chunk(Path::new("/tmp/chunk.wav"), 100.0, 300.0)
            .await;
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].start_s, 100.0);
        assert_eq!(segments[0].end_s, 105.0);
    }

    #[tokio::test]
    async fn transcribe_chunk_falls_back_to_coarse_segment_on_total_failure() {
        let transport = FakeTransport::always_err();
        let client = LmClient::new(transport, "test-model");
        let segments = client
            .transcribe_chunk(Path::new("/tmp/chunk.wav"), 100.0, 300.0)
            .await;
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].start_s, 100.0);
        assert_eq!(segments[0].end_s, 400.0);
    }

    #[tokio::test]
    async fn gatekeeper_error_drops_frame() {
        let transport = FakeTransport::always_err();
        let client = LmClient::new(transport, "test-model");
        let verdict = client.gatekeeper_frame(Path::new("/tmp/f.jpg")).await;
        assert!(!verdict.is_useful);
        assert_eq!(verdict.category, FrameCategory::Error);
    }

    #[tokio::test]
    async fn describe_cluster_clamps_out_of_range_hero_index() {
        let transport = FakeTransport::always_ok(
            r#"{"hero_index": 99, "sub_topic_title": "t", "visual_summary": "s", "ocr_keywords": []}"#,
        );
        let client = LmClient::new(transport, "test-model");
        let desc = client
            .describe_cluster(
                &[
                    std::path::PathBuf::from("/tmp/a.jpg"),
                    std::path::PathBuf::from("/tmp/b.jpg"),
                ],
                0.0,
                10.0,
            )
            .await;
        assert_eq!(desc.hero_index, 0);
    }

    #[tokio::test]
    async fn audio_cue_scout_returns_empty_on_failure() {
        let transport = FakeTransport::always_err();
        let client = LmClient::new(transport, "test-model");
        let cues = client.audio_cue_scout(&[]).await;
        assert!(cues.is_empty());
    }

    #[tokio::test]
    async fn slide_deck_returns_empty_on_failure_non_blocking() {
        let transport = FakeTransport::always_err();
        let client = LmClient::new(transport, "test-model");
        let slides = client.slide_deck("transcript", "summary", &[]).await;
        assert!(slides.is_empty());
    }

    #[tokio::test]
    async fn classify_genre_degrades_to_unknown_on_failure() {
        let transport = FakeTransport::always_err();
        let client = LmClient::new(transport, "test-model");
        let result = client.classify_genre("transcript", 600.0).await;
        assert_eq!(result.genre, Genre::Unknown);
        assert_eq!(result.confidence, 0.0);
    }

    #[tokio::test]
    async fn map_topics_to_visuals_returns_none_on_failure() {
        let transport = FakeTransport::always_err();
        let client = LmClient::new(transport, "test-model");
        let result = client.map_topics_to_visuals(&[], &[]).await;
        assert!(result.is_none());
    }

    #[test]
    fn split_into_parts_produces_requested_count_without_tearing_words() {
        let text = "one two three four five six seven eight nine ten";
        let parts = split_into_parts(text, 3);
        assert_eq!(parts.len(), 3);
        let rejoined: String = parts.concat();
        assert_eq!(rejoined, text);
        for part in &parts {
            assert!(!part.starts_with(' ') || part.is_empty());
        }
    }

    #[test]
    fn split_into_parts_passthrough_for_n_one() {
        let parts = split_into_parts("hello world", 1);
        assert_eq!(parts, vec!["hello world".to_string()]);
    }
}
