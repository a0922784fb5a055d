//! Genre classification's closed set, fuzzy normalizer, and the guidance
//! snippets threaded through downstream prompts.
//!
//! The keyword-family table and snippet text port
//! `original_source/Backend/services/gemini_service.py`'s `genre_mapping`
//! and `genre_prompt_snippets` verbatim — the spec's "closed set" is silent
//! on the exact fuzzy-match keyword list, so `original_source` is
//! authoritative here per the Open Questions policy.

use serde::{Deserialize, Serialize};

/// The closed set of genres a video can be classified into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Genre {
    PodcastPanel,
    EducationalLecture,
    InterviewQna,
    Vlog,
    MeetingPresentation,
    SingleSpeakerGeneral,
    Unknown,
}

impl Genre {
    fn as_key(self) -> &'static str {
        match self {
            Genre::PodcastPanel => "podcast_panel",
            Genre::EducationalLecture => "educational_lecture",
            Genre::InterviewQna => "interview_qna",
            Genre::Vlog => "vlog",
            Genre::MeetingPresentation => "meeting_presentation",
            Genre::SingleSpeakerGeneral => "single_speaker_general",
            Genre::Unknown => "unknown",
        }
    }
}

/// (raw key variant, canonical genre) pairs used for direct and substring
/// fuzzy matching, in the order the reference service declares them.
const GENRE_MAPPING: &[(&str, Genre)] = &[
    ("educational", Genre::EducationalLecture),
    ("educational_lecture", Genre::EducationalLecture),
    ("educational_content", Genre::EducationalLecture),
    ("educational_tutorial", Genre::EducationalLecture),
    ("lecture", Genre::EducationalLecture),
    ("tutorial", Genre::EducationalLecture),
    ("course", Genre::EducationalLecture),
    ("lesson", Genre::EducationalLecture),
    ("training", Genre::EducationalLecture),
    ("podcast", Genre::PodcastPanel),
    ("podcast_panel", Genre::PodcastPanel),
    ("podcast_interview", Genre::PodcastPanel),
    ("podcast_discussion", Genre::PodcastPanel),
    ("panel_discussion", Genre::PodcastPanel),
    ("roundtable", Genre::PodcastPanel),
    ("interview", Genre::InterviewQna),
    ("interview_qna", Genre::InterviewQna),
    ("qna", Genre::InterviewQna),
    ("question_answer", Genre::InterviewQna),
    ("conversation", Genre::InterviewQna),
    ("vlog", Genre::Vlog),
    ("vlog_personal", Genre::Vlog),
    ("day_in_life", Genre::Vlog),
    ("travel_vlog", Genre::Vlog),
    ("lifestyle", Genre::Vlog),
    ("meeting", Genre::MeetingPresentation),
    ("meeting_presentation", Genre::MeetingPresentation),
    ("presentation", Genre::MeetingPresentation),
    ("business_meeting", Genre::MeetingPresentation),
    ("conference", Genre::MeetingPresentation),
    ("single_speaker", Genre::SingleSpeakerGeneral),
    ("single_speaker_general", Genre::SingleSpeakerGeneral),
    ("monologue", Genre::SingleSpeakerGeneral),
    ("talk", Genre::SingleSpeakerGeneral),
    ("speech", Genre::SingleSpeakerGeneral),
];

/// Keyword families used as a last-resort substring check when no mapping
/// key matches either direction.
const KEYWORD_FAMILIES: &[(&[&str], Genre)] = &[
    (
        &["educational", "lecture", "tutorial", "course", "lesson"],
        Genre::EducationalLecture,
    ),
    (
        &["podcast", "panel", "discussion", "roundtable"],
        Genre::PodcastPanel,
    ),
    (
        &["interview", "qna", "question", "conversation"],
        Genre::InterviewQna,
    ),
    (&["vlog", "day", "life", "travel", "lifestyle"], Genre::Vlog),
    (
        &["meeting", "presentation", "business", "conference"],
        Genre::MeetingPresentation,
    ),
    (
        &["single", "monologue", "talk", "speech"],
        Genre::SingleSpeakerGeneral,
    ),
];

/// Fuzzy-normalize a raw genre string from the LM into the closed set.
/// Outside the closed set entirely → `Unknown`.
pub fn normalize_genre(raw: &str) -> Genre {
    let lower = raw.to_lowercase();
    let lower = lower.trim();

    if let Some(&(_, genre)) = GENRE_MAPPING.iter().find(|(key, _)| *key == lower) {
        return genre;
    }
    if let Some(&(_, genre)) = GENRE_MAPPING
        .iter()
        .find(|(key, _)| lower.contains(key) || key.contains(lower))
    {
        return genre;
    }
    for &(words, genre) in KEYWORD_FAMILIES {
        if words.iter().any(|w| lower.contains(w)) {
            return genre;
        }
    }
    Genre::Unknown
}

/// Which prompt family a guidance snippet targets.
#[derive(Debug, Clone, Copy)]
pub enum SnippetKind {
    Analysis,
    Synthesis,
}

/// The "genre guidance" snippet appended to a prompt; schemas never change,
/// only emphasis, per spec's glossary entry for "Genre guidance".
pub fn guidance_snippet(genre: Genre, kind: SnippetKind) -> &'static str {
    match (genre, kind) {
        (Genre::PodcastPanel, SnippetKind::Analysis) => {
            "Genre guidance: This is a podcast/panel with multiple speakers. Prefer topics \
             organized by discussion segments, speaker turns, questions, and debates. Capture \
             noteworthy quotes and disagreements. Avoid assuming slides unless mentioned."
        }
        (Genre::PodcastPanel, SnippetKind::Synthesis) => {
            "Genre guidance: Podcast/panel. Emphasize key arguments by different speakers, \
             consensus vs dissent, and notable quotes. Keep it conversational and accurate."
        }
        (Genre::EducationalLecture, SnippetKind::Analysis) => {
            "Genre guidance: Educational lecture/tutorial. Prefer chaptering by concepts, \
             definitions, examples, steps, and recap. If slides/demos are likely, mark visual cues."
        }
        (Genre::EducationalLecture, SnippetKind::Synthesis) => {
            "Genre guidance: Educational. Emphasize learning objectives, step-by-step \
             breakdowns, definitions, examples, and actionable study takeaways."
        }
        (Genre::Vlog, SnippetKind::Analysis) => {
            "Genre guidance: Vlog. Prefer segments by locations/activities/time-of-day changes. \
             Summaries should reflect narrative flow and key moments rather than formal chapters."
        }
        (Genre::Vlog, SnippetKind::Synthesis) => {
            "Genre guidance: Vlog. Emphasize storyline, highlights, places/activities, and \
             memorable moments."
        }
        (Genre::SingleSpeakerGeneral, SnippetKind::Analysis) => {
            "Genre guidance: Single-speaker general talk (non-educational). Prefer segments by \
             topics, anecdotes, opinions, and conclusions."
        }
        (Genre::SingleSpeakerGeneral, SnippetKind::Synthesis) => {
            "Genre guidance: Single-speaker general. Emphasize main points, opinions, and \
             memorable quotes."
        }
        (Genre::InterviewQna, SnippetKind::Analysis) => {
            "Genre guidance: Interview/Q&A. Prefer segments by questions and answers. Clearly \
             identify the question context and the answer summary."
        }
        (Genre::InterviewQna, SnippetKind::Synthesis) => {
            "Genre guidance: Interview/Q&A. Emphasize key questions, concise answers, and \
             notable quotes."
        }
        (Genre::MeetingPresentation, SnippetKind::Analysis) => {
            "Genre guidance: Meeting/presentation. Prefer segments by agenda items, decisions, \
             action items, and key updates. Capture commitments and owners if present."
        }
        (Genre::MeetingPresentation, SnippetKind::Synthesis) => {
            "Genre guidance: Meeting/presentation. Emphasize decisions, action items, and \
             summary of updates."
        }
        (Genre::Unknown, SnippetKind::Analysis) => {
            "Genre guidance: Unknown. Use a neutral, general chaptering approach."
        }
        (Genre::Unknown, SnippetKind::Synthesis) => {
            "Genre guidance: Unknown. Use a neutral summary approach."
        }
    }
}

impl Genre {
    /// The genre's closed-set string key, used both for serialization and
    /// as a stable identifier in `Job::genre`.
    pub fn key(self) -> &'static str {
        self.as_key()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_match_normalizes_exactly() {
        assert_eq!(normalize_genre("podcast_panel"), Genre::PodcastPanel);
    }

    #[test]
    fn case_and_whitespace_insensitive() {
        assert_eq!(normalize_genre("  Podcast_Panel  "), Genre::PodcastPanel);
    }

    #[test]
    fn fuzzy_substring_match_via_mapping_key() {
        assert_eq!(normalize_genre("an educational_tutorial video"), Genre::EducationalLecture);
    }

    #[test]
    fn keyword_family_fallback() {
        assert_eq!(normalize_genre("a business conference recording"), Genre::MeetingPresentation);
    }

    #[test]
    fn unrecognized_genre_is_unknown() {
        assert_eq!(normalize_genre("cooking show"), Genre::Unknown);
    }

    #[test]
    fn guidance_snippet_schema_is_stable_across_genres() {
        // Every genre has both snippet kinds defined (no panics / missing arms).
        for genre in [
            Genre::PodcastPanel,
            Genre::EducationalLecture,
            Genre::InterviewQna,
            Genre::Vlog,
            Genre::MeetingPresentation,
            Genre::SingleSpeakerGeneral,
            Genre::Unknown,
        ] {
            assert!(!guidance_snippet(genre, SnippetKind::Analysis).is_empty());
            assert!(!guidance_snippet(genre, SnippetKind::Synthesis).is_empty());
        }
    }
}
