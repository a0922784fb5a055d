//! Reconciliation (C8): timestamp-aware merging of overlapping transcript
//! chunks and analysis passes, hero-frame↔topic binding, the post-synthesis
//! ad filter, and the nearest-window topic↔visual fallback used when the LM
//! mapping call fails.
//!
//! None of this module talks to the network or the filesystem; every
//! function is a pure transform over already-fetched data, which is what
//! makes it the natural seam for exhaustive unit tests.

use std::collections::HashSet;

use crate::job::{HeroFrame, Segment, Topic};
use crate::lm::types::{TopicRange, TopicVisualMapping, VisualSubTopicInput};

fn overlap_s(a_start: f64, a_end: f64, b_start: f64, b_end: f64) -> f64 {
    (a_end.min(b_end) - a_start.max(b_start)).max(0.0)
}

/// Merge segments from overlapping transcript chunks. Sorted by start time;
/// a segment overlapping the previous one by more than 70% of either's span
/// replaces it with whichever has the longer text or the longer span, a
/// small gap (`-2s < gap < 2s`) merges by concatenation, otherwise the
/// segment is kept as its own entry.
pub fn dedup_segments(mut segments: Vec<Segment>) -> Vec<Segment> {
    segments.sort_by(|a, b| a.start_s.partial_cmp(&b.start_s).unwrap());
    let mut result: Vec<Segment> = Vec::with_capacity(segments.len());

    for segment in segments {
        if let Some(prev) = result.last_mut() {
            let overlap = overlap_s(prev.start_s, prev.end_s, segment.start_s, segment.end_s);
            let prev_span = prev.len_s();
            let segment_span = segment.len_s();
            let gap = segment.start_s - prev.end_s;

            if prev_span > 0.0 && overlap / prev_span > 0.7 {
                if segment.text.len() > prev.text.len() || segment.len_s() > prev.len_s() {
                    *prev = segment;
                }
                continue;
            }
            if segment_span > 0.0 && overlap / segment_span > 0.7 {
                if segment.text.len() > prev.text.len() || segment.len_s() > prev.len_s() {
                    *prev = segment;
                }
                continue;
            }
            if gap < 2.0 && gap > -2.0 {
                prev.end_s = prev.end_s.max(segment.end_s);
                if !segment.text.is_empty() {
                    if prev.text.is_empty() {
                        prev.text = segment.text;
                    } else {
                        prev.text = format!("{} {}", prev.text, segment.text);
                    }
                }
                continue;
            }
        }
        result.push(segment);
    }
    result
}

/// Merge topics across analysis parts. A topic overlapping the previous by
/// more than 70% of the previous's span is considered the same topic;
/// whichever has more key points is kept.
pub fn dedup_topics(mut topics: Vec<Topic>) -> Vec<Topic> {
    topics.sort_by(|a, b| a.start_s.partial_cmp(&b.start_s).unwrap());
    let mut result: Vec<Topic> = Vec::with_capacity(topics.len());

    for topic in topics {
        if let Some(prev) = result.last_mut() {
            let overlap = overlap_s(prev.start_s, prev.end_s, topic.start_s, topic.end_s);
            let prev_span = prev.len_s();
            if prev_span > 0.0 && overlap / prev_span > 0.7 {
                if topic.key_points.len() > prev.key_points.len() {
                    *prev = topic;
                }
                continue;
            }
        }
        result.push(topic);
    }
    result
}

/// Bind each hero frame to the topic it falls inside, or the nearest topic
/// within 2 seconds if it falls in a gap. Each frame is bound at most once
/// (deduped by `blob_url`) and to at most one topic. Frames already present
/// in some topic's `frames[]` (e.g. bound explicitly via a topic↔visual
/// mapping before this runs) are left alone rather than rebound elsewhere.
pub fn bind_frames_to_topics(topics: &mut [Topic], frames: &[HeroFrame]) {
    const NEAREST_WINDOW_S: f64 = 2.0;
    let mut seen_urls: HashSet<String> = topics
        .iter()
        .flat_map(|topic| topic.frames.iter().map(|f| f.blob_url.clone()))
        .collect();

    for frame in frames {
        if !seen_urls.insert(frame.blob_url.clone()) {
            continue;
        }

        let mut best: Option<(usize, f64)> = None;
        for (idx, topic) in topics.iter().enumerate() {
            if topic.contains(frame.timestamp_s) {
                best = Some((idx, 0.0));
                break;
            }
            let distance = if frame.timestamp_s < topic.start_s {
                topic.start_s - frame.timestamp_s
            } else {
                frame.timestamp_s - topic.end_s
            };
            if distance <= NEAREST_WINDOW_S {
                let replace = match best {
                    Some((_, best_distance)) => distance < best_distance,
                    None => true,
                };
                if replace {
                    best = Some((idx, distance));
                }
            }
        }

        if let Some((idx, _)) = best {
            topics[idx].frames.push(frame.clone());
        }
    }
}

/// Drop topics that are clearly sponsor/ad reads, by title. Idempotent:
/// running it again on its own output is a no-op.
pub fn ad_filter(topics: Vec<Topic>) -> Vec<Topic> {
    topics
        .into_iter()
        .filter(|topic| !topic.title.to_lowercase().contains("sponsor"))
        .collect()
}

/// Fallback topic↔visual mapping used when the LM mapping call fails:
/// assign each visual sub-topic to the main topic whose `[start_s, end_s]`
/// contains its timestamp, capping at 3 sub-topics per topic and dropping
/// sub-topics that land outside every topic's span.
pub fn fallback_map_topics(
    topics: &[TopicRange],
    sub_topics: &[VisualSubTopicInput],
) -> Vec<TopicVisualMapping> {
    let mut indices_per_topic: Vec<Vec<usize>> = vec![Vec::new(); topics.len()];

    for sub_topic in sub_topics {
        for (idx, topic) in topics.iter().enumerate() {
            if topic.start_s <= sub_topic.timestamp_s && sub_topic.timestamp_s <= topic.end_s {
                if indices_per_topic[idx].len() < 3 {
                    indices_per_topic[idx].push(sub_topic.original_index);
                }
                break;
            }
        }
    }

    topics
        .iter()
        .zip(indices_per_topic)
        .map(|(topic, sub_topic_indices)| TopicVisualMapping {
            topic_title: topic.title.clone(),
            sub_topic_indices,
        })
        .collect()
}
