//! ROI fusion (C3): merges audio-cue and gatekeeper-approved-visual
//! timestamps into a time-ordered, non-overlapping sequence of dense
//! resampling windows.
//!
//! Pure function ported from `original_source/Backend/utils/roi_utils.py:merge_time_windows`.

/// Dilate every event by `buffer_s` on each side, clamp to `[0, total_duration]`,
/// then sweep-merge windows that start within `min_gap` of the running tail.
///
/// Returns windows sorted by start, pairwise disjoint (gap strictly greater
/// than `min_gap`), covering exactly the union of the dilated events.
pub fn merge_time_windows(
    events: &[f64],
    total_duration: f64,
    buffer_s: f64,
    min_gap: f64,
) -> Vec<(f64, f64)> {
    if events.is_empty() {
        return Vec::new();
    }

    let mut windows: Vec<(f64, f64)> = events
        .iter()
        .map(|&t| {
            let start = (t - buffer_s).max(0.0);
            let end = (t + buffer_s).min(total_duration);
            (start, end)
        })
        .collect();
    windows.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());

    let mut merged: Vec<(f64, f64)> = Vec::with_capacity(windows.len());
    for (start, end) in windows {
        match merged.last_mut() {
            Some((_, tail_end)) if start <= *tail_end + min_gap => {
                *tail_end = tail_end.max(end);
            }
            _ => merged.push((start, end)),
        }
    }
    merged
}

/// Default padding applied around each event, in seconds.
pub const DEFAULT_BUFFER_S: f64 = 10.0;
/// Default merge gap between adjacent dilated windows, in seconds.
pub const DEFAULT_MIN_GAP: f64 = 5.0;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_events_produce_no_windows() {
        let windows = merge_time_windows(&[], 1800.0, DEFAULT_BUFFER_S, DEFAULT_MIN_GAP);
        assert!(windows.is_empty());
    }

    #[test]
    fn two_nearby_events_merge() {
        // Scenario 2: events at t=100s and t=112s, buffer=10, min_gap=5, duration=1000.
        let windows = merge_time_windows(&[100.0, 112.0], 1000.0, 10.0, 5.0);
        assert_eq!(windows, vec![(90.0, 122.0)]);
    }

    #[test]
    fn far_apart_events_stay_separate() {
        let windows = merge_time_windows(&[10.0, 500.0], 1000.0, 10.0, 5.0);
        assert_eq!(windows, vec![(0.0, 20.0), (490.0, 510.0)]);
    }

    #[test]
    fn windows_clamp_to_duration_bounds() {
        let windows = merge_time_windows(&[2.0, 998.0], 1000.0, 10.0, 5.0);
        assert_eq!(windows, vec![(0.0, 12.0), (988.0, 1000.0)]);
    }

    #[test]
    fn every_event_lies_inside_exactly_one_merged_window() {
        let events = [5.0, 8.0, 9.0, 400.0, 403.0, 900.0];
        let windows = merge_time_windows(&events, 1000.0, 10.0, 5.0);
        for &e in &events {
            let covering = windows
                .iter()
                .filter(|(s, end)| *s <= e && e <= *end)
                .count();
            assert_eq!(covering, 1, "event {e} should lie in exactly one window");
        }
        // Pairwise disjoint and sorted.
        for pair in windows.windows(2) {
            assert!(pair[0].1 < pair[1].0, "windows must be disjoint and sorted");
        }
    }

    #[test]
    fn unsorted_input_is_still_sorted_on_output() {
        let windows = merge_time_windows(&[500.0, 10.0, 250.0], 1000.0, 10.0, 5.0);
        for pair in windows.windows(2) {
            assert!(pair[0].0 <= pair[1].0);
        }
    }
}
