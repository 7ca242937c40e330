//! Stitching per-window transcripts into one global transcript
//!
//! Local timestamps are rebased to global time, then every segment inside an
//! overlap region is assigned to exactly one of the two adjacent windows by
//! comparing its global start against the temporal midpoint of the overlap.
//! Failed windows leave an explicit gap marker instead of silently dropping
//! the interval. Output order follows global time regardless of the order
//! chunks completed in.

use longscribe_core::{
    AudioWindow, ChunkResult, GapInterval, MergedTranscript, TranscriptSegment,
};
use std::collections::HashMap;
use tracing::debug;

/// Midpoint cut between two overlapping windows
///
/// Segments of the earlier window with global start below the cut are kept;
/// segments of the later window at or above the cut are kept.
fn overlap_cut(earlier: &AudioWindow, later: &AudioWindow) -> f64 {
    (later.start + earlier.end) / 2.0
}

/// Merge per-window results into one transcript
///
/// `windows` must be the planner's full sequence in index order. Windows with
/// a failed or absent result become gap markers and mark the transcript as
/// partial. Consumes each [`ChunkResult`] exactly once.
#[must_use]
pub fn merge(windows: &[AudioWindow], mut results: HashMap<usize, ChunkResult>) -> MergedTranscript {
    let mut kept: Vec<TranscriptSegment> = Vec::new();
    let mut text_parts: Vec<String> = Vec::new();
    let mut failed_windows: Vec<GapInterval> = Vec::new();

    for (i, window) in windows.iter().enumerate() {
        // Cut points against the previous and next windows, when they overlap
        let lower_cut = i
            .checked_sub(1)
            .and_then(|p| windows.get(p))
            .filter(|prev| prev.overlaps(window))
            .map(|prev| overlap_cut(prev, window));
        let upper_cut = windows
            .get(i + 1)
            .filter(|next| window.overlaps(next))
            .map(|next| overlap_cut(window, next));

        match results.remove(&window.index) {
            Some(result) if result.outcome.is_success() => {
                for segment in &result.segments {
                    let global = segment.rebased(window.start);
                    if lower_cut.is_some_and(|cut| global.start < cut) {
                        continue;
                    }
                    if upper_cut.is_some_and(|cut| global.start >= cut) {
                        continue;
                    }
                    let trimmed = global.text.trim();
                    if !trimmed.is_empty() {
                        text_parts.push(trimmed.to_string());
                    }
                    kept.push(global);
                }
            }
            _ => {
                let gap = GapInterval {
                    window_index: window.index,
                    start: window.start,
                    end: window.end,
                };
                text_parts.push(gap.marker());
                failed_windows.push(gap);
            }
        }
    }

    let confidence = aggregate_confidence(&kept);
    let partial = !failed_windows.is_empty();

    debug!(
        windows = windows.len(),
        kept_segments = kept.len(),
        gaps = failed_windows.len(),
        "stitched transcript"
    );

    MergedTranscript {
        text: text_parts.join(" "),
        segments: kept,
        confidence,
        partial,
        failed_windows,
    }
}

/// Duration-weighted mean confidence of kept segments
fn aggregate_confidence(segments: &[TranscriptSegment]) -> Option<f32> {
    let mut weighted = 0.0f64;
    let mut total_weight = 0.0f64;
    for segment in segments {
        if let Some(confidence) = segment.confidence {
            let weight = segment.duration().max(0.0);
            weighted += f64::from(confidence) * weight;
            total_weight += weight;
        }
    }
    if total_weight > 0.0 {
        Some((weighted / total_weight) as f32)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use longscribe_core::ChunkOutcome;
    use pretty_assertions::assert_eq;

    fn windows_400() -> Vec<AudioWindow> {
        vec![
            AudioWindow::new(0, 0.0, 180.0),
            AudioWindow::new(1, 178.0, 358.0),
            AudioWindow::new(2, 356.0, 400.0),
        ]
    }

    fn success(window: AudioWindow, segments: Vec<TranscriptSegment>) -> ChunkResult {
        ChunkResult::success(window, segments, Some(0.9), 1)
    }

    fn results_from(entries: Vec<ChunkResult>) -> HashMap<usize, ChunkResult> {
        entries.into_iter().map(|r| (r.window.index, r)).collect()
    }

    #[test]
    fn test_rebase_to_global_time() {
        let windows = windows_400();
        let results = results_from(vec![
            success(windows[0], vec![TranscriptSegment::new(0.0, 5.0, "start")]),
            success(windows[1], vec![TranscriptSegment::new(10.0, 12.0, "middle")]),
            success(windows[2], vec![TranscriptSegment::new(5.0, 9.0, "end")]),
        ]);

        let merged = merge(&windows, results);
        assert_eq!(merged.segments.len(), 3);
        assert_eq!(merged.segments[1].start, 188.0);
        assert_eq!(merged.segments[2].start, 361.0);
        assert_eq!(merged.text, "start middle end");
        assert!(!merged.partial);
    }

    #[test]
    fn test_overlap_region_assigned_once() {
        let windows = windows_400();
        // Overlap [178, 180): cut at 179. Window 0 repeats the overlap text
        // near its end, window 1 repeats it at its start.
        let results = results_from(vec![
            success(
                windows[0],
                vec![
                    TranscriptSegment::new(170.0, 178.5, "tail"),
                    TranscriptSegment::new(178.5, 180.0, "dup"),
                ],
            ),
            success(
                windows[1],
                vec![
                    // Global 178.2: below the 179.0 cut, dropped as duplicate
                    TranscriptSegment::new(0.2, 2.0, "dup"),
                    TranscriptSegment::new(3.0, 10.0, "fresh"),
                ],
            ),
            success(windows[2], vec![TranscriptSegment::new(2.0, 4.0, "close")]),
        ]);

        let merged = merge(&windows, results);
        // Cut is 179.0: window 0 keeps both segments (starts 170.0 and 178.5),
        // window 1 drops its copy at global 178.2 and keeps "fresh" at 181.0.
        let texts: Vec<&str> = merged.segments.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["tail", "dup", "fresh", "close"]);

        // No duplicated overlap text
        assert_eq!(merged.text.matches("dup").count(), 1);
    }

    #[test]
    fn test_order_independence() {
        let windows = windows_400();
        let make = |order: Vec<usize>| {
            let all = vec![
                success(windows[0], vec![TranscriptSegment::new(0.0, 5.0, "a")]),
                success(windows[1], vec![TranscriptSegment::new(10.0, 12.0, "b")]),
                success(windows[2], vec![TranscriptSegment::new(5.0, 9.0, "c")]),
            ];
            let mut map = HashMap::new();
            for i in order {
                let r = all[i].clone();
                map.insert(r.window.index, r);
            }
            map
        };

        let forward = merge(&windows, make(vec![0, 1, 2]));
        let reversed = merge(&windows, make(vec![2, 1, 0]));
        let shuffled = merge(&windows, make(vec![1, 2, 0]));
        assert_eq!(forward, reversed);
        assert_eq!(forward, shuffled);
    }

    #[test]
    fn test_failed_window_leaves_gap_marker() {
        let windows = windows_400();
        let results = results_from(vec![
            success(windows[0], vec![TranscriptSegment::new(0.0, 5.0, "before")]),
            ChunkResult::failed(windows[1], 3, "exhausted retries"),
            success(windows[2], vec![TranscriptSegment::new(5.0, 9.0, "after")]),
        ]);

        let merged = merge(&windows, results);
        assert!(merged.partial);
        assert_eq!(merged.failed_windows.len(), 1);
        assert_eq!(merged.failed_windows[0].window_index, 1);
        assert_eq!(merged.failed_windows[0].start, 178.0);
        assert_eq!(merged.failed_windows[0].end, 358.0);
        assert_eq!(merged.text, "before [inaudible 178.0s-358.0s] after");
    }

    #[test]
    fn test_missing_result_treated_as_gap() {
        let windows = windows_400();
        let results = results_from(vec![
            success(windows[0], vec![TranscriptSegment::new(0.0, 5.0, "only")]),
        ]);

        let merged = merge(&windows, results);
        assert!(merged.partial);
        assert_eq!(merged.failed_windows.len(), 2);
    }

    #[test]
    fn test_all_windows_failed() {
        let windows = windows_400();
        let results = results_from(vec![
            ChunkResult::failed(windows[0], 3, "down"),
            ChunkResult::failed(windows[1], 3, "down"),
            ChunkResult::failed(windows[2], 3, "down"),
        ]);

        let merged = merge(&windows, results);
        assert!(merged.partial);
        assert!(merged.segments.is_empty());
        assert_eq!(merged.failed_windows.len(), 3);
        assert!(merged.confidence.is_none());
    }

    #[test]
    fn test_no_kept_segments_overlap_in_global_time() {
        let windows = windows_400();
        let results = results_from(vec![
            success(
                windows[0],
                vec![
                    TranscriptSegment::new(0.0, 90.0, "a"),
                    TranscriptSegment::new(90.0, 179.0, "b"),
                ],
            ),
            success(
                windows[1],
                vec![
                    TranscriptSegment::new(1.5, 90.0, "c"),
                    TranscriptSegment::new(90.0, 180.0, "d"),
                ],
            ),
            success(windows[2], vec![TranscriptSegment::new(2.5, 44.0, "e")]),
        ]);

        let merged = merge(&windows, results);
        for pair in merged.segments.windows(2) {
            assert!(pair[0].end <= pair[1].start + 1e-9);
            assert!(pair[0].start <= pair[1].start);
        }
    }

    #[test]
    fn test_duration_weighted_confidence() {
        let windows = vec![AudioWindow::new(0, 0.0, 100.0)];
        let results = results_from(vec![success(
            windows[0],
            vec![
                TranscriptSegment::new(0.0, 30.0, "long").with_confidence(1.0),
                TranscriptSegment::new(30.0, 40.0, "short").with_confidence(0.4),
            ],
        )]);

        let merged = merge(&windows, results);
        // (1.0 * 30 + 0.4 * 10) / 40 = 0.85
        let confidence = merged.confidence.unwrap();
        assert!((confidence - 0.85).abs() < 1e-6);
    }

    #[test]
    fn test_empty_segment_text_skipped_in_text() {
        let windows = vec![AudioWindow::new(0, 0.0, 50.0)];
        let results = results_from(vec![success(
            windows[0],
            vec![
                TranscriptSegment::new(0.0, 1.0, "  "),
                TranscriptSegment::new(1.0, 2.0, "kept"),
            ],
        )]);

        let merged = merge(&windows, results);
        assert_eq!(merged.text, "kept");
        assert_eq!(merged.segments.len(), 2);
    }

    #[test]
    fn test_single_window_passthrough() {
        let windows = vec![AudioWindow::new(0, 0.0, 400.0)];
        let segments = vec![
            TranscriptSegment::new(0.0, 10.0, "one").with_confidence(0.7),
            TranscriptSegment::new(10.0, 20.0, "two").with_confidence(0.7),
        ];
        let results = results_from(vec![success(windows[0], segments.clone())]);

        let merged = merge(&windows, results);
        assert_eq!(merged.segments, segments);
        assert!(!merged.partial);
        let outcome = ChunkOutcome::Success;
        assert!(outcome.is_success());
    }
}
