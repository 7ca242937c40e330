//! Chunk planning: splitting a source duration into overlapping windows
//!
//! Pure time-window arithmetic with no side effects. The planner is the only
//! producer of [`AudioWindow`] values; everything downstream treats them as
//! immutable.

use longscribe_core::{AudioWindow, ChunkingConfig, Error, Result};

/// Compute the ordered sequence of windows covering `[0, total_duration]`
///
/// Sources at or below `min_duration_for_chunking_seconds` get a single
/// window. Otherwise window `i` starts at `i * (chunk_length - overlap)` and
/// ends at `min(start + chunk_length, total_duration)`; generation stops at
/// the window that reaches the end of the source. Consecutive windows overlap
/// by exactly `overlap_seconds` except possibly the last pair.
pub fn plan(total_duration: f64, config: &ChunkingConfig) -> Result<Vec<AudioWindow>> {
    config.validate()?;
    if total_duration <= 0.0 || !total_duration.is_finite() {
        return Err(Error::invalid_configuration(format!(
            "total duration must be positive, got {total_duration}"
        )));
    }

    if total_duration <= config.min_duration_for_chunking_seconds {
        return Ok(vec![AudioWindow::new(0, 0.0, total_duration)]);
    }

    let stride = config.chunk_length_seconds - config.overlap_seconds;
    let mut windows = Vec::new();
    let mut index = 0usize;

    loop {
        let start = index as f64 * stride;
        if start >= total_duration {
            break;
        }
        let end = (start + config.chunk_length_seconds).min(total_duration);
        windows.push(AudioWindow::new(index, start, end));
        if end >= total_duration {
            break;
        }
        index += 1;
    }

    Ok(windows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn config(chunk: f64, overlap: f64, min: f64) -> ChunkingConfig {
        ChunkingConfig {
            chunk_length_seconds: chunk,
            overlap_seconds: overlap,
            min_duration_for_chunking_seconds: min,
        }
    }

    #[test]
    fn test_short_source_single_window() {
        let windows = plan(400.0, &config(180.0, 2.0, 600.0)).unwrap();
        assert_eq!(windows, vec![AudioWindow::new(0, 0.0, 400.0)]);
    }

    #[test]
    fn test_documented_example() {
        // 400s source, 180s chunks, 2s overlap
        let windows = plan(400.0, &config(180.0, 2.0, 60.0)).unwrap();
        assert_eq!(
            windows,
            vec![
                AudioWindow::new(0, 0.0, 180.0),
                AudioWindow::new(1, 178.0, 358.0),
                AudioWindow::new(2, 356.0, 400.0),
            ]
        );
    }

    #[test]
    fn test_exact_fit_stops_at_end() {
        // Second window ends exactly at the source end
        let windows = plan(358.0, &config(180.0, 2.0, 60.0)).unwrap();
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[1].end, 358.0);
    }

    #[test]
    fn test_default_production_parameters() {
        let windows = plan(1000.0, &ChunkingConfig::default()).unwrap();
        assert_eq!(windows.len(), 4);
        assert_eq!(windows[0].start, 0.0);
        assert_eq!(windows[1].start, 298.0);
        assert_eq!(windows[3].end, 1000.0);
    }

    #[test]
    fn test_invalid_inputs_rejected() {
        assert!(plan(0.0, &ChunkingConfig::default()).is_err());
        assert!(plan(-5.0, &ChunkingConfig::default()).is_err());
        assert!(plan(f64::NAN, &ChunkingConfig::default()).is_err());
        assert!(plan(100.0, &config(10.0, 10.0, 5.0)).is_err());
        assert!(plan(100.0, &config(-1.0, 0.0, 5.0)).is_err());
    }

    #[test]
    fn test_zero_overlap_plans_back_to_back_windows() {
        // Overlap of zero is valid: windows abut with nothing to deduplicate
        let windows = plan(300.0, &config(100.0, 0.0, 50.0)).unwrap();
        assert_eq!(windows.len(), 3);
        assert_eq!(windows[0].end, windows[1].start);
        assert_eq!(windows[1].end, windows[2].start);
        assert_eq!(windows[2].end, 300.0);
    }

    #[test]
    fn test_determinism() {
        let cfg = config(30.0, 5.0, 10.0);
        assert_eq!(plan(123.4, &cfg).unwrap(), plan(123.4, &cfg).unwrap());
    }

    proptest! {
        #[test]
        fn prop_windows_cover_source_without_gaps(
            total in 1.0f64..10_000.0,
            chunk in 1.0f64..1_000.0,
            overlap_frac in 0.0f64..0.9,
            min in 0.1f64..500.0,
        ) {
            let overlap = chunk * overlap_frac;
            let windows = plan(total, &config(chunk, overlap, min)).unwrap();

            prop_assert!(!windows.is_empty());
            prop_assert_eq!(windows[0].start, 0.0);
            prop_assert_eq!(windows[windows.len() - 1].end, total);

            for (i, pair) in windows.windows(2).enumerate() {
                // Strictly increasing indices, no gaps between neighbors
                prop_assert_eq!(pair[0].index, i);
                prop_assert_eq!(pair[1].index, i + 1);
                prop_assert!(pair[1].start <= pair[0].end);

                // Non-final pairs overlap by exactly the configured amount
                if pair[1].end < total {
                    prop_assert!((pair[0].end - pair[1].start - overlap).abs() < 1e-6);
                }
            }

            for window in &windows {
                prop_assert!(window.start < window.end);
            }
        }
    }
}
