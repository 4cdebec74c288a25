//! Frame sampling: which frames (or frame pairs) an engine evaluates.
//!
//! Both sampling modes cover the whole video even when the requested
//! step does not divide the frame count, and both shrink an oversized
//! step by repeatedly applying `ceil(step / 5)` until a non-degenerate
//! sampling exists. The shrink is logged but never surfaced as an error;
//! only a video too short for any step is rejected.

use tracing::warn;

use crate::types::PipelineError;

/// Divisor applied to an oversized step on each shrink iteration.
pub const SHRINK_DIVISOR: usize = 5;

/// A `(start, end)` pair of frame indices with `start < end`.
pub type FramePair = (usize, usize);

/// Frame indices chosen for per-frame evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSelection {
    /// Ascending, deduplicated indices; always ends with `num_frames - 1`.
    pub indices: Vec<usize>,
    /// Step after adaptive shrinking.
    pub step: usize,
    /// Step as requested by the caller.
    pub requested_step: usize,
}

/// Frame pairs chosen for flow evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairSelection {
    /// Ordered pairs; the last one always ends at `num_frames - 1`.
    pub pairs: Vec<FramePair>,
    /// Step after adaptive shrinking.
    pub step: usize,
    /// Step as requested by the caller.
    pub requested_step: usize,
}

const fn shrink(step: usize) -> usize {
    step.div_ceil(SHRINK_DIVISOR)
}

/// Select frames `0, step, 2*step, ...` plus the final frame.
///
/// If `step >= num_frames` it is shrunk until it fits, so any video with
/// at least two frames yields at least two samples. A single-frame video
/// yields `[0]`. A zero step is treated as one.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidSampling`] for an empty video.
pub fn frame_indices(num_frames: usize, step: usize) -> Result<FrameSelection, PipelineError> {
    let requested_step = step;
    let mut step = step.max(1);
    if num_frames == 0 {
        return Err(PipelineError::InvalidSampling(
            "cannot sample frames of an empty video".to_string(),
        ));
    }
    if num_frames > 1 {
        while step >= num_frames {
            step = shrink(step);
            warn!(step, num_frames, "frame step too large for video, shrinking");
        }
    }

    let mut indices: Vec<usize> = (0..num_frames).step_by(step).collect();
    let last = num_frames - 1;
    if last % step != 0 {
        indices.push(last);
    }
    Ok(FrameSelection {
        indices,
        step,
        requested_step,
    })
}

/// Select consecutive `(start, start + step)` pairs plus a tail pair.
///
/// Regular pairs start at `0, step, ...` strictly before
/// `end = (num_frames / step - 1) * step`; if `end` is not the final
/// frame, a tail pair `(end, num_frames - 1)` closes the span. When `end`
/// would be non-positive the step is shrunk until it is not.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidSampling`] for videos with fewer than
/// two frames, where no step forms a pair.
pub fn frame_pairs(num_frames: usize, step: usize) -> Result<PairSelection, PipelineError> {
    let requested_step = step;
    let mut step = step.max(1);
    if num_frames < 2 {
        return Err(PipelineError::InvalidSampling(format!(
            "a flow pair needs at least 2 frames, the video has {num_frames}"
        )));
    }

    let end_frame = |step: usize| (num_frames / step).saturating_sub(1) * step;
    let mut end = end_frame(step);
    while end == 0 {
        step = shrink(step);
        warn!(step, num_frames, "flow frame step too large for video, shrinking");
        end = end_frame(step);
    }

    let last = num_frames - 1;
    let mut pairs: Vec<FramePair> = (0..end)
        .step_by(step)
        .map(|start| (start, (start + step).min(last)))
        .collect();
    if end != last {
        pairs.push((end, last));
    }
    Ok(PairSelection {
        pairs,
        step,
        requested_step,
    })
}

/// Frames to preview for a per-frame sampling: first, middle, last.
///
/// The middle frame is taken from the sampling the caller *requested*
/// (before any shrink). When that sampling holds a single frame, only
/// frame 0 is previewed. The result is ascending and deduplicated.
#[must_use]
pub fn preview_indices(num_frames: usize, requested_step: usize) -> Vec<usize> {
    if num_frames == 0 {
        return Vec::new();
    }
    let requested: Vec<usize> = (0..num_frames).step_by(requested_step.max(1)).collect();
    if requested.len() <= 1 {
        return vec![0];
    }
    let middle = requested[(requested.len() - 1) / 2];
    dedup_sorted(vec![0, middle, num_frames - 1])
}

/// Pair starts to preview for a flow sampling: first, middle, last.
///
/// The middle start is taken from `0..last_start` stepped by the
/// requested step. When that range holds at most one start, only frame 0
/// is previewed.
#[must_use]
pub fn preview_pair_starts(selection: &PairSelection) -> Vec<usize> {
    let Some(&(last_start, _)) = selection.pairs.last() else {
        return Vec::new();
    };
    let requested: Vec<usize> = (0..last_start)
        .step_by(selection.requested_step.max(1))
        .collect();
    if requested.len() <= 1 {
        return vec![0];
    }
    let middle = requested[(requested.len() - 1) / 2];
    dedup_sorted(vec![0, middle, last_start])
}

fn dedup_sorted(mut values: Vec<usize>) -> Vec<usize> {
    values.sort_unstable();
    values.dedup();
    values
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn indices_even_division_appends_last() {
        let sel = frame_indices(10, 2).unwrap();
        assert_eq!(sel.indices, vec![0, 2, 4, 6, 8, 9]);
        assert_eq!(sel.step, 2);
    }

    #[test]
    fn indices_last_already_on_grid() {
        let sel = frame_indices(11, 5).unwrap();
        assert_eq!(sel.indices, vec![0, 5, 10]);
    }

    #[test]
    fn indices_shrink_oversized_step() {
        // 10 >= 7 -> ceil(10 / 5) = 2.
        let sel = frame_indices(7, 10).unwrap();
        assert_eq!(sel.step, 2);
        assert_eq!(sel.requested_step, 10);
        assert_eq!(sel.indices, vec![0, 2, 4, 6]);
    }

    #[test]
    fn indices_shrink_repeats() {
        // 100 -> 20 -> 4 (< 5).
        let sel = frame_indices(5, 100).unwrap();
        assert_eq!(sel.step, 4);
        assert_eq!(sel.indices, vec![0, 4]);
    }

    #[test]
    fn indices_two_frames_huge_step() {
        let sel = frame_indices(2, 1000).unwrap();
        assert_eq!(sel.step, 1);
        assert_eq!(sel.indices, vec![0, 1]);
    }

    #[test]
    fn indices_single_frame() {
        assert_eq!(frame_indices(1, 10).unwrap().indices, vec![0]);
    }

    #[test]
    fn indices_empty_video() {
        assert!(matches!(
            frame_indices(0, 3),
            Err(PipelineError::InvalidSampling(_))
        ));
    }

    #[test]
    fn indices_zero_step_is_one() {
        assert_eq!(frame_indices(3, 0).unwrap().indices, vec![0, 1, 2]);
    }

    #[test]
    fn pairs_regular_grid() {
        // end = (21 / 10 - 1) * 10 = 10 -> (0,10), tail (10,20).
        let sel = frame_pairs(21, 10).unwrap();
        assert_eq!(sel.pairs, vec![(0, 10), (10, 20)]);
    }

    #[test]
    fn pairs_tail_spans_remainder() {
        // end = (25 / 10 - 1) * 10 = 10 -> (0,10), tail (10,24).
        let sel = frame_pairs(25, 10).unwrap();
        assert_eq!(sel.pairs, vec![(0, 10), (10, 24)]);
    }

    #[test]
    fn pairs_three_steps() {
        let sel = frame_pairs(30, 10).unwrap();
        assert_eq!(sel.pairs, vec![(0, 10), (10, 20), (20, 29)]);
    }

    #[test]
    fn pairs_shrink_when_step_covers_video() {
        // end = (10 / 10 - 1) * 10 = 0 -> step 2 -> end 8.
        let sel = frame_pairs(10, 10).unwrap();
        assert_eq!(sel.step, 2);
        assert_eq!(sel.pairs, vec![(0, 2), (2, 4), (4, 6), (6, 8), (8, 9)]);
    }

    #[test]
    fn pairs_two_frames() {
        let sel = frame_pairs(2, 10).unwrap();
        assert_eq!(sel.step, 1);
        assert_eq!(sel.pairs, vec![(0, 1)]);
    }

    #[test]
    fn pairs_too_short_video() {
        assert!(matches!(
            frame_pairs(1, 1),
            Err(PipelineError::InvalidSampling(_))
        ));
        assert!(frame_pairs(0, 1).is_err());
    }

    #[test]
    fn pairs_are_forward() {
        for n in 2..60 {
            for step in 1..40 {
                for (start, end) in frame_pairs(n, step).unwrap().pairs {
                    assert!(start < end, "n={n} step={step} pair=({start},{end})");
                    assert!(end < n);
                }
            }
        }
    }

    #[test]
    fn preview_first_middle_last() {
        // Requested samples 0,2,4,6,8 -> middle 4.
        assert_eq!(preview_indices(10, 2), vec![0, 4, 9]);
    }

    #[test]
    fn preview_uses_requested_step() {
        // Requested step 100 on 10 frames -> samples [0].
        assert_eq!(preview_indices(10, 100), vec![0]);
    }

    #[test]
    fn preview_pairs() {
        let sel = frame_pairs(30, 10).unwrap();
        // last start 20; requested starts 0,10 -> middle 0.
        assert_eq!(preview_pair_starts(&sel), vec![0, 20]);
        let sel = frame_pairs(100, 10).unwrap();
        // last start 90; starts 0..90 step 10 -> 9 values -> middle index 4 -> 40.
        assert_eq!(preview_pair_starts(&sel), vec![0, 40, 90]);
    }

    #[test]
    fn preview_pairs_short_range_is_first_only() {
        // last start 10; starts 0..10 step 10 -> [0].
        assert_eq!(preview_pair_starts(&frame_pairs(21, 10).unwrap()), vec![0]);
    }

    #[test]
    fn preview_pairs_empty() {
        let sel = PairSelection {
            pairs: Vec::new(),
            step: 3,
            requested_step: 3,
        };
        assert!(preview_pair_starts(&sel).is_empty());
    }
}
