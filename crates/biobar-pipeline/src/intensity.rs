//! Intensity-distribution shape statistics over early and late windows.
//!
//! Two windows of `N = ceil(frames_evaluation_percent * num_frames)`
//! frames are compared: one starting at `first_frame`, one ending at
//! `last_frame`. Every frame in either window contributes its excess
//! kurtosis and two Pearson skewness coefficients.

use std::ops::Range;

use ndarray::Axis;
use tracing::debug;

use crate::config::IntensityConfig;
use crate::record::Recorder;
use crate::results::{FLAG_DIM, FLAG_SATURATED, IntensityResults};
use crate::stats::{DistributionStats, mean, top_decile_average, value_counts};
use crate::types::{ChannelView, PipelineError};

/// Per-frame statistics of one window, in frame order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindowStats {
    /// Excess kurtosis of each frame.
    pub kurtosis: Vec<f64>,
    /// Median skewness of each frame.
    pub median_skew: Vec<f64>,
    /// Mode skewness of each frame.
    pub mode_skew: Vec<f64>,
}

impl WindowStats {
    fn push(&mut self, stats: &DistributionStats) {
        self.kurtosis.push(stats.kurtosis);
        self.median_skew.push(stats.median_skewness());
        self.mode_skew.push(stats.mode_skewness());
    }
}

/// Series behind an [`IntensityResults`], for plotting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntensityTrace {
    /// Frames of the early window.
    pub early_frames: Range<usize>,
    /// Frames of the late window.
    pub late_frames: Range<usize>,
    /// Early window statistics.
    pub early: WindowStats,
    /// Late window statistics.
    pub late: WindowStats,
}

/// Result and trace of one intensity run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntensityOutput {
    /// Reduced metrics.
    pub results: IntensityResults,
    /// Intermediate series.
    pub trace: IntensityTrace,
}

/// Resolve the early and late windows for a video of `num_frames`.
///
/// `last_frame == 0` means the end of the video. If the early window
/// would reach the end of the video it restarts at frame 0.
///
/// # Errors
///
/// Returns [`PipelineError::FrameRange`] if either window falls outside
/// `0..num_frames`.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap
)]
pub fn windows(
    num_frames: usize,
    config: &IntensityConfig,
) -> Result<(Range<usize>, Range<usize>), PipelineError> {
    let window = (config.frames_evaluation_percent * num_frames as f64).ceil() as usize;
    let n = num_frames as i64;
    let len = window as i64;

    let mut first = config.first_frame as i64;
    let mut last = if config.last_frame == 0 {
        n
    } else {
        config.last_frame as i64
    };
    if first + len >= n {
        first = 0;
    }
    if last + n - len < 0 {
        last = 0;
    }

    let checked = |start: i64, end: i64| {
        if start < 0 || end > n {
            return Err(PipelineError::FrameRange {
                start,
                end,
                num_frames,
            });
        }
        Ok(start as usize..end as usize)
    };
    Ok((checked(first, first + len)?, checked(last - len, last)?))
}

/// Run the intensity distribution engine on one channel.
///
/// An all-zero channel yields `NaN` metrics with flag [`FLAG_DIM`]
/// without computing any statistic.
///
/// # Errors
///
/// Returns [`PipelineError::FrameRange`] for windows outside the video,
/// and propagates errors raised by `recorder`.
pub fn analyze(
    channel: ChannelView<'_>,
    config: &IntensityConfig,
    recorder: &mut impl Recorder,
) -> Result<IntensityOutput, PipelineError> {
    debug!("beginning intensity distribution analysis");
    if channel.iter().all(|v| *v == 0.0) {
        debug!("channel is empty, skipping intensity distribution");
        return Ok(IntensityOutput {
            results: IntensityResults {
                flag: FLAG_DIM,
                ..IntensityResults::default()
            },
            trace: IntensityTrace::default(),
        });
    }

    let (early_frames, late_frames) = windows(channel.len_of(Axis(0)), config)?;
    let mut early = WindowStats::default();
    let mut late = WindowStats::default();
    let mut saturated = true;

    for (range, window) in [(&early_frames, &mut early), (&late_frames, &mut late)] {
        for index in range.clone() {
            let frame = channel.index_axis(Axis(0), index);
            let (values, counts) = value_counts(&frame);
            recorder.intensity_histogram(index, &values, &counts)?;
            if let Some(stats) = DistributionStats::from_array(&frame) {
                saturated &= stats.is_saturated();
                window.push(&stats);
            }
        }
    }

    let combined = |pick: fn(&WindowStats) -> &[f64]| {
        let mut all = pick(&early).to_vec();
        all.extend_from_slice(pick(&late));
        top_decile_average(&all)
    };
    let diff = |pick: fn(&WindowStats) -> &[f64]| mean(pick(&late)) - mean(pick(&early));

    let results = IntensityResults {
        max_kurtosis: combined(|w| &w.kurtosis),
        max_median_skew: combined(|w| &w.median_skew),
        max_mode_skew: combined(|w| &w.mode_skew),
        kurtosis_diff: diff(|w| &w.kurtosis),
        median_skew_diff: diff(|w| &w.median_skew),
        mode_skew_diff: diff(|w| &w.mode_skew),
        flag: if saturated { FLAG_SATURATED } else { 0 },
    };
    Ok(IntensityOutput {
        results,
        trace: IntensityTrace {
            early_frames,
            late_frames,
            early,
            late,
        },
    })
}
