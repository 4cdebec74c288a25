//! Percolation and region analysis on binarized frames.
//!
//! Each sampled frame is thresholded against its own mean, pooled to a
//! coarser binary grid, and labelled with 8-connectivity. The largest
//! foreground region is the *island*, the largest background region the
//! *void*, and the frame *spans* when one foreground region touches two
//! opposite edges. Per-frame measurements are then reduced to a
//! [`BinarizationResults`].

use ndarray::Axis;
use tracing::debug;

use crate::config::BinarizationConfig;
use crate::connectivity::{RegionLabeler, invert, rank_by_area, ranked_regions, regions, spans};
use crate::downsample::{MASK_POOL_FACTOR, pool_mask};
use crate::record::Recorder;
use crate::results::BinarizationResults;
use crate::sampler::{frame_indices, preview_indices};
use crate::stats::{baseline, mean, top_decile_average};
use crate::types::{ChannelView, FrameView, Mask, PipelineError};

/// Measurements of one pooled binary frame. Areas are in pooled pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameMetrics {
    /// Largest foreground region; the whole grid if there is no foreground.
    pub island_area: f64,
    /// Second-largest foreground region; 0 with fewer than two regions.
    pub island_area_2nd: f64,
    /// `(row, col)` centroid of the largest foreground region.
    pub island_position: Option<(f64, f64)>,
    /// Whether the foreground percolates across either axis.
    pub is_connected: bool,
    /// Largest background region; the whole grid if there is no background.
    pub void_area: f64,
}

/// Series behind a [`BinarizationResults`], for plotting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BinarizationTrace {
    /// Frame indices that were evaluated.
    pub sampled_frames: Vec<usize>,
    /// Frames chosen for before/after previews.
    pub preview_frames: Vec<usize>,
    /// Step actually used after adaptive shrinking.
    pub step: usize,
    /// Per-sample measurements.
    pub frames: Vec<FrameMetrics>,
    /// Island area of each sample divided by the baseline.
    pub island_gain: Vec<f64>,
    /// Void area of each sample divided by the baseline.
    pub void_gain: Vec<f64>,
    /// First sample of the plotting window.
    pub plot_start: usize,
    /// One past the last sample of the averaging and plotting window.
    pub plot_stop: usize,
}

/// Result and trace of one binarization run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BinarizationOutput {
    /// Reduced metrics.
    pub results: BinarizationResults,
    /// Intermediate series.
    pub trace: BinarizationTrace,
}

/// Threshold a frame against its own mean.
///
/// A pixel is foreground (1) when `value >= mean * (1 + threshold_offset)`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn binarize(frame: FrameView<'_>, threshold_offset: f64) -> Mask {
    let mean = frame.iter().map(|v| f64::from(*v)).sum::<f64>() / frame.len() as f64;
    let threshold = mean * (1.0 + threshold_offset);
    frame.mapv(|v| u8::from(f64::from(v) >= threshold))
}

/// Measure islands, voids and percolation on a binary grid.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn frame_metrics(labeler: &impl RegionLabeler, mask: &Mask) -> FrameMetrics {
    let total = mask.len() as f64;
    let labels = labeler.label(mask);
    let islands = rank_by_area(regions(&labels));
    let voids = ranked_regions(labeler, &invert(mask));
    FrameMetrics {
        island_area: islands.first().map_or(total, |r| r.area as f64),
        island_area_2nd: islands.get(1).map_or(0.0, |r| r.area as f64),
        island_position: islands.first().map(|r| r.centroid),
        is_connected: spans(&labels),
        void_area: voids.first().map_or(total, |r| r.area as f64),
    }
}

/// Run the binarization engine on one channel.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] for an all-zero channel, without
/// evaluating any frame. Sampling and `recorder` errors are propagated.
pub fn analyze(
    channel: ChannelView<'_>,
    config: &BinarizationConfig,
    labeler: &impl RegionLabeler,
    recorder: &mut impl Recorder,
) -> Result<BinarizationOutput, PipelineError> {
    debug!("beginning binarization analysis");
    if channel.iter().all(|v| *v == 0.0) {
        return Err(PipelineError::EmptyInput);
    }

    let num_frames = channel.len_of(Axis(0));
    let selection = frame_indices(num_frames, config.frame_step)?;
    let mut frames = Vec::with_capacity(selection.indices.len());
    let mut fov = 0;
    for &index in &selection.indices {
        let mask = binarize(channel.index_axis(Axis(0), index), config.threshold_offset);
        let pooled = pool_mask(&mask, MASK_POOL_FACTOR);
        recorder.binarized_frame(index, &pooled)?;
        fov = pooled.len();
        frames.push(frame_metrics(labeler, &pooled));
    }

    let mut output = reduce(frames, fov, config);
    output.trace.plot_start = plot_start(num_frames, config.frame_start_percent, selection.step);
    output.trace.preview_frames = preview_indices(num_frames, selection.requested_step);
    output.trace.sampled_frames = selection.indices;
    output.trace.step = selection.step;
    Ok(output)
}

#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn plot_start(num_frames: usize, start_percent: f64, step: usize) -> usize {
    (num_frames as f64 * start_percent / step as f64).floor() as usize
}

/// Reduce per-frame measurements; `fov` is the pooled grid pixel count.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn reduce(frames: Vec<FrameMetrics>, fov: usize, config: &BinarizationConfig) -> BinarizationOutput {
    let len = frames.len();
    let islands: Vec<f64> = frames.iter().map(|f| f.island_area).collect();
    let islands_2nd: Vec<f64> = frames.iter().map(|f| f.island_area_2nd).collect();
    let voids: Vec<f64> = frames.iter().map(|f| f.void_area).collect();
    let connected = frames.iter().filter(|f| f.is_connected).count();

    let initial = ((len as f64 * config.frame_initial_percent).ceil() as usize).max(1);
    let stop = ((len as f64 * config.frame_stop_percent).ceil() as usize).min(len);

    let island_base = baseline(&islands, initial);
    let island_2nd_base = baseline(&islands_2nd, initial);
    let void_base = baseline(&voids, initial);
    let fov = fov as f64;

    let results = BinarizationResults {
        spanning: connected as f64 / len as f64,
        max_island_size: top_decile_average(&islands) / fov,
        max_void_size: top_decile_average(&voids) / fov,
        avg_island_percent_change: mean(&islands[..stop]) / island_base,
        avg_void_percent_change: mean(&voids[..stop]) / void_base,
        island_size_initial: island_base / fov,
        island_size_initial2: island_2nd_base / fov,
    };
    let trace = BinarizationTrace {
        island_gain: islands.iter().map(|v| v / island_base).collect(),
        void_gain: voids.iter().map(|v| v / void_base).collect(),
        plot_stop: stop,
        frames,
        ..BinarizationTrace::default()
    };
    BinarizationOutput { results, trace }
}
