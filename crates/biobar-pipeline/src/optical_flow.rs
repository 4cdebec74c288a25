//! Flow-field direction and speed statistics.
//!
//! For every sampled frame pair a dense flow field is estimated, pooled
//! by `downsample_factor`, flipped upside down into plot orientation and
//! reduced to a mean direction, a direction spread and a mean
//! speed in nanometres per second.

use ndarray::{Axis, s};
use tracing::debug;

use crate::config::OpticalFlowConfig;
use crate::downsample::block_mean;
use crate::flow_field::FlowEstimator;
use crate::record::Recorder;
use crate::results::FlowResults;
use crate::sampler::{FramePair, frame_pairs, preview_pair_starts};
use crate::stats::{mean, std_dev};
use crate::types::{ChannelView, PipelineError, VideoMetadata};

/// Statistics of one frame pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairStats {
    /// Mean direction in radians, within `[-pi, pi]`.
    pub theta: f64,
    /// Standard deviation of direction in radians.
    pub sigma_theta: f64,
    /// Mean speed in nm/s.
    pub speed: f64,
}

/// Series behind a [`FlowResults`], for plotting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlowTrace {
    /// Evaluated frame pairs.
    pub pairs: Vec<FramePair>,
    /// Pair starts chosen for field previews.
    pub preview_starts: Vec<usize>,
    /// Step actually used after adaptive shrinking.
    pub step: usize,
    /// Per-pair statistics, parallel to `pairs`.
    pub stats: Vec<PairStats>,
}

/// Result and trace of one flow run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlowOutput {
    /// Reduced metrics.
    pub results: FlowResults,
    /// Intermediate series.
    pub trace: FlowTrace,
}

/// Apply per-video calibration over the configured values.
#[must_use]
pub fn calibrated(config: &OpticalFlowConfig, metadata: &VideoMetadata) -> OpticalFlowConfig {
    OpticalFlowConfig {
        nm_pixel_ratio: metadata.nm_per_pixel.unwrap_or(config.nm_pixel_ratio),
        frame_interval_s: metadata
            .seconds_per_frame
            .unwrap_or(config.frame_interval_s),
        ..*config
    }
}

/// Factor converting pixels per frame gap into nm/s.
///
/// A zero frame interval is treated as one second.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn speed_factor(config: &OpticalFlowConfig, (start, end): FramePair) -> f64 {
    let interval = if config.frame_interval_s == 0.0 {
        1.0
    } else {
        config.frame_interval_s
    };
    config.nm_pixel_ratio / (interval * (end - start) as f64)
}

/// Run the optical flow engine on one channel.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] for an all-zero channel,
/// [`PipelineError::InvalidSampling`] for a video shorter than two frames
/// and [`PipelineError::InvalidConfig`] if `downsample_factor` exceeds the
/// frame size. Estimator and recorder errors are propagated.
pub fn analyze(
    channel: ChannelView<'_>,
    config: &OpticalFlowConfig,
    estimator: &impl FlowEstimator,
    recorder: &mut impl Recorder,
) -> Result<FlowOutput, PipelineError> {
    debug!("beginning flow analysis");
    if channel.iter().all(|v| *v == 0.0) {
        return Err(PipelineError::EmptyInput);
    }

    let (num_frames, height, width) = channel.dim();
    let factor = config.downsample_factor.max(1);
    if factor > height || factor > width {
        return Err(PipelineError::InvalidConfig(format!(
            "flow downsample factor {factor} exceeds frame size {height}x{width}"
        )));
    }

    let selection = frame_pairs(num_frames, config.frame_step)?;
    let mut stats = Vec::with_capacity(selection.pairs.len());
    for &(start, end) in &selection.pairs {
        let field = estimator.estimate(
            channel.index_axis(Axis(0), start),
            channel.index_axis(Axis(0), end),
            config.window_size,
        )?;
        let pooled_u = block_mean(&field.u, factor);
        let pooled_v = block_mean(&field.v, factor);
        let u = pooled_u.slice(s![..;-1, ..]);
        let v = pooled_v.slice(s![..;-1, ..]);
        recorder.flow_field(start, end, u, v)?;

        let to_nm_s = speed_factor(config, (start, end));
        let mut directions = Vec::with_capacity(u.len());
        let mut speeds = Vec::with_capacity(u.len());
        for (du, dv) in u.iter().zip(v.iter()) {
            let (du, dv) = (f64::from(*du), f64::from(*dv));
            directions.push(dv.atan2(du));
            speeds.push(du.hypot(dv) * to_nm_s);
        }
        stats.push(PairStats {
            theta: mean(&directions),
            sigma_theta: std_dev(&directions),
            speed: mean(&speeds),
        });
    }

    let thetas: Vec<f64> = stats.iter().map(|p| p.theta).collect();
    let sigmas: Vec<f64> = stats.iter().map(|p| p.sigma_theta).collect();
    let speeds: Vec<f64> = stats.iter().map(|p| p.speed).collect();
    let delta_speed = match (speeds.first(), speeds.last()) {
        (Some(first), Some(last)) => last - first,
        _ => f64::NAN,
    };

    Ok(FlowOutput {
        results: FlowResults {
            mean_speed: mean(&speeds),
            delta_speed,
            mean_theta: mean(&thetas),
            mean_sigma_theta: mean(&sigmas),
        },
        trace: FlowTrace {
            preview_starts: preview_pair_starts(&selection),
            pairs: selection.pairs,
            step: selection.step,
            stats,
        },
    })
}
