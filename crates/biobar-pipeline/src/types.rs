//! Shared types for the biobar analysis pipeline.

use std::fmt;

use ndarray::{Array2, Array4, ArrayView2, ArrayView3, Axis};
use serde::{Deserialize, Serialize};

/// A single channel of a video: axes are `(time, height, width)`.
pub type ChannelView<'a> = ArrayView3<'a, f32>;

/// A single grayscale frame: axes are `(height, width)`.
pub type FrameView<'a> = ArrayView2<'a, f32>;

/// Binary mask produced by binarization: 1 = foreground, 0 = background.
pub type Mask = Array2<u8>;

/// Optional physical calibration attached to a video.
///
/// When present, these override the optical flow configuration for the
/// video they belong to. Readers fill them from file metadata.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    /// Spatial calibration in nanometres per pixel.
    pub nm_per_pixel: Option<f64>,
    /// Temporal calibration in seconds between consecutive frames.
    pub seconds_per_frame: Option<f64>,
}

/// An immutable stack of frames with axes `(time, height, width, channel)`.
///
/// Intensities are stored as `f32` (exact for 8- and 16-bit sensor data);
/// every statistic is accumulated in `f64`.
#[derive(Debug, Clone)]
pub struct VideoTensor {
    data: Array4<f32>,
    metadata: VideoMetadata,
}

impl VideoTensor {
    /// Wrap a 4-D array as a video.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidTensor`] if any axis is empty or
    /// if any intensity is negative or not finite.
    pub fn new(data: Array4<f32>) -> Result<Self, PipelineError> {
        let (frames, height, width, channels) = data.dim();
        if frames == 0 || height == 0 || width == 0 || channels == 0 {
            return Err(PipelineError::InvalidTensor(format!(
                "every axis must be non-empty, got shape ({frames}, {height}, {width}, {channels})"
            )));
        }
        if data.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(PipelineError::InvalidTensor(
                "intensities must be finite and non-negative".to_string(),
            ));
        }
        Ok(Self {
            data,
            metadata: VideoMetadata::default(),
        })
    }

    /// Build a single-channel video from a sequence of equally sized frames.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidTensor`] if `frames` is empty, the
    /// frames differ in shape, or any value is invalid.
    pub fn from_frames(frames: &[Array2<f32>]) -> Result<Self, PipelineError> {
        let views: Vec<ArrayView2<'_, f32>> = frames.iter().map(|f| f.view()).collect();
        let stacked = ndarray::stack(Axis(0), &views)
            .map_err(|e| PipelineError::InvalidTensor(format!("cannot stack frames: {e}")))?;
        Self::new(stacked.insert_axis(Axis(3)))
    }

    /// Attach calibration metadata.
    #[must_use]
    pub const fn with_metadata(mut self, metadata: VideoMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Calibration metadata, if any was attached.
    #[must_use]
    pub const fn metadata(&self) -> &VideoMetadata {
        &self.metadata
    }

    /// Number of frames (time axis length).
    #[must_use]
    pub fn num_frames(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    /// Frame height in pixels.
    #[must_use]
    pub fn height(&self) -> usize {
        self.data.len_of(Axis(1))
    }

    /// Frame width in pixels.
    #[must_use]
    pub fn width(&self) -> usize {
        self.data.len_of(Axis(2))
    }

    /// Number of channels.
    #[must_use]
    pub fn num_channels(&self) -> usize {
        self.data.len_of(Axis(3))
    }

    /// View one channel as a `(time, height, width)` stack.
    ///
    /// Returns `None` if `channel` is out of range.
    #[must_use]
    pub fn channel(&self, channel: usize) -> Option<ChannelView<'_>> {
        (channel < self.num_channels()).then(|| self.data.index_axis(Axis(3), channel))
    }

    /// View one frame across all channels as `(height, width, channel)`.
    #[must_use]
    pub fn frame(&self, index: usize) -> Option<ArrayView3<'_, f32>> {
        (index < self.num_frames()).then(|| self.data.index_axis(Axis(0), index))
    }

    /// The underlying 4-D array.
    #[must_use]
    pub const fn as_array(&self) -> &Array4<f32> {
        &self.data
    }
}

/// One of the three independent analysis engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnalysisModule {
    /// Percolation / region analysis on binarized frames.
    Binarization,
    /// Flow-field direction and speed statistics.
    OpticalFlow,
    /// Intensity-distribution shape statistics.
    IntensityDistribution,
}

impl AnalysisModule {
    /// All modules in execution order.
    pub const ALL: [Self; 3] = [
        Self::Binarization,
        Self::OpticalFlow,
        Self::IntensityDistribution,
    ];
}

impl fmt::Display for AnalysisModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Binarization => f.write_str("Binarization"),
            Self::OpticalFlow => f.write_str("Optical Flow"),
            Self::IntensityDistribution => f.write_str("Intensity Distribution"),
        }
    }
}

/// Errors that can occur during analysis.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The frame stack contains only zeros.
    #[error("input contains no signal (all intensities are zero)")]
    EmptyInput,

    /// Configuration is invalid.
    #[error("invalid analysis configuration: {0}")]
    InvalidConfig(String),

    /// A frame sampling request could not be satisfied.
    #[error("invalid frame sampling: {0}")]
    InvalidSampling(String),

    /// The frame stack has an unusable shape or contents.
    #[error("invalid video tensor: {0}")]
    InvalidTensor(String),

    /// A requested frame window falls outside the video.
    #[error("frame window {start}..{end} is outside a video of {num_frames} frames")]
    FrameRange {
        /// First frame of the window (may be negative after arithmetic).
        start: i64,
        /// One past the last frame of the window.
        end: i64,
        /// Number of frames in the video.
        num_frames: usize,
    },

    /// A module failed while computing its metrics.
    #[error("{module} failed: {message}")]
    ModuleExecution {
        /// The failing module.
        module: AnalysisModule,
        /// Human-readable cause.
        message: String,
    },

    /// A file could not be read.
    #[error("cannot read {path}: {message}")]
    Io {
        /// Path of the unreadable file.
        path: String,
        /// Human-readable cause.
        message: String,
    },

    /// A frame image could not be decoded.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use ndarray::Array4;

    use super::*;

    #[test]
    fn new_rejects_empty_axis() {
        let data = Array4::<f32>::zeros((0, 4, 4, 1));
        assert!(matches!(
            VideoTensor::new(data),
            Err(PipelineError::InvalidTensor(_))
        ));
    }

    #[test]
    fn new_rejects_negative_values() {
        let mut data = Array4::<f32>::zeros((2, 2, 2, 1));
        data[[1, 0, 1, 0]] = -1.0;
        assert!(matches!(
            VideoTensor::new(data),
            Err(PipelineError::InvalidTensor(_))
        ));
    }

    #[test]
    fn new_rejects_nan() {
        let mut data = Array4::<f32>::zeros((2, 2, 2, 1));
        data[[0, 0, 0, 0]] = f32::NAN;
        assert!(VideoTensor::new(data).is_err());
    }

    #[test]
    fn shape_accessors() {
        let video = VideoTensor::new(Array4::zeros((5, 3, 4, 2))).unwrap();
        assert_eq!(video.num_frames(), 5);
        assert_eq!(video.height(), 3);
        assert_eq!(video.width(), 4);
        assert_eq!(video.num_channels(), 2);
    }

    #[test]
    fn channel_view_selects_last_axis() {
        let mut data = Array4::<f32>::zeros((2, 2, 2, 2));
        data[[1, 1, 0, 1]] = 7.0;
        let video = VideoTensor::new(data).unwrap();
        let ch1 = video.channel(1).unwrap();
        assert_eq!(ch1.dim(), (2, 2, 2));
        assert!((ch1[[1, 1, 0]] - 7.0).abs() < f32::EPSILON);
        assert!(video.channel(0).unwrap().iter().all(|v| *v == 0.0));
        assert!(video.channel(2).is_none());
    }

    #[test]
    fn from_frames_stacks_single_channel() {
        let frames = vec![Array2::from_elem((3, 4), 1.0_f32); 6];
        let video = VideoTensor::from_frames(&frames).unwrap();
        assert_eq!(video.num_frames(), 6);
        assert_eq!(video.num_channels(), 1);
    }

    #[test]
    fn from_frames_rejects_mismatched_shapes() {
        let frames = vec![Array2::zeros((3, 4)), Array2::zeros((4, 3))];
        assert!(VideoTensor::from_frames(&frames).is_err());
    }

    #[test]
    fn metadata_defaults_to_none() {
        let video = VideoTensor::new(Array4::zeros((1, 1, 1, 1))).unwrap();
        assert_eq!(video.metadata(), &VideoMetadata::default());
        let calibrated = video.with_metadata(VideoMetadata {
            nm_per_pixel: Some(65.0),
            seconds_per_frame: Some(0.5),
        });
        assert_eq!(calibrated.metadata().nm_per_pixel, Some(65.0));
    }

    #[test]
    fn module_display_names() {
        assert_eq!(AnalysisModule::Binarization.to_string(), "Binarization");
        assert_eq!(AnalysisModule::OpticalFlow.to_string(), "Optical Flow");
        assert_eq!(
            AnalysisModule::IntensityDistribution.to_string(),
            "Intensity Distribution"
        );
    }
}
