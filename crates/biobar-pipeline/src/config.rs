//! Analysis configuration.
//!
//! Every section deserializes with `#[serde(default)]`, so a partial JSON
//! document (or `{}`) yields a usable configuration. Field defaults are
//! exposed as `DEFAULT_*` associated constants for front ends that need
//! them (e.g. CLI flag defaults).

use serde::{Deserialize, Serialize};

use crate::connectivity::LabelerKind;
use crate::flow_field::FlowEstimatorKind;
use crate::types::{AnalysisModule, PipelineError};

/// Complete configuration for one batch run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Which channels of each file to analyse.
    pub channels: ChannelSelection,
    /// Dim-image and dim-channel acceptance.
    pub quality: QualityConfig,
    /// Which engines to run.
    pub modules: ModuleSelection,
    /// Binarization engine parameters.
    pub binarization: BinarizationConfig,
    /// Optical flow engine parameters.
    pub optical_flow: OpticalFlowConfig,
    /// Intensity distribution engine parameters.
    pub intensity: IntensityConfig,
    /// Output toggles consumed by front ends.
    pub output: OutputConfig,
    /// Connected-component backend used by the binarization engine.
    pub labeler: LabelerKind,
}

/// Channel selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelSelection {
    /// Analyse every channel instead of `selected_channel`.
    pub parse_all_channels: bool,
    /// Channel to analyse; negative values count from the end.
    pub selected_channel: i64,
}

/// Quality gates applied before analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Analyse files whose first frame is dim.
    pub accept_dim_images: bool,
    /// Analyse channels that are dim (they get flagged instead).
    pub accept_dim_channels: bool,
}

/// Engine enable flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleSelection {
    /// Run the binarization engine.
    pub binarization: bool,
    /// Run the optical flow engine.
    pub optical_flow: bool,
    /// Run the intensity distribution engine.
    pub intensity_distribution: bool,
}

impl ModuleSelection {
    /// Every engine enabled.
    pub const ALL: Self = Self {
        binarization: true,
        optical_flow: true,
        intensity_distribution: true,
    };

    /// Whether `module` is enabled.
    #[must_use]
    pub const fn is_enabled(&self, module: AnalysisModule) -> bool {
        match module {
            AnalysisModule::Binarization => self.binarization,
            AnalysisModule::OpticalFlow => self.optical_flow,
            AnalysisModule::IntensityDistribution => self.intensity_distribution,
        }
    }

    /// Enabled modules in execution order.
    pub fn enabled(&self) -> impl Iterator<Item = AnalysisModule> + '_ {
        AnalysisModule::ALL
            .into_iter()
            .filter(move |m| self.is_enabled(*m))
    }
}

/// Binarization engine parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BinarizationConfig {
    /// Relative offset of the threshold from the frame mean. A pixel is
    /// foreground when `value >= mean * (1 + threshold_offset)`.
    pub threshold_offset: f64,
    /// Evaluate every `frame_step`-th frame.
    pub frame_step: usize,
    /// Start of the plotting window as a fraction of the video.
    pub frame_start_percent: f64,
    /// End of the percent-change averaging window as a fraction of the
    /// sampled frames.
    pub frame_stop_percent: f64,
    /// Fraction of sampled frames averaged into the baseline.
    pub frame_initial_percent: f64,
}

impl BinarizationConfig {
    /// Default threshold offset.
    pub const DEFAULT_THRESHOLD_OFFSET: f64 = 0.1;
    /// Default frame step.
    pub const DEFAULT_FRAME_STEP: usize = 10;
    /// Default plot window start.
    pub const DEFAULT_FRAME_START_PERCENT: f64 = 0.9;
    /// Default averaging window end.
    pub const DEFAULT_FRAME_STOP_PERCENT: f64 = 1.0;
    /// Default baseline window.
    pub const DEFAULT_FRAME_INITIAL_PERCENT: f64 = 0.05;
}

impl Default for BinarizationConfig {
    fn default() -> Self {
        Self {
            threshold_offset: Self::DEFAULT_THRESHOLD_OFFSET,
            frame_step: Self::DEFAULT_FRAME_STEP,
            frame_start_percent: Self::DEFAULT_FRAME_START_PERCENT,
            frame_stop_percent: Self::DEFAULT_FRAME_STOP_PERCENT,
            frame_initial_percent: Self::DEFAULT_FRAME_INITIAL_PERCENT,
        }
    }
}

/// Optical flow engine parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpticalFlowConfig {
    /// Gap in frames between the two frames of a pair.
    pub frame_step: usize,
    /// Side length of the estimator's averaging window.
    pub window_size: usize,
    /// Block pooling factor applied to the flow field.
    pub downsample_factor: usize,
    /// Spatial calibration in nanometres per pixel.
    pub nm_pixel_ratio: f64,
    /// Seconds between consecutive frames; 0 is treated as 1.
    pub frame_interval_s: f64,
    /// Dense flow backend.
    pub estimator: FlowEstimatorKind,
}

impl OpticalFlowConfig {
    /// Default frame step.
    pub const DEFAULT_FRAME_STEP: usize = 10;
    /// Default window size.
    pub const DEFAULT_WINDOW_SIZE: usize = 32;
    /// Default downsample factor.
    pub const DEFAULT_DOWNSAMPLE_FACTOR: usize = 8;
    /// Default spatial calibration.
    pub const DEFAULT_NM_PIXEL_RATIO: f64 = 1.0;
    /// Default frame interval.
    pub const DEFAULT_FRAME_INTERVAL_S: f64 = 1.0;
}

impl Default for OpticalFlowConfig {
    fn default() -> Self {
        Self {
            frame_step: Self::DEFAULT_FRAME_STEP,
            window_size: Self::DEFAULT_WINDOW_SIZE,
            downsample_factor: Self::DEFAULT_DOWNSAMPLE_FACTOR,
            nm_pixel_ratio: Self::DEFAULT_NM_PIXEL_RATIO,
            frame_interval_s: Self::DEFAULT_FRAME_INTERVAL_S,
            estimator: FlowEstimatorKind::default(),
        }
    }
}

/// Intensity distribution engine parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntensityConfig {
    /// First frame of the early window.
    pub first_frame: usize,
    /// One past the last frame of the late window; 0 means the end of
    /// the video.
    pub last_frame: usize,
    /// Window length as a fraction of the video.
    pub frames_evaluation_percent: f64,
}

impl IntensityConfig {
    /// Default early window start.
    pub const DEFAULT_FIRST_FRAME: usize = 1;
    /// Default late window end (auto).
    pub const DEFAULT_LAST_FRAME: usize = 0;
    /// Default window fraction.
    pub const DEFAULT_FRAMES_EVALUATION_PERCENT: f64 = 0.1;
}

impl Default for IntensityConfig {
    fn default() -> Self {
        Self {
            first_frame: Self::DEFAULT_FIRST_FRAME,
            last_frame: Self::DEFAULT_LAST_FRAME,
            frames_evaluation_percent: Self::DEFAULT_FRAMES_EVALUATION_PERCENT,
        }
    }
}

/// Output toggles. The pipeline only carries these; front ends act on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Record per-frame intermediate data.
    pub save_intermediates: bool,
    /// Render a barcode for the whole batch.
    pub generate_dataset_barcode: bool,
    /// Render one barcode per channel instead of one combined barcode.
    pub separate_channels: bool,
}

impl AnalysisConfig {
    /// Check parameter ranges.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] naming the first
    /// offending field.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let invalid = |msg: &str| Err(PipelineError::InvalidConfig(msg.to_string()));
        let b = &self.binarization;
        let f = &self.optical_flow;
        let i = &self.intensity;

        if !b.threshold_offset.is_finite() {
            return invalid("binarization.threshold_offset must be finite");
        }
        if b.frame_step == 0 {
            return invalid("binarization.frame_step must be at least 1");
        }
        if !(0.0..=1.0).contains(&b.frame_start_percent) {
            return invalid("binarization.frame_start_percent must be within [0, 1]");
        }
        if !(b.frame_stop_percent > 0.0 && b.frame_stop_percent <= 1.0) {
            return invalid("binarization.frame_stop_percent must be within (0, 1]");
        }
        if !(0.0..=1.0).contains(&b.frame_initial_percent) {
            return invalid("binarization.frame_initial_percent must be within [0, 1]");
        }
        if f.frame_step == 0 {
            return invalid("optical_flow.frame_step must be at least 1");
        }
        if f.window_size == 0 {
            return invalid("optical_flow.window_size must be at least 1");
        }
        if f.downsample_factor == 0 {
            return invalid("optical_flow.downsample_factor must be at least 1");
        }
        if !(f.nm_pixel_ratio.is_finite() && f.nm_pixel_ratio > 0.0) {
            return invalid("optical_flow.nm_pixel_ratio must be finite and positive");
        }
        if !(f.frame_interval_s.is_finite() && f.frame_interval_s >= 0.0) {
            return invalid("optical_flow.frame_interval_s must be finite and non-negative");
        }
        if !(0.0..=1.0).contains(&i.frames_evaluation_percent) {
            return invalid("intensity.frames_evaluation_percent must be within [0, 1]");
        }
        Ok(())
    }
}
