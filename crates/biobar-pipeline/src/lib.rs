//! biobar-pipeline: Quantitative analysis of time-lapse microscopy (sans-IO).
//!
//! Reduces every channel of a `(time, height, width, channel)` frame stack
//! to a fixed vector of scalar metrics through three independent engines:
//!
//! - [`binarization`]: threshold -> pool -> label -> island, void and
//!   percolation statistics.
//! - [`optical_flow`]: dense flow between frame pairs -> direction and
//!   speed statistics.
//! - [`intensity`]: kurtosis and skewness of early versus late frames.
//!
//! The [`pipeline`] orchestrator runs them per file and channel with
//! failure isolation, and [`barcode`] turns the results into colour
//! strips.
//!
//! This crate has **no I/O dependencies** -- it operates on in-memory
//! arrays and returns structured data. Reading videos and writing CSV or
//! PNG files lives in `biobar-export` and the `biobar` binary.

pub mod barcode;
pub mod binarization;
pub mod config;
pub mod connectivity;
pub mod diagnostics;
pub mod downsample;
pub mod flow_field;
pub mod intensity;
pub mod optical_flow;
pub mod pipeline;
pub mod record;
pub mod results;
pub mod sampler;
pub mod stats;
pub mod types;

pub use barcode::{Barcode, Grouping, Limits};
pub use config::AnalysisConfig;
pub use connectivity::{LabelerKind, RegionLabeler};
pub use diagnostics::{BatchDiagnostics, Clock};
pub use flow_field::{FlowEstimator, FlowEstimatorKind};
pub use pipeline::{BatchOutput, Failure, FailureLog, Orchestrator, VideoReader, run_batch};
pub use record::{NullRecorder, Recorder, RecorderFactory};
pub use results::{ChannelResults, Metric, Unit};
pub use types::{AnalysisModule, PipelineError, VideoMetadata, VideoTensor};

/// Analyse one in-memory video without recording intermediates.
///
/// `filepath` only labels the results. Timing is not measured.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] if `config` does not
/// validate. Engine failures are recovered into
/// [`BatchOutput::failures`].
pub fn analyze_video(
    filepath: &str,
    video: &VideoTensor,
    config: &AnalysisConfig,
) -> Result<BatchOutput, PipelineError> {
    let clock = diagnostics::FrozenClock;
    let orchestrator = Orchestrator::new(config, &clock)?;
    let mut failures = FailureLog::default();
    let (channels, file) = orchestrator.process_file(filepath, video, &mut NullRecorder, &mut failures);
    Ok(BatchOutput {
        channels,
        failures,
        diagnostics: BatchDiagnostics {
            files: vec![file],
            total_duration: std::time::Duration::ZERO,
        },
    })
}
