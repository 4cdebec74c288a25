//! Batch orchestration: files, then channels, then engines.
//!
//! Every unit of work is isolated. An unreadable file, a rejected dim
//! image, a failing (or panicking) engine or a broken recorder is logged
//! to the [`FailureLog`] and the batch moves on; the affected metrics
//! stay `NaN`. The only error that stops a batch is an invalid
//! [`AnalysisConfig`], reported before any file is touched.

use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::binarization::{self, BinarizationTrace};
use crate::config::{AnalysisConfig, ChannelSelection};
use crate::diagnostics::{
    BatchDiagnostics, ChannelDiagnostics, Clock, FileDiagnostics, ModuleDiagnostics, Outcome,
};
use crate::intensity::{self, IntensityTrace};
use crate::optical_flow::{self, FlowTrace};
use crate::record::{NullRecorder, Recorder, RecorderFactory};
use crate::results::ChannelResults;
use crate::stats::is_dim;
use crate::types::{AnalysisModule, ChannelView, PipelineError, VideoMetadata, VideoTensor};

/// Source of videos, keyed by the path strings handed to the batch.
pub trait VideoReader {
    /// Load the video at `path`.
    ///
    /// # Errors
    ///
    /// Typically [`PipelineError::Io`] or [`PipelineError::ImageDecode`].
    fn read(&self, path: &str) -> Result<VideoTensor, PipelineError>;
}

impl<F> VideoReader for F
where
    F: Fn(&str) -> Result<VideoTensor, PipelineError>,
{
    fn read(&self, path: &str) -> Result<VideoTensor, PipelineError> {
        self(path)
    }
}

/// Where in the batch a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    /// Loading the file.
    Read,
    /// The file-level dim check.
    QualityCheck,
    /// Creating or finishing an intermediate-data recorder.
    Recording,
    /// One of the analysis engines.
    Module(AnalysisModule),
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => f.write_str("File Reading"),
            Self::QualityCheck => f.write_str("Quality Check"),
            Self::Recording => f.write_str("Recording"),
            Self::Module(module) => module.fmt(f),
        }
    }
}

/// One recovered failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    /// File the failure belongs to.
    pub file: String,
    /// Channel, for failures below the file level.
    pub channel: Option<usize>,
    /// Stage that failed.
    pub module: Stage,
    /// Cause as text.
    pub message: String,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "File: {}, Channel ", self.file)?;
        match self.channel {
            Some(channel) => write!(f, "{channel}")?,
            None => f.write_str("-")?,
        }
        write!(f, ", Module: {}, Exception: {}", self.module, self.message)
    }
}

/// Append-only record of every failure recovered during a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FailureLog {
    entries: Vec<Failure>,
}

impl FailureLog {
    /// Append a failure.
    pub fn push(&mut self, failure: Failure) {
        warn!(%failure, "recovered failure");
        self.entries.push(failure);
    }

    /// Recorded failures in order.
    #[must_use]
    pub fn entries(&self) -> &[Failure] {
        &self.entries
    }

    /// Number of recorded failures.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing failed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One line per failure, each terminated by a newline.
impl fmt::Display for FailureLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for failure in &self.entries {
            writeln!(f, "{failure}")?;
        }
        Ok(())
    }
}

/// Engine traces for one channel; `None` for engines that did not run
/// or failed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelTraces {
    /// Binarization series.
    pub binarization: Option<BinarizationTrace>,
    /// Optical flow series.
    pub flow: Option<FlowTrace>,
    /// Intensity distribution series.
    pub intensity: Option<IntensityTrace>,
}

/// Metrics and traces of one analysed channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelAnalysis {
    /// Exported metrics.
    pub results: ChannelResults,
    /// Plotting series.
    pub traces: ChannelTraces,
}

/// Everything a batch produced.
#[derive(Debug, Clone, Default)]
pub struct BatchOutput {
    /// One entry per analysed `(file, channel)`, in processing order.
    pub channels: Vec<ChannelAnalysis>,
    /// Recovered failures.
    pub failures: FailureLog,
    /// Timing and outcomes.
    pub diagnostics: BatchDiagnostics,
}

impl BatchOutput {
    /// The metrics of every analysed channel.
    #[must_use]
    pub fn results(&self) -> Vec<ChannelResults> {
        self.channels.iter().map(|c| c.results.clone()).collect()
    }
}

/// Resolve a possibly negative channel index against `total` channels.
///
/// Negative indices count from the end (repeatedly, so `-4` of 3 is 2);
/// indices past the end clamp to the last channel.
#[must_use]
pub fn resolve_channel(channel: i64, total: usize) -> usize {
    let Some(last) = total.checked_sub(1) else {
        return 0;
    };
    let total = i64::try_from(total).unwrap_or(i64::MAX);
    let wrapped = if channel < 0 {
        channel.rem_euclid(total)
    } else {
        channel
    };
    usize::try_from(wrapped).map_or(last, |c| c.min(last))
}

/// Channels to analyse for a video with `total` channels.
#[must_use]
pub fn channels_to_process(selection: &ChannelSelection, total: usize) -> Vec<usize> {
    if selection.parse_all_channels {
        (0..total).collect()
    } else if total == 0 {
        Vec::new()
    } else {
        vec![resolve_channel(selection.selected_channel, total)]
    }
}

/// One channel handed to [`Orchestrator::analyze_channel`].
#[derive(Debug, Clone, Copy)]
pub struct ChannelInput<'a> {
    /// Source file path, copied into the results.
    pub filepath: &'a str,
    /// Resolved channel index.
    pub index: usize,
    /// Frame stack of the channel.
    pub data: ChannelView<'a>,
    /// Calibration of the source video.
    pub metadata: &'a VideoMetadata,
    /// Whether the channel failed the dim test (and was accepted anyway).
    pub dim: bool,
}

/// Drives the engines over a batch with a validated configuration.
#[derive(Debug)]
pub struct Orchestrator<'a, C> {
    config: &'a AnalysisConfig,
    clock: &'a C,
}

impl<'a, C: Clock> Orchestrator<'a, C> {
    /// Create an orchestrator.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if `config` does not
    /// validate.
    pub fn new(config: &'a AnalysisConfig, clock: &'a C) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self { config, clock })
    }

    /// Analyse every file in `files`.
    pub fn run_batch(
        &self,
        files: &[String],
        reader: &impl VideoReader,
        recorders: &mut impl RecorderFactory,
    ) -> BatchOutput {
        let start = self.clock.now();
        let mut output = BatchOutput::default();
        for (count, path) in files.iter().enumerate() {
            info!(file = %path, "file {} of {}", count + 1, files.len());
            let file_start = self.clock.now();
            let mut diagnostics = match reader.read(path) {
                Ok(video) => {
                    let (channels, diagnostics) =
                        self.process_file(path, &video, recorders, &mut output.failures);
                    output.channels.extend(channels);
                    diagnostics
                }
                Err(e) => {
                    output.failures.push(Failure {
                        file: path.clone(),
                        channel: None,
                        module: Stage::Read,
                        message: e.to_string(),
                    });
                    FileDiagnostics {
                        file: path.clone(),
                        shape: None,
                        outcome: Outcome::Failed,
                        duration: std::time::Duration::ZERO,
                        channels: Vec::new(),
                    }
                }
            };
            diagnostics.duration = self.clock.elapsed(&file_start);
            info!(
                file = %path,
                seconds = diagnostics.duration.as_secs_f64(),
                "file finished"
            );
            output.diagnostics.files.push(diagnostics);
        }
        output.diagnostics.total_duration = self.clock.elapsed(&start);
        output
    }

    /// Analyse the selected channels of one loaded video.
    pub fn process_file(
        &self,
        path: &str,
        video: &VideoTensor,
        recorders: &mut impl RecorderFactory,
        failures: &mut FailureLog,
    ) -> (Vec<ChannelAnalysis>, FileDiagnostics) {
        let start = self.clock.now();
        let mut diagnostics = FileDiagnostics {
            file: path.to_string(),
            shape: Some(video.as_array().dim()),
            outcome: Outcome::Completed,
            duration: std::time::Duration::ZERO,
            channels: Vec::new(),
        };

        if !self.config.quality.accept_dim_images
            && video.frame(0).is_some_and(|frame| is_dim(&frame))
        {
            failures.push(Failure {
                file: path.to_string(),
                channel: None,
                module: Stage::QualityCheck,
                message: "first frame is too dim to analyse".to_string(),
            });
            diagnostics.outcome = Outcome::Skipped;
            diagnostics.duration = self.clock.elapsed(&start);
            return (Vec::new(), diagnostics);
        }

        let mut analyses = Vec::new();
        for index in channels_to_process(&self.config.channels, video.num_channels()) {
            let Some(data) = video.channel(index) else {
                continue;
            };
            let channel_start = self.clock.now();
            let dim = is_dim(&data);
            if dim && !self.config.quality.accept_dim_channels {
                info!(file = %path, channel = index, "channel too dim, skipping");
                diagnostics.channels.push(ChannelDiagnostics {
                    channel: channel_number(index),
                    dim,
                    outcome: Outcome::Skipped,
                    duration: self.clock.elapsed(&channel_start),
                    modules: Vec::new(),
                });
                continue;
            }
            if dim {
                warn!(file = %path, channel = index, "channel is dim, accuracy may be limited");
            }

            let mut recorder: Box<dyn Recorder> = match recorders.recorder(path, index) {
                Ok(recorder) => recorder,
                Err(e) => {
                    failures.push(Failure {
                        file: path.to_string(),
                        channel: Some(index),
                        module: Stage::Recording,
                        message: e.to_string(),
                    });
                    Box::new(NullRecorder)
                }
            };
            let input = ChannelInput {
                filepath: path,
                index,
                data,
                metadata: video.metadata(),
                dim,
            };
            let (analysis, mut channel_diag) =
                self.analyze_channel(&input, &mut *recorder, failures);
            channel_diag.duration = self.clock.elapsed(&channel_start);
            if channel_diag.outcome == Outcome::Failed {
                diagnostics.outcome = Outcome::Failed;
            }
            diagnostics.channels.push(channel_diag);
            analyses.push(analysis);
        }
        diagnostics.duration = self.clock.elapsed(&start);
        (analyses, diagnostics)
    }

    /// Run every enabled engine on one channel.
    ///
    /// Engine errors and panics are logged to `failures` and leave the
    /// engine's metrics at `NaN`. An engine that finds no signal in the
    /// channel, or too few frames to sample, is marked skipped instead and
    /// also leaves its metrics at `NaN`. A dim channel gets `dim_channel_flag = 1`
    /// and its intensity flag incremented, whether or not the intensity
    /// engine ran.
    pub fn analyze_channel(
        &self,
        input: &ChannelInput<'_>,
        mut recorder: &mut dyn Recorder,
        failures: &mut FailureLog,
    ) -> (ChannelAnalysis, ChannelDiagnostics) {
        debug!(file = %input.filepath, channel = input.index, "processing channel");
        let config = self.config;
        let mut results = ChannelResults::new(input.filepath, channel_number(input.index));
        let mut traces = ChannelTraces::default();
        let mut modules = Vec::new();

        for module in config.modules.enabled() {
            let start = self.clock.now();
            let outcome = match module {
                AnalysisModule::Binarization => guarded(module, || {
                    binarization::analyze(
                        input.data,
                        &config.binarization,
                        &config.labeler,
                        &mut recorder,
                    )
                })
                .map(|out| {
                    results.binarization = out.results;
                    traces.binarization = Some(out.trace);
                }),
                AnalysisModule::OpticalFlow => guarded(module, || {
                    let flow_config = optical_flow::calibrated(&config.optical_flow, input.metadata);
                    optical_flow::analyze(
                        input.data,
                        &flow_config,
                        &flow_config.estimator,
                        &mut recorder,
                    )
                })
                .map(|out| {
                    results.flow = out.results;
                    traces.flow = Some(out.trace);
                }),
                AnalysisModule::IntensityDistribution => guarded(module, || {
                    intensity::analyze(input.data, &config.intensity, &mut recorder)
                })
                .map(|out| {
                    results.intensity = out.results;
                    traces.intensity = Some(out.trace);
                }),
            };
            let outcome = match outcome {
                Ok(()) => Outcome::Completed,
                Err(PipelineError::EmptyInput) => {
                    debug!(%module, "channel is empty, skipping");
                    Outcome::Skipped
                }
                Err(PipelineError::InvalidSampling(reason)) => {
                    debug!(%module, %reason, "video too short, skipping");
                    Outcome::Skipped
                }
                Err(e) => {
                    failures.push(Failure {
                        file: input.filepath.to_string(),
                        channel: Some(input.index),
                        module: Stage::Module(module),
                        message: cause(e),
                    });
                    Outcome::Failed
                }
            };
            modules.push(ModuleDiagnostics {
                module,
                outcome,
                duration: self.clock.elapsed(&start),
            });
        }

        if input.dim {
            results.dim_channel_flag = 1;
            results.intensity.flag += 1;
        }
        if let Err(e) = recorder.finish() {
            failures.push(Failure {
                file: input.filepath.to_string(),
                channel: Some(input.index),
                module: Stage::Recording,
                message: e.to_string(),
            });
        }

        let outcome = if modules.iter().any(|m| m.outcome == Outcome::Failed) {
            Outcome::Failed
        } else {
            Outcome::Completed
        };
        let diagnostics = ChannelDiagnostics {
            channel: results.channel,
            dim: input.dim,
            outcome,
            duration: std::time::Duration::ZERO,
            modules,
        };
        (ChannelAnalysis { results, traces }, diagnostics)
    }
}

/// Validate `config` and analyse every file in `files`.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] if `config` does not
/// validate. Every other failure is recovered into
/// [`BatchOutput::failures`].
pub fn run_batch(
    files: &[String],
    reader: &impl VideoReader,
    config: &AnalysisConfig,
    recorders: &mut impl RecorderFactory,
    clock: &impl Clock,
) -> Result<BatchOutput, PipelineError> {
    Ok(Orchestrator::new(config, clock)?.run_batch(files, reader, recorders))
}

/// Run `f`, turning errors and panics into [`PipelineError::ModuleExecution`].
///
/// [`PipelineError::EmptyInput`] and [`PipelineError::InvalidSampling`]
/// pass through unchanged.
fn guarded<T>(
    module: AnalysisModule,
    f: impl FnOnce() -> Result<T, PipelineError>,
) -> Result<T, PipelineError> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e @ (PipelineError::EmptyInput | PipelineError::InvalidSampling(_)))) => Err(e),
        Ok(Err(e)) => Err(PipelineError::ModuleExecution {
            module,
            message: e.to_string(),
        }),
        Err(payload) => Err(PipelineError::ModuleExecution {
            module,
            message: panic_message(payload.as_ref()),
        }),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "panic with non-string payload".to_string())
}

/// The bare cause of a module failure, without the module prefix.
fn cause(error: PipelineError) -> String {
    match error {
        PipelineError::ModuleExecution { message, .. } => message,
        other => other.to_string(),
    }
}

fn channel_number(index: usize) -> i64 {
    i64::try_from(index).unwrap_or(i64::MAX)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use ndarray::Array4;

    use super::*;
    use crate::config::{ModuleSelection, QualityConfig};
    use crate::diagnostics::FrozenClock;

    /// Non-dim textured video with `channels` identical channels.
    #[allow(clippy::cast_precision_loss)]
    fn textured(frames: usize, size: usize, channels: usize) -> VideoTensor {
        let data = Array4::from_shape_fn((frames, size, size, channels), |(t, r, c, _)| {
            ((t * 7 + r * 3 + c * 5) % 11) as f32 + 1.0
        });
        VideoTensor::new(data).unwrap()
    }

    fn fixed(video: VideoTensor) -> impl Fn(&str) -> Result<VideoTensor, PipelineError> {
        move |_| Ok(video.clone())
    }

    fn all_modules() -> AnalysisConfig {
        AnalysisConfig {
            modules: ModuleSelection::ALL,
            ..AnalysisConfig::default()
        }
    }

    fn run(
        config: &AnalysisConfig,
        files: &[&str],
        reader: &impl VideoReader,
    ) -> BatchOutput {
        let files: Vec<String> = files.iter().map(ToString::to_string).collect();
        run_batch(&files, reader, config, &mut NullRecorder, &FrozenClock).unwrap()
    }

    #[test]
    fn resolve_negative_and_large() {
        assert_eq!(resolve_channel(-1, 3), 2);
        assert_eq!(resolve_channel(-4, 3), 2);
        assert_eq!(resolve_channel(-3, 3), 0);
        assert_eq!(resolve_channel(5, 3), 2);
        assert_eq!(resolve_channel(1, 3), 1);
        assert_eq!(resolve_channel(0, 1), 0);
    }

    #[test]
    fn channel_selection() {
        let all = ChannelSelection {
            parse_all_channels: true,
            selected_channel: 0,
        };
        assert_eq!(channels_to_process(&all, 3), vec![0, 1, 2]);
        let last = ChannelSelection {
            parse_all_channels: false,
            selected_channel: -1,
        };
        assert_eq!(channels_to_process(&last, 4), vec![3]);
    }

    #[test]
    fn failure_line_format() {
        let failure = Failure {
            file: "a.tif".to_string(),
            channel: Some(1),
            module: Stage::Module(AnalysisModule::OpticalFlow),
            message: "boom".to_string(),
        };
        assert_eq!(
            failure.to_string(),
            "File: a.tif, Channel 1, Module: Optical Flow, Exception: boom"
        );
        let mut log = FailureLog::default();
        log.push(failure);
        log.push(Failure {
            file: "b.tif".to_string(),
            channel: None,
            module: Stage::Read,
            message: "missing".to_string(),
        });
        assert_eq!(
            log.to_string(),
            "File: a.tif, Channel 1, Module: Optical Flow, Exception: boom\n\
             File: b.tif, Channel -, Module: File Reading, Exception: missing\n"
        );
    }

    #[test]
    fn invalid_config_is_fatal() {
        let mut config = all_modules();
        config.optical_flow.window_size = 0;
        let reader = fixed(textured(4, 8, 1));
        let result = run_batch(
            &["a".to_string()],
            &reader,
            &config,
            &mut NullRecorder,
            &FrozenClock,
        );
        assert!(matches!(result, Err(PipelineError::InvalidConfig(_))));
    }

    #[test]
    fn all_modules_produce_metrics() {
        let reader = fixed(textured(12, 16, 1));
        let mut config = all_modules();
        config.optical_flow.downsample_factor = 4;
        config.optical_flow.window_size = 5;
        let out = run(&config, &["v"], &reader);
        assert!(out.failures.is_empty(), "{}", out.failures);
        assert_eq!(out.channels.len(), 1);
        let results = &out.channels[0].results;
        assert_eq!(results.filepath, "v");
        assert!(results.binarization.spanning.is_finite());
        assert!(results.flow.mean_speed.is_finite());
        assert!(results.intensity.max_kurtosis.is_finite());
        let traces = &out.channels[0].traces;
        assert!(traces.binarization.is_some());
        assert!(traces.flow.is_some());
        assert!(traces.intensity.is_some());
        assert_eq!(out.diagnostics.module_count(Outcome::Completed), 3);
    }

    #[test]
    fn disabled_modules_stay_nan() {
        let reader = fixed(textured(6, 8, 1));
        let mut config = AnalysisConfig::default();
        config.modules.intensity_distribution = true;
        let out = run(&config, &["v"], &reader);
        let results = &out.channels[0].results;
        assert!(results.binarization.spanning.is_nan());
        assert!(results.flow.mean_speed.is_nan());
        assert!(results.intensity.max_kurtosis.is_finite());
        assert_eq!(out.diagnostics.files[0].channels[0].modules.len(), 1);
    }

    #[test]
    fn failing_module_is_isolated() {
        // Flow pooling larger than the 8x8 frame fails; the rest still run.
        let reader = fixed(textured(6, 8, 1));
        let mut config = all_modules();
        config.optical_flow.downsample_factor = 64;
        let out = run(&config, &["v"], &reader);
        assert_eq!(out.failures.len(), 1);
        let failure = &out.failures.entries()[0];
        assert_eq!(failure.module, Stage::Module(AnalysisModule::OpticalFlow));
        assert_eq!(failure.channel, Some(0));
        let results = &out.channels[0].results;
        assert!(results.flow.mean_speed.is_nan());
        assert!(results.binarization.spanning.is_finite());
        assert!(results.intensity.max_kurtosis.is_finite());
        assert_eq!(out.diagnostics.files[0].outcome, Outcome::Failed);
    }

    #[test]
    fn single_frame_video_skips_flow() {
        let reader = fixed(textured(1, 8, 1));
        let out = run(&all_modules(), &["v"], &reader);
        assert!(out.failures.is_empty(), "{}", out.failures);
        let flow = &out.diagnostics.files[0].channels[0].modules[1];
        assert_eq!(flow.module, AnalysisModule::OpticalFlow);
        assert_eq!(flow.outcome, Outcome::Skipped);
        let results = &out.channels[0].results;
        assert!(results.flow.mean_speed.is_nan());
        assert!(results.binarization.spanning.is_finite());
    }

    #[test]
    fn empty_channel_skips_engines() {
        let reader = fixed(VideoTensor::new(Array4::zeros((6, 8, 8, 1))).unwrap());
        let config = AnalysisConfig {
            quality: QualityConfig {
                accept_dim_images: true,
                accept_dim_channels: true,
            },
            ..all_modules()
        };
        let out = run(&config, &["v"], &reader);
        assert!(out.failures.is_empty(), "{}", out.failures);
        let modules = &out.diagnostics.files[0].channels[0].modules;
        let outcomes: Vec<Outcome> = modules.iter().map(|m| m.outcome).collect();
        assert_eq!(
            outcomes,
            vec![Outcome::Skipped, Outcome::Skipped, Outcome::Completed]
        );
        assert_eq!(out.diagnostics.files[0].channels[0].outcome, Outcome::Completed);
        assert!(out.channels[0].results.flow.mean_speed.is_nan());
    }

    #[test]
    #[allow(clippy::panic)]
    fn panics_become_module_failures() {
        let result: Result<(), _> = guarded(AnalysisModule::Binarization, || panic!("exploded"));
        match result {
            Err(PipelineError::ModuleExecution { module, message }) => {
                assert_eq!(module, AnalysisModule::Binarization);
                assert_eq!(message, "exploded");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unreadable_file_does_not_stop_batch() {
        let reader = |path: &str| {
            if path == "bad" {
                Err(PipelineError::Io {
                    path: path.to_string(),
                    message: "no such directory".to_string(),
                })
            } else {
                Ok(textured(6, 8, 1))
            }
        };
        let out = run(&all_modules(), &["bad", "good"], &reader);
        assert_eq!(out.channels.len(), 1);
        assert_eq!(out.channels[0].results.filepath, "good");
        assert_eq!(out.failures.entries()[0].module, Stage::Read);
        assert_eq!(out.diagnostics.files.len(), 2);
        assert_eq!(out.diagnostics.files[0].outcome, Outcome::Failed);
    }

    #[test]
    fn dim_image_is_skipped_unless_accepted() {
        let reader = fixed(VideoTensor::new(Array4::from_elem((4, 6, 6, 1), 50.0)).unwrap());
        let out = run(&all_modules(), &["dim"], &reader);
        assert!(out.channels.is_empty());
        assert_eq!(out.failures.entries()[0].module, Stage::QualityCheck);
        assert_eq!(out.diagnostics.files[0].outcome, Outcome::Skipped);
    }

    #[test]
    fn dim_channel_skipped_or_flagged() {
        // Channel 0 textured, channel 1 flat (dim). First frame overall is
        // not dim because channel 0 contributes a low minimum.
        let data = Array4::from_shape_fn((6, 8, 8, 2), |(t, r, c, ch)| {
            if ch == 1 {
                40.0
            } else {
                #[allow(clippy::cast_precision_loss)]
                let v = ((t * 7 + r * 3 + c * 5) % 11) as f32;
                v + 1.0
            }
        });
        let video = VideoTensor::new(data).unwrap();
        let reader = fixed(video);
        let mut config = all_modules();
        config.channels.parse_all_channels = true;

        let out = run(&config, &["v"], &reader);
        assert_eq!(out.channels.len(), 1);
        assert_eq!(out.channels[0].results.channel, 0);
        assert_eq!(
            out.diagnostics.files[0].channels[1].outcome,
            Outcome::Skipped
        );

        config.quality = QualityConfig {
            accept_dim_images: false,
            accept_dim_channels: true,
        };
        let out = run(&config, &["v"], &reader);
        assert_eq!(out.channels.len(), 2);
        let dim = &out.channels[1].results;
        assert_eq!(dim.dim_channel_flag, 1);
        // Flat frames are saturated (max == mode): 2, plus 1 for dim.
        assert_eq!(dim.intensity.flag, 3);
        assert_eq!(out.channels[0].results.dim_channel_flag, 0);
    }

    #[test]
    fn metadata_overrides_flow_calibration() {
        let reader = fixed(textured(12, 16, 1).with_metadata(VideoMetadata {
            nm_per_pixel: Some(2.0),
            seconds_per_frame: None,
        }));
        let mut config = AnalysisConfig::default();
        config.modules.optical_flow = true;
        config.optical_flow.downsample_factor = 4;
        config.optical_flow.window_size = 5;
        let calibrated = run(&config, &["v"], &reader).channels[0].results.flow.mean_speed;

        let plain_reader = fixed(textured(12, 16, 1));
        let plain = run(&config, &["v"], &plain_reader).channels[0].results.flow.mean_speed;
        assert!((calibrated - 2.0 * plain).abs() < 1e-9 * plain.abs().max(1.0));
    }

    #[test]
    fn recorder_failures_are_logged() {
        struct Broken;
        impl RecorderFactory for Broken {
            fn recorder(
                &mut self,
                file: &str,
                _channel: usize,
            ) -> Result<Box<dyn Recorder>, PipelineError> {
                Err(PipelineError::Io {
                    path: file.to_string(),
                    message: "read-only".to_string(),
                })
            }
        }
        let reader = fixed(textured(6, 8, 1));
        let out = run_batch(
            &["v".to_string()],
            &reader,
            &all_modules(),
            &mut Broken,
            &FrozenClock,
        )
        .unwrap();
        assert_eq!(out.failures.len(), 1);
        assert_eq!(out.failures.entries()[0].module, Stage::Recording);
        assert!(out.channels[0].results.binarization.spanning.is_finite());
    }
}
