#![allow(clippy::unwrap_used, clippy::cast_precision_loss)]

use biobar_pipeline::config::{IntensityConfig, ModuleSelection, QualityConfig};
use biobar_pipeline::diagnostics::Outcome;
use biobar_pipeline::intensity;
use biobar_pipeline::record::NullRecorder;
use biobar_pipeline::results::FLAG_DIM;
use biobar_pipeline::{AnalysisConfig, analyze_video, VideoTensor};
use ndarray::{Array3, Array4};

#[test]
fn all_zero_video_yields_nan_metrics() {
    let video = VideoTensor::new(Array4::zeros((20, 20, 20, 1))).unwrap();
    let config = AnalysisConfig {
        modules: ModuleSelection::ALL,
        quality: QualityConfig {
            accept_dim_images: true,
            accept_dim_channels: true,
        },
        ..AnalysisConfig::default()
    };
    let out = analyze_video("zeros", &video, &config).unwrap();
    assert!(out.failures.is_empty(), "{}", out.failures);
    let results = &out.results()[0];
    assert!(results.metric_values().iter().all(|v| v.is_nan()));
    assert_eq!(results.dim_channel_flag, 1);
    // Empty channel plus dim channel.
    assert_eq!(results.intensity.flag, FLAG_DIM + 1);
    let modules = &out.diagnostics.files[0].channels[0].modules;
    let skipped = modules.iter().filter(|m| m.outcome == Outcome::Skipped).count();
    assert_eq!(skipped, 2);
}

#[test]
fn spanning_counts_foreground_frames() {
    // Even frames are uniform and therefore fully foreground. A frame
    // always has a pixel at or above its mean, so odd frames hold a single
    // interior bright pixel that cannot span.
    let video = Array4::from_shape_fn((10, 8, 8, 1), |(t, r, c, _)| {
        if t % 2 == 0 {
            10.0
        } else if (r, c) == (3, 3) {
            100.0
        } else {
            0.0
        }
    });
    let video = VideoTensor::new(video).unwrap();
    let mut config = AnalysisConfig::default();
    config.modules.binarization = true;
    config.quality.accept_dim_images = true;
    config.binarization.threshold_offset = 0.0;
    config.binarization.frame_step = 2;

    let out = analyze_video("alternating", &video, &config).unwrap();
    assert!(out.failures.is_empty(), "{}", out.failures);
    let trace = out.channels[0].traces.binarization.as_ref().unwrap();
    assert_eq!(trace.sampled_frames, vec![0, 2, 4, 6, 8, 9]);
    let foreground = trace
        .sampled_frames
        .iter()
        .filter(|&&t| t % 2 == 0)
        .count() as f64;
    let spanning = out.results()[0].binarization.spanning;
    assert!((spanning - foreground / 6.0).abs() < 1e-12);
}

#[test]
fn identical_windows_have_zero_change() {
    let frame = Array3::from_shape_fn((1, 8, 8), |(_, r, c)| ((r * 5 + c * 3) % 7) as f32 + 1.0);
    let channel = ndarray::concatenate(ndarray::Axis(0), &[frame.view(), frame.view()]).unwrap();
    let config = IntensityConfig {
        first_frame: 0,
        last_frame: 0,
        frames_evaluation_percent: 0.5,
    };
    let out = intensity::analyze(channel.view(), &config, &mut NullRecorder).unwrap();
    assert_eq!(out.trace.early_frames, 0..1);
    assert_eq!(out.trace.late_frames, 1..2);
    let r = out.results;
    assert!(r.max_kurtosis.is_finite());
    assert!(r.kurtosis_diff.abs() < f64::EPSILON);
    assert!(r.median_skew_diff.abs() < f64::EPSILON);
    assert!(r.mode_skew_diff.abs() < f64::EPSILON);
}
