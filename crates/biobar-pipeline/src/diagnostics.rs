//! Batch diagnostics: wall-clock timing and outcome of every unit of work.
//!
//! The orchestrator records one [`FileDiagnostics`] per input, one
//! [`ChannelDiagnostics`] per analysed channel and one
//! [`ModuleDiagnostics`] per enabled engine. Time is read through the
//! [`Clock`] trait so the pipeline itself stays free of platform timers;
//! front ends supply an implementation backed by `std::time::Instant`.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::AnalysisModule;

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Source of monotonic time.
pub trait Clock {
    /// Opaque point in time.
    type Instant;

    /// The current instant.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// Clock that never advances. Useful where timing is irrelevant.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrozenClock;

impl Clock for FrozenClock {
    type Instant = ();

    fn now(&self) {}

    fn elapsed(&self, _since: &()) -> Duration {
        Duration::ZERO
    }
}

/// How a unit of work ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// Ran to completion.
    Completed,
    /// Raised an error that was recorded and isolated.
    Failed,
    /// Not run because a quality gate rejected it, or the input held no
    /// signal.
    Skipped,
}

impl Outcome {
    const fn label(self) -> &'static str {
        match self {
            Self::Completed => "ok",
            Self::Failed => "FAILED",
            Self::Skipped => "skipped",
        }
    }
}

/// One engine run on one channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleDiagnostics {
    /// Engine that ran.
    pub module: AnalysisModule,
    /// How it ended.
    pub outcome: Outcome,
    /// Wall-clock duration (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
}

/// One channel of one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelDiagnostics {
    /// Resolved channel index.
    pub channel: i64,
    /// Whether the channel failed the dim test.
    pub dim: bool,
    /// [`Outcome::Skipped`] for a rejected dim channel, [`Outcome::Failed`]
    /// if any module failed, else [`Outcome::Completed`].
    pub outcome: Outcome,
    /// Wall-clock duration (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Per-engine entries in execution order.
    pub modules: Vec<ModuleDiagnostics>,
}

/// One input file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileDiagnostics {
    /// Path as given to the orchestrator.
    pub file: String,
    /// `(frames, height, width, channels)` if the file could be read.
    pub shape: Option<(usize, usize, usize, usize)>,
    /// [`Outcome::Failed`] for unreadable files, [`Outcome::Skipped`] for
    /// dim images, else [`Outcome::Completed`].
    pub outcome: Outcome,
    /// Wall-clock duration including reading (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Per-channel entries.
    pub channels: Vec<ChannelDiagnostics>,
}

/// Diagnostics of a whole batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchDiagnostics {
    /// Per-file entries in processing order.
    pub files: Vec<FileDiagnostics>,
    /// Total wall-clock duration (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
}

impl BatchDiagnostics {
    /// Number of module runs that ended in `outcome`.
    #[must_use]
    pub fn module_count(&self, outcome: Outcome) -> usize {
        self.modules().filter(|m| m.outcome == outcome).count()
    }

    /// Summed duration of every run of `module`.
    #[must_use]
    pub fn module_time(&self, module: AnalysisModule) -> Duration {
        self.modules()
            .filter(|m| m.module == module)
            .map(|m| m.duration)
            .sum()
    }

    fn modules(&self) -> impl Iterator<Item = &ModuleDiagnostics> {
        self.files
            .iter()
            .flat_map(|f| &f.channels)
            .flat_map(|c| &c.modules)
    }

    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Batch Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Files: {}  |  Total duration: {:.3}s",
            self.files.len(),
            self.total_duration.as_secs_f64(),
        ));
        lines.push(format!(
            "Modules: {} completed, {} failed",
            self.module_count(Outcome::Completed),
            self.module_count(Outcome::Failed),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<24} {:>10} {:>10}  {}",
            "Unit", "Duration", "Outcome", "Details"
        ));
        lines.push("-".repeat(80));

        for file in &self.files {
            let details = file.shape.map_or_else(String::new, |(t, h, w, c)| {
                format!("{t} frames, {h}x{w}, {c} channels")
            });
            lines.push(format!(
                "{:<24} {:>9.3}s {:>10}  {details}",
                truncate(&file.file, 24),
                file.duration.as_secs_f64(),
                file.outcome.label(),
            ));
            for channel in &file.channels {
                let dim = if channel.dim { "dim" } else { "" };
                lines.push(format!(
                    "{:<24} {:>9.3}s {:>10}  {dim}",
                    format!("  channel {}", channel.channel),
                    channel.duration.as_secs_f64(),
                    channel.outcome.label(),
                ));
                for module in &channel.modules {
                    lines.push(format!(
                        "{:<24} {:>9.3}s {:>10}",
                        format!("    {}", module.module),
                        module.duration.as_secs_f64(),
                        module.outcome.label(),
                    ));
                }
            }
        }

        lines.push(String::new());
        lines.push(format!("{:<24} {:>12}", "Module", "Total (s)"));
        lines.push("-".repeat(40));
        for module in AnalysisModule::ALL {
            lines.push(format!(
                "{:<24} {:>11.3}s",
                module.to_string(),
                self.module_time(module).as_secs_f64(),
            ));
        }

        lines.join("\n")
    }
}

/// Keep the last `width` characters of a path-like label.
fn truncate(label: &str, width: usize) -> String {
    let count = label.chars().count();
    if count <= width {
        return label.to_string();
    }
    let tail: String = label.chars().skip(count - width + 1).collect();
    format!("~{tail}")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sample() -> BatchDiagnostics {
        let module = |module, outcome, ms| ModuleDiagnostics {
            module,
            outcome,
            duration: Duration::from_millis(ms),
        };
        BatchDiagnostics {
            files: vec![
                FileDiagnostics {
                    file: "videos/a".to_string(),
                    shape: Some((20, 64, 64, 2)),
                    outcome: Outcome::Completed,
                    duration: Duration::from_millis(90),
                    channels: vec![ChannelDiagnostics {
                        channel: 0,
                        dim: true,
                        outcome: Outcome::Failed,
                        duration: Duration::from_millis(80),
                        modules: vec![
                            module(AnalysisModule::Binarization, Outcome::Completed, 30),
                            module(AnalysisModule::OpticalFlow, Outcome::Failed, 40),
                        ],
                    }],
                },
                FileDiagnostics {
                    file: "videos/b".to_string(),
                    shape: None,
                    outcome: Outcome::Failed,
                    duration: Duration::from_millis(1),
                    channels: Vec::new(),
                },
            ],
            total_duration: Duration::from_millis(91),
        }
    }

    #[test]
    fn counts_and_totals() {
        let diag = sample();
        assert_eq!(diag.module_count(Outcome::Completed), 1);
        assert_eq!(diag.module_count(Outcome::Failed), 1);
        assert_eq!(
            diag.module_time(AnalysisModule::OpticalFlow),
            Duration::from_millis(40)
        );
        assert_eq!(
            diag.module_time(AnalysisModule::IntensityDistribution),
            Duration::ZERO
        );
    }

    #[test]
    fn report_lists_every_unit() {
        let report = sample().report();
        assert!(report.contains("Batch Diagnostics Report"));
        assert!(report.contains("videos/a"));
        assert!(report.contains("20 frames, 64x64, 2 channels"));
        assert!(report.contains("channel 0"));
        assert!(report.contains("Optical Flow"));
        assert!(report.contains("FAILED"));
    }

    #[test]
    fn durations_serialize_as_seconds() {
        let json = serde_json::to_value(sample()).unwrap();
        let total = json["total_duration"].as_f64().unwrap();
        assert!((total - 0.091).abs() < 1e-9);
        let back: BatchDiagnostics = serde_json::from_value(json).unwrap();
        assert_eq!(back.files.len(), 2);
        assert_eq!(back.files[0].channels[0].modules[1].outcome, Outcome::Failed);
        assert_eq!(back.files[1].shape, None);
    }

    #[test]
    fn negative_duration_is_rejected() {
        let json = r#"{"files": [], "total_duration": -1.0}"#;
        assert!(serde_json::from_str::<BatchDiagnostics>(json).is_err());
    }

    #[test]
    fn truncate_keeps_tail() {
        assert_eq!(truncate("short", 24), "short");
        let long = "a/very/long/directory/name/for/video";
        let cut = truncate(long, 10);
        assert_eq!(cut.chars().count(), 10);
        assert!(cut.starts_with('~'));
        assert!(cut.ends_with("video"));
    }

    #[test]
    fn frozen_clock_reports_zero() {
        let clock = FrozenClock;
        let start = clock.now();
        assert_eq!(clock.elapsed(&start), Duration::ZERO);
    }
}
