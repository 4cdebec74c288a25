//! Typed metric containers and their fixed tabular layout.
//!
//! [`Metric::ALL`] is the column order of every exported table after the
//! three identity columns (`Filepath`, `Channel`, `Flags`). Headers,
//! values and units are all derived from that one list, so they cannot
//! drift apart.

use std::cmp::Ordering;
use std::fmt;

use serde::Serialize;

use crate::types::AnalysisModule;

/// Header of the file path column.
pub const FILEPATH_HEADER: &str = "Filepath";
/// Header of the channel column.
pub const CHANNEL_HEADER: &str = "Channel";
/// Header of the flags column.
pub const FLAGS_HEADER: &str = "Flags";

/// Unit category of a metric; drives barcode normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Unit {
    /// Dimensionless shape statistic.
    None,
    /// Fraction of the (pooled) field of view.
    PercentFov,
    /// Ratio against an early-frame baseline.
    PercentChange,
    /// Nanometres per second.
    Speed,
    /// Change in speed between first and last frame pair.
    Acceleration,
    /// Angle in radians.
    Direction,
    /// Fraction of sampled frames.
    PercentFrames,
}

impl Unit {
    /// Axis label for plots.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::None => "",
            Self::PercentFov => "% of FOV",
            Self::PercentChange => "Fractional Change",
            Self::Speed | Self::Acceleration => "nm/s",
            Self::Direction => "rads",
            Self::PercentFrames => "% of Frames",
        }
    }
}

/// Every exported metric, in column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Metric {
    /// Fraction of sampled frames in which the foreground percolates.
    Connectivity,
    /// Top-decile largest island area.
    MaxIslandArea,
    /// Top-decile largest void area.
    MaxVoidArea,
    /// Mean island area relative to the baseline.
    IslandAreaChange,
    /// Mean void area relative to the baseline.
    VoidAreaChange,
    /// Baseline largest island area.
    InitialIslandArea,
    /// Baseline second-largest island area.
    InitialSecondIslandArea,
    /// Top-decile excess kurtosis.
    MaxKurtosis,
    /// Top-decile median skewness.
    MaxMedianSkewness,
    /// Top-decile mode skewness.
    MaxModeSkewness,
    /// Late minus early mean kurtosis.
    KurtosisChange,
    /// Late minus early mean median skewness.
    MedianSkewnessChange,
    /// Late minus early mean mode skewness.
    ModeSkewnessChange,
    /// Mean flow speed.
    MeanSpeed,
    /// Last minus first pair speed.
    SpeedChange,
    /// Mean flow direction.
    MeanDirection,
    /// Mean per-pair spread of flow direction.
    DirectionSpread,
}

impl Metric {
    /// Column order.
    pub const ALL: [Self; 17] = [
        Self::Connectivity,
        Self::MaxIslandArea,
        Self::MaxVoidArea,
        Self::IslandAreaChange,
        Self::VoidAreaChange,
        Self::InitialIslandArea,
        Self::InitialSecondIslandArea,
        Self::MaxKurtosis,
        Self::MaxMedianSkewness,
        Self::MaxModeSkewness,
        Self::KurtosisChange,
        Self::MedianSkewnessChange,
        Self::ModeSkewnessChange,
        Self::MeanSpeed,
        Self::SpeedChange,
        Self::MeanDirection,
        Self::DirectionSpread,
    ];

    /// Column header.
    #[must_use]
    pub const fn header(self) -> &'static str {
        match self {
            Self::Connectivity => "Connectivity",
            Self::MaxIslandArea => "Maximum Island Area",
            Self::MaxVoidArea => "Maximum Void Area",
            Self::IslandAreaChange => "Average Island Area Change",
            Self::VoidAreaChange => "Average Void Area Change",
            Self::InitialIslandArea => "Initial Maximum Island Area",
            Self::InitialSecondIslandArea => "Initial 2nd Maximum Island Area",
            Self::MaxKurtosis => "Max Kurtosis",
            Self::MaxMedianSkewness => "Max Median Skewness",
            Self::MaxModeSkewness => "Max Mode Skewness",
            Self::KurtosisChange => "Kurtosis Change",
            Self::MedianSkewnessChange => "Median Skewness Change",
            Self::ModeSkewnessChange => "Mode Skewness Change",
            Self::MeanSpeed => "Mean Speed",
            Self::SpeedChange => "Speed Change",
            Self::MeanDirection => "Mean Direction",
            Self::DirectionSpread => "Mean Direction Standard Deviation",
        }
    }

    /// Unit category.
    #[must_use]
    pub const fn unit(self) -> Unit {
        match self {
            Self::Connectivity => Unit::PercentFrames,
            Self::MaxIslandArea
            | Self::MaxVoidArea
            | Self::InitialIslandArea
            | Self::InitialSecondIslandArea => Unit::PercentFov,
            Self::IslandAreaChange | Self::VoidAreaChange => Unit::PercentChange,
            Self::MaxKurtosis
            | Self::MaxMedianSkewness
            | Self::MaxModeSkewness
            | Self::KurtosisChange
            | Self::MedianSkewnessChange
            | Self::ModeSkewnessChange => Unit::None,
            Self::MeanSpeed => Unit::Speed,
            Self::SpeedChange => Unit::Acceleration,
            Self::MeanDirection | Self::DirectionSpread => Unit::Direction,
        }
    }

    /// Engine that produces this metric.
    #[must_use]
    pub const fn module(self) -> AnalysisModule {
        match self {
            Self::Connectivity
            | Self::MaxIslandArea
            | Self::MaxVoidArea
            | Self::IslandAreaChange
            | Self::VoidAreaChange
            | Self::InitialIslandArea
            | Self::InitialSecondIslandArea => AnalysisModule::Binarization,
            Self::MaxKurtosis
            | Self::MaxMedianSkewness
            | Self::MaxModeSkewness
            | Self::KurtosisChange
            | Self::MedianSkewnessChange
            | Self::ModeSkewnessChange => AnalysisModule::IntensityDistribution,
            Self::MeanSpeed | Self::SpeedChange | Self::MeanDirection | Self::DirectionSpread => {
                AnalysisModule::OpticalFlow
            }
        }
    }

    /// Look a metric up by its column header.
    #[must_use]
    pub fn from_header(header: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.header() == header)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.header())
    }
}

/// Output of the binarization engine. `NaN` means "not computed".
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BinarizationResults {
    /// Fraction of sampled frames that percolate.
    pub spanning: f64,
    /// Top-decile largest island area over the FOV.
    pub max_island_size: f64,
    /// Top-decile largest void area over the FOV.
    pub max_void_size: f64,
    /// Mean island percent-gain over the averaging window.
    pub avg_island_percent_change: f64,
    /// Mean void percent-gain over the averaging window.
    pub avg_void_percent_change: f64,
    /// Baseline largest island area over the FOV.
    pub island_size_initial: f64,
    /// Baseline second-largest island area over the FOV.
    pub island_size_initial2: f64,
}

impl Default for BinarizationResults {
    fn default() -> Self {
        Self {
            spanning: f64::NAN,
            max_island_size: f64::NAN,
            max_void_size: f64::NAN,
            avg_island_percent_change: f64::NAN,
            avg_void_percent_change: f64::NAN,
            island_size_initial: f64::NAN,
            island_size_initial2: f64::NAN,
        }
    }
}

/// Output of the optical flow engine. `NaN` means "not computed".
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FlowResults {
    /// Mean speed over all pairs (nm/s).
    pub mean_speed: f64,
    /// Last pair speed minus first pair speed.
    pub delta_speed: f64,
    /// Mean direction over all pairs (radians).
    pub mean_theta: f64,
    /// Mean per-pair direction standard deviation (radians).
    pub mean_sigma_theta: f64,
}

impl Default for FlowResults {
    fn default() -> Self {
        Self {
            mean_speed: f64::NAN,
            delta_speed: f64::NAN,
            mean_theta: f64::NAN,
            mean_sigma_theta: f64::NAN,
        }
    }
}

/// Intensity flag raised for a dim channel.
pub const FLAG_DIM: u32 = 1;
/// Intensity flag value for a saturated detector.
pub const FLAG_SATURATED: u32 = 2;

/// Output of the intensity distribution engine. `NaN` means "not computed".
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IntensityResults {
    /// Top-decile kurtosis over both windows.
    pub max_kurtosis: f64,
    /// Top-decile median skewness over both windows.
    pub max_median_skew: f64,
    /// Top-decile mode skewness over both windows.
    pub max_mode_skew: f64,
    /// Late-window mean kurtosis minus early-window mean.
    pub kurtosis_diff: f64,
    /// Late-window mean median skewness minus early-window mean.
    pub median_skew_diff: f64,
    /// Late-window mean mode skewness minus early-window mean.
    pub mode_skew_diff: f64,
    /// 0 = ok, [`FLAG_DIM`] added for a dim channel, [`FLAG_SATURATED`]
    /// for saturation.
    pub flag: u32,
}

impl Default for IntensityResults {
    fn default() -> Self {
        Self {
            max_kurtosis: f64::NAN,
            max_median_skew: f64::NAN,
            max_mode_skew: f64::NAN,
            kurtosis_diff: f64::NAN,
            median_skew_diff: f64::NAN,
            mode_skew_diff: f64::NAN,
            flag: 0,
        }
    }
}

/// One cell of a results row.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Text cell (file path).
    Text(String),
    /// Integer cell (channel, flags).
    Integer(i64),
    /// Numeric metric; `NaN` when not computed.
    Number(f64),
}

/// Every metric for one `(file, channel)` unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelResults {
    /// Source file path as given to the orchestrator.
    pub filepath: String,
    /// Channel index after resolution.
    pub channel: i64,
    /// 1 if the channel was dim but analysed anyway.
    pub dim_channel_flag: u8,
    /// Binarization metrics.
    pub binarization: BinarizationResults,
    /// Optical flow metrics.
    pub flow: FlowResults,
    /// Intensity distribution metrics.
    pub intensity: IntensityResults,
}

impl ChannelResults {
    /// Empty results for `(filepath, channel)`: every metric is `NaN`.
    #[must_use]
    pub fn new(filepath: impl Into<String>, channel: i64) -> Self {
        Self {
            filepath: filepath.into(),
            channel,
            dim_channel_flag: 0,
            binarization: BinarizationResults::default(),
            flow: FlowResults::default(),
            intensity: IntensityResults::default(),
        }
    }

    /// Column headers, optionally without the identity columns.
    #[must_use]
    pub fn headers(just_metrics: bool) -> Vec<&'static str> {
        let identity = [FILEPATH_HEADER, CHANNEL_HEADER, FLAGS_HEADER];
        let metrics = Metric::ALL.into_iter().map(Metric::header);
        if just_metrics {
            metrics.collect()
        } else {
            identity.into_iter().chain(metrics).collect()
        }
    }

    /// Row values in [`headers(false)`](Self::headers) order.
    #[must_use]
    pub fn data(&self) -> Vec<Value> {
        let identity = [
            Value::Text(self.filepath.clone()),
            Value::Integer(self.channel),
            Value::Integer(i64::from(self.dim_channel_flag)),
        ];
        identity
            .into_iter()
            .chain(Metric::ALL.into_iter().map(|m| Value::Number(self.metric(m))))
            .collect()
    }

    /// Metric values in [`Metric::ALL`] order.
    #[must_use]
    pub fn metric_values(&self) -> Vec<f64> {
        Metric::ALL.into_iter().map(|m| self.metric(m)).collect()
    }

    /// Value of one metric.
    #[must_use]
    pub const fn metric(&self, metric: Metric) -> f64 {
        let b = &self.binarization;
        let i = &self.intensity;
        let f = &self.flow;
        match metric {
            Metric::Connectivity => b.spanning,
            Metric::MaxIslandArea => b.max_island_size,
            Metric::MaxVoidArea => b.max_void_size,
            Metric::IslandAreaChange => b.avg_island_percent_change,
            Metric::VoidAreaChange => b.avg_void_percent_change,
            Metric::InitialIslandArea => b.island_size_initial,
            Metric::InitialSecondIslandArea => b.island_size_initial2,
            Metric::MaxKurtosis => i.max_kurtosis,
            Metric::MaxMedianSkewness => i.max_median_skew,
            Metric::MaxModeSkewness => i.max_mode_skew,
            Metric::KurtosisChange => i.kurtosis_diff,
            Metric::MedianSkewnessChange => i.median_skew_diff,
            Metric::ModeSkewnessChange => i.mode_skew_diff,
            Metric::MeanSpeed => f.mean_speed,
            Metric::SpeedChange => f.delta_speed,
            Metric::MeanDirection => f.mean_theta,
            Metric::DirectionSpread => f.mean_sigma_theta,
        }
    }

    /// Overwrite one metric.
    pub const fn set_metric(&mut self, metric: Metric, value: f64) {
        let slot = match metric {
            Metric::Connectivity => &mut self.binarization.spanning,
            Metric::MaxIslandArea => &mut self.binarization.max_island_size,
            Metric::MaxVoidArea => &mut self.binarization.max_void_size,
            Metric::IslandAreaChange => &mut self.binarization.avg_island_percent_change,
            Metric::VoidAreaChange => &mut self.binarization.avg_void_percent_change,
            Metric::InitialIslandArea => &mut self.binarization.island_size_initial,
            Metric::InitialSecondIslandArea => &mut self.binarization.island_size_initial2,
            Metric::MaxKurtosis => &mut self.intensity.max_kurtosis,
            Metric::MaxMedianSkewness => &mut self.intensity.max_median_skew,
            Metric::MaxModeSkewness => &mut self.intensity.max_mode_skew,
            Metric::KurtosisChange => &mut self.intensity.kurtosis_diff,
            Metric::MedianSkewnessChange => &mut self.intensity.median_skew_diff,
            Metric::ModeSkewnessChange => &mut self.intensity.mode_skew_diff,
            Metric::MeanSpeed => &mut self.flow.mean_speed,
            Metric::SpeedChange => &mut self.flow.delta_speed,
            Metric::MeanDirection => &mut self.flow.mean_theta,
            Metric::DirectionSpread => &mut self.flow.mean_sigma_theta,
        };
        *slot = value;
    }
}

/// Sort `results` ascending by the column named `header`.
///
/// `Filepath` sorts as text; every other column numerically with `NaN`
/// last. The sort is stable. Returns `false` (leaving the order
/// untouched) if `header` names no column.
pub fn sort_by_metric(results: &mut [ChannelResults], header: &str) -> bool {
    match header {
        FILEPATH_HEADER => results.sort_by(|a, b| a.filepath.cmp(&b.filepath)),
        CHANNEL_HEADER => results.sort_by_key(|r| r.channel),
        FLAGS_HEADER => results.sort_by_key(|r| r.dim_channel_flag),
        _ => {
            let Some(metric) = Metric::from_header(header) else {
                return false;
            };
            results.sort_by(|a, b| nan_last(a.metric(metric), b.metric(metric)));
        }
    }
    true
}

fn nan_last(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.total_cmp(&b),
    }
}
