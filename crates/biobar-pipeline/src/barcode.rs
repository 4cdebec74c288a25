//! Barcode encoding: one colour per (result row, metric).
//!
//! Each metric column is normalised into `[0, 1]` with limits chosen by
//! its [`Unit`](crate::results::Unit), then mapped through the plasma
//! colormap. Missing values (`NaN`) are drawn black. Limits always come
//! from the full result set, so per-channel barcodes share one scale.
//! Rasterising the colours is left to the export crate.

use std::f64::consts::PI;

use serde::Serialize;

use crate::results::{ChannelResults, Metric, Unit};

/// Colour of a missing value.
pub const BAD_COLOR: [u8; 3] = [0, 0, 0];

/// Plasma colormap sampled at nine evenly spaced points.
const PLASMA: [[u8; 3]; 9] = [
    [13, 8, 135],
    [84, 2, 163],
    [126, 3, 168],
    [168, 34, 150],
    [204, 71, 120],
    [230, 108, 92],
    [248, 149, 64],
    [254, 188, 43],
    [240, 249, 33],
];

/// Normalisation range of one metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Limits {
    /// Value mapped to 0.
    pub min: f64,
    /// Value mapped to 1.
    pub max: f64,
}

impl Limits {
    /// Map `value` into `[0, 1]`, clamping out-of-range values.
    ///
    /// Returns `None` for `NaN` values or unusable limits. A degenerate
    /// range (`min == max`) maps everything to 0.
    #[must_use]
    pub fn normalize(&self, value: f64) -> Option<f64> {
        if value.is_nan() || self.min.is_nan() || self.max.is_nan() {
            return None;
        }
        let span = self.max - self.min;
        if span == 0.0 {
            return Some(0.0);
        }
        Some(((value - self.min) / span).clamp(0.0, 1.0))
    }
}

/// Limits for one metric given its column of values.
///
/// Fractions of the FOV or of frames use `[0, 1]`; directions `[-pi, pi]`
/// and direction spread `[0, pi]`; speeds `[0, max]`. Fractional changes
/// and unitless statistics span the data, widened to include 1 and 0
/// respectively.
#[must_use]
pub fn limits_for(metric: Metric, column: &[f64]) -> Limits {
    match metric.unit() {
        Unit::PercentFov | Unit::PercentFrames => Limits { min: 0.0, max: 1.0 },
        Unit::Direction if metric == Metric::DirectionSpread => Limits { min: 0.0, max: PI },
        Unit::Direction => Limits { min: -PI, max: PI },
        Unit::PercentChange => dynamic(column, 1.0),
        Unit::Speed | Unit::Acceleration => Limits {
            min: 0.0,
            max: nan_extent(column).map_or(f64::NAN, |(_, max)| max),
        },
        Unit::None => dynamic(column, 0.0),
    }
}

/// Limits for every metric over `results`, in [`Metric::ALL`] order.
#[must_use]
pub fn data_limits(results: &[ChannelResults]) -> Vec<Limits> {
    Metric::ALL
        .into_iter()
        .map(|metric| {
            let column: Vec<f64> = results.iter().map(|r| r.metric(metric)).collect();
            limits_for(metric, &column)
        })
        .collect()
}

fn dynamic(column: &[f64], reference: f64) -> Limits {
    nan_extent(column).map_or(
        Limits {
            min: f64::NAN,
            max: f64::NAN,
        },
        |(min, max)| Limits {
            min: min.min(reference),
            max: max.max(reference),
        },
    )
}

/// Minimum and maximum ignoring `NaN`; `None` if every value is `NaN`.
fn nan_extent(column: &[f64]) -> Option<(f64, f64)> {
    column
        .iter()
        .copied()
        .filter(|v| !v.is_nan())
        .fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((min, max)) => Some((f64::min(min, v), f64::max(max, v))),
        })
}

/// Plasma colour of `t` in `[0, 1]`, linearly interpolated.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn plasma(t: f64) -> [u8; 3] {
    let last = PLASMA.len() - 1;
    let pos = t.clamp(0.0, 1.0) * last as f64;
    let lower = (pos.floor() as usize).min(last - 1);
    let frac = pos - lower as f64;
    let (a, b) = (PLASMA[lower], PLASMA[lower + 1]);
    std::array::from_fn(|i| {
        let (a, b) = (f64::from(a[i]), f64::from(b[i]));
        (frac.mul_add(b - a, a)).round() as u8
    })
}

/// Colour of `value` under `limits`.
#[must_use]
pub fn color(value: f64, limits: &Limits) -> [u8; 3] {
    limits.normalize(value).map_or(BAD_COLOR, plasma)
}

/// How result rows are split into barcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Grouping {
    /// One barcode per distinct channel.
    #[default]
    PerChannel,
    /// A single barcode holding every row.
    Combined,
}

/// Colour grid of one barcode: `rows[i][j]` is metric `j` of row `i`.
#[derive(Debug, Clone, PartialEq)]
pub struct Barcode {
    /// Channel shown, or `None` for a combined barcode.
    pub channel: Option<i64>,
    /// One colour per metric per result row.
    pub rows: Vec<Vec<[u8; 3]>>,
    /// Limits used for each metric column.
    pub limits: Vec<Limits>,
}

impl Barcode {
    /// Encode `results` into one or more barcodes.
    ///
    /// Per-channel barcodes are ordered by channel; rows keep the order
    /// of `results`. An empty input yields no barcodes.
    #[must_use]
    pub fn from_results(results: &[ChannelResults], grouping: Grouping) -> Vec<Self> {
        if results.is_empty() {
            return Vec::new();
        }
        let limits = data_limits(results);
        match grouping {
            Grouping::Combined => vec![Self {
                channel: None,
                rows: encode(results.iter(), &limits),
                limits,
            }],
            Grouping::PerChannel => {
                let mut channels: Vec<i64> = results.iter().map(|r| r.channel).collect();
                channels.sort_unstable();
                channels.dedup();
                channels
                    .into_iter()
                    .map(|channel| Self {
                        channel: Some(channel),
                        rows: encode(results.iter().filter(|r| r.channel == channel), &limits),
                        limits: limits.clone(),
                    })
                    .collect()
            }
        }
    }

    /// Number of metric columns.
    #[must_use]
    pub fn num_metrics(&self) -> usize {
        self.limits.len()
    }
}

fn encode<'r>(
    rows: impl Iterator<Item = &'r ChannelResults>,
    limits: &[Limits],
) -> Vec<Vec<[u8; 3]>> {
    rows.map(|r| {
        r.metric_values()
            .into_iter()
            .zip(limits)
            .map(|(value, limits)| color(value, limits))
            .collect()
    })
    .collect()
}

/// Legend label of a metric: header plus unit, if any.
#[must_use]
pub fn metric_label(metric: Metric) -> String {
    let unit = metric.unit().label();
    if unit.is_empty() {
        metric.header().to_string()
    } else {
        format!("{} ({unit})", metric.header())
    }
}
