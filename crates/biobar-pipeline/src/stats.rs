//! Shared numeric reductions used by every analysis engine.
//!
//! All reductions follow IEEE semantics: an empty input yields `NaN`,
//! division by a zero baseline yields `inf`/`NaN`, and `NaN` values
//! propagate rather than being filtered. Exported tables rely on those
//! sentinels being produced consistently.

use ndarray::{ArrayBase, Data, Dimension};

/// Fraction of the largest values averaged by [`top_decile_average`].
pub const TOP_FRACTION: f64 = 0.1;

/// A channel is dim when `DIM_RATIO * mean <= min`.
pub const DIM_RATIO: f64 = 2.0 / std::f64::consts::E;

/// Arithmetic mean; `NaN` for an empty slice.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation; `NaN` for an empty slice.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn std_dev(values: &[f64]) -> f64 {
    let mu = mean(values);
    if mu.is_nan() {
        return mu;
    }
    let var = values.iter().map(|v| (v - mu) * (v - mu)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

/// Mean of the largest `ceil(0.1 * n)` values (at least one).
///
/// Sorting uses IEEE total order, so a `NaN` in the input ranks above
/// every number and propagates into the result. Returns `NaN` for an
/// empty slice.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn top_decile_average(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| b.total_cmp(a));
    let count = ((sorted.len() as f64 * TOP_FRACTION).ceil() as usize).max(1);
    mean(&sorted[..count.min(sorted.len())])
}

/// Mean of the first `initial` values of `series` (at least one).
///
/// This is the baseline that percent-gain series are divided by.
#[must_use]
pub fn baseline(series: &[f64], initial: usize) -> f64 {
    let count = initial.max(1).min(series.len());
    mean(&series[..count])
}

/// Divide every value of `series` by its [`baseline`] over `initial` samples.
///
/// A zero baseline produces `inf`/`NaN` entries; those are valid
/// sentinel outputs, not errors.
#[must_use]
pub fn percent_gain(series: &[f64], initial: usize) -> Vec<f64> {
    let base = baseline(series, initial);
    series.iter().map(|v| v / base).collect()
}

/// Whether the minimum intensity is at least `2/e` of the mean, i.e. the
/// darkest pixel is too close to the average to threshold reliably.
///
/// An all-zero array is dim; an empty array is never dim.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn is_dim<S, D>(data: &ArrayBase<S, D>) -> bool
where
    S: Data<Elem = f32>,
    D: Dimension,
{
    if data.is_empty() {
        return false;
    }
    let mut min = f64::INFINITY;
    let mut sum = 0.0;
    for &v in data {
        let v = f64::from(v);
        min = min.min(v);
        sum += v;
    }
    let mean = sum / data.len() as f64;
    DIM_RATIO * mean <= min
}

/// Shape statistics of one frame's intensity distribution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistributionStats {
    /// Arithmetic mean.
    pub mean: f64,
    /// Population standard deviation.
    pub std_dev: f64,
    /// Median (mean of the two central values for even counts).
    pub median: f64,
    /// Most frequent value; the smallest one on ties.
    pub mode: f64,
    /// Largest value.
    pub max: f64,
    /// Excess kurtosis from population moments: `m4 / m2^2 - 3`.
    pub kurtosis: f64,
}

impl DistributionStats {
    /// Compute statistics over every element of `data`.
    ///
    /// Returns `None` for an empty array.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_array<S, D>(data: &ArrayBase<S, D>) -> Option<Self>
    where
        S: Data<Elem = f32>,
        D: Dimension,
    {
        if data.is_empty() {
            return None;
        }
        let mut values: Vec<f64> = data.iter().map(|v| f64::from(*v)).collect();
        values.sort_by(f64::total_cmp);

        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let (m2, m4) = values.iter().fold((0.0, 0.0), |(m2, m4), v| {
            let d = v - mean;
            let d2 = d * d;
            (m2 + d2, d2.mul_add(d2, m4))
        });
        let m2 = m2 / n;
        let m4 = m4 / n;

        let mid = values.len() / 2;
        let median = if values.len() % 2 == 0 {
            f64::midpoint(values[mid - 1], values[mid])
        } else {
            values[mid]
        };

        Some(Self {
            mean,
            std_dev: m2.sqrt(),
            median,
            mode: sorted_mode(&values),
            max: values[values.len() - 1],
            kurtosis: m4 / (m2 * m2) - 3.0,
        })
    }

    /// Median-based (Pearson's second) skewness: `3 (mean - median) / std`.
    #[must_use]
    pub fn median_skewness(&self) -> f64 {
        3.0 * (self.mean - self.median) / self.std_dev
    }

    /// Mode-based (Pearson's first) skewness: `(mean - mode) / std`.
    #[must_use]
    pub fn mode_skewness(&self) -> f64 {
        (self.mean - self.mode) / self.std_dev
    }

    /// Whether the brightest value is also the most frequent one.
    ///
    /// Indicates detector saturation.
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn is_saturated(&self) -> bool {
        self.max == self.mode
    }
}

/// Longest run of equal values in an ascending slice; first run wins ties.
#[allow(clippy::float_cmp)]
fn sorted_mode(sorted: &[f64]) -> f64 {
    let mut best = f64::NAN;
    let mut best_len = 0;
    let mut run_start = 0;
    for i in 1..=sorted.len() {
        if i == sorted.len() || sorted[i] != sorted[run_start] {
            let run_len = i - run_start;
            if run_len > best_len {
                best_len = run_len;
                best = sorted[run_start];
            }
            run_start = i;
        }
    }
    best
}

/// Histogram of distinct values in ascending order with their counts.
#[must_use]
#[allow(clippy::float_cmp)]
pub fn value_counts<S, D>(data: &ArrayBase<S, D>) -> (Vec<f64>, Vec<usize>)
where
    S: Data<Elem = f32>,
    D: Dimension,
{
    let mut values: Vec<f64> = data.iter().map(|v| f64::from(*v)).collect();
    values.sort_by(f64::total_cmp);
    let mut distinct: Vec<f64> = Vec::new();
    let mut counts: Vec<usize> = Vec::new();
    for v in values {
        match distinct.last() {
            Some(last) if *last == v => {
                if let Some(c) = counts.last_mut() {
                    *c += 1;
                }
            }
            _ => {
                distinct.push(v);
                counts.push(1);
            }
        }
    }
    (distinct, counts)
}
