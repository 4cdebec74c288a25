//! Dense optical flow between two grayscale frames.
//!
//! This module defines the [`FlowEstimator`] trait for pluggable dense
//! flow backends and the [`FlowEstimatorKind`] enum for selecting one at
//! runtime. An estimator returns one `(u, v)` displacement per pixel:
//! `u` along columns (x), `v` along rows (y), both in pixels per frame
//! gap.

use ndarray::{Array2, ArrayBase, Data, Ix2, Zip};
use serde::{Deserialize, Serialize};

use crate::types::{FrameView, PipelineError};

/// Determinants below this are treated as an untextured window.
const MIN_DETERMINANT: f64 = 1e-9;

/// Selects which dense flow algorithm to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FlowEstimatorKind {
    /// Windowed Lucas-Kanade: least-squares solution of the brightness
    /// constancy equation over a square window around every pixel.
    ///
    /// Untextured windows (singular structure tensor) get zero flow.
    #[default]
    LucasKanade,
}

/// Per-pixel displacement field.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowField {
    /// Horizontal (column) displacement.
    pub u: Array2<f32>,
    /// Vertical (row) displacement, positive downwards.
    pub v: Array2<f32>,
}

impl FlowField {
    /// Field dimensions as `(height, width)`.
    #[must_use]
    pub fn dim(&self) -> (usize, usize) {
        self.u.dim()
    }
}

/// Trait for dense optical flow strategies.
pub trait FlowEstimator {
    /// Estimate the flow that carries `prev` onto `next`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidTensor`] if the frames differ in
    /// shape, or [`PipelineError::InvalidConfig`] for a zero window.
    fn estimate(
        &self,
        prev: FrameView<'_>,
        next: FrameView<'_>,
        window_size: usize,
    ) -> Result<FlowField, PipelineError>;
}

impl FlowEstimator for FlowEstimatorKind {
    fn estimate(
        &self,
        prev: FrameView<'_>,
        next: FrameView<'_>,
        window_size: usize,
    ) -> Result<FlowField, PipelineError> {
        if prev.dim() != next.dim() {
            return Err(PipelineError::InvalidTensor(format!(
                "flow frames differ in shape: {:?} vs {:?}",
                prev.dim(),
                next.dim()
            )));
        }
        if window_size == 0 {
            return Err(PipelineError::InvalidConfig(
                "flow window size must be at least 1".to_string(),
            ));
        }
        match *self {
            Self::LucasKanade => Ok(lucas_kanade(prev, next, window_size)),
        }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::similar_names)]
fn lucas_kanade(prev: FrameView<'_>, next: FrameView<'_>, window_size: usize) -> FlowField {
    let (height, width) = prev.dim();
    let ix = gradient(&prev, |r, c| (r, c.saturating_sub(1)), |r, c| (r, (c + 1).min(width - 1)));
    let iy = gradient(&prev, |r, c| (r.saturating_sub(1), c), |r, c| ((r + 1).min(height - 1), c));
    let it = Zip::from(&next)
        .and(&prev)
        .map_collect(|n, p| f64::from(*n) - f64::from(*p));

    let sxx = BoxSum::new(&(&ix * &ix));
    let sxy = BoxSum::new(&(&ix * &iy));
    let syy = BoxSum::new(&(&iy * &iy));
    let sxt = BoxSum::new(&(&ix * &it));
    let syt = BoxSum::new(&(&iy * &it));

    let before = window_size / 2;
    let after = window_size - before;
    let mut u = Array2::<f32>::zeros((height, width));
    let mut v = Array2::<f32>::zeros((height, width));
    for r in 0..height {
        let rows = (r.saturating_sub(before), (r + after).min(height));
        for c in 0..width {
            let cols = (c.saturating_sub(before), (c + after).min(width));
            let a = sxx.sum(rows, cols);
            let b = sxy.sum(rows, cols);
            let d = syy.sum(rows, cols);
            let xt = sxt.sum(rows, cols);
            let yt = syt.sum(rows, cols);
            let det = a.mul_add(d, -(b * b));
            if det.abs() < MIN_DETERMINANT {
                continue;
            }
            u[[r, c]] = (b.mul_add(yt, -(d * xt)) / det) as f32;
            v[[r, c]] = (b.mul_add(xt, -(a * yt)) / det) as f32;
        }
    }
    FlowField { u, v }
}

/// Central difference between the pixels chosen by `lo` and `hi`,
/// one-sided at the borders.
#[allow(clippy::cast_precision_loss)]
fn gradient(
    frame: &FrameView<'_>,
    lo: impl Fn(usize, usize) -> (usize, usize),
    hi: impl Fn(usize, usize) -> (usize, usize),
) -> Array2<f64> {
    Array2::from_shape_fn(frame.dim(), |(r, c)| {
        let (lr, lc) = lo(r, c);
        let (hr, hc) = hi(r, c);
        let span = (hr - lr + hc - lc) as f64;
        if span == 0.0 {
            return 0.0;
        }
        (f64::from(frame[[hr, hc]]) - f64::from(frame[[lr, lc]])) / span
    })
}

/// Summed-area table for constant-time rectangular sums.
struct BoxSum {
    table: Array2<f64>,
}

impl BoxSum {
    fn new<S: Data<Elem = f64>>(values: &ArrayBase<S, Ix2>) -> Self {
        let (height, width) = values.dim();
        let mut table = Array2::<f64>::zeros((height + 1, width + 1));
        for r in 0..height {
            let mut row_sum = 0.0;
            for c in 0..width {
                row_sum += values[[r, c]];
                table[[r + 1, c + 1]] = table[[r, c + 1]] + row_sum;
            }
        }
        Self { table }
    }

    /// Sum over rows `[r0, r1)` and columns `[c0, c1)`.
    fn sum(&self, (r0, r1): (usize, usize), (c0, c1): (usize, usize)) -> f64 {
        self.table[[r1, c1]] - self.table[[r0, c1]] - self.table[[r1, c0]] + self.table[[r0, c0]]
    }
}
