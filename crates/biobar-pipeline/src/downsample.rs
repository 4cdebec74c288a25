//! Block pooling of frames, masks and flow components.
//!
//! The grid is tiled into non-overlapping `factor x factor` blocks and
//! each block is reduced to a single value. Trailing rows and columns
//! that do not fill a whole block are dropped, so the output shape is
//! `(height / factor, width / factor)`.

use ndarray::{Array2, ArrayBase, Data, Ix2, s};

use crate::types::Mask;

/// Pooling factor applied to binarized masks before region labelling.
pub const MASK_POOL_FACTOR: usize = 2;

/// Output shape of pooling a `(height, width)` grid by `factor`.
#[must_use]
pub const fn pooled_shape(height: usize, width: usize, factor: usize) -> (usize, usize) {
    if factor == 0 {
        return (height, width);
    }
    (height / factor, width / factor)
}

/// Mean of every `factor x factor` block.
///
/// Accumulates in `f64`. A factor of 0 or 1 returns a copy of the input.
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
pub fn block_mean<S>(data: &ArrayBase<S, Ix2>, factor: usize) -> Array2<f32>
where
    S: Data<Elem = f32>,
{
    if factor <= 1 {
        return data.to_owned();
    }
    let (height, width) = data.dim();
    let area = (factor * factor) as f64;
    Array2::from_shape_fn(pooled_shape(height, width, factor), |(r, c)| {
        let block = data.slice(s![
            r * factor..(r + 1) * factor,
            c * factor..(c + 1) * factor
        ]);
        (block.iter().map(|v| f64::from(*v)).sum::<f64>() / area) as f32
    })
}

/// Pool a binary mask: a block is foreground if any pixel in it is.
///
/// Equivalent to summing each block and re-binarizing with `> 0`. A mask
/// smaller than one block along either axis is returned unchanged so
/// that tiny frames still have something to label.
#[must_use]
pub fn pool_mask(mask: &Mask, factor: usize) -> Mask {
    let (height, width) = mask.dim();
    if factor <= 1 || height < factor || width < factor {
        return mask.clone();
    }
    Array2::from_shape_fn(pooled_shape(height, width, factor), |(r, c)| {
        let block = mask.slice(s![
            r * factor..(r + 1) * factor,
            c * factor..(c + 1) * factor
        ]);
        u8::from(block.iter().any(|v| *v != 0))
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn pooled_shape_drops_remainder() {
        assert_eq!(pooled_shape(9, 7, 2), (4, 3));
        assert_eq!(pooled_shape(9, 7, 0), (9, 7));
    }

    #[test]
    fn block_mean_averages_tiles() {
        let data = array![
            [1.0_f32, 3.0, 0.0, 0.0],
            [5.0, 7.0, 0.0, 4.0],
        ];
        let pooled = block_mean(&data, 2);
        assert_eq!(pooled, array![[4.0_f32, 1.0]]);
    }

    #[test]
    fn block_mean_drops_partial_blocks() {
        let data = Array2::from_elem((5, 5), 2.0_f32);
        let pooled = block_mean(&data, 2);
        assert_eq!(pooled.dim(), (2, 2));
        assert!(pooled.iter().all(|v| (*v - 2.0).abs() < f32::EPSILON));
    }

    #[test]
    fn block_mean_factor_one_is_identity() {
        let data = array![[1.0_f32, 2.0], [3.0, 4.0]];
        assert_eq!(block_mean(&data, 1), data);
    }

    #[test]
    fn block_mean_factor_larger_than_grid_is_empty() {
        let data = Array2::from_elem((3, 3), 1.0_f32);
        assert_eq!(block_mean(&data, 4).dim(), (0, 0));
    }

    #[test]
    fn pool_mask_any_foreground() {
        let mask = array![
            [0_u8, 0, 0, 1],
            [0, 0, 0, 0],
            [1, 0, 0, 0],
            [0, 0, 0, 0],
        ];
        assert_eq!(pool_mask(&mask, 2), array![[0_u8, 1], [1, 0]]);
    }

    #[test]
    fn pool_mask_tiny_grid_unchanged() {
        let mask = array![[1_u8, 0, 1]];
        assert_eq!(pool_mask(&mask, 2), mask);
    }
}
