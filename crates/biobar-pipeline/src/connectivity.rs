//! Region labelling on binary masks.
//!
//! This module defines the [`RegionLabeler`] trait for pluggable
//! connected-component backends and the [`LabelerKind`] enum for
//! selecting one at runtime. Every backend must use 8-connectivity:
//! pixels touching diagonally belong to the same region.
//!
//! On top of a label grid it derives per-region properties (area and
//! centroid), the area ranking used to pick islands and voids, and the
//! percolation test used for the spanning metric.

use std::collections::BTreeSet;

use image::{GrayImage, Luma};
use imageproc::region_labelling::{Connectivity, connected_components};
use ndarray::{Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

use crate::types::Mask;

/// Per-pixel region labels: 0 is unlabelled, regions are `1..`.
pub type LabelGrid = Array2<u32>;

/// Selects which connected-component backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LabelerKind {
    /// Two-pass union-find labelling via
    /// `imageproc::region_labelling::connected_components`.
    #[default]
    Imageproc,
}

/// Trait for connected-component labelling strategies.
///
/// Input: a binary mask (non-zero = pixel to label).
/// Output: a grid of the same shape where each 8-connected group of
/// non-zero pixels shares a distinct positive label.
pub trait RegionLabeler {
    /// Label the non-zero pixels of `mask`.
    fn label(&self, mask: &Mask) -> LabelGrid;
}

impl RegionLabeler for LabelerKind {
    fn label(&self, mask: &Mask) -> LabelGrid {
        match *self {
            Self::Imageproc => label_imageproc(mask),
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn label_imageproc(mask: &Mask) -> LabelGrid {
    let (height, width) = mask.dim();
    let image = GrayImage::from_fn(width as u32, height as u32, |x, y| {
        Luma([mask[[y as usize, x as usize]]])
    });
    let labels = connected_components(&image, Connectivity::Eight, Luma([0_u8]));
    Array2::from_shape_fn((height, width), |(r, c)| {
        labels.get_pixel(c as u32, r as u32)[0]
    })
}

/// One connected region of a label grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Region {
    /// Label value shared by the region's pixels.
    pub label: u32,
    /// Pixel count.
    pub area: usize,
    /// Mean `(row, col)` of the region's pixels.
    pub centroid: (f64, f64),
}

/// Collect every labelled region, ordered by label.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn regions(labels: &LabelGrid) -> Vec<Region> {
    let max_label = labels.iter().copied().max().unwrap_or(0) as usize;
    // (area, row sum, col sum) per label
    let mut acc = vec![(0_usize, 0.0_f64, 0.0_f64); max_label + 1];
    for ((r, c), &label) in labels.indexed_iter() {
        if label == 0 {
            continue;
        }
        let entry = &mut acc[label as usize];
        entry.0 += 1;
        entry.1 += r as f64;
        entry.2 += c as f64;
    }
    acc.into_iter()
        .enumerate()
        .skip(1)
        .filter(|(_, (area, _, _))| *area > 0)
        .map(|(label, (area, rows, cols))| Region {
            label: u32::try_from(label).unwrap_or(u32::MAX),
            area,
            centroid: (rows / area as f64, cols / area as f64),
        })
        .collect()
}

/// Order regions by descending area; equal areas keep label order.
#[must_use]
pub fn rank_by_area(mut regions: Vec<Region>) -> Vec<Region> {
    regions.sort_by_key(|r| r.label);
    regions.sort_by(|a, b| b.area.cmp(&a.area));
    regions
}

/// Label `mask` and return its regions ranked by area.
#[must_use]
pub fn ranked_regions(labeler: &impl RegionLabeler, mask: &Mask) -> Vec<Region> {
    rank_by_area(regions(&labeler.label(mask)))
}

/// Logical inverse of a binary mask.
#[must_use]
pub fn invert(mask: &Mask) -> Mask {
    mask.mapv(|v| u8::from(v == 0))
}

/// Whether any region touches both the top and bottom rows, or both the
/// left and right columns.
///
/// An empty grid never spans.
#[must_use]
pub fn spans(labels: &LabelGrid) -> bool {
    let (height, width) = labels.dim();
    if height == 0 || width == 0 {
        return false;
    }
    let shares_label = |a: ArrayView1<'_, u32>, b: ArrayView1<'_, u32>| {
        let first: BTreeSet<u32> = a.iter().copied().filter(|l| *l != 0).collect();
        b.iter().any(|l| *l != 0 && first.contains(l))
    };
    shares_label(
        labels.index_axis(Axis(0), 0),
        labels.index_axis(Axis(0), height - 1),
    ) || shares_label(
        labels.index_axis(Axis(1), 0),
        labels.index_axis(Axis(1), width - 1),
    )
}
