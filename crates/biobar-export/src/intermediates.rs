//! Per-frame intermediate data as CSV.
//!
//! [`CsvRecorder`] writes up to three streams, one per engine:
//!
//! - binarization: a row holding the frame index, one row per pooled
//!   mask row, then a blank row;
//! - optical flow: `Flow Field (a-b)`, `X-Direction` followed by the `u`
//!   rows, `Y-Direction` followed by the `v` rows;
//! - intensity: `Frame i`, the distinct values, their counts, then a
//!   blank row.
//!
//! Rows have different lengths, so the streams are written with a
//! flexible CSV writer.

use std::io::Write;

use biobar_pipeline::types::{Mask, PipelineError};
use biobar_pipeline::Recorder;
use ndarray::{ArrayView2, Axis};

/// File name of the binarization stream.
pub const BINARIZATION_FILE: &str = "BinarizationData.csv";
/// File name of the optical flow stream.
pub const FLOW_FILE: &str = "OpticalFlow.csv";
/// File name of the intensity distribution stream.
pub const INTENSITY_FILE: &str = "IntensityDistribution.csv";

/// [`Recorder`] that serializes intermediate data into CSV streams.
///
/// A stream left as `None` is skipped. `label` names the streams in
/// error messages.
pub struct CsvRecorder<W: Write> {
    label: String,
    binarization: Option<csv::Writer<W>>,
    flow: Option<csv::Writer<W>>,
    intensity: Option<csv::Writer<W>>,
}

impl<W: Write> CsvRecorder<W> {
    /// Create a recorder over the given streams.
    pub fn new(
        label: impl Into<String>,
        binarization: Option<W>,
        flow: Option<W>,
        intensity: Option<W>,
    ) -> Self {
        let writer = |w: W| csv::WriterBuilder::new().flexible(true).from_writer(w);
        Self {
            label: label.into(),
            binarization: binarization.map(writer),
            flow: flow.map(writer),
            intensity: intensity.map(writer),
        }
    }

    /// Flush every stream and return the underlying writers.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Io`] if a final flush fails.
    #[allow(clippy::type_complexity)]
    pub fn into_inner(self) -> Result<(Option<W>, Option<W>, Option<W>), PipelineError> {
        let label = self.label;
        let release = |stream: Option<csv::Writer<W>>| {
            stream
                .map(|w| {
                    w.into_inner().map_err(|e| PipelineError::Io {
                        path: label.clone(),
                        message: e.error().to_string(),
                    })
                })
                .transpose()
        };
        Ok((
            release(self.binarization)?,
            release(self.flow)?,
            release(self.intensity)?,
        ))
    }

    fn io_error(&self, error: &impl std::fmt::Display) -> PipelineError {
        PipelineError::Io {
            path: self.label.clone(),
            message: error.to_string(),
        }
    }
}

fn write_grid<W: Write, T: ToString>(
    wtr: &mut csv::Writer<W>,
    grid: ArrayView2<'_, T>,
) -> csv::Result<()> {
    for row in grid.axis_iter(Axis(0)) {
        wtr.write_record(row.iter().map(ToString::to_string))?;
    }
    Ok(())
}

fn blank<W: Write>(wtr: &mut csv::Writer<W>) -> csv::Result<()> {
    wtr.write_record(std::iter::empty::<&str>())
}

impl<W: Write> Recorder for CsvRecorder<W> {
    fn binarized_frame(&mut self, frame_index: usize, mask: &Mask) -> Result<(), PipelineError> {
        let Some(wtr) = self.binarization.as_mut() else {
            return Ok(());
        };
        let result = wtr
            .write_record([frame_index.to_string()])
            .and_then(|()| write_grid(wtr, mask.view()))
            .and_then(|()| blank(wtr));
        result.map_err(|e| self.io_error(&e))
    }

    fn flow_field(
        &mut self,
        start: usize,
        end: usize,
        u: ArrayView2<'_, f32>,
        v: ArrayView2<'_, f32>,
    ) -> Result<(), PipelineError> {
        let Some(wtr) = self.flow.as_mut() else {
            return Ok(());
        };
        let result = wtr
            .write_record([format!("Flow Field ({start}-{end})")])
            .and_then(|()| wtr.write_record(["X-Direction"]))
            .and_then(|()| write_grid(wtr, u))
            .and_then(|()| wtr.write_record(["Y-Direction"]))
            .and_then(|()| write_grid(wtr, v));
        result.map_err(|e| self.io_error(&e))
    }

    fn intensity_histogram(
        &mut self,
        frame_index: usize,
        values: &[f64],
        counts: &[usize],
    ) -> Result<(), PipelineError> {
        let Some(wtr) = self.intensity.as_mut() else {
            return Ok(());
        };
        let result = wtr
            .write_record([format!("Frame {frame_index}")])
            .and_then(|()| wtr.write_record(values.iter().map(ToString::to_string)))
            .and_then(|()| wtr.write_record(counts.iter().map(ToString::to_string)))
            .and_then(|()| blank(wtr));
        result.map_err(|e| self.io_error(&e))
    }

    fn finish(&mut self) -> Result<(), PipelineError> {
        for wtr in [&mut self.binarization, &mut self.flow, &mut self.intensity]
            .into_iter()
            .flatten()
        {
            wtr.flush().map_err(|e| PipelineError::Io {
                path: self.label.clone(),
                message: e.to_string(),
            })?;
        }
        Ok(())
    }
}
