//! Optional capture of per-frame intermediate data.
//!
//! Engines hand every binarized mask, flow field and intensity histogram
//! they compute to a [`Recorder`]. The pipeline crate never touches the
//! filesystem itself; serializing recorders live in `biobar-export`.

use ndarray::ArrayView2;

use crate::types::{Mask, PipelineError};

/// Sink for intermediate per-frame data.
///
/// Every method defaults to a no-op so implementors only override the
/// data they care about. An error aborts the calling engine, which the
/// orchestrator then records as a module failure.
pub trait Recorder {
    /// A binarized frame after pooling.
    ///
    /// # Errors
    ///
    /// Implementation-defined; typically a write failure.
    fn binarized_frame(&mut self, frame_index: usize, mask: &Mask) -> Result<(), PipelineError> {
        let _ = (frame_index, mask);
        Ok(())
    }

    /// A pooled flow field between frames `start` and `end`.
    ///
    /// # Errors
    ///
    /// Implementation-defined; typically a write failure.
    fn flow_field(
        &mut self,
        start: usize,
        end: usize,
        u: ArrayView2<'_, f32>,
        v: ArrayView2<'_, f32>,
    ) -> Result<(), PipelineError> {
        let _ = (start, end, u, v);
        Ok(())
    }

    /// The distinct intensity values of one frame and how often each occurs.
    ///
    /// # Errors
    ///
    /// Implementation-defined; typically a write failure.
    fn intensity_histogram(
        &mut self,
        frame_index: usize,
        values: &[f64],
        counts: &[usize],
    ) -> Result<(), PipelineError> {
        let _ = (frame_index, values, counts);
        Ok(())
    }

    /// Called once after every engine has run on the channel.
    ///
    /// # Errors
    ///
    /// Implementation-defined; typically a flush failure.
    fn finish(&mut self) -> Result<(), PipelineError> {
        Ok(())
    }
}

/// Hands out one [`Recorder`] per analysed `(file, channel)` unit.
pub trait RecorderFactory {
    /// Recorder for `channel` of `file`.
    ///
    /// # Errors
    ///
    /// Implementation-defined. The orchestrator logs the failure and
    /// analyses the channel without recording.
    fn recorder(&mut self, file: &str, channel: usize) -> Result<Box<dyn Recorder>, PipelineError>;
}

/// Recorder that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullRecorder;

impl Recorder for NullRecorder {}

impl RecorderFactory for NullRecorder {
    fn recorder(&mut self, _file: &str, _channel: usize) -> Result<Box<dyn Recorder>, PipelineError> {
        Ok(Box::new(Self))
    }
}

impl<R: Recorder + ?Sized> Recorder for &mut R {
    fn binarized_frame(&mut self, frame_index: usize, mask: &Mask) -> Result<(), PipelineError> {
        (**self).binarized_frame(frame_index, mask)
    }

    fn flow_field(
        &mut self,
        start: usize,
        end: usize,
        u: ArrayView2<'_, f32>,
        v: ArrayView2<'_, f32>,
    ) -> Result<(), PipelineError> {
        (**self).flow_field(start, end, u, v)
    }

    fn intensity_histogram(
        &mut self,
        frame_index: usize,
        values: &[f64],
        counts: &[usize],
    ) -> Result<(), PipelineError> {
        (**self).intensity_histogram(frame_index, values, counts)
    }

    fn finish(&mut self) -> Result<(), PipelineError> {
        (**self).finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use ndarray::Array2;

    use super::*;

    #[derive(Default)]
    struct Counting {
        masks: usize,
    }

    impl Recorder for Counting {
        fn binarized_frame(&mut self, _: usize, _: &Mask) -> Result<(), PipelineError> {
            self.masks += 1;
            Ok(())
        }
    }

    #[test]
    fn null_recorder_accepts_everything() {
        let mut rec = NullRecorder;
        let field = Array2::<f32>::zeros((2, 2));
        rec.binarized_frame(0, &Mask::zeros((2, 2))).unwrap();
        rec.flow_field(0, 1, field.view(), field.view()).unwrap();
        rec.intensity_histogram(0, &[1.0], &[4]).unwrap();
    }

    fn feed(mut recorder: impl Recorder) {
        recorder.binarized_frame(3, &Mask::zeros((1, 1))).unwrap();
        // Default methods stay no-ops.
        recorder.intensity_histogram(3, &[], &[]).unwrap();
    }

    #[test]
    fn forwarding_through_mut_ref() {
        let mut counting = Counting::default();
        feed(&mut counting);
        feed(&mut counting);
        assert_eq!(counting.masks, 2);
    }

    #[test]
    fn boxed_recorders_forward() {
        let mut factory = NullRecorder;
        let mut boxed = factory.recorder("a", 0).unwrap();
        feed(&mut *boxed);
        boxed.finish().unwrap();
    }
}
