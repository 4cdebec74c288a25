//! Frame-sequence video reader.
//!
//! A video is a directory of PNG or TIFF frames, read in file-name
//! order. Grayscale frames give one channel and colour frames three
//! (alpha is dropped); 16-bit samples keep their full range. An optional
//! `metadata.json` next to the frames supplies calibration.

use std::fs;
use std::path::{Path, PathBuf};

use biobar_pipeline::{PipelineError, VideoMetadata, VideoTensor};
use image::DynamicImage;
use ndarray::{Array3, Array4, s};
use tracing::debug;

/// Calibration file looked up inside a video directory.
pub const METADATA_FILE: &str = "metadata.json";

const FRAME_EXTENSIONS: [&str; 3] = ["png", "tif", "tiff"];

/// Read the video stored in directory `path`.
///
/// # Errors
///
/// - [`PipelineError::Io`] if the directory cannot be listed, holds no
///   frames, or has an unparsable `metadata.json`.
/// - [`PipelineError::ImageDecode`] if a frame cannot be decoded.
/// - [`PipelineError::InvalidTensor`] if frames differ in size or
///   channel count.
pub fn read_video(path: &str) -> Result<VideoTensor, PipelineError> {
    let dir = Path::new(path);
    let frames = frame_paths(dir)?;
    debug!(path, frames = frames.len(), "reading frame sequence");

    let mut stack = Vec::with_capacity(frames.len());
    for frame in &frames {
        stack.push(frame_values(&image::open(frame)?)?);
    }
    let first = stack
        .first()
        .ok_or_else(|| io_error(dir, "no PNG or TIFF frames found"))?;
    let (height, width, channels) = first.dim();
    let mut data = Array4::zeros((stack.len(), height, width, channels));
    for (t, (frame, file)) in stack.iter().zip(&frames).enumerate() {
        if frame.dim() != (height, width, channels) {
            return Err(PipelineError::InvalidTensor(format!(
                "{} is {:?} but the first frame is {:?}",
                file.display(),
                frame.dim(),
                (height, width, channels),
            )));
        }
        data.slice_mut(s![t, .., .., ..]).assign(frame);
    }

    let video = VideoTensor::new(data)?;
    Ok(match read_metadata(dir)? {
        Some(metadata) => video.with_metadata(metadata),
        None => video,
    })
}

/// Frame files of `dir`, sorted by file name.
fn frame_paths(dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    let entries = fs::read_dir(dir).map_err(|e| io_error(dir, e))?;
    let mut frames = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| io_error(dir, e))?.path();
        let is_frame = path.is_file()
            && path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| FRAME_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
        if is_frame {
            frames.push(path);
        }
    }
    frames.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(frames)
}

/// Pixel values of one frame as `(height, width, channel)`.
fn frame_values(image: &DynamicImage) -> Result<Array3<f32>, PipelineError> {
    let color = image.color();
    let wide = color.bytes_per_pixel() > color.channel_count();
    let (width, height) = (image.width() as usize, image.height() as usize);
    let (samples, channels): (Vec<f32>, usize) = match (color.has_color(), wide) {
        (false, false) => (image.to_luma8().pixels().map(|p| f32::from(p.0[0])).collect(), 1),
        (false, true) => (image.to_luma16().pixels().map(|p| f32::from(p.0[0])).collect(), 1),
        (true, false) => (image.to_rgb8().into_raw().into_iter().map(f32::from).collect(), 3),
        (true, true) => (image.to_rgb16().into_raw().into_iter().map(f32::from).collect(), 3),
    };
    Array3::from_shape_vec((height, width, channels), samples)
        .map_err(|e| PipelineError::InvalidTensor(format!("frame layout: {e}")))
}

fn read_metadata(dir: &Path) -> Result<Option<VideoMetadata>, PipelineError> {
    let path = dir.join(METADATA_FILE);
    if !path.is_file() {
        return Ok(None);
    }
    let text = fs::read_to_string(&path).map_err(|e| io_error(&path, e))?;
    serde_json::from_str(&text)
        .map(Some)
        .map_err(|e| io_error(&path, e))
}

fn io_error(path: &Path, error: impl ToString) -> PipelineError {
    PipelineError::Io {
        path: path.display().to_string(),
        message: error.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use image::{GrayImage, ImageBuffer, Luma, Rgb, RgbImage};

    use super::*;

    fn dir_str(dir: &tempfile::TempDir) -> String {
        dir.path().to_str().unwrap().to_string()
    }

    #[test]
    #[allow(clippy::cast_possible_truncation)]
    fn grayscale_frames_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        // Written out of order; "frame_10" must sort after "frame_02".
        for (name, value) in [("frame_10.png", 30_u8), ("frame_01.png", 10), ("frame_02.png", 20)] {
            GrayImage::from_fn(4, 3, |x, _| Luma([value + x as u8]))
                .save(dir.path().join(name))
                .unwrap();
        }
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let video = read_video(&dir_str(&dir)).unwrap();
        assert_eq!(video.as_array().dim(), (3, 3, 4, 1));
        assert!((video.as_array()[[0, 0, 0, 0]] - 10.0).abs() < f32::EPSILON);
        assert!((video.as_array()[[2, 1, 3, 0]] - 33.0).abs() < f32::EPSILON);
        assert_eq!(*video.metadata(), VideoMetadata::default());
    }

    #[test]
    fn colour_frames_have_three_channels() {
        let dir = tempfile::tempdir().unwrap();
        RgbImage::from_pixel(2, 2, Rgb([1, 2, 3]))
            .save(dir.path().join("a.png"))
            .unwrap();
        let video = read_video(&dir_str(&dir)).unwrap();
        assert_eq!(video.num_channels(), 3);
        assert!((video.as_array()[[0, 1, 1, 2]] - 3.0).abs() < f32::EPSILON);
    }

    #[test]
    fn sixteen_bit_range_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let frame: ImageBuffer<Luma<u16>, Vec<u16>> = ImageBuffer::from_pixel(2, 2, Luma([4000]));
        frame.save(dir.path().join("a.png")).unwrap();
        let video = read_video(&dir_str(&dir)).unwrap();
        assert!((video.as_array()[[0, 0, 0, 0]] - 4000.0).abs() < f32::EPSILON);
    }

    #[test]
    fn metadata_file_is_attached() {
        let dir = tempfile::tempdir().unwrap();
        GrayImage::from_pixel(2, 2, Luma([5])).save(dir.path().join("a.png")).unwrap();
        fs::write(
            dir.path().join(METADATA_FILE),
            r#"{"nm_per_pixel": 65.0, "seconds_per_frame": null}"#,
        )
        .unwrap();
        let video = read_video(&dir_str(&dir)).unwrap();
        assert_eq!(video.metadata().nm_per_pixel, Some(65.0));
        assert_eq!(video.metadata().seconds_per_frame, None);
    }

    #[test]
    fn mismatched_frames_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        GrayImage::new(2, 2).save(dir.path().join("a.png")).unwrap();
        GrayImage::new(3, 2).save(dir.path().join("b.png")).unwrap();
        assert!(matches!(
            read_video(&dir_str(&dir)),
            Err(PipelineError::InvalidTensor(_))
        ));
    }

    #[test]
    fn empty_or_missing_directories_are_io_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(read_video(&dir_str(&dir)), Err(PipelineError::Io { .. })));
        let missing = dir.path().join("missing");
        assert!(matches!(
            read_video(missing.to_str().unwrap()),
            Err(PipelineError::Io { .. })
        ));
    }
}
