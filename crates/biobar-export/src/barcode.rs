//! Barcode rasterisation.
//!
//! Each result row becomes a band [`ROW_HEIGHT`] pixels tall and each
//! metric a block `metric_width` pixels wide, so a barcode of `n` rows
//! renders to a `(17 * metric_width) x (5 * n)` RGB image.

use biobar_pipeline::Barcode;
use image::{ExtendedColorType, ImageEncoder, Rgb, RgbImage};

use crate::ExportError;

/// Pixel height of one result row.
pub const ROW_HEIGHT: u32 = 5;

/// Default pixel width of one metric column.
pub const DEFAULT_METRIC_WIDTH: u32 = 8;

/// Rasterise `barcode` with `metric_width`-pixel metric columns.
///
/// # Errors
///
/// Returns [`ExportError::Empty`] if the barcode has no rows or
/// `metric_width` is zero.
#[allow(clippy::cast_possible_truncation)]
pub fn render(barcode: &Barcode, metric_width: u32) -> Result<RgbImage, ExportError> {
    if barcode.rows.is_empty() || metric_width == 0 {
        return Err(ExportError::Empty);
    }
    let width = barcode.num_metrics() as u32 * metric_width;
    let height = barcode.rows.len() as u32 * ROW_HEIGHT;
    Ok(RgbImage::from_fn(width, height, |x, y| {
        let row = &barcode.rows[(y / ROW_HEIGHT) as usize];
        Rgb(row[(x / metric_width) as usize])
    }))
}

/// Encode an RGB image as PNG bytes.
///
/// # Errors
///
/// Returns [`ExportError::Image`] if encoding fails.
pub fn to_png(image: &RgbImage) -> Result<Vec<u8>, ExportError> {
    let mut png_bytes = Vec::new();
    let encoder = image::codecs::png::PngEncoder::new(&mut png_bytes);
    encoder.write_image(
        image.as_raw(),
        image.width(),
        image.height(),
        ExtendedColorType::Rgb8,
    )?;
    Ok(png_bytes)
}

/// File name of a barcode image: `"{stem}.png"` for a combined barcode,
/// `"{stem} (Channel {c}).png"` for a per-channel one.
#[must_use]
pub fn barcode_file_name(stem: &str, channel: Option<i64>) -> String {
    channel.map_or_else(
        || format!("{stem}.png"),
        |c| format!("{stem} (Channel {c}).png"),
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use biobar_pipeline::barcode::{BAD_COLOR, Limits};

    use super::*;

    fn barcode(rows: Vec<Vec<[u8; 3]>>) -> Barcode {
        let metrics = rows.first().map_or(0, Vec::len);
        Barcode {
            channel: Some(0),
            rows,
            limits: vec![Limits { min: 0.0, max: 1.0 }; metrics],
        }
    }

    #[test]
    fn rows_and_metrics_are_scaled() {
        let red = [255, 0, 0];
        let blue = [0, 0, 255];
        let image = render(&barcode(vec![vec![red, blue], vec![BAD_COLOR, red]]), 3).unwrap();
        assert_eq!(image.dimensions(), (6, 10));
        assert_eq!(image.get_pixel(0, 0).0, red);
        assert_eq!(image.get_pixel(2, 4).0, red);
        assert_eq!(image.get_pixel(3, 4).0, blue);
        assert_eq!(image.get_pixel(0, 5).0, BAD_COLOR);
        assert_eq!(image.get_pixel(5, 9).0, red);
    }

    #[test]
    fn empty_barcode_is_rejected() {
        assert!(matches!(render(&barcode(Vec::new()), 8), Err(ExportError::Empty)));
        assert!(matches!(
            render(&barcode(vec![vec![[1, 2, 3]]]), 0),
            Err(ExportError::Empty)
        ));
    }

    #[test]
    fn png_decodes_to_same_pixels() {
        let image = render(&barcode(vec![vec![[10, 20, 30], [40, 50, 60]]]), DEFAULT_METRIC_WIDTH).unwrap();
        let bytes = to_png(&image).unwrap();
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
        let decoded = image::load_from_memory(&bytes).unwrap().to_rgb8();
        assert_eq!(decoded, image);
    }

    #[test]
    fn file_names() {
        assert_eq!(barcode_file_name("run summary barcode", None), "run summary barcode.png");
        assert_eq!(
            barcode_file_name("run summary barcode", Some(2)),
            "run summary barcode (Channel 2).png"
        );
    }
}
