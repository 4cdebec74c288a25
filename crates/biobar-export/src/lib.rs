//! biobar-export: Pure format serializers (sans-IO)
//!
//! Converts analysis results into output formats. Every serializer works
//! on `std::io::Read`/`Write` values or returns bytes; opening files is
//! left to the caller.
//!
//! - [`summary`]: the summary CSV table, its reader, and aggregation of
//!   several tables.
//! - [`barcode`]: barcode rasterisation to RGB and PNG.
//! - [`intermediates`]: a [`Recorder`](biobar_pipeline::Recorder) that
//!   writes per-frame intermediate CSVs.

pub mod barcode;
pub mod intermediates;
pub mod summary;

pub use barcode::{barcode_file_name, render, to_png};
pub use intermediates::CsvRecorder;
pub use summary::{Aggregate, aggregate, read_results, write_results};

/// Errors that can occur while serializing or parsing results.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// The underlying CSV reader or writer failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// The header row does not match the summary table layout.
    #[error("unexpected header row: expected {expected} columns starting with {first:?}, found {found:?}")]
    HeaderMismatch {
        /// Number of columns in the expected layout.
        expected: usize,
        /// First expected header.
        first: &'static str,
        /// Header row that was found.
        found: Vec<String>,
    },

    /// A data row could not be parsed.
    #[error("row {row}: {message}")]
    InvalidRow {
        /// 1-based data row number (header excluded).
        row: usize,
        /// What was wrong with it.
        message: String,
    },

    /// Image encoding failed.
    #[error("image encoding failed: {0}")]
    Image(#[from] image::ImageError),

    /// There was nothing to serialize.
    #[error("nothing to export")]
    Empty,
}
