//! Output files of an analysis run.
//!
//! Everything lands in one output directory, named after the run:
//!
//! ```text
//! <name> summary.csv
//! <name> settings.json
//! <name> diagnostics.json
//! <name> failures.txt             (only when something failed)
//! <name> summary barcode*.png     (when barcodes are enabled)
//! <video> BARCODE Output/Channel <c>/*.csv   (when intermediates are saved)
//! ```

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use biobar_export::barcode::DEFAULT_METRIC_WIDTH;
use biobar_export::intermediates::{BINARIZATION_FILE, FLOW_FILE, INTENSITY_FILE};
use biobar_export::{CsvRecorder, barcode_file_name, render, to_png};
use biobar_pipeline::config::ModuleSelection;
use biobar_pipeline::{Barcode, ChannelResults, Grouping, PipelineError, Recorder, RecorderFactory};
use tracing::{info, warn};

/// Paths of the per-run output files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    /// Summary table.
    pub summary: PathBuf,
    /// Effective configuration.
    pub settings: PathBuf,
    /// Timing and outcome report.
    pub diagnostics: PathBuf,
    /// Recovered failures.
    pub failures: PathBuf,
    /// Barcode file stem, without extension or channel suffix.
    pub barcode_stem: PathBuf,
}

impl OutputPaths {
    /// Output files of run `name` inside `dir`.
    #[must_use]
    pub fn new(dir: &Path, name: &str) -> Self {
        Self {
            summary: dir.join(format!("{name} summary.csv")),
            settings: dir.join(format!("{name} settings.json")),
            diagnostics: dir.join(format!("{name} diagnostics.json")),
            failures: dir.join(format!("{name} failures.txt")),
            barcode_stem: dir.join(format!("{name} summary barcode")),
        }
    }
}

/// Render `results` into barcode PNGs next to `stem`.
///
/// Returns the written paths; an empty result set writes nothing.
///
/// # Errors
///
/// Returns a message naming the file that could not be rendered or
/// written.
pub fn write_barcodes(
    results: &[ChannelResults],
    grouping: Grouping,
    stem: &Path,
) -> Result<Vec<PathBuf>, String> {
    let dir = stem.parent().unwrap_or_else(|| Path::new("."));
    let stem = stem
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut written = Vec::new();
    for barcode in Barcode::from_results(results, grouping) {
        let path = dir.join(barcode_file_name(&stem, barcode.channel));
        let png = render(&barcode, DEFAULT_METRIC_WIDTH)
            .and_then(|image| to_png(&image))
            .map_err(|e| format!("Error rendering {}: {e}", path.display()))?;
        fs::write(&path, png).map_err(|e| format!("Error writing {}: {e}", path.display()))?;
        info!(path = %path.display(), "barcode written");
        written.push(path);
    }
    Ok(written)
}

/// Directory holding the intermediate CSVs of one channel of `video`.
#[must_use]
pub fn intermediates_dir(root: &Path, video: &str, channel: usize) -> PathBuf {
    let name = Path::new(video)
        .file_name()
        .map_or_else(|| video.to_string(), |s| s.to_string_lossy().into_owned());
    root.join(format!("{name} BARCODE Output"))
        .join(format!("Channel {channel}"))
}

/// Creates a [`CsvRecorder`] per channel, writing only the streams of
/// enabled engines.
#[derive(Debug, Clone)]
pub struct IntermediateFiles {
    root: PathBuf,
    modules: ModuleSelection,
}

impl IntermediateFiles {
    /// Write intermediates below `root`.
    #[must_use]
    pub const fn new(root: PathBuf, modules: ModuleSelection) -> Self {
        Self { root, modules }
    }
}

impl RecorderFactory for IntermediateFiles {
    fn recorder(&mut self, file: &str, channel: usize) -> Result<Box<dyn Recorder>, PipelineError> {
        let dir = intermediates_dir(&self.root, file, channel);
        fs::create_dir_all(&dir).map_err(|e| PipelineError::Io {
            path: dir.display().to_string(),
            message: e.to_string(),
        })?;
        let open = |enabled: bool, name: &str| -> Result<Option<BufWriter<File>>, PipelineError> {
            if !enabled {
                return Ok(None);
            }
            let path = dir.join(name);
            File::create(&path)
                .map(|f| Some(BufWriter::new(f)))
                .map_err(|e| PipelineError::Io {
                    path: path.display().to_string(),
                    message: e.to_string(),
                })
        };
        let recorder = CsvRecorder::new(
            dir.display().to_string(),
            open(self.modules.binarization, BINARIZATION_FILE)?,
            open(self.modules.optical_flow, FLOW_FILE)?,
            open(self.modules.intensity_distribution, INTENSITY_FILE)?,
        );
        Ok(Box::new(recorder))
    }
}

/// Write an optional output file, logging instead of failing.
pub fn write_or_warn(path: &Path, contents: &str) {
    match fs::write(path, contents) {
        Ok(()) => info!(path = %path.display(), "written"),
        Err(e) => warn!(path = %path.display(), error = %e, "could not write output file"),
    }
}
