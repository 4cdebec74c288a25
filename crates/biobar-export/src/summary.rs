//! Summary CSV: one header row, then one row per `(file, channel)`.
//!
//! Column order is [`ChannelResults::headers`]. Metrics that were not
//! computed (`NaN`) are written as empty cells and read back as `NaN`.
//! Numbers use Rust's shortest round-trip formatting, so writing and
//! reading a table reproduces every value bit for bit.

use std::io::{Read, Write};

use biobar_pipeline::results::{ChannelResults, Metric, Value, sort_by_metric};
use tracing::warn;

use crate::ExportError;

/// Write `results` as a summary table.
///
/// # Errors
///
/// Returns [`ExportError::Csv`] if writing fails.
pub fn write_results<W: Write>(writer: W, results: &[ChannelResults]) -> Result<(), ExportError> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(ChannelResults::headers(false))?;
    for row in results {
        wtr.write_record(row.data().iter().map(cell))?;
    }
    wtr.flush().map_err(csv::Error::from)?;
    Ok(())
}

fn cell(value: &Value) -> String {
    match value {
        Value::Text(text) => text.clone(),
        Value::Integer(n) => n.to_string(),
        Value::Number(n) if n.is_nan() => String::new(),
        Value::Number(n) => n.to_string(),
    }
}

/// Parse a summary table written by [`write_results`].
///
/// # Errors
///
/// - [`ExportError::HeaderMismatch`] if the header row differs from the
///   summary layout.
/// - [`ExportError::InvalidRow`] for a row with the wrong number of
///   fields or an unparsable cell.
/// - [`ExportError::Csv`] if the input is not valid CSV.
pub fn read_results<R: Read>(reader: R) -> Result<Vec<ChannelResults>, ExportError> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(reader);
    let expected = ChannelResults::headers(false);
    let found = rdr.headers()?;
    if found.iter().ne(expected.iter().copied()) {
        return Err(ExportError::HeaderMismatch {
            expected: expected.len(),
            first: expected[0],
            found: found.iter().map(ToString::to_string).collect(),
        });
    }

    let mut results = Vec::new();
    for (index, record) in rdr.records().enumerate() {
        let record = record?;
        let row = parse_row(&record, expected.len()).map_err(|message| ExportError::InvalidRow {
            row: index + 1,
            message,
        })?;
        results.push(row);
    }
    Ok(results)
}

fn parse_row(record: &csv::StringRecord, width: usize) -> Result<ChannelResults, String> {
    if record.len() != width {
        return Err(format!("expected {width} fields, found {}", record.len()));
    }
    let channel = record[1]
        .trim()
        .parse::<i64>()
        .map_err(|e| format!("channel {:?}: {e}", &record[1]))?;
    let flag = record[2]
        .trim()
        .parse::<u8>()
        .map_err(|e| format!("flags {:?}: {e}", &record[2]))?;

    let mut row = ChannelResults::new(&record[0], channel);
    row.dim_channel_flag = flag;
    for (metric, text) in Metric::ALL.into_iter().zip(record.iter().skip(3)) {
        let value = parse_number(text).map_err(|e| format!("{metric} {text:?}: {e}"))?;
        row.set_metric(metric, value);
    }
    Ok(row)
}

fn parse_number(text: &str) -> Result<f64, std::num::ParseFloatError> {
    let text = text.trim();
    if text.is_empty() {
        Ok(f64::NAN)
    } else {
        text.parse()
    }
}

/// Rows merged from several summary tables.
#[derive(Debug, Default)]
pub struct Aggregate {
    /// Every parsed row, in source order unless sorted.
    pub results: Vec<ChannelResults>,
    /// Sources that could not be parsed, with the reason.
    pub skipped: Vec<(String, ExportError)>,
}

/// Merge summary tables, skipping any that fail to parse.
///
/// Each source is a `(label, reader)` pair; the label only identifies the
/// source in warnings and in [`Aggregate::skipped`]. When `sort` names a
/// column the merged rows are sorted by it; an unknown column is
/// reported and ignored.
pub fn aggregate<I, R>(sources: I, sort: Option<&str>) -> Aggregate
where
    I: IntoIterator<Item = (String, R)>,
    R: Read,
{
    let mut out = Aggregate::default();
    for (label, reader) in sources {
        match read_results(reader) {
            Ok(rows) => out.results.extend(rows),
            Err(e) => {
                warn!(source = %label, error = %e, "skipping unreadable summary");
                out.skipped.push((label, e));
            }
        }
    }
    if let Some(header) = sort
        && !sort_by_metric(&mut out.results, header)
    {
        warn!(header, "unknown sort column, keeping input order");
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sample(path: &str, channel: i64, speed: f64) -> ChannelResults {
        let mut row = ChannelResults::new(path, channel);
        row.binarization.spanning = 0.5;
        row.flow.mean_speed = speed;
        row
    }

    fn to_string(results: &[ChannelResults]) -> String {
        let mut buf = Vec::new();
        write_results(&mut buf, results).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn header_and_empty_cells() {
        let text = to_string(&[sample("a/b", 1, 2.5)]);
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            ChannelResults::headers(false).join(",")
        );
        let row = lines.next().unwrap();
        assert!(row.starts_with("a/b,1,0,0.5,,"), "{row}");
        assert_eq!(row.split(',').count(), 20);
        assert!(lines.next().is_none());
    }

    #[test]
    fn paths_with_commas_are_quoted() {
        let text = to_string(&[sample("dir, with comma", 0, 1.0)]);
        assert!(text.contains("\"dir, with comma\""));
        let back = read_results(text.as_bytes()).unwrap();
        assert_eq!(back[0].filepath, "dir, with comma");
    }

    #[test]
    fn reads_back_written_rows() {
        let mut dim = sample("b", -1, f64::INFINITY);
        dim.dim_channel_flag = 1;
        dim.intensity.kurtosis_diff = -1.0e-17;
        let rows = vec![sample("a", 0, 0.1 + 0.2), dim];
        let back = read_results(to_string(&rows).as_bytes()).unwrap();
        assert_eq!(back.len(), 2);
        for (a, b) in rows.iter().zip(&back) {
            assert_eq!(a.filepath, b.filepath);
            assert_eq!(a.channel, b.channel);
            assert_eq!(a.dim_channel_flag, b.dim_channel_flag);
            for (x, y) in a.metric_values().into_iter().zip(b.metric_values()) {
                assert!(x.to_bits() == y.to_bits() || (x.is_nan() && y.is_nan()));
            }
        }
    }

    #[test]
    fn rejects_foreign_header() {
        let err = read_results("Name,Value\nx,1\n".as_bytes()).unwrap_err();
        assert!(matches!(err, ExportError::HeaderMismatch { found, .. } if found == ["Name", "Value"]));
    }

    #[test]
    fn rejects_bad_rows() {
        let header = ChannelResults::headers(false).join(",");
        let short = format!("{header}\na,0,0\n");
        assert!(matches!(
            read_results(short.as_bytes()),
            Err(ExportError::InvalidRow { row: 1, .. })
        ));

        let mut text = to_string(&[sample("a", 0, 1.0), sample("b", 0, 1.0)]);
        text = text.replace("b,0,0,0.5", "b,zero,0,0.5");
        let err = read_results(text.as_bytes()).unwrap_err();
        assert!(matches!(err, ExportError::InvalidRow { row: 2, ref message } if message.contains("channel")));
    }

    #[test]
    fn aggregate_skips_and_sorts() {
        let first = to_string(&[sample("a", 0, 3.0), sample("a", 1, f64::NAN)]);
        let second = to_string(&[sample("b", 0, 1.0)]);
        let sources = vec![
            ("first.csv".to_string(), first.as_bytes()),
            ("junk.csv".to_string(), "not,a,summary\n".as_bytes()),
            ("second.csv".to_string(), second.as_bytes()),
        ];
        let merged = aggregate(sources, Some("Mean Speed"));
        assert_eq!(merged.skipped.len(), 1);
        assert_eq!(merged.skipped[0].0, "junk.csv");
        let order: Vec<(&str, i64)> = merged
            .results
            .iter()
            .map(|r| (r.filepath.as_str(), r.channel))
            .collect();
        assert_eq!(order, vec![("b", 0), ("a", 0), ("a", 1)]);
    }

    #[test]
    fn aggregate_ignores_unknown_sort_column() {
        let text = to_string(&[sample("z", 0, 1.0), sample("a", 0, 2.0)]);
        let merged = aggregate([("s".to_string(), text.as_bytes())], Some("Nope"));
        assert_eq!(merged.results[0].filepath, "z");
    }
}
