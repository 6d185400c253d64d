use crate::error::{PipelineError, Result};
use crate::structs::{DatasetKind, Layout, RawRecord};
use csv::{ReaderBuilder, StringRecord, Trim};
use log::{debug, warn};
use std::collections::HashMap;
use std::path::Path;

const DATE_COLUMNS: [&str; 3] = ["date", "timestamp", "datetime"];

/// Region label for datasets reported at national level.
pub const NATIONAL_REGION: &str = "Norway";

/// Column positions resolved from a header row.
#[derive(Debug, PartialEq)]
struct Columns {
    date: usize,
    region: Option<usize>,
    fields: Vec<(&'static str, usize)>,
}

/// Reads a raw dataset CSV into [`RawRecord`]s without coercing any values.
///
/// # Arguments
///
/// * `path` - Raw CSV file, header row required
/// * `kind` - Dataset whose column layout the file must satisfy
///
/// # Errors
///
/// Returns `PipelineError::Load` if the file is missing or unreadable, or the
/// header lacks a column the dataset requires. Rows that cannot be read are
/// skipped with a warning; short rows read their missing cells as blank.
pub fn read_dataset(path: &Path, kind: DatasetKind) -> Result<Vec<RawRecord>> {
    debug!("Reading {} dataset from {}", kind, path.display());
    read_records(path, kind).map_err(|e| e.into_load(path))
}

fn read_records(path: &Path, kind: DatasetKind) -> Result<Vec<RawRecord>> {
    let mut reader = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .from_path(path)?;
    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim().to_lowercase())
        .collect();
    let rows: Vec<StringRecord> = reader
        .records()
        .filter_map(|row| match row {
            Ok(row) => Some(row),
            Err(err) => {
                warn!("{}: skipping unreadable row: {}", kind, err);
                None
            }
        })
        .collect();

    let columns = resolve_columns(&headers, &rows, kind.layout())
        .map_err(|reason| PipelineError::Load {
            path: path.to_path_buf(),
            reason,
        })?;
    debug!("Resolved {} columns: {:?}", kind, columns);

    let records = rows
        .iter()
        .map(|row| {
            let cell = |idx: usize| row.get(idx).unwrap_or_default().to_string();
            RawRecord {
                // header is line 1
                line: row.position().map_or(0, |p| p.line()),
                date: cell(columns.date),
                region: columns
                    .region
                    .map(cell)
                    .unwrap_or_else(|| NATIONAL_REGION.to_string()),
                fields: columns
                    .fields
                    .iter()
                    .map(|&(name, idx)| (name.to_string(), cell(idx)))
                    .collect::<HashMap<_, _>>(),
            }
        })
        .collect::<Vec<_>>();

    debug!("Read {} raw rows", records.len());
    Ok(records)
}

fn position(headers: &[String], name: &str) -> Option<usize> {
    headers.iter().position(|h| h == name)
}

fn resolve_columns(
    headers: &[String],
    rows: &[StringRecord],
    layout: Layout,
) -> std::result::Result<Columns, String> {
    let date = DATE_COLUMNS
        .iter()
        .find_map(|name| position(headers, name))
        .ok_or_else(|| format!("no date column (expected one of {:?})", DATE_COLUMNS))?;

    let region = layout
        .region_columns
        .iter()
        .find_map(|name| position(headers, name));
    if region.is_none() && layout.region_required {
        return Err(format!(
            "no region column (expected one of {:?})",
            layout.region_columns
        ));
    }

    let mut fields = Vec::new();
    for &name in layout.required {
        let idx = position(headers, name).ok_or_else(|| format!("missing column '{}'", name))?;
        fields.push((name, idx));
    }
    for &name in layout.optional {
        if let Some(idx) = position(headers, name) {
            fields.push((name, idx));
        }
    }

    if let Some(value) = layout.value_column {
        let idx = match position(headers, value) {
            Some(idx) => idx,
            None => {
                let taken: Vec<usize> = std::iter::once(date)
                    .chain(region)
                    .chain(fields.iter().map(|&(_, idx)| idx))
                    .collect();
                first_numeric_column(headers.len(), &taken, rows).ok_or_else(|| {
                    format!("no '{}' column and no numeric column to use instead", value)
                })?
            }
        };
        fields.push((value, idx));
    }

    Ok(Columns {
        date,
        region,
        fields,
    })
}

/// Picks the first unclaimed column whose non-blank cells are all numeric.
fn first_numeric_column(width: usize, taken: &[usize], rows: &[StringRecord]) -> Option<usize> {
    (0..width)
        .filter(|idx| !taken.contains(idx))
        .find(|&idx| {
            let mut cells = rows
                .iter()
                .filter_map(|row| row.get(idx))
                .map(str::trim)
                .filter(|cell| !cell.is_empty())
                .peekable();
            cells.peek().is_some() && cells.all(|cell| cell.parse::<f64>().is_ok())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_file(dir: &tempfile::TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn reads_rows_with_region_and_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "traffic.csv",
            "date,region,road_category,value\n2023-01-01,Oslo,E,100\n2023-01-02,Bergen,R,50\n",
        );

        let records = read_dataset(&path, DatasetKind::Traffic).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].date, "2023-01-01");
        assert_eq!(records[0].region, "Oslo");
        assert_eq!(records[0].field("value"), Some("100"));
        assert_eq!(records[1].field("road_category"), Some("R"));
        assert_eq!(records[0].line, 2);
    }

    #[test]
    fn ev_without_region_uses_national_label() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "ev.csv", "date,value\n2023-01-01,5\n");

        let records = read_dataset(&path, DatasetKind::Ev).unwrap();
        assert_eq!(records[0].region, NATIONAL_REGION);
    }

    #[test]
    fn alternative_date_header_and_numeric_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "ev.csv",
            "Timestamp,Region,fuel_type,registrations\n2023-01-01,Oslo,BEV,42\n",
        );

        let records = read_dataset(&path, DatasetKind::Ev).unwrap();
        assert_eq!(records[0].date, "2023-01-01");
        assert_eq!(records[0].field("value"), Some("42"));
    }

    #[test]
    fn missing_file_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_dataset(&dir.path().join("absent.csv"), DatasetKind::Ev).unwrap_err();
        assert!(matches!(err, PipelineError::Load { .. }));
    }

    #[test]
    fn incompatible_layout_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let no_date = write_file(&dir, "a.csv", "day,region,value\n1,Oslo,3\n");
        let no_region = write_file(&dir, "b.csv", "date,value\n2023-01-01,3\n");
        let no_trips = write_file(&dir, "c.csv", "date,operator,on_time_trips\n2023-01-01,Ruter,3\n");

        for (path, kind) in [
            (no_date, DatasetKind::Traffic),
            (no_region, DatasetKind::Traffic),
            (no_trips, DatasetKind::Transit),
        ] {
            let err = read_dataset(&path, kind).unwrap_err();
            assert!(matches!(err, PipelineError::Load { .. }), "{err}");
        }
    }

    #[test]
    fn short_rows_are_kept_with_blank_cells() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "ev.csv",
            "date,region,value\n2023-01-01,Oslo,100\n2023-01-02,Oslo\n2023-02-01,Oslo,150,extra\n",
        );

        let records = read_dataset(&path, DatasetKind::Ev).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[1].field("value"), None);
        assert_eq!(records[2].field("value"), Some("150"));
    }

    #[test]
    fn value_fallback_inspects_whole_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "ev.csv",
            "date,region,code,registrations\n2023-01-01,Oslo,7,\n2023-01-02,Oslo,B7,12\n",
        );

        let records = read_dataset(&path, DatasetKind::Ev).unwrap();
        assert_eq!(records[0].field("value"), None);
        assert_eq!(records[1].field("value"), Some("12"));
    }

    #[test]
    fn value_fallback_requires_a_numeric_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "ev.csv", "date,region,note\n2023-01-01,Oslo,n/a\n");
        let err = read_dataset(&path, DatasetKind::Ev).unwrap_err();
        assert!(err.to_string().contains("numeric column"));
    }
}
