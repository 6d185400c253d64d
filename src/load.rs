use crate::error::{PipelineError, Result};
use crate::structs::{Cell, CellType, CombinedRow, DatasetKind, MetricRecord, OutputFormat};
use arrow_array::{ArrayRef, Float64Array, RecordBatch, StringArray, UInt32Array};
use arrow_schema::{DataType, Field, Schema};
use csv::Writer;
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;
use std::io::ErrorKind;
use std::{fs, fs::File, path::Path, sync::Arc};

/// Shared leading columns of every processed metrics table.
pub const METRIC_COLUMNS: [&str; 11] = [
    "month",
    "region",
    "value",
    "growth_rate",
    "seasonal_bucket",
    "yoy_growth_rate",
    "count",
    "mean",
    "median",
    "min",
    "max",
];

/// Writes `results` to `output_path` in `format`, replacing any existing file.
///
/// The parent directory must already exist.
///
/// # Errors
/// Returns `PipelineError::Write` if the file cannot be created or written.
pub fn write_metrics(
    kind: DatasetKind,
    results: &[MetricRecord],
    output_path: &Path,
    format: OutputFormat,
) -> Result<()> {
    let written = match format {
        OutputFormat::Csv => write_csv(kind, results, output_path),
        OutputFormat::Json => write_json(results, output_path),
        OutputFormat::Parquet => write_parquet(kind, results, output_path),
    };
    written.map_err(|e| e.into_write(output_path))
}

fn fmt_number(value: f64) -> String {
    format!("{:.2}", value)
}

fn fmt_optional(value: Option<f64>) -> String {
    value.map(fmt_number).unwrap_or_default()
}

fn fmt_cell(cell: &Cell) -> String {
    match cell {
        Cell::Number(value) => fmt_optional(*value),
        Cell::Count(count) => count.to_string(),
        Cell::Label(label) => label.to_string(),
    }
}

/// Writes monthly metrics to a CSV file with formatted numeric values.
///
/// # Arguments
/// * `kind` - Dataset the records belong to; selects the trailing summary columns
/// * `results` - Slice of MetricRecord structs in region/month order
/// * `output_path` - Path where the CSV file will be created
///
/// # Errors
/// Returns error if file cannot be created or written to.
pub fn write_csv(kind: DatasetKind, results: &[MetricRecord], output_path: &Path) -> Result<()> {
    let file = File::create(output_path)?;
    let mut writer = Writer::from_writer(file);

    let header: Vec<&str> = METRIC_COLUMNS
        .iter()
        .copied()
        .chain(kind.summary_columns().iter().map(|(name, _)| *name))
        .collect();
    writer.write_record(&header)?;

    for record in results {
        let mut row = vec![
            record.month.to_string(),
            record.region.clone(),
            fmt_number(record.value),
            fmt_optional(record.growth_rate),
            record.seasonal_bucket.as_str().to_string(),
            fmt_optional(record.yoy_growth_rate),
            record.count.to_string(),
            fmt_number(record.mean),
            fmt_number(record.median),
            fmt_number(record.min),
            fmt_number(record.max),
        ];
        row.extend(record.summary.cells().iter().map(fmt_cell));
        writer.write_record(&row)?;
    }

    writer.flush()?;
    Ok(())
}

/// Writes monthly metrics to a pretty-formatted JSON file.
///
/// # Errors
/// Returns error if file cannot be created or serialization fails.
pub fn write_json(results: &[MetricRecord], output_path: &Path) -> Result<()> {
    let file = File::create(output_path)?;
    serde_json::to_writer_pretty(file, results)?;
    Ok(())
}

/// Writes monthly metrics to a columnar Parquet file using Arrow format.
///
/// Nullable growth columns and dataset summary columns keep their nulls.
///
/// # Errors
/// Returns error if file cannot be created, schema is invalid, or Arrow operations fail.
pub fn write_parquet(
    kind: DatasetKind,
    results: &[MetricRecord],
    output_path: &Path,
) -> Result<()> {
    let mut fields = vec![
        Field::new("month", DataType::Utf8, false),
        Field::new("region", DataType::Utf8, false),
        Field::new("value", DataType::Float64, false),
        Field::new("growth_rate", DataType::Float64, true),
        Field::new("seasonal_bucket", DataType::Utf8, false),
        Field::new("yoy_growth_rate", DataType::Float64, true),
        Field::new("count", DataType::UInt32, false),
        Field::new("mean", DataType::Float64, false),
        Field::new("median", DataType::Float64, false),
        Field::new("min", DataType::Float64, false),
        Field::new("max", DataType::Float64, false),
    ];

    let months: StringArray =
        StringArray::from_iter_values(results.iter().map(|r| r.month.to_string()));
    let regions: StringArray =
        StringArray::from_iter_values(results.iter().map(|r| r.region.as_str()));
    let values: Float64Array = results.iter().map(|r| r.value).collect();
    let growth: Float64Array = results.iter().map(|r| r.growth_rate).collect();
    let seasons: StringArray =
        StringArray::from_iter_values(results.iter().map(|r| r.seasonal_bucket.as_str()));
    let yoy: Float64Array = results.iter().map(|r| r.yoy_growth_rate).collect();
    let counts: UInt32Array = results.iter().map(|r| r.count).collect();
    let means: Float64Array = results.iter().map(|r| r.mean).collect();
    let medians: Float64Array = results.iter().map(|r| r.median).collect();
    let mins: Float64Array = results.iter().map(|r| r.min).collect();
    let maxs: Float64Array = results.iter().map(|r| r.max).collect();

    let mut columns: Vec<ArrayRef> = vec![
        Arc::new(months),
        Arc::new(regions),
        Arc::new(values),
        Arc::new(growth),
        Arc::new(seasons),
        Arc::new(yoy),
        Arc::new(counts),
        Arc::new(means),
        Arc::new(medians),
        Arc::new(mins),
        Arc::new(maxs),
    ];

    let cells: Vec<Vec<Cell>> = results.iter().map(|r| r.summary.cells()).collect();
    for (idx, &(name, cell_type)) in kind.summary_columns().iter().enumerate() {
        let column = cells.iter().map(|row| row.get(idx));
        let (data_type, array): (DataType, ArrayRef) = match cell_type {
            CellType::Number => (
                DataType::Float64,
                Arc::new(
                    column
                        .map(|cell| match cell {
                            Some(Cell::Number(value)) => *value,
                            _ => None,
                        })
                        .collect::<Float64Array>(),
                ) as ArrayRef,
            ),
            CellType::Count => (
                DataType::UInt32,
                Arc::new(
                    column
                        .map(|cell| match cell {
                            Some(Cell::Count(count)) => Some(*count),
                            _ => None,
                        })
                        .collect::<UInt32Array>(),
                ) as ArrayRef,
            ),
            CellType::Label => (
                DataType::Utf8,
                Arc::new(
                    column
                        .map(|cell| match cell {
                            Some(Cell::Label(label)) => Some(*label),
                            _ => None,
                        })
                        .collect::<StringArray>(),
                ) as ArrayRef,
            ),
        };
        fields.push(Field::new(name, data_type, true));
        columns.push(array);
    }

    let schema = Arc::new(Schema::new(fields));
    let batch = RecordBatch::try_new(schema.clone(), columns)?;

    let file = File::create(output_path)?;
    let props = WriterProperties::builder().build();
    let mut writer = ArrowWriter::try_new(file, schema, Some(props))?;
    writer.write(&batch)?;
    writer.close()?;

    Ok(())
}

/// Deletes a processed file from an earlier run. Returns whether one existed.
///
/// # Errors
/// Returns `PipelineError::Write` if an existing file cannot be removed.
pub fn remove_stale(output_path: &Path) -> Result<bool> {
    match fs::remove_file(output_path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => Err(PipelineError::from(err).into_write(output_path)),
    }
}

/// Writes the cross-dataset view joined on (month, region).
///
/// # Errors
/// Returns `PipelineError::Write` if the file cannot be created or written.
pub fn write_combined(rows: &[CombinedRow], output_path: &Path) -> Result<()> {
    write_combined_csv(rows, output_path).map_err(|e| e.into_write(output_path))
}

fn write_combined_csv(rows: &[CombinedRow], output_path: &Path) -> Result<()> {
    let file = File::create(output_path)?;
    let mut writer = Writer::from_writer(file);

    let value_columns: Vec<String> = DatasetKind::ALL
        .iter()
        .map(|kind| format!("{}_value", kind))
        .collect();
    let mut header = vec!["month".to_string(), "region".to_string()];
    header.extend(value_columns);
    writer.write_record(&header)?;

    for row in rows {
        let mut cells = vec![row.month.to_string(), row.region.clone()];
        cells.extend(row.values.iter().map(|v| fmt_optional(*v)));
        writer.write_record(&cells)?;
    }

    writer.flush()?;
    Ok(())
}
