use crate::aggregate::aggregate;
use crate::error::Result;
use crate::extract::read_dataset;
use crate::load::{remove_stale, write_combined, write_metrics};
use crate::structs::{
    CombinedRow, DatasetKind, DatasetSelector, MetricRecord, PipelineConfig, YearMonth,
};
use crate::transform::transform;
use log::{debug, error, info};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::time::Instant;

/// Outcome of one successfully processed dataset.
#[derive(Debug)]
pub struct DatasetReport {
    pub kind: DatasetKind,
    pub input: PathBuf,
    pub raw_rows: usize,
    pub kept_rows: usize,
    pub records: Vec<MetricRecord>,
    pub outputs: Vec<PathBuf>,
}

/// Per-dataset outcomes of one run.
#[derive(Debug)]
pub struct RunSummary {
    pub outcomes: Vec<(DatasetKind, Result<DatasetReport>)>,
    /// Set when the combined view was attempted
    pub combined: Option<Result<PathBuf>>,
}

impl RunSummary {
    pub fn failures(&self) -> usize {
        let datasets = self.outcomes.iter().filter(|(_, r)| r.is_err()).count();
        let combined = usize::from(matches!(self.combined, Some(Err(_))));
        datasets + combined
    }

    pub fn succeeded(&self) -> bool {
        self.failures() == 0
    }

    pub fn reports(&self) -> impl Iterator<Item = &DatasetReport> {
        self.outcomes.iter().filter_map(|(_, r)| r.as_ref().ok())
    }
}

/// Runs load, transform, aggregate and write for a single dataset.
///
/// # Errors
///
/// Returns `PipelineError::Load`, `Validation` or `Write` from the failing
/// stage. Processed files left by an earlier run of this dataset are removed,
/// so a failed dataset has no output.
pub fn prepare_dataset(kind: DatasetKind, config: &PipelineConfig) -> Result<DatasetReport> {
    let outcome = run_dataset(kind, config);
    if outcome.is_err() {
        for &format in &config.formats {
            let path = config.output_path(kind, format);
            match remove_stale(&path) {
                Ok(true) => info!("Removed stale {}", path.display()),
                Ok(false) => {}
                Err(err) => error!("{}", err),
            }
        }
    }
    outcome
}

fn run_dataset(kind: DatasetKind, config: &PipelineConfig) -> Result<DatasetReport> {
    let input = config.raw_path(kind);
    info!("Processing {} data from {}", kind, input.display());
    let start = Instant::now();

    let raw = read_dataset(&input, kind)?;
    let raw_rows = raw.len();
    let observations = transform(kind, raw)?;
    let kept_rows = observations.len();
    let records = aggregate(kind, observations);

    let mut outputs = Vec::with_capacity(config.formats.len());
    for &format in &config.formats {
        let path = config.output_path(kind, format);
        write_metrics(kind, &records, &path, format)?;
        debug!("  - {}", path.display());
        outputs.push(path);
    }

    info!(
        "{} data: wrote {} rows to {} file(s) in {:.2?}",
        kind,
        records.len(),
        outputs.len(),
        start.elapsed()
    );
    Ok(DatasetReport {
        kind,
        input,
        raw_rows,
        kept_rows,
        records,
        outputs,
    })
}

/// Prepares every dataset named by `selector`.
///
/// Datasets run one after another and a failure in one never stops the
/// others. When at least two datasets succeed and `config.combined` is set,
/// their tables are also joined into the combined view; otherwise an existing
/// combined view is removed, since it no longer matches the dataset files.
pub fn prepare_metrics(selector: DatasetSelector, config: &PipelineConfig) -> RunSummary {
    if let Err(err) = fs::create_dir_all(&config.processed_dir) {
        error!(
            "Cannot create processed directory {}: {}",
            config.processed_dir.display(),
            err
        );
    }

    let outcomes: Vec<(DatasetKind, Result<DatasetReport>)> = selector
        .kinds()
        .into_iter()
        .map(|kind| {
            let outcome = prepare_dataset(kind, config);
            if let Err(err) = &outcome {
                error!("{} data failed: {}", kind, err);
            }
            (kind, outcome)
        })
        .collect();

    let tables: Vec<(DatasetKind, &[MetricRecord])> = outcomes
        .iter()
        .filter_map(|(kind, r)| r.as_ref().ok().map(|rep| (*kind, rep.records.as_slice())))
        .collect();

    let combined = if config.combined && tables.len() >= 2 {
        let path = config.combined_path();
        let rows = combine(&tables);
        let written = write_combined(&rows, &path).map(|_| path);
        match &written {
            Ok(path) => info!("Combined view: wrote {} rows to {}", rows.len(), path.display()),
            Err(err) => error!("Combined view failed: {}", err),
        }
        Some(written)
    } else if config.combined {
        let path = config.combined_path();
        match remove_stale(&path) {
            Ok(removed) => {
                if removed {
                    info!("Removed stale combined view {}", path.display());
                }
                None
            }
            Err(err) => {
                error!("Combined view failed: {}", err);
                Some(Err(err))
            }
        }
    } else {
        None
    };

    RunSummary { outcomes, combined }
}

/// Outer-joins dataset tables on (month, region), ordered by region then month.
pub fn combine(tables: &[(DatasetKind, &[MetricRecord])]) -> Vec<CombinedRow> {
    let mut joined: BTreeMap<(String, YearMonth), [Option<f64>; 4]> = BTreeMap::new();
    for &(kind, records) in tables {
        for record in records {
            let values = joined
                .entry((record.region.clone(), record.month))
                .or_default();
            // column order follows DatasetKind::ALL
            values[kind as usize] = Some(record.value);
        }
    }

    joined
        .into_iter()
        .map(|((region, month), values)| CombinedRow {
            month,
            region,
            values,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::{Season, Summary};

    fn record(region: &str, year: i32, month: u32, value: f64) -> MetricRecord {
        MetricRecord {
            month: YearMonth::new(year, month),
            region: region.to_string(),
            value,
            growth_rate: None,
            seasonal_bucket: Season::from_month(month),
            yoy_growth_rate: None,
            count: 1,
            mean: value,
            median: value,
            min: value,
            max: value,
            summary: Summary::Ev,
        }
    }

    #[test]
    fn kind_discriminants_follow_all_order() {
        for (idx, kind) in DatasetKind::ALL.iter().enumerate() {
            assert_eq!(*kind as usize, idx);
        }
    }

    #[test]
    fn combine_outer_joins_on_month_and_region() {
        let ev = vec![record("Oslo", 2023, 1, 10.0), record("Oslo", 2023, 2, 12.0)];
        let transit = vec![record("Bergen", 2023, 1, 90.0), record("Oslo", 2023, 2, 85.0)];

        let rows = combine(&[
            (DatasetKind::Ev, ev.as_slice()),
            (DatasetKind::Transit, transit.as_slice()),
        ]);

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].region, "Bergen");
        assert_eq!(rows[0].values, [None, None, Some(90.0), None]);
        assert_eq!(rows[1].month, YearMonth::new(2023, 1));
        assert_eq!(rows[1].values, [Some(10.0), None, None, None]);
        assert_eq!(rows[2].values, [Some(12.0), None, Some(85.0), None]);
    }

    #[test]
    fn summary_counts_failures() {
        let summary = RunSummary {
            outcomes: vec![(
                DatasetKind::Ev,
                Err(crate::error::PipelineError::Validation {
                    dataset: DatasetKind::Ev,
                    reason: "empty".into(),
                }),
            )],
            combined: None,
        };
        assert_eq!(summary.failures(), 1);
        assert!(!summary.succeeded());
        assert_eq!(summary.reports().count(), 0);
    }
}
