use clap::{Parser, ValueEnum};
use lib::{DatasetKind, DatasetSelector, OutputFormat, PipelineConfig, SimpleLogger, prepare_metrics};
use log::{debug, error, info};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

static LOGGER: SimpleLogger = SimpleLogger;

/// Prepare monthly metrics from Norwegian transport datasets
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Which dataset to process
    #[arg(short, long, default_value = "all")]
    dataset: DatasetSelector,

    /// Directory holding the raw CSV exports
    #[arg(long, default_value = "data/raw")]
    raw_dir: PathBuf,

    /// Directory the processed tables are written to
    #[arg(long, default_value = "data/processed")]
    processed_dir: PathBuf,

    /// Raw file override for one dataset, e.g. ev=exports/ev.csv (repeatable)
    #[arg(short, long, value_parser = parse_input)]
    input: Vec<(DatasetKind, PathBuf)>,

    /// Output formats (e.g., csv,parquet)
    #[arg(short, long, value_delimiter = ',', default_value = "csv")]
    format: Vec<OutputFormat>,

    /// Skip the combined cross-dataset view
    #[arg(long, default_value_t = false)]
    no_combined: bool,

    /// Log level for output
    #[arg(long, default_value = "false")]
    debug: bool,
}

fn parse_input(raw: &str) -> Result<(DatasetKind, PathBuf), String> {
    let (kind, path) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KIND=PATH, got '{}'", raw))?;
    let kind = DatasetKind::from_str(kind.trim(), true)?;
    if path.trim().is_empty() {
        return Err(format!("empty path for {}", kind));
    }
    Ok((kind, PathBuf::from(path.trim())))
}

fn main() -> ExitCode {
    let total_start = Instant::now();
    let args = Args::parse();

    if log::set_logger(&LOGGER).is_ok() {
        if args.debug {
            log::set_max_level(log::LevelFilter::Debug);
        } else {
            log::set_max_level(log::LevelFilter::Info);
        }
    }

    let config = PipelineConfig {
        raw_dir: args.raw_dir,
        processed_dir: args.processed_dir,
        inputs: args.input.into_iter().collect(),
        formats: args.format,
        combined: !args.no_combined,
    };
    debug!("Selection: {:?} | Config: {:?}", args.dataset, config);

    let summary = prepare_metrics(args.dataset, &config);

    for report in summary.reports() {
        debug!(
            "{}: {} raw rows, {} kept, {} monthly records from {}",
            report.kind,
            report.raw_rows,
            report.kept_rows,
            report.records.len(),
            report.input.display()
        );
    }

    let failures = summary.failures();
    if failures > 0 {
        error!(
            "{} of {} step(s) failed in {:.2?}",
            failures,
            summary.outcomes.len() + usize::from(summary.combined.is_some()),
            total_start.elapsed()
        );
        return ExitCode::FAILURE;
    }

    info!("Pipeline completed successfully in {:.2?}", total_start.elapsed());
    ExitCode::SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn args_are_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn parses_dataset_aliases_and_overrides() {
        let args = Args::try_parse_from([
            "prepare-metrics",
            "--dataset",
            "entur",
            "--input",
            "geonorge=/data/kpis.csv",
            "--format",
            "csv,parquet",
        ])
        .unwrap();
        assert_eq!(args.dataset, DatasetSelector::Transit);
        assert_eq!(
            args.input,
            vec![(DatasetKind::Geographic, PathBuf::from("/data/kpis.csv"))]
        );
        assert_eq!(args.format, vec![OutputFormat::Csv, OutputFormat::Parquet]);
    }

    #[test]
    fn rejects_malformed_input_override() {
        assert!(parse_input("ev").is_err());
        assert!(parse_input("bikes=/x.csv").is_err());
        assert!(parse_input("ev=").is_err());
    }

    #[test]
    fn defaults_to_all_datasets() {
        let args = Args::try_parse_from(["prepare-metrics"]).unwrap();
        assert_eq!(args.dataset, DatasetSelector::All);
        assert_eq!(args.format, vec![OutputFormat::Csv]);
        assert!(!args.no_combined);
    }
}
