pub mod aggregate;
pub mod error;
pub mod extract;
pub mod load;
pub mod pipeline;
pub mod structs;
pub mod transform;

// Re-export public API
pub use aggregate::aggregate;
pub use error::{PipelineError, Result};
pub use extract::read_dataset;
pub use load::{write_combined, write_csv, write_json, write_metrics, write_parquet};
pub use pipeline::{DatasetReport, RunSummary, combine, prepare_dataset, prepare_metrics};
pub use structs::{
    DatasetKind, DatasetSelector, MetricRecord, Observation, OutputFormat, PipelineConfig,
    RawRecord, Season, SimpleLogger, YearMonth,
};
pub use transform::transform;
