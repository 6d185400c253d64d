use chrono::{Datelike, NaiveDate};
use log::{Level, Log, Metadata, Record as LogRecord};
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;

/// Simple logger implementation
pub struct SimpleLogger;

impl Log for SimpleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &LogRecord) {
        if !self.enabled(record.metadata()) {
            return;
        }
        match record.level() {
            Level::Error | Level::Warn => eprintln!("[{}] {}", record.level(), record.args()),
            _ => println!("[{}] {}", record.level(), record.args()),
        }
    }

    fn flush(&self) {}
}

/// Supported input datasets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, clap::ValueEnum)]
pub enum DatasetKind {
    /// Electric vehicle registrations
    Ev,
    /// NVDB road traffic volumes
    Traffic,
    /// Entur public transport punctuality
    #[value(alias = "entur")]
    Transit,
    /// Geonorge regional development indices
    #[value(alias = "geonorge")]
    Geographic,
}

/// How measurements within one (month, region) group are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationRule {
    Sum,
    Mean,
}

/// Column names a dataset's raw CSV is expected to provide.
#[derive(Debug, Clone, Copy)]
pub struct Layout {
    pub region_columns: &'static [&'static str],
    pub region_required: bool,
    /// Primary measurement column, resolved to the first numeric column when absent.
    pub value_column: Option<&'static str>,
    pub required: &'static [&'static str],
    pub optional: &'static [&'static str],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellType {
    Number,
    Count,
    Label,
}

impl DatasetKind {
    pub const ALL: [DatasetKind; 4] = [
        DatasetKind::Ev,
        DatasetKind::Traffic,
        DatasetKind::Transit,
        DatasetKind::Geographic,
    ];

    pub fn name(self) -> &'static str {
        match self {
            DatasetKind::Ev => "ev",
            DatasetKind::Traffic => "traffic",
            DatasetKind::Transit => "transit",
            DatasetKind::Geographic => "geographic",
        }
    }

    pub fn layout(self) -> Layout {
        match self {
            DatasetKind::Ev => Layout {
                region_columns: &["region", "county"],
                region_required: false,
                value_column: Some("value"),
                required: &[],
                optional: &[],
            },
            DatasetKind::Traffic => Layout {
                region_columns: &["region", "county"],
                region_required: true,
                value_column: Some("value"),
                required: &[],
                optional: &["road_category"],
            },
            DatasetKind::Transit => Layout {
                region_columns: &["region", "operator"],
                region_required: true,
                value_column: None,
                required: &["scheduled_trips", "on_time_trips"],
                optional: &["delayed_trips", "avg_delay_minutes", "punctuality_rate"],
            },
            DatasetKind::Geographic => Layout {
                region_columns: &["county_name", "county", "region"],
                region_required: true,
                value_column: None,
                required: &["urban_development_index"],
                optional: &["kommune_name", "green_area_pct", "population_density"],
            },
        }
    }

    pub fn rule(self) -> AggregationRule {
        match self {
            DatasetKind::Ev | DatasetKind::Traffic => AggregationRule::Sum,
            DatasetKind::Transit | DatasetKind::Geographic => AggregationRule::Mean,
        }
    }

    pub fn raw_file_name(self) -> &'static str {
        match self {
            DatasetKind::Ev => "norwegian_ev_registrations.csv",
            DatasetKind::Traffic => "norwegian_traffic_nvdb.csv",
            DatasetKind::Transit => "norwegian_entur_punctuality.csv",
            DatasetKind::Geographic => "norwegian_geonorge_kpis.csv",
        }
    }

    pub fn processed_stem(self) -> &'static str {
        match self {
            DatasetKind::Ev => "ev_metrics",
            DatasetKind::Traffic => "traffic_metrics",
            DatasetKind::Transit => "entur_metrics",
            DatasetKind::Geographic => "geonorge_metrics",
        }
    }

    /// Dataset-specific columns written after the shared metric columns.
    pub fn summary_columns(self) -> &'static [(&'static str, CellType)] {
        match self {
            DatasetKind::Ev => &[],
            DatasetKind::Traffic => &[
                ("traffic_intensity", CellType::Label),
                ("road_categories", CellType::Count),
            ],
            DatasetKind::Transit => &[
                ("scheduled_trips_total", CellType::Number),
                ("delayed_trips_total", CellType::Number),
                ("avg_delay_mean", CellType::Number),
                ("punctuality_change", CellType::Number),
            ],
            DatasetKind::Geographic => &[
                ("kommune_count", CellType::Count),
                ("green_area_pct_mean", CellType::Number),
                ("population_density_mean", CellType::Number),
            ],
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Command-line dataset selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum DatasetSelector {
    Ev,
    Traffic,
    #[value(alias = "entur")]
    Transit,
    #[value(alias = "geonorge")]
    Geographic,
    /// EV and traffic
    Both,
    All,
}

impl DatasetSelector {
    pub fn kinds(self) -> Vec<DatasetKind> {
        match self {
            DatasetSelector::Ev => vec![DatasetKind::Ev],
            DatasetSelector::Traffic => vec![DatasetKind::Traffic],
            DatasetSelector::Transit => vec![DatasetKind::Transit],
            DatasetSelector::Geographic => vec![DatasetKind::Geographic],
            DatasetSelector::Both => vec![DatasetKind::Ev, DatasetKind::Traffic],
            DatasetSelector::All => DatasetKind::ALL.to_vec(),
        }
    }
}

/// Processed output file format
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Csv,
    Json,
    Parquet,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Json => "json",
            OutputFormat::Parquet => "parquet",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Season {
    Winter,
    Spring,
    Summer,
    Autumn,
}

impl Season {
    pub fn from_month(month: u32) -> Season {
        match month {
            3..=5 => Season::Spring,
            6..=8 => Season::Summer,
            9..=11 => Season::Autumn,
            _ => Season::Winter,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Season::Winter => "Winter",
            Season::Spring => "Spring",
            Season::Summer => "Summer",
            Season::Autumn => "Autumn",
        }
    }
}

/// Calendar month, ordered chronologically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Self {
        Self { year, month }
    }

    pub fn of(date: NaiveDate) -> Self {
        Self::new(date.year(), date.month())
    }

    pub fn previous_year(self) -> Self {
        Self::new(self.year - 1, self.month)
    }

    pub fn first_day(self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
    }

    pub fn season(self) -> Season {
        Season::from_month(self.month)
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl Serialize for YearMonth {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One CSV row as read, before any coercion.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub line: u64,
    pub date: String,
    pub region: String,
    pub fields: HashMap<String, String>,
}

impl RawRecord {
    /// Returns the trimmed cell for `name`, or `None` when absent or blank.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

/// Per-row values only some datasets carry.
#[derive(Debug, Clone, PartialEq)]
pub enum Detail {
    Ev,
    Traffic {
        road_category: Option<String>,
    },
    Transit {
        scheduled_trips: f64,
        delayed_trips: Option<f64>,
        avg_delay_minutes: Option<f64>,
    },
    Geographic {
        kommune: Option<String>,
        green_area_pct: Option<f64>,
        population_density: Option<f64>,
    },
}

/// A validated, normalized row.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub date: NaiveDate,
    pub region: String,
    pub value: f64,
    pub season: Season,
    pub detail: Detail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Intensity {
    Low,
    Medium,
    High,
    #[serde(rename = "Very High")]
    VeryHigh,
}

impl Intensity {
    pub fn from_mean(mean: f64) -> Intensity {
        if mean < 30_000.0 {
            Intensity::Low
        } else if mean < 45_000.0 {
            Intensity::Medium
        } else if mean < 60_000.0 {
            Intensity::High
        } else {
            Intensity::VeryHigh
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Intensity::Low => "Low",
            Intensity::Medium => "Medium",
            Intensity::High => "High",
            Intensity::VeryHigh => "Very High",
        }
    }
}

/// Dataset-specific aggregate columns of one (month, region) group.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "dataset", rename_all = "snake_case")]
pub enum Summary {
    Ev,
    Traffic {
        traffic_intensity: Intensity,
        road_categories: u32,
    },
    Transit {
        scheduled_trips_total: f64,
        delayed_trips_total: f64,
        avg_delay_mean: Option<f64>,
        punctuality_change: Option<f64>,
    },
    Geographic {
        kommune_count: u32,
        green_area_pct_mean: Option<f64>,
        population_density_mean: Option<f64>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Number(Option<f64>),
    Count(u32),
    Label(&'static str),
}

impl Summary {
    /// Cells in the order of [`DatasetKind::summary_columns`].
    pub fn cells(&self) -> Vec<Cell> {
        match self {
            Summary::Ev => vec![],
            Summary::Traffic {
                traffic_intensity,
                road_categories,
            } => vec![
                Cell::Label(traffic_intensity.as_str()),
                Cell::Count(*road_categories),
            ],
            Summary::Transit {
                scheduled_trips_total,
                delayed_trips_total,
                avg_delay_mean,
                punctuality_change,
            } => vec![
                Cell::Number(Some(*scheduled_trips_total)),
                Cell::Number(Some(*delayed_trips_total)),
                Cell::Number(*avg_delay_mean),
                Cell::Number(*punctuality_change),
            ],
            Summary::Geographic {
                kommune_count,
                green_area_pct_mean,
                population_density_mean,
            } => vec![
                Cell::Count(*kommune_count),
                Cell::Number(*green_area_pct_mean),
                Cell::Number(*population_density_mean),
            ],
        }
    }
}

/// Monthly metrics for one region
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricRecord {
    pub month: YearMonth,
    pub region: String,
    pub value: f64,
    pub growth_rate: Option<f64>,
    pub seasonal_bucket: Season,
    pub yoy_growth_rate: Option<f64>,
    pub count: u32,
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    #[serde(flatten)]
    pub summary: Summary,
}

/// One (month, region) row of the cross-dataset view.
#[derive(Debug, Clone, PartialEq)]
pub struct CombinedRow {
    pub month: YearMonth,
    pub region: String,
    /// Values indexed like [`DatasetKind::ALL`]
    pub values: [Option<f64>; 4],
}

/// Paths and output options for one pipeline invocation.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub raw_dir: PathBuf,
    pub processed_dir: PathBuf,
    /// Per-dataset raw file overrides
    pub inputs: BTreeMap<DatasetKind, PathBuf>,
    pub formats: Vec<OutputFormat>,
    pub combined: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            raw_dir: PathBuf::from("data/raw"),
            processed_dir: PathBuf::from("data/processed"),
            inputs: BTreeMap::new(),
            formats: vec![OutputFormat::Csv],
            combined: true,
        }
    }
}

impl PipelineConfig {
    pub fn raw_path(&self, kind: DatasetKind) -> PathBuf {
        self.inputs
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| self.raw_dir.join(kind.raw_file_name()))
    }

    pub fn output_path(&self, kind: DatasetKind, format: OutputFormat) -> PathBuf {
        self.processed_dir
            .join(format!("{}.{}", kind.processed_stem(), format.extension()))
    }

    pub fn combined_path(&self) -> PathBuf {
        self.processed_dir.join("combined_metrics.csv")
    }
}
