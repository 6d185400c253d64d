use crate::error::{PipelineError, Result};
use crate::structs::{DatasetKind, Detail, Observation, RawRecord, Season};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use log::{debug, warn};

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// Normalizes raw rows of one dataset into validated [`Observation`]s.
///
/// Rows with an unparseable date, a blank region, or a missing, non-finite or
/// negative measurement are dropped with a warning. Percentages are clamped
/// to `[0, 100]`.
///
/// # Errors
///
/// Returns `PipelineError::Validation` if no row survives filtering.
pub fn transform(kind: DatasetKind, raw: Vec<RawRecord>) -> Result<Vec<Observation>> {
    let total = raw.len();
    let mut dropped = 0usize;

    let observations: Vec<Observation> = raw
        .into_iter()
        .filter_map(|record| match normalize(kind, &record) {
            Ok(obs) => Some(obs),
            Err(reason) => {
                warn!("{}: dropping line {}: {}", kind, record.line, reason);
                dropped += 1;
                None
            }
        })
        .collect();

    debug!(
        "{}: kept {} of {} rows ({} dropped)",
        kind,
        observations.len(),
        total,
        dropped
    );

    if observations.is_empty() {
        return Err(PipelineError::Validation {
            dataset: kind,
            reason: format!("no valid rows remain out of {}", total),
        });
    }
    Ok(observations)
}

fn normalize(kind: DatasetKind, record: &RawRecord) -> std::result::Result<Observation, String> {
    let date = parse_date(&record.date).ok_or_else(|| format!("unparseable date '{}'", record.date))?;
    let region = record.region.trim();
    if region.is_empty() {
        return Err("blank region".to_string());
    }

    let (value, detail) = match kind {
        DatasetKind::Ev => (required(record, "value")?, Detail::Ev),
        DatasetKind::Traffic => (
            required(record, "value")?,
            Detail::Traffic {
                road_category: record.field("road_category").map(str::to_string),
            },
        ),
        DatasetKind::Transit => transit(record)?,
        DatasetKind::Geographic => (
            required(record, "urban_development_index")?,
            Detail::Geographic {
                kommune: record.field("kommune_name").map(str::to_string),
                green_area_pct: optional(record, "green_area_pct")?.map(clamp_percent),
                population_density: optional(record, "population_density")?,
            },
        ),
    };

    Ok(Observation {
        date,
        region: region.to_string(),
        value,
        season: Season::from_month(date.month()),
        detail,
    })
}

/// On-time share of scheduled trips, falling back to the reported punctuality rate.
fn transit(record: &RawRecord) -> std::result::Result<(f64, Detail), String> {
    let scheduled = required(record, "scheduled_trips")?;
    let on_time = required(record, "on_time_trips")?;
    let value = if scheduled > 0.0 {
        on_time / scheduled * 100.0
    } else {
        optional(record, "punctuality_rate")?
            .ok_or_else(|| "no scheduled trips and no punctuality_rate".to_string())?
    };

    Ok((
        clamp_percent(value),
        Detail::Transit {
            scheduled_trips: scheduled,
            delayed_trips: optional(record, "delayed_trips")?,
            avg_delay_minutes: optional(record, "avg_delay_minutes")?,
        },
    ))
}

/// Parses the date formats seen in the raw exports; `YYYY-MM` means the first of the month.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, DATE_FORMAT) {
        return Some(date);
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt.date());
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }
    NaiveDate::parse_from_str(&format!("{}-01", raw), DATE_FORMAT).ok()
}

fn parse_measure(name: &str, raw: &str) -> std::result::Result<f64, String> {
    let value: f64 = raw
        .parse()
        .map_err(|_| format!("{} '{}' is not a number", name, raw))?;
    if !value.is_finite() {
        return Err(format!("{} '{}' is not finite", name, raw));
    }
    if value < 0.0 {
        return Err(format!("{} {} is negative", name, value));
    }
    Ok(value)
}

fn required(record: &RawRecord, name: &str) -> std::result::Result<f64, String> {
    let raw = record
        .field(name)
        .ok_or_else(|| format!("missing {}", name))?;
    parse_measure(name, raw)
}

fn optional(record: &RawRecord, name: &str) -> std::result::Result<Option<f64>, String> {
    record.field(name).map(|raw| parse_measure(name, raw)).transpose()
}

fn clamp_percent(value: f64) -> f64 {
    value.clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn raw(line: u64, date: &str, region: &str, fields: &[(&str, &str)]) -> RawRecord {
        RawRecord {
            line,
            date: date.to_string(),
            region: region.to_string(),
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
        }
    }

    #[test]
    fn parses_supported_date_formats() {
        let jan = NaiveDate::from_ymd_opt(2023, 1, 15).unwrap();
        assert_eq!(parse_date("2023-01-15"), Some(jan));
        assert_eq!(parse_date("2023-01-15 08:30:00"), Some(jan));
        assert_eq!(parse_date("2023-01-15T08:30:00"), Some(jan));
        assert_eq!(parse_date("2023-01-15T08:30:00+01:00"), Some(jan));
        assert_eq!(parse_date("2023-02"), NaiveDate::from_ymd_opt(2023, 2, 1));
        assert_eq!(parse_date("15/01/2023"), None);
        assert_eq!(parse_date(""), None);
    }

    #[test]
    fn drops_bad_rows_and_keeps_good_ones() {
        let rows = vec![
            raw(2, "2023-01-01", "Oslo", &[("value", "10")]),
            raw(3, "not-a-date", "Oslo", &[("value", "10")]),
            raw(4, "2023-01-02", "Oslo", &[("value", "-3")]),
            raw(5, "2023-01-03", "Oslo", &[("value", "abc")]),
            raw(6, "2023-01-04", " ", &[("value", "1")]),
            raw(7, "2023-06-04", "Bergen", &[("value", "7.5")]),
        ];

        let obs = transform(DatasetKind::Ev, rows).unwrap();
        assert_eq!(obs.len(), 2);
        assert_eq!(obs[0].season, Season::Winter);
        assert_eq!(obs[1].region, "Bergen");
        assert_eq!(obs[1].season, Season::Summer);
        assert_eq!(obs[1].value, 7.5);
    }

    #[test]
    fn all_rows_invalid_is_validation_error() {
        let rows = vec![
            raw(2, "yesterday", "Oslo", &[("value", "10")]),
            raw(3, "2023-13-45", "Oslo", &[("value", "10")]),
        ];
        let err = transform(DatasetKind::Traffic, rows).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Validation {
                dataset: DatasetKind::Traffic,
                ..
            }
        ));
    }

    #[test]
    fn transit_computes_and_clamps_on_time_percentage() {
        let rows = vec![
            raw(2, "2023-03-01", "Ruter", &[("scheduled_trips", "200"), ("on_time_trips", "150")]),
            raw(3, "2023-03-02", "Ruter", &[("scheduled_trips", "10"), ("on_time_trips", "12")]),
            raw(
                4,
                "2023-03-03",
                "Skyss",
                &[
                    ("scheduled_trips", "0"),
                    ("on_time_trips", "0"),
                    ("punctuality_rate", "88.5"),
                    ("delayed_trips", "4"),
                ],
            ),
            raw(5, "2023-03-04", "Skyss", &[("scheduled_trips", "0"), ("on_time_trips", "0")]),
        ];

        let obs = transform(DatasetKind::Transit, rows).unwrap();
        assert_eq!(obs.len(), 3);
        assert_eq!(obs[0].value, 75.0);
        assert_eq!(obs[1].value, 100.0);
        assert_eq!(obs[2].value, 88.5);
        assert_eq!(
            obs[2].detail,
            Detail::Transit {
                scheduled_trips: 0.0,
                delayed_trips: Some(4.0),
                avg_delay_minutes: None,
            }
        );
    }

    #[test]
    fn geographic_clamps_green_area() {
        let rows = vec![raw(
            2,
            "2023-09-01",
            "Vestland",
            &[
                ("urban_development_index", "61.2"),
                ("kommune_name", "Bergen"),
                ("green_area_pct", "140"),
            ],
        )];

        let obs = transform(DatasetKind::Geographic, rows).unwrap();
        assert_eq!(obs[0].season, Season::Autumn);
        assert_eq!(
            obs[0].detail,
            Detail::Geographic {
                kommune: Some("Bergen".to_string()),
                green_area_pct: Some(100.0),
                population_density: None,
            }
        );
    }

    #[test]
    fn negative_optional_measure_drops_row() {
        let rows = vec![
            raw(2, "2023-01-01", "Oslo", &[("urban_development_index", "50"), ("population_density", "-1")]),
            raw(3, "2023-01-01", "Oslo", &[("urban_development_index", "55")]),
        ];
        let obs = transform(DatasetKind::Geographic, rows).unwrap();
        assert_eq!(obs.len(), 1);
        assert_eq!(obs[0].value, 55.0);
    }
}
