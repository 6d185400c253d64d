use crate::structs::{
    AggregationRule, DatasetKind, Detail, Intensity, MetricRecord, Observation, Summary, YearMonth,
};
use log::debug;
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};

/// Aggregates observations into one [`MetricRecord`] per (month, region).
///
/// Group values are summed or averaged according to [`DatasetKind::rule`].
/// Duplicate rows for the same date and region are all counted. Records come
/// back ordered by region, then ascending month, with growth rates filled in
/// against the preceding record of the same region. When a region skips a
/// month, `growth_rate` compares with the last month it does have, so only the
/// first record of a region (or one following a zero value) has no growth rate.
pub fn aggregate(kind: DatasetKind, observations: Vec<Observation>) -> Vec<MetricRecord> {
    let mut groups: HashMap<(String, YearMonth), Vec<Observation>> = HashMap::new();
    for obs in observations {
        let key = (obs.region.clone(), YearMonth::of(obs.date));
        groups.entry(key).or_default().push(obs);
    }
    debug!("{}: {} month-region groups", kind, groups.len());

    let rule = kind.rule();
    let entries: Vec<_> = groups.into_iter().collect();
    let mut records: Vec<MetricRecord> = entries
        .into_par_iter()
        .map(|((region, month), group)| summarize(kind, rule, region, month, &group))
        .collect();

    records.sort_by(|a, b| {
        a.region
            .cmp(&b.region)
            .then_with(|| a.month.cmp(&b.month))
    });
    apply_growth(&mut records);
    records
}

/// Percentage change from `previous` to `current`; `None` when `previous` is zero.
pub fn growth_rate(previous: f64, current: f64) -> Option<f64> {
    if previous == 0.0 {
        None
    } else {
        Some((current - previous) / previous * 100.0)
    }
}

fn summarize(
    kind: DatasetKind,
    rule: AggregationRule,
    region: String,
    month: YearMonth,
    group: &[Observation],
) -> MetricRecord {
    let values: Vec<f64> = group.iter().map(|o| o.value).collect();
    let sum: f64 = values.iter().sum();
    let mean = sum / values.len() as f64;
    let min = values.iter().fold(f64::INFINITY, |a, &b| a.min(b));
    let max = values.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));

    let value = match rule {
        AggregationRule::Sum => sum,
        AggregationRule::Mean => mean,
    };

    MetricRecord {
        month,
        region,
        value,
        growth_rate: None,
        seasonal_bucket: month.season(),
        yoy_growth_rate: None,
        count: values.len() as u32,
        mean,
        median: calculate_median(&values),
        min,
        max,
        summary: summarize_detail(kind, mean, group),
    }
}

fn summarize_detail(kind: DatasetKind, mean: f64, group: &[Observation]) -> Summary {
    match kind {
        DatasetKind::Ev => Summary::Ev,
        DatasetKind::Traffic => {
            let categories: HashSet<&str> = group
                .iter()
                .filter_map(|o| match &o.detail {
                    Detail::Traffic {
                        road_category: Some(category),
                    } => Some(category.as_str()),
                    _ => None,
                })
                .collect();
            Summary::Traffic {
                traffic_intensity: Intensity::from_mean(mean),
                road_categories: categories.len() as u32,
            }
        }
        DatasetKind::Transit => {
            let mut scheduled = 0.0;
            let mut delayed = 0.0;
            let mut delays = Vec::new();
            for obs in group {
                if let Detail::Transit {
                    scheduled_trips,
                    delayed_trips,
                    avg_delay_minutes,
                } = &obs.detail
                {
                    scheduled += scheduled_trips;
                    delayed += delayed_trips.unwrap_or(0.0);
                    delays.extend(*avg_delay_minutes);
                }
            }
            Summary::Transit {
                scheduled_trips_total: scheduled,
                delayed_trips_total: delayed,
                avg_delay_mean: mean_of(&delays),
                punctuality_change: None,
            }
        }
        DatasetKind::Geographic => {
            let mut kommuner = HashSet::new();
            let mut green = Vec::new();
            let mut density = Vec::new();
            for obs in group {
                if let Detail::Geographic {
                    kommune,
                    green_area_pct,
                    population_density,
                } = &obs.detail
                {
                    if let Some(name) = kommune {
                        kommuner.insert(name.as_str());
                    }
                    green.extend(*green_area_pct);
                    density.extend(*population_density);
                }
            }
            Summary::Geographic {
                kommune_count: kommuner.len() as u32,
                green_area_pct_mean: mean_of(&green),
                population_density_mean: mean_of(&density),
            }
        }
    }
}

/// Fills month-over-month and year-over-year changes. Expects region/month order.
fn apply_growth(records: &mut [MetricRecord]) {
    let by_key: HashMap<(String, YearMonth), f64> = records
        .iter()
        .map(|r| ((r.region.clone(), r.month), r.value))
        .collect();

    for i in 0..records.len() {
        let previous = match i.checked_sub(1).map(|p| &records[p]) {
            Some(prev) if prev.region == records[i].region => Some(prev.value),
            _ => None,
        };

        let record = &mut records[i];
        let current = record.value;
        record.growth_rate = previous.and_then(|prev| growth_rate(prev, current));
        record.yoy_growth_rate = by_key
            .get(&(record.region.clone(), record.month.previous_year()))
            .and_then(|&prev| growth_rate(prev, current));
        if let Summary::Transit {
            punctuality_change, ..
        } = &mut record.summary
        {
            *punctuality_change = previous.map(|prev| current - prev);
        }
    }
}

fn mean_of(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Calculates the median of a non-empty group; 0.0 for an empty one.
fn calculate_median(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }

    let mut sorted_data = data.to_vec();
    sorted_data.sort_by(|a, b| a.total_cmp(b));

    let len = sorted_data.len();
    if len.is_multiple_of(2) {
        (sorted_data[len / 2 - 1] + sorted_data[len / 2]) / 2.0
    } else {
        sorted_data[len / 2]
    }
}
