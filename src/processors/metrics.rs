use crate::error::Result;
use crate::models::ObservationTable;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Aggregate error between a forecast and the observations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Rmse,
    Mae,
    Mbe,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Rmse => "rmse",
            Metric::Mae => "mae",
            Metric::Mbe => "mbe",
        }
    }

    /// Metric over `(forecast, observed)` pairs, NaN when there are none
    pub fn compute(&self, pairs: &[(f64, f64)]) -> f64 {
        if pairs.is_empty() {
            return f64::NAN;
        }
        let n = pairs.len() as f64;
        match self {
            Metric::Rmse => {
                (pairs.iter().map(|(f, o)| (f - o).powi(2)).sum::<f64>() / n).sqrt()
            }
            Metric::Mae => pairs.iter().map(|(f, o)| (f - o).abs()).sum::<f64>() / n,
            Metric::Mbe => pairs.iter().map(|(f, o)| f - o).sum::<f64>() / n,
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-station metric between `forecast` and `observed` columns.
///
/// Only rows where both values are present count. A station with no such row maps to NaN.
pub fn station_metrics(
    table: &ObservationTable,
    forecast: &str,
    observed: &str,
    metric: Metric,
) -> Result<HashMap<String, f64>> {
    let forecast_idx = table.column_index(forecast)?;
    let observed_idx = table.column_index(observed)?;

    let mut pairs: HashMap<&str, Vec<(f64, f64)>> = HashMap::new();
    for row in table.rows() {
        let entry = pairs.entry(row.name.as_str()).or_default();
        let (f, o) = (row.values[forecast_idx], row.values[observed_idx]);
        if !f.is_nan() && !o.is_nan() {
            entry.push((f, o));
        }
    }

    Ok(pairs
        .into_par_iter()
        .map(|(name, values)| (name.to_string(), metric.compute(&values)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Observation;
    use chrono::NaiveDate;

    fn table(rows: &[(&str, f64, f64)]) -> ObservationTable {
        let ts = NaiveDate::from_ymd_opt(2020, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        ObservationTable::new(
            vec!["Wind".to_string(), "vw10m(m/s)".to_string()],
            rows.iter()
                .map(|(n, f, o)| Observation::new(n.to_string(), ts, vec![*f, *o]))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_metric_formulas() {
        let pairs = [(3.0, 1.0), (1.0, 2.0)];
        assert!((Metric::Rmse.compute(&pairs) - (2.5f64).sqrt()).abs() < 1e-12);
        assert_eq!(Metric::Mae.compute(&pairs), 1.5);
        assert_eq!(Metric::Mbe.compute(&pairs), 0.5);
        assert!(Metric::Rmse.compute(&[]).is_nan());
    }

    #[test]
    fn test_station_metrics_skip_missing_pairs() {
        let table = table(&[
            ("A", 3.0, 1.0),
            ("A", f64::NAN, 5.0),
            ("A", 1.0, 1.0),
            ("B", 2.0, f64::NAN),
        ]);

        let metrics = station_metrics(&table, "Wind", "vw10m(m/s)", Metric::Rmse).unwrap();
        assert!((metrics["A"] - 2.0f64.sqrt()).abs() < 1e-12);
        assert!(metrics["B"].is_nan());
    }

    #[test]
    fn test_unknown_metric_column() {
        let table = table(&[("A", 1.0, 1.0)]);
        assert!(station_metrics(&table, "Wind", "Tair", Metric::Mae).is_err());
    }
}
