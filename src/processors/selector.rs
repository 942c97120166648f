use crate::config::SelectionConfig;
use crate::error::{DatasetError, Result};
use crate::models::{ObservationTable, Station, StationTable};
use crate::processors::metrics::station_metrics;
use crate::utils::constants::{LOWER_QUANTILE, UPPER_QUANTILE};
use crate::utils::stats::nan_quantile;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// No finite covariate value among the eligible stations
    UndefinedCovariate,
    /// No finite metric value in the covariate tercile
    UndefinedMetric,
    EmptyCell,
    /// Every draw hit an already selected or excluded station
    PatienceExhausted,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedCell {
    pub covariate: String,
    pub covariate_tercile: Option<usize>,
    pub metric_tercile: Option<usize>,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SelectionReport {
    pub skipped: Vec<SkippedCell>,
    pub rejected_draws: usize,
}

impl SelectionReport {
    fn skip(
        &mut self,
        covariate: &str,
        covariate_tercile: Option<usize>,
        metric_tercile: Option<usize>,
        reason: SkipReason,
    ) {
        warn!(
            "Skipping stratification cell: covariate={}, covariate_tercile={:?}, metric_tercile={:?}, reason={:?}",
            covariate, covariate_tercile, metric_tercile, reason
        );
        self.skipped.push(SkippedCell {
            covariate: covariate.to_string(),
            covariate_tercile,
            metric_tercile,
            reason,
        });
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectedStations {
    pub test: Vec<String>,
    pub val: Vec<String>,
    pub attempts: usize,
    pub test_report: SelectionReport,
    pub val_report: SelectionReport,
}

/// Picks representative test and validation stations by crossing covariate terciles
/// with terciles of a per-station forecast error.
pub struct StratifiedSelector<'a> {
    config: &'a SelectionConfig,
}

impl<'a> StratifiedSelector<'a> {
    pub fn new(config: &'a SelectionConfig) -> Self {
        Self { config }
    }

    /// Attribute key under which the per-station metric is stored
    pub fn metric_key(&self) -> &'static str {
        self.config.metric_split.as_str()
    }

    /// Attach the per-station metric computed from `observations`
    pub fn with_metric(&self, observations: &ObservationTable, stations: StationTable) -> Result<StationTable> {
        let metrics = station_metrics(
            observations,
            &self.config.forecast_column,
            &self.config.observed_column,
            self.config.metric_split,
        )?;
        Ok(stations.with_attribute(self.metric_key(), &metrics))
    }

    /// Select test then validation stations, retrying the whole draw until the anchor
    /// station lands in the test list or `max_attempts` is reached.
    ///
    /// Stations of `countries_to_reject` are never candidates.
    pub fn select(
        &self,
        observations: &ObservationTable,
        stations: &StationTable,
        countries_to_reject: &[String],
    ) -> Result<SelectedStations> {
        let rejected = stations.names_in_countries(countries_to_reject);
        let rejected_set: HashSet<&str> = rejected.iter().map(|s| s.as_str()).collect();
        let observations = observations.exclude_stations(&rejected_set);
        let stations = self.with_metric(&observations, stations.exclude(&rejected))?;

        let mut rng = match self.config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };

        let anchor = self.config.anchor_station.as_deref();
        let candidates: Vec<&Station> = stations.stations().iter().collect();

        for attempt in 1..=self.config.max_attempts {
            let mut test_report = SelectionReport::default();
            let test = self.select_stations(
                &candidates,
                &self.config.parameters_split_test,
                &HashSet::new(),
                anchor,
                &mut rng,
                &mut test_report,
            );

            let excluded: HashSet<String> = test.iter().cloned().collect();
            let mut val_report = SelectionReport::default();
            let val = self.select_stations(
                &candidates,
                &self.config.parameters_split_val,
                &excluded,
                None,
                &mut rng,
                &mut val_report,
            );

            let anchor_selected = anchor.map_or(true, |a| test.iter().any(|s| s == a));
            if anchor_selected {
                info!(
                    "Selected {} test and {} validation stations after {} attempt(s)",
                    test.len(),
                    val.len(),
                    attempt
                );
                return Ok(SelectedStations {
                    test,
                    val,
                    attempts: attempt,
                    test_report,
                    val_report,
                });
            }
            debug!("Anchor station missing from test selection, attempt {}", attempt);
        }

        Err(DatasetError::AnchorNotSelected {
            anchor: anchor.unwrap_or_default().to_string(),
            attempts: self.config.max_attempts,
        })
    }

    /// One stratified pass over `covariates`, in order
    pub fn select_stations(
        &self,
        stations: &[&Station],
        covariates: &[String],
        excluded: &HashSet<String>,
        anchor: Option<&str>,
        rng: &mut ChaCha8Rng,
        report: &mut SelectionReport,
    ) -> Vec<String> {
        let mut selected = Vec::new();

        if let Some(anchor) = anchor {
            if stations.iter().any(|s| s.name == anchor) && !excluded.contains(anchor) {
                selected.push(anchor.to_string());
            }
        }

        let metric_key = self.metric_key();
        for covariate in covariates {
            debug!("Stratifying on {}", covariate);
            let Some(covariate_terciles) = terciles(stations, |s| s.attribute(covariate)) else {
                report.skip(covariate, None, None, SkipReason::UndefinedCovariate);
                continue;
            };

            for (i, tercile) in covariate_terciles.iter().enumerate() {
                if tercile.is_empty() {
                    report.skip(covariate, Some(i), None, SkipReason::EmptyCell);
                    continue;
                }

                let Some(cells) = terciles(tercile, |s| s.attribute(metric_key)) else {
                    report.skip(covariate, Some(i), None, SkipReason::UndefinedMetric);
                    continue;
                };

                for (j, cell) in cells.iter().enumerate() {
                    if cell.is_empty() {
                        report.skip(covariate, Some(i), Some(j), SkipReason::EmptyCell);
                        continue;
                    }
                    if !self.try_random_choice(cell, &mut selected, excluded, rng, report) {
                        report.skip(covariate, Some(i), Some(j), SkipReason::PatienceExhausted);
                    }
                }
            }
        }

        selected
    }

    /// Draw one station of `cell`, up to `patience` draws
    fn try_random_choice(
        &self,
        cell: &[&Station],
        selected: &mut Vec<String>,
        excluded: &HashSet<String>,
        rng: &mut ChaCha8Rng,
        report: &mut SelectionReport,
    ) -> bool {
        for _ in 0..self.config.patience {
            let Some(station) = cell.choose(rng) else {
                return false;
            };
            if selected.contains(&station.name) || excluded.contains(&station.name) {
                debug!("Draw rejected: {}", station.name);
                report.rejected_draws += 1;
                continue;
            }
            selected.push(station.name.clone());
            return true;
        }
        false
    }
}

/// Split into `[v < q33, q33 <= v < q66, v >= q66]` with NaN-ignoring quantiles.
/// Stations with a NaN value fall in none. `None` when no value is finite.
fn terciles<'s, F>(stations: &[&'s Station], value: F) -> Option<[Vec<&'s Station>; 3]>
where
    F: Fn(&Station) -> f64,
{
    let values: Vec<f64> = stations.iter().map(|&s| value(s)).collect();
    let q33 = nan_quantile(&values, LOWER_QUANTILE)?;
    let q66 = nan_quantile(&values, UPPER_QUANTILE)?;

    let mut cells: [Vec<&Station>; 3] = Default::default();
    for (station, v) in stations.iter().zip(values) {
        if v < q33 {
            cells[0].push(station);
        } else if v >= q33 && v < q66 {
            cells[1].push(station);
        } else if v >= q66 {
            cells[2].push(station);
        }
    }
    Some(cells)
}
