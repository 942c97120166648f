use crate::config::SplitConfig;
use crate::error::{DatasetError, Result};
use crate::models::{HoldoutMode, ObservationTable, SplitStrategy, StationTable};
use crate::utils::constants::{QUICK_TEST_FRACTION_TEST, QUICK_TEST_FRACTION_VAL};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::HashSet;
use tracing::{debug, info};

use SplitStrategy::{Random, Space, Time, TimeAndSpace};

/// (test, val) strategy pairs the splitter supports
const IMPLEMENTED: [(SplitStrategy, SplitStrategy); 6] = [
    (Space, Space),
    (Random, Random),
    (Time, Random),
    (Space, Random),
    (TimeAndSpace, TimeAndSpace),
    (TimeAndSpace, Random),
];

/// Pairs that are known but not supported
const NOT_IMPLEMENTED: [(SplitStrategy, SplitStrategy); 8] = [
    (Time, Time),
    (Space, Time),
    (Time, Space),
    (Random, Space),
    (Random, Time),
    (Random, TimeAndSpace),
    (Time, TimeAndSpace),
    (Space, TimeAndSpace),
];

/// Everything the split stages need, resolved once per preparation call
#[derive(Debug, Clone, PartialEq)]
pub struct SplitContext {
    pub strategy_test: SplitStrategy,
    pub strategy_val: SplitStrategy,
    pub cutoff_test: NaiveDate,
    pub cutoff_val: NaiveDate,
    pub seed_test: u64,
    pub seed_val: u64,
    pub fraction_test: f64,
    pub fraction_val: f64,
    pub stations_train: Vec<String>,
    pub stations_test: Vec<String>,
    pub stations_val: Vec<String>,
    pub countries_to_reject: Vec<String>,
    pub quick_test: bool,
}

impl SplitContext {
    /// Context with the configured station lists. `"random"` lists start empty and
    /// are filled by the station selector.
    pub fn from_config(config: &SplitConfig) -> Self {
        let names = |selection: &crate::config::StationSelection| {
            selection.names().map(|n| n.to_vec()).unwrap_or_default()
        };

        Self {
            strategy_test: config.split_strategy_test,
            strategy_val: config.split_strategy_val,
            cutoff_test: config.date_split_train_test,
            cutoff_val: config.date_split_train_val,
            seed_test: config.random_split_state_test,
            seed_val: config.random_split_state_val,
            fraction_test: config.random_split_test_size_test,
            fraction_val: config.random_split_test_size_val,
            stations_train: Vec::new(),
            stations_test: names(&config.stations_test),
            stations_val: names(&config.stations_val),
            countries_to_reject: config.country_to_reject_during_training.clone(),
            quick_test: config.quick_test,
        }
    }

    pub fn strategy(&self, mode: HoldoutMode) -> SplitStrategy {
        match mode {
            HoldoutMode::Test => self.strategy_test,
            HoldoutMode::Val => self.strategy_val,
        }
    }

    /// First instant of the holdout period
    pub fn cutoff(&self, mode: HoldoutMode) -> NaiveDateTime {
        let date = match mode {
            HoldoutMode::Test => self.cutoff_test,
            HoldoutMode::Val => self.cutoff_val,
        };
        date.and_time(NaiveTime::MIN)
    }

    pub fn seed(&self, mode: HoldoutMode) -> u64 {
        match mode {
            HoldoutMode::Test => self.seed_test,
            HoldoutMode::Val => self.seed_val,
        }
    }

    /// Holdout fraction of the random strategy, fixed under quick test
    pub fn fraction(&self, mode: HoldoutMode) -> f64 {
        match (self.quick_test, mode) {
            (true, HoldoutMode::Test) => QUICK_TEST_FRACTION_TEST,
            (true, HoldoutMode::Val) => QUICK_TEST_FRACTION_VAL,
            (false, HoldoutMode::Test) => self.fraction_test,
            (false, HoldoutMode::Val) => self.fraction_val,
        }
    }

    pub fn holdout_stations(&self, mode: HoldoutMode) -> &[String] {
        match mode {
            HoldoutMode::Test => &self.stations_test,
            HoldoutMode::Val => &self.stations_val,
        }
    }
}

/// Fail unless the configured (test, val) pair is supported
pub fn check_strategy_combination(test: SplitStrategy, val: SplitStrategy) -> Result<()> {
    if IMPLEMENTED.contains(&(test, val)) {
        info!("Split strategy is implemented: test={}, val={}", test, val);
        Ok(())
    } else if NOT_IMPLEMENTED.contains(&(test, val)) {
        Err(DatasetError::UnsupportedStrategyCombination {
            test: test.to_string(),
            val: val.to_string(),
        })
    } else {
        Err(DatasetError::UnreferencedStrategyCombination {
            test: test.to_string(),
            val: val.to_string(),
        })
    }
}

pub struct Splitter<'a> {
    context: &'a SplitContext,
}

impl<'a> Splitter<'a> {
    pub fn new(context: &'a SplitContext) -> Self {
        Self { context }
    }

    /// Train rows before the mode's cutoff, holdout rows on or after it
    pub fn split_by_time(
        &self,
        table: &ObservationTable,
        mode: HoldoutMode,
    ) -> (ObservationTable, ObservationTable) {
        let cutoff = self.context.cutoff(mode);
        table.partition(|r| r.timestamp < cutoff)
    }

    /// Holdout rows from the mode's stations, train rows from the train stations
    pub fn split_by_space(
        &self,
        table: &ObservationTable,
        mode: HoldoutMode,
    ) -> Result<(ObservationTable, ObservationTable)> {
        let holdout = self.context.holdout_stations(mode);
        if holdout.is_empty() {
            return Err(DatasetError::MissingStationList {
                list: format!("stations_{}", mode),
            });
        }

        let train: HashSet<&str> = self.context.stations_train.iter().map(|s| s.as_str()).collect();
        let holdout: HashSet<&str> = holdout.iter().map(|s| s.as_str()).collect();
        Ok((table.filter_stations(&train), table.filter_stations(&holdout)))
    }

    /// Space split, then each side restricted to its own side of the cutoff
    pub fn split_time_and_space(
        &self,
        table: &ObservationTable,
        mode: HoldoutMode,
    ) -> Result<(ObservationTable, ObservationTable)> {
        let (train, holdout) = self.split_by_space(table, mode)?;
        let (train, _) = self.split_by_time(&train, mode);
        let (_, holdout) = self.split_by_time(&holdout, mode);
        Ok((train, holdout))
    }

    /// Seeded uniform holdout of `ceil(fraction * n)` rows; both sides keep table order
    pub fn split_random(
        &self,
        table: &ObservationTable,
        mode: HoldoutMode,
    ) -> Result<(ObservationTable, ObservationTable)> {
        let fraction = self.context.fraction(mode);
        if self.context.quick_test {
            debug!("Quick test: random {} fraction set to {}", mode, fraction);
        }

        let n = table.len();
        let n_holdout = ((fraction * n as f64).ceil() as usize).min(n);

        let mut rng = ChaCha8Rng::seed_from_u64(self.context.seed(mode));
        let mut positions: Vec<usize> = (0..n).collect();
        positions.shuffle(&mut rng);

        let mut holdout = positions[..n_holdout].to_vec();
        let mut train = positions[n_holdout..].to_vec();
        holdout.sort_unstable();
        train.sort_unstable();

        Ok((table.take_positions(&train)?, table.take_positions(&holdout)?))
    }

    /// Returns (kept, removed): removed rows belong to stations of a rejected country
    pub fn split_by_country(
        &self,
        table: &ObservationTable,
        stations: &StationTable,
    ) -> (ObservationTable, ObservationTable) {
        let rejected = stations.names_in_countries(&self.context.countries_to_reject);
        let rejected: HashSet<&str> = rejected.iter().map(|s| s.as_str()).collect();
        let (removed, kept) = table.partition(|r| rejected.contains(r.name.as_str()));
        (kept, removed)
    }

    /// Dispatch on `strategy`, or on the mode's configured strategy when `None`
    pub fn split(
        &self,
        table: &ObservationTable,
        mode: HoldoutMode,
        strategy: Option<SplitStrategy>,
        stations: Option<&StationTable>,
    ) -> Result<(ObservationTable, ObservationTable)> {
        match strategy.unwrap_or_else(|| self.context.strategy(mode)) {
            SplitStrategy::Time => Ok(self.split_by_time(table, mode)),
            SplitStrategy::Space => self.split_by_space(table, mode),
            SplitStrategy::TimeAndSpace => self.split_time_and_space(table, mode),
            SplitStrategy::Random => self.split_random(table, mode),
            SplitStrategy::Country => {
                let stations = stations.ok_or_else(|| {
                    DatasetError::MissingData(
                        "The country strategy needs the station table".to_string(),
                    )
                })?;
                Ok(self.split_by_country(table, stations))
            }
        }
    }

    /// Test split first, then validation.
    ///
    /// When both modes use `time_and_space` the validation split reads the full table,
    /// otherwise the train remainder of the test split. No validation stations means an
    /// empty validation table.
    pub fn split_train_test_val(
        &self,
        table: &ObservationTable,
        strategy: Option<SplitStrategy>,
    ) -> Result<(ObservationTable, ObservationTable, ObservationTable)> {
        check_strategy_combination(self.context.strategy_test, self.context.strategy_val)?;

        let (train, test) = self.split(table, HoldoutMode::Test, strategy, None)?;

        let both_time_and_space = self.context.strategy_test == TimeAndSpace
            && self.context.strategy_val == TimeAndSpace;
        let source = if both_time_and_space { table } else { &train };

        if self.context.stations_val.is_empty() {
            return Ok((train, test, ObservationTable::empty(table.columns().to_vec())));
        }

        let (train, val) = self.split(source, HoldoutMode::Val, strategy, None)?;
        Ok((train, test, val))
    }
}
