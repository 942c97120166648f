use crate::config::DatasetConfig;
use crate::error::{DatasetError, Result};
use crate::models::{
    HoldoutMode, Mode, ModelOutput, ObservationTable, PixelOffset, PredictionTable, SampleIndex,
    SplitAssignment, SplitStrategy, Station, StationTable, TerrainKind, Tile,
};
use crate::pipeline::source::Projection;
use crate::processors::selector::{SelectedStations, StratifiedSelector};
use crate::processors::splitter::{SplitContext, Splitter};
use crate::readers::{MemoryTileSource, ObservationReader, StationReader, TileStore};
use crate::utils::constants::{
    ELEVATION_DELTA, HOUR_FEATURE, MODEL_ELEVATION, MONTH_FEATURE, STATION_ELEVATION,
};
use crate::utils::stats::{mean, sample_std};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

/// Per-feature mean and sample standard deviation of the training inputs
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Standardization {
    pub mean: Vec<f64>,
    pub std: Vec<f64>,
}

impl Standardization {
    pub fn from_split(split: &SplitData) -> Result<Self> {
        let mut means = Vec::with_capacity(split.inputs.len());
        let mut stds = Vec::with_capacity(split.inputs.len());

        for (projection, name) in split.inputs.iter().zip(&split.input_variables) {
            let values: Vec<f64> = split.table.rows().iter().map(|r| projection.value(r)).collect();
            let missing = || {
                DatasetError::MissingData(format!(
                    "Standardizing '{}' needs at least two training rows",
                    name
                ))
            };
            means.push(mean(&values).ok_or_else(missing)?);
            stds.push(sample_std(&values).ok_or_else(missing)?);
        }

        Ok(Self {
            mean: means,
            std: stds,
        })
    }
}

/// Rows of one mode with the projections that turn them into inputs and labels
#[derive(Debug, Clone)]
pub struct SplitData {
    mode: Mode,
    table: Arc<ObservationTable>,
    index: SampleIndex,
    input_variables: Vec<String>,
    inputs: Vec<Projection>,
    labels: Option<Vec<Projection>>,
}

impl SplitData {
    pub fn new(
        mode: Mode,
        table: ObservationTable,
        input_variables: &[String],
        labels: Option<&[String]>,
    ) -> Result<Self> {
        let inputs = Projection::resolve(&table, input_variables)?;
        let labels = labels
            .map(|names| Projection::resolve(&table, names))
            .transpose()?;
        let index = SampleIndex::from_table(&table);

        Ok(Self {
            mode,
            table: Arc::new(table),
            index,
            input_variables: input_variables.to_vec(),
            inputs,
            labels,
        })
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn table(&self) -> &ObservationTable {
        &self.table
    }

    pub fn table_ref(&self) -> Arc<ObservationTable> {
        Arc::clone(&self.table)
    }

    pub fn index(&self) -> &SampleIndex {
        &self.index
    }

    /// Station name per sample
    pub fn names(&self) -> Vec<String> {
        self.index.names()
    }

    pub fn unique_names(&self) -> Vec<String> {
        self.index.unique_names()
    }

    pub fn input_variables(&self) -> &[String] {
        &self.input_variables
    }

    pub fn input_projection(&self) -> &[Projection] {
        &self.inputs
    }

    pub fn label_projection(&self) -> Option<&[Projection]> {
        self.labels.as_deref()
    }

    pub fn inputs(&self) -> Vec<Vec<f64>> {
        self.table
            .rows()
            .iter()
            .map(|r| self.inputs.iter().map(|p| p.value(r)).collect())
            .collect()
    }

    pub fn labels(&self) -> Option<Vec<Vec<f64>>> {
        let labels = self.labels.as_ref()?;
        Some(
            self.table
                .rows()
                .iter()
                .map(|r| labels.iter().map(|p| p.value(r)).collect())
                .collect(),
        )
    }

    fn with_rows(&self, positions: &[usize]) -> Result<Self> {
        let table = self.table.take_positions(positions)?;
        Ok(Self {
            index: SampleIndex::from_table(&table),
            table: Arc::new(table),
            ..self.clone()
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModeSummary {
    pub mode: Mode,
    pub samples: usize,
    pub stations: usize,
}

/// Output of one preparation call, one bundle per mode
#[derive(Debug, Clone)]
pub struct PreparedSplits {
    train: SplitData,
    test: SplitData,
    val: Option<SplitData>,
    other_countries: Option<SplitData>,
    custom: Option<SplitData>,
    assignment: SplitAssignment,
    standardization: Option<Standardization>,
    context: SplitContext,
    selection: Option<SelectedStations>,
}

impl PreparedSplits {
    pub fn get(&self, mode: Mode) -> Result<&SplitData> {
        let split = match mode {
            Mode::Train => Some(&self.train),
            Mode::Test => Some(&self.test),
            Mode::Val => self.val.as_ref(),
            Mode::OtherCountries => self.other_countries.as_ref(),
            Mode::Custom => self.custom.as_ref(),
        };
        split.ok_or(DatasetError::ModeNotPrepared(mode))
    }

    pub fn modes(&self) -> Vec<Mode> {
        [Mode::Train, Mode::Test, Mode::Val, Mode::OtherCountries, Mode::Custom]
            .into_iter()
            .filter(|m| self.get(*m).is_ok())
            .collect()
    }

    pub fn assignment(&self) -> &SplitAssignment {
        &self.assignment
    }

    pub fn standardization(&self) -> Option<&Standardization> {
        self.standardization.as_ref()
    }

    pub fn context(&self) -> &SplitContext {
        &self.context
    }

    pub fn selection(&self) -> Option<&SelectedStations> {
        self.selection.as_ref()
    }

    pub fn summary(&self) -> Vec<ModeSummary> {
        self.modes()
            .into_iter()
            .filter_map(|mode| self.get(mode).ok())
            .map(|split| ModeSummary {
                mode: split.mode(),
                samples: split.len(),
                stations: split.unique_names().len(),
            })
            .collect()
    }

    /// Pair model outputs with the sample index of `mode`
    pub fn predictions(&self, mode: Mode, output: ModelOutput, column: &str) -> Result<PredictionTable> {
        let split = self.get(mode)?;
        PredictionTable::from_output(output, &split.names(), column)
    }

    fn set_custom(&mut self, custom: SplitData) {
        self.assignment.custom = custom.unique_names().into_iter().collect();
        self.custom = Some(custom);
    }
}

/// Runs the full preparation: cleaning, feature derivation, station selection, splitting
pub struct DataPreparer<'a> {
    config: &'a DatasetConfig,
}

impl<'a> DataPreparer<'a> {
    pub fn new(config: &'a DatasetConfig) -> Self {
        Self { config }
    }

    /// Read the observation and station tables from the configured paths
    pub fn load(&self) -> Result<(ObservationTable, StationTable)> {
        let observations = ObservationReader::new().read_observations(&self.config.data.time_series)?;
        let stations = StationReader::new().read_stations(&self.config.data.stations)?;
        info!(
            "Loaded {} observations and {} stations",
            observations.len(),
            stations.len()
        );
        Ok((observations, stations))
    }

    pub fn prepare_train_test_data(
        &self,
        observations: ObservationTable,
        stations: &StationTable,
    ) -> Result<PreparedSplits> {
        let split_config = &self.config.split;
        let features = &self.config.features;

        let mut universe: BTreeSet<String> = stations.names().into_iter().collect();
        universe.extend(observations.station_set());

        let mut table = observations;
        if self.config.pipeline.remove_null_speeds {
            table = self.remove_null_speeds(&table)?;
        }

        let (mut table, stations) = self.reject_stations(table, stations);

        if split_config.quick_test {
            let keep: HashSet<&str> = split_config
                .quick_test_stations
                .iter()
                .map(|s| s.as_str())
                .collect();
            table = table.filter_stations(&keep);
            debug!("Quick test: kept {} observations", table.len());
        }

        table = self.add_station_features(table, &stations);
        add_country(&mut table, &stations);
        table = self.add_calendar_features(table);

        if self.config.pipeline.random_idx {
            self.generate_random_offsets(&mut table);
        }

        let full = table;
        let mut table = full.select_columns(&self.needed_columns())?;

        let mut context = SplitContext::from_config(split_config);
        let selection = if split_config.stations_test.is_random() && split_config.stations_val.is_random() {
            let selector = StratifiedSelector::new(&self.config.selection);
            let selected = selector.select(&full, &stations, &split_config.country_to_reject_during_training)?;
            context.stations_test = selected.test.clone();
            context.stations_val = selected.val.clone();
            Some(selected)
        } else {
            None
        };
        drop(full);

        table = table.drop_nan();

        if self.config.pipeline.shuffle {
            let mut rng = seeded_rng(self.config.pipeline.shuffle_seed);
            table.rows_mut().shuffle(&mut rng);
        }

        let splitter = Splitter::new(&context);
        let other_countries = if context.countries_to_reject.is_empty() {
            None
        } else {
            let (kept, other) = splitter.split_by_country(&table, &stations);
            table = kept;
            Some(other)
        };

        context.stations_train = train_stations(&table, &context);
        let splitter = Splitter::new(&context);

        let strategy = split_config.quick_test.then_some(SplitStrategy::Random);
        let (train, test, val) = splitter.split_train_test_val(&table, strategy)?;

        let other_countries = other_countries
            .map(|other| splitter.split_by_time(&other, HoldoutMode::Test).1);

        let inputs = &features.input_variables;
        let labels = Some(features.labels.as_slice());
        let mut train = SplitData::new(Mode::Train, train, inputs, labels)?;
        let test = SplitData::new(Mode::Test, test, inputs, labels)?;
        let val = if context.stations_val.is_empty() {
            None
        } else {
            Some(SplitData::new(Mode::Val, val, inputs, labels)?)
        };
        let other_countries = other_countries
            .map(|other| SplitData::new(Mode::OtherCountries, other, inputs, labels))
            .transpose()?;

        let standardization = if self.config.pipeline.standardize {
            Some(Standardization::from_split(&train)?)
        } else {
            None
        };

        if self.config.pipeline.unbalanced_dataset {
            train = self.rebalance(&train)?;
        }

        let assignment = build_assignment(
            &universe,
            &train,
            &test,
            val.as_ref(),
            other_countries.as_ref(),
        );
        assignment.validate_partition(universe.iter().map(|s| s.as_str()))?;

        info!(
            "Prepared splits: train={}, test={}, val={}, other_countries={}",
            train.len(),
            test.len(),
            val.as_ref().map_or(0, |v| v.len()),
            other_countries.as_ref().map_or(0, |o| o.len())
        );

        Ok(PreparedSplits {
            train,
            test,
            val,
            other_countries,
            custom: None,
            assignment,
            standardization,
            context,
            selection,
        })
    }

    /// Attach a custom inference table to `splits`. Every row is served the tile of the
    /// custom location; the returned store holds that tile as its topography.
    pub fn prepare_custom_data(
        &self,
        splits: &mut PreparedSplits,
        table: ObservationTable,
        tile: Tile,
    ) -> Result<TileStore> {
        let name = Mode::Custom.as_str();
        let mut table = self.add_calendar_features(table);
        for row in table.rows_mut() {
            row.name = name.to_string();
            row.offset = None;
        }

        let custom = SplitData::new(Mode::Custom, table, &self.config.features.input_variables, None)?;
        splits.set_custom(custom);

        let tile = Tile {
            station: name.to_string(),
            ..tile
        };
        let source = MemoryTileSource::new().with_tile(TerrainKind::Topos, tile);
        Ok(TileStore::new(Arc::new(source)).with_crop_size(self.config.pipeline.crop_size))
    }

    /// Keep rows where both forecast and observed speed exceed the threshold
    fn remove_null_speeds(&self, table: &ObservationTable) -> Result<ObservationTable> {
        let threshold = self.config.pipeline.threshold_null_speed;
        let forecast = table.column_index(&self.config.selection.forecast_column)?;
        let observed = table.column_index(&self.config.selection.observed_column)?;

        let kept = table.filter(|r| r.values[forecast] > threshold && r.values[observed] > threshold);
        info!("Removed {} null speeds", table.len() - kept.len());
        Ok(kept)
    }

    fn reject_stations(
        &self,
        table: ObservationTable,
        stations: &StationTable,
    ) -> (ObservationTable, StationTable) {
        let rejected = &self.config.split.stations_to_reject;
        if rejected.is_empty() {
            return (table, stations.clone());
        }
        let names: HashSet<&str> = rejected.iter().map(|s| s.as_str()).collect();
        (table.exclude_stations(&names), stations.exclude(rejected))
    }

    /// Copy configured static attributes of each station onto its observations
    fn add_station_features(&self, table: ObservationTable, stations: &StationTable) -> ObservationTable {
        let by_name: HashMap<&str, &Station> =
            stations.stations().iter().map(|s| (s.name.as_str(), s)).collect();

        let mut table = table;
        for (feature, attribute) in &self.config.features.station_features {
            if !self.is_needed(feature) {
                continue;
            }
            table = table.with_column(feature, |r| {
                by_name
                    .get(r.name.as_str())
                    .map_or(f64::NAN, |s| s.attribute(attribute))
            });
        }
        table
    }

    fn add_calendar_features(&self, table: ObservationTable) -> ObservationTable {
        if self.is_needed(MONTH_FEATURE) || self.is_needed(HOUR_FEATURE) {
            table
                .with_column(MONTH_FEATURE, |r| r.month() as f64)
                .with_column(HOUR_FEATURE, |r| r.hour() as f64)
        } else {
            table
        }
    }

    fn generate_random_offsets(&self, table: &mut ObservationTable) {
        let (min, max) = (self.config.pipeline.jitter_min, self.config.pipeline.jitter_max);
        let mut rng = seeded_rng(self.config.pipeline.jitter_seed);
        for row in table.rows_mut() {
            let dx = rng.gen_range(min..=max);
            let dy = rng.gen_range(min..=max);
            row.offset = Some(PixelOffset::new(dx, dy));
        }
    }

    fn is_needed(&self, column: &str) -> bool {
        let features = &self.config.features;
        features.input_variables.iter().any(|v| v == column) || features.labels.iter().any(|v| v == column)
    }

    /// Inputs and labels, with `alti` and `ZS` standing in for `alti-zs`
    fn needed_columns(&self) -> Vec<String> {
        let features = &self.config.features;
        let mut needed: Vec<String> = Vec::new();
        let mut push = |column: &str| {
            if !needed.iter().any(|c| c == column) {
                needed.push(column.to_string());
            }
        };

        for column in features.input_variables.iter().chain(&features.labels) {
            if column == ELEVATION_DELTA {
                push(STATION_ELEVATION);
                push(MODEL_ELEVATION);
            } else {
                push(column);
            }
        }
        needed
    }

    /// Resample negatives (first label below the threshold) with replacement to the
    /// number of positives; negatives come first
    fn rebalance(&self, train: &SplitData) -> Result<SplitData> {
        let labels = train
            .labels()
            .ok_or_else(|| DatasetError::MissingData("Labels for rebalancing".to_string()))?;
        let threshold = self.config.pipeline.unbalanced_threshold;

        let (positives, negatives): (Vec<usize>, Vec<usize>) = (0..labels.len())
            .partition(|&i| labels[i].first().is_some_and(|v| *v >= threshold));

        if negatives.is_empty() && !positives.is_empty() {
            return Err(DatasetError::MissingData(
                "No negative training rows to resample".to_string(),
            ));
        }

        let mut rng = seeded_rng(self.config.pipeline.rebalance_seed);
        let mut positions: Vec<usize> = (0..positives.len())
            .map(|_| negatives[rng.gen_range(0..negatives.len())])
            .collect();
        positions.extend(&positives);

        info!(
            "Rebalanced training set: {} positives, {} resampled negatives",
            positives.len(),
            positives.len()
        );
        train.with_rows(&positions)
    }
}

fn seeded_rng(seed: Option<u64>) -> ChaCha8Rng {
    match seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    }
}

fn add_country(table: &mut ObservationTable, stations: &StationTable) {
    let countries = stations.country_of();
    for row in table.rows_mut() {
        row.country = countries.get(row.name.as_str()).map(|c| c.to_string());
    }
}

/// Stations of `table` not held out by a space-based strategy
fn train_stations(table: &ObservationTable, context: &SplitContext) -> Vec<String> {
    let mut held_out: HashSet<&str> = HashSet::new();
    if context.strategy_test.is_space_based() {
        held_out.extend(context.stations_test.iter().map(|s| s.as_str()));
    }
    if context.strategy_val.is_space_based() {
        held_out.extend(context.stations_val.iter().map(|s| s.as_str()));
    }

    table
        .unique_names()
        .into_iter()
        .filter(|s| !held_out.contains(s.as_str()))
        .collect()
}

/// Stations by split, first claim wins in the order other countries, train, val, test.
/// A station with rows on both sides of a time or random split is a training station.
/// Everything else in `universe` is rejected.
fn build_assignment(
    universe: &BTreeSet<String>,
    train: &SplitData,
    test: &SplitData,
    val: Option<&SplitData>,
    other_countries: Option<&SplitData>,
) -> SplitAssignment {
    let mut claimed: HashSet<String> = HashSet::new();
    let mut claim = |split: Option<&SplitData>| -> BTreeSet<String> {
        split
            .map(|s| s.unique_names())
            .unwrap_or_default()
            .into_iter()
            .filter(|name| claimed.insert(name.clone()))
            .collect()
    };

    let other_countries = claim(other_countries);
    let train = claim(Some(train));
    let val = claim(val);
    let test = claim(Some(test));
    drop(claim);

    let rejected = universe
        .iter()
        .filter(|name| !claimed.contains(*name))
        .cloned()
        .collect();

    SplitAssignment {
        train,
        test,
        val,
        other_countries,
        rejected,
        custom: BTreeSet::new(),
    }
}
