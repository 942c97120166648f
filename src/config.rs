use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use validator::Validate;

use crate::error::{DatasetError, Result};
use crate::models::{SplitStrategy, TerrainKind};
use crate::processors::metrics::Metric;
use crate::utils::constants::{
    DEFAULT_BATCH_SIZE, DEFAULT_CROP_SIZE, DEFAULT_JITTER, DEFAULT_MAX_SELECTION_ATTEMPTS,
    DEFAULT_PATIENCE, ENV_PREFIX,
};

/// Either an explicit list of station names or the keyword `"random"`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StationSelection {
    Names(Vec<String>),
    Keyword(SelectionKeyword),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionKeyword {
    Random,
}

impl StationSelection {
    pub fn is_random(&self) -> bool {
        matches!(self, StationSelection::Keyword(SelectionKeyword::Random))
    }

    pub fn names(&self) -> Option<&[String]> {
        match self {
            StationSelection::Names(names) => Some(names),
            StationSelection::Keyword(_) => None,
        }
    }
}

impl Default for StationSelection {
    fn default() -> Self {
        StationSelection::Names(Vec::new())
    }
}

/// Prefetch depth: a fixed number of batches or `"auto"`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Prefetch {
    Depth(usize),
    Auto(AutoKeyword),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoKeyword {
    Auto,
}

impl Prefetch {
    pub const AUTO: Prefetch = Prefetch::Auto(AutoKeyword::Auto);

    /// Resolved depth; `auto` follows the number of available cores
    pub fn depth(&self) -> usize {
        match self {
            Prefetch::Depth(depth) => *depth,
            Prefetch::Auto(_) => num_cpus::get(),
        }
    }
}

impl Default for Prefetch {
    fn default() -> Self {
        Prefetch::AUTO
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct DataPaths {
    pub time_series: PathBuf,
    pub stations: PathBuf,
    pub topos_near_station: Option<PathBuf>,
    pub aspect_near_station: Option<PathBuf>,
    pub tan_slope_near_station: Option<PathBuf>,
    pub tpi_300_near_station: Option<PathBuf>,
    pub tpi_600_near_station: Option<PathBuf>,
}

impl DataPaths {
    pub fn tile_path(&self, kind: TerrainKind) -> Option<&Path> {
        let path = match kind {
            TerrainKind::Topos => &self.topos_near_station,
            TerrainKind::Aspect => &self.aspect_near_station,
            TerrainKind::TanSlope => &self.tan_slope_near_station,
            TerrainKind::Tpi300 => &self.tpi_300_near_station,
            TerrainKind::Tpi600 => &self.tpi_600_near_station,
        };
        path.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct FeatureConfig {
    #[validate(length(min = 1))]
    pub input_variables: Vec<String>,

    #[validate(length(min = 1))]
    pub labels: Vec<String>,

    #[validate(length(min = 1))]
    pub map_variables: Vec<TerrainKind>,

    /// Observation feature name -> station attribute it is broadcast from
    pub station_features: BTreeMap<String, String>,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        let station_features = ["tpi_500", "curvature", "laplacian", "mu"]
            .iter()
            .map(|f| (f.to_string(), format!("{}_NN_0", f)))
            .collect();

        Self {
            input_variables: Vec::new(),
            labels: vec!["vw10m(m/s)".to_string()],
            map_variables: vec![TerrainKind::Topos],
            station_features,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct SplitConfig {
    pub split_strategy_test: SplitStrategy,
    pub split_strategy_val: SplitStrategy,

    pub date_split_train_test: NaiveDate,
    pub date_split_train_val: NaiveDate,

    pub random_split_state_test: u64,
    pub random_split_state_val: u64,

    #[validate(range(exclusive_min = 0.0, exclusive_max = 1.0))]
    pub random_split_test_size_test: f64,

    #[validate(range(exclusive_min = 0.0, exclusive_max = 1.0))]
    pub random_split_test_size_val: f64,

    pub stations_test: StationSelection,
    pub stations_val: StationSelection,
    pub stations_to_reject: Vec<String>,
    pub country_to_reject_during_training: Vec<String>,

    pub quick_test: bool,
    pub quick_test_stations: Vec<String>,
}

impl Default for SplitConfig {
    fn default() -> Self {
        let cutoff = NaiveDate::from_ymd_opt(2019, 10, 1).unwrap_or_default();
        Self {
            split_strategy_test: SplitStrategy::TimeAndSpace,
            split_strategy_val: SplitStrategy::TimeAndSpace,
            date_split_train_test: cutoff,
            date_split_train_val: cutoff,
            random_split_state_test: 50,
            random_split_state_val: 55,
            random_split_test_size_test: 0.2,
            random_split_test_size_val: 0.2,
            stations_test: StationSelection::default(),
            stations_val: StationSelection::default(),
            stations_to_reject: Vec::new(),
            country_to_reject_during_training: Vec::new(),
            quick_test: false,
            quick_test_stations: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct SelectionConfig {
    pub parameters_split_test: Vec<String>,
    pub parameters_split_val: Vec<String>,
    pub metric_split: Metric,

    /// Forecast column compared against `observed_column` for the per-station metric
    pub forecast_column: String,
    pub observed_column: String,

    pub anchor_station: Option<String>,

    #[validate(range(min = 1))]
    pub patience: usize,

    #[validate(range(min = 1))]
    pub max_attempts: usize,

    pub seed: Option<u64>,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            parameters_split_test: ["alti", "tpi_500_NN_0", "mu_NN_0", "laplacian_NN_0", "Y", "X"]
                .iter()
                .map(|p| p.to_string())
                .collect(),
            parameters_split_val: vec!["alti".to_string(), "tpi_500_NN_0".to_string()],
            metric_split: Metric::Rmse,
            forecast_column: "Wind".to_string(),
            observed_column: "vw10m(m/s)".to_string(),
            anchor_station: None,
            patience: DEFAULT_PATIENCE,
            max_attempts: DEFAULT_MAX_SELECTION_ATTEMPTS,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct PipelineConfig {
    pub standardize: bool,
    pub shuffle: bool,
    pub shuffle_seed: Option<u64>,

    /// Draw a per-observation crop jitter and crop uncentered tiles
    pub random_idx: bool,
    pub jitter_min: i32,
    pub jitter_max: i32,
    pub jitter_seed: Option<u64>,

    #[validate(range(min = 1))]
    pub crop_size: usize,

    #[validate(range(min = 1))]
    pub global_batch_size: usize,

    pub prefetch: Prefetch,

    pub remove_null_speeds: bool,
    pub threshold_null_speed: f64,

    pub unbalanced_dataset: bool,
    pub unbalanced_threshold: f64,
    pub rebalance_seed: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            standardize: true,
            shuffle: true,
            shuffle_seed: None,
            random_idx: false,
            jitter_min: -DEFAULT_JITTER,
            jitter_max: DEFAULT_JITTER,
            jitter_seed: None,
            crop_size: DEFAULT_CROP_SIZE,
            global_batch_size: DEFAULT_BATCH_SIZE,
            prefetch: Prefetch::AUTO,
            remove_null_speeds: false,
            threshold_null_speed: 1.0,
            unbalanced_dataset: false,
            unbalanced_threshold: 2.0,
            rebalance_seed: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct DatasetConfig {
    #[validate(nested)]
    pub data: DataPaths,

    #[validate(nested)]
    pub features: FeatureConfig,

    #[validate(nested)]
    pub split: SplitConfig,

    #[validate(nested)]
    pub selection: SelectionConfig,

    #[validate(nested)]
    pub pipeline: PipelineConfig,
}

impl DatasetConfig {
    /// Load from a TOML/JSON/YAML file, with `STATION_DATASET__SECTION__KEY` overrides
    pub fn load(path: &Path) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: DatasetConfig = settings.try_deserialize()?;
        config.check()?;
        Ok(config)
    }

    /// Field-level validation plus the cross-field rules
    pub fn check(&self) -> Result<()> {
        self.validate()?;

        if self.pipeline.jitter_min > self.pipeline.jitter_max {
            return Err(DatasetError::Config(format!(
                "jitter_min ({}) must not exceed jitter_max ({})",
                self.pipeline.jitter_min, self.pipeline.jitter_max
            )));
        }

        if self.split.stations_test.is_random() != self.split.stations_val.is_random() {
            return Err(DatasetError::Config(
                "stations_test and stations_val must both be \"random\" or both be lists"
                    .to_string(),
            ));
        }

        if self.pipeline.random_idx && self.data.tile_path(TerrainKind::Topos).is_none() {
            return Err(DatasetError::Config(
                "random_idx requires topos_near_station".to_string(),
            ));
        }

        Ok(())
    }
}
