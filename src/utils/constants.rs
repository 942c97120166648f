/// Environment prefix for configuration overrides
pub const ENV_PREFIX: &str = "STATION_DATASET";

/// Tile geometry
pub const DEFAULT_CROP_SIZE: usize = 140;
pub const LARGE_TILE_SIZE: usize = 280;

/// Per-observation crop jitter bound, in pixels (inclusive on both sides)
pub const DEFAULT_JITTER: i32 = 25;

/// Stratified station selection
pub const DEFAULT_PATIENCE: usize = 10;
pub const DEFAULT_MAX_SELECTION_ATTEMPTS: usize = 100;
pub const LOWER_QUANTILE: f64 = 0.33;
pub const UPPER_QUANTILE: f64 = 0.66;

/// Quick-test holdout fractions, overriding the configured ones
pub const QUICK_TEST_FRACTION_TEST: f64 = 0.05;
pub const QUICK_TEST_FRACTION_VAL: f64 = 0.01;

/// Batching defaults
pub const DEFAULT_BATCH_SIZE: usize = 256;

/// Derived elevation-delta feature and the columns it is computed from
pub const ELEVATION_DELTA: &str = "alti-zs";
pub const STATION_ELEVATION: &str = "alti";
pub const MODEL_ELEVATION: &str = "ZS";

/// Observation table column names
pub const NAME_COLUMN: &str = "name";
pub const DATE_COLUMN: &str = "date";
pub const COUNTRY_COLUMN: &str = "country";
pub const MONTH_FEATURE: &str = "month";
pub const HOUR_FEATURE: &str = "hour";
pub const MODE_COLUMN: &str = "mode";

/// Parquet output
pub const DEFAULT_ROW_GROUP_SIZE: usize = 100_000;
