use arrow::array::{ArrayRef, Float64Array, Int32Array, ListArray, StringArray, TimestampSecondArray};
use arrow::datatypes::{DataType, Field, Float32Type, Float64Type, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::{NaiveDate, NaiveDateTime};
use parquet::arrow::ArrowWriter;
use pretty_assertions::assert_eq;
use station_dataset::config::{DatasetConfig, StationSelection};
use station_dataset::models::{HoldoutMode, Mode, Observation, ObservationTable, SplitStrategy};
use station_dataset::pipeline::{Batcher, StreamAssembler};
use station_dataset::processors::{DataPreparer, SplitContext, Splitter};
use station_dataset::readers::{ParquetTileReader, TileStore};
use station_dataset::writers::SplitWriter;
use std::collections::{BTreeSet, HashSet};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

const TILE_SIZE: usize = 40;

fn ts(y: i32, m: u32, d: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
}

fn station_names(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("S{:02}", i)).collect()
}

fn write_stations(dir: &Path, names: &[String]) -> PathBuf {
    let path = dir.join("stations.csv");
    let mut file = File::create(&path).unwrap();
    writeln!(file, "name,country,alti,tpi_500_NN_0,X,Y").unwrap();
    for (i, name) in names.iter().enumerate() {
        let country = if i == names.len() - 1 { "switzerland" } else { "france" };
        writeln!(
            file,
            "{},{},{},{},{},{}",
            name,
            country,
            500.0 + 97.0 * i as f64,
            ((i * 5) % 11) as f64,
            1000.0 + i as f64,
            2000.0 + ((i * 3) % 7) as f64
        )
        .unwrap();
    }
    path
}

/// Four observations per station, two in 2019 and two in 2021
fn write_observations(dir: &Path, names: &[String]) -> PathBuf {
    let mut name_col = Vec::new();
    let mut dates = Vec::new();
    let (mut alti, mut zs, mut wind, mut observed) = (Vec::new(), Vec::new(), Vec::new(), Vec::new());

    for (i, name) in names.iter().enumerate() {
        let error = ((i * 7) % names.len()) as f64 / 10.0;
        for (j, date) in [ts(2019, 2, 1), ts(2019, 8, 1), ts(2021, 2, 1), ts(2021, 8, 1)]
            .iter()
            .enumerate()
        {
            let speed = 2.0 + j as f64;
            name_col.push(name.clone());
            dates.push(date.and_utc().timestamp());
            alti.push(500.0 + 97.0 * i as f64);
            zs.push(450.0 + 90.0 * i as f64);
            wind.push(speed + error);
            observed.push(speed);
        }
    }

    let schema = Arc::new(Schema::new(vec![
        Field::new("name", DataType::Utf8, false),
        Field::new("date", DataType::Timestamp(TimeUnit::Second, None), false),
        Field::new("alti", DataType::Float64, true),
        Field::new("ZS", DataType::Float64, true),
        Field::new("Wind", DataType::Float64, true),
        Field::new("vw10m(m/s)", DataType::Float64, true),
    ]));
    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from(name_col)),
        Arc::new(TimestampSecondArray::from(dates)),
        Arc::new(Float64Array::from(alti)),
        Arc::new(Float64Array::from(zs)),
        Arc::new(Float64Array::from(wind)),
        Arc::new(Float64Array::from(observed)),
    ];

    let path = dir.join("time_series.parquet");
    write_batch(&path, RecordBatch::try_new(schema, columns).unwrap());
    path
}

/// Square topography tiles, station `i` filled with `i`
fn write_tiles(dir: &Path, names: &[String]) -> PathBuf {
    let n = TILE_SIZE;
    let data = ListArray::from_iter_primitive::<Float32Type, _, _>(
        (0..names.len()).map(|i| Some(vec![Some(i as f32); n * n])),
    );
    let axis = || {
        ListArray::from_iter_primitive::<Float64Type, _, _>(
            names.iter().map(|_| Some((0..n).map(|v| Some(v as f64)).collect::<Vec<_>>())),
        )
    };

    let list = |t: DataType| DataType::List(Arc::new(Field::new("item", t, true)));
    let schema = Arc::new(Schema::new(vec![
        Field::new("name", DataType::Utf8, false),
        Field::new("rows", DataType::Int32, false),
        Field::new("cols", DataType::Int32, false),
        Field::new("data", list(DataType::Float32), false),
        Field::new("x", list(DataType::Float64), false),
        Field::new("y", list(DataType::Float64), false),
    ]));
    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from(names.to_vec())),
        Arc::new(Int32Array::from(vec![n as i32; names.len()])),
        Arc::new(Int32Array::from(vec![n as i32; names.len()])),
        Arc::new(data),
        Arc::new(axis()),
        Arc::new(axis()),
    ];

    let path = dir.join("topos.parquet");
    write_batch(&path, RecordBatch::try_new(schema, columns).unwrap());
    path
}

fn write_batch(path: &Path, batch: RecordBatch) {
    let file = File::create(path).unwrap();
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None).unwrap();
    writer.write(&batch).unwrap();
    writer.close().unwrap();
}

/// Inputs on disk plus a TOML configuration pointing at them
fn fixture(n_stations: usize, split_section: &str, pipeline_section: &str) -> (TempDir, DatasetConfig) {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let names = station_names(n_stations);
    let stations = write_stations(dir.path(), &names);
    let observations = write_observations(dir.path(), &names);
    let topos = write_tiles(dir.path(), &names);

    let config_path = dir.path().join("dataset.toml");
    let mut file = File::create(&config_path).unwrap();
    writeln!(
        file,
        r#"
[data]
time_series = "{}"
stations = "{}"
topos_near_station = "{}"

[features]
input_variables = ["alti-zs", "Wind", "tpi_500"]
labels = ["vw10m(m/s)"]
map_variables = ["topos"]

[split]
date_split_train_test = "2020-01-01"
date_split_train_val = "2020-01-01"
{}

[selection]
parameters_split_test = ["alti"]
parameters_split_val = ["tpi_500_NN_0"]
seed = 3

[pipeline]
crop_size = 10
global_batch_size = 8
prefetch = 2
shuffle_seed = 11
{}
"#,
        observations.display(),
        stations.display(),
        topos.display(),
        split_section,
        pipeline_section
    )
    .unwrap();

    let config = DatasetConfig::load(&config_path).unwrap();
    (dir, config)
}

#[test]
fn test_time_and_space_pipeline_from_files() {
    let (_dir, config) = fixture(
        6,
        r#"
split_strategy_test = "time_and_space"
split_strategy_val = "time_and_space"
stations_test = ["S02"]
stations_val = ["S03"]
country_to_reject_during_training = ["switzerland"]
"#,
        "",
    );

    let preparer = DataPreparer::new(&config);
    let (observations, stations) = preparer.load().unwrap();
    let splits = preparer.prepare_train_test_data(observations, &stations).unwrap();

    let cutoff = ts(2020, 1, 1).date().and_hms_opt(0, 0, 0).unwrap();
    let train = splits.get(Mode::Train).unwrap();
    let train_names: BTreeSet<String> = train.unique_names().into_iter().collect();
    assert_eq!(
        train_names,
        ["S00", "S01", "S04"].iter().map(|s| s.to_string()).collect()
    );
    assert!(train.table().rows().iter().all(|r| r.timestamp < cutoff));

    let test = splits.get(Mode::Test).unwrap();
    assert_eq!(test.unique_names(), vec!["S02".to_string()]);
    assert!(test.table().rows().iter().all(|r| r.timestamp >= cutoff));

    let other = splits.get(Mode::OtherCountries).unwrap();
    assert_eq!(other.unique_names(), vec!["S05".to_string()]);
    assert_eq!(other.len(), 2);

    let assignment = splits.assignment();
    assert_eq!(assignment.mode_of("S03"), "Validation");
    assert_eq!(assignment.mode_of("S05"), "other_countries");
    assignment
        .validate_partition(station_names(6).iter().map(|s| s.as_str()))
        .unwrap();

    let reader = ParquetTileReader::from_paths(&config.data, &config.features.map_variables).unwrap();
    let mut store = TileStore::new(Arc::new(reader)).with_crop_size(config.pipeline.crop_size);
    let stream = StreamAssembler::new(&config)
        .assemble(&splits, Mode::Train, &mut store, true)
        .unwrap();
    assert_eq!(stream.len(), train.len());
    assert!(stream.has_stats());

    for (sample, row) in stream.iter().zip(train.table().rows()) {
        let sample = sample.unwrap();
        let station: usize = row.name[1..].parse().unwrap();
        assert_eq!(sample.tile[[0, 0, 0]], station as f32);
        assert_eq!(sample.label, Some(vec![row.values[row.values.len() - 1] as f32]));
    }

    let batcher = Batcher::from_config(&config.pipeline);
    let batches: Vec<_> = batcher
        .batch(Mode::Train, &stream)
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert_eq!(batches.len(), batcher.batch_count(train.len()));
    assert_eq!(batches[0].tiles.dim(), (6, 10, 10, 1));
    assert_eq!(batches[0].features.dim(), (6, 3));
    assert!(batches[0].stats.is_some());
}

#[test]
fn test_random_selection_pipeline() {
    let names = station_names(27);
    let (dir, config) = fixture(
        27,
        r#"
split_strategy_test = "space"
split_strategy_val = "space"
stations_test = "random"
stations_val = "random"
"#,
        "",
    );

    let preparer = DataPreparer::new(&config);
    let (observations, stations) = preparer.load().unwrap();
    let splits = preparer.prepare_train_test_data(observations, &stations).unwrap();

    let selection = splits.selection().unwrap();
    let test: HashSet<&String> = selection.test.iter().collect();
    let val: HashSet<&String> = selection.val.iter().collect();
    assert!(!test.is_empty());
    assert_eq!(test.len(), selection.test.len());
    assert_eq!(val.len(), selection.val.len());
    assert!(test.is_disjoint(&val));

    let assignment = splits.assignment();
    for name in &selection.test {
        assert_eq!(assignment.mode_of(name), "Test");
    }
    assignment
        .validate_partition(names.iter().map(|s| s.as_str()))
        .unwrap();

    let report_path = dir.path().join("report.json");
    SplitWriter::new().write_report(&splits, &report_path).unwrap();
    let report: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&report_path).unwrap()).unwrap();
    assert_eq!(
        report["selection"]["test"].as_array().unwrap().len(),
        selection.test.len()
    );
    assert_eq!(report["summary"][0]["mode"], "train");
}

#[test]
fn test_jittered_crops_keep_shape() {
    let (_dir, config) = fixture(
        4,
        r#"
split_strategy_test = "space"
split_strategy_val = "random"
stations_test = ["S01"]
stations_val = ["S02"]
"#,
        r#"
random_idx = true
jitter_min = -3
jitter_max = 3
jitter_seed = 5
standardize = false
"#,
    );

    let preparer = DataPreparer::new(&config);
    let (observations, stations) = preparer.load().unwrap();
    let splits = preparer.prepare_train_test_data(observations, &stations).unwrap();

    let reader = ParquetTileReader::from_paths(&config.data, &config.features.map_variables).unwrap();
    let mut store = TileStore::new(Arc::new(reader)).with_crop_size(config.pipeline.crop_size);
    let stream = StreamAssembler::new(&config)
        .assemble(&splits, Mode::Test, &mut store, false)
        .unwrap();

    assert_eq!(stream.len(), 4);
    assert!(!stream.has_stats());
    assert!(!stream.has_labels());
    for sample in &stream {
        let sample = sample.unwrap();
        assert_eq!(sample.tile.dim(), (10, 10, 1));
        assert!(sample.tile.iter().all(|v| *v == 1.0));
    }
}

fn scenario_context(strategy: SplitStrategy) -> SplitContext {
    let mut config = DatasetConfig::default();
    config.split.split_strategy_test = strategy;
    config.split.split_strategy_val = strategy;
    config.split.date_split_train_test = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
    config.split.stations_test = StationSelection::Names(vec!["C".to_string()]);

    let mut context = SplitContext::from_config(&config.split);
    context.stations_train = vec!["A".to_string(), "B".to_string()];
    context
}

fn scenario_table(rows: &[(&str, NaiveDateTime)]) -> ObservationTable {
    ObservationTable::new(
        vec!["Wind".to_string()],
        rows.iter()
            .map(|(n, t)| Observation::new(n.to_string(), *t, vec![1.0]))
            .collect(),
    )
    .unwrap()
}

#[test]
fn test_space_scenario() {
    let context = scenario_context(SplitStrategy::Space);
    let table = scenario_table(&[
        ("A", ts(2019, 1, 1)),
        ("C", ts(2019, 1, 1)),
        ("B", ts(2021, 1, 1)),
        ("D", ts(2021, 1, 1)),
        ("C", ts(2021, 1, 1)),
    ]);

    let (train, test) = Splitter::new(&context)
        .split(&table, HoldoutMode::Test, None, None)
        .unwrap();
    assert_eq!(train.unique_names(), vec!["A".to_string(), "B".to_string()]);
    assert_eq!(test.unique_names(), vec!["C".to_string()]);
    assert_eq!(test.len(), 2);
    assert_eq!(train.len() + test.len(), 4);
}

#[test]
fn test_time_scenario() {
    let context = scenario_context(SplitStrategy::Time);
    let table = scenario_table(&[("A", ts(2019, 6, 1)), ("A", ts(2021, 1, 1))]);

    let (train, holdout) = Splitter::new(&context)
        .split(&table, HoldoutMode::Test, None, None)
        .unwrap();
    assert_eq!(train.rows()[0].timestamp, ts(2019, 6, 1));
    assert_eq!(holdout.rows()[0].timestamp, ts(2021, 1, 1));
    assert_eq!((train.len(), holdout.len()), (1, 1));
}
