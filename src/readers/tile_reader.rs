use crate::config::DataPaths;
use crate::error::{DatasetError, Result};
use crate::models::{TerrainKind, Tile};
use crate::readers::observation_reader::downcast;
use crate::utils::constants::NAME_COLUMN;
use arrow::array::{Array, ArrayRef, Float32Array, Float64Array, Int64Array, ListArray, StringArray};
use arrow::compute::cast;
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::File;
use std::path::PathBuf;
use tracing::debug;

/// Backing store of per-station terrain rasters
pub trait TileSource: Send + Sync {
    /// Raw (uncropped, single-channel) tiles of `kind` for the requested stations.
    /// Every requested station must be present.
    fn load(&self, kind: TerrainKind, names: &[String]) -> Result<HashMap<String, Tile>>;
}

/// One Parquet file per terrain kind with columns
/// `name`, `rows`, `cols`, `data` (row-major `List<Float32>`), `x`, `y` (`List<Float64>`)
pub struct ParquetTileReader {
    paths: BTreeMap<TerrainKind, PathBuf>,
    batch_size: usize,
}

impl ParquetTileReader {
    pub fn new() -> Self {
        Self {
            paths: BTreeMap::new(),
            batch_size: 256,
        }
    }

    pub fn with_path(mut self, kind: TerrainKind, path: PathBuf) -> Self {
        self.paths.insert(kind, path);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Reader over the configured file of every kind in `kinds`
    pub fn from_paths(paths: &DataPaths, kinds: &[TerrainKind]) -> Result<Self> {
        kinds.iter().try_fold(Self::new(), |reader, kind| {
            let path = paths.tile_path(*kind).ok_or_else(|| {
                DatasetError::Config(format!("No tile file configured for {}", kind.as_str()))
            })?;
            Ok(reader.with_path(*kind, path.to_path_buf()))
        })
    }

    fn decode_batch(
        batch: &RecordBatch,
        wanted: &HashSet<&str>,
    ) -> Result<Vec<Tile>> {
        let names = cast(column(batch, NAME_COLUMN)?, &DataType::Utf8)?;
        let names = downcast::<StringArray>(&names, NAME_COLUMN)?;
        let rows = cast(column(batch, "rows")?, &DataType::Int64)?;
        let rows = downcast::<Int64Array>(&rows, "rows")?;
        let cols = cast(column(batch, "cols")?, &DataType::Int64)?;
        let cols = downcast::<Int64Array>(&cols, "cols")?;
        let data = downcast::<ListArray>(column(batch, "data")?, "data")?;
        let x = downcast::<ListArray>(column(batch, "x")?, "x")?;
        let y = downcast::<ListArray>(column(batch, "y")?, "y")?;

        let positions: Vec<usize> = (0..batch.num_rows())
            .filter(|&i| !names.is_null(i) && wanted.contains(names.value(i)))
            .collect();

        positions
            .par_iter()
            .map(|&i| {
                let station = names.value(i).to_string();
                let n_rows = to_extent(rows.value(i), &station)?;
                let n_cols = to_extent(cols.value(i), &station)?;

                let values = list_values::<Float32Array>(&data.value(i), DataType::Float32, "data")?
                    .values()
                    .to_vec();
                let x = list_values::<Float64Array>(&x.value(i), DataType::Float64, "x")?
                    .values()
                    .to_vec();
                let y = list_values::<Float64Array>(&y.value(i), DataType::Float64, "y")?
                    .values()
                    .to_vec();

                Tile::from_grid(station, n_rows, n_cols, values, x, y)
            })
            .collect()
    }
}

impl Default for ParquetTileReader {
    fn default() -> Self {
        Self::new()
    }
}

impl TileSource for ParquetTileReader {
    fn load(&self, kind: TerrainKind, names: &[String]) -> Result<HashMap<String, Tile>> {
        let path = self.paths.get(&kind).ok_or_else(|| {
            DatasetError::Config(format!("No tile file configured for {}", kind))
        })?;
        debug!("Reading {} tiles from {}", kind, path.display());

        let wanted: HashSet<&str> = names.iter().map(|n| n.as_str()).collect();
        let file = File::open(path)?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)?
            .with_batch_size(self.batch_size)
            .build()?;

        let mut tiles = HashMap::with_capacity(names.len());
        for batch in reader {
            for tile in Self::decode_batch(&batch?, &wanted)? {
                tiles.insert(tile.station.clone(), tile);
            }
        }

        ensure_complete(&tiles, kind, names)?;
        Ok(tiles)
    }
}

/// Tiles held in memory, keyed by kind then station
#[derive(Debug, Clone, Default)]
pub struct MemoryTileSource {
    tiles: HashMap<TerrainKind, HashMap<String, Tile>>,
}

impl MemoryTileSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, kind: TerrainKind, tile: Tile) {
        self.tiles
            .entry(kind)
            .or_default()
            .insert(tile.station.clone(), tile);
    }

    pub fn with_tile(mut self, kind: TerrainKind, tile: Tile) -> Self {
        self.insert(kind, tile);
        self
    }
}

impl TileSource for MemoryTileSource {
    fn load(&self, kind: TerrainKind, names: &[String]) -> Result<HashMap<String, Tile>> {
        let tiles: HashMap<String, Tile> = match self.tiles.get(&kind) {
            Some(by_station) => names
                .iter()
                .filter_map(|n| by_station.get(n).map(|t| (n.clone(), t.clone())))
                .collect(),
            None => HashMap::new(),
        };
        ensure_complete(&tiles, kind, names)?;
        Ok(tiles)
    }
}

fn ensure_complete(tiles: &HashMap<String, Tile>, kind: TerrainKind, names: &[String]) -> Result<()> {
    match names.iter().find(|n| !tiles.contains_key(*n)) {
        Some(missing) => Err(DatasetError::MissingTile {
            station: missing.clone(),
            kind,
        }),
        None => Ok(()),
    }
}

fn column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a ArrayRef> {
    batch
        .column_by_name(name)
        .ok_or_else(|| DatasetError::UnknownColumn(name.to_string()))
}

fn to_extent(value: i64, station: &str) -> Result<usize> {
    usize::try_from(value).map_err(|_| {
        DatasetError::InvalidFormat(format!("Negative tile extent for station '{}'", station))
    })
}

fn list_values<T: Clone + 'static>(values: &ArrayRef, data_type: DataType, column: &str) -> Result<T> {
    let values = cast(values, &data_type)?;
    if values.null_count() > 0 {
        return Err(DatasetError::MissingData(format!(
            "Null values in tile column '{}'",
            column
        )));
    }
    downcast::<T>(&values, column).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Int32Array;
    use arrow::datatypes::{Field, Schema};
    use parquet::arrow::ArrowWriter;
    use std::sync::Arc;
    use tempfile::NamedTempFile;

    fn grid_tile(station: &str, size: usize, fill: f32) -> Tile {
        Tile::from_grid(
            station.to_string(),
            size,
            size,
            vec![fill; size * size],
            (0..size).map(|c| c as f64).collect(),
            (0..size).map(|r| r as f64).collect(),
        )
        .unwrap()
    }

    fn write_tiles(tiles: &[Tile]) -> NamedTempFile {
        let float_list = |nullable: bool, t: DataType| {
            DataType::List(Arc::new(Field::new("item", t, nullable)))
        };
        let schema = Arc::new(Schema::new(vec![
            Field::new("name", DataType::Utf8, false),
            Field::new("rows", DataType::Int32, false),
            Field::new("cols", DataType::Int32, false),
            Field::new("data", float_list(true, DataType::Float32), false),
            Field::new("x", float_list(true, DataType::Float64), false),
            Field::new("y", float_list(true, DataType::Float64), false),
        ]));

        let data = ListArray::from_iter_primitive::<arrow::datatypes::Float32Type, _, _>(
            tiles
                .iter()
                .map(|t| Some(t.data.iter().map(|v| Some(*v)).collect::<Vec<_>>())),
        );
        let x = ListArray::from_iter_primitive::<arrow::datatypes::Float64Type, _, _>(
            tiles.iter().map(|t| Some(t.x.iter().map(|v| Some(*v)).collect::<Vec<_>>())),
        );
        let y = ListArray::from_iter_primitive::<arrow::datatypes::Float64Type, _, _>(
            tiles.iter().map(|t| Some(t.y.iter().map(|v| Some(*v)).collect::<Vec<_>>())),
        );

        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(StringArray::from(
                    tiles.iter().map(|t| t.station.as_str()).collect::<Vec<_>>(),
                )),
                Arc::new(Int32Array::from(
                    tiles.iter().map(|t| t.rows() as i32).collect::<Vec<_>>(),
                )),
                Arc::new(Int32Array::from(
                    tiles.iter().map(|t| t.cols() as i32).collect::<Vec<_>>(),
                )),
                Arc::new(data),
                Arc::new(x),
                Arc::new(y),
            ],
        )
        .unwrap();

        let file = NamedTempFile::new().unwrap();
        let mut writer = ArrowWriter::try_new(file.reopen().unwrap(), schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();
        file
    }

    #[test]
    fn test_parquet_tiles_round_trip_selected_stations() {
        let file = write_tiles(&[grid_tile("A", 6, 1.0), grid_tile("B", 6, 2.0), grid_tile("C", 6, 3.0)]);
        let reader = ParquetTileReader::new().with_path(TerrainKind::Topos, file.path().to_path_buf());

        let tiles = reader
            .load(TerrainKind::Topos, &["C".to_string(), "A".to_string()])
            .unwrap();

        assert_eq!(tiles.len(), 2);
        assert_eq!(tiles["A"], grid_tile("A", 6, 1.0));
        assert_eq!(tiles["C"].data[[5, 5, 0]], 3.0);
    }

    #[test]
    fn test_missing_station_is_reported() {
        let file = write_tiles(&[grid_tile("A", 4, 1.0)]);
        let reader = ParquetTileReader::new().with_path(TerrainKind::Aspect, file.path().to_path_buf());

        let result = reader.load(TerrainKind::Aspect, &["A".to_string(), "Z".to_string()]);
        assert!(matches!(
            result,
            Err(DatasetError::MissingTile { ref station, kind: TerrainKind::Aspect }) if station == "Z"
        ));
    }

    #[test]
    fn test_unconfigured_kind() {
        let reader = ParquetTileReader::new();
        assert!(matches!(
            reader.load(TerrainKind::Tpi300, &["A".to_string()]),
            Err(DatasetError::Config(_))
        ));
    }

    #[test]
    fn test_memory_source() {
        let source = MemoryTileSource::new().with_tile(TerrainKind::Topos, grid_tile("A", 4, 7.0));
        let tiles = source.load(TerrainKind::Topos, &["A".to_string()]).unwrap();
        assert_eq!(tiles["A"].data[[0, 0, 0]], 7.0);

        assert!(source.load(TerrainKind::Aspect, &["A".to_string()]).is_err());
    }
}
