use crate::error::{DatasetError, Result};
use crate::models::{Observation, ObservationTable, PixelOffset, SampleIndex, Tile};
use crate::utils::constants::{ELEVATION_DELTA, MODEL_ELEVATION, STATION_ELEVATION};
use ndarray::Array3;
use std::collections::HashMap;
use std::sync::Arc;

/// Finite, index-addressable sequence aligned on a split's sample index.
///
/// Sources do no work until an element is requested and never reorder or filter.
pub trait SampleSource: Send + Sync {
    type Item: Send;

    /// Used in alignment errors
    fn name(&self) -> &str;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, position: usize) -> Result<Self::Item>;
}

fn out_of_range(name: &str, position: usize, len: usize) -> DatasetError {
    DatasetError::MissingData(format!(
        "Position {} out of range for source '{}' of length {}",
        position, name, len
    ))
}

/// How one feature value is read from a row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projection {
    Column(usize),
    /// `values[a] - values[b]`
    Difference(usize, usize),
}

impl Projection {
    /// Resolve feature names against `table`. `alti-zs` becomes `alti - ZS` unless the
    /// table already carries it.
    pub fn resolve(table: &ObservationTable, names: &[String]) -> Result<Vec<Projection>> {
        names
            .iter()
            .map(|name| {
                if name == ELEVATION_DELTA && !table.has_column(name) {
                    Ok(Projection::Difference(
                        table.column_index(STATION_ELEVATION)?,
                        table.column_index(MODEL_ELEVATION)?,
                    ))
                } else {
                    Ok(Projection::Column(table.column_index(name)?))
                }
            })
            .collect()
    }

    pub fn value(&self, row: &Observation) -> f64 {
        match *self {
            Projection::Column(i) => row.values[i],
            Projection::Difference(a, b) => row.values[a] - row.values[b],
        }
    }
}

/// Row-wise feature (or label) vectors
#[derive(Debug, Clone)]
pub struct FeatureSource {
    name: String,
    table: Arc<ObservationTable>,
    projection: Arc<[Projection]>,
}

impl FeatureSource {
    pub fn new(name: &str, table: Arc<ObservationTable>, projection: Vec<Projection>) -> Self {
        Self {
            name: name.to_string(),
            table,
            projection: projection.into(),
        }
    }

    pub fn width(&self) -> usize {
        self.projection.len()
    }
}

impl SampleSource for FeatureSource {
    type Item = Vec<f32>;

    fn name(&self) -> &str {
        &self.name
    }

    fn len(&self) -> usize {
        self.table.len()
    }

    fn get(&self, position: usize) -> Result<Vec<f32>> {
        let row = self
            .table
            .rows()
            .get(position)
            .ok_or_else(|| out_of_range(&self.name, position, self.len()))?;
        Ok(self.projection.iter().map(|p| p.value(row) as f32).collect())
    }
}

/// The same vector repeated `len` times
#[derive(Debug, Clone)]
pub struct BroadcastSource {
    name: String,
    values: Arc<[f32]>,
    len: usize,
}

impl BroadcastSource {
    pub fn new(name: &str, values: &[f64], len: usize) -> Self {
        Self {
            name: name.to_string(),
            values: values.iter().map(|v| *v as f32).collect(),
            len,
        }
    }
}

impl SampleSource for BroadcastSource {
    type Item = Arc<[f32]>;

    fn name(&self) -> &str {
        &self.name
    }

    fn len(&self) -> usize {
        self.len
    }

    fn get(&self, position: usize) -> Result<Arc<[f32]>> {
        if position >= self.len {
            return Err(out_of_range(&self.name, position, self.len));
        }
        Ok(Arc::clone(&self.values))
    }
}

#[derive(Debug, Clone)]
pub enum CropMode {
    /// Tiles already cropped at load time, same crop for every observation of a station
    Centered,
    /// Large tiles re-cropped per observation around the center shifted by its offset
    Uncentered {
        offsets: Arc<[PixelOffset]>,
        crop_size: usize,
    },
}

/// Station tile crop per sample
#[derive(Debug, Clone)]
pub struct TileCropSource {
    tiles: Arc<HashMap<String, Arc<Tile>>>,
    stations: Arc<[String]>,
    mode: CropMode,
}

impl TileCropSource {
    pub fn centered(tiles: HashMap<String, Arc<Tile>>, index: &SampleIndex) -> Self {
        Self {
            tiles: Arc::new(tiles),
            stations: index.names().into(),
            mode: CropMode::Centered,
        }
    }

    /// `offsets` must hold one entry per index position
    pub fn uncentered(
        tiles: HashMap<String, Arc<Tile>>,
        index: &SampleIndex,
        offsets: Vec<PixelOffset>,
        crop_size: usize,
    ) -> Result<Self> {
        if offsets.len() != index.len() {
            return Err(DatasetError::LengthMismatch {
                source_name: "offsets".to_string(),
                expected: index.len(),
                actual: offsets.len(),
            });
        }
        Ok(Self {
            tiles: Arc::new(tiles),
            stations: index.names().into(),
            mode: CropMode::Uncentered {
                offsets: offsets.into(),
                crop_size,
            },
        })
    }
}

impl SampleSource for TileCropSource {
    type Item = Array3<f32>;

    fn name(&self) -> &str {
        "tiles"
    }

    fn len(&self) -> usize {
        self.stations.len()
    }

    fn get(&self, position: usize) -> Result<Array3<f32>> {
        let station = self
            .stations
            .get(position)
            .ok_or_else(|| out_of_range(self.name(), position, self.len()))?;
        let tile = self.tiles.get(station).ok_or_else(|| {
            DatasetError::MissingData(format!("No tile loaded for station '{}'", station))
        })?;

        match &self.mode {
            CropMode::Centered => Ok(tile.data.clone()),
            CropMode::Uncentered { offsets, crop_size } => {
                tile.crop_at(offsets[position], *crop_size)
            }
        }
    }
}
