use crate::config::DatasetConfig;
use crate::error::{DatasetError, Result};
use crate::models::{Mode, PixelOffset, TerrainKind};
use crate::pipeline::source::{BroadcastSource, FeatureSource, SampleSource, TileCropSource};
use crate::processors::preparer::PreparedSplits;
use crate::readers::TileStore;
use ndarray::Array3;
use std::sync::Arc;
use tracing::debug;

pub type TileSourceRef = Arc<dyn SampleSource<Item = Array3<f32>>>;
pub type VectorSourceRef = Arc<dyn SampleSource<Item = Vec<f32>>>;
pub type StatsSourceRef = Arc<dyn SampleSource<Item = Arc<[f32]>>>;

/// One joined element: `(tile, features)`, plus mean/std and label when requested
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub tile: Array3<f32>,
    pub features: Vec<f32>,
    pub stats: Option<(Arc<[f32]>, Arc<[f32]>)>,
    pub label: Option<Vec<f32>>,
}

/// Index-aligned join of the sources of one split
#[derive(Clone)]
pub struct SampleStream {
    len: usize,
    tiles: TileSourceRef,
    features: VectorSourceRef,
    stats: Option<(StatsSourceRef, StatsSourceRef)>,
    labels: Option<VectorSourceRef>,
}

fn check_len<T: Send>(source: &dyn SampleSource<Item = T>, expected: usize) -> Result<()> {
    if source.len() != expected {
        return Err(DatasetError::LengthMismatch {
            source_name: source.name().to_string(),
            expected,
            actual: source.len(),
        });
    }
    Ok(())
}

impl SampleStream {
    /// Every source must yield exactly `len` elements
    pub fn new(
        len: usize,
        tiles: TileSourceRef,
        features: VectorSourceRef,
        stats: Option<(StatsSourceRef, StatsSourceRef)>,
        labels: Option<VectorSourceRef>,
    ) -> Result<Self> {
        check_len(tiles.as_ref(), len)?;
        check_len(features.as_ref(), len)?;
        if let Some((mean, std)) = &stats {
            check_len(mean.as_ref(), len)?;
            check_len(std.as_ref(), len)?;
        }
        if let Some(labels) = &labels {
            check_len(labels.as_ref(), len)?;
        }

        Ok(Self {
            len,
            tiles,
            features,
            stats,
            labels,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn has_stats(&self) -> bool {
        self.stats.is_some()
    }

    pub fn has_labels(&self) -> bool {
        self.labels.is_some()
    }

    pub fn get(&self, position: usize) -> Result<Sample> {
        let stats = match &self.stats {
            Some((mean, std)) => Some((mean.get(position)?, std.get(position)?)),
            None => None,
        };
        let label = match &self.labels {
            Some(labels) => Some(labels.get(position)?),
            None => None,
        };

        Ok(Sample {
            tile: self.tiles.get(position)?,
            features: self.features.get(position)?,
            stats,
            label,
        })
    }

    /// Fresh pass from the first sample
    pub fn iter(&self) -> SampleIter {
        SampleIter {
            stream: self.clone(),
            position: 0,
        }
    }
}

impl IntoIterator for &SampleStream {
    type Item = Result<Sample>;
    type IntoIter = SampleIter;

    fn into_iter(self) -> SampleIter {
        self.iter()
    }
}

pub struct SampleIter {
    stream: SampleStream,
    position: usize,
}

impl Iterator for SampleIter {
    type Item = Result<Sample>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.position >= self.stream.len {
            return None;
        }
        let sample = self.stream.get(self.position);
        self.position += 1;
        Some(sample)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.stream.len.saturating_sub(self.position);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for SampleIter {}

/// Builds the sample stream of a prepared split
pub struct StreamAssembler<'a> {
    config: &'a DatasetConfig,
}

impl<'a> StreamAssembler<'a> {
    pub fn new(config: &'a DatasetConfig) -> Self {
        Self { config }
    }

    /// Tiles come from `store`, cropped around the station center, or around a
    /// per-observation offset when random jitter is enabled
    pub fn assemble(
        &self,
        splits: &PreparedSplits,
        mode: Mode,
        store: &mut TileStore,
        with_labels: bool,
    ) -> Result<SampleStream> {
        let split = splits.get(mode)?;
        let index = split.index();
        let names = index.unique_names();
        let kinds = self.map_variables(mode);
        debug!("Assembling {} stream over {} samples", mode, index.len());

        let tiles: TileSourceRef = if self.config.pipeline.random_idx && mode != Mode::Custom {
            let offsets: Vec<PixelOffset> = split
                .table()
                .rows()
                .iter()
                .map(|r| r.offset.unwrap_or_default())
                .collect();
            Arc::new(TileCropSource::uncentered(
                store.load_large(&kinds, &names)?,
                index,
                offsets,
                store.crop_size(),
            )?)
        } else {
            Arc::new(TileCropSource::centered(store.load(&kinds, &names)?, index))
        };

        let features: VectorSourceRef = Arc::new(FeatureSource::new(
            "features",
            split.table_ref(),
            split.input_projection().to_vec(),
        ));

        let stats = if self.config.pipeline.standardize {
            let standardization = splits.standardization().ok_or_else(|| {
                DatasetError::MissingData("Standardization statistics".to_string())
            })?;
            let mean: StatsSourceRef =
                Arc::new(BroadcastSource::new("mean", &standardization.mean, split.len()));
            let std: StatsSourceRef =
                Arc::new(BroadcastSource::new("std", &standardization.std, split.len()));
            Some((mean, std))
        } else {
            None
        };

        let labels = match (with_labels, split.label_projection()) {
            (true, Some(projection)) => {
                let labels: VectorSourceRef = Arc::new(FeatureSource::new(
                    "labels",
                    split.table_ref(),
                    projection.to_vec(),
                ));
                Some(labels)
            }
            (true, None) => {
                return Err(DatasetError::MissingData(format!("Labels for mode {}", mode)))
            }
            (false, _) => None,
        };

        SampleStream::new(split.len(), tiles, features, stats, labels)
    }

    /// Custom data carries a single topography channel
    fn map_variables(&self, mode: Mode) -> Vec<TerrainKind> {
        match mode {
            Mode::Custom => vec![TerrainKind::Topos],
            _ => self.config.features.map_variables.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Observation, ObservationTable, Tile};
    use crate::pipeline::source::Projection;
    use chrono::NaiveDate;
    use std::collections::HashMap;

    struct ShortSource;

    impl SampleSource for ShortSource {
        type Item = Vec<f32>;

        fn name(&self) -> &str {
            "short"
        }

        fn len(&self) -> usize {
            1
        }

        fn get(&self, _position: usize) -> Result<Vec<f32>> {
            Ok(vec![0.0])
        }
    }

    fn sources() -> (usize, TileSourceRef, VectorSourceRef, VectorSourceRef) {
        let ts = NaiveDate::from_ymd_opt(2020, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let table = Arc::new(
            ObservationTable::new(
                vec!["Wind".to_string(), "vw10m(m/s)".to_string()],
                vec![
                    Observation::new("A".to_string(), ts, vec![1.0, 10.0]),
                    Observation::new("B".to_string(), ts, vec![2.0, 20.0]),
                    Observation::new("A".to_string(), ts, vec![3.0, 30.0]),
                ],
            )
            .unwrap(),
        );
        let index = crate::models::SampleIndex::from_table(&table);

        let mut tiles = HashMap::new();
        for (name, fill) in [("A", 1.0), ("B", 2.0)] {
            let tile = Tile::from_grid(name.to_string(), 2, 2, vec![fill; 4], vec![0.0; 2], vec![0.0; 2]).unwrap();
            tiles.insert(name.to_string(), Arc::new(tile));
        }

        let tiles: TileSourceRef = Arc::new(TileCropSource::centered(tiles, &index));
        let features: VectorSourceRef =
            Arc::new(FeatureSource::new("features", table.clone(), vec![Projection::Column(0)]));
        let labels: VectorSourceRef =
            Arc::new(FeatureSource::new("labels", table, vec![Projection::Column(1)]));
        (index.len(), tiles, features, labels)
    }

    #[test]
    fn test_join_is_positionally_aligned() {
        let (len, tiles, features, labels) = sources();
        let mean: StatsSourceRef = Arc::new(BroadcastSource::new("mean", &[2.0], len));
        let std: StatsSourceRef = Arc::new(BroadcastSource::new("std", &[1.0], len));

        let stream = SampleStream::new(len, tiles, features, Some((mean, std)), Some(labels)).unwrap();
        let samples: Vec<Sample> = stream.iter().collect::<Result<_>>().unwrap();

        assert_eq!(samples.len(), 3);
        let fills: Vec<f32> = samples.iter().map(|s| s.tile[[0, 0, 0]]).collect();
        assert_eq!(fills, vec![1.0, 2.0, 1.0]);
        assert_eq!(samples[1].features, vec![2.0]);
        assert_eq!(samples[2].label, Some(vec![30.0]));
        assert_eq!(&*samples[0].stats.as_ref().unwrap().0, &[2.0]);
    }

    #[test]
    fn test_stream_is_restartable() {
        let (len, tiles, features, _) = sources();
        let stream = SampleStream::new(len, tiles, features, None, None).unwrap();

        let first: Vec<Sample> = stream.iter().collect::<Result<_>>().unwrap();
        let second: Vec<Sample> = (&stream).into_iter().collect::<Result<_>>().unwrap();
        assert_eq!(first, second);
        assert!(first.iter().all(|s| s.stats.is_none() && s.label.is_none()));
        assert_eq!(stream.iter().len(), 3);
    }

    #[test]
    fn test_length_mismatch_fails() {
        let (len, tiles, features, _) = sources();
        let labels: VectorSourceRef = Arc::new(ShortSource);

        let result = SampleStream::new(len, tiles, features, None, Some(labels));
        assert!(matches!(
            result,
            Err(DatasetError::LengthMismatch { ref source_name, expected: 3, actual: 1 }) if source_name == "short"
        ));
    }
}
