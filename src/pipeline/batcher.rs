use crate::config::{PipelineConfig, Prefetch};
use crate::error::{DatasetError, Result};
use crate::models::Mode;
use crate::pipeline::assembler::{Sample, SampleIter, SampleStream};
use crate::pipeline::prefetch::Prefetcher;
use ndarray::{stack, Array2, Array4, Axis};
use tracing::{debug, warn};

/// Samples stacked along a leading batch axis
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// `[B, H, W, C]`
    pub tiles: Array4<f32>,
    /// `[B, F]`
    pub features: Array2<f32>,
    /// `[B, F]` mean and std
    pub stats: Option<(Array2<f32>, Array2<f32>)>,
    /// `[B, L]`
    pub labels: Option<Array2<f32>>,
}

impl Batch {
    pub fn from_samples(samples: &[Sample]) -> Result<Self> {
        if samples.is_empty() {
            return Err(DatasetError::MissingData("Empty batch".to_string()));
        }

        let tile_views: Vec<_> = samples.iter().map(|s| s.tile.view()).collect();
        let tiles = stack(Axis(0), &tile_views)?;
        let features = rows_to_array(samples.iter().map(|s| s.features.as_slice()))?;

        let stats = if samples.iter().all(|s| s.stats.is_some()) {
            let mean = rows_to_array(samples.iter().filter_map(|s| s.stats.as_ref().map(|(m, _)| &**m)))?;
            let std = rows_to_array(samples.iter().filter_map(|s| s.stats.as_ref().map(|(_, s)| &**s)))?;
            Some((mean, std))
        } else {
            None
        };

        let labels = if samples.iter().all(|s| s.label.is_some()) {
            Some(rows_to_array(
                samples.iter().filter_map(|s| s.label.as_deref()),
            )?)
        } else {
            None
        };

        Ok(Self {
            tiles,
            features,
            stats,
            labels,
        })
    }

    pub fn len(&self) -> usize {
        self.tiles.dim().0
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn rows_to_array<'a, I>(rows: I) -> Result<Array2<f32>>
where
    I: Iterator<Item = &'a [f32]>,
{
    let mut n_rows = 0;
    let mut width = None;
    let mut flat = Vec::new();
    for row in rows {
        match width {
            None => width = Some(row.len()),
            Some(w) if w != row.len() => {
                return Err(DatasetError::LengthMismatch {
                    source_name: "batch row".to_string(),
                    expected: w,
                    actual: row.len(),
                })
            }
            Some(_) => {}
        }
        flat.extend_from_slice(row);
        n_rows += 1;
    }
    Ok(Array2::from_shape_vec((n_rows, width.unwrap_or(0)), flat)?)
}

/// Consecutive batches of `batch_size` samples; the last one may be short
pub struct BatchIter {
    samples: SampleIter,
    batch_size: usize,
}

impl BatchIter {
    pub fn new(stream: &SampleStream, batch_size: usize) -> Self {
        Self {
            samples: stream.iter(),
            batch_size: batch_size.max(1),
        }
    }
}

impl Iterator for BatchIter {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut samples = Vec::with_capacity(self.batch_size);
        for sample in self.samples.by_ref().take(self.batch_size) {
            match sample {
                Ok(sample) => samples.push(sample),
                Err(e) => return Some(Err(e)),
            }
        }
        if samples.is_empty() {
            return None;
        }
        Some(Batch::from_samples(&samples))
    }
}

pub enum Batches {
    Direct(BatchIter),
    Prefetched(Prefetcher<Result<Batch>>),
}

impl Iterator for Batches {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Batches::Direct(iter) => iter.next(),
            Batches::Prefetched(iter) => iter.next(),
        }
    }
}

/// Mode-specific batching of assembled streams
#[derive(Debug, Clone)]
pub struct Batcher {
    batch_size: usize,
    prefetch: Prefetch,
}

impl Batcher {
    pub fn new(batch_size: usize, prefetch: Prefetch) -> Self {
        Self {
            batch_size,
            prefetch,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.global_batch_size, config.prefetch)
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of batches a stream of `len` samples yields
    pub fn batch_count(&self, len: usize) -> usize {
        len.div_ceil(self.batch_size.max(1))
    }

    /// Batched and prefetched; rows are shuffled upstream of the stream
    pub fn batch_train(&self, stream: &SampleStream) -> Batches {
        let batches = BatchIter::new(stream, self.batch_size);
        match self.prefetch.depth() {
            0 => Batches::Direct(batches),
            depth => {
                debug!("Prefetching up to {} training batches", depth);
                Batches::Prefetched(Prefetcher::spawn(batches, depth))
            }
        }
    }

    pub fn batch_val(&self, stream: &SampleStream) -> Batches {
        Batches::Direct(BatchIter::new(stream, self.batch_size))
    }

    pub fn batch_test(&self, stream: &SampleStream) -> Batches {
        warn!("Usually test data are not batched");
        Batches::Direct(BatchIter::new(stream, self.batch_size))
    }

    pub fn batch(&self, mode: Mode, stream: &SampleStream) -> Batches {
        match mode {
            Mode::Train => self.batch_train(stream),
            Mode::Test => self.batch_test(stream),
            Mode::Val | Mode::OtherCountries | Mode::Custom => self.batch_val(stream),
        }
    }
}
