pub mod assembler;
pub mod batcher;
pub mod prefetch;
pub mod source;

pub use assembler::{Sample, SampleIter, SampleStream, StreamAssembler};
pub use batcher::{Batch, BatchIter, Batcher, Batches};
pub use prefetch::Prefetcher;
pub use source::{BroadcastSource, CropMode, FeatureSource, Projection, SampleSource, TileCropSource};
