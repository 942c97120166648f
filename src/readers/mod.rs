pub mod observation_reader;
pub mod station_reader;
pub mod tile_reader;
pub mod tile_store;

pub use observation_reader::ObservationReader;
pub use station_reader::StationReader;
pub use tile_reader::{MemoryTileSource, ParquetTileReader, TileSource};
pub use tile_store::TileStore;
