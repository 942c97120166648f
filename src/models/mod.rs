pub mod assignment;
pub mod mode;
pub mod observation;
pub mod prediction;
pub mod sample_index;
pub mod station;
pub mod tile;

pub use assignment::{SplitAssignment, StationRole};
pub use mode::{HoldoutMode, Mode, SplitStrategy, TerrainKind};
pub use observation::{Observation, ObservationTable, PixelOffset};
pub use prediction::{ModelOutput, PredictionRow, PredictionTable};
pub use sample_index::{SampleIndex, SampleKey};
pub use station::{elevation_category, Station, StationTable};
pub use tile::Tile;
