pub mod parquet_writer;
pub mod split_writer;

pub use parquet_writer::{ParquetFileInfo, ParquetWriter};
pub use split_writer::{SplitReport, SplitWriter};
