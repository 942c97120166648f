use crate::error::{DatasetError, Result};
use crate::models::PredictionTable;
use crate::processors::SplitData;
use crate::utils::constants::{DATE_COLUMN, DEFAULT_ROW_GROUP_SIZE, MODE_COLUMN, NAME_COLUMN};
use arrow::array::{ArrayRef, Float64Array, StringArray, TimestampSecondArray};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, GzipLevel, ZstdLevel};
use parquet::file::properties::WriterProperties;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

pub struct ParquetWriter {
    compression: Compression,
    row_group_size: usize,
}

impl ParquetWriter {
    pub fn new() -> Self {
        Self {
            compression: Compression::SNAPPY,
            row_group_size: DEFAULT_ROW_GROUP_SIZE,
        }
    }

    pub fn with_compression(mut self, compression: &str) -> Result<Self> {
        self.compression = match compression.to_lowercase().as_str() {
            "snappy" => Compression::SNAPPY,
            "gzip" => Compression::GZIP(GzipLevel::default()),
            "lz4" => Compression::LZ4,
            "zstd" => Compression::ZSTD(ZstdLevel::default()),
            "none" => Compression::UNCOMPRESSED,
            _ => {
                return Err(DatasetError::Config(format!(
                    "Unsupported compression: {}",
                    compression
                )))
            }
        };
        Ok(self)
    }

    pub fn with_row_group_size(mut self, size: usize) -> Self {
        self.row_group_size = size.max(1);
        self
    }

    /// Write the rows of one split with a `mode` column; the file reads back through
    /// `ObservationReader`
    pub fn write_split(&self, split: &SplitData, path: &Path) -> Result<()> {
        let table = split.table();
        let rows = table.rows();

        let mut fields = vec![
            Field::new(NAME_COLUMN, DataType::Utf8, false),
            Field::new(DATE_COLUMN, DataType::Timestamp(TimeUnit::Second, None), false),
        ];
        fields.extend(
            table
                .columns()
                .iter()
                .map(|c| Field::new(c, DataType::Float64, true)),
        );
        fields.push(Field::new(MODE_COLUMN, DataType::Utf8, false));
        let schema = Arc::new(Schema::new(fields));

        let mut arrays: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.name.as_str()))),
            Arc::new(TimestampSecondArray::from_iter_values(
                rows.iter().map(|r| r.timestamp.and_utc().timestamp()),
            )),
        ];
        for i in 0..table.columns().len() {
            let values = rows.iter().map(|r| {
                let v = r.values[i];
                (!v.is_nan()).then_some(v)
            });
            arrays.push(Arc::new(Float64Array::from_iter(values)));
        }
        arrays.push(Arc::new(StringArray::from_iter_values(
            rows.iter().map(|_| split.mode().as_str()),
        )));

        let batch = RecordBatch::try_new(schema.clone(), arrays)?;
        self.write_batch(batch, path)?;
        debug!("Wrote {} {} rows to {}", rows.len(), split.mode(), path.display());
        Ok(())
    }

    pub fn write_predictions(&self, predictions: &PredictionTable, path: &Path) -> Result<()> {
        let schema = Arc::new(Schema::new(vec![
            Field::new(NAME_COLUMN, DataType::Utf8, false),
            Field::new(&predictions.column, DataType::Float64, false),
        ]));

        let names = StringArray::from_iter_values(predictions.rows.iter().map(|r| r.name.as_str()));
        let values = Float64Array::from_iter_values(predictions.rows.iter().map(|r| r.value));
        let batch = RecordBatch::try_new(schema, vec![Arc::new(names), Arc::new(values)])?;
        self.write_batch(batch, path)
    }

    fn write_batch(&self, batch: RecordBatch, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        let props = WriterProperties::builder()
            .set_compression(self.compression)
            .set_max_row_group_size(self.row_group_size)
            .build();

        let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
        writer.write(&batch)?;
        writer.close()?;
        Ok(())
    }

    pub fn get_file_info(&self, path: &Path) -> Result<ParquetFileInfo> {
        use parquet::file::reader::{FileReader, SerializedFileReader};

        let file = File::open(path)?;
        let file_size = file.metadata()?.len();
        let reader = SerializedFileReader::new(file)?;
        let metadata = reader.metadata();

        Ok(ParquetFileInfo {
            total_rows: metadata.file_metadata().num_rows(),
            row_groups: metadata.num_row_groups(),
            file_size,
        })
    }
}

impl Default for ParquetWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParquetFileInfo {
    pub total_rows: i64,
    pub row_groups: usize,
    pub file_size: u64,
}

impl ParquetFileInfo {
    pub fn summary(&self) -> String {
        format!(
            "Rows: {}, row groups: {}, size: {:.2} MB",
            self.total_rows,
            self.row_groups,
            self.file_size as f64 / (1024.0 * 1024.0)
        )
    }
}
