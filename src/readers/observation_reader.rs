use crate::error::{DatasetError, Result};
use crate::models::{Observation, ObservationTable};
use crate::utils::constants::{DATE_COLUMN, NAME_COLUMN};
use arrow::array::{Array, ArrayRef, Float64Array, StringArray, TimestampSecondArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, NaiveDateTime};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use std::fs::File;
use std::path::Path;

/// Reads the timestamp-indexed observation table from Parquet.
///
/// Expects a `name` string column, a `date` column (Date32 or any timestamp) and numeric
/// feature/label columns. Numeric columns are widened to f64; nulls become NaN.
pub struct ObservationReader {
    batch_size: usize,
    columns: Option<Vec<String>>,
}

impl ObservationReader {
    pub fn new() -> Self {
        Self {
            batch_size: 8192,
            columns: None,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Only read these numeric columns, in this order
    pub fn with_columns(mut self, columns: Vec<String>) -> Self {
        self.columns = Some(columns);
        self
    }

    pub fn read_observations(&self, path: &Path) -> Result<ObservationTable> {
        let file = File::open(path)?;
        let parquet_reader = ParquetRecordBatchReaderBuilder::try_new(file)?
            .with_batch_size(self.batch_size)
            .build()?;

        let mut columns: Option<Vec<String>> = None;
        let mut rows = Vec::new();

        for batch_result in parquet_reader {
            let batch = batch_result?;
            let batch_columns = self.feature_columns(&batch)?;

            match &columns {
                Some(existing) if *existing != batch_columns => {
                    return Err(DatasetError::InvalidFormat(
                        "Observation batches disagree on their columns".to_string(),
                    ))
                }
                Some(_) => {}
                None => columns = Some(batch_columns.clone()),
            }

            rows.extend(Self::batch_rows(&batch, &batch_columns)?);
        }

        ObservationTable::new(columns.unwrap_or_default(), rows)
    }

    fn feature_columns(&self, batch: &RecordBatch) -> Result<Vec<String>> {
        let schema = batch.schema();

        if let Some(requested) = &self.columns {
            for column in requested {
                if schema.column_with_name(column).is_none() {
                    return Err(DatasetError::UnknownColumn(column.clone()));
                }
            }
            return Ok(requested.clone());
        }

        Ok(schema
            .fields()
            .iter()
            .filter(|f| f.name() != NAME_COLUMN && f.name() != DATE_COLUMN)
            .filter(|f| f.data_type().is_numeric())
            .map(|f| f.name().clone())
            .collect())
    }

    fn batch_rows(batch: &RecordBatch, columns: &[String]) -> Result<Vec<Observation>> {
        let names = cast(Self::column(batch, NAME_COLUMN)?, &DataType::Utf8)?;
        let names = downcast::<StringArray>(&names, NAME_COLUMN)?;

        let dates = cast(
            Self::column(batch, DATE_COLUMN)?,
            &DataType::Timestamp(TimeUnit::Second, None),
        )?;
        let dates = downcast::<TimestampSecondArray>(&dates, DATE_COLUMN)?;

        let values = columns
            .iter()
            .map(|c| Ok(cast(Self::column(batch, c)?, &DataType::Float64)?))
            .collect::<Result<Vec<ArrayRef>>>()?;
        let values = values
            .iter()
            .zip(columns)
            .map(|(array, c)| downcast::<Float64Array>(array, c))
            .collect::<Result<Vec<_>>>()?;

        let mut rows = Vec::with_capacity(batch.num_rows());
        for i in 0..batch.num_rows() {
            if names.is_null(i) || dates.is_null(i) {
                return Err(DatasetError::MissingData(format!(
                    "Observation row {} has no station name or date",
                    i
                )));
            }

            let row_values = values
                .iter()
                .map(|array| {
                    if array.is_null(i) {
                        f64::NAN
                    } else {
                        array.value(i)
                    }
                })
                .collect();

            rows.push(Observation::new(
                names.value(i).to_string(),
                to_datetime(dates.value(i))?,
                row_values,
            ));
        }

        Ok(rows)
    }

    fn column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a ArrayRef> {
        batch
            .column_by_name(name)
            .ok_or_else(|| DatasetError::UnknownColumn(name.to_string()))
    }
}

impl Default for ObservationReader {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn downcast<'a, T: 'static>(array: &'a ArrayRef, column: &str) -> Result<&'a T> {
    array.as_any().downcast_ref::<T>().ok_or_else(|| {
        DatasetError::InvalidFormat(format!("Invalid {} column type", column))
    })
}

fn to_datetime(seconds: i64) -> Result<NaiveDateTime> {
    DateTime::from_timestamp(seconds, 0)
        .map(|dt| dt.naive_utc())
        .ok_or_else(|| DatasetError::InvalidFormat(format!("Timestamp out of range: {}", seconds)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Date32Array, Float32Array};
    use arrow::datatypes::{Field, Schema};
    use parquet::arrow::ArrowWriter;
    use std::sync::Arc;
    use tempfile::NamedTempFile;

    fn write_fixture() -> NamedTempFile {
        let schema = Arc::new(Schema::new(vec![
            Field::new("name", DataType::Utf8, false),
            Field::new("date", DataType::Date32, false),
            Field::new("Wind", DataType::Float32, true),
            Field::new("alti", DataType::Float64, false),
        ]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(StringArray::from(vec!["A", "B"])),
                // 2019-06-01 and 2021-01-01 as days since epoch
                Arc::new(Date32Array::from(vec![18048, 18628])),
                Arc::new(Float32Array::from(vec![Some(3.5), None])),
                Arc::new(Float64Array::from(vec![1500.0, 900.0])),
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
    fn test_read_observations() {
        let file = write_fixture();
        let table = ObservationReader::new()
            .read_observations(file.path())
            .unwrap();

        assert_eq!(table.columns(), &["Wind".to_string(), "alti".to_string()]);
        assert_eq!(table.len(), 2);

        let first = &table.rows()[0];
        assert_eq!(first.name, "A");
        assert_eq!(first.timestamp.date().to_string(), "2019-06-01");
        assert_eq!(first.values, vec![3.5, 1500.0]);

        assert!(table.rows()[1].values[0].is_nan());
    }

    #[test]
    fn test_requested_columns() {
        let file = write_fixture();
        let table = ObservationReader::new()
            .with_columns(vec!["alti".to_string()])
            .read_observations(file.path())
            .unwrap();
        assert_eq!(table.columns(), &["alti".to_string()]);
        assert_eq!(table.rows()[1].values, vec![900.0]);

        let missing = ObservationReader::new()
            .with_columns(vec!["Tair".to_string()])
            .read_observations(file.path());
        assert!(matches!(missing, Err(DatasetError::UnknownColumn(_))));
    }
}
