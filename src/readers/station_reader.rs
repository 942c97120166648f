use crate::error::{DatasetError, Result};
use crate::models::{Station, StationTable};
use crate::utils::constants::{COUNTRY_COLUMN, NAME_COLUMN};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

/// Reads the station table: one row per station, `name` and `country` columns plus
/// any number of numeric attribute columns
pub struct StationReader {
    delimiter: u8,
}

impl StationReader {
    pub fn new() -> Self {
        Self { delimiter: b',' }
    }

    pub fn with_delimiter(delimiter: u8) -> Self {
        Self { delimiter }
    }

    pub fn read_stations(&self, path: &Path) -> Result<StationTable> {
        let file = std::fs::File::open(path)?;
        self.read_from(file)
    }

    pub fn read_from<R: Read>(&self, reader: R) -> Result<StationTable> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = csv_reader.headers()?.clone();
        let name_idx = Self::header_index(&headers, NAME_COLUMN)?;
        let country_idx = Self::header_index(&headers, COUNTRY_COLUMN)?;

        let mut stations = Vec::new();
        for record in csv_reader.records() {
            let record = record?;

            let name = record.get(name_idx).unwrap_or_default().to_string();
            let country = record.get(country_idx).unwrap_or_default().to_string();

            let mut attributes = BTreeMap::new();
            for (idx, header) in headers.iter().enumerate() {
                if idx == name_idx || idx == country_idx {
                    continue;
                }
                let raw = record.get(idx).unwrap_or_default();
                attributes.insert(header.to_string(), Self::parse_value(raw, header, &name)?);
            }

            stations.push(Station::new(name, country, attributes));
        }

        StationTable::new(stations)
    }

    fn header_index(headers: &csv::StringRecord, column: &str) -> Result<usize> {
        headers
            .iter()
            .position(|h| h == column)
            .ok_or_else(|| DatasetError::UnknownColumn(column.to_string()))
    }

    /// Empty cells and "NaN" become NaN
    fn parse_value(raw: &str, column: &str, station: &str) -> Result<f64> {
        if raw.is_empty() || raw.eq_ignore_ascii_case("nan") {
            return Ok(f64::NAN);
        }
        raw.parse::<f64>().map_err(|_| {
            DatasetError::InvalidFormat(format!(
                "Invalid value '{}' in column '{}' for station '{}'",
                raw, column, station
            ))
        })
    }
}

impl Default for StationReader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_read_stations_file() -> Result<()> {
        let mut temp_file = NamedTempFile::new()?;
        writeln!(temp_file, "name,country,alti,tpi_500_NN_0,X,Y")?;
        writeln!(temp_file, "Col du Lac Blanc,france,2720,35.2,945000,6460000")?;
        writeln!(temp_file, "WFJ, switzerland , 2691, ,780000,189000")?;

        let reader = StationReader::new();
        let stations = reader.read_stations(temp_file.path())?;

        assert_eq!(stations.len(), 2);
        let lac_blanc = stations.get("Col du Lac Blanc").unwrap();
        assert_eq!(lac_blanc.country, "france");
        assert_eq!(lac_blanc.attribute("alti"), 2720.0);

        let wfj = stations.get("WFJ").unwrap();
        assert_eq!(wfj.country, "switzerland");
        assert!(wfj.attribute("tpi_500_NN_0").is_nan());
        assert_eq!(wfj.attribute("Y"), 189000.0);

        Ok(())
    }

    #[test]
    fn test_missing_name_column() {
        let data = "station,country\nA,france\n";
        let result = StationReader::new().read_from(data.as_bytes());
        assert!(matches!(result, Err(DatasetError::UnknownColumn(_))));
    }

    #[test]
    fn test_invalid_number() {
        let data = "name,country,alti\nA,france,high\n";
        let result = StationReader::new().read_from(data.as_bytes());
        assert!(matches!(result, Err(DatasetError::InvalidFormat(_))));
    }
}
