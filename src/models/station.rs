use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use validator::Validate;

use crate::error::{DatasetError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Station {
    #[validate(length(min = 1))]
    pub name: String,

    pub country: String,

    /// Static geophysical descriptors (elevation, coordinates, topographic indices),
    /// plus any aggregate metric attached during selection
    pub attributes: BTreeMap<String, f64>,
}

impl Station {
    pub fn new(name: String, country: String, attributes: BTreeMap<String, f64>) -> Self {
        Self {
            name,
            country,
            attributes,
        }
    }

    /// Attribute value, NaN when the station does not carry it
    pub fn attribute(&self, key: &str) -> f64 {
        self.attributes.get(key).copied().unwrap_or(f64::NAN)
    }
}

/// Elevation band label used when reporting results by altitude
pub fn elevation_category(alti: f64) -> Option<&'static str> {
    const BANDS: [(f64, f64, &str); 4] = [
        (0.0, 1000.0, "0m <= Station elevation < 1000m"),
        (1000.0, 2000.0, "1000m <= Station elevation < 2000m"),
        (2000.0, 3000.0, "2000m <= Station elevation < 3000m"),
        (3000.0, 5000.0, "3000m <= Station elevation < 5000m"),
    ];

    BANDS
        .iter()
        .find(|(min, max, _)| (*min..*max).contains(&alti))
        .map(|(_, _, label)| *label)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StationTable {
    stations: Vec<Station>,
}

impl StationTable {
    pub fn new(stations: Vec<Station>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(stations.len());
        for station in &stations {
            station.validate()?;
            if !seen.insert(station.name.as_str()) {
                return Err(DatasetError::InvalidFormat(format!(
                    "Duplicate station name: '{}'",
                    station.name
                )));
            }
        }
        Ok(Self { stations })
    }

    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Station> {
        self.stations.iter().find(|s| s.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> Vec<String> {
        self.stations.iter().map(|s| s.name.clone()).collect()
    }

    pub fn country_of(&self) -> HashMap<&str, &str> {
        self.stations
            .iter()
            .map(|s| (s.name.as_str(), s.country.as_str()))
            .collect()
    }

    pub fn exclude<S: AsRef<str>>(&self, names: &[S]) -> Self {
        let names: HashSet<&str> = names.iter().map(|n| n.as_ref()).collect();
        Self {
            stations: self
                .stations
                .iter()
                .filter(|s| !names.contains(s.name.as_str()))
                .cloned()
                .collect(),
        }
    }

    /// Names of the stations located in one of `countries`
    pub fn names_in_countries<S: AsRef<str>>(&self, countries: &[S]) -> Vec<String> {
        self.stations
            .iter()
            .filter(|s| countries.iter().any(|c| c.as_ref() == s.country))
            .map(|s| s.name.clone())
            .collect()
    }

    /// Attach a per-station value under `key`. Stations missing from `values` get NaN.
    pub fn with_attribute(mut self, key: &str, values: &HashMap<String, f64>) -> Self {
        for station in &mut self.stations {
            let value = values.get(&station.name).copied().unwrap_or(f64::NAN);
            station.attributes.insert(key.to_string(), value);
        }
        self
    }
}
