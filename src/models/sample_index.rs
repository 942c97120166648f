use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::models::ObservationTable;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SampleKey {
    pub station: String,
    /// Row position in the split's table
    pub row: usize,
}

/// Ordered (station, row) sequence every source of a split is aligned on
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleIndex {
    keys: Vec<SampleKey>,
}

impl SampleIndex {
    pub fn from_table(table: &ObservationTable) -> Self {
        Self {
            keys: table
                .rows()
                .iter()
                .enumerate()
                .map(|(row, obs)| SampleKey {
                    station: obs.name.clone(),
                    row,
                })
                .collect(),
        }
    }

    pub fn keys(&self) -> &[SampleKey] {
        &self.keys
    }

    pub fn get(&self, position: usize) -> Option<&SampleKey> {
        self.keys.get(position)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Station name at every position
    pub fn names(&self) -> Vec<String> {
        self.keys.iter().map(|k| k.station.clone()).collect()
    }

    /// Station names in order of first appearance
    pub fn unique_names(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.keys
            .iter()
            .filter(|k| seen.insert(k.station.as_str()))
            .map(|k| k.station.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Observation;
    use chrono::NaiveDate;

    #[test]
    fn test_index_follows_table_order() {
        let ts = NaiveDate::from_ymd_opt(2020, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let table = ObservationTable::new(
            vec![],
            ["B", "A", "B"]
                .iter()
                .map(|n| Observation::new(n.to_string(), ts, vec![]))
                .collect(),
        )
        .unwrap();

        let index = SampleIndex::from_table(&table);
        assert_eq!(index.len(), 3);
        assert_eq!(index.get(2), Some(&SampleKey { station: "B".to_string(), row: 2 }));
        assert_eq!(index.names(), vec!["B", "A", "B"]);
        assert_eq!(index.unique_names(), vec!["B", "A"]);
    }
}
