use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::{DatasetError, Result};
use crate::models::Mode;

/// Which partition a station ended up in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StationRole {
    Mode(Mode),
    Rejected,
}

impl StationRole {
    pub fn label(&self) -> &'static str {
        match self {
            StationRole::Mode(mode) => mode.display_name(),
            StationRole::Rejected => "rejected",
        }
    }
}

/// Authoritative station-name partition produced by one preparation call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SplitAssignment {
    pub train: BTreeSet<String>,
    pub test: BTreeSet<String>,
    pub val: BTreeSet<String>,
    pub other_countries: BTreeSet<String>,
    pub rejected: BTreeSet<String>,
    #[serde(default)]
    pub custom: BTreeSet<String>,
}

impl SplitAssignment {
    /// Role of `name`. Explicit sets win in the order custom, other countries, train,
    /// val, test; anything else is rejected.
    pub fn role_of(&self, name: &str) -> StationRole {
        if self.custom.contains(name) {
            StationRole::Mode(Mode::Custom)
        } else if self.other_countries.contains(name) {
            StationRole::Mode(Mode::OtherCountries)
        } else if self.train.contains(name) {
            StationRole::Mode(Mode::Train)
        } else if self.val.contains(name) {
            StationRole::Mode(Mode::Val)
        } else if self.test.contains(name) {
            StationRole::Mode(Mode::Test)
        } else {
            StationRole::Rejected
        }
    }

    /// Display label for `name`, as written next to tables grouped by assignment
    pub fn mode_of(&self, name: &str) -> &'static str {
        self.role_of(name).label()
    }

    pub fn stations(&self, mode: Mode) -> &BTreeSet<String> {
        match mode {
            Mode::Train => &self.train,
            Mode::Test => &self.test,
            Mode::Val => &self.val,
            Mode::OtherCountries => &self.other_countries,
            Mode::Custom => &self.custom,
        }
    }

    fn named_sets(&self) -> [(&'static str, &BTreeSet<String>); 6] {
        [
            ("train", &self.train),
            ("test", &self.test),
            ("val", &self.val),
            ("other_countries", &self.other_countries),
            ("rejected", &self.rejected),
            ("custom", &self.custom),
        ]
    }

    /// Check the sets are pairwise disjoint and cover exactly `universe`
    pub fn validate_partition<'a, I>(&self, universe: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let sets = self.named_sets();
        for (i, (name_a, a)) in sets.iter().enumerate() {
            for (name_b, b) in sets.iter().skip(i + 1) {
                if let Some(station) = a.intersection(b).next() {
                    return Err(DatasetError::InvalidFormat(format!(
                        "Station '{}' assigned to both {} and {}",
                        station, name_a, name_b
                    )));
                }
            }
        }

        let universe: BTreeSet<&str> = universe.into_iter().collect();
        let covered: BTreeSet<&str> = sets
            .iter()
            .flat_map(|(_, set)| set.iter().map(String::as_str))
            .collect();

        if let Some(station) = universe.difference(&covered).next() {
            return Err(DatasetError::MissingData(format!(
                "Station '{}' is not assigned to any split",
                station
            )));
        }
        if let Some(station) = covered.difference(&universe).next() {
            return Err(DatasetError::InvalidFormat(format!(
                "Assigned station '{}' is not a known station",
                station
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn assignment() -> SplitAssignment {
        SplitAssignment {
            train: set(&["A", "B"]),
            test: set(&["C"]),
            val: set(&["D"]),
            other_countries: set(&["E"]),
            rejected: set(&["F"]),
            custom: BTreeSet::new(),
        }
    }

    #[test]
    fn test_mode_labels() {
        let assignment = assignment();
        assert_eq!(assignment.mode_of("A"), "Training");
        assert_eq!(assignment.mode_of("C"), "Test");
        assert_eq!(assignment.mode_of("D"), "Validation");
        assert_eq!(assignment.mode_of("E"), "other_countries");
        assert_eq!(assignment.mode_of("F"), "rejected");
        assert_eq!(assignment.mode_of("unknown"), "rejected");
    }

    #[test]
    fn test_overlapping_sets_resolve_to_training() {
        let mut assignment = assignment();
        assignment.test.insert("A".to_string());
        assignment.val.insert("A".to_string());
        assert_eq!(assignment.mode_of("A"), "Training");

        assignment.train.insert("E".to_string());
        assert_eq!(assignment.mode_of("E"), "other_countries");

        assignment.val.insert("C".to_string());
        assert_eq!(assignment.mode_of("C"), "Validation");
    }

    #[test]
    fn test_valid_partition() {
        let assignment = assignment();
        assert!(assignment
            .validate_partition(["A", "B", "C", "D", "E", "F"])
            .is_ok());
    }

    #[test]
    fn test_overlap_detected() {
        let mut assignment = assignment();
        assignment.test.insert("A".to_string());
        assert!(assignment
            .validate_partition(["A", "B", "C", "D", "E", "F"])
            .is_err());
    }

    #[test]
    fn test_uncovered_station_detected() {
        let assignment = assignment();
        assert!(assignment
            .validate_partition(["A", "B", "C", "D", "E", "F", "G"])
            .is_err());
    }
}
