use chrono::{Datelike, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

use crate::error::{DatasetError, Result};

/// Per-observation jitter of the crop window, in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PixelOffset {
    pub dx: i32,
    pub dy: i32,
}

impl PixelOffset {
    pub fn new(dx: i32, dy: i32) -> Self {
        Self { dx, dy }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub name: String,
    pub timestamp: NaiveDateTime,
    /// One value per table column, NaN when missing
    pub values: Vec<f64>,
    pub country: Option<String>,
    pub offset: Option<PixelOffset>,
}

impl Observation {
    pub fn new(name: String, timestamp: NaiveDateTime, values: Vec<f64>) -> Self {
        Self {
            name,
            timestamp,
            values,
            country: None,
            offset: None,
        }
    }

    pub fn month(&self) -> u32 {
        self.timestamp.month()
    }

    pub fn hour(&self) -> u32 {
        self.timestamp.hour()
    }
}

/// Row-major observation table. Every row holds exactly `columns.len()` values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObservationTable {
    columns: Vec<String>,
    rows: Vec<Observation>,
}

impl ObservationTable {
    pub fn new(columns: Vec<String>, rows: Vec<Observation>) -> Result<Self> {
        if let Some(row) = rows.iter().find(|r| r.values.len() != columns.len()) {
            return Err(DatasetError::InvalidFormat(format!(
                "Observation for '{}' at {} has {} values, table has {} columns",
                row.name,
                row.timestamp,
                row.values.len(),
                columns.len()
            )));
        }
        Ok(Self { columns, rows })
    }

    pub fn empty(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Observation] {
        &self.rows
    }

    pub fn rows_mut(&mut self) -> &mut [Observation] {
        &mut self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| DatasetError::UnknownColumn(name.to_string()))
    }

    /// Keep the rows matching `predicate`, preserving order
    pub fn filter<F>(&self, predicate: F) -> Self
    where
        F: Fn(&Observation) -> bool,
    {
        Self {
            columns: self.columns.clone(),
            rows: self.rows.iter().filter(|r| predicate(r)).cloned().collect(),
        }
    }

    /// Split into (matching, non-matching), preserving order on both sides
    pub fn partition<F>(&self, predicate: F) -> (Self, Self)
    where
        F: Fn(&Observation) -> bool,
    {
        let (yes, no): (Vec<Observation>, Vec<Observation>) =
            self.rows.iter().cloned().partition(|r| predicate(r));
        (
            Self {
                columns: self.columns.clone(),
                rows: yes,
            },
            Self {
                columns: self.columns.clone(),
                rows: no,
            },
        )
    }

    pub fn filter_stations(&self, names: &HashSet<&str>) -> Self {
        self.filter(|r| names.contains(r.name.as_str()))
    }

    pub fn exclude_stations(&self, names: &HashSet<&str>) -> Self {
        self.filter(|r| !names.contains(r.name.as_str()))
    }

    /// Rows picked by position, in the order given. Positions may repeat.
    pub fn take_positions(&self, positions: &[usize]) -> Result<Self> {
        let rows = positions
            .iter()
            .map(|&p| {
                self.rows.get(p).cloned().ok_or_else(|| {
                    DatasetError::MissingData(format!(
                        "Row {} out of range for table of {} rows",
                        p,
                        self.rows.len()
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            columns: self.columns.clone(),
            rows,
        })
    }

    /// Add (or overwrite) a column computed from each row
    pub fn with_column<F>(mut self, name: &str, compute: F) -> Self
    where
        F: Fn(&Observation) -> f64,
    {
        let existing = self.columns.iter().position(|c| c == name);
        match existing {
            Some(idx) => {
                for row in &mut self.rows {
                    let value = compute(row);
                    row.values[idx] = value;
                }
            }
            None => {
                self.columns.push(name.to_string());
                for row in &mut self.rows {
                    let value = compute(row);
                    row.values.push(value);
                }
            }
        }
        self
    }

    /// Project onto `names`, in that order
    pub fn select_columns(&self, names: &[String]) -> Result<Self> {
        let indices = names
            .iter()
            .map(|n| self.column_index(n))
            .collect::<Result<Vec<_>>>()?;

        let rows = self
            .rows
            .iter()
            .map(|r| Observation {
                values: indices.iter().map(|&i| r.values[i]).collect(),
                ..r.clone()
            })
            .collect();

        Ok(Self {
            columns: names.to_vec(),
            rows,
        })
    }

    /// Drop rows holding a NaN in any column
    pub fn drop_nan(&self) -> Self {
        self.filter(|r| r.values.iter().all(|v| !v.is_nan()))
    }

    /// Station names in order of first appearance
    pub fn unique_names(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.rows
            .iter()
            .filter(|r| seen.insert(r.name.as_str()))
            .map(|r| r.name.clone())
            .collect()
    }

    pub fn station_set(&self) -> BTreeSet<String> {
        self.rows.iter().map(|r| r.name.clone()).collect()
    }

    pub fn rows_for_station<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Observation> {
        self.rows.iter().filter(move |r| r.name == name)
    }

    pub fn append(&mut self, other: Self) -> Result<()> {
        if other.columns != self.columns {
            return Err(DatasetError::InvalidFormat(
                "Cannot append tables with different columns".to_string(),
            ));
        }
        self.rows.extend(other.rows);
        Ok(())
    }
}
