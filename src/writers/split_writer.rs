use crate::error::Result;
use crate::models::SplitAssignment;
use crate::processors::{ModeSummary, PreparedSplits, SelectedStations, Standardization};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Everything a preparation run decided, as written next to the split tables
#[derive(Debug, Clone, Serialize)]
pub struct SplitReport<'a> {
    pub summary: Vec<ModeSummary>,
    pub assignment: &'a SplitAssignment,
    pub standardization: Option<&'a Standardization>,
    pub selection: Option<&'a SelectedStations>,
}

impl<'a> SplitReport<'a> {
    pub fn from_splits(splits: &'a PreparedSplits) -> Self {
        Self {
            summary: splits.summary(),
            assignment: splits.assignment(),
            standardization: splits.standardization(),
            selection: splits.selection(),
        }
    }
}

/// Pretty-printed JSON output
pub struct SplitWriter {
    pretty: bool,
}

impl SplitWriter {
    pub fn new() -> Self {
        Self { pretty: true }
    }

    pub fn compact(mut self) -> Self {
        self.pretty = false;
        self
    }

    pub fn write_assignment(&self, assignment: &SplitAssignment, path: &Path) -> Result<()> {
        self.write_json(assignment, path)
    }

    pub fn write_report(&self, splits: &PreparedSplits, path: &Path) -> Result<()> {
        self.write_json(&SplitReport::from_splits(splits), path)
    }

    pub fn write_json<T: Serialize + ?Sized>(&self, value: &T, path: &Path) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.write_to(value, &mut writer)?;
        writer.flush()?;
        Ok(())
    }

    pub fn write_to<T: Serialize + ?Sized, W: Write>(&self, value: &T, writer: W) -> Result<()> {
        if self.pretty {
            serde_json::to_writer_pretty(writer, value)?;
        } else {
            serde_json::to_writer(writer, value)?;
        }
        Ok(())
    }
}

impl Default for SplitWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use tempfile::NamedTempFile;

    fn assignment() -> SplitAssignment {
        let set = |names: &[&str]| names.iter().map(|n| n.to_string()).collect::<BTreeSet<_>>();
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
    fn test_assignment_json_round_trip() -> Result<()> {
        let temp_file = NamedTempFile::new()?;
        SplitWriter::new().write_assignment(&assignment(), temp_file.path())?;

        let text = std::fs::read_to_string(temp_file.path())?;
        let parsed: SplitAssignment = serde_json::from_str(&text)?;
        assert_eq!(parsed, assignment());
        assert!(text.contains('\n'));
        Ok(())
    }

    #[test]
    fn test_compact_output() -> Result<()> {
        let mut buffer = Vec::new();
        SplitWriter::new().compact().write_to(&assignment(), &mut buffer)?;
        let text = String::from_utf8(buffer).unwrap_or_default();
        assert!(text.starts_with("{\"train\":[\"A\",\"B\"]"));
        assert!(!text.contains('\n'));
        Ok(())
    }
}
