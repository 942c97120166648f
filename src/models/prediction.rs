use serde::{Deserialize, Serialize};

use crate::error::{DatasetError, Result};

/// Raw model output for one split, one value (or component pair) per sample
#[derive(Debug, Clone, PartialEq)]
pub enum ModelOutput {
    Scalar(Vec<f32>),
    Components { u: Vec<f32>, v: Vec<f32> },
}

impl ModelOutput {
    pub fn len(&self) -> usize {
        match self {
            ModelOutput::Scalar(values) => values.len(),
            ModelOutput::Components { u, .. } => u.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Scalar values, or the speed `sqrt(u^2 + v^2)` for component outputs
    fn into_values(self) -> Result<Vec<f64>> {
        match self {
            ModelOutput::Scalar(values) => Ok(values.into_iter().map(f64::from).collect()),
            ModelOutput::Components { u, v } => {
                if u.len() != v.len() {
                    return Err(DatasetError::LengthMismatch {
                        source_name: "v component".to_string(),
                        expected: u.len(),
                        actual: v.len(),
                    });
                }
                Ok(u.iter()
                    .zip(&v)
                    .map(|(u, v)| f64::from(u.hypot(*v)))
                    .collect())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRow {
    pub name: String,
    pub value: f64,
}

/// Predictions aligned with a split's sample index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionTable {
    pub column: String,
    pub rows: Vec<PredictionRow>,
}

impl PredictionTable {
    /// Pair each output with the station name at the same sample position
    pub fn from_output(output: ModelOutput, names: &[String], column: &str) -> Result<Self> {
        if output.len() != names.len() {
            return Err(DatasetError::LengthMismatch {
                source_name: "predictions".to_string(),
                expected: names.len(),
                actual: output.len(),
            });
        }

        let rows = names
            .iter()
            .cloned()
            .zip(output.into_values()?)
            .map(|(name, value)| PredictionRow { name, value })
            .collect();

        Ok(Self {
            column: column.to_string(),
            rows,
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_components_become_speed() {
        let names = vec!["A".to_string(), "B".to_string()];
        let output = ModelOutput::Components {
            u: vec![3.0, 0.0],
            v: vec![4.0, 2.0],
        };
        let table = PredictionTable::from_output(output, &names, "UV_nn").unwrap();

        assert_eq!(table.column, "UV_nn");
        assert_eq!(table.rows[0].name, "A");
        assert!((table.rows[0].value - 5.0).abs() < 1e-6);
        assert!((table.rows[1].value - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let names = vec!["A".to_string()];
        let output = ModelOutput::Scalar(vec![1.0, 2.0]);
        assert!(matches!(
            PredictionTable::from_output(output, &names, "UV_nn"),
            Err(DatasetError::LengthMismatch { .. })
        ));
    }
}
