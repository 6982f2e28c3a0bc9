//! Dense feature matrix with column-wise median imputation

use tracing::warn;

use crate::errors::{CoreError, Result};
use crate::pairs::FeatureVector;
use crate::records::RecordId;

/// Row-major feature matrix for a fixed, named column order
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<f64>>,
    /// (donor id, recipient id) per row
    pub ids: Vec<(RecordId, RecordId)>,
}

impl FeatureMatrix {
    /// Select `columns` from each pair, preserving pair order.
    pub fn from_pairs<S: AsRef<str>>(pairs: &[FeatureVector], columns: &[S]) -> Result<Self> {
        let mut rows = Vec::with_capacity(pairs.len());
        for pair in pairs {
            let row = columns
                .iter()
                .map(|column| {
                    pair.get(column.as_ref())
                        .ok_or_else(|| CoreError::UnknownFeature(column.as_ref().to_string()))
                })
                .collect::<Result<Vec<f64>>>()?;
            rows.push(row);
        }

        Ok(Self {
            columns: columns.iter().map(|c| c.as_ref().to_string()).collect(),
            rows,
            ids: pairs.iter().map(|p| (p.donor_id, p.recipient_id)).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn n_features(&self) -> usize {
        self.columns.len()
    }

    /// Median of the finite values in each column; `None` for columns with none.
    pub fn column_medians(&self) -> Vec<Option<f64>> {
        (0..self.n_features())
            .map(|col| {
                let values: Vec<f64> = self
                    .rows
                    .iter()
                    .map(|row| row[col])
                    .filter(|v| !v.is_nan())
                    .collect();
                median(values)
            })
            .collect()
    }

    /// Replace missing values with the median computed from this matrix.
    ///
    /// Columns without any values are filled with 0. Returns the medians used.
    pub fn impute_medians(&mut self) -> Vec<f64> {
        let medians: Vec<f64> = self
            .column_medians()
            .into_iter()
            .enumerate()
            .map(|(col, median)| {
                median.unwrap_or_else(|| {
                    warn!("Column '{}' has no values, imputing 0", self.columns[col]);
                    0.0
                })
            })
            .collect();
        self.fill_missing(&medians);
        medians
    }

    /// Replace missing values with externally supplied medians.
    pub fn impute_with(&mut self, medians: &[f64]) -> Result<()> {
        if medians.len() != self.n_features() {
            return Err(CoreError::ValidationFailed(format!(
                "expected {} medians, got {}",
                self.n_features(),
                medians.len()
            )));
        }
        self.fill_missing(medians);
        Ok(())
    }

    fn fill_missing(&mut self, medians: &[f64]) {
        for row in &mut self.rows {
            for (value, fill) in row.iter_mut().zip(medians) {
                if value.is_nan() {
                    *value = *fill;
                }
            }
        }
    }
}

fn median(mut values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}
