//! Time-indexed asset panels.
//!
//! A [`Panel`] is a row-major time × asset matrix of `f64` with `NaN` as the
//! missing-value marker. The index is kept sorted ascending so row lookup is a
//! binary search. Daily panels use `NaiveDate`, intraday panels use
//! `NaiveDateTime`.

use crate::domain::error::NeutronError;

#[derive(Debug, Clone, PartialEq)]
pub struct Panel<I> {
    index: Vec<I>,
    assets: Vec<String>,
    values: Vec<f64>,
}

impl<I: Copy + PartialOrd> Panel<I> {
    /// An all-missing panel over the given index and asset list.
    pub fn new(index: Vec<I>, assets: Vec<String>) -> Self {
        let values = vec![f64::NAN; index.len() * assets.len()];
        Self {
            index,
            assets,
            values,
        }
    }

    /// Build a panel from row-major values. The value length must equal
    /// `index.len() * assets.len()`.
    pub fn from_values(
        index: Vec<I>,
        assets: Vec<String>,
        values: Vec<f64>,
    ) -> Result<Self, NeutronError> {
        if values.len() != index.len() * assets.len() {
            return Err(NeutronError::ShapeMismatch {
                context: format!(
                    "panel values: have {}, need {} ({} rows x {} assets)",
                    values.len(),
                    index.len() * assets.len(),
                    index.len(),
                    assets.len()
                ),
            });
        }
        Ok(Self {
            index,
            assets,
            values,
        })
    }

    pub fn nrows(&self) -> usize {
        self.index.len()
    }

    pub fn ncols(&self) -> usize {
        self.assets.len()
    }

    pub fn index(&self) -> &[I] {
        &self.index
    }

    pub fn assets(&self) -> &[String] {
        &self.assets
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.values[row * self.assets.len() + col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.values[row * self.assets.len() + col] = value;
    }

    pub fn row(&self, row: usize) -> &[f64] {
        let w = self.assets.len();
        &self.values[row * w..(row + 1) * w]
    }

    /// Column position of an asset, if present.
    pub fn col_of(&self, asset: &str) -> Option<usize> {
        self.assets.iter().position(|a| a == asset)
    }

    /// Row position of an exact index key (binary search).
    pub fn row_of(&self, key: &I) -> Option<usize> {
        let pos = self.index.partition_point(|t| *t < *key);
        if pos < self.index.len() && self.index[pos] == *key {
            Some(pos)
        } else {
            None
        }
    }

    /// First row at or after `key`.
    pub fn first_row_at_or_after(&self, key: &I) -> usize {
        self.index.partition_point(|t| *t < *key)
    }

    /// First row strictly after `key`.
    pub fn first_row_after(&self, key: &I) -> usize {
        self.index.partition_point(|t| *t <= *key)
    }

    /// A new panel restricted to `rows` (half-open range of row positions).
    pub fn slice_rows(&self, rows: std::ops::Range<usize>) -> Self {
        let w = self.assets.len();
        Self {
            index: self.index[rows.clone()].to_vec(),
            assets: self.assets.clone(),
            values: self.values[rows.start * w..rows.end * w].to_vec(),
        }
    }

    /// A new panel restricted to the named assets, in the order given.
    /// Assets not present in this panel come back as all-missing columns.
    pub fn select_columns(&self, assets: &[String]) -> Self {
        let mut out = Self::new(self.index.clone(), assets.to_vec());
        for (new_col, asset) in assets.iter().enumerate() {
            if let Some(old_col) = self.col_of(asset) {
                for row in 0..self.index.len() {
                    out.set(row, new_col, self.get(row, old_col));
                }
            }
        }
        out
    }

    /// Fraction of non-missing values in an asset's column. Zero for an
    /// empty index.
    pub fn coverage(&self, col: usize) -> f64 {
        if self.index.is_empty() {
            return 0.0;
        }
        let present = (0..self.index.len())
            .filter(|&row| self.get(row, col).is_finite())
            .count();
        present as f64 / self.index.len() as f64
    }
}
