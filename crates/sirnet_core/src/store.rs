//! In-memory coupling-matrix store keyed by `prefix/date` strings.

use std::collections::HashMap;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use nalgebra::DMatrix;

use crate::config::StoreLayout;
use crate::traits::CouplingProvider;

#[derive(Debug, Clone, Default)]
pub struct MatrixStore {
    entries: HashMap<String, DMatrix<f64>>,
}

impl MatrixStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, matrix: DMatrix<f64>) {
        self.entries.insert(key.into(), matrix);
    }

    pub fn insert_dated(&mut self, layout: &StoreLayout, date: NaiveDate, matrix: DMatrix<f64>) {
        self.insert(layout.key_for(date), matrix);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parses a JSON object mapping keys to matrices given as arrays of rows.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let raw: HashMap<String, Vec<Vec<f64>>> =
            serde_json::from_str(json).context("Failed to parse coupling store JSON.")?;
        let mut store = Self::new();
        for (key, rows) in raw {
            let matrix = matrix_from_rows(&rows)
                .with_context(|| format!("Invalid coupling matrix under key '{key}'."))?;
            store.insert(key, matrix);
        }
        Ok(store)
    }
}

impl CouplingProvider for MatrixStore {
    fn has_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    fn get(&self, key: &str) -> Option<DMatrix<f64>> {
        self.entries.get(key).cloned()
    }
}

fn matrix_from_rows(rows: &[Vec<f64>]) -> Result<DMatrix<f64>> {
    let nrows = rows.len();
    if nrows == 0 {
        bail!("Matrix has no rows.");
    }
    let ncols = rows[0].len();
    if let Some((idx, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != ncols) {
        bail!(
            "Row {} has {} entries, expected {}.",
            idx,
            row.len(),
            ncols
        );
    }
    let flat: Vec<f64> = rows.iter().flatten().copied().collect();
    Ok(DMatrix::from_row_slice(nrows, ncols, &flat))
}
