//! Index projection between a dynamics model's outputs and the shared latent space
//!
//! Several dynamics models may share one latent matrix while each predicts
//! only some of its columns (one model per body part, for instance). Every
//! model still conditions on the complete latent state; the projection only
//! selects which latent columns form its regression targets and where their
//! gradients land.
//!
//! Copyright (c) 2025 Mohammad Atashi <mohammadaliatashi@icloud.com>

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::{GpdmError, Result};

/// Output column `c` of the model is latent column `columns[c]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatentProjection {
    columns: Vec<usize>,
    latent_dim: usize,
}

impl LatentProjection {
    /// Columns must be distinct and below `latent_dim`.
    pub fn new(columns: Vec<usize>, latent_dim: usize) -> Result<Self> {
        if columns.is_empty() {
            return Err(GpdmError::InvalidArgument("projection selects no columns".to_string()));
        }
        let mut seen = vec![false; latent_dim];
        for &column in &columns {
            match seen.get_mut(column) {
                None => {
                    return Err(GpdmError::InvalidArgument(format!(
                        "projected column {} is outside a {}-dimensional latent space",
                        column, latent_dim
                    )))
                }
                Some(true) => {
                    return Err(GpdmError::InvalidArgument(format!(
                        "projected column {} appears twice",
                        column
                    )))
                }
                Some(flag) => *flag = true,
            }
        }
        Ok(Self { columns, latent_dim })
    }

    /// Identity projection over all `latent_dim` columns
    pub fn full(latent_dim: usize) -> Self {
        Self {
            columns: (0..latent_dim).collect(),
            latent_dim,
        }
    }

    /// Build from an optional column list, defaulting to the identity
    pub fn from_columns(columns: Option<&[usize]>, latent_dim: usize) -> Result<Self> {
        match columns {
            Some(columns) => Self::new(columns.to_vec(), latent_dim),
            None => Ok(Self::full(latent_dim)),
        }
    }

    #[inline]
    pub fn columns(&self) -> &[usize] {
        &self.columns
    }

    #[inline]
    pub fn latent_dim(&self) -> usize {
        self.latent_dim
    }

    /// Number of predicted columns
    #[inline]
    pub fn output_dim(&self) -> usize {
        self.columns.len()
    }

    /// True when every latent column is predicted
    #[inline]
    pub fn covers_latent_space(&self) -> bool {
        self.columns.len() == self.latent_dim
    }

    /// Rows of `latent` restricted to the projected columns
    pub fn gather_rows(&self, latent: &DMatrix<f64>, rows: &[usize]) -> DMatrix<f64> {
        DMatrix::from_fn(rows.len(), self.columns.len(), |r, c| latent[(rows[r], self.columns[c])])
    }

    /// Write a predicted output vector into a full latent row
    pub fn scatter_into(&self, output: &DVector<f64>, latent_row: &mut DVector<f64>) {
        for (c, &column) in self.columns.iter().enumerate() {
            latent_row[column] = output[c];
        }
    }
}
