//! JSON snapshots of trained dynamics models
//!
//! A [`DynamicsSnapshot`] carries everything needed to rebuild a
//! [`SparseDynamicsApproximation`] without the factor graph: the
//! approximation type, the latent sequence and its segmentation, the inducing
//! set, β, the output projection and the kernel as a [`KernelSpec`].
//! Matrices are stored row-major.
//!
//! Copyright (c) 2025 Mohammad Atashi <mohammadaliatashi@icloud.com>

use log::debug;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::dynamics::{ApproximationType, LatentProjection, Segments, SparseDynamicsApproximation, SparseGp};
use crate::error::{GpdmError, Result};
use crate::kernel::KernelSpec;

/// Serializable state of a trained dynamics model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicsSnapshot {
    pub approximation: ApproximationType,
    /// Q
    pub latent_dim: usize,
    /// Number of predicted latent columns
    pub output_dim: usize,
    /// N
    pub num_rows: usize,
    /// Present for DTC and FITC
    pub beta: Option<f64>,
    /// N×Q, row-major
    pub latent: Vec<f64>,
    pub inducing_indices: Vec<usize>,
    /// M×2Q, row-major, empty for FTC
    pub inducing: Vec<f64>,
    pub output_columns: Vec<usize>,
    pub segments: Vec<usize>,
    pub boundary_variance: f64,
    pub kernel: KernelSpec,
}

impl DynamicsSnapshot {
    /// Capture a model that has been updated at least once.
    pub fn capture(model: &SparseDynamicsApproximation) -> Result<Self> {
        let latent = model.latent().ok_or(GpdmError::NotComputed)?;
        Ok(Self {
            approximation: model.approximation(),
            latent_dim: model.latent_dim(),
            output_dim: model.projection().output_dim(),
            num_rows: latent.nrows(),
            beta: model.beta(),
            latent: row_major(latent),
            inducing_indices: model.inducing_indices().to_vec(),
            inducing: model.inducing().map(row_major).unwrap_or_default(),
            output_columns: model.projection().columns().to_vec(),
            segments: model.segments().starts().to_vec(),
            boundary_variance: model.boundary_variance(),
            kernel: model.kernel().spec(),
        })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Latent sequence as an N×Q matrix
    pub fn latent_matrix(&self) -> Result<DMatrix<f64>> {
        matrix_from_row_major("latent", &self.latent, self.num_rows, self.latent_dim)
    }

    /// Rebuild the model and bring it to the state it was captured in.
    pub fn restore(&self) -> Result<SparseDynamicsApproximation> {
        if self.output_columns.len() != self.output_dim {
            return Err(GpdmError::InvalidArgument(format!(
                "snapshot lists {} output columns but an output dimension of {}",
                self.output_columns.len(),
                self.output_dim
            )));
        }
        let latent = self.latent_matrix()?;
        let projection = LatentProjection::new(self.output_columns.clone(), self.latent_dim)?;
        let segments = Segments::new(self.segments.clone(), self.num_rows)?;
        let kernel = self.kernel.build()?;

        let gp = if self.approximation.is_sparse() {
            let beta = self.beta.ok_or_else(|| {
                GpdmError::InvalidArgument(format!("{:?} snapshot has no beta", self.approximation))
            })?;
            let inducing = matrix_from_row_major(
                "inducing",
                &self.inducing,
                self.inducing_indices.len(),
                2 * self.latent_dim,
            )?;
            SparseGp::new(self.approximation, kernel, Some(inducing), beta)?
        } else {
            SparseGp::full(kernel)
        };

        let mut model = SparseDynamicsApproximation::from_parts(
            gp,
            segments,
            self.num_rows,
            projection,
            self.boundary_variance,
            self.inducing_indices.clone(),
        )?;
        model.update_parameter(&latent)?;
        debug!(
            "Restored {:?} dynamics with N = {}, Q = {}",
            self.approximation, self.num_rows, self.latent_dim
        );
        Ok(model)
    }
}

fn row_major(matrix: &DMatrix<f64>) -> Vec<f64> {
    matrix.transpose().as_slice().to_vec()
}

fn matrix_from_row_major(what: &str, values: &[f64], rows: usize, cols: usize) -> Result<DMatrix<f64>> {
    if values.len() != rows * cols {
        return Err(GpdmError::InvalidArgument(format!(
            "{} holds {} values, expected {}x{}",
            what,
            values.len(),
            rows,
            cols
        )));
    }
    Ok(DMatrix::from_row_slice(rows, cols, values))
}
