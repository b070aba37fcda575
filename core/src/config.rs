//! Model configuration
//!
//! Plain serde structs with defaults for every field, so a partial JSON
//! document is a valid configuration. Validation is explicit and happens at
//! model initialization.
//!
//! Copyright (c) 2025 Mohammad Atashi <mohammadaliatashi@icloud.com>

use serde::{Deserialize, Serialize};

use crate::dynamics::ApproximationType;
use crate::error::{GpdmError, Result};

/// Settings of one GP likelihood engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SparseGpConfig {
    /// Exact or sparse treatment of the training covariance
    pub approximation: ApproximationType,
    /// Upper bound on the number of inducing inputs
    pub num_inducing_max: usize,
    /// Noise precision β before optimization
    pub initial_beta: f64,
    /// Seed of the inducing-subset sampler
    pub seed: u64,
}

impl Default for SparseGpConfig {
    fn default() -> Self {
        Self {
            approximation: ApproximationType::Ftc,
            num_inducing_max: 100,
            initial_beta: 1e3,
            seed: 0,
        }
    }
}

impl SparseGpConfig {
    pub fn validate(&self) -> Result<()> {
        if self.approximation.is_sparse() && self.num_inducing_max == 0 {
            return Err(GpdmError::InvalidArgument(
                "sparse approximation needs num_inducing_max >= 1".to_string(),
            ));
        }
        if !(self.initial_beta.is_finite() && self.initial_beta > 0.0) {
            return Err(GpdmError::InvalidArgument(format!(
                "initial_beta must be finite and > 0, got {}",
                self.initial_beta
            )));
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }
}

/// Settings of a second-order dynamics model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DynamicsConfig {
    pub gp: SparseGpConfig,
    /// Variance of the Gaussian priors on the first two rows of each segment
    pub boundary_variance: f64,
    /// Latent columns this model predicts; `None` drives all of them
    pub output_columns: Option<Vec<usize>>,
}

impl Default for DynamicsConfig {
    fn default() -> Self {
        Self {
            gp: SparseGpConfig::default(),
            boundary_variance: 1.0,
            output_columns: None,
        }
    }
}

impl DynamicsConfig {
    pub fn validate(&self) -> Result<()> {
        self.gp.validate()?;
        if !(self.boundary_variance.is_finite() && self.boundary_variance > 0.0) {
            return Err(GpdmError::InvalidArgument(format!(
                "boundary_variance must be finite and > 0, got {}",
                self.boundary_variance
            )));
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }
}
