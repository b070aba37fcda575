//! Covariance functions
//!
//! The dynamics engine consumes kernels exclusively through the [`Kernel`]
//! trait: matrix evaluation, the training diagonal, gradients of a weighted
//! sum of kernel entries with respect to inputs and log-hyperparameters, and
//! an optional hyperparameter prior. Concrete kernels are composable through
//! [`CompoundKernel`] (sum of components) and described declaratively by
//! [`KernelSpec`], which is also the persisted form.
//!
//! # Gradient Convention
//! Every gradient function receives a weight matrix `G = ∂L/∂K` and returns
//! the gradient of `Σᵢⱼ Gᵢⱼ·k(aᵢ, bⱼ)`:
//! ```text
//! gradient_x(a, b, G)[i, :]     = Σⱼ Gᵢⱼ · ∂k(aᵢ, bⱼ)/∂aᵢ        (first argument only)
//! gradient_params(a, b, G)[p]   = Σᵢⱼ Gᵢⱼ · ∂k(aᵢ, bⱼ)/∂ln θₚ
//! diag_gradient_x(a, w)[i, :]   = wᵢ · ∂k(aᵢ, aᵢ)/∂aᵢ
//! ```
//!
//! Copyright (c) 2025 Mohammad Atashi <mohammadaliatashi@icloud.com>

mod compound;
mod linear;
mod rbf;
mod white;

pub use self::compound::CompoundKernel;
pub use self::linear::{BiasKernel, LinearKernel};
pub use self::rbf::RbfKernel;
pub use self::white::WhiteKernel;

use std::fmt;

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::{GpdmError, Result};

/// Whether a covariance evaluation pairs a set with itself during training
/// (white noise on the diagonal) or predicts at new points (noise-free)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CovarianceMode {
    Training,
    Reconstruction,
}

/// Prior over a kernel's hyperparameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HyperPrior {
    /// Improper flat prior, contributes nothing
    #[default]
    Flat,
    /// `p(θ) ∝ Π 1/θᵢ`, i.e. `ln p = -Σ ln θᵢ`
    Reciprocal,
}

impl HyperPrior {
    pub fn log_density(&self, log_params: &[f64]) -> f64 {
        match self {
            HyperPrior::Flat => 0.0,
            HyperPrior::Reciprocal => -log_params.iter().sum::<f64>(),
        }
    }

    /// Gradient of [`HyperPrior::log_density`] with respect to the log-parameters
    pub fn log_density_gradient(&self, num_parameters: usize) -> DVector<f64> {
        match self {
            HyperPrior::Flat => DVector::zeros(num_parameters),
            HyperPrior::Reciprocal => DVector::from_element(num_parameters, -1.0),
        }
    }
}

/// Covariance function contract consumed by the sparse GP engine
pub trait Kernel: fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;

    fn num_parameters(&self) -> usize;

    /// Hyperparameters in log space, the space the optimizer works in
    fn log_parameters(&self) -> DVector<f64>;

    fn set_log_parameters(&mut self, params: &[f64]) -> Result<()>;

    /// Covariance matrix between the rows of `a` and the rows of `b`.
    ///
    /// `CovarianceMode::Training` is only meaningful for `a == b`.
    fn compute(&self, a: &DMatrix<f64>, b: &DMatrix<f64>, mode: CovarianceMode) -> DMatrix<f64>;

    /// Diagonal of `compute(a, a, Training)`
    fn diagonal(&self, a: &DMatrix<f64>) -> DVector<f64>;

    fn gradient_x(&self, a: &DMatrix<f64>, b: &DMatrix<f64>, dl_dk: &DMatrix<f64>) -> DMatrix<f64>;

    fn gradient_params(
        &self,
        a: &DMatrix<f64>,
        b: &DMatrix<f64>,
        dl_dk: &DMatrix<f64>,
        mode: CovarianceMode,
    ) -> DVector<f64>;

    fn diag_gradient_x(&self, a: &DMatrix<f64>, weights: &DVector<f64>) -> DMatrix<f64>;

    fn diag_gradient_params(&self, a: &DMatrix<f64>, weights: &DVector<f64>) -> DVector<f64>;

    fn prior(&self) -> HyperPrior {
        HyperPrior::Flat
    }

    fn log_prior(&self) -> f64 {
        self.prior().log_density(self.log_parameters().as_slice())
    }

    fn log_prior_gradient(&self) -> DVector<f64> {
        self.prior().log_density_gradient(self.num_parameters())
    }

    fn spec(&self) -> KernelSpec;

    fn clone_box(&self) -> Box<dyn Kernel>;

    /// Gradient of `Σ Gᵢⱼ·k(aᵢ, aⱼ)` with respect to `a`, both arguments moving
    fn gradient_x_symmetric(&self, a: &DMatrix<f64>, dl_dk: &DMatrix<f64>) -> DMatrix<f64> {
        let both = dl_dk + dl_dk.transpose();
        self.gradient_x(a, a, &both)
    }

    /// Gradient of `Σ Gᵢⱼ·k(aᵢ, bⱼ)` with respect to `b`
    fn gradient_x_second(&self, a: &DMatrix<f64>, b: &DMatrix<f64>, dl_dk: &DMatrix<f64>) -> DMatrix<f64> {
        self.gradient_x(b, a, &dl_dk.transpose())
    }
}

impl Clone for Box<dyn Kernel> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Declarative kernel description, the persisted and configured form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KernelSpec {
    Rbf {
        variance: f64,
        inverse_width: f64,
        #[serde(default)]
        prior: HyperPrior,
    },
    Linear {
        variance: f64,
        #[serde(default)]
        prior: HyperPrior,
    },
    Bias {
        variance: f64,
        #[serde(default)]
        prior: HyperPrior,
    },
    White {
        variance: f64,
        #[serde(default)]
        prior: HyperPrior,
    },
    Compound {
        components: Vec<KernelSpec>,
    },
}

impl KernelSpec {
    /// Instantiate the described kernel
    pub fn build(&self) -> Result<Box<dyn Kernel>> {
        let kernel: Box<dyn Kernel> = match self {
            KernelSpec::Rbf { variance, inverse_width, prior } => {
                positive("rbf variance", *variance)?;
                positive("rbf inverse width", *inverse_width)?;
                Box::new(RbfKernel::new(*variance, *inverse_width).with_prior(*prior))
            }
            KernelSpec::Linear { variance, prior } => {
                positive("linear variance", *variance)?;
                Box::new(LinearKernel::new(*variance).with_prior(*prior))
            }
            KernelSpec::Bias { variance, prior } => {
                positive("bias variance", *variance)?;
                Box::new(BiasKernel::new(*variance).with_prior(*prior))
            }
            KernelSpec::White { variance, prior } => {
                positive("white variance", *variance)?;
                Box::new(WhiteKernel::new(*variance).with_prior(*prior))
            }
            KernelSpec::Compound { components } => {
                if components.is_empty() {
                    return Err(GpdmError::InvalidArgument(
                        "compound kernel needs at least one component".to_string(),
                    ));
                }
                let parts = components
                    .iter()
                    .map(KernelSpec::build)
                    .collect::<Result<Vec<_>>>()?;
                Box::new(CompoundKernel::new(parts))
            }
        };
        Ok(kernel)
    }

    /// RBF + linear + white, the usual GPDM dynamics kernel
    pub fn dynamics_default() -> Self {
        KernelSpec::Compound {
            components: vec![
                KernelSpec::Rbf { variance: 1.0, inverse_width: 1.0, prior: HyperPrior::Flat },
                KernelSpec::Linear { variance: 1.0, prior: HyperPrior::Flat },
                KernelSpec::White { variance: 1e-2, prior: HyperPrior::Flat },
            ],
        }
    }
}

fn positive(what: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(GpdmError::InvalidArgument(format!("{} must be finite and > 0, got {}", what, value)))
    }
}

/// Shared length and finiteness check for `set_log_parameters`
pub(crate) fn check_log_parameters(name: &str, params: &[f64], expected: usize) -> Result<()> {
    if params.len() != expected {
        return Err(GpdmError::InvalidArgument(format!(
            "{} kernel takes {} log-parameter(s), got {}",
            name,
            expected,
            params.len()
        )));
    }
    if let Some(bad) = params.iter().find(|p| !p.is_finite()) {
        return Err(GpdmError::InvalidArgument(format!(
            "{} kernel log-parameter is not finite: {}",
            name, bad
        )));
    }
    Ok(())
}

/// Pairwise squared Euclidean distances between rows
pub(crate) fn squared_distances(a: &DMatrix<f64>, b: &DMatrix<f64>) -> DMatrix<f64> {
    DMatrix::from_fn(a.nrows(), b.nrows(), |i, j| (a.row(i) - b.row(j)).norm_squared())
}
