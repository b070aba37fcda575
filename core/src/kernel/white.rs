//! White noise covariance
//!
//! Contributes `σ²_w` on the diagonal of training covariances only; cross
//! covariances and reconstruction-mode evaluations see nothing.

use nalgebra::{DMatrix, DVector};

use super::{check_log_parameters, CovarianceMode, HyperPrior, Kernel, KernelSpec};
use crate::error::Result;

#[derive(Debug, Clone, PartialEq)]
pub struct WhiteKernel {
    variance: f64,
    prior: HyperPrior,
}

impl WhiteKernel {
    pub fn new(variance: f64) -> Self {
        debug_assert!(variance > 0.0);
        Self {
            variance,
            prior: HyperPrior::Flat,
        }
    }

    pub fn with_prior(mut self, prior: HyperPrior) -> Self {
        self.prior = prior;
        self
    }

    #[inline]
    pub fn variance(&self) -> f64 {
        self.variance
    }
}

impl Kernel for WhiteKernel {
    fn name(&self) -> &'static str {
        "white"
    }

    fn num_parameters(&self) -> usize {
        1
    }

    fn log_parameters(&self) -> DVector<f64> {
        DVector::from_element(1, self.variance.ln())
    }

    fn set_log_parameters(&mut self, params: &[f64]) -> Result<()> {
        check_log_parameters(self.name(), params, 1)?;
        self.variance = params[0].exp();
        Ok(())
    }

    fn compute(&self, a: &DMatrix<f64>, b: &DMatrix<f64>, mode: CovarianceMode) -> DMatrix<f64> {
        match mode {
            CovarianceMode::Training => DMatrix::identity(a.nrows(), b.nrows()) * self.variance,
            CovarianceMode::Reconstruction => DMatrix::zeros(a.nrows(), b.nrows()),
        }
    }

    fn diagonal(&self, a: &DMatrix<f64>) -> DVector<f64> {
        DVector::from_element(a.nrows(), self.variance)
    }

    fn gradient_x(&self, a: &DMatrix<f64>, _b: &DMatrix<f64>, _dl_dk: &DMatrix<f64>) -> DMatrix<f64> {
        DMatrix::zeros(a.nrows(), a.ncols())
    }

    fn gradient_params(
        &self,
        _a: &DMatrix<f64>,
        _b: &DMatrix<f64>,
        dl_dk: &DMatrix<f64>,
        mode: CovarianceMode,
    ) -> DVector<f64> {
        let value = match mode {
            CovarianceMode::Training => dl_dk.diagonal().sum() * self.variance,
            CovarianceMode::Reconstruction => 0.0,
        };
        DVector::from_element(1, value)
    }

    fn diag_gradient_x(&self, a: &DMatrix<f64>, _weights: &DVector<f64>) -> DMatrix<f64> {
        DMatrix::zeros(a.nrows(), a.ncols())
    }

    fn diag_gradient_params(&self, _a: &DMatrix<f64>, weights: &DVector<f64>) -> DVector<f64> {
        DVector::from_element(1, weights.sum() * self.variance)
    }

    fn prior(&self) -> HyperPrior {
        self.prior
    }

    fn spec(&self) -> KernelSpec {
        KernelSpec::White {
            variance: self.variance,
            prior: self.prior,
        }
    }

    fn clone_box(&self) -> Box<dyn Kernel> {
        Box::new(self.clone())
    }
}
