//! Squared-exponential covariance
//!
//! ```text
//! k(a, b) = σ² · exp(-γ/2 · |a - b|²)        log-parameters [ln σ², ln γ]
//! ```

use nalgebra::{DMatrix, DVector};

use super::{check_log_parameters, squared_distances, CovarianceMode, HyperPrior, Kernel, KernelSpec};
use crate::error::Result;

#[derive(Debug, Clone, PartialEq)]
pub struct RbfKernel {
    variance: f64,
    inverse_width: f64,
    prior: HyperPrior,
}

impl RbfKernel {
    pub fn new(variance: f64, inverse_width: f64) -> Self {
        debug_assert!(variance > 0.0 && inverse_width > 0.0);
        Self {
            variance,
            inverse_width,
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

    #[inline]
    pub fn inverse_width(&self) -> f64 {
        self.inverse_width
    }
}

impl Kernel for RbfKernel {
    fn name(&self) -> &'static str {
        "rbf"
    }

    fn num_parameters(&self) -> usize {
        2
    }

    fn log_parameters(&self) -> DVector<f64> {
        DVector::from_vec(vec![self.variance.ln(), self.inverse_width.ln()])
    }

    fn set_log_parameters(&mut self, params: &[f64]) -> Result<()> {
        check_log_parameters(self.name(), params, 2)?;
        self.variance = params[0].exp();
        self.inverse_width = params[1].exp();
        Ok(())
    }

    fn compute(&self, a: &DMatrix<f64>, b: &DMatrix<f64>, _mode: CovarianceMode) -> DMatrix<f64> {
        let gamma = self.inverse_width;
        squared_distances(a, b).map(|r2| self.variance * (-0.5 * gamma * r2).exp())
    }

    fn diagonal(&self, a: &DMatrix<f64>) -> DVector<f64> {
        DVector::from_element(a.nrows(), self.variance)
    }

    fn gradient_x(&self, a: &DMatrix<f64>, b: &DMatrix<f64>, dl_dk: &DMatrix<f64>) -> DMatrix<f64> {
        let k = self.compute(a, b, CovarianceMode::Reconstruction);
        // ∂k/∂aᵢ = -γ·k·(aᵢ - bⱼ)
        let weights = dl_dk.component_mul(&k) * (-self.inverse_width);
        let row_weights = DVector::from_fn(a.nrows(), |i, _| weights.row(i).sum());
        let mut gradient = &weights * b * -1.0;
        for i in 0..a.nrows() {
            let scaled = a.row(i) * row_weights[i];
            let mut row = gradient.row_mut(i);
            row += scaled;
        }
        gradient
    }

    fn gradient_params(
        &self,
        a: &DMatrix<f64>,
        b: &DMatrix<f64>,
        dl_dk: &DMatrix<f64>,
        _mode: CovarianceMode,
    ) -> DVector<f64> {
        let r2 = squared_distances(a, b);
        let weighted = dl_dk.component_mul(&r2.map(|d| self.variance * (-0.5 * self.inverse_width * d).exp()));
        let d_variance = weighted.sum();
        let d_width = weighted.component_mul(&r2).sum() * (-0.5 * self.inverse_width);
        DVector::from_vec(vec![d_variance, d_width])
    }

    fn diag_gradient_x(&self, a: &DMatrix<f64>, _weights: &DVector<f64>) -> DMatrix<f64> {
        DMatrix::zeros(a.nrows(), a.ncols())
    }

    fn diag_gradient_params(&self, _a: &DMatrix<f64>, weights: &DVector<f64>) -> DVector<f64> {
        DVector::from_vec(vec![weights.sum() * self.variance, 0.0])
    }

    fn prior(&self) -> HyperPrior {
        self.prior
    }

    fn spec(&self) -> KernelSpec {
        KernelSpec::Rbf {
            variance: self.variance,
            inverse_width: self.inverse_width,
            prior: self.prior,
        }
    }

    fn clone_box(&self) -> Box<dyn Kernel> {
        Box::new(self.clone())
    }
}
