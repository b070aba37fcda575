//! Linear and constant covariances
//!
//! ```text
//! linear:  k(a, b) = σ² · aᵀb       log-parameters [ln σ²]
//! bias:    k(a, b) = b              log-parameters [ln b]
//! ```

use nalgebra::{DMatrix, DVector};

use super::{check_log_parameters, CovarianceMode, HyperPrior, Kernel, KernelSpec};
use crate::error::Result;
use crate::linalg::scale_rows;

#[derive(Debug, Clone, PartialEq)]
pub struct LinearKernel {
    variance: f64,
    prior: HyperPrior,
}

impl LinearKernel {
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

impl Kernel for LinearKernel {
    fn name(&self) -> &'static str {
        "linear"
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

    fn compute(&self, a: &DMatrix<f64>, b: &DMatrix<f64>, _mode: CovarianceMode) -> DMatrix<f64> {
        (a * b.transpose()) * self.variance
    }

    fn diagonal(&self, a: &DMatrix<f64>) -> DVector<f64> {
        DVector::from_fn(a.nrows(), |i, _| self.variance * a.row(i).norm_squared())
    }

    fn gradient_x(&self, _a: &DMatrix<f64>, b: &DMatrix<f64>, dl_dk: &DMatrix<f64>) -> DMatrix<f64> {
        (dl_dk * b) * self.variance
    }

    fn gradient_params(
        &self,
        a: &DMatrix<f64>,
        b: &DMatrix<f64>,
        dl_dk: &DMatrix<f64>,
        mode: CovarianceMode,
    ) -> DVector<f64> {
        DVector::from_element(1, self.compute(a, b, mode).dot(dl_dk))
    }

    fn diag_gradient_x(&self, a: &DMatrix<f64>, weights: &DVector<f64>) -> DMatrix<f64> {
        scale_rows(a, weights) * (2.0 * self.variance)
    }

    fn diag_gradient_params(&self, a: &DMatrix<f64>, weights: &DVector<f64>) -> DVector<f64> {
        DVector::from_element(1, self.diagonal(a).dot(weights))
    }

    fn prior(&self) -> HyperPrior {
        self.prior
    }

    fn spec(&self) -> KernelSpec {
        KernelSpec::Linear {
            variance: self.variance,
            prior: self.prior,
        }
    }

    fn clone_box(&self) -> Box<dyn Kernel> {
        Box::new(self.clone())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BiasKernel {
    variance: f64,
    prior: HyperPrior,
}

impl BiasKernel {
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
}

impl Kernel for BiasKernel {
    fn name(&self) -> &'static str {
        "bias"
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

    fn compute(&self, a: &DMatrix<f64>, b: &DMatrix<f64>, _mode: CovarianceMode) -> DMatrix<f64> {
        DMatrix::from_element(a.nrows(), b.nrows(), self.variance)
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
        _mode: CovarianceMode,
    ) -> DVector<f64> {
        DVector::from_element(1, dl_dk.sum() * self.variance)
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
        KernelSpec::Bias {
            variance: self.variance,
            prior: self.prior,
        }
    }

    fn clone_box(&self) -> Box<dyn Kernel> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::tests::check_kernel_gradients;

    #[test]
    fn test_linear_gradients() {
        check_kernel_gradients(&LinearKernel::new(0.8));
    }

    #[test]
    fn test_bias_gradients() {
        check_kernel_gradients(&BiasKernel::new(1.7));
    }

    #[test]
    fn test_unit_linear_kernel_is_gram_matrix() {
        let a = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 3.0, 4.0]);
        let k = LinearKernel::new(1.0).compute(&a, &a, CovarianceMode::Training);
        assert_eq!(k, &a * a.transpose());
    }
}
