//! Sum of covariance functions
//!
//! Parameters are the concatenation of the components' parameters, in
//! component order. The hyperparameter prior is the sum of the components'.
//! Products of kernels are not provided.

use nalgebra::{DMatrix, DVector};

use super::{check_log_parameters, CovarianceMode, Kernel, KernelSpec};
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct CompoundKernel {
    components: Vec<Box<dyn Kernel>>,
}

impl CompoundKernel {
    pub fn new(components: Vec<Box<dyn Kernel>>) -> Self {
        Self { components }
    }

    pub fn components(&self) -> &[Box<dyn Kernel>] {
        &self.components
    }

    fn concat<F>(&self, mut per_component: F) -> DVector<f64>
    where
        F: FnMut(&dyn Kernel) -> DVector<f64>,
    {
        let values: Vec<f64> = self
            .components
            .iter()
            .flat_map(|k| per_component(k.as_ref()).iter().copied().collect::<Vec<_>>())
            .collect();
        DVector::from_vec(values)
    }

    fn sum<F>(&self, rows: usize, cols: usize, mut per_component: F) -> DMatrix<f64>
    where
        F: FnMut(&dyn Kernel) -> DMatrix<f64>,
    {
        self.components
            .iter()
            .fold(DMatrix::zeros(rows, cols), |acc, k| acc + per_component(k.as_ref()))
    }
}

impl Kernel for CompoundKernel {
    fn name(&self) -> &'static str {
        "compound"
    }

    fn num_parameters(&self) -> usize {
        self.components.iter().map(|k| k.num_parameters()).sum()
    }

    fn log_parameters(&self) -> DVector<f64> {
        self.concat(|k| k.log_parameters())
    }

    fn set_log_parameters(&mut self, params: &[f64]) -> Result<()> {
        check_log_parameters(self.name(), params, self.num_parameters())?;
        let mut offset = 0;
        for component in &mut self.components {
            let count = component.num_parameters();
            component.set_log_parameters(&params[offset..offset + count])?;
            offset += count;
        }
        Ok(())
    }

    fn compute(&self, a: &DMatrix<f64>, b: &DMatrix<f64>, mode: CovarianceMode) -> DMatrix<f64> {
        self.sum(a.nrows(), b.nrows(), |k| k.compute(a, b, mode))
    }

    fn diagonal(&self, a: &DMatrix<f64>) -> DVector<f64> {
        self.components
            .iter()
            .fold(DVector::zeros(a.nrows()), |acc, k| acc + k.diagonal(a))
    }

    fn gradient_x(&self, a: &DMatrix<f64>, b: &DMatrix<f64>, dl_dk: &DMatrix<f64>) -> DMatrix<f64> {
        self.sum(a.nrows(), a.ncols(), |k| k.gradient_x(a, b, dl_dk))
    }

    fn gradient_params(
        &self,
        a: &DMatrix<f64>,
        b: &DMatrix<f64>,
        dl_dk: &DMatrix<f64>,
        mode: CovarianceMode,
    ) -> DVector<f64> {
        self.concat(|k| k.gradient_params(a, b, dl_dk, mode))
    }

    fn diag_gradient_x(&self, a: &DMatrix<f64>, weights: &DVector<f64>) -> DMatrix<f64> {
        self.sum(a.nrows(), a.ncols(), |k| k.diag_gradient_x(a, weights))
    }

    fn diag_gradient_params(&self, a: &DMatrix<f64>, weights: &DVector<f64>) -> DVector<f64> {
        self.concat(|k| k.diag_gradient_params(a, weights))
    }

    fn log_prior(&self) -> f64 {
        self.components.iter().map(|k| k.log_prior()).sum()
    }

    fn log_prior_gradient(&self) -> DVector<f64> {
        self.concat(|k| k.log_prior_gradient())
    }

    fn spec(&self) -> KernelSpec {
        KernelSpec::Compound {
            components: self.components.iter().map(|k| k.spec()).collect(),
        }
    }

    fn clone_box(&self) -> Box<dyn Kernel> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::{HyperPrior, LinearKernel, RbfKernel, WhiteKernel};
    use approx::assert_relative_eq;

    fn compound() -> CompoundKernel {
        CompoundKernel::new(vec![
            Box::new(RbfKernel::new(1.0, 2.0).with_prior(HyperPrior::Reciprocal)),
            Box::new(LinearKernel::new(0.5)),
            Box::new(WhiteKernel::new(0.1).with_prior(HyperPrior::Reciprocal)),
        ])
    }

    #[test]
    fn test_parameters_are_concatenated_in_order() {
        let mut kernel = compound();
        assert_eq!(kernel.num_parameters(), 4);

        let params = [0.1, 0.2, 0.3, 0.4];
        kernel.set_log_parameters(&params).unwrap();
        assert_relative_eq!(kernel.log_parameters(), DVector::from_row_slice(&params), epsilon = 1e-12);
        assert!(kernel.set_log_parameters(&params[..3]).is_err());
    }

    #[test]
    fn test_prior_sums_components() {
        let kernel = compound();
        let expected = -(1.0_f64.ln() + 2.0_f64.ln()) - 0.1_f64.ln();
        assert_relative_eq!(kernel.log_prior(), expected, epsilon = 1e-12);
        assert_eq!(
            kernel.log_prior_gradient(),
            DVector::from_vec(vec![-1.0, -1.0, 0.0, -1.0])
        );
    }
}
