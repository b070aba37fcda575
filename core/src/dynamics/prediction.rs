//! Detached forward predictor of a trained dynamics model
//!
//! A [`PredictionStruct`] owns a clone of the kernel, the mean coefficients
//! and the support inputs, so it can run the dynamics forward while the
//! training state keeps changing. Each instance also carries its own stepping
//! context, which makes several predictors over one trained model (one per
//! body part, say) fully independent.
//!
//! # Mathematical Foundations
//! ```text
//! x̂ₜ = k([xₜ₋₁, xₜ₋₂], S) · α          S = Xin (FTC) or Xu (DTC, FITC)
//! ```
//!
//! Copyright (c) 2025 Mohammad Atashi <mohammadaliatashi@icloud.com>

use nalgebra::{DMatrix, DVector, RowDVector};

use super::projection::LatentProjection;
use crate::error::{GpdmError, Result};
use crate::kernel::{CovarianceMode, Kernel};

/// Immutable snapshot of trained dynamics plus a private stepping context
#[derive(Debug, Clone)]
pub struct PredictionStruct {
    kernel: Box<dyn Kernel>,
    alpha: DMatrix<f64>,
    support: DMatrix<f64>,
    projection: LatentProjection,
    /// `(xₜ₋₁, xₜ₋₂)`
    context: Option<(DVector<f64>, DVector<f64>)>,
}

impl PredictionStruct {
    pub fn new(
        kernel: Box<dyn Kernel>,
        alpha: DMatrix<f64>,
        support: DMatrix<f64>,
        projection: LatentProjection,
    ) -> Result<Self> {
        let q = projection.latent_dim();
        if support.ncols() != 2 * q {
            return Err(GpdmError::dimension("support inputs", (support.nrows(), 2 * q), support.shape()));
        }
        if alpha.shape() != (support.nrows(), projection.output_dim()) {
            return Err(GpdmError::dimension(
                "alpha",
                (support.nrows(), projection.output_dim()),
                alpha.shape(),
            ));
        }
        Ok(Self {
            kernel,
            alpha,
            support,
            projection,
            context: None,
        })
    }

    #[inline]
    pub fn latent_dim(&self) -> usize {
        self.projection.latent_dim()
    }

    #[inline]
    pub fn projection(&self) -> &LatentProjection {
        &self.projection
    }

    #[inline]
    pub fn alpha(&self) -> &DMatrix<f64> {
        &self.alpha
    }

    /// Mean prediction for each row of `x_star` (2Q columns, most recent first)
    pub fn predict(&self, x_star: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        if x_star.ncols() != self.support.ncols() {
            return Err(GpdmError::dimension(
                "prediction inputs",
                (x_star.nrows(), self.support.ncols()),
                x_star.shape(),
            ));
        }
        let k_star = self.kernel.compute(x_star, &self.support, CovarianceMode::Reconstruction);
        Ok(k_star * &self.alpha)
    }

    /// One-step prediction of the projected columns
    pub fn predict_next(&self, previous: &DVector<f64>, before_previous: &DVector<f64>) -> Result<DVector<f64>> {
        let q = self.latent_dim();
        if previous.len() != q || before_previous.len() != q {
            return Err(GpdmError::InvalidArgument(format!(
                "latent states must have {} entries, got {} and {}",
                q,
                previous.len(),
                before_previous.len()
            )));
        }
        let input = RowDVector::from_iterator(2 * q, previous.iter().chain(before_previous.iter()).copied());
        let predicted = self.predict(&DMatrix::from_rows(&[input]))?;
        Ok(predicted.row(0).transpose())
    }

    /// Autoregressive rollout of `steps` rows from the 2×Q `seed`.
    ///
    /// The first two rows of the result are the seed. Rollouts beyond the
    /// seed need a model that predicts every latent column.
    pub fn simulate(&self, seed: &DMatrix<f64>, steps: usize) -> Result<DMatrix<f64>> {
        let q = self.latent_dim();
        if seed.shape() != (2, q) {
            return Err(GpdmError::dimension("seed", (2, q), seed.shape()));
        }
        if steps < 2 {
            return Err(GpdmError::InvalidArgument(format!(
                "a rollout has at least the two seed rows, {} requested",
                steps
            )));
        }
        if steps == 2 {
            return Ok(seed.clone());
        }
        self.require_full_coverage()?;

        let mut trajectory = DMatrix::zeros(steps, q);
        trajectory.rows_mut(0, 2).copy_from(seed);
        for t in 2..steps {
            let previous = trajectory.row(t - 1).transpose();
            let before_previous = trajectory.row(t - 2).transpose();
            let output = self.predict_next(&previous, &before_previous)?;
            let mut next = DVector::zeros(q);
            self.projection.scatter_into(&output, &mut next);
            trajectory.set_row(t, &next.transpose());
        }
        Ok(trajectory)
    }

    /// Start a stepping context from two known states
    pub fn reset(&mut self, before_previous: DVector<f64>, previous: DVector<f64>) -> Result<()> {
        let q = self.latent_dim();
        if previous.len() != q || before_previous.len() != q {
            return Err(GpdmError::InvalidArgument(format!("latent states must have {} entries", q)));
        }
        self.context = Some((previous, before_previous));
        Ok(())
    }

    /// Predicted projected columns of the next state, context unchanged
    pub fn predict_step(&self) -> Result<DVector<f64>> {
        let (previous, before_previous) = self.context()?;
        self.predict_next(previous, before_previous)
    }

    /// Shift a complete latent state into the context
    pub fn push_state(&mut self, state: DVector<f64>) -> Result<()> {
        let q = self.latent_dim();
        if state.len() != q {
            return Err(GpdmError::InvalidArgument(format!("latent state must have {} entries", q)));
        }
        let (previous, _) = self
            .context
            .take()
            .ok_or_else(|| GpdmError::NotInitialized("stepping context was never reset".to_string()))?;
        self.context = Some((state, previous));
        Ok(())
    }

    /// Predict the next state and append it to the context
    pub fn advance(&mut self) -> Result<DVector<f64>> {
        self.require_full_coverage()?;
        let output = self.predict_step()?;
        let mut next = DVector::zeros(self.latent_dim());
        self.projection.scatter_into(&output, &mut next);
        self.push_state(next.clone())?;
        Ok(next)
    }

    fn context(&self) -> Result<(&DVector<f64>, &DVector<f64>)> {
        self.context
            .as_ref()
            .map(|(previous, before_previous)| (previous, before_previous))
            .ok_or_else(|| GpdmError::NotInitialized("stepping context was never reset".to_string()))
    }

    fn require_full_coverage(&self) -> Result<()> {
        if self.projection.covers_latent_space() {
            Ok(())
        } else {
            Err(GpdmError::UnsupportedOperation(format!(
                "multi-step rollout needs all {} latent columns, model predicts {}",
                self.latent_dim(),
                self.projection.output_dim()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::LinearKernel;
    use approx::assert_relative_eq;

    /// Linear kernel on a single support point: x̂ = (s·x)·α
    fn linear_predictor(projection: LatentProjection) -> PredictionStruct {
        let q = projection.latent_dim();
        let support = DMatrix::from_fn(1, 2 * q, |_, j| if j < q { 1.0 } else { 0.0 });
        let alpha = DMatrix::from_element(1, projection.output_dim(), 0.5);
        PredictionStruct::new(Box::new(LinearKernel::new(1.0)), alpha, support, projection).unwrap()
    }

    #[test]
    fn test_two_step_rollout_returns_seed() {
        let predictor = linear_predictor(LatentProjection::full(2));
        let seed = DMatrix::from_row_slice(2, 2, &[0.1, 0.2, 0.3, 0.4]);
        assert_eq!(predictor.simulate(&seed, 2).unwrap(), seed);
        assert!(predictor.simulate(&seed, 1).is_err());
    }

    #[test]
    fn test_longer_rollout_keeps_seed_rows() {
        let predictor = linear_predictor(LatentProjection::full(2));
        let seed = DMatrix::from_row_slice(2, 2, &[0.1, 0.2, 0.3, 0.4]);
        let short = predictor.simulate(&seed, 4).unwrap();
        let long = predictor.simulate(&seed, 6).unwrap();

        assert_eq!(long.rows(0, 2), seed.rows(0, 2));
        assert_eq!(long.rows(0, 4), short.rows(0, 4));
        // each column of x̂ₜ is half the sum of xₜ₋₁
        assert_relative_eq!(long[(2, 0)], 0.5 * (0.3 + 0.4), epsilon = 1e-12);
    }

    #[test]
    fn test_partial_model_refuses_multi_step_rollout() {
        let predictor = linear_predictor(LatentProjection::new(vec![1], 2).unwrap());
        let seed = DMatrix::zeros(2, 2);
        assert!(predictor.simulate(&seed, 2).is_ok());
        assert!(matches!(
            predictor.simulate(&seed, 3),
            Err(GpdmError::UnsupportedOperation(_))
        ));
    }

    #[test]
    fn test_stepping_contexts_are_independent() {
        let mut first = linear_predictor(LatentProjection::full(2));
        let mut second = first.clone();
        first
            .reset(DVector::from_vec(vec![0.0, 0.0]), DVector::from_vec(vec![1.0, 1.0]))
            .unwrap();
        second
            .reset(DVector::from_vec(vec![0.0, 0.0]), DVector::from_vec(vec![2.0, 0.0]))
            .unwrap();

        let a = first.advance().unwrap();
        let b = second.advance().unwrap();
        assert_relative_eq!(a, DVector::from_vec(vec![1.0, 1.0]), epsilon = 1e-12);
        assert_relative_eq!(b, DVector::from_vec(vec![1.0, 1.0]), epsilon = 1e-12);

        let a2 = first.advance().unwrap();
        assert_relative_eq!(a2, DVector::from_vec(vec![1.0, 1.0]), epsilon = 1e-12);
        assert_relative_eq!(second.predict_step().unwrap(), DVector::from_vec(vec![1.0, 1.0]), epsilon = 1e-12);
    }

    #[test]
    fn test_partial_model_steps_with_external_state() {
        let mut predictor = linear_predictor(LatentProjection::new(vec![1], 2).unwrap());
        assert!(matches!(predictor.predict_step(), Err(GpdmError::NotInitialized(_))));

        predictor
            .reset(DVector::zeros(2), DVector::from_vec(vec![1.0, 3.0]))
            .unwrap();
        let output = predictor.predict_step().unwrap();
        assert_eq!(output.len(), 1);
        assert_relative_eq!(output[0], 2.0, epsilon = 1e-12);

        assert!(predictor.advance().is_err());
        predictor.push_state(DVector::from_vec(vec![0.0, output[0]])).unwrap();
        assert_relative_eq!(predictor.predict_step().unwrap()[0], 1.0, epsilon = 1e-12);
    }
}
