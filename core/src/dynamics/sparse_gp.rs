//! Mode-parametrized Gaussian-process marginal likelihood
//!
//! [`SparseGp`] evaluates the negative log marginal likelihood of an output
//! matrix `Y` (N×Q) given inputs `X` (N×P) under one of three approximation
//! regimes, together with its analytic gradient with respect to the inputs,
//! the outputs, the inducing inputs, the kernel log-hyperparameters and
//! `ln β`. Both the dynamics model (inputs are predecessor pairs) and the
//! observation mapping (inputs are latent points) run on this engine.
//!
//! # Mathematical Foundations
//!
//! ## Full training conditional (FTC)
//! ```text
//! L = -QN/2·ln 2π - Q/2·ln|K| - ½·tr(YᵀK⁻¹Y)
//! ∂L/∂K = ½·(ααᵀ - Q·K⁻¹),   α = K⁻¹Y,   ∂L/∂Y = -α
//! ```
//!
//! ## Sparse conditionals (DTC, FITC)
//! With inducing inputs Xu (M rows) and the FITC correction
//! `Dᵢ = 1 + β·(kᵢᵢ - Kufᵢᵀ·Kuu⁻¹·Kufᵢ)` (DTC fixes `D = 1`):
//! ```text
//! A = Kuu/β + Kuf·D⁻¹·Kufᵀ,   M = Kuf·D⁻¹·Y,   α = A⁻¹·M
//! L = -½·[QN·ln 2π + Q·(Σ ln Dᵢ - (N-M)·ln β + ln|A| - ln|Kuu|)
//!          + β·(Σᵢ |Yᵢ|²/Dᵢ - tr(MᵀA⁻¹M))]
//! ```
//! Gradients follow by differentiating through `A`, `M` and `D`; with
//! `G_A = -Q/2·A⁻¹ - β/2·ααᵀ`:
//! ```text
//! ∂L/∂Kuu = G_A/β + Q/2·Kuu⁻¹ + β·V·diag(g_D)·Vᵀ              V = Kuu⁻¹Kuf
//! ∂L/∂Kuf = 2·G_A·Kuf·D⁻¹ + β·α·Yᵀ·D⁻¹ - 2β·V·diag(g_D)
//! ∂L/∂kᵢᵢ = β·g_Dᵢ
//! ∂L/∂Y   = β·D⁻¹·(Kfu·α - Y)
//! g_Dᵢ    = -Q/(2Dᵢ) + β|Yᵢ|²/(2Dᵢ²) - (Kufᵢᵀ·G_A·Kufᵢ)/Dᵢ² - β·(Kfu·α)ᵢ·Yᵢ/Dᵢ²
//! ```
//! The `g_D` terms vanish for DTC.
//!
//! Copyright (c) 2025 Mohammad Atashi <mohammadaliatashi@icloud.com>

use std::f64::consts::PI;

use log::{trace, warn};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::{GpdmError, Result};
use crate::kernel::{CovarianceMode, Kernel};
use crate::linalg::{column_dots, row_dots, scale_columns, scale_rows, symmetrize, SymmetricFactor};

/// Exact or sparse treatment of the training covariance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApproximationType {
    /// Full training conditional, exact
    #[default]
    Ftc,
    /// Deterministic training conditional
    Dtc,
    /// Fully independent training conditional
    Fitc,
}

impl ApproximationType {
    /// Whether the mode needs inducing inputs and β
    #[inline]
    pub fn is_sparse(self) -> bool {
        !matches!(self, ApproximationType::Ftc)
    }
}

/// Gradients of the negative log-likelihood, one entry per free quantity
#[derive(Debug, Clone)]
pub struct GpGradients {
    pub x_in: DMatrix<f64>,
    pub x_out: DMatrix<f64>,
    pub inducing: Option<DMatrix<f64>>,
    pub kernel: DVector<f64>,
    /// Gradient with respect to `ln β`
    pub log_beta: Option<f64>,
}

#[derive(Debug, Clone)]
struct Derived {
    x_in: DMatrix<f64>,
    x_out: DMatrix<f64>,
    alpha: DMatrix<f64>,
    neg_log_likelihood: f64,
    mode: ModeState,
}

#[derive(Debug, Clone)]
enum ModeState {
    Full {
        k_inv: DMatrix<f64>,
    },
    Sparse(Box<SparseState>),
}

#[derive(Debug, Clone)]
struct SparseState {
    beta: f64,
    k_uu: DMatrix<f64>,
    k_uu_inv: DMatrix<f64>,
    k_uf: DMatrix<f64>,
    /// `Kuf·D⁻¹`
    k_uf_dinv: DMatrix<f64>,
    a_inv: DMatrix<f64>,
    /// `Kuf·D⁻¹·Y`
    projected: DMatrix<f64>,
    d: DVector<f64>,
    d_inv: DVector<f64>,
    /// `Kuu⁻¹·Kuf`, FITC only
    v: Option<DMatrix<f64>>,
}

/// Gaussian-process likelihood engine shared by every factor node
///
/// All three modes include the `QN/2·ln 2π` normalizer, so the DTC value sits
/// that constant above the usual DTC bound, which omits it. Gradients are
/// unaffected.
#[derive(Debug, Clone)]
pub struct SparseGp {
    approximation: ApproximationType,
    kernel: Box<dyn Kernel>,
    inducing: Option<DMatrix<f64>>,
    log_beta: f64,
    derived: Option<Derived>,
}

impl SparseGp {
    /// Exact (FTC) engine
    pub fn full(kernel: Box<dyn Kernel>) -> Self {
        Self {
            approximation: ApproximationType::Ftc,
            kernel,
            inducing: None,
            log_beta: 0.0,
            derived: None,
        }
    }

    /// Engine for any mode; `inducing` and `beta` are required for DTC/FITC
    /// and ignored for FTC.
    pub fn new(
        approximation: ApproximationType,
        kernel: Box<dyn Kernel>,
        inducing: Option<DMatrix<f64>>,
        beta: f64,
    ) -> Result<Self> {
        if !approximation.is_sparse() {
            return Ok(Self::full(kernel));
        }
        let inducing = inducing.ok_or_else(|| {
            GpdmError::InvalidArgument(format!("{:?} approximation requires inducing inputs", approximation))
        })?;
        if inducing.nrows() == 0 {
            return Err(GpdmError::InvalidArgument("inducing set is empty".to_string()));
        }
        if !(beta.is_finite() && beta > 0.0) {
            return Err(GpdmError::InvalidArgument(format!("beta must be finite and > 0, got {}", beta)));
        }
        Ok(Self {
            approximation,
            kernel,
            inducing: Some(inducing),
            log_beta: beta.ln(),
            derived: None,
        })
    }

    #[inline]
    pub fn approximation(&self) -> ApproximationType {
        self.approximation
    }

    #[inline]
    pub fn kernel(&self) -> &dyn Kernel {
        self.kernel.as_ref()
    }

    pub fn set_kernel_log_parameters(&mut self, params: &[f64]) -> Result<()> {
        self.kernel.set_log_parameters(params)?;
        self.derived = None;
        Ok(())
    }

    #[inline]
    pub fn inducing(&self) -> Option<&DMatrix<f64>> {
        self.inducing.as_ref()
    }

    pub fn set_inducing(&mut self, values: &DMatrix<f64>) -> Result<()> {
        match self.inducing.as_mut() {
            Some(current) if current.shape() == values.shape() => {
                current.copy_from(values);
                self.derived = None;
                Ok(())
            }
            Some(current) => Err(GpdmError::dimension("inducing inputs", current.shape(), values.shape())),
            None => Err(GpdmError::UnsupportedOperation(
                "full approximation has no inducing inputs".to_string(),
            )),
        }
    }

    /// Noise precision, `None` for FTC
    pub fn beta(&self) -> Option<f64> {
        self.approximation.is_sparse().then(|| self.log_beta.exp())
    }

    pub fn log_beta(&self) -> Option<f64> {
        self.approximation.is_sparse().then_some(self.log_beta)
    }

    pub fn set_log_beta(&mut self, log_beta: f64) -> Result<()> {
        if !self.approximation.is_sparse() {
            return Err(GpdmError::UnsupportedOperation(
                "full approximation has no noise precision".to_string(),
            ));
        }
        if !log_beta.is_finite() {
            return Err(GpdmError::InvalidArgument(format!("ln beta is not finite: {}", log_beta)));
        }
        self.log_beta = log_beta;
        self.derived = None;
        Ok(())
    }

    /// Recompute every derived matrix from scratch for the given data.
    pub fn update(&mut self, x_in: &DMatrix<f64>, x_out: &DMatrix<f64>) -> Result<()> {
        if x_in.nrows() != x_out.nrows() {
            return Err(GpdmError::InvalidArgument(format!(
                "inputs have {} rows but outputs have {}",
                x_in.nrows(),
                x_out.nrows()
            )));
        }
        if x_in.nrows() == 0 {
            return Err(GpdmError::InvalidArgument("no training rows".to_string()));
        }
        if let Some(inducing) = &self.inducing {
            if inducing.ncols() != x_in.ncols() {
                return Err(GpdmError::dimension(
                    "inducing inputs",
                    (inducing.nrows(), x_in.ncols()),
                    inducing.shape(),
                ));
            }
        }

        self.derived = None;
        let (alpha, gp_nll, mode) = match self.approximation {
            ApproximationType::Ftc => self.recompute_full(x_in, x_out),
            ApproximationType::Dtc => self.recompute_sparse(x_in, x_out, false)?,
            ApproximationType::Fitc => self.recompute_sparse(x_in, x_out, true)?,
        };
        let neg_log_likelihood = gp_nll - self.kernel.log_prior();
        if !neg_log_likelihood.is_finite() {
            warn!("{:?} negative log-likelihood is not finite", self.approximation);
        }
        trace!("{:?} update: nll = {:.6}", self.approximation, neg_log_likelihood);

        self.derived = Some(Derived {
            x_in: x_in.clone(),
            x_out: x_out.clone(),
            alpha,
            neg_log_likelihood,
            mode,
        });
        Ok(())
    }

    fn recompute_full(&self, x_in: &DMatrix<f64>, x_out: &DMatrix<f64>) -> (DMatrix<f64>, f64, ModeState) {
        let n = x_in.nrows() as f64;
        let q = x_out.ncols() as f64;

        let k = self.kernel.compute(x_in, x_in, CovarianceMode::Training);
        let factor = SymmetricFactor::new(&k);
        let alpha = factor.inverse() * x_out;

        let nll = 0.5 * q * n * (2.0 * PI).ln() + 0.5 * q * factor.log_det() + 0.5 * x_out.dot(&alpha);
        let mode = ModeState::Full {
            k_inv: factor.inverse().clone(),
        };
        (alpha, nll, mode)
    }

    fn recompute_sparse(
        &self,
        x_in: &DMatrix<f64>,
        x_out: &DMatrix<f64>,
        fitc: bool,
    ) -> Result<(DMatrix<f64>, f64, ModeState)> {
        let inducing = self.require_inducing()?;
        let n = x_in.nrows();
        let m = inducing.nrows();
        let q = x_out.ncols() as f64;
        let beta = self.log_beta.exp();

        let k_uu = self.kernel.compute(inducing, inducing, CovarianceMode::Training);
        let k_uu_factor = SymmetricFactor::new(&k_uu);
        let k_uf = self.kernel.compute(inducing, x_in, CovarianceMode::Reconstruction);

        let (d, v) = if fitc {
            let v = k_uu_factor.inverse() * &k_uf;
            let explained = column_dots(&k_uf, &v);
            let diag = self.kernel.diagonal(x_in);
            let mut d = DVector::from_fn(n, |i, _| 1.0 + beta * (diag[i] - explained[i]));
            if d.iter().any(|&di| di <= 0.0) {
                warn!("FITC correction has non-positive entries; clamping");
                d.apply(|di| *di = di.max(f64::EPSILON));
            }
            (d, Some(v))
        } else {
            (DVector::from_element(n, 1.0), None)
        };
        let d_inv = d.map(|di| 1.0 / di);

        let k_uf_dinv = scale_columns(&k_uf, &d_inv);
        let a = symmetrize(&(&k_uu / beta + &k_uf_dinv * k_uf.transpose()));
        let a_factor = SymmetricFactor::new(&a);
        let projected = &k_uf_dinv * x_out;
        let alpha = a_factor.inverse() * &projected;

        let residual: f64 = row_dots(x_out, x_out).component_mul(&d_inv).sum();
        let log_det_d: f64 = d.iter().map(|di| di.ln()).sum();
        let det_diff = a_factor.log_det() - k_uu_factor.log_det();
        let nll = 0.5 * q * n as f64 * (2.0 * PI).ln()
            + 0.5 * q * (log_det_d - (n as f64 - m as f64) * self.log_beta + det_diff)
            + 0.5 * beta * (residual - projected.dot(&alpha));

        let state = SparseState {
            beta,
            k_uu,
            k_uu_inv: k_uu_factor.inverse().clone(),
            k_uf,
            k_uf_dinv,
            a_inv: a_factor.inverse().clone(),
            projected,
            d,
            d_inv,
            v,
        };
        Ok((alpha, nll, ModeState::Sparse(Box::new(state))))
    }

    fn require_inducing(&self) -> Result<&DMatrix<f64>> {
        self.inducing
            .as_ref()
            .ok_or_else(|| GpdmError::NotInitialized("sparse engine has no inducing inputs".to_string()))
    }

    fn derived(&self) -> Result<&Derived> {
        self.derived.as_ref().ok_or(GpdmError::NotComputed)
    }

    /// Negative log marginal likelihood minus the kernel hyperprior
    pub fn neg_log_likelihood(&self) -> Result<f64> {
        Ok(self.derived()?.neg_log_likelihood)
    }

    /// Mean-prediction coefficients (`K⁻¹Y` or `A⁻¹·Kuf·D⁻¹·Y`)
    pub fn alpha(&self) -> Result<&DMatrix<f64>> {
        Ok(&self.derived()?.alpha)
    }

    /// Inputs the prediction kernel is evaluated against: the training inputs
    /// for FTC, the inducing inputs otherwise
    pub fn support(&self) -> Result<&DMatrix<f64>> {
        let derived = self.derived()?;
        Ok(self.inducing.as_ref().unwrap_or(&derived.x_in))
    }

    /// Posterior mean at `x_star`
    pub fn predict(&self, x_star: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        let support = self.support()?;
        if x_star.ncols() != support.ncols() {
            return Err(GpdmError::dimension("prediction inputs", (x_star.nrows(), support.ncols()), x_star.shape()));
        }
        let k_star = self.kernel.compute(x_star, support, CovarianceMode::Reconstruction);
        Ok(k_star * self.alpha()?)
    }

    /// Gradients of [`SparseGp::neg_log_likelihood`]
    pub fn gradients(&self) -> Result<GpGradients> {
        let derived = self.derived()?;
        let mut gradients = match &derived.mode {
            ModeState::Full { k_inv } => self.full_gradients(derived, k_inv),
            ModeState::Sparse(state) => self.sparse_gradients(derived, state)?,
        };
        gradients.kernel -= self.kernel.log_prior_gradient();
        Ok(gradients)
    }

    fn full_gradients(&self, derived: &Derived, k_inv: &DMatrix<f64>) -> GpGradients {
        let q = derived.x_out.ncols() as f64;
        let alpha = &derived.alpha;

        // ∂L/∂K
        let dl_dk = (alpha * alpha.transpose() - k_inv * q) * 0.5;
        let x_in = self.kernel.gradient_x_symmetric(&derived.x_in, &dl_dk);
        let kernel = self
            .kernel
            .gradient_params(&derived.x_in, &derived.x_in, &dl_dk, CovarianceMode::Training);

        GpGradients {
            x_in: -x_in,
            x_out: alpha.clone(),
            inducing: None,
            kernel: -kernel,
            log_beta: None,
        }
    }

    fn sparse_gradients(&self, derived: &Derived, state: &SparseState) -> Result<GpGradients> {
        let inducing = self.require_inducing()?;
        let x_in = &derived.x_in;
        let y = &derived.x_out;
        let alpha = &derived.alpha;
        let beta = state.beta;
        let n = x_in.nrows() as f64;
        let m = inducing.nrows() as f64;
        let q = y.ncols() as f64;

        let g_a = &state.a_inv * (-0.5 * q) - (alpha * alpha.transpose()) * (0.5 * beta);
        let k_fu_alpha = state.k_uf.transpose() * alpha;
        let row_norms = row_dots(y, y);

        let mut dl_dkuu = &g_a / beta + &state.k_uu_inv * (0.5 * q);
        let mut dl_dkuf = (&g_a * &state.k_uf_dinv) * 2.0 + scale_columns(&(alpha * y.transpose()), &state.d_inv) * beta;
        let mut dl_dbeta = 0.5 * q * (n - m) / beta - 0.5 * row_norms.dot(&state.d_inv)
            + 0.5 * state.projected.dot(alpha)
            - g_a.dot(&state.k_uu) / (beta * beta);
        let dl_dy = scale_rows(&(&k_fu_alpha - y), &state.d_inv) * beta;

        let mut diag_weights = None;
        if let Some(v) = &state.v {
            let quadratic = column_dots(&state.k_uf, &(&g_a * &state.k_uf));
            let fit = row_dots(&k_fu_alpha, y);
            let dl_dd = DVector::from_fn(state.d.len(), |i, _| {
                let di = state.d[i];
                let di2 = di * di;
                -0.5 * q / di + 0.5 * beta * row_norms[i] / di2 - quadratic[i] / di2 - beta * fit[i] / di2
            });

            let v_weighted = scale_columns(v, &dl_dd);
            dl_dkuu += (&v_weighted * v.transpose()) * beta;
            dl_dkuf -= v_weighted * (2.0 * beta);
            dl_dbeta += dl_dd.iter().zip(state.d.iter()).map(|(g, di)| g * (di - 1.0)).sum::<f64>() / beta;
            diag_weights = Some(dl_dd * beta);
        }

        let kernel = self.kernel.as_ref();
        let mut g_inducing = kernel.gradient_x_symmetric(inducing, &dl_dkuu) + kernel.gradient_x(inducing, x_in, &dl_dkuf);
        let mut g_x_in = kernel.gradient_x_second(inducing, x_in, &dl_dkuf);
        let mut g_kernel = kernel.gradient_params(inducing, inducing, &dl_dkuu, CovarianceMode::Training)
            + kernel.gradient_params(inducing, x_in, &dl_dkuf, CovarianceMode::Reconstruction);
        if let Some(weights) = &diag_weights {
            g_x_in += kernel.diag_gradient_x(x_in, weights);
            g_kernel += kernel.diag_gradient_params(x_in, weights);
        }

        // Everything above is ∂L; the engine reports ∂(-L).
        g_inducing.neg_mut();
        g_x_in.neg_mut();
        g_kernel.neg_mut();
        Ok(GpGradients {
            x_in: g_x_in,
            x_out: -dl_dy,
            inducing: Some(g_inducing),
            kernel: g_kernel,
            log_beta: Some(-beta * dl_dbeta),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::{CompoundKernel, LinearKernel, RbfKernel, WhiteKernel};
    use approx::assert_relative_eq;

    fn inputs() -> DMatrix<f64> {
        DMatrix::from_fn(7, 4, |i, j| (1.3 * i as f64 + 0.7 * j as f64).sin() + 0.1 * j as f64)
    }

    fn outputs() -> DMatrix<f64> {
        DMatrix::from_fn(7, 2, |i, j| (0.9 * i as f64 - 1.1 * j as f64).cos())
    }

    fn kernel() -> Box<dyn Kernel> {
        Box::new(CompoundKernel::new(vec![
            Box::new(RbfKernel::new(1.2, 0.5)),
            Box::new(LinearKernel::new(0.3)),
            Box::new(WhiteKernel::new(0.05)),
        ]))
    }

    fn engine(approximation: ApproximationType, beta: f64) -> SparseGp {
        let x = inputs();
        let inducing = DMatrix::from_fn(4, 4, |i, j| x[(i * 2, j)] + 0.05 * ((i + j) as f64).cos());
        SparseGp::new(approximation, kernel(), Some(inducing), beta).unwrap()
    }

    fn nll(gp: &mut SparseGp, x_in: &DMatrix<f64>, x_out: &DMatrix<f64>) -> f64 {
        gp.update(x_in, x_out).unwrap();
        gp.neg_log_likelihood().unwrap()
    }

    fn assert_close(analytic: f64, numeric: f64) {
        let scale = 1.0_f64.max(analytic.abs()).max(numeric.abs());
        assert!(
            (analytic - numeric).abs() <= 1e-4 * scale,
            "analytic {} vs numeric {}",
            analytic,
            numeric
        );
    }

    fn check_engine_gradients(approximation: ApproximationType, beta: f64) {
        let x_in = inputs();
        let x_out = outputs();
        let mut gp = engine(approximation, beta);
        gp.update(&x_in, &x_out).unwrap();
        let g = gp.gradients().unwrap();
        let h = 1e-5;

        for i in 0..x_in.nrows() {
            for c in 0..x_in.ncols() {
                let (mut up, mut down) = (x_in.clone(), x_in.clone());
                up[(i, c)] += h;
                down[(i, c)] -= h;
                let numeric = (nll(&mut gp, &up, &x_out) - nll(&mut gp, &down, &x_out)) / (2.0 * h);
                assert_close(g.x_in[(i, c)], numeric);
            }
            for c in 0..x_out.ncols() {
                let (mut up, mut down) = (x_out.clone(), x_out.clone());
                up[(i, c)] += h;
                down[(i, c)] -= h;
                let numeric = (nll(&mut gp, &x_in, &up) - nll(&mut gp, &x_in, &down)) / (2.0 * h);
                assert_close(g.x_out[(i, c)], numeric);
            }
        }

        let params = gp.kernel().log_parameters();
        for p in 0..params.len() {
            let mut moved = params.clone();
            moved[p] += h;
            gp.set_kernel_log_parameters(moved.as_slice()).unwrap();
            let up = nll(&mut gp, &x_in, &x_out);
            moved[p] -= 2.0 * h;
            gp.set_kernel_log_parameters(moved.as_slice()).unwrap();
            let down = nll(&mut gp, &x_in, &x_out);
            gp.set_kernel_log_parameters(params.as_slice()).unwrap();
            assert_close(g.kernel[p], (up - down) / (2.0 * h));
        }

        if approximation.is_sparse() {
            let inducing = gp.inducing().unwrap().clone();
            let g_inducing = g.inducing.as_ref().unwrap();
            for i in 0..inducing.nrows() {
                for c in 0..inducing.ncols() {
                    let (mut up, mut down) = (inducing.clone(), inducing.clone());
                    up[(i, c)] += h;
                    down[(i, c)] -= h;
                    gp.set_inducing(&up).unwrap();
                    let plus = nll(&mut gp, &x_in, &x_out);
                    gp.set_inducing(&down).unwrap();
                    let minus = nll(&mut gp, &x_in, &x_out);
                    gp.set_inducing(&inducing).unwrap();
                    assert_close(g_inducing[(i, c)], (plus - minus) / (2.0 * h));
                }
            }

            let log_beta = gp.log_beta().unwrap();
            gp.set_log_beta(log_beta + h).unwrap();
            let plus = nll(&mut gp, &x_in, &x_out);
            gp.set_log_beta(log_beta - h).unwrap();
            let minus = nll(&mut gp, &x_in, &x_out);
            assert_close(g.log_beta.unwrap(), (plus - minus) / (2.0 * h));
        } else {
            assert!(g.inducing.is_none());
            assert!(g.log_beta.is_none());
        }
    }

    #[test]
    fn test_ftc_gradients() {
        check_engine_gradients(ApproximationType::Ftc, 1.0);
    }

    #[test]
    fn test_dtc_gradients() {
        check_engine_gradients(ApproximationType::Dtc, 1e3);
        check_engine_gradients(ApproximationType::Dtc, 5.0);
    }

    #[test]
    fn test_fitc_gradients() {
        check_engine_gradients(ApproximationType::Fitc, 1e3);
        check_engine_gradients(ApproximationType::Fitc, 5.0);
    }

    #[test]
    fn test_sparse_modes_collapse_to_exact_when_inducing_equals_inputs() {
        // With Xu = X and a noise-free kernel, DTC and FITC both reduce to an
        // exact GP with covariance K + I/β.
        let x_in = DMatrix::from_fn(5, 2, |i, j| 1.5 * i as f64 + 0.3 * j as f64);
        let x_out = outputs().rows(0, 5).into_owned();
        let beta = 20.0;

        let exact_kernel: Box<dyn Kernel> = Box::new(CompoundKernel::new(vec![
            Box::new(RbfKernel::new(1.0, 0.8)),
            Box::new(WhiteKernel::new(1.0 / beta)),
        ]));
        let mut exact = SparseGp::full(exact_kernel);
        let expected = nll(&mut exact, &x_in, &x_out);

        for approximation in [ApproximationType::Dtc, ApproximationType::Fitc] {
            let mut sparse =
                SparseGp::new(approximation, Box::new(RbfKernel::new(1.0, 0.8)), Some(x_in.clone()), beta).unwrap();
            let value = nll(&mut sparse, &x_in, &x_out);
            assert_relative_eq!(value, expected, max_relative = 1e-6);

            let prediction = sparse.predict(&x_in).unwrap();
            let exact_prediction = exact.predict(&x_in).unwrap();
            assert_relative_eq!(prediction, exact_prediction, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_dtc_matches_dense_marginal_with_normalizer() {
        let (x_in, y) = (inputs(), outputs());
        let beta = 40.0;
        let mut gp = engine(ApproximationType::Dtc, beta);
        let value = nll(&mut gp, &x_in, &y);

        // Y[:, q] ~ N(0, Kfu·Kuu⁻¹·Kuf + I/β)
        let inducing = gp.inducing().unwrap().clone();
        let k_uu = gp.kernel().compute(&inducing, &inducing, CovarianceMode::Training);
        let k_uf = gp.kernel().compute(&inducing, &x_in, CovarianceMode::Reconstruction);
        let k_uu_inv = k_uu.try_inverse().unwrap();
        let n = x_in.nrows();
        let sigma = k_uf.transpose() * k_uu_inv * &k_uf + DMatrix::identity(n, n) / beta;
        let chol = sigma.cholesky().unwrap();
        let log_det = 2.0 * chol.l().diagonal().map(|d| d.ln()).sum();
        let quadratic = y.dot(&chol.solve(&y));
        let q = y.ncols() as f64;
        let normalizer = 0.5 * q * n as f64 * (2.0 * PI).ln();
        let expected = normalizer + 0.5 * q * log_det + 0.5 * quadratic - gp.kernel().log_prior();

        assert_relative_eq!(value, expected, max_relative = 1e-8);
    }

    #[test]
    fn test_reading_before_update_fails() {
        let gp = engine(ApproximationType::Fitc, 10.0);
        assert!(matches!(gp.neg_log_likelihood(), Err(GpdmError::NotComputed)));
        assert!(matches!(gp.gradients(), Err(GpdmError::NotComputed)));
    }

    #[test]
    fn test_parameter_change_invalidates_cache() {
        let mut gp = engine(ApproximationType::Dtc, 10.0);
        gp.update(&inputs(), &outputs()).unwrap();
        assert!(gp.neg_log_likelihood().is_ok());

        gp.set_log_beta(1.0).unwrap();
        assert!(matches!(gp.neg_log_likelihood(), Err(GpdmError::NotComputed)));
    }

    #[test]
    fn test_update_is_deterministic() {
        let mut gp = engine(ApproximationType::Fitc, 100.0);
        let first = nll(&mut gp, &inputs(), &outputs());
        let second = nll(&mut gp, &inputs(), &outputs());
        assert_eq!(first.to_bits(), second.to_bits());
    }

    #[test]
    fn test_configuration_errors() {
        assert!(SparseGp::new(ApproximationType::Dtc, kernel(), None, 1.0).is_err());
        assert!(SparseGp::new(ApproximationType::Fitc, kernel(), Some(DMatrix::zeros(2, 4)), -1.0).is_err());

        let mut gp = SparseGp::full(kernel());
        assert!(matches!(gp.set_log_beta(0.0), Err(GpdmError::UnsupportedOperation(_))));
        assert!(gp.update(&inputs(), &outputs().rows(0, 3).into_owned()).is_err());

        let mut sparse = engine(ApproximationType::Dtc, 1.0);
        assert!(sparse.set_inducing(&DMatrix::zeros(3, 4)).is_err());
        assert!(sparse.update(&DMatrix::zeros(7, 3), &outputs()).is_err());
    }
}
