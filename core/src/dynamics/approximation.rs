//! Second-order GP dynamics over a segmented latent sequence
//!
//! [`SparseDynamicsApproximation`] turns a latent matrix `X` into the
//! regression problem `[xₜ₋₁, xₜ₋₂] ↦ xₜ` through the segment topology, hands
//! it to the [`SparseGp`] engine and maps the engine's gradients back onto
//! `X`. The first two samples of every segment are not predicted by the GP;
//! they carry independent Gaussian priors instead.
//!
//! # Mathematical Foundations
//! ```text
//! Xin[r]  = [X[i-1], X[i-2]]        Xout[r] = X[i, cols]        (i-2, i-1, i) = order3[r]
//!
//! NLL = -ln p(Xout | Xin, θ, β) - ln p(θ)
//!     + Σ_b ½|X[b]|²/σ²       + Q'/2·ln 2πσ²                    (segment starts)
//!     + Σ_b ½|X[b+1]-X[b]|²/σ² + Q'/2·ln 2πσ²
//! ```
//!
//! Copyright (c) 2025 Mohammad Atashi <mohammadaliatashi@icloud.com>

use std::f64::consts::PI;

use log::debug;
use nalgebra::{DMatrix, DVector};
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

use super::prediction::PredictionStruct;
use super::projection::LatentProjection;
use super::sparse_gp::{ApproximationType, SparseGp};
use super::topology::{SegmentTopology, Segments};
use crate::config::DynamicsConfig;
use crate::error::{GpdmError, Result};
use crate::kernel::Kernel;

/// Gradients of [`SparseDynamicsApproximation::neg_log_likelihood`]
#[derive(Debug, Clone)]
pub struct DynamicsGradients {
    /// N×Q, summed over every triple a row takes part in
    pub x: DMatrix<f64>,
    pub inducing: Option<DMatrix<f64>>,
    pub kernel: DVector<f64>,
    pub log_beta: Option<f64>,
}

/// GP dynamics model of one latent sequence
#[derive(Debug, Clone)]
pub struct SparseDynamicsApproximation {
    gp: SparseGp,
    segments: Segments,
    topology: SegmentTopology,
    projection: LatentProjection,
    boundary_variance: f64,
    /// Rows of the initial `Xin` the inducing inputs were drawn from
    inducing_indices: Vec<usize>,
    latent: Option<DMatrix<f64>>,
}

impl SparseDynamicsApproximation {
    /// Build the model for `x`, drawing inducing inputs with the configured seed.
    pub fn initialize(
        x: &DMatrix<f64>,
        segments: &Segments,
        kernel: Box<dyn Kernel>,
        config: &DynamicsConfig,
    ) -> Result<Self> {
        let mut rng = ChaCha20Rng::seed_from_u64(config.gp.seed);
        Self::initialize_with_rng(x, segments, kernel, config, &mut rng)
    }

    /// Build the model for `x` with an injected sampler for the inducing subset.
    pub fn initialize_with_rng<R: Rng + ?Sized>(
        x: &DMatrix<f64>,
        segments: &Segments,
        kernel: Box<dyn Kernel>,
        config: &DynamicsConfig,
        rng: &mut R,
    ) -> Result<Self> {
        config.validate()?;
        let projection = LatentProjection::from_columns(config.output_columns.as_deref(), x.ncols())?;
        let topology = build_topology(segments, x)?;

        let (inducing, inducing_indices) = if config.gp.approximation.is_sparse() {
            let x_in = regression_inputs(x, &topology);
            let available = x_in.nrows();
            let m = config.gp.num_inducing_max.min(available);
            let mut indices = sample(rng, available, m).into_vec();
            indices.sort_unstable();
            let inducing = DMatrix::from_fn(m, x_in.ncols(), |i, j| x_in[(indices[i], j)]);
            (Some(inducing), indices)
        } else {
            (None, Vec::new())
        };

        let gp = SparseGp::new(config.gp.approximation, kernel, inducing, config.gp.initial_beta)?;
        debug!(
            "Initialized {:?} dynamics: N = {}, Q = {}, segments = {}, triples = {}, inducing = {}",
            config.gp.approximation,
            x.nrows(),
            x.ncols(),
            topology.num_segments(),
            topology.num_triples(),
            inducing_indices.len()
        );

        Ok(Self {
            gp,
            segments: segments.clone(),
            topology,
            projection,
            boundary_variance: config.boundary_variance,
            inducing_indices,
            latent: None,
        })
    }

    /// Reassemble a model from previously trained parts.
    pub(crate) fn from_parts(
        gp: SparseGp,
        segments: Segments,
        num_rows: usize,
        projection: LatentProjection,
        boundary_variance: f64,
        inducing_indices: Vec<usize>,
    ) -> Result<Self> {
        let topology = SegmentTopology::from_segments(&segments, num_rows)?;
        if topology.num_triples() == 0 {
            return Err(no_triples(&segments, num_rows));
        }
        if !(boundary_variance.is_finite() && boundary_variance > 0.0) {
            return Err(GpdmError::InvalidArgument(format!(
                "boundary variance must be finite and > 0, got {}",
                boundary_variance
            )));
        }
        Ok(Self {
            gp,
            segments,
            topology,
            projection,
            boundary_variance,
            inducing_indices,
            latent: None,
        })
    }

    #[inline]
    pub fn approximation(&self) -> ApproximationType {
        self.gp.approximation()
    }

    #[inline]
    pub fn kernel(&self) -> &dyn Kernel {
        self.gp.kernel()
    }

    #[inline]
    pub fn topology(&self) -> &SegmentTopology {
        &self.topology
    }

    #[inline]
    pub fn segments(&self) -> &Segments {
        &self.segments
    }

    #[inline]
    pub fn projection(&self) -> &LatentProjection {
        &self.projection
    }

    #[inline]
    pub fn latent_dim(&self) -> usize {
        self.projection.latent_dim()
    }

    #[inline]
    pub fn boundary_variance(&self) -> f64 {
        self.boundary_variance
    }

    pub fn inducing_indices(&self) -> &[usize] {
        &self.inducing_indices
    }

    pub fn inducing(&self) -> Option<&DMatrix<f64>> {
        self.gp.inducing()
    }

    pub fn beta(&self) -> Option<f64> {
        self.gp.beta()
    }

    pub fn log_beta(&self) -> Option<f64> {
        self.gp.log_beta()
    }

    /// Latent matrix of the most recent update
    pub fn latent(&self) -> Option<&DMatrix<f64>> {
        self.latent.as_ref()
    }

    pub fn set_inducing(&mut self, inducing: &DMatrix<f64>) -> Result<()> {
        self.gp.set_inducing(inducing)?;
        self.latent = None;
        Ok(())
    }

    pub fn set_log_beta(&mut self, log_beta: f64) -> Result<()> {
        self.gp.set_log_beta(log_beta)?;
        self.latent = None;
        Ok(())
    }

    pub fn set_kernel_log_parameters(&mut self, params: &[f64]) -> Result<()> {
        self.gp.set_kernel_log_parameters(params)?;
        self.latent = None;
        Ok(())
    }

    /// Replace the segmentation; the topology is rebuilt from scratch.
    pub fn set_segments(&mut self, segments: &Segments, num_rows: usize) -> Result<()> {
        let topology = SegmentTopology::from_segments(segments, num_rows)?;
        if topology.num_triples() == 0 {
            return Err(no_triples(segments, num_rows));
        }
        self.segments = segments.clone();
        self.topology = topology;
        self.latent = None;
        Ok(())
    }

    /// Recompute every derived quantity for the latent matrix `x`.
    pub fn update_parameter(&mut self, x: &DMatrix<f64>) -> Result<()> {
        let expected = (self.topology.num_rows(), self.latent_dim());
        if x.shape() != expected {
            return Err(GpdmError::dimension("latent matrix", expected, x.shape()));
        }
        self.latent = None;

        let x_in = regression_inputs(x, &self.topology);
        let targets: Vec<usize> = self.topology.order3().iter().map(|t| t[2]).collect();
        let x_out = self.projection.gather_rows(x, &targets);
        self.gp.update(&x_in, &x_out)?;
        self.latent = Some(x.clone());
        Ok(())
    }

    fn updated_latent(&self) -> Result<&DMatrix<f64>> {
        self.latent.as_ref().ok_or(GpdmError::NotComputed)
    }

    /// Negative log-likelihood including boundary priors and the kernel hyperprior
    pub fn neg_log_likelihood(&self) -> Result<f64> {
        let x = self.updated_latent()?;
        Ok(self.gp.neg_log_likelihood()? + self.boundary_nll(x))
    }

    fn boundary_nll(&self, x: &DMatrix<f64>) -> f64 {
        let variance = self.boundary_variance;
        let columns = self.projection.columns();
        let normalizer = 0.5 * columns.len() as f64 * (2.0 * PI * variance).ln();

        let mut nll = 0.0;
        for &b in self.topology.start1() {
            let energy: f64 = columns.iter().map(|&c| x[(b, c)] * x[(b, c)]).sum();
            nll += 0.5 * energy / variance + normalizer;
        }
        for &[b, b1] in self.topology.start2() {
            let energy: f64 = columns.iter().map(|&c| (x[(b1, c)] - x[(b, c)]).powi(2)).sum();
            nll += 0.5 * energy / variance + normalizer;
        }
        nll
    }

    /// Gradients of the negative log-likelihood with respect to every free quantity
    pub fn compute_all_gradients(&self) -> Result<DynamicsGradients> {
        let x = self.updated_latent()?;
        let engine = self.gp.gradients()?;
        let q = self.latent_dim();
        let columns = self.projection.columns();

        let mut g_x = DMatrix::zeros(x.nrows(), q);
        for (r, &[o0, o1, o2]) in self.topology.order3().iter().enumerate() {
            for j in 0..q {
                g_x[(o1, j)] += engine.x_in[(r, j)];
                g_x[(o0, j)] += engine.x_in[(r, q + j)];
            }
            for (c, &column) in columns.iter().enumerate() {
                g_x[(o2, column)] += engine.x_out[(r, c)];
            }
        }

        let variance = self.boundary_variance;
        for &b in self.topology.start1() {
            for &c in columns {
                g_x[(b, c)] += x[(b, c)] / variance;
            }
        }
        for &[b, b1] in self.topology.start2() {
            for &c in columns {
                let step = (x[(b1, c)] - x[(b, c)]) / variance;
                g_x[(b1, c)] += step;
                g_x[(b, c)] -= step;
            }
        }

        Ok(DynamicsGradients {
            x: g_x,
            inducing: engine.inducing,
            kernel: engine.kernel,
            log_beta: engine.log_beta,
        })
    }

    /// Mean prediction at 2Q-column inputs (most recent state first)
    pub fn predict(&self, x_star: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        self.gp.predict(x_star)
    }

    /// Detached predictor over the current kernel and coefficients
    pub fn prediction(&self) -> Result<PredictionStruct> {
        PredictionStruct::new(
            self.gp.kernel().clone_box(),
            self.gp.alpha()?.clone(),
            self.gp.support()?.clone(),
            self.projection.clone(),
        )
    }

    /// Autoregressive rollout of `steps` rows from a 2×Q seed
    pub fn simulate(&self, seed: &DMatrix<f64>, steps: usize) -> Result<DMatrix<f64>> {
        self.prediction()?.simulate(seed, steps)
    }
}

fn build_topology(segments: &Segments, x: &DMatrix<f64>) -> Result<SegmentTopology> {
    if x.ncols() == 0 {
        return Err(GpdmError::InvalidArgument("latent matrix has no columns".to_string()));
    }
    let topology = SegmentTopology::from_segments(segments, x.nrows())?;
    if topology.num_triples() == 0 {
        return Err(no_triples(segments, x.nrows()));
    }
    Ok(topology)
}

fn no_triples(segments: &Segments, num_rows: usize) -> GpdmError {
    let lengths = segments.lengths(num_rows).unwrap_or_default();
    let (segment, length) = lengths
        .iter()
        .copied()
        .enumerate()
        .max_by_key(|&(_, length)| length)
        .unwrap_or((0, num_rows));
    GpdmError::InsufficientData {
        segment,
        length,
        required: 3,
    }
}

/// `Xin[r] = [X[i-1], X[i-2]]` for every triple
fn regression_inputs(x: &DMatrix<f64>, topology: &SegmentTopology) -> DMatrix<f64> {
    let q = x.ncols();
    let order3 = topology.order3();
    DMatrix::from_fn(order3.len(), 2 * q, |r, j| {
        if j < q {
            x[(order3[r][1], j)]
        } else {
            x[(order3[r][0], j - q)]
        }
    })
}
