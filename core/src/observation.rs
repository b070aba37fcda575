//! Observation mapping from latent space to data space
//!
//! [`GplvmFactorNode`] is the GPLVM term of a GPDM: a Gaussian process from
//! latent points `X` (N×Q) to observations `Y` (N×D), evaluated with the same
//! [`SparseGp`] engine as the dynamics. Observations are modelled as
//! zero-mean, so they should be centered before they enter the graph.
//!
//! # Mathematical Foundations
//! ```text
//! NLL = -ln p(Y | X, θ, β) - ln p(θ)        Y[:, d] ~ N(0, K(X, X) [+ sparse approximation])
//! ```
//!
//! Copyright (c) 2025 Mohammad Atashi <mohammadaliatashi@icloud.com>

use std::any::Any;

use log::debug;
use nalgebra::DMatrix;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

use crate::config::SparseGpConfig;
use crate::dynamics::SparseGp;
use crate::error::{GpdmError, Result};
use crate::graph::{DataConnector, DataNode, DataNodeId, DataStore, FactorNode};
use crate::kernel::Kernel;

/// GP likelihood of an observed node given a latent node
#[derive(Debug, Clone)]
pub struct GplvmFactorNode {
    name: String,
    latent: DataConnector,
    observed: DataConnector,
    inducing: Option<DataConnector>,
    kernel_parameters: DataConnector,
    log_beta: Option<DataConnector>,
    gp: SparseGp,
}

impl GplvmFactorNode {
    pub fn initialize(
        name: impl Into<String>,
        store: &mut DataStore,
        latent: DataNodeId,
        observed: DataNodeId,
        kernel: Box<dyn Kernel>,
        config: &SparseGpConfig,
    ) -> Result<Self> {
        let mut rng = ChaCha20Rng::seed_from_u64(config.seed);
        Self::initialize_with_rng(name, store, latent, observed, kernel, config, &mut rng)
    }

    /// Inducing inputs (sparse modes) are a random subset of the latent rows.
    pub fn initialize_with_rng<R: Rng + ?Sized>(
        name: impl Into<String>,
        store: &mut DataStore,
        latent: DataNodeId,
        observed: DataNodeId,
        kernel: Box<dyn Kernel>,
        config: &SparseGpConfig,
        rng: &mut R,
    ) -> Result<Self> {
        config.validate()?;
        let name = name.into();
        let latent = DataConnector::connect(store, latent)?;
        let observed = DataConnector::connect(store, observed)?;
        let x = latent.values(store)?;
        let n = x.nrows();
        if observed.shape().0 != n {
            return Err(GpdmError::InvalidArgument(format!(
                "latent node has {} rows but observed node has {}",
                n,
                observed.shape().0
            )));
        }
        if n == 0 {
            return Err(GpdmError::InvalidArgument("latent node has no rows".to_string()));
        }

        let inducing_values = if config.approximation.is_sparse() {
            let m = config.num_inducing_max.min(n);
            let mut indices = sample(rng, n, m).into_vec();
            indices.sort_unstable();
            Some(DMatrix::from_fn(m, x.ncols(), |i, j| x[(indices[i], j)]))
        } else {
            None
        };
        let gp = SparseGp::new(config.approximation, kernel, inducing_values, config.initial_beta)?;

        let inducing = match gp.inducing() {
            Some(xu) => {
                let id = store.insert(DataNode::new(format!("{}.inducing", name), xu.clone()));
                Some(DataConnector::connect(store, id)?)
            }
            None => None,
        };
        let params = gp.kernel().log_parameters();
        let id = store.insert(DataNode::new(
            format!("{}.kernel", name),
            DMatrix::from_row_slice(1, params.len(), params.as_slice()),
        ));
        let kernel_parameters = DataConnector::connect(store, id)?;
        let log_beta = match gp.log_beta() {
            Some(value) => {
                let id = store.insert(DataNode::new(format!("{}.log_beta", name), DMatrix::from_element(1, 1, value)));
                Some(DataConnector::connect(store, id)?)
            }
            None => None,
        };

        debug!(
            "Observation factor '{}': {:?}, N = {}, D = {}",
            name,
            config.approximation,
            n,
            observed.shape().1
        );
        Ok(Self {
            name,
            latent,
            observed,
            inducing,
            kernel_parameters,
            log_beta,
            gp,
        })
    }

    #[inline]
    pub fn gp(&self) -> &SparseGp {
        &self.gp
    }

    pub fn inducing_node(&self) -> Option<DataNodeId> {
        self.inducing.map(|c| c.node())
    }

    pub fn kernel_node(&self) -> DataNodeId {
        self.kernel_parameters.node()
    }

    pub fn log_beta_node(&self) -> Option<DataNodeId> {
        self.log_beta.map(|c| c.node())
    }

    /// Predicted observations at latent points `x_star`
    pub fn reconstruct(&self, x_star: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        self.gp.predict(x_star)
    }
}

impl FactorNode for GplvmFactorNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn connectors(&self) -> Vec<DataConnector> {
        [
            Some(self.latent),
            Some(self.observed),
            self.inducing,
            Some(self.kernel_parameters),
            self.log_beta,
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    fn update(&mut self, store: &DataStore) -> Result<()> {
        if let Some(inducing) = &self.inducing {
            self.gp.set_inducing(inducing.values(store)?)?;
        }
        self.gp
            .set_kernel_log_parameters(self.kernel_parameters.values(store)?.as_slice())?;
        if let Some(log_beta) = &self.log_beta {
            self.gp.set_log_beta(log_beta.values(store)?[(0, 0)])?;
        }
        self.gp.update(self.latent.values(store)?, self.observed.values(store)?)
    }

    fn neg_log_likelihood(&self) -> Result<f64> {
        self.gp.neg_log_likelihood()
    }

    fn push_gradients(&self, store: &mut DataStore) -> Result<()> {
        let gradients = self.gp.gradients()?;
        self.latent.push_gradient(store, &gradients.x_in)?;
        self.observed.push_gradient(store, &gradients.x_out)?;
        if let (Some(connector), Some(g)) = (&self.inducing, &gradients.inducing) {
            connector.push_gradient(store, g)?;
        }
        let g_kernel = DMatrix::from_row_slice(1, gradients.kernel.len(), gradients.kernel.as_slice());
        self.kernel_parameters.push_gradient(store, &g_kernel)?;
        if let (Some(connector), Some(g)) = (&self.log_beta, gradients.log_beta) {
            connector.push_gradient(store, &DMatrix::from_element(1, 1, g))?;
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamics::ApproximationType;
    use crate::kernel::{CompoundKernel, RbfKernel, WhiteKernel};
    use approx::assert_relative_eq;

    fn kernel() -> Box<dyn Kernel> {
        Box::new(CompoundKernel::new(vec![
            Box::new(RbfKernel::new(1.0, 1.0)),
            Box::new(WhiteKernel::new(0.01)),
        ]))
    }

    fn store() -> (DataStore, DataNodeId, DataNodeId) {
        let mut store = DataStore::new();
        let x = DMatrix::from_fn(8, 2, |i, j| (0.7 * i as f64 + j as f64).cos());
        let y = DMatrix::from_fn(8, 3, |i, j| x[(i, 0)] * (j as f64 + 1.0) - x[(i, 1)]);
        let latent = store.insert(DataNode::new("x", x));
        let observed = store.insert(DataNode::fixed("y", y));
        (store, latent, observed)
    }

    #[test]
    fn test_reconstruction_at_training_points_removes_noise_share() {
        let (mut store, latent, observed) = store();
        let mut node =
            GplvmFactorNode::initialize("obs", &mut store, latent, observed, kernel(), &SparseGpConfig::default())
                .unwrap();
        node.update(&store).unwrap();

        // (K - σ²I)·K⁻¹Y = Y - σ²α
        let x = store.get(latent).unwrap().values().clone();
        let y = store.get(observed).unwrap().values();
        let expected = y - node.gp().alpha().unwrap() * 0.01;
        let reconstructed = node.reconstruct(&x).unwrap();
        assert_relative_eq!(reconstructed, expected, epsilon = 1e-8);
    }

    #[test]
    fn test_sparse_mode_creates_inducing_nodes() {
        let (mut store, latent, observed) = store();
        let config = SparseGpConfig {
            approximation: ApproximationType::Fitc,
            num_inducing_max: 4,
            ..SparseGpConfig::default()
        };
        let mut node = GplvmFactorNode::initialize("obs", &mut store, latent, observed, kernel(), &config).unwrap();
        assert_eq!(node.connectors().len(), 5);
        assert_eq!(store.get(node.inducing_node().unwrap()).unwrap().shape(), (4, 2));

        node.update(&store).unwrap();
        node.push_gradients(&mut store).unwrap();
        assert!(store.get(latent).unwrap().gradient().iter().any(|&g| g != 0.0));
        assert!(node.neg_log_likelihood().unwrap().is_finite());
    }

    #[test]
    fn test_row_mismatch_is_rejected() {
        let (mut store, latent, _) = store();
        let short = store.insert(DataNode::fixed("y", DMatrix::zeros(5, 3)));
        let result = GplvmFactorNode::initialize("obs", &mut store, latent, short, kernel(), &SparseGpConfig::default());
        assert!(matches!(result, Err(GpdmError::InvalidArgument(_))));
    }
}
