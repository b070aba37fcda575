//! Dynamics model as a factor graph node
//!
//! The factor reads the shared latent matrix through a connector and owns
//! three private data nodes created at initialization: the inducing inputs
//! (sparse modes), the kernel log-hyperparameters as a 1×P row and `ln β` as
//! a 1×1 matrix (sparse modes). All of them are optimized jointly with the
//! latent positions.
//!
//! Copyright (c) 2025 Mohammad Atashi <mohammadaliatashi@icloud.com>

use std::any::Any;

use log::debug;
use nalgebra::DMatrix;
use rand::Rng;

use super::approximation::SparseDynamicsApproximation;
use super::prediction::PredictionStruct;
use super::projection::LatentProjection;
use super::topology::Segments;
use crate::config::DynamicsConfig;
use crate::error::Result;
use crate::graph::{DataConnector, DataNode, DataNodeId, DataStore, FactorNode};
use crate::kernel::Kernel;

/// Second-order GP dynamics over (some columns of) a shared latent node
#[derive(Debug, Clone)]
pub struct DynamicsFactorNode {
    name: String,
    latent: DataConnector,
    inducing: Option<DataConnector>,
    kernel_parameters: DataConnector,
    log_beta: Option<DataConnector>,
    model: SparseDynamicsApproximation,
}

impl DynamicsFactorNode {
    /// Build the dynamics model over the latent node `latent` and register its
    /// private parameter nodes in `store`.
    ///
    /// The latent node's segments are used when present, otherwise the whole
    /// sequence is one segment.
    pub fn initialize(
        name: impl Into<String>,
        store: &mut DataStore,
        latent: DataNodeId,
        kernel: Box<dyn Kernel>,
        config: &DynamicsConfig,
    ) -> Result<Self> {
        let (x, segments) = latent_state(store, latent)?;
        let model = SparseDynamicsApproximation::initialize(&x, &segments, kernel, config)?;
        Self::from_model(name, store, latent, model)
    }

    pub fn initialize_with_rng<R: Rng + ?Sized>(
        name: impl Into<String>,
        store: &mut DataStore,
        latent: DataNodeId,
        kernel: Box<dyn Kernel>,
        config: &DynamicsConfig,
        rng: &mut R,
    ) -> Result<Self> {
        let (x, segments) = latent_state(store, latent)?;
        let model = SparseDynamicsApproximation::initialize_with_rng(&x, &segments, kernel, config, rng)?;
        Self::from_model(name, store, latent, model)
    }

    /// Wrap an existing model, for instance one restored from a snapshot.
    pub fn from_model(
        name: impl Into<String>,
        store: &mut DataStore,
        latent: DataNodeId,
        model: SparseDynamicsApproximation,
    ) -> Result<Self> {
        let name = name.into();
        let shape = (model.topology().num_rows(), model.latent_dim());
        let latent = DataConnector::connect_with_shape(store, latent, shape)?;

        let inducing = match model.inducing() {
            Some(xu) => {
                let id = store.insert(DataNode::new(format!("{}.inducing", name), xu.clone()));
                Some(DataConnector::connect(store, id)?)
            }
            None => None,
        };

        let params = model.kernel().log_parameters();
        let id = store.insert(DataNode::new(
            format!("{}.kernel", name),
            DMatrix::from_row_slice(1, params.len(), params.as_slice()),
        ));
        let kernel_parameters = DataConnector::connect(store, id)?;

        let log_beta = match model.log_beta() {
            Some(value) => {
                let id = store.insert(DataNode::new(format!("{}.log_beta", name), DMatrix::from_element(1, 1, value)));
                Some(DataConnector::connect(store, id)?)
            }
            None => None,
        };

        debug!(
            "Dynamics factor '{}' over {} latent column(s) of a {}x{} node",
            name,
            model.projection().output_dim(),
            shape.0,
            shape.1
        );
        Ok(Self {
            name,
            latent,
            inducing,
            kernel_parameters,
            log_beta,
            model,
        })
    }

    #[inline]
    pub fn model(&self) -> &SparseDynamicsApproximation {
        &self.model
    }

    #[inline]
    pub fn projection(&self) -> &LatentProjection {
        self.model.projection()
    }

    pub fn latent_node(&self) -> DataNodeId {
        self.latent.node()
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

    /// Independent forward predictor over the current trained state
    pub fn spawn_predictor(&self) -> Result<PredictionStruct> {
        self.model.prediction()
    }

    pub fn predict(&self, x_star: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        self.model.predict(x_star)
    }

    pub fn simulate(&self, seed: &DMatrix<f64>, steps: usize) -> Result<DMatrix<f64>> {
        self.model.simulate(seed, steps)
    }
}

fn latent_state(store: &DataStore, latent: DataNodeId) -> Result<(DMatrix<f64>, Segments)> {
    let node = store.get(latent)?;
    let segments = node.segments().cloned().unwrap_or_else(Segments::single);
    Ok((node.values().clone(), segments))
}

impl FactorNode for DynamicsFactorNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn connectors(&self) -> Vec<DataConnector> {
        [Some(self.latent), self.inducing, Some(self.kernel_parameters), self.log_beta]
            .into_iter()
            .flatten()
            .collect()
    }

    fn update(&mut self, store: &DataStore) -> Result<()> {
        let node = self.latent.data_node(store)?;
        if let Some(segments) = node.segments() {
            if segments != self.model.segments() {
                self.model.set_segments(segments, node.shape().0)?;
            }
        }
        if let Some(inducing) = &self.inducing {
            self.model.set_inducing(inducing.values(store)?)?;
        }
        self.model
            .set_kernel_log_parameters(self.kernel_parameters.values(store)?.as_slice())?;
        if let Some(log_beta) = &self.log_beta {
            self.model.set_log_beta(log_beta.values(store)?[(0, 0)])?;
        }
        self.model.update_parameter(node.values())
    }

    fn neg_log_likelihood(&self) -> Result<f64> {
        self.model.neg_log_likelihood()
    }

    fn push_gradients(&self, store: &mut DataStore) -> Result<()> {
        let gradients = self.model.compute_all_gradients()?;
        self.latent.push_gradient(store, &gradients.x)?;
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
