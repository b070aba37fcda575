//! Joint objective over a set of factors
//!
//! # Parameter Layout
//! ```text
//! θ = [vec(node₀), vec(node₁), ...]      non-fixed nodes in creation order,
//!                                        each flattened column-major
//! ```
//!
//! Copyright (c) 2025 Mohammad Atashi <mohammadaliatashi@icloud.com>

use log::debug;
use nalgebra::{DMatrix, DVector};

use super::data::{DataNode, DataNodeId, DataStore};
use super::factor::FactorNode;
use crate::error::{GpdmError, Result};

/// Contract between a model and an external gradient-based optimizer
pub trait Objective {
    fn num_parameters(&self) -> usize;

    fn parameters(&self) -> DVector<f64>;

    /// Install a parameter vector and bring all derived state up to date
    fn set_parameters(&mut self, params: &DVector<f64>) -> Result<()>;

    /// The scalar to minimize, i.e. the negative log-likelihood of the model
    fn log_likelihood(&self) -> Result<f64>;

    /// Gradient of [`Objective::log_likelihood`] in the layout of [`Objective::parameters`]
    fn compute_all_gradients(&mut self) -> Result<DVector<f64>>;
}

/// Data store plus the factors defined over it
#[derive(Debug, Default)]
pub struct FactorGraph {
    store: DataStore,
    factors: Vec<Box<dyn FactorNode>>,
}

impl FactorGraph {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn store(&self) -> &DataStore {
        &self.store
    }

    /// Mutable store access, mainly for factor initialization
    #[inline]
    pub fn store_mut(&mut self) -> &mut DataStore {
        &mut self.store
    }

    pub fn add_data_node(&mut self, node: DataNode) -> DataNodeId {
        self.store.insert(node)
    }

    /// Register a factor; every node it connects to must already exist.
    pub fn add_factor(&mut self, factor: Box<dyn FactorNode>) -> Result<()> {
        for connector in factor.connectors() {
            let node = self.store.get(connector.node())?;
            if node.shape() != connector.shape() {
                return Err(GpdmError::dimension(node.name(), connector.shape(), node.shape()));
            }
        }
        debug!("Factor '{}' added with {} connector(s)", factor.name(), factor.connectors().len());
        self.factors.push(factor);
        Ok(())
    }

    pub fn factors(&self) -> &[Box<dyn FactorNode>] {
        &self.factors
    }

    /// The factor registered under `name`, if it has type `T`
    pub fn factor<T: FactorNode>(&self, name: &str) -> Option<&T> {
        self.factors
            .iter()
            .find(|factor| factor.name() == name)
            .and_then(|factor| factor.as_any().downcast_ref::<T>())
    }

    /// Let every factor pull the current node values and recompute.
    pub fn update(&mut self) -> Result<()> {
        for factor in &mut self.factors {
            factor.update(&self.store)?;
        }
        Ok(())
    }

    /// Per-factor terms, in insertion order
    pub fn factor_likelihoods(&self) -> Result<Vec<(String, f64)>> {
        self.factors
            .iter()
            .map(|factor| -> Result<(String, f64)> { Ok((factor.name().to_string(), factor.neg_log_likelihood()?)) })
            .collect()
    }
}

impl Objective for FactorGraph {
    fn num_parameters(&self) -> usize {
        self.store.iter().map(|(_, node)| node.num_parameters()).sum()
    }

    fn parameters(&self) -> DVector<f64> {
        let values = self
            .store
            .iter()
            .filter(|(_, node)| !node.is_fixed())
            .flat_map(|(_, node)| node.values().iter().copied());
        DVector::from_iterator(self.num_parameters(), values)
    }

    fn set_parameters(&mut self, params: &DVector<f64>) -> Result<()> {
        let expected = self.num_parameters();
        if params.len() != expected {
            return Err(GpdmError::InvalidArgument(format!(
                "parameter vector has {} entries, graph has {}",
                params.len(),
                expected
            )));
        }

        let mut offset = 0;
        for node in self.store.iter_mut().filter(|node| !node.is_fixed()) {
            let (rows, cols) = node.shape();
            let values = DMatrix::from_iterator(rows, cols, params.rows(offset, rows * cols).iter().copied());
            node.set_values(&values)?;
            offset += rows * cols;
        }
        self.update()
    }

    fn log_likelihood(&self) -> Result<f64> {
        self.factors
            .iter()
            .try_fold(0.0, |total, factor| -> Result<f64> { Ok(total + factor.neg_log_likelihood()?) })
    }

    fn compute_all_gradients(&mut self) -> Result<DVector<f64>> {
        self.store.clear_gradients();
        for factor in &self.factors {
            factor.push_gradients(&mut self.store)?;
        }
        let gradients = self
            .store
            .iter()
            .filter(|(_, node)| !node.is_fixed())
            .flat_map(|(_, node)| node.gradient().iter().copied());
        Ok(DVector::from_iterator(self.num_parameters(), gradients))
    }
}
