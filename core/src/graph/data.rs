//! Data nodes and their arena
//!
//! Copyright (c) 2025 Mohammad Atashi <mohammadaliatashi@icloud.com>

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::dynamics::Segments;
use crate::error::{GpdmError, Result};

/// Index of a data node inside its [`DataStore`]
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DataNodeId(pub usize);

impl DataNodeId {
    #[inline]
    pub fn as_usize(self) -> usize {
        self.0
    }
}

/// A named matrix with an accumulated gradient of the same shape
#[derive(Debug, Clone)]
pub struct DataNode {
    name: String,
    values: DMatrix<f64>,
    gradient: DMatrix<f64>,
    /// Fixed nodes are excluded from the optimizer's parameter vector
    fixed: bool,
    segments: Option<Segments>,
}

impl DataNode {
    pub fn new(name: impl Into<String>, values: DMatrix<f64>) -> Self {
        let gradient = DMatrix::zeros(values.nrows(), values.ncols());
        Self {
            name: name.into(),
            values,
            gradient,
            fixed: false,
            segments: None,
        }
    }

    /// A node the optimizer never moves (observations, for instance)
    pub fn fixed(name: impl Into<String>, values: DMatrix<f64>) -> Self {
        Self {
            fixed: true,
            ..Self::new(name, values)
        }
    }

    /// Attach the segmentation of a sequence-valued node.
    pub fn with_segments(mut self, segments: Segments) -> Result<Self> {
        segments.check_rows(self.values.nrows())?;
        self.segments = Some(segments);
        Ok(self)
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn values(&self) -> &DMatrix<f64> {
        &self.values
    }

    #[inline]
    pub fn gradient(&self) -> &DMatrix<f64> {
        &self.gradient
    }

    #[inline]
    pub fn is_fixed(&self) -> bool {
        self.fixed
    }

    #[inline]
    pub fn segments(&self) -> Option<&Segments> {
        self.segments.as_ref()
    }

    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        self.values.shape()
    }

    /// Entries contributed to the optimizer's parameter vector
    pub fn num_parameters(&self) -> usize {
        if self.fixed {
            0
        } else {
            self.values.len()
        }
    }

    pub fn set_values(&mut self, values: &DMatrix<f64>) -> Result<()> {
        if values.shape() != self.values.shape() {
            return Err(GpdmError::dimension(&self.name, self.values.shape(), values.shape()));
        }
        self.values.copy_from(values);
        Ok(())
    }

    /// Add `gradient` to the accumulated gradient
    pub fn accumulate_gradient(&mut self, gradient: &DMatrix<f64>) -> Result<()> {
        if gradient.shape() != self.gradient.shape() {
            return Err(GpdmError::dimension(
                &format!("gradient of {}", self.name),
                self.gradient.shape(),
                gradient.shape(),
            ));
        }
        self.gradient += gradient;
        Ok(())
    }

    pub fn clear_gradient(&mut self) {
        self.gradient.fill(0.0);
    }
}

/// Arena of data nodes; ids are creation indices and never reused
#[derive(Debug, Clone, Default)]
pub struct DataStore {
    nodes: Vec<DataNode>,
}

impl DataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, node: DataNode) -> DataNodeId {
        self.nodes.push(node);
        DataNodeId(self.nodes.len() - 1)
    }

    pub fn get(&self, id: DataNodeId) -> Result<&DataNode> {
        self.nodes.get(id.0).ok_or(GpdmError::UnknownDataNode(id))
    }

    pub fn get_mut(&mut self, id: DataNodeId) -> Result<&mut DataNode> {
        self.nodes.get_mut(id.0).ok_or(GpdmError::UnknownDataNode(id))
    }

    /// First node with the given name
    pub fn find(&self, name: &str) -> Option<DataNodeId> {
        self.nodes.iter().position(|node| node.name == name).map(DataNodeId)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in creation order
    pub fn iter(&self) -> impl Iterator<Item = (DataNodeId, &DataNode)> {
        self.nodes.iter().enumerate().map(|(i, node)| (DataNodeId(i), node))
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut DataNode> {
        self.nodes.iter_mut()
    }

    pub fn clear_gradients(&mut self) {
        self.nodes.iter_mut().for_each(DataNode::clear_gradient);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_addresses_nodes_by_creation_index() {
        let mut store = DataStore::new();
        let a = store.insert(DataNode::new("a", DMatrix::zeros(2, 2)));
        let b = store.insert(DataNode::fixed("b", DMatrix::zeros(1, 3)));

        assert_eq!(a.as_usize(), 0);
        assert_eq!(store.get(b).unwrap().name(), "b");
        assert_eq!(store.find("b"), Some(b));
        assert!(matches!(store.get(DataNodeId(7)), Err(GpdmError::UnknownDataNode(DataNodeId(7)))));
        assert_eq!(store.get(a).unwrap().num_parameters(), 4);
        assert_eq!(store.get(b).unwrap().num_parameters(), 0);
    }

    #[test]
    fn test_gradients_accumulate_until_cleared() {
        let mut node = DataNode::new("x", DMatrix::zeros(2, 1));
        let g = DMatrix::from_column_slice(2, 1, &[1.0, -2.0]);
        node.accumulate_gradient(&g).unwrap();
        node.accumulate_gradient(&g).unwrap();
        assert_eq!(node.gradient(), &(&g * 2.0));

        node.clear_gradient();
        assert_eq!(node.gradient(), &DMatrix::zeros(2, 1));
        assert!(node.accumulate_gradient(&DMatrix::zeros(1, 2)).is_err());
    }

    #[test]
    fn test_shape_checks() {
        let mut node = DataNode::new("x", DMatrix::zeros(3, 2));
        assert!(node.set_values(&DMatrix::zeros(2, 3)).is_err());
        assert!(node.set_values(&DMatrix::from_element(3, 2, 1.0)).is_ok());

        let segments = Segments::from_lengths(&[2, 2]).unwrap();
        assert!(DataNode::new("x", DMatrix::zeros(3, 2)).with_segments(segments.clone()).is_ok());
        assert!(DataNode::new("x", DMatrix::zeros(2, 2)).with_segments(segments).is_err());
    }
}
