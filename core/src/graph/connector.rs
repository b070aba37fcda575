//! Factor-side handle to a data node
//!
//! Copyright (c) 2025 Mohammad Atashi <mohammadaliatashi@icloud.com>

use nalgebra::DMatrix;

use super::data::{DataNode, DataNodeId, DataStore};
use crate::error::{GpdmError, Result};

/// Connection from a factor to one data node of a fixed shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataConnector {
    node: DataNodeId,
    shape: (usize, usize),
}

impl DataConnector {
    /// Connect to `node`, remembering its current shape.
    pub fn connect(store: &DataStore, node: DataNodeId) -> Result<Self> {
        let shape = store.get(node)?.shape();
        Ok(Self { node, shape })
    }

    /// Connect to `node`, which must have the given shape.
    pub fn connect_with_shape(store: &DataStore, node: DataNodeId, shape: (usize, usize)) -> Result<Self> {
        let connector = Self::connect(store, node)?;
        if connector.shape != shape {
            return Err(GpdmError::dimension(store.get(node)?.name(), shape, connector.shape));
        }
        Ok(connector)
    }

    #[inline]
    pub fn node(&self) -> DataNodeId {
        self.node
    }

    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        self.shape
    }

    pub fn data_node<'a>(&self, store: &'a DataStore) -> Result<&'a DataNode> {
        store.get(self.node)
    }

    pub fn values<'a>(&self, store: &'a DataStore) -> Result<&'a DMatrix<f64>> {
        Ok(store.get(self.node)?.values())
    }

    pub fn set_values(&self, store: &mut DataStore, values: &DMatrix<f64>) -> Result<()> {
        self.check_shape("values", values)?;
        store.get_mut(self.node)?.set_values(values)
    }

    /// Add `gradient` to the node's accumulated gradient
    pub fn push_gradient(&self, store: &mut DataStore, gradient: &DMatrix<f64>) -> Result<()> {
        self.check_shape("gradient", gradient)?;
        store.get_mut(self.node)?.accumulate_gradient(gradient)
    }

    fn check_shape(&self, what: &str, matrix: &DMatrix<f64>) -> Result<()> {
        if matrix.shape() == self.shape {
            Ok(())
        } else {
            Err(GpdmError::dimension(what, self.shape, matrix.shape()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_round_trip_and_gradients_accumulate() {
        let mut store = DataStore::new();
        let id = store.insert(DataNode::new("x", DMatrix::zeros(2, 2)));
        let connector = DataConnector::connect(&store, id).unwrap();

        let values = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 3.0, 4.0]);
        connector.set_values(&mut store, &values).unwrap();
        assert_eq!(connector.values(&store).unwrap(), &values);

        connector.push_gradient(&mut store, &values).unwrap();
        connector.push_gradient(&mut store, &values).unwrap();
        assert_eq!(connector.data_node(&store).unwrap().gradient(), &(&values * 2.0));
    }

    #[test]
    fn test_shape_mismatch_fails_fast() {
        let mut store = DataStore::new();
        let id = store.insert(DataNode::new("x", DMatrix::zeros(2, 2)));
        let connector = DataConnector::connect(&store, id).unwrap();

        assert!(matches!(
            connector.push_gradient(&mut store, &DMatrix::zeros(3, 2)),
            Err(GpdmError::InvalidArgument(_))
        ));
        assert!(DataConnector::connect_with_shape(&store, id, (2, 3)).is_err());
        assert!(DataConnector::connect(&store, DataNodeId(5)).is_err());
    }
}
