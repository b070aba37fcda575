//! Factor node contract
//!
//! Copyright (c) 2025 Mohammad Atashi <mohammadaliatashi@icloud.com>

use std::any::Any;
use std::fmt;

use super::connector::DataConnector;
use super::data::DataStore;
use crate::error::Result;

/// A negative log-likelihood term over some data nodes.
///
/// The graph drives every factor through the same cycle: `update` pulls the
/// current values of all connected nodes and recomputes, then
/// `neg_log_likelihood` and `push_gradients` read the result. Gradients are
/// added to the nodes' accumulators, never assigned.
pub trait FactorNode: fmt::Debug + Any {
    fn name(&self) -> &str;

    /// Data nodes this factor reads and writes gradients to
    fn connectors(&self) -> Vec<DataConnector>;

    fn update(&mut self, store: &DataStore) -> Result<()>;

    fn neg_log_likelihood(&self) -> Result<f64>;

    fn push_gradients(&self, store: &mut DataStore) -> Result<()>;

    /// Concrete access for callers that know the factor type
    fn as_any(&self) -> &dyn Any;
}
