//! Factor graph composition
//!
//! Data nodes hold matrices (latent positions, inducing inputs, kernel
//! hyperparameters, observations). Factor nodes read them through
//! connectors, evaluate a negative log-likelihood term and push gradients
//! back. [`FactorGraph`] sums the terms of all factors into a single
//! [`Objective`] over the non-fixed data nodes, so models sharing latent
//! variables are optimized jointly.
//!
//! Copyright (c) 2025 Mohammad Atashi <mohammadaliatashi@icloud.com>

pub mod connector;
pub mod data;
pub mod factor;
pub mod model;

pub use self::connector::DataConnector;
pub use self::data::{DataNode, DataNodeId, DataStore};
pub use self::factor::FactorNode;
pub use self::model::{FactorGraph, Objective};
