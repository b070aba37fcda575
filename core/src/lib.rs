//! GPDM Core
//! Sparse Gaussian-process dynamical models with a gradient-propagating factor graph
//! Copyright (c) 2025 Mohammad Atashi <mohammadaliatashi@icloud.com>
//!
//! The crate evaluates the negative log-likelihood of second-order GP
//! dynamics over segmented latent sequences, under exact (FTC) or sparse
//! (DTC, FITC) training conditionals, together with its analytic gradient.
//! Models plug into a [`graph::FactorGraph`] so dynamics and observation
//! mappings share latent variables and are optimized as one
//! [`graph::Objective`] by an external optimizer.

pub mod config;
pub mod dynamics;
pub mod error;
pub mod graph;
pub mod kernel;
pub mod linalg;
pub mod observation;
pub mod persistence;

pub use self::config::{DynamicsConfig, SparseGpConfig};
pub use self::dynamics::{
    ApproximationType, DynamicsFactorNode, DynamicsGradients, LatentProjection, PredictionStruct, SegmentTopology,
    Segments, SparseDynamicsApproximation, SparseGp,
};
pub use self::error::{GpdmError, Result};
pub use self::graph::{DataConnector, DataNode, DataNodeId, DataStore, FactorGraph, FactorNode, Objective};
pub use self::kernel::{Kernel, KernelSpec};
pub use self::observation::GplvmFactorNode;
pub use self::persistence::DynamicsSnapshot;
