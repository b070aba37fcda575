//! Second-order Gaussian-process dynamics
//!
//! Segment topology, the shared GP likelihood engine, the dynamics model
//! built on it, detached predictors and the factor-graph wrapper.
//!
//! Copyright (c) 2025 Mohammad Atashi <mohammadaliatashi@icloud.com>

pub mod approximation;
pub mod factor;
pub mod prediction;
pub mod projection;
pub mod sparse_gp;
pub mod topology;

pub use self::approximation::{DynamicsGradients, SparseDynamicsApproximation};
pub use self::factor::DynamicsFactorNode;
pub use self::prediction::PredictionStruct;
pub use self::projection::LatentProjection;
pub use self::sparse_gp::{ApproximationType, GpGradients, SparseGp};
pub use self::topology::{SegmentTopology, Segments};
