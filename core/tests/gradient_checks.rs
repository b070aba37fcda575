//! Central-difference checks of the full objective gradient
//!
//! Every free parameter of the graph (latent positions, inducing inputs,
//! kernel log-hyperparameters, ln β) is perturbed through the optimizer
//! interface, so the checks cover the scatter of engine gradients onto data
//! nodes as well as the engine itself.

use gpdm_core::kernel::{CompoundKernel, HyperPrior, LinearKernel, RbfKernel, WhiteKernel};
use gpdm_core::{
    ApproximationType, DataNode, DynamicsConfig, DynamicsFactorNode, FactorGraph, GplvmFactorNode, Kernel, Objective,
    Segments, SparseGpConfig,
};
use nalgebra::{DMatrix, DVector};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn dynamics_kernel() -> Box<dyn Kernel> {
    Box::new(CompoundKernel::new(vec![
        Box::new(RbfKernel::new(0.9, 0.6).with_prior(HyperPrior::Reciprocal)),
        Box::new(LinearKernel::new(0.4)),
        Box::new(WhiteKernel::new(0.02)),
    ]))
}

fn latent(rows: usize, cols: usize) -> DMatrix<f64> {
    DMatrix::from_fn(rows, cols, |i, j| {
        (0.55 * i as f64 + 1.3 * j as f64).sin() + 0.1 * ((i * (j + 2)) as f64).cos()
    })
}

fn dynamics_config(approximation: ApproximationType, output_columns: Option<Vec<usize>>) -> DynamicsConfig {
    DynamicsConfig {
        gp: SparseGpConfig {
            approximation,
            num_inducing_max: 5,
            initial_beta: 1e3,
            seed: 11,
        },
        boundary_variance: 0.7,
        output_columns,
    }
}

fn dynamics_graph(
    approximation: ApproximationType,
    lengths: &[usize],
    latent_dim: usize,
    output_columns: Option<Vec<usize>>,
) -> FactorGraph {
    let rows: usize = lengths.iter().sum();
    let mut graph = FactorGraph::new();
    let segments = Segments::from_lengths(lengths).unwrap();
    let x = graph.add_data_node(
        DataNode::new("latent", latent(rows, latent_dim))
            .with_segments(segments)
            .unwrap(),
    );
    let config = dynamics_config(approximation, output_columns);
    let factor =
        DynamicsFactorNode::initialize("dynamics", graph.store_mut(), x, dynamics_kernel(), &config).unwrap();
    graph.add_factor(Box::new(factor)).unwrap();
    graph
}

/// Compare analytic and central-difference gradients of the graph objective
fn check_objective_gradients(graph: &mut FactorGraph) {
    let params = graph.parameters();
    graph.set_parameters(&params).unwrap();
    let analytic = graph.compute_all_gradients().unwrap();
    assert_eq!(analytic.len(), params.len());

    let h = 1e-5;
    let mut numeric = DVector::zeros(params.len());
    for i in 0..params.len() {
        let mut moved = params.clone();
        moved[i] += h;
        graph.set_parameters(&moved).unwrap();
        let up = graph.log_likelihood().unwrap();
        moved[i] -= 2.0 * h;
        graph.set_parameters(&moved).unwrap();
        let down = graph.log_likelihood().unwrap();
        numeric[i] = (up - down) / (2.0 * h);
    }
    graph.set_parameters(&params).unwrap();

    for i in 0..params.len() {
        let (a, n) = (analytic[i], numeric[i]);
        let scale = 1.0_f64.max(a.abs()).max(n.abs());
        assert!(
            (a - n).abs() <= 1e-4 * scale,
            "parameter {}: analytic {} vs numeric {}",
            i,
            a,
            n
        );
    }
}

#[test]
fn test_ftc_single_segment() {
    init_logging();
    let mut graph = dynamics_graph(ApproximationType::Ftc, &[9], 2, None);
    check_objective_gradients(&mut graph);
}

#[test]
fn test_ftc_multiple_segments() {
    let mut graph = dynamics_graph(ApproximationType::Ftc, &[5, 3, 4], 2, None);
    check_objective_gradients(&mut graph);
}

#[test]
fn test_dtc_single_segment() {
    let mut graph = dynamics_graph(ApproximationType::Dtc, &[10], 2, None);
    check_objective_gradients(&mut graph);
}

#[test]
fn test_dtc_multiple_segments() {
    let mut graph = dynamics_graph(ApproximationType::Dtc, &[6, 2, 5], 2, None);
    check_objective_gradients(&mut graph);
}

#[test]
fn test_fitc_single_segment() {
    let mut graph = dynamics_graph(ApproximationType::Fitc, &[10], 2, None);
    check_objective_gradients(&mut graph);
}

#[test]
fn test_fitc_multiple_segments() {
    let mut graph = dynamics_graph(ApproximationType::Fitc, &[7, 5], 3, None);
    check_objective_gradients(&mut graph);
}

#[test]
fn test_partial_projection_gradients() {
    for approximation in [ApproximationType::Ftc, ApproximationType::Fitc] {
        let mut graph = dynamics_graph(approximation, &[6, 5], 3, Some(vec![2, 0]));
        check_objective_gradients(&mut graph);
    }
}

#[test]
fn test_joint_dynamics_and_observation_gradients() {
    init_logging();
    let lengths = [6, 5];
    let rows: usize = lengths.iter().sum();
    let x = latent(rows, 2);
    let y = DMatrix::from_fn(rows, 4, |i, j| {
        (x[(i, 0)] * (j as f64 + 0.5)).sin() + 0.3 * x[(i, 1)] - 0.05 * j as f64
    });

    let mut graph = FactorGraph::new();
    let segments = Segments::from_lengths(&lengths).unwrap();
    let latent_id = graph.add_data_node(DataNode::new("latent", x).with_segments(segments).unwrap());
    let observed_id = graph.add_data_node(DataNode::fixed("observed", y));

    let dynamics = DynamicsFactorNode::initialize(
        "dynamics",
        graph.store_mut(),
        latent_id,
        dynamics_kernel(),
        &dynamics_config(ApproximationType::Fitc, None),
    )
    .unwrap();
    graph.add_factor(Box::new(dynamics)).unwrap();

    let observation_kernel: Box<dyn Kernel> = Box::new(CompoundKernel::new(vec![
        Box::new(RbfKernel::new(1.0, 1.5)),
        Box::new(WhiteKernel::new(0.05)),
    ]));
    let observation_config = SparseGpConfig {
        approximation: ApproximationType::Dtc,
        num_inducing_max: 6,
        initial_beta: 30.0,
        seed: 5,
    };
    let observation = GplvmFactorNode::initialize(
        "observation",
        graph.store_mut(),
        latent_id,
        observed_id,
        observation_kernel,
        &observation_config,
    )
    .unwrap();
    graph.add_factor(Box::new(observation)).unwrap();

    // latent 11x2, dynamics 5x4 inducing + 4 kernel + ln β, observation 6x2 inducing + 2 kernel + ln β
    assert_eq!(graph.num_parameters(), 22 + 25 + 15);
    check_objective_gradients(&mut graph);
}
