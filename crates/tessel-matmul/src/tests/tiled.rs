use std::sync::Arc;

use half::f16;
use pretty_assertions::assert_eq;
use tessel_common::rand::{sample_quantized, seeded_rng};
use tessel_runtime::{
    ComputeClient, GlobalOutput, HardwareProperties, LaunchError, config::GlobalConfig,
};

use crate::{
    Strategy,
    components::{
        MatmulLaunchError, MatmulPrecision, MatmulProblem, MatmulSelection, MatmulSetupError,
        Out, TilingScheme,
        global::{OutputOp, OutputSource},
        tile::TileMatmulKind,
    },
    launch, launch_with_source,
    tests::test_utils::{MatmulTestCase, assert_equals_approx},
};

fn client() -> ComputeClient {
    let mut config = GlobalConfig::default();
    config.execution.num_workers = Some(4);
    ComputeClient::with_config(HardwareProperties::default(), Arc::new(config))
}

fn run<MP: MatmulPrecision>(
    case: &MatmulTestCase,
    strategy: &Strategy,
) -> Result<GlobalOutput<Out<MP>>, MatmulLaunchError> {
    let lhs = case.random_lhs();
    let rhs = case.random_rhs();
    let out = case.empty_out();
    launch::<MP>(&client(), strategy, &case.problem, &lhs, &rhs, &out)?;
    Ok(out)
}

fn expected<MP: MatmulPrecision>(case: &MatmulTestCase, output_op: OutputOp) -> Vec<Out<MP>> {
    case.matmul_cpu::<MP>(&case.random_lhs(), &case.random_rhs(), output_op)
}

fn double(selection: MatmulSelection) -> Strategy {
    Strategy::DoubleBuffered(selection)
}

#[test_log::test]
fn end_to_end_128x128x32() {
    let case = MatmulTestCase::new(128, 128, 32);
    let out = run::<f32>(&case, &double(MatmulSelection::default())).unwrap();
    assert_eq!(out.to_vec(), expected::<f32>(&case, OutputOp::PassThrough));
}

#[test_log::test]
fn double_buffering_matches_single_buffering() {
    // One to five block-steps: single tail, double tail, and main loops ending in each.
    for k in [8, 16, 24, 32, 40] {
        let case = MatmulTestCase::new(64, 128, k);
        let double_out = run::<f32>(&case, &double(MatmulSelection::default())).unwrap();
        let single_out =
            run::<f32>(&case, &Strategy::SingleBuffered(MatmulSelection::default())).unwrap();
        assert_eq!(double_out.to_vec(), single_out.to_vec(), "k={k}");
        assert_eq!(double_out.to_vec(), expected::<f32>(&case, OutputOp::PassThrough), "k={k}");
    }
}

#[test_log::test]
fn split_k_atomic_add_matches_a_single_split() {
    let case = MatmulTestCase::new(128, 64, 64);
    let reference = run::<f32>(&case, &double(MatmulSelection::default())).unwrap();

    for k_splits in [2, 4] {
        let selection = MatmulSelection::builder(TilingScheme::preset_64x64x8())
            .k_splits(k_splits)
            .build();
        let out = run::<f32>(&case, &double(selection)).unwrap();
        assert_eq!(out.to_vec(), reference.to_vec(), "k_splits={k_splits}");
    }
}

#[test_log::test]
fn padded_problem_matches_reference() {
    let case = MatmulTestCase::new(100, 72, 20);
    let selection = MatmulSelection::builder(TilingScheme::preset_64x64x8())
        .allow_padding(true)
        .build();
    let out = run::<f32>(&case, &double(selection)).unwrap();
    assert_eq!(out.to_vec(), expected::<f32>(&case, OutputOp::PassThrough));
}

#[test_log::test]
fn unpadded_selection_rejects_indivisible_problem() {
    let case = MatmulTestCase::new(100, 64, 16);
    let result = run::<f32>(&case, &double(MatmulSelection::default()));
    assert!(matches!(
        result,
        Err(MatmulLaunchError::Setup(MatmulSetupError::InvalidProblem(_)))
    ));
}

#[test_log::test]
fn tile_matmuls_agree_bit_for_bit() {
    let case = MatmulTestCase::new(64, 64, 48);
    let register = run::<f32>(&case, &double(MatmulSelection::default())).unwrap();
    let selection = MatmulSelection::builder(TilingScheme::preset_64x64x8())
        .tile_matmul(TileMatmulKind::OuterProduct)
        .build();
    let outer_product = run::<f32>(&case, &double(selection)).unwrap();
    assert_eq!(register.to_vec(), outer_product.to_vec());
}

#[test_log::test]
fn naive_matches_tiled() {
    let case = MatmulTestCase::new(64, 128, 24);
    let tiled = run::<f32>(&case, &double(MatmulSelection::default())).unwrap();
    let naive = run::<f32>(&case, &Strategy::Naive).unwrap();
    assert_eq!(tiled.to_vec(), naive.to_vec());
}

#[test_log::test]
fn naive_rejects_more_outputs_than_units() {
    let problem = MatmulProblem::row_major(1 << 17, 1 << 16, 1);
    let out = GlobalOutput::<f32>::zeros(1);
    let result = launch::<f32>(&client(), &Strategy::Naive, &problem, &[], &[], &out);
    assert!(matches!(
        result,
        Err(MatmulLaunchError::Setup(MatmulSetupError::InvalidProblem(_)))
    ));
}

#[test_log::test]
fn output_ops_are_applied_before_the_store() {
    let case = MatmulTestCase::new(64, 64, 16);
    for op in [OutputOp::Relu, OutputOp::Scale(0.5)] {
        let selection = MatmulSelection::builder(TilingScheme::preset_64x64x8())
            .output_op(op)
            .build();
        let out = run::<f32>(&case, &double(selection)).unwrap();
        assert_eq!(out.to_vec(), expected::<f32>(&case, op), "{op:?}");
    }
}

#[test_log::test]
fn integer_scale_is_truncated_after_scaling() {
    let case = MatmulTestCase::new(64, 64, 32);
    let selection = MatmulSelection::builder(TilingScheme::preset_64x64x8())
        .output_op(OutputOp::Scale(2.5))
        .build();
    let out = run::<i8>(&case, &double(selection)).unwrap().to_vec();
    let expected: Vec<i32> = expected::<i8>(&case, OutputOp::PassThrough)
        .iter()
        .map(|acc| (*acc as f64 * 2.5) as i32)
        .collect();
    assert_eq!(out, expected);
}

#[test_log::test]
fn bias_relu_epilogue_on_a_padded_problem() {
    let case = MatmulTestCase::new(100, 72, 20);
    let selection = MatmulSelection::builder(TilingScheme::preset_64x64x8())
        .allow_padding(true)
        .output_op(OutputOp::AddRelu)
        .build();
    let bias: Vec<f32> = sample_quantized(&mut seeded_rng(7), 72);
    let source = OutputSource::row_bias(&bias);

    let (lhs, rhs) = (case.random_lhs(), case.random_rhs());
    let out = case.empty_out();
    launch_with_source::<f32>(&client(), &selection, &case.problem, &lhs, &rhs, &source, &out)
        .unwrap();

    let plain = expected::<f32>(&case, OutputOp::PassThrough);
    let expected: Vec<f32> = plain
        .iter()
        .enumerate()
        .map(|(i, acc)| (acc + bias[i % 72]).max(0.0))
        .collect();
    assert_eq!(out.to_vec(), expected);
    assert_eq!(
        out.to_vec(),
        case.matmul_cpu_with_source::<f32>(&lhs, &rhs, Some(&source), OutputOp::AddRelu)
    );
}

#[test_log::test]
fn residual_add_in_int8() {
    let case = MatmulTestCase::new(64, 128, 32);
    let selection = MatmulSelection::builder(TilingScheme::preset_64x64x8())
        .tile_matmul(TileMatmulKind::OuterProduct)
        .output_op(OutputOp::Add)
        .build();
    let residual: Vec<i32> = sample_quantized(&mut seeded_rng(11), 64 * 128);
    let source = OutputSource::new([128, 1], &residual);

    let (lhs, rhs) = (case.random_lhs(), case.random_rhs());
    let out = case.empty_out();
    launch_with_source::<i8>(&client(), &selection, &case.problem, &lhs, &rhs, &source, &out)
        .unwrap();

    let plain = expected::<i8>(&case, OutputOp::PassThrough);
    let expected: Vec<i32> = plain.iter().zip(&residual).map(|(a, d)| a + d).collect();
    assert_eq!(out.to_vec(), expected);
}

#[test_log::test]
fn binary_op_needs_a_source() {
    let case = MatmulTestCase::new(64, 64, 16);
    let selection = MatmulSelection::builder(TilingScheme::preset_64x64x8())
        .output_op(OutputOp::Add)
        .build();
    let result = run::<f32>(&case, &double(selection));
    assert!(matches!(
        result,
        Err(MatmulLaunchError::Setup(MatmulSetupError::InvalidProblem(_)))
    ));
}

#[test_log::test]
fn block_clusters_cover_every_tile() {
    let case = MatmulTestCase::new(320, 192, 16);
    let selection = MatmulSelection::builder(TilingScheme::preset_64x64x8())
        .block_cluster(2, 2)
        .build();
    let out = run::<f32>(&case, &double(selection)).unwrap();
    assert_eq!(out.to_vec(), expected::<f32>(&case, OutputOp::PassThrough));
}

#[test_log::test]
fn large_tiles() {
    let case = MatmulTestCase::new(256, 128, 32);
    let selection = MatmulSelection::builder(TilingScheme::preset_128x128x8()).build();
    let out = run::<f32>(&case, &double(selection)).unwrap();
    assert_eq!(out.to_vec(), expected::<f32>(&case, OutputOp::PassThrough));
}

#[test_log::test]
fn strided_operands() {
    let case = MatmulTestCase::with_problem(MatmulProblem {
        lhs_strides: [130, 1],
        rhs_strides: [1, 24],
        out_strides: [1, 64],
        ..MatmulProblem::row_major(64, 64, 24)
    });
    let out = run::<f32>(&case, &double(MatmulSelection::default())).unwrap();
    assert_eq!(out.to_vec(), expected::<f32>(&case, OutputOp::PassThrough));
}

#[test_log::test]
fn half_precision_accumulates_in_f32() {
    let case = MatmulTestCase::new(64, 64, 32);
    let out = run::<f16>(&case, &double(MatmulSelection::default())).unwrap();
    assert_equals_approx(&out.to_vec(), &expected::<f16>(&case, OutputOp::PassThrough), 1e-3)
        .unwrap();
}

#[test_log::test]
fn int8_accumulates_in_i32() {
    let case = MatmulTestCase::new(64, 64, 32);
    let out = run::<i8>(&case, &double(MatmulSelection::default())).unwrap();
    assert_eq!(out.to_vec(), expected::<i8>(&case, OutputOp::PassThrough));
}

#[test_log::test]
fn auto_falls_back_to_naive_for_vectors() {
    let case = MatmulTestCase::new(64, 1, 32);
    let out = run::<f32>(&case, &Strategy::Auto).unwrap();
    assert_eq!(out.to_vec(), expected::<f32>(&case, OutputOp::PassThrough));

    let case = MatmulTestCase::new(96, 80, 12);
    let out = run::<f32>(&case, &Strategy::Auto).unwrap();
    assert_eq!(out.to_vec(), expected::<f32>(&case, OutputOp::PassThrough));
}

#[test_log::test]
fn short_buffers_fail_the_launch() {
    let case = MatmulTestCase::new(64, 64, 16);
    let lhs = case.random_lhs::<f32>();
    let rhs = case.random_rhs::<f32>();
    let out = GlobalOutput::<f32>::zeros(64 * 63);
    let result = launch::<f32>(
        &client(),
        &double(MatmulSelection::default()),
        &case.problem,
        &lhs,
        &rhs,
        &out,
    );
    assert!(matches!(
        result,
        Err(MatmulLaunchError::Launch(LaunchError::BufferTooSmall { name: "out", .. }))
    ));
}
