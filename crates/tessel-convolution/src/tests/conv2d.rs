use std::sync::Arc;

use pretty_assertions::assert_eq;
use tessel_matmul::components::{
    Buffering, MatmulPrecision, MatmulSelection, MatmulSetupError, Out, TilingScheme,
    tile::TileMatmulKind,
};
use tessel_runtime::{ComputeClient, GlobalOutput, HardwareProperties, config::GlobalConfig};

use crate::{
    ConvLaunchError, ConvLayout, ConvSetupError, ConvolutionProblem, launch_conv2d,
    tests::test_utils::ConvTestCase,
};

fn client() -> ComputeClient {
    let mut config = GlobalConfig::default();
    config.execution.num_workers = Some(4);
    ComputeClient::with_config(HardwareProperties::default(), Arc::new(config))
}

fn padded() -> MatmulSelection {
    MatmulSelection::builder(TilingScheme::preset_64x64x8())
        .allow_padding(true)
        .build()
}

fn run<MP: MatmulPrecision>(
    case: &ConvTestCase,
    selection: &MatmulSelection,
) -> Result<GlobalOutput<Out<MP>>, ConvLaunchError> {
    let output = case.empty_output();
    launch_conv2d::<MP>(
        &client(),
        &case.problem,
        selection,
        &case.random_input(),
        &case.random_weight(),
        &output,
    )?;
    Ok(output)
}

fn assert_matches_direct<MP: MatmulPrecision>(
    problem: ConvolutionProblem,
    selection: &MatmulSelection,
) {
    let case = ConvTestCase::new(problem);
    let output = run::<MP>(&case, selection).unwrap();
    let expected = case.conv_cpu::<MP>(&case.random_input(), &case.random_weight());
    assert_eq!(output.to_vec(), expected);
}

fn same_3x3() -> ConvolutionProblem {
    ConvolutionProblem::new(2, 8, 16, [10, 10], [3, 3]).with_padding([1, 1])
}

fn strided_dilated() -> ConvolutionProblem {
    ConvolutionProblem::new(1, 3, 5, [13, 11], [3, 2])
        .with_stride([2, 1])
        .with_dilation([2, 2])
        .with_asymmetric_padding([1, 0], [2, 1])
}

#[test_log::test]
fn nhwc_same_padding() {
    assert_matches_direct::<f32>(same_3x3(), &padded());
}

#[test_log::test]
fn nhwc_stride_dilation_and_asymmetric_padding() {
    assert_matches_direct::<f32>(strided_dilated(), &padded());
}

#[test_log::test]
fn nchw_same_padding() {
    assert_matches_direct::<f32>(same_3x3().with_layout(ConvLayout::Nchw), &padded());
}

#[test_log::test]
fn nchw_stride_dilation_and_asymmetric_padding() {
    assert_matches_direct::<f32>(strided_dilated().with_layout(ConvLayout::Nchw), &padded());
}

#[test_log::test]
fn nhwc_and_nchw_agree_on_pointwise_convolutions() {
    // With a 1x1 kernel and a single image both layouts reduce over channels only.
    let problem = ConvolutionProblem::new(1, 16, 8, [8, 8], [1, 1]);
    assert_matches_direct::<f32>(problem.clone(), &padded());
    assert_matches_direct::<f32>(problem.with_layout(ConvLayout::Nchw), &padded());
}

#[test_log::test]
fn pipeline_variants_match_direct_convolution() {
    let selections = [
        MatmulSelection::builder(TilingScheme::preset_64x64x8())
            .allow_padding(true)
            .buffering(Buffering::Single)
            .build(),
        MatmulSelection::builder(TilingScheme::preset_64x64x8())
            .allow_padding(true)
            .tile_matmul(TileMatmulKind::OuterProduct)
            .build(),
        MatmulSelection::builder(TilingScheme::preset_64x64x8())
            .allow_padding(true)
            .k_splits(2)
            .build(),
    ];
    for selection in selections.iter() {
        assert_matches_direct::<f32>(same_3x3(), selection);
        assert_matches_direct::<f32>(same_3x3().with_layout(ConvLayout::Nchw), selection);
    }
}

#[test_log::test]
fn int8_convolution() {
    assert_matches_direct::<i8>(same_3x3(), &padded());
}

#[test_log::test]
fn unpadded_selection_rejects_partial_blocks() {
    let case = ConvTestCase::new(strided_dilated());
    let result = run::<f32>(&case, &MatmulSelection::default());
    assert!(matches!(
        result,
        Err(ConvLaunchError::Setup(ConvSetupError::Matmul(
            MatmulSetupError::InvalidProblem(_)
        )))
    ));
}

#[test_log::test]
fn oversized_kernel_is_rejected_before_launch() {
    let case = ConvTestCase::new(ConvolutionProblem::new(1, 4, 4, [2, 8], [3, 3]));
    let result = run::<f32>(&case, &padded());
    assert!(matches!(
        result,
        Err(ConvLaunchError::Setup(ConvSetupError::InvalidProblem(_)))
    ));
}
