use tessel_common::math::{gcd, is_multiple_of};
use tessel_matmul::{
    components::{
        Acc, AvailableLineSizes, GemmConfig, Lhs, MatmulLineSizes, MatmulPrecision,
        MatmulSelection, Out, Rhs, TransferSelection,
        batch::GridDescriptors,
        tile::{OuterProductMatmul, RegisterMatmul, TileMatmulKind},
    },
    kernels::launch_gemm,
};
use tessel_runtime::{ComputeClient, GlobalOutput};

use crate::{ConvLaunchError, ConvLayout, ConvSetupError, ConvolutionProblem, ImplicitGemmViews};

/// Runs a 2D forward convolution as an implicit GEMM.
///
/// The input holds `Lhs<MP>` and the weight `Rhs<MP>` elements whatever the layout, each
/// contiguous in the memory order of [ConvolutionProblem::layout]. Problem dims that don't fill
/// whole blocks are padded when the selection allows it.
pub fn launch_conv2d<MP: MatmulPrecision>(
    client: &ComputeClient,
    problem: &ConvolutionProblem,
    selection: &MatmulSelection,
    input: &[Lhs<MP>],
    weight: &[Rhs<MP>],
    output: &GlobalOutput<Out<MP>>,
) -> Result<(), ConvLaunchError> {
    let views = ImplicitGemmViews::new(problem)?;
    log::debug!(
        "Convolution {:?} as a {:?} matmul",
        problem,
        problem.gemm_size()?
    );

    match problem.layout {
        ConvLayout::Nhwc => {
            launch_views::<MP>(client, problem, selection, views, input, weight, output)
        }
        ConvLayout::Nchw => launch_views::<(Rhs<MP>, Lhs<MP>, Acc<MP>, Out<MP>)>(
            client, problem, selection, views, weight, input, output,
        ),
    }
}

fn launch_views<MP: MatmulPrecision>(
    client: &ComputeClient,
    problem: &ConvolutionProblem,
    selection: &MatmulSelection,
    views: ImplicitGemmViews,
    lhs: &[Lhs<MP>],
    rhs: &[Rhs<MP>],
    out: &GlobalOutput<Out<MP>>,
) -> Result<(), ConvLaunchError> {
    let (selection, line_sizes) = select_conv_config::<MP>(problem, selection)?;
    let config = GemmConfig::new::<MP>(&selection, line_sizes, client.properties())?;
    log::debug!("Selected {line_sizes:?} for the convolution");

    let grid = GridDescriptors::new(views.lhs, views.rhs, views.out, &config)?;
    let result = match config.tile_matmul {
        TileMatmulKind::Register => {
            launch_gemm::<MP, RegisterMatmul>(client, &config, &grid, lhs, rhs, None, out)
        }
        TileMatmulKind::OuterProduct => {
            launch_gemm::<MP, OuterProductMatmul>(client, &config, &grid, lhs, rhs, None, out)
        }
    };
    result.map_err(ConvLaunchError::from)
}

/// Contiguous runs of `(lhs GemmK, rhs GemmK, out GemmN)` in memory, 1 when not contiguous.
fn contiguous_runs(problem: &ConvolutionProblem) -> Result<[usize; 3], ConvSetupError> {
    let [y, x] = problem.kernel_size;
    let filter = y * x * problem.in_channels;
    let [ho, wo] = problem.out_shape()?;

    Ok(match problem.layout {
        // NHWC input is contiguous over C only, KYXC filters over the whole reduction.
        ConvLayout::Nhwc => [problem.in_channels, filter, problem.out_channels],
        // KCYX filters are contiguous, NCHW input has no contiguous reduction run.
        ConvLayout::Nchw => [filter, 1, ho * wo],
    })
}

/// Line sizes and transfers of the implicit GEMM.
///
/// Operands contiguous along GemmK are read with the widest line dividing their contiguous run
/// and `KPerBlock`, by lanes spread along GemmK. The other operands keep the transfers of the
/// selection and scalar reads. The output uses the widest line dividing both its contiguous run
/// and `N1PerThread`.
pub fn select_conv_config<MP: MatmulPrecision>(
    problem: &ConvolutionProblem,
    selection: &MatmulSelection,
) -> Result<(MatmulSelection, MatmulLineSizes), ConvSetupError> {
    let [lhs_run, rhs_run, out_run] = contiguous_runs(problem)?;
    let tiling = &selection.tiling_scheme;
    let k_per_block = tiling.k_per_block;
    let k_line = |run: usize, size: u8| {
        let size = size as usize;
        run > 1 && is_multiple_of(run, size) && is_multiple_of(k_per_block, size)
    };

    let line_sizes = AvailableLineSizes::from_type_sizes(
        size_of::<Lhs<MP>>(),
        size_of::<Rhs<MP>>(),
        size_of::<Out<MP>>(),
    )
    .filter_lhs(|size| *size == 1 || k_line(lhs_run, *size))
    .filter_rhs(|size| *size == 1 || k_line(rhs_run, *size))
    .filter_out(|size| {
        let size = *size as usize;
        is_multiple_of(out_run, size) && is_multiple_of(tiling.n1_per_thread, size)
    })
    .pick_max()?;

    let mut selection = selection.clone();
    if line_sizes.lhs > 1 {
        selection.lhs_transfer = k_vector_transfer(
            tiling.block_size,
            k_per_block,
            tiling.m_per_block,
            line_sizes.lhs as usize,
        );
    }
    if line_sizes.rhs > 1 {
        selection.rhs_transfer = k_vector_transfer(
            tiling.block_size,
            k_per_block,
            tiling.n_per_block,
            line_sizes.rhs as usize,
        );
    }

    Ok((selection, line_sizes))
}

/// Lanes spread along GemmK first, each reading one line along GemmK per MN position.
fn k_vector_transfer(
    block_size: usize,
    k_per_block: usize,
    mn_per_block: usize,
    line_size: usize,
) -> TransferSelection {
    let cluster_k = k_per_block / line_size;
    let cluster_mn = gcd(mn_per_block, block_size / cluster_k).max(1);

    TransferSelection {
        thread_cluster_lengths: [cluster_k, cluster_mn],
        thread_cluster_arrange_order: [1, 0],
        src_access_order: [1, 0],
        src_vector_dim: 0,
        dst_line_size: 1,
        src_reset_coordinate_after_run: false,
    }
}
