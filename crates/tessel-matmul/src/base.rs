use tessel_common::math::is_multiple_of;
use tessel_runtime::{ComputeClient, GlobalOutput};

use crate::{
    components::{
        AvailableLineSizes, Buffering, GemmConfig, Lhs, MatmulIdent, MatmulKind,
        MatmulLaunchError, MatmulLineSizes, MatmulPrecision, MatmulProblem, MatmulSelection,
        MatmulSetupError, Out, Rhs, TilingScheme,
        batch::GridDescriptors,
        global::{OutputOp, OutputSource},
        tile::{OuterProductMatmul, RegisterMatmul, TileMatmulKind},
    },
    kernels::{launch_gemm, launch_naive},
};

#[derive(Debug, Clone, Default)]
/// The matmul algorithm to launch
pub enum Strategy {
    /// Tiled matmul whose loads overlap the compute of the previous block-step.
    DoubleBuffered(MatmulSelection),
    /// Tiled matmul that loads then computes each block-step.
    SingleBuffered(MatmulSelection),
    /// One unit per output element.
    Naive,
    #[default]
    /// Tries a padded double-buffered matmul, then the naive one if the former can't run
    Auto,
}

/// Launches `out = lhs · rhs` on the client.
///
/// `lhs` is `(K, M)`, `rhs` is `(K, N)` and `out` is `(M, N)`, laid out with the strides of
/// the problem.
pub fn launch<MP: MatmulPrecision>(
    client: &ComputeClient,
    strategy: &Strategy,
    problem: &MatmulProblem,
    lhs: &[Lhs<MP>],
    rhs: &[Rhs<MP>],
    out: &GlobalOutput<Out<MP>>,
) -> Result<(), MatmulLaunchError> {
    match strategy {
        Strategy::DoubleBuffered(selection) => {
            let selection = with_buffering(selection, Buffering::Double);
            launch_tiled::<MP>(client, &selection, problem, lhs, rhs, out)
        }
        Strategy::SingleBuffered(selection) => {
            let selection = with_buffering(selection, Buffering::Single);
            launch_tiled::<MP>(client, &selection, problem, lhs, rhs, out)
        }
        Strategy::Naive => {
            launch_naive::<MP>(client, problem, OutputOp::PassThrough, lhs, rhs, out)
        }
        Strategy::Auto => {
            let kind = MatmulKind::from(problem);
            if kind != MatmulKind::General {
                log::warn!("Falling back to the naive matmul for a {kind:?} problem");
                return launch_naive::<MP>(client, problem, OutputOp::PassThrough, lhs, rhs, out);
            }

            let selection = MatmulSelection::builder(TilingScheme::preset_64x64x8())
                .allow_padding(true)
                .build();
            match launch_tiled::<MP>(client, &selection, problem, lhs, rhs, out) {
                Err(MatmulLaunchError::Setup(
                    err @ (MatmulSetupError::Unavailable(_) | MatmulSetupError::InvalidProblem(_)),
                )) => {
                    log::warn!("Falling back to the naive matmul: {err}");
                    launch_naive::<MP>(client, problem, OutputOp::PassThrough, lhs, rhs, out)
                }
                result => result,
            }
        }
    }
}

fn with_buffering(selection: &MatmulSelection, buffering: Buffering) -> MatmulSelection {
    MatmulSelection {
        buffering,
        ..selection.clone()
    }
}

/// Validates a selection against a strided problem and launches the tiled matmul.
pub fn launch_tiled<MP: MatmulPrecision>(
    client: &ComputeClient,
    selection: &MatmulSelection,
    problem: &MatmulProblem,
    lhs: &[Lhs<MP>],
    rhs: &[Rhs<MP>],
    out: &GlobalOutput<Out<MP>>,
) -> Result<(), MatmulLaunchError> {
    launch_tiled_with::<MP>(client, selection, problem, lhs, rhs, None, out)
}

/// Launches the tiled matmul with `out = op(lhs · rhs, source)`, for the binary output op of
/// the selection.
pub fn launch_with_source<MP: MatmulPrecision>(
    client: &ComputeClient,
    selection: &MatmulSelection,
    problem: &MatmulProblem,
    lhs: &[Lhs<MP>],
    rhs: &[Rhs<MP>],
    source: &OutputSource<Out<MP>>,
    out: &GlobalOutput<Out<MP>>,
) -> Result<(), MatmulLaunchError> {
    launch_tiled_with::<MP>(client, selection, problem, lhs, rhs, Some(source), out)
}

fn launch_tiled_with<MP: MatmulPrecision>(
    client: &ComputeClient,
    selection: &MatmulSelection,
    problem: &MatmulProblem,
    lhs: &[Lhs<MP>],
    rhs: &[Rhs<MP>],
    source: Option<&OutputSource<Out<MP>>>,
    out: &GlobalOutput<Out<MP>>,
) -> Result<(), MatmulLaunchError> {
    let line_sizes = select_line_sizes::<MP>(problem, selection)?;
    let config = GemmConfig::new::<MP>(selection, line_sizes, client.properties())?;
    log::debug!("Selected {line_sizes:?} for {selection:?}");

    let mut grid = GridDescriptors::from_problem(problem, &config)?;
    if let Some(source) = source {
        grid = grid.with_source(source.descriptor(problem.m, problem.n)?, &config)?;
    }
    let data = source.map(|source| source.data);
    match config.tile_matmul {
        TileMatmulKind::Register => {
            launch_gemm::<MP, RegisterMatmul>(client, &config, &grid, lhs, rhs, data, out)
        }
        TileMatmulKind::OuterProduct => {
            launch_gemm::<MP, OuterProductMatmul>(client, &config, &grid, lhs, rhs, data, out)
        }
    }
}

/// Widest line sizes compatible with both the tensor layouts and the tiling.
pub fn select_line_sizes<MP: MatmulPrecision>(
    problem: &MatmulProblem,
    selection: &MatmulSelection,
) -> Result<MatmulLineSizes, MatmulSetupError> {
    let tiling = &selection.tiling_scheme;
    let lhs_slice = selection
        .lhs_transfer
        .thread_slice_lengths([tiling.k_per_block, tiling.m_per_block]);
    let rhs_slice = selection
        .rhs_transfer
        .thread_slice_lengths([tiling.k_per_block, tiling.n_per_block]);
    let lhs_dim = selection.lhs_transfer.src_vector_dim.min(1);
    let rhs_dim = selection.rhs_transfer.src_vector_dim.min(1);

    AvailableLineSizes::from_type_sizes(
        size_of::<Lhs<MP>>(),
        size_of::<Rhs<MP>>(),
        size_of::<Out<MP>>(),
    )
    .filter_lhs(|size| is_multiple_of(lhs_slice[lhs_dim], *size as usize))
    .filter_rhs(|size| is_multiple_of(rhs_slice[rhs_dim], *size as usize))
    .filter_out(|size| is_multiple_of(tiling.n1_per_thread, *size as usize))
    .filter_lhs_with_tensor(
        &problem.strides(MatmulIdent::Lhs),
        &problem.shape(MatmulIdent::Lhs),
        lhs_dim,
    )
    .filter_rhs_with_tensor(
        &problem.strides(MatmulIdent::Rhs),
        &problem.shape(MatmulIdent::Rhs),
        rhs_dim,
    )
    .filter_out_with_tensor(
        &problem.strides(MatmulIdent::Out),
        &problem.shape(MatmulIdent::Out),
    )
    .pick_max()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn line_sizes_follow_layout_and_tiling() {
        let selection = MatmulSelection::default();
        let line_sizes =
            select_line_sizes::<f32>(&MatmulProblem::row_major(128, 128, 32), &selection).unwrap();
        assert_eq!(
            line_sizes,
            MatmulLineSizes {
                lhs: 4,
                rhs: 4,
                out: 4
            }
        );

        // Odd leading dimension on lhs, column-major output.
        let problem = MatmulProblem {
            lhs_strides: [130, 1],
            out_strides: [1, 128],
            ..MatmulProblem::row_major(128, 128, 32)
        };
        let line_sizes = select_line_sizes::<f32>(&problem, &selection).unwrap();
        assert_eq!(
            line_sizes,
            MatmulLineSizes {
                lhs: 2,
                rhs: 4,
                out: 1
            }
        );
    }
}
